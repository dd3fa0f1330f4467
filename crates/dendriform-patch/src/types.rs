//! Core patch types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use dendriform_path::{get_in, AccessError, Path, PathStep, Shape};

// ── Error ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("INVALID_TARGET: cannot remove the root")]
    InvalidTarget,
    #[error(transparent)]
    Access(#[from] AccessError),
}

// ── Patch ─────────────────────────────────────────────────────────────────

/// One patch operation.
///
/// Serialized with an `op` tag, e.g. `{"op":"replace","path":[],"value":1}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Patch {
    /// Inserts `value`. On an ordered collection later elements shift up.
    Add { path: Path, value: Value },
    /// Removes the value. On an ordered collection later elements shift down.
    Remove { path: Path },
    /// Overwrites an existing value.
    Replace { path: Path, value: Value },
}

impl Patch {
    pub fn path(&self) -> &[PathStep] {
        match self {
            Patch::Add { path, .. } | Patch::Remove { path } | Patch::Replace { path, .. } => path,
        }
    }

    pub fn op_name(&self) -> &'static str {
        match self {
            Patch::Add { .. } => "add",
            Patch::Remove { .. } => "remove",
            Patch::Replace { .. } => "replace",
        }
    }

    /// The same patch with its first `depth` path steps dropped, for
    /// applying to the subtree at that depth.
    pub fn relative_to(&self, depth: usize) -> Patch {
        let strip = |path: &Path| path.get(depth..).unwrap_or_default().to_vec();
        match self {
            Patch::Add { path, value } => Patch::Add {
                path: strip(path),
                value: value.clone(),
            },
            Patch::Remove { path } => Patch::Remove { path: strip(path) },
            Patch::Replace { path, value } => Patch::Replace {
                path: strip(path),
                value: value.clone(),
            },
        }
    }

    /// Whether applying this patch to `before` can change the shape of the
    /// tree: which positions exist, not just the scalars stored at them.
    pub fn is_structural(&self, before: &Value) -> bool {
        match self {
            Patch::Add { .. } | Patch::Remove { .. } => true,
            Patch::Replace { path, value } => {
                let was_collection = matches!(
                    get_in(before, path),
                    Ok(Some(old)) if Shape::of(old).is_collection()
                );
                was_collection || Shape::of(value).is_collection()
            }
        }
    }
}
