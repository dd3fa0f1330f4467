//! In-place patch application.

use serde_json::Value;

use dendriform_path::{format_pointer, require_in_mut, split_last, PathStep, Shape, ShapeMut};

use crate::types::{Patch, PatchError};

/// Applies `patches` in order, stopping at the first failure.
///
/// Patches already applied before a failure stay applied.
pub fn apply(doc: &mut Value, patches: &[Patch]) -> Result<(), PatchError> {
    for patch in patches {
        apply_patch(doc, patch)?;
    }
    Ok(())
}

pub fn apply_patch(doc: &mut Value, patch: &Patch) -> Result<(), PatchError> {
    match patch {
        Patch::Add { path, value } => apply_add(doc, path, value.clone()),
        Patch::Remove { path } => apply_remove(doc, path),
        Patch::Replace { path, value } => apply_replace(doc, path, value.clone()),
    }
}

// ── Individual operation applicators ─────────────────────────────────────

fn apply_add(doc: &mut Value, path: &[PathStep], value: Value) -> Result<(), PatchError> {
    let Some((parent_path, key)) = split_last(path) else {
        *doc = value;
        return Ok(());
    };
    let parent = require_in_mut(doc, parent_path)?;
    ShapeMut::of(parent).insert(key, value)?;
    Ok(())
}

fn apply_remove(doc: &mut Value, path: &[PathStep]) -> Result<(), PatchError> {
    let (parent_path, key) = split_last(path).ok_or(PatchError::InvalidTarget)?;
    let parent = require_in_mut(doc, parent_path)?;
    match ShapeMut::of(parent).remove(key)? {
        Some(_) => Ok(()),
        None => Err(PatchError::NotFound(format_pointer(path))),
    }
}

fn apply_replace(doc: &mut Value, path: &[PathStep], value: Value) -> Result<(), PatchError> {
    let Some((parent_path, key)) = split_last(path) else {
        *doc = value;
        return Ok(());
    };
    let parent = require_in_mut(doc, parent_path)?;
    if !Shape::of(parent).has(key)? {
        return Err(PatchError::NotFound(format_pointer(path)));
    }
    ShapeMut::of(parent).set(key, value)?;
    Ok(())
}
