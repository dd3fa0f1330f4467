//! Patches over JSON value trees.
//!
//! # Overview
//!
//! - [`Patch`]: a single `add`, `remove` or `replace` operation addressed by
//!   a [`Path`](dendriform_path::Path).
//! - [`apply`]: applies patches in place, touching only the parents of the
//!   patched positions.
//! - [`diff`] / [`diff_at`]: the patch list that turns one tree into another.
//! - [`Delta`]: a forward patch list paired with its inverse, the unit of
//!   undo/redo bookkeeping.
//!
//! # Example
//!
//! ```
//! use dendriform_patch::{apply, diff};
//! use serde_json::json;
//!
//! let src = json!({"name": "boo", "tags": ["a"]});
//! let dst = json!({"name": "boooo", "tags": ["x", "a"]});
//! let patches = diff(&src, &dst);
//!
//! let mut doc = src.clone();
//! apply(&mut doc, &patches).unwrap();
//! assert_eq!(doc, dst);
//! ```

pub mod apply;
pub mod diff;
pub mod types;

pub use apply::{apply, apply_patch};
pub use diff::{diff, diff_at, Delta};
pub use types::{Patch, PatchError};
