//! Paths into JSON value trees.
//!
//! A [`Path`] is an ordered list of [`PathStep`]s from the root of a tree to
//! an addressable position. Paths are structural: two equal step sequences
//! name the same position no matter how they were built.
//!
//! # Example
//!
//! ```
//! use dendriform_path::{format_pointer, get_in, parse_pointer, PathStep};
//! use serde_json::json;
//!
//! let path = parse_pointer("/foo/0");
//! assert_eq!(path, vec![PathStep::from("foo"), PathStep::from(0)]);
//! assert_eq!(format_pointer(&path), "/foo/0");
//!
//! let doc = json!({"foo": ["a", "b"]});
//! assert_eq!(get_in(&doc, &path).unwrap(), Some(&json!("a")));
//! ```

use serde_json::Value;

pub mod accessor;
mod types;

pub use accessor::{AccessError, Shape, ShapeMut};
pub use types::{Path, PathStep};

/// Unescapes a pointer component (`~1` becomes `/`, `~0` becomes `~`).
pub fn unescape_component(component: &str) -> String {
    if !component.contains('~') {
        return component.to_string();
    }
    // ~1 first, otherwise "~01" would decode to "/"
    component.replace("~1", "/").replace("~0", "~")
}

/// Escapes a pointer component (`~` becomes `~0`, `/` becomes `~1`).
pub fn escape_component(component: &str) -> String {
    if !component.contains('/') && !component.contains('~') {
        return component.to_string();
    }
    component.replace('~', "~0").replace('/', "~1")
}

/// Parses an RFC 6901 pointer. All-digit tokens become [`PathStep::Index`].
///
/// ```
/// use dendriform_path::{parse_pointer, PathStep};
///
/// assert!(parse_pointer("").is_empty());
/// assert_eq!(parse_pointer("/a~1b"), vec![PathStep::from("a/b")]);
/// ```
pub fn parse_pointer(pointer: &str) -> Path {
    if pointer.is_empty() {
        return Vec::new();
    }
    let body = pointer.strip_prefix('/').unwrap_or(pointer);
    body.split('/')
        .map(|token| {
            let token = unescape_component(token);
            match types::index_of_token(&token) {
                Some(idx) => PathStep::Index(idx),
                None => PathStep::Key(token),
            }
        })
        .collect()
}

/// Formats a path as an RFC 6901 pointer. The root path is the empty string.
pub fn format_pointer(path: &[PathStep]) -> String {
    let mut out = String::new();
    for step in path {
        out.push('/');
        match step {
            PathStep::Key(key) => out.push_str(&escape_component(key)),
            PathStep::Index(idx) => out.push_str(&idx.to_string()),
        }
    }
    out
}

/// Returns true if `parent` is a (non-strict) prefix of `child`.
pub fn is_prefix(parent: &[PathStep], child: &[PathStep]) -> bool {
    parent.len() <= child.len() && parent.iter().zip(child).all(|(a, b)| a == b)
}

/// Splits a path into its parent path and final step. `None` at the root.
pub fn split_last(path: &[PathStep]) -> Option<(&[PathStep], &PathStep)> {
    let (last, parent) = path.split_last()?;
    Some((parent, last))
}

/// Reads the value at `path`.
///
/// A path that runs off the tree (missing key, index past the end) reads as
/// `None`. Stepping into a scalar that is present is an [`AccessError`].
pub fn get_in<'a>(value: &'a Value, path: &[PathStep]) -> Result<Option<&'a Value>, AccessError> {
    let mut cur = value;
    for step in path {
        match Shape::of(cur).get(step)? {
            Some(next) => cur = next,
            None => return Ok(None),
        }
    }
    Ok(Some(cur))
}

/// Mutable twin of [`get_in`].
pub fn get_in_mut<'a>(
    value: &'a mut Value,
    path: &[PathStep],
) -> Result<Option<&'a mut Value>, AccessError> {
    let mut cur = value;
    for step in path {
        match ShapeMut::of(cur).into_child(step)? {
            Some(next) => cur = next,
            None => return Ok(None),
        }
    }
    Ok(Some(cur))
}

/// Like [`get_in_mut`], but a missing parent is an error instead of `None`.
///
/// Writes use this: assigning below a position that does not exist fails
/// the same way assigning into a scalar does.
pub fn require_in_mut<'a>(
    value: &'a mut Value,
    path: &[PathStep],
) -> Result<&'a mut Value, AccessError> {
    let mut cur = value;
    for (depth, step) in path.iter().enumerate() {
        match ShapeMut::of(cur).into_child(step)? {
            Some(next) => cur = next,
            None => {
                return Err(AccessError::Missing {
                    pointer: format_pointer(&path[..=depth]),
                })
            }
        }
    }
    Ok(cur)
}
