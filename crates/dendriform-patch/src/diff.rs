//! Structural diff: the patch list that turns one tree into another.
//!
//! Objects remove the keys missing from the destination, add the new ones
//! and recurse into shared keys. Arrays trim their common prefix and
//! suffix, recurse position by position over what is left, then add or
//! remove the remainder, so an insertion at the front of a long sequence is
//! a single `add`. Any other difference is a `replace`.

use serde_json::{Map, Value};

use dendriform_path::{Path, PathStep};

use crate::types::Patch;

// ── Public API ────────────────────────────────────────────────────────────

/// Patches that transform `src` into `dst`, rooted at the empty path.
pub fn diff(src: &Value, dst: &Value) -> Vec<Patch> {
    diff_at(&[], src, dst)
}

/// Like [`diff`], with every patch path prefixed by `prefix`.
pub fn diff_at(prefix: &[PathStep], src: &Value, dst: &Value) -> Vec<Patch> {
    let mut ops = Vec::new();
    let mut path = prefix.to_vec();
    diff_value(&mut ops, &mut path, src, dst);
    ops
}

/// A forward patch list and the inverse that undoes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delta {
    pub redo: Vec<Patch>,
    pub undo: Vec<Patch>,
}

impl Delta {
    /// The delta of assigning `after` at `path`, where `before` is what was
    /// there (`None` when the position did not exist yet).
    pub fn between(path: &[PathStep], before: Option<&Value>, after: &Value) -> Delta {
        match before {
            None => Delta {
                redo: vec![Patch::Add {
                    path: path.to_vec(),
                    value: after.clone(),
                }],
                undo: vec![Patch::Remove {
                    path: path.to_vec(),
                }],
            },
            Some(before) => Delta {
                redo: diff_at(path, before, after),
                undo: diff_at(path, after, before),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.redo.is_empty() && self.undo.is_empty()
    }

    /// Folds a later delta into this one: its forward patches run after
    /// ours, its inverse patches run before ours.
    pub fn merge(&mut self, later: Delta) {
        self.redo.extend(later.redo);
        let mut undo = later.undo;
        undo.append(&mut self.undo);
        self.undo = undo;
    }

    pub fn inverted(self) -> Delta {
        Delta {
            redo: self.undo,
            undo: self.redo,
        }
    }
}

// ── Core recursive differ ─────────────────────────────────────────────────

fn diff_value(ops: &mut Vec<Patch>, path: &mut Path, src: &Value, dst: &Value) {
    if src == dst {
        return;
    }
    match (src, dst) {
        (Value::Object(s), Value::Object(d)) => diff_obj(ops, path, s, d),
        (Value::Array(s), Value::Array(d)) => diff_arr(ops, path, s, d),
        _ => ops.push(Patch::Replace {
            path: path.clone(),
            value: dst.clone(),
        }),
    }
}

fn diff_obj(ops: &mut Vec<Patch>, path: &mut Path, src: &Map<String, Value>, dst: &Map<String, Value>) {
    for key in src.keys() {
        if !dst.contains_key(key) {
            path.push(PathStep::Key(key.clone()));
            ops.push(Patch::Remove { path: path.clone() });
            path.pop();
        }
    }
    for (key, dst_val) in dst {
        path.push(PathStep::Key(key.clone()));
        match src.get(key) {
            None => ops.push(Patch::Add {
                path: path.clone(),
                value: dst_val.clone(),
            }),
            Some(src_val) => diff_value(ops, path, src_val, dst_val),
        }
        path.pop();
    }
}

fn diff_arr(ops: &mut Vec<Patch>, path: &mut Path, src: &[Value], dst: &[Value]) {
    let head = src.iter().zip(dst).take_while(|(a, b)| a == b).count();
    let room = src.len().min(dst.len()) - head;
    let tail = src
        .iter()
        .rev()
        .zip(dst.iter().rev())
        .take(room)
        .take_while(|(a, b)| a == b)
        .count();

    let src_mid = &src[head..src.len() - tail];
    let dst_mid = &dst[head..dst.len() - tail];
    let overlap = src_mid.len().min(dst_mid.len());

    for i in 0..overlap {
        path.push(PathStep::Index(head + i));
        diff_value(ops, path, &src_mid[i], &dst_mid[i]);
        path.pop();
    }
    for (i, value) in dst_mid.iter().enumerate().skip(overlap) {
        path.push(PathStep::Index(head + i));
        ops.push(Patch::Add {
            path: path.clone(),
            value: value.clone(),
        });
        path.pop();
    }
    // Highest index first so earlier removals do not shift later ones.
    for i in (overlap..src_mid.len()).rev() {
        path.push(PathStep::Index(head + i));
        ops.push(Patch::Remove { path: path.clone() });
        path.pop();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
