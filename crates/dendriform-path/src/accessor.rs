//! Shape-polymorphic access to tree positions.
//!
//! # Overview
//!
//! Every value is exactly one of three shapes: a scalar, a keyed collection
//! (JSON object) or an ordered collection (JSON array). [`Shape`] and
//! [`ShapeMut`] pair each case with the operations legal on it, so callers
//! match on the shape once instead of probing the value repeatedly.
//!
//! Keys are lenient across shapes the way property access on plain data
//! usually is: an index step on a keyed collection looks up its decimal
//! text, and a canonical decimal key on an ordered collection is an index.
//! Scalars have no children; asking one for a key is an [`AccessError`].

use std::borrow::Cow;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::PathStep;

// ── Error ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("cannot access key {key} of {value}")]
    NotCollection { key: String, value: String },
    #[error("key {key} is not a valid sequence index")]
    NotIndex { key: String },
    #[error("index {index} is out of bounds for length {len}")]
    OutOfBounds { index: usize, len: usize },
    #[error("nothing at {pointer}")]
    Missing { pointer: String },
}

impl AccessError {
    pub(crate) fn not_collection(step: &PathStep, value: &Value) -> Self {
        AccessError::NotCollection {
            key: step.to_string(),
            value: value.to_string(),
        }
    }
}

fn key_text(step: &PathStep) -> Cow<'_, str> {
    match step {
        PathStep::Key(key) => Cow::Borrowed(key.as_str()),
        PathStep::Index(idx) => Cow::Owned(idx.to_string()),
    }
}

fn require_index(step: &PathStep) -> Result<usize, AccessError> {
    step.as_index().ok_or_else(|| AccessError::NotIndex {
        key: step.to_string(),
    })
}

// ── Shared access ─────────────────────────────────────────────────────────

/// Read-only view of a value classified by shape.
#[derive(Debug, Clone, Copy)]
pub enum Shape<'a> {
    Scalar(&'a Value),
    Keyed(&'a Map<String, Value>),
    Ordered(&'a [Value]),
}

impl<'a> Shape<'a> {
    pub fn of(value: &'a Value) -> Self {
        match value {
            Value::Object(map) => Shape::Keyed(map),
            Value::Array(items) => Shape::Ordered(items),
            other => Shape::Scalar(other),
        }
    }

    pub fn is_collection(&self) -> bool {
        !matches!(self, Shape::Scalar(_))
    }

    /// Number of children, `None` for scalars.
    pub fn len(&self) -> Option<usize> {
        match self {
            Shape::Scalar(_) => None,
            Shape::Keyed(map) => Some(map.len()),
            Shape::Ordered(items) => Some(items.len()),
        }
    }

    pub fn get(&self, step: &PathStep) -> Result<Option<&'a Value>, AccessError> {
        match *self {
            Shape::Scalar(value) => Err(AccessError::not_collection(step, value)),
            Shape::Keyed(map) => Ok(map.get(key_text(step).as_ref())),
            Shape::Ordered(items) => Ok(step.as_index().and_then(|idx| items.get(idx))),
        }
    }

    pub fn has(&self, step: &PathStep) -> Result<bool, AccessError> {
        self.get(step).map(|child| child.is_some())
    }

    /// Children in enumeration order: insertion order for keyed
    /// collections, index order for ordered ones. Scalars have none.
    pub fn entries(&self) -> Vec<(PathStep, &'a Value)> {
        match *self {
            Shape::Scalar(_) => Vec::new(),
            Shape::Keyed(map) => map
                .iter()
                .map(|(key, child)| (PathStep::Key(key.clone()), child))
                .collect(),
            Shape::Ordered(items) => items
                .iter()
                .enumerate()
                .map(|(idx, child)| (PathStep::Index(idx), child))
                .collect(),
        }
    }

    /// A fresh value of the same shape holding the same children.
    ///
    /// `Value` owns its children, so they are copied along with the
    /// collection.
    pub fn shallow_clone(&self) -> Value {
        match *self {
            Shape::Scalar(value) => value.clone(),
            Shape::Keyed(map) => Value::Object(map.clone()),
            Shape::Ordered(items) => Value::Array(items.to_vec()),
        }
    }
}

// ── Exclusive access ──────────────────────────────────────────────────────

/// Mutable view of a value classified by shape. Operations edit in place.
#[derive(Debug)]
pub enum ShapeMut<'a> {
    Scalar(&'a mut Value),
    Keyed(&'a mut Map<String, Value>),
    Ordered(&'a mut Vec<Value>),
}

impl<'a> ShapeMut<'a> {
    pub fn of(value: &'a mut Value) -> Self {
        match value {
            Value::Object(map) => ShapeMut::Keyed(map),
            Value::Array(items) => ShapeMut::Ordered(items),
            other => ShapeMut::Scalar(other),
        }
    }

    pub fn into_child(self, step: &PathStep) -> Result<Option<&'a mut Value>, AccessError> {
        match self {
            ShapeMut::Scalar(value) => Err(AccessError::not_collection(step, value)),
            ShapeMut::Keyed(map) => Ok(map.get_mut(key_text(step).as_ref())),
            ShapeMut::Ordered(items) => Ok(step.as_index().and_then(move |idx| items.get_mut(idx))),
        }
    }

    /// Assigns `value` under `step`, returning what was there before.
    ///
    /// On an ordered collection the index may be at most the length; an
    /// index equal to the length appends.
    pub fn set(self, step: &PathStep, value: Value) -> Result<Option<Value>, AccessError> {
        match self {
            ShapeMut::Scalar(scalar) => Err(AccessError::not_collection(step, scalar)),
            ShapeMut::Keyed(map) => Ok(map.insert(key_text(step).into_owned(), value)),
            ShapeMut::Ordered(items) => {
                let idx = require_index(step)?;
                let len = items.len();
                if idx < len {
                    Ok(Some(std::mem::replace(&mut items[idx], value)))
                } else if idx == len {
                    items.push(value);
                    Ok(None)
                } else {
                    Err(AccessError::OutOfBounds { index: idx, len })
                }
            }
        }
    }

    /// Inserts `value` under `step`, shifting later elements of an ordered
    /// collection up by one. Keyed collections behave like [`ShapeMut::set`].
    pub fn insert(self, step: &PathStep, value: Value) -> Result<(), AccessError> {
        match self {
            ShapeMut::Ordered(items) => {
                let idx = require_index(step)?;
                if idx > items.len() {
                    return Err(AccessError::OutOfBounds {
                        index: idx,
                        len: items.len(),
                    });
                }
                items.insert(idx, value);
                Ok(())
            }
            other => other.set(step, value).map(|_| ()),
        }
    }

    /// Removes the child under `step`, shifting later elements of an
    /// ordered collection down. Keyed collections keep their remaining
    /// insertion order.
    pub fn remove(self, step: &PathStep) -> Result<Option<Value>, AccessError> {
        match self {
            ShapeMut::Scalar(scalar) => Err(AccessError::not_collection(step, scalar)),
            ShapeMut::Keyed(map) => Ok(map.shift_remove(key_text(step).as_ref())),
            ShapeMut::Ordered(items) => {
                let idx = require_index(step)?;
                if idx < items.len() {
                    Ok(Some(items.remove(idx)))
                } else {
                    Ok(None)
                }
            }
        }
    }
}
