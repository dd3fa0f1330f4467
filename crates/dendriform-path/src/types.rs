use std::fmt;

use serde::{Deserialize, Serialize};

/// One step of a [`Path`]: a map key or a sequence index.
///
/// Serializes as a bare JSON string or number, so a path renders as
/// `["foo", 0]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

/// A sequence of steps from the root of a value tree.
pub type Path = Vec<PathStep>;

impl PathStep {
    /// The step read as a sequence index, if it can be one.
    ///
    /// Keys qualify when they are canonical decimal integers (`"0"`, `"12"`,
    /// not `"01"`).
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathStep::Index(idx) => Some(*idx),
            PathStep::Key(key) => index_of_token(key),
        }
    }

    /// Numeric keys become indices, so `"0"` and `0` name the same step.
    pub fn canonical(self) -> PathStep {
        match self {
            PathStep::Key(key) => match index_of_token(&key) {
                Some(idx) => PathStep::Index(idx),
                None => PathStep::Key(key),
            },
            index => index,
        }
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Key(key) => f.write_str(key),
            PathStep::Index(idx) => write!(f, "{idx}"),
        }
    }
}

impl From<&str> for PathStep {
    fn from(key: &str) -> Self {
        PathStep::Key(key.to_string())
    }
}

impl From<String> for PathStep {
    fn from(key: String) -> Self {
        PathStep::Key(key)
    }
}

impl From<usize> for PathStep {
    fn from(idx: usize) -> Self {
        PathStep::Index(idx)
    }
}

pub(crate) fn index_of_token(token: &str) -> Option<usize> {
    let bytes = token.as_bytes();
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    if bytes.len() > 1 && bytes[0] == b'0' {
        return None;
    }
    token.parse().ok()
}
