use dendriform_patch::PatchError;
use dendriform_path::AccessError;
use thiserror::Error;

/// Every failure the engine reports. All of them are returned from the call
/// that caused them.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("patch apply failed: {0}")]
    Patch(PatchError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("changes did not settle after {rounds} rounds")]
    SettleLimit { rounds: usize },
}

impl From<PatchError> for Error {
    fn from(err: PatchError) -> Self {
        match err {
            PatchError::Access(access) => Error::Access(access),
            other => Error::Patch(other),
        }
    }
}

/// An operation called on a branch it is not defined for.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("index() can only be called on array element branches, can't be called at path \"{pointer}\"")]
    NotAnElement { pointer: String },
    #[error("branch_all() can only be called on branches containing arrays, can't be called at path \"{pointer}\"")]
    NotOrdered { pointer: String },
    #[error("set_parent() can't be called on the root branch")]
    NoParent,
    #[error("the array element last at path \"{pointer}\" was removed")]
    Removed { pointer: String },
}

/// Invalid construction options or cross-container linkage.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("sync() forms must have the same maximum number of history items configured ({left} vs {right})")]
    HistoryMismatch { left: usize, right: usize },
    #[error("invalid option `{name}`: {reason}")]
    InvalidOption { name: &'static str, reason: String },
}
