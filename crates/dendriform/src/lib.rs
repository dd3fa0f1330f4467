//! Incremental state container for nested JSON values.
//!
//! A container holds one [`serde_json::Value`] tree. [`Dendriform`] handles
//! address branches of it by path: they read, write, navigate history and
//! register callbacks. Writes are batched into commits, commits are
//! recorded as patch pairs for undo and redo, and derivers recompute
//! dependent parts of the tree after every commit.
//!
//! # Example
//!
//! ```
//! use dendriform::{Dendriform, Options};
//! use serde_json::{json, Value};
//!
//! let form = Dendriform::new(json!({"name": "Ada", "letters": 0}), Options::default().history(100)).unwrap();
//!
//! let letters = form.branch("letters");
//! form.branch("name")
//!     .on_derive(move |name, _| {
//!         let len = name.as_str().map_or(0, str::len);
//!         letters.set(len).unwrap();
//!     })
//!     .unwrap();
//! assert_eq!(form.branch("letters").value().unwrap(), json!(3));
//!
//! form.branch("name").set("Grace").unwrap();
//! form.flush().unwrap();
//! assert_eq!(form.value().unwrap(), json!({"name": "Grace", "letters": 5}));
//!
//! form.undo().unwrap();
//! assert_eq!(form.branch("letters").value().unwrap(), Value::from(3));
//! ```
//!
//! Without an explicit [`Dendriform::flush`], pending writes are committed
//! by a task queued on the thread's [`TaskQueue`]; run it with [`tick`].

mod engine;
mod error;
mod events;
mod form;
mod history;
mod nodes;
mod options;
mod scheduler;
mod sync;

pub use dendriform_patch::Patch;
pub use dendriform_path::{format_pointer, parse_pointer, Path, PathStep};

pub use crate::error::{ConfigError, DomainError, Error};
pub use crate::events::{Callback, CommitDetails, Subscription};
pub use crate::form::{Dendriform, Mutation, WeakDendriform};
pub use crate::history::HistoryState;
pub use crate::nodes::NodeId;
pub use crate::options::{Options, DEFAULT_MAX_SETTLE_ROUNDS};
pub use crate::scheduler::{tick, Schedule, Task, TaskQueue};
pub use crate::sync::{sync, sync_with, SyncBridge};
