//! Keeping two containers' histories in lockstep.
//!
//! # Overview
//!
//! [`sync`] registers a deriver on each container. Navigation on either
//! side (undo, redo, go) is replayed on the other side as navigation, so
//! both history positions move together. A plain commit on one side makes
//! the other side commit too: the optional derive function usually writes
//! a value derived from `a` into `b`, and a no-change write follows it, so
//! both journals grow by the same entries even when `b` ends up unchanged.
//!
//! Values only flow from `a` to `b`. Commits on `b` reach `a` as history
//! entries, never as values.

use tracing::warn;

use serde_json::Value;

use crate::error::{ConfigError, Error};
use crate::events::{CommitDetails, Subscription};
use crate::form::Dendriform;

/// The pair of registrations linking two containers.
#[derive(Debug)]
pub struct SyncBridge {
    forward: Subscription,
    backward: Subscription,
}

impl SyncBridge {
    /// Unlinks both sides. Idempotent.
    pub fn cancel(&self) {
        self.forward.cancel();
        self.backward.cancel();
    }

    pub fn is_active(&self) -> bool {
        self.forward.is_active() || self.backward.is_active()
    }
}

/// Links the histories of `a` and `b`, which must share a history capacity.
pub fn sync(a: &Dendriform, b: &Dendriform) -> Result<SyncBridge, Error> {
    link(a, b, None)
}

/// Like [`sync`], and runs `derive` with `a`'s value whenever `a` commits
/// without navigating.
///
/// ```
/// use dendriform::{sync_with, Dendriform, Options};
/// use serde_json::json;
///
/// let a = Dendriform::new(json!(1), Options::default().history(10)).unwrap();
/// let b = Dendriform::new(json!(null), Options::default().history(10)).unwrap();
/// let target = b.clone();
/// let _bridge = sync_with(&a, &b, move |value, _| {
///     let doubled = value.as_i64().unwrap_or_default() * 2;
///     target.set(doubled).unwrap();
/// })
/// .unwrap();
///
/// a.set(5).unwrap();
/// a.flush().unwrap();
/// assert_eq!(b.value().unwrap(), json!(10));
/// assert_eq!(b.history_len(), 1);
///
/// a.undo().unwrap();
/// assert_eq!(b.value().unwrap(), json!(2));
/// ```
pub fn sync_with(
    a: &Dendriform,
    b: &Dendriform,
    derive: impl FnMut(&Value, &CommitDetails) + 'static,
) -> Result<SyncBridge, Error> {
    link(a, b, Some(Box::new(derive)))
}

type Derive = Box<dyn FnMut(&Value, &CommitDetails)>;

fn link(a: &Dendriform, b: &Dendriform, mut derive: Option<Derive>) -> Result<SyncBridge, Error> {
    let (left, right) = (a.history_capacity(), b.history_capacity());
    if left != right {
        return Err(ConfigError::HistoryMismatch { left, right }.into());
    }

    let target = b.downgrade();
    let forward = a.on_derive(move |value, details| {
        let Some(b) = target.upgrade() else {
            return;
        };
        if details.go != 0 {
            report(b.go(details.go), "replaying navigation");
            return;
        }
        b.replace(details.replace);
        if let Some(derive) = derive.as_mut() {
            derive(value, details);
        }
        // Coalesces with whatever the derive function committed, and keeps
        // the entry when it changed nothing.
        report(b.no_change(), "recording commit");
    })?;

    let source = a.downgrade();
    let backward = b.on_derive(move |_, details| {
        let Some(a) = source.upgrade() else {
            return;
        };
        if details.go != 0 {
            report(a.go(details.go), "replaying navigation");
            return;
        }
        if details.replace {
            a.replace(true);
        }
        report(a.no_change(), "recording commit");
    });
    let backward = match backward {
        Ok(backward) => backward,
        Err(err) => {
            forward.cancel();
            return Err(err);
        }
    };

    Ok(SyncBridge { forward, backward })
}

fn report(result: Result<(), Error>, action: &str) {
    if let Err(err) = result {
        warn!(%err, action, "synced container rejected update");
    }
}
