//! Callback registries and their cancellation handles.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use serde::Serialize;
use serde_json::Value;

use dendriform_patch::Patch;
use dendriform_path::Path;

use crate::engine::Core;
use crate::nodes::NodeKey;

/// Why a commit happened, delivered to derivers and change listeners.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommitDetails {
    /// Net history steps taken: negative for undo, positive for redo, `0`
    /// for plain writes.
    pub go: isize,
    /// The commit overwrote the latest history entry instead of adding one.
    pub replace: bool,
    /// Forward patches applied, in order.
    pub patches: Vec<Patch>,
}

pub type Callback = dyn FnMut(&Value, &CommitDetails);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Channel {
    Derive,
    Change,
}

/// A registered callback together with the node it observes.
#[derive(Clone)]
pub(crate) struct Registration {
    pub(crate) id: u64,
    pub(crate) node: Rc<NodeKey>,
    /// Where the node sat when change listeners last ran.
    pub(crate) seen_at: Rc<RefCell<Path>>,
    pub(crate) callback: Rc<RefCell<Box<Callback>>>,
    pub(crate) live: Rc<Cell<bool>>,
}

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    entries: BTreeMap<u64, Registration>,
}

impl Listeners {
    pub(crate) fn add(&mut self, node: Rc<NodeKey>, callback: Box<Callback>) -> Registration {
        let id = self.next_id;
        self.next_id += 1;
        let registration = Registration {
            id,
            seen_at: Rc::new(RefCell::new(node.path())),
            node,
            callback: Rc::new(RefCell::new(callback)),
            live: Rc::new(Cell::new(true)),
        };
        self.entries.insert(id, registration.clone());
        registration
    }

    pub(crate) fn remove(&mut self, id: u64) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Marks every node's current path as seen.
    pub(crate) fn rebase(&self) {
        for entry in self.entries.values() {
            *entry.seen_at.borrow_mut() = entry.node.path();
        }
    }

    /// Live registrations in registration order.
    pub(crate) fn snapshot(&mut self) -> Vec<Registration> {
        self.entries.retain(|_, entry| entry.live.get());
        self.entries.values().cloned().collect()
    }
}

/// Cancellation handle returned by [`on_derive`](crate::Dendriform::on_derive)
/// and [`on_change`](crate::Dendriform::on_change).
///
/// Dropping a subscription does not cancel it.
pub struct Subscription {
    core: Weak<RefCell<Core>>,
    channel: Channel,
    id: u64,
    live: Rc<Cell<bool>>,
}

impl Subscription {
    pub(crate) fn new(core: Weak<RefCell<Core>>, channel: Channel, registration: &Registration) -> Self {
        Self {
            core,
            channel,
            id: registration.id,
            live: registration.live.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.live.get()
    }

    /// Stops future invocations. Idempotent, and a no-op once the container
    /// is gone.
    pub fn cancel(&self) {
        if !self.live.replace(false) {
            return;
        }
        let Some(core) = self.core.upgrade() else {
            return;
        };
        // While the container is mid-commit the flag alone suffices: dead
        // registrations are skipped and swept on the next snapshot.
        if let Ok(mut core) = core.try_borrow_mut() {
            match self.channel {
                Channel::Derive => core.derivers.remove(self.id),
                Channel::Change => core.listeners.remove(self.id),
            };
        };
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
