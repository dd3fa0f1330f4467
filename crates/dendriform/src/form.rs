//! Branch handles.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;

use dendriform_path::{format_pointer, get_in, split_last, Path, PathStep, Shape};

use crate::engine::{self, Core, Shared};
use crate::error::{DomainError, Error};
use crate::events::{CommitDetails, Subscription};
use crate::history::HistoryState;
use crate::nodes::{NodeId, NodeKey};
use crate::options::Options;
use crate::scheduler::{self, Schedule};

/// What a write does to the branch it is issued on.
pub enum Mutation {
    /// Replace the branch value.
    Value(Value),
    /// Edit a draft of the branch value in place. A draft of a missing
    /// branch starts as `null`.
    Produce(Box<dyn FnOnce(&mut Value)>),
    /// Change nothing, but still commit: history gains an entry and
    /// derivers and change listeners run.
    NoChange,
}

impl From<Value> for Mutation {
    fn from(value: Value) -> Self {
        Mutation::Value(value)
    }
}

impl fmt::Debug for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Mutation::Produce(_) => f.write_str("Produce(..)"),
            Mutation::NoChange => f.write_str("NoChange"),
        }
    }
}

/// A handle on one branch of a container.
///
/// Cloning is cheap and every clone addresses the same node. Handles for
/// equal paths compare equal, and keep doing so across commits. A handle on
/// an array element follows that element when earlier siblings are inserted
/// or removed.
///
/// ```
/// use dendriform::{Dendriform, Options};
/// use serde_json::json;
///
/// let form = Dendriform::new(json!({"name": "Ada"}), Options::default()).unwrap();
/// let name = form.branch("name");
/// name.set("Grace").unwrap();
/// form.flush().unwrap();
/// assert_eq!(form.value().unwrap(), json!({"name": "Grace"}));
/// assert_eq!(name, form.branch("name"));
/// ```
#[derive(Clone)]
pub struct Dendriform {
    core: Shared,
    node: Rc<NodeKey>,
}

impl Dendriform {
    /// Creates a container on this thread's default task queue.
    pub fn new(value: Value, options: Options) -> Result<Self, Error> {
        Self::with_scheduler(value, options, scheduler::current())
    }

    pub fn with_scheduler(
        value: Value,
        options: Options,
        scheduler: Rc<dyn Schedule>,
    ) -> Result<Self, Error> {
        let core = Rc::new(RefCell::new(Core::new(value, options, scheduler)?));
        tracing::debug!(history = core.borrow().options.history, "container created");
        Ok(Self::at(core, &[]))
    }

    fn at(core: Shared, path: &[PathStep]) -> Self {
        let node = core.borrow_mut().resolve(path);
        Self { core, node }
    }

    // ── Branches ──────────────────────────────────────────────────────────

    pub fn branch(&self, step: impl Into<PathStep>) -> Dendriform {
        self.branch_in([step])
    }

    /// The branch `steps` below this one.
    pub fn branch_in<I, S>(&self, steps: I) -> Dendriform
    where
        I: IntoIterator<Item = S>,
        S: Into<PathStep>,
    {
        let mut path = self.node.path();
        path.extend(steps.into_iter().map(|step| step.into().canonical()));
        Self::at(self.core.clone(), &path)
    }

    /// One branch per element of the array at this branch.
    pub fn branch_all(&self) -> Result<Vec<Dendriform>, Error> {
        let len = match self.value()? {
            Value::Array(items) => items.len(),
            _ => {
                return Err(DomainError::NotOrdered {
                    pointer: format_pointer(&self.path()),
                }
                .into())
            }
        };
        Ok((0..len).map(|idx| self.branch(idx)).collect())
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    /// The current value at this branch. Missing branches read as `null`,
    /// and a branch whose element was removed keeps its last value.
    pub fn value(&self) -> Result<Value, Error> {
        self.core.borrow().read(&self.node)
    }

    pub fn read(&self) -> Result<(Value, Path), Error> {
        Ok((self.value()?, self.node.path()))
    }

    /// Where this branch currently sits. For a removed element, where it
    /// last was.
    pub fn path(&self) -> Path {
        self.node.path()
    }

    /// Position of this branch in a pre-order walk of the current tree.
    ///
    /// `None` while the branch does not resolve: a registered path with no
    /// value yet, an orphan that keeps its last value, or a removed element.
    pub fn id(&self) -> Option<usize> {
        self.core.borrow_mut().order(&self.node)
    }

    pub fn node_id(&self) -> NodeId {
        self.node.id
    }

    /// This branch's index within its parent array.
    pub fn index(&self) -> Result<usize, Error> {
        let path = self.attached_path()?;
        let not_an_element = || {
            Error::from(DomainError::NotAnElement {
                pointer: format_pointer(&path),
            })
        };
        let (parent, last) = split_last(&path).ok_or_else(not_an_element)?;
        let core = self.core.borrow();
        match get_in(&core.value, parent) {
            Ok(Some(parent)) if matches!(Shape::of(parent), Shape::Ordered(_)) => {
                last.as_index().ok_or_else(not_an_element)
            }
            _ => Err(not_an_element()),
        }
    }

    // ── Writes ────────────────────────────────────────────────────────────

    /// Queues a write. Removed elements reject writes.
    pub fn write(&self, mutation: impl Into<Mutation>) -> Result<(), Error> {
        let path = self.attached_path()?;
        engine::write(&self.core, &path, mutation.into())
    }

    pub fn set(&self, value: impl Into<Value>) -> Result<(), Error> {
        self.write(Mutation::Value(value.into()))
    }

    pub fn produce(&self, produce: impl FnOnce(&mut Value) + 'static) -> Result<(), Error> {
        self.write(Mutation::Produce(Box::new(produce)))
    }

    pub fn no_change(&self) -> Result<(), Error> {
        self.write(Mutation::NoChange)
    }

    /// Writes the parent branch with a value computed from this branch's key.
    pub fn set_parent(&self, compute: impl FnOnce(&PathStep) -> Value) -> Result<(), Error> {
        let path = self.attached_path()?;
        let (parent, last) = split_last(&path).ok_or(DomainError::NoParent)?;
        engine::write(&self.core, parent, Mutation::Value(compute(last)))
    }

    fn attached_path(&self) -> Result<Path, Error> {
        let path = self.node.path();
        if self.node.is_detached() {
            return Err(DomainError::Removed {
                pointer: format_pointer(&path),
            }
            .into());
        }
        Ok(path)
    }

    /// Commits pending writes and notifies change listeners.
    pub fn flush(&self) -> Result<(), Error> {
        engine::flush(&self.core)
    }

    // ── History ───────────────────────────────────────────────────────────

    pub fn undo(&self) -> Result<(), Error> {
        self.go(-1)
    }

    pub fn redo(&self) -> Result<(), Error> {
        self.go(1)
    }

    /// Moves `delta` steps through history, clamped to what exists.
    pub fn go(&self, delta: isize) -> Result<(), Error> {
        if delta == 0 {
            return Ok(());
        }
        engine::go(&self.core, delta)
    }

    /// Commits pending writes and makes the next commit start a new entry.
    pub fn done(&self) -> Result<(), Error> {
        engine::done(&self.core)
    }

    /// Whether the next commit overwrites the latest history entry.
    pub fn replace(&self, replace: bool) {
        self.core.borrow_mut().set_replace(replace);
    }

    pub fn history(&self) -> Rc<HistoryState> {
        self.core.borrow().state.clone()
    }

    pub fn history_len(&self) -> usize {
        self.core.borrow().history.as_ref().map_or(0, |h| h.len())
    }

    pub fn history_position(&self) -> usize {
        self.core.borrow().history.as_ref().map_or(0, |h| h.position())
    }

    pub fn history_capacity(&self) -> usize {
        self.core.borrow().history.as_ref().map_or(0, |h| h.capacity())
    }

    // ── Callbacks ─────────────────────────────────────────────────────────

    /// Registers a deriver and runs it once right away. It then runs after
    /// every commit with this branch's value.
    pub fn on_derive(
        &self,
        callback: impl FnMut(&Value, &CommitDetails) + 'static,
    ) -> Result<Subscription, Error> {
        engine::subscribe_derive(&self.core, self.node.clone(), Box::new(callback))
    }

    /// Registers a listener that runs once per flush that changed this
    /// branch.
    pub fn on_change(&self, callback: impl FnMut(&Value, &CommitDetails) + 'static) -> Subscription {
        engine::subscribe_change(&self.core, self.node.clone(), Box::new(callback))
    }

    pub fn downgrade(&self) -> WeakDendriform {
        WeakDendriform {
            core: Rc::downgrade(&self.core),
            node: self.node.clone(),
        }
    }
}

impl PartialEq for Dendriform {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core) && self.node.id == other.node.id
    }
}

impl Eq for Dendriform {}

impl fmt::Debug for Dendriform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dendriform")
            .field("path", &format_pointer(&self.node.path()))
            .field("node", &self.node.id)
            .finish()
    }
}

/// A handle that does not keep its container alive.
#[derive(Clone)]
pub struct WeakDendriform {
    core: Weak<RefCell<Core>>,
    node: Rc<NodeKey>,
}

impl WeakDendriform {
    pub fn upgrade(&self) -> Option<Dendriform> {
        let core = self.core.upgrade()?;
        Some(Dendriform {
            core,
            node: self.node.clone(),
        })
    }
}

impl fmt::Debug for WeakDendriform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakDendriform")
            .field("path", &format_pointer(&self.node.path()))
            .field("alive", &(self.core.strong_count() > 0))
            .finish()
    }
}
