//! The node registry: one stable identity per addressed path.
//!
//! # Overview
//!
//! Branch handles never own tree data. A handle holds an `Rc<NodeKey>`,
//! the registry holds a `Weak` to the same key, so resolving a path that is
//! already registered hands back the very same key. [`NodeId`]s are never
//! reused, which makes handle identity a plain integer comparison.
//!
//! Each node also carries its traversal-order id: its position in a
//! pre-order walk of the tree (parent before children, siblings in
//! enumeration order). Structural changes mark the registry dirty, and the
//! next [`NodeRegistry::renumber`] walk refreshes every reachable node.
//! Nodes whose path stops resolving keep their last value as an orphan
//! snapshot; they are dropped once no handle refers to them.
//!
//! Array elements are tracked through inserts and removals: the nodes of
//! later siblings are re-keyed to their new indices, and a removed
//! element's node is detached from the registry for good, keeping its last
//! value.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde_json::Value;

use dendriform_path::{get_in, is_prefix, Path, PathStep, Shape};

/// Identity of a registered node. Unique for the lifetime of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

/// The shared key a handle holds for its node.
#[derive(Debug)]
pub(crate) struct NodeKey {
    pub(crate) id: NodeId,
    path: RefCell<Path>,
    /// Last value of a removed array element.
    detached: RefCell<Option<Value>>,
}

impl NodeKey {
    fn new(id: NodeId, path: &[PathStep]) -> Self {
        Self {
            id,
            path: RefCell::new(path.to_vec()),
            detached: RefCell::new(None),
        }
    }

    /// Where the node currently sits in the tree.
    pub(crate) fn path(&self) -> Path {
        self.path.borrow().clone()
    }

    pub(crate) fn detached(&self) -> Option<Value> {
        self.detached.borrow().clone()
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.detached.borrow().is_some()
    }
}

#[derive(Debug)]
struct NodeEntry {
    id: NodeId,
    order: Option<usize>,
    orphan: Option<Value>,
    seen: u64,
    key: Weak<NodeKey>,
}

#[derive(Debug, Default)]
pub(crate) struct NodeRegistry {
    entries: IndexMap<Path, NodeEntry>,
    next_id: u64,
    epoch: u64,
    dirty: bool,
}

impl NodeRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// The key for `path`, registering the path on first use. Paths are
    /// expected in canonical form (see [`PathStep::canonical`]).
    pub(crate) fn resolve(&mut self, path: &[PathStep], tree: &Value) -> Rc<NodeKey> {
        if let Some(entry) = self.entries.get_mut(path) {
            if let Some(key) = entry.key.upgrade() {
                return key;
            }
            let key = Rc::new(NodeKey::new(entry.id, path));
            entry.key = Rc::downgrade(&key);
            return key;
        }

        let id = NodeId(self.next_id);
        self.next_id += 1;
        let key = Rc::new(NodeKey::new(id, path));
        let order = if self.dirty { None } else { order_of(tree, path) };
        self.entries.insert(
            path.to_vec(),
            NodeEntry {
                id,
                order,
                orphan: None,
                seen: self.epoch,
                key: Rc::downgrade(&key),
            },
        );
        key
    }

    /// Traversal-order id of the node at `path`, renumbering first if the
    /// tree changed shape since the last walk.
    pub(crate) fn order(&mut self, path: &[PathStep], tree: &Value) -> Option<usize> {
        if self.dirty {
            self.renumber(tree);
        }
        self.entries.get(path).and_then(|entry| entry.order)
    }

    pub(crate) fn orphan(&self, path: &[PathStep]) -> Option<&Value> {
        self.entries.get(path).and_then(|entry| entry.orphan.as_ref())
    }

    /// Snapshots the current values of registered nodes under `under`,
    /// ahead of a structural change there.
    pub(crate) fn capture(&self, under: &[PathStep], tree: &Value) -> Vec<(Path, Value)> {
        let under: Path = under.iter().cloned().map(PathStep::canonical).collect();
        self.entries
            .keys()
            .filter(|path| is_prefix(&under, path))
            .filter_map(|path| match get_in(tree, path) {
                Ok(Some(value)) => Some((path.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Keeps the snapshots of captured nodes that no longer resolve.
    pub(crate) fn release(&mut self, captured: Vec<(Path, Value)>, tree: &Value) {
        for (path, value) in captured {
            if matches!(get_in(tree, &path), Ok(Some(_))) {
                continue;
            }
            if let Some(entry) = self.entries.get_mut(&path) {
                entry.orphan = Some(value);
            }
        }
    }

    /// Re-keys the nodes at and after `index` in the array at `parent`, ahead
    /// of an element being inserted there (`inserted`) or removed from there.
    /// A removed element's nodes are detached with their values in `before`.
    pub(crate) fn shift(&mut self, parent: &[PathStep], index: usize, inserted: bool, before: &Value) {
        let depth = parent.len();
        let moved: Vec<Path> = self
            .entries
            .keys()
            .filter(|path| {
                path.len() > depth
                    && is_prefix(parent, path)
                    && path[depth].as_index().is_some_and(|idx| idx >= index)
            })
            .cloned()
            .collect();
        if moved.is_empty() {
            return;
        }

        let taken: Vec<(Path, NodeEntry)> = moved
            .iter()
            .filter_map(|path| self.entries.swap_remove_full(path))
            .map(|(_, path, entry)| (path, entry))
            .collect();
        let mut detached = 0;
        for (mut path, entry) in taken {
            let idx = path[depth].as_index().unwrap_or(index);
            let key = entry.key.upgrade();
            if inserted {
                path[depth] = PathStep::Index(idx + 1);
            } else if idx == index {
                if let Some(key) = key {
                    let last = match get_in(before, &path) {
                        Ok(Some(value)) => value.clone(),
                        _ => entry.orphan.clone().unwrap_or(Value::Null),
                    };
                    *key.detached.borrow_mut() = Some(last);
                }
                detached += 1;
                continue;
            } else {
                path[depth] = PathStep::Index(idx - 1);
            }
            if let Some(key) = key {
                *key.path.borrow_mut() = path.clone();
            }
            self.entries.insert(path, entry);
        }
        self.dirty = true;
        tracing::trace!(index, inserted, detached, "re-keyed array elements");
    }

    /// Recomputes traversal-order ids for every node reachable in `tree`.
    ///
    /// Unreachable nodes lose their id, and are removed once no handle
    /// refers to them.
    pub(crate) fn renumber(&mut self, tree: &Value) {
        self.epoch += 1;
        let mut counter = 0;
        let mut path = Vec::new();
        walk(tree, &mut path, &mut counter, self.epoch, &mut self.entries);

        let epoch = self.epoch;
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            if entry.seen == epoch {
                return true;
            }
            entry.order = None;
            entry.key.strong_count() > 0
        });
        self.dirty = false;
        tracing::debug!(
            nodes = self.entries.len(),
            pruned = before - self.entries.len(),
            positions = counter,
            "renumbered node registry"
        );
    }
}

fn walk(
    value: &Value,
    path: &mut Path,
    counter: &mut usize,
    epoch: u64,
    entries: &mut IndexMap<Path, NodeEntry>,
) {
    if let Some(entry) = entries.get_mut(path.as_slice()) {
        entry.order = Some(*counter);
        entry.orphan = None;
        entry.seen = epoch;
    }
    *counter += 1;
    for (step, child) in Shape::of(value).entries() {
        path.push(step.canonical());
        walk(child, path, counter, epoch, entries);
        path.pop();
    }
}

fn subtree_size(value: &Value) -> usize {
    1 + Shape::of(value)
        .entries()
        .into_iter()
        .map(|(_, child)| subtree_size(child))
        .sum::<usize>()
}

/// Pre-order position of `path` in `tree`, without walking the whole tree.
fn order_of(tree: &Value, path: &[PathStep]) -> Option<usize> {
    let mut order = 0;
    let mut cur = tree;
    for step in path {
        order += 1;
        let mut found = None;
        for (key, child) in Shape::of(cur).entries() {
            if key.canonical() == *step {
                found = Some(child);
                break;
            }
            order += subtree_size(child);
        }
        cur = found?;
    }
    Some(order)
}
