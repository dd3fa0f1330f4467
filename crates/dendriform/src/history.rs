//! The history journal: undo/redo over recorded deltas.
//!
//! # Overview
//!
//! The journal keeps one [`Delta`] per history entry and a position in
//! `0..=len`. Entries before the position have been applied; entries at or
//! after it form the redo stack. The value at position 0 is the baseline,
//! which is never stored: the container's current value, rewound by every
//! applied entry's inverse patches, is the baseline.
//!
//! Pushing discards the redo stack, then appends and advances. Past the
//! capacity the oldest entry is dropped and the position moves down with
//! it, so the current value is unaffected. Merging folds a delta into the
//! entry just before the position; at position 0 there is no such entry and
//! the delta becomes part of the baseline.

use std::collections::VecDeque;

use dendriform_patch::{Delta, Patch};

/// `{can_undo, can_redo}` snapshot handed out behind an `Rc` that is only
/// replaced when a flag changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryState {
    pub can_undo: bool,
    pub can_redo: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recorded {
    Appended,
    /// Appended and the oldest entry was dropped.
    Evicted,
    Merged,
    /// Absorbed into the baseline at position 0.
    Folded,
}

#[derive(Debug)]
pub(crate) struct HistoryJournal {
    items: VecDeque<Delta>,
    position: usize,
    capacity: usize,
}

impl HistoryJournal {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(64)),
            position: 0,
            capacity,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn state(&self) -> HistoryState {
        HistoryState {
            can_undo: self.position > 0,
            can_redo: self.position < self.items.len(),
        }
    }

    pub(crate) fn record(&mut self, delta: Delta, replace: bool) -> Recorded {
        if replace {
            self.merge(delta)
        } else {
            self.push(delta)
        }
    }

    pub(crate) fn push(&mut self, delta: Delta) -> Recorded {
        self.items.truncate(self.position);
        self.items.push_back(delta);
        self.position += 1;
        if self.items.len() > self.capacity {
            self.items.pop_front();
            self.position -= 1;
            return Recorded::Evicted;
        }
        Recorded::Appended
    }

    pub(crate) fn merge(&mut self, delta: Delta) -> Recorded {
        match self.position.checked_sub(1).and_then(|idx| self.items.get_mut(idx)) {
            Some(entry) => {
                entry.merge(delta);
                Recorded::Merged
            }
            None => Recorded::Folded,
        }
    }

    /// Moves the position by `delta`, clamped to `0..=len`.
    ///
    /// Returns the applied step count and the patches that carry the value
    /// across, or `None` when the clamped move is empty.
    pub(crate) fn go(&mut self, delta: isize) -> Option<(isize, Vec<Patch>)> {
        let from = self.position;
        let target = from.saturating_add_signed(delta).min(self.items.len());
        if target == from {
            return None;
        }
        let patches: Vec<Patch> = if target < from {
            self.items
                .range(target..from)
                .rev()
                .flat_map(|entry| entry.undo.iter().cloned())
                .collect()
        } else {
            self.items
                .range(from..target)
                .flat_map(|entry| entry.redo.iter().cloned())
                .collect()
        };
        self.position = target;
        Some((target as isize - from as isize, patches))
    }
}
