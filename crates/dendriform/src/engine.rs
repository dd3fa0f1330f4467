//! Container state and the commit pipeline.
//!
//! # Overview
//!
//! One [`Core`] sits behind every container, shared by all of its branch
//! handles. A write flows through it like this:
//!
//! 1. The mutation is diffed against the working tree and applied at once,
//!    so reads see it and access errors surface from the write call. Its
//!    [`Delta`] joins the pending delta.
//! 2. A flush (explicit, or queued on the container's scheduler) turns the
//!    pending delta into one commit, recorded in the history journal.
//! 3. The commit starts a derive round: every deriver runs once, in
//!    registration order. Their writes to this container join the round;
//!    their writes to other containers commit immediately without starting
//!    rounds there.
//! 4. Change listeners fire once the flush has settled.
//!
//! A thread-local settle depth tracks whether any derive round is on the
//! stack. Only commits started outside a round run derivers, so two
//! containers that derive from each other cannot recurse.

use std::cell::RefCell;
use std::mem;
use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::{debug, trace, warn};

use dendriform_patch::{apply, apply_patch, Delta, Patch};
use dendriform_path::{get_in, split_last, Path, PathStep};

use crate::error::Error;
use crate::events::{Callback, Channel, CommitDetails, Listeners, Registration, Subscription};
use crate::form::Mutation;
use crate::history::{HistoryJournal, HistoryState};
use crate::nodes::{NodeKey, NodeRegistry};
use crate::options::Options;
use crate::scheduler::Schedule;

pub(crate) type Shared = Rc<RefCell<Core>>;

// ── Settle context ────────────────────────────────────────────────────────

#[derive(Default)]
struct Settle {
    depth: usize,
    touched: Vec<Weak<RefCell<Core>>>,
}

thread_local! {
    static SETTLE: RefCell<Settle> = RefCell::new(Settle::default());
}

pub(crate) fn settling() -> bool {
    SETTLE.with(|settle| settle.borrow().depth > 0)
}

fn touch(shared: &Shared) {
    SETTLE.with(|settle| settle.borrow_mut().touched.push(Rc::downgrade(shared)));
}

/// Holds the settle depth up for the duration of a derive round. Leaving
/// the outermost round ends coalescing on every container written to.
struct SettleGuard;

impl SettleGuard {
    fn enter() -> Self {
        SETTLE.with(|settle| settle.borrow_mut().depth += 1);
        SettleGuard
    }
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        let touched = SETTLE.with(|settle| {
            let mut settle = settle.borrow_mut();
            settle.depth -= 1;
            if settle.depth == 0 {
                mem::take(&mut settle.touched)
            } else {
                Vec::new()
            }
        });
        for weak in touched {
            if let Some(shared) = weak.upgrade() {
                if let Ok(mut core) = shared.try_borrow_mut() {
                    core.coalesce = false;
                }
            }
        }
    }
}

// ── State ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Pending {
    delta: Delta,
    writes: usize,
    forced: bool,
}

impl Pending {
    fn is_empty(&self) -> bool {
        self.delta.is_empty() && !self.forced
    }
}

/// A derive round in progress.
struct Round {
    delta: Delta,
    details: CommitDetails,
    /// Registration rounds extend the baseline instead of notifying.
    silent: bool,
}

/// Changes committed since change listeners last ran.
#[derive(Default)]
struct Unnotified {
    patches: Vec<Patch>,
    go: isize,
    replace: bool,
    forced: bool,
}

impl Unnotified {
    fn is_clean(&self) -> bool {
        self.patches.is_empty() && self.go == 0 && !self.forced
    }
}

pub(crate) struct Core {
    pub(crate) value: Rc<Value>,
    pub(crate) options: Options,
    pub(crate) nodes: NodeRegistry,
    pub(crate) history: Option<HistoryJournal>,
    pub(crate) state: Rc<HistoryState>,
    pub(crate) derivers: Listeners,
    pub(crate) listeners: Listeners,
    pending: Pending,
    round: Option<Round>,
    unnotified: Unnotified,
    /// The value change listeners last saw. Only kept while someone listens.
    notified: Option<Rc<Value>>,
    replace: bool,
    coalesce: bool,
    scheduler: Rc<dyn Schedule>,
    flush_queued: bool,
}

impl Core {
    pub(crate) fn new(value: Value, options: Options, scheduler: Rc<dyn Schedule>) -> Result<Self, Error> {
        options.validate()?;
        let history = (options.history > 0).then(|| HistoryJournal::new(options.history));
        Ok(Self {
            value: Rc::new(value),
            nodes: NodeRegistry::new(),
            history,
            state: Rc::new(HistoryState::default()),
            derivers: Listeners::default(),
            listeners: Listeners::default(),
            pending: Pending::default(),
            round: None,
            unnotified: Unnotified::default(),
            notified: None,
            replace: options.replace,
            coalesce: false,
            options,
            scheduler,
            flush_queued: false,
        })
    }

    pub(crate) fn resolve(&mut self, path: &[PathStep]) -> Rc<NodeKey> {
        self.nodes.resolve(path, &self.value)
    }

    pub(crate) fn order(&mut self, node: &NodeKey) -> Option<usize> {
        if node.is_detached() {
            return None;
        }
        self.nodes.order(&node.path(), &self.value)
    }

    pub(crate) fn read(&self, node: &NodeKey) -> Result<Value, Error> {
        if let Some(last) = node.detached() {
            return Ok(last);
        }
        let path = node.path();
        match get_in(&self.value, &path) {
            Ok(Some(value)) => Ok(value.clone()),
            Ok(None) => Ok(self.nodes.orphan(&path).cloned().unwrap_or(Value::Null)),
            Err(err) => self.nodes.orphan(&path).cloned().ok_or(err.into()),
        }
    }

    pub(crate) fn set_replace(&mut self, replace: bool) {
        self.replace = replace;
    }

    fn in_round(&self) -> bool {
        self.round.is_some()
    }

    fn refresh_state(&mut self) {
        let next = self
            .history
            .as_ref()
            .map(HistoryJournal::state)
            .unwrap_or_default();
        if *self.state != next {
            self.state = Rc::new(next);
        }
    }

    fn refresh_nodes(&mut self) {
        if self.nodes.is_dirty() {
            self.nodes.renumber(&self.value);
        }
    }

    /// Applies patches to the working tree one at a time. Array element
    /// inserts and removals move the nodes of later siblings; other shape
    /// changes keep orphaned nodes' last values. Either flags the registry
    /// for renumbering.
    fn apply_tracked(&mut self, patches: &[Patch]) -> Result<(), Error> {
        for patch in patches {
            if let Some((parent, index, inserted)) = element_change(patch, &self.value) {
                self.nodes.shift(&parent, index, inserted, &self.value);
                apply_patch(Rc::make_mut(&mut self.value), patch)?;
                continue;
            }
            if !patch.is_structural(&self.value) {
                apply_patch(Rc::make_mut(&mut self.value), patch)?;
                continue;
            }
            let captured = if self.nodes.len() == 0 {
                Vec::new()
            } else {
                self.nodes.capture(patch.path(), &self.value)
            };
            apply_patch(Rc::make_mut(&mut self.value), patch)?;
            self.nodes.release(captured, &self.value);
            self.nodes.mark_dirty();
        }
        Ok(())
    }
}

/// The array, index and direction of a patch that inserts or removes an
/// element, when it does and the index is in range.
fn element_change(patch: &Patch, tree: &Value) -> Option<(Path, usize, bool)> {
    let inserted = match patch {
        Patch::Add { .. } => true,
        Patch::Remove { .. } => false,
        Patch::Replace { .. } => return None,
    };
    let (parent, last) = split_last(patch.path())?;
    let index = last.as_index()?;
    let Ok(Some(Value::Array(items))) = get_in(tree, parent) else {
        return None;
    };
    let in_range = if inserted { index <= items.len() } else { index < items.len() };
    in_range.then(|| (parent.iter().cloned().map(PathStep::canonical).collect(), index, inserted))
}

/// Whether a multi-write delta leaves the tree different from before it.
///
/// Rewinds a copy of the smallest subtree containing every patch.
fn net_change(value: &Value, delta: &Delta) -> bool {
    let mut parents = delta
        .redo
        .iter()
        .chain(&delta.undo)
        .map(|patch| split_last(patch.path()).map_or(&[][..], |(parent, _)| parent));
    let Some(first) = parents.next() else {
        return false;
    };
    let depth = parents.fold(first.len(), |depth, parent| {
        first[..depth]
            .iter()
            .zip(parent)
            .take_while(|(a, b)| a == b)
            .count()
    });
    let prefix = &first[..depth];
    let Ok(Some(current)) = get_in(value, prefix) else {
        return true;
    };
    let relative: Vec<Patch> = delta.undo.iter().map(|patch| patch.relative_to(depth)).collect();
    let mut rewound = current.clone();
    match apply(&mut rewound, &relative) {
        Ok(()) => rewound != *current,
        Err(_) => true,
    }
}

// ── Writes ────────────────────────────────────────────────────────────────

pub(crate) fn write(shared: &Shared, path: &[PathStep], mutation: Mutation) -> Result<(), Error> {
    let next = match mutation {
        Mutation::NoChange => None,
        Mutation::Value(value) => Some(value),
        Mutation::Produce(produce) => {
            let before = get_in(&shared.borrow().value, path)?.cloned();
            let existed = before.is_some();
            let mut draft = before.unwrap_or(Value::Null);
            produce(&mut draft);
            if !existed && draft.is_null() {
                return Ok(());
            }
            Some(draft)
        }
    };

    let queued = {
        let mut guard = shared.borrow_mut();
        let core = &mut *guard;
        match next {
            None => {
                if core.in_round() {
                    return Ok(());
                }
                trace!(path = ?path, "no-change write");
                core.pending.forced = true;
            }
            Some(next) => {
                let delta = Delta::between(path, get_in(&core.value, path)?, &next);
                if delta.is_empty() {
                    trace!(path = ?path, "write left value unchanged");
                    return Ok(());
                }
                core.apply_tracked(&delta.redo)?;
                trace!(path = ?path, patches = delta.redo.len(), "write applied");
                match core.round.as_mut() {
                    Some(round) => {
                        round.details.patches.extend(delta.redo.iter().cloned());
                        round.delta.merge(delta);
                    }
                    None => {
                        core.pending.delta.merge(delta);
                        core.pending.writes += 1;
                    }
                }
            }
        }
        !core.in_round()
    };

    if queued {
        if settling() {
            commit(shared)?;
        }
        schedule_flush(shared);
    }
    Ok(())
}

/// Turns pending writes into one commit. Returns whether anything was
/// committed.
pub(crate) fn commit(shared: &Shared) -> Result<bool, Error> {
    let details = {
        let mut guard = shared.borrow_mut();
        let core = &mut *guard;
        if core.in_round() || core.pending.is_empty() {
            return Ok(false);
        }
        let pending = mem::take(&mut core.pending);
        let changed = match pending.writes {
            0 => false,
            1 => true,
            _ => net_change(&core.value, &pending.delta),
        };
        if !changed && !pending.forced {
            trace!("pending writes cancelled out");
            return Ok(false);
        }
        let delta = if changed { pending.delta } else { Delta::default() };

        let replace = mem::replace(&mut core.replace, core.options.replace);
        let merge = replace || core.coalesce;
        match core.history.as_mut() {
            Some(journal) => {
                let recorded = journal.record(delta.clone(), merge);
                debug!(
                    ?recorded,
                    position = journal.position(),
                    len = journal.len(),
                    patches = delta.redo.len(),
                    "committed"
                );
            }
            None => debug!(patches = delta.redo.len(), "committed"),
        }
        core.refresh_state();
        core.refresh_nodes();

        core.unnotified.patches.extend(delta.redo.iter().cloned());
        core.unnotified.replace |= replace;
        core.unnotified.forced |= pending.forced;
        CommitDetails {
            go: 0,
            replace,
            patches: delta.redo,
        }
    };

    if settling() {
        shared.borrow_mut().coalesce = true;
        touch(shared);
    } else {
        run_round(shared, details, None, false)?;
    }
    Ok(true)
}

// ── History ───────────────────────────────────────────────────────────────

pub(crate) fn go(shared: &Shared, delta: isize) -> Result<(), Error> {
    if shared.borrow().in_round() {
        warn!(delta, "history navigation from the container's own deriver ignored");
        return Ok(());
    }
    commit(shared)?;

    let details = {
        let mut guard = shared.borrow_mut();
        let core = &mut *guard;
        let Some(journal) = core.history.as_mut() else {
            return Ok(());
        };
        let Some((moved, patches)) = journal.go(delta) else {
            return Ok(());
        };
        debug!(requested = delta, moved, position = journal.position(), "navigated history");
        core.apply_tracked(&patches)?;
        core.refresh_state();
        core.refresh_nodes();
        core.unnotified.go += moved;
        core.unnotified.patches.extend(patches.iter().cloned());
        CommitDetails {
            go: moved,
            replace: false,
            patches,
        }
    };

    if settling() {
        shared.borrow_mut().coalesce = true;
        touch(shared);
    } else {
        run_round(shared, details, None, false)?;
    }
    schedule_flush(shared);
    Ok(())
}

pub(crate) fn done(shared: &Shared) -> Result<(), Error> {
    if shared.borrow().in_round() {
        warn!("done() from the container's own deriver ignored");
        return Ok(());
    }
    commit(shared)?;
    let mut core = shared.borrow_mut();
    core.replace = core.options.replace;
    core.coalesce = false;
    Ok(())
}

// ── Flush and notification ────────────────────────────────────────────────

pub(crate) fn flush(shared: &Shared) -> Result<(), Error> {
    let rounds = {
        let core = shared.borrow();
        if core.in_round() {
            warn!("flush() from the container's own deriver ignored");
            return Ok(());
        }
        core.options.max_settle_rounds
    };
    for _ in 0..rounds {
        commit(shared)?;
        notify(shared);
        let mut core = shared.borrow_mut();
        if core.pending.is_empty() {
            core.replace = core.options.replace;
            core.coalesce = false;
            return Ok(());
        }
    }
    Err(Error::SettleLimit { rounds })
}

fn notify(shared: &Shared) {
    let (listeners, before, after, details, forced) = {
        let mut guard = shared.borrow_mut();
        let core = &mut *guard;
        let unnotified = mem::take(&mut core.unnotified);
        if unnotified.is_clean() || core.notified.is_none() {
            return;
        }
        let Some(before) = core.notified.replace(core.value.clone()) else {
            return;
        };
        let details = CommitDetails {
            go: unnotified.go,
            replace: unnotified.replace,
            patches: unnotified.patches,
        };
        (core.listeners.snapshot(), before, core.value.clone(), details, unnotified.forced)
    };

    for registration in &listeners {
        if !registration.live.get() || registration.node.is_detached() {
            continue;
        }
        let path = registration.node.path();
        let seen_at = registration.seen_at.replace(path.clone());
        if !forced {
            let old = get_in(&before, &seen_at).ok().flatten();
            let new = get_in(&after, &path).ok().flatten();
            if old == new {
                continue;
            }
        }
        invoke(registration, &after, &details);
    }
}

pub(crate) fn schedule_flush(shared: &Shared) {
    let scheduler = {
        let mut core = shared.borrow_mut();
        if core.flush_queued {
            return;
        }
        core.flush_queued = true;
        core.scheduler.clone()
    };
    let weak = Rc::downgrade(shared);
    scheduler.schedule(Box::new(move || {
        let Some(shared) = weak.upgrade() else {
            return;
        };
        shared.borrow_mut().flush_queued = false;
        if let Err(err) = flush(&shared) {
            tracing::error!(%err, "scheduled flush failed");
        }
    }));
}

// ── Derivation ────────────────────────────────────────────────────────────

fn invoke(registration: &Registration, root: &Value, details: &CommitDetails) {
    let Ok(mut guard) = registration.callback.try_borrow_mut() else {
        warn!(id = registration.id, "callback re-entered itself, skipping");
        return;
    };
    let callback: &mut Callback = &mut **guard;
    let path = registration.node.path();
    if path.is_empty() {
        callback(root, details);
    } else {
        let value = get_in(root, &path)
            .ok()
            .flatten()
            .cloned()
            .unwrap_or(Value::Null);
        callback(&value, details);
    }
}

/// Runs derivers (all of them, or just `only`) for one commit.
fn run_round(
    shared: &Shared,
    details: CommitDetails,
    only: Option<u64>,
    silent: bool,
) -> Result<(), Error> {
    let derivers = {
        let mut core = shared.borrow_mut();
        let mut derivers = core.derivers.snapshot();
        if let Some(id) = only {
            derivers.retain(|registration| registration.id == id);
        }
        if derivers.is_empty() {
            return Ok(());
        }
        core.round = Some(Round {
            delta: Delta::default(),
            details,
            silent,
        });
        derivers
    };

    {
        let _settle = SettleGuard::enter();
        for registration in &derivers {
            if !registration.live.get() || registration.node.is_detached() {
                continue;
            }
            let (value, details) = {
                let core = shared.borrow();
                let details = core
                    .round
                    .as_ref()
                    .map(|round| round.details.clone())
                    .unwrap_or_default();
                (core.value.clone(), details)
            };
            invoke(registration, &value, &details);
        }
    }
    finish_round(shared)
}

fn finish_round(shared: &Shared) -> Result<(), Error> {
    let mut guard = shared.borrow_mut();
    let core = &mut *guard;
    let Some(round) = core.round.take() else {
        return Ok(());
    };
    if round.delta.is_empty() {
        return Ok(());
    }
    if let Some(journal) = core.history.as_mut() {
        let recorded = journal.merge(round.delta.clone());
        debug!(?recorded, patches = round.delta.redo.len(), "derived changes recorded");
    }
    core.refresh_state();
    core.refresh_nodes();

    if !round.silent {
        core.unnotified.patches.extend(round.delta.redo);
        return Ok(());
    }
    if core.unnotified.is_clean() {
        if core.notified.is_some() {
            core.notified = Some(core.value.clone());
            core.listeners.rebase();
        }
    } else if let Some(notified) = core.notified.as_mut() {
        if apply(Rc::make_mut(notified), &round.delta.redo).is_err() {
            trace!("baseline changes left for the next notification");
        }
    }
    Ok(())
}

pub(crate) fn subscribe_derive(
    shared: &Shared,
    node: Rc<NodeKey>,
    callback: Box<Callback>,
) -> Result<Subscription, Error> {
    let nested = shared.borrow().in_round();
    if !nested {
        commit(shared)?;
    }
    let registration = shared.borrow_mut().derivers.add(node, callback);
    let subscription = Subscription::new(Rc::downgrade(shared), Channel::Derive, &registration);
    let details = CommitDetails {
        go: 0,
        replace: true,
        patches: Vec::new(),
    };
    if nested {
        let value = shared.borrow().value.clone();
        invoke(&registration, &value, &details);
    } else {
        run_round(shared, details, Some(registration.id), true)?;
    }
    Ok(subscription)
}

pub(crate) fn subscribe_change(shared: &Shared, node: Rc<NodeKey>, callback: Box<Callback>) -> Subscription {
    let mut core = shared.borrow_mut();
    if core.notified.is_none() || core.listeners.is_empty() {
        core.notified = Some(core.value.clone());
        core.unnotified = Unnotified::default();
        core.listeners.rebase();
    }
    let registration = core.listeners.add(node, callback);
    Subscription::new(Rc::downgrade(shared), Channel::Change, &registration)
}
