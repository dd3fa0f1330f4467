//! Deferred work for implicit flushes.
//!
//! A container never flushes on its own call stack after a plain write.
//! Instead its first pending write enqueues one flush [`Task`] on the
//! container's [`Schedule`]. The default schedule is a per-thread
//! [`TaskQueue`], advanced by calling [`tick`] wherever the host program
//! would next observe state (before rendering, at the end of an event
//! handler, ...).

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

pub type Task = Box<dyn FnOnce()>;

/// Accepts tasks to run later on the same thread.
pub trait Schedule {
    fn schedule(&self, task: Task);
}

/// Upper bound on tasks run by one [`TaskQueue::run_until_idle`] call.
const MAX_TASKS_PER_TICK: usize = 10_000;

/// FIFO task queue, run manually.
#[derive(Default)]
pub struct TaskQueue {
    tasks: RefCell<VecDeque<Task>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Runs the oldest task, if any. Returns whether one ran.
    pub fn run_once(&self) -> bool {
        let task = self.tasks.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs tasks, including ones enqueued while running, until the queue
    /// is empty. Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_once() {
            ran += 1;
            if ran == MAX_TASKS_PER_TICK {
                tracing::warn!(
                    remaining = self.len(),
                    "task queue still busy after {MAX_TASKS_PER_TICK} tasks, yielding"
                );
                break;
            }
        }
        ran
    }
}

impl Schedule for TaskQueue {
    fn schedule(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }
}

thread_local! {
    static CURRENT: Rc<TaskQueue> = Rc::new(TaskQueue::new());
}

/// This thread's default queue.
pub fn current() -> Rc<TaskQueue> {
    CURRENT.with(Rc::clone)
}

/// Runs this thread's default queue until idle.
pub fn tick() -> usize {
    current().run_until_idle()
}
