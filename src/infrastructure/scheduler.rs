use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::domain::clock::Clock;

/// Cancels its timer when dropped or cancelled explicitly.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

/// One-shot timers on the current thread.
pub trait Scheduler {
    fn schedule(&self, delay_ms: u32, task: Box<dyn FnOnce()>) -> TimerHandle;
}

/// `setTimeout` through gloo; dropping the handle clears the timeout.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlooScheduler;

impl Scheduler for GlooScheduler {
    fn schedule(&self, delay_ms: u32, task: Box<dyn FnOnce()>) -> TimerHandle {
        let timeout = gloo_timers::callback::Timeout::new(delay_ms, task);
        TimerHandle::new(move || drop(timeout))
    }
}

struct PendingTask {
    id: u64,
    due_ms: f64,
    task: Box<dyn FnOnce()>,
}

#[derive(Default)]
struct ManualQueue {
    next_id: u64,
    tasks: Vec<PendingTask>,
    fired: u64,
}

/// Deterministic scheduler and clock in one: time only moves on `advance`.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    now: Rc<Cell<f64>>,
    queue: Rc<RefCell<ManualQueue>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward, firing every task that falls due, in due order.
    pub fn advance(&self, ms: f64) {
        let target = self.now.get() + ms;
        loop {
            let next = {
                let mut queue = self.queue.borrow_mut();
                let due = queue
                    .tasks
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due_ms <= target)
                    .min_by(|(_, a), (_, b)| a.due_ms.total_cmp(&b.due_ms).then(a.id.cmp(&b.id)))
                    .map(|(index, _)| index);
                due.map(|index| {
                    queue.fired += 1;
                    queue.tasks.remove(index)
                })
            };
            match next {
                Some(pending) => {
                    self.now.set(pending.due_ms.max(self.now.get()));
                    (pending.task)();
                }
                None => break,
            }
        }
        self.now.set(target);
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().tasks.len()
    }

    pub fn fired(&self) -> u64 {
        self.queue.borrow().fired
    }
}

impl Clock for ManualScheduler {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay_ms: u32, task: Box<dyn FnOnce()>) -> TimerHandle {
        let mut queue = self.queue.borrow_mut();
        let id = queue.next_id;
        queue.next_id += 1;
        queue.tasks.push(PendingTask { id, due_ms: self.now.get() + delay_ms as f64, task });

        let weak = Rc::downgrade(&self.queue);
        TimerHandle::new(move || {
            if let Some(queue) = weak.upgrade() {
                if let Ok(mut queue) = queue.try_borrow_mut() {
                    queue.tasks.retain(|t| t.id != id);
                }
            }
        })
    }
}
