use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::frame::Frame;

type Subscriber = Rc<dyn Fn(&Frame)>;

struct Registration {
    id: u64,
    /// Set by a `Subscription` that could not unregister itself in place.
    dead: Rc<Cell<bool>>,
    callback: Subscriber,
}

struct SlotState {
    current: Option<Frame>,
    version: u64,
    next_subscriber: u64,
    subscribers: Vec<Registration>,
}

/// Single-slot, last-write-wins holder of the latest admitted frame.
///
/// One slot per frame source; clones share the same slot. Older frames are
/// replaced, never queued.
#[derive(Clone)]
pub struct FrameSlot {
    state: Rc<RefCell<SlotState>>,
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(SlotState {
                current: None,
                version: 0,
                next_subscriber: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Replace the current frame and notify subscribers.
    ///
    /// A frame older than the one already held (by sequence) is ignored, so
    /// a consumer never observes time going backwards.
    pub fn publish(&self, frame: Frame) -> bool {
        let subscribers: Vec<Subscriber> = {
            let mut state = self.state.borrow_mut();
            if let Some(current) = &state.current {
                if current.seq() >= frame.seq() {
                    return false;
                }
            }
            state.current = Some(frame.clone());
            state.version += 1;
            state.subscribers.retain(|r| !r.dead.get());
            state.subscribers.iter().map(|r| r.callback.clone()).collect()
        };

        // Notify outside the borrow: subscribers may read the slot.
        for subscriber in subscribers {
            subscriber(&frame);
        }
        true
    }

    pub fn latest(&self) -> Option<Frame> {
        self.state.borrow().current.clone()
    }

    /// Number of successful publishes so far.
    pub fn version(&self) -> u64 {
        self.state.borrow().version
    }

    pub fn clear(&self) {
        self.state.borrow_mut().current = None;
    }

    pub fn subscribe(&self, callback: impl Fn(&Frame) + 'static) -> Subscription {
        let mut state = self.state.borrow_mut();
        let id = state.next_subscriber;
        state.next_subscriber += 1;
        let dead = Rc::new(Cell::new(false));
        state.subscribers.push(Registration { id, dead: dead.clone(), callback: Rc::new(callback) });
        Subscription { id, dead, slot: Rc::downgrade(&self.state) }
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.borrow().subscribers.iter().filter(|r| !r.dead.get()).count()
    }
}

/// Unsubscribes on drop.
pub struct Subscription {
    id: u64,
    dead: Rc<Cell<bool>>,
    slot: Weak<RefCell<SlotState>>,
}

impl Subscription {
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dead.set(true);
        // If the slot is borrowed right now, the next publish prunes it.
        if let Some(state) = self.slot.upgrade() {
            if let Ok(mut state) = state.try_borrow_mut() {
                state.subscribers.retain(|r| r.id != self.id);
            }
        }
    }
}
