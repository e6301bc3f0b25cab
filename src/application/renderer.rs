//! Drives one render backend from a latest-frame slot and records what it
//! costs.
//!
//! Per observed frame: skip it when the backend is not ready or still busy,
//! otherwise start the latency clock and dispatch. When the backend reports
//! back, close the latency sample and record the payload size. Failures clear
//! the in-flight guard so the next frame is never blocked. A permanent
//! failure swaps in the fallback backend, once.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::strategy::Strategy;
use crate::domain::{
    clock::Clock,
    errors::{BenchError, BenchResult},
    frame::Frame,
    logging::{LogComponent, get_logger},
    metrics::{FrameMetrics, MetricsSnapshot, TrackerConfig},
    render::{BackendEvent, BackendNotifier, RenderBackend, RenderReport},
    store::{FrameSlot, Subscription},
};

/// Builds the backend a strategy falls back to. Called at most once.
pub type BackendFactory = Box<dyn FnOnce() -> BenchResult<Box<dyn RenderBackend>>>;

pub type SnapshotListener = Rc<dyn Fn(&RendererSnapshot)>;

/// Everything the panel of one strategy shows.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererSnapshot {
    pub strategy: Strategy,
    pub backend: &'static str,
    pub ready: bool,
    pub processing: bool,
    pub fell_back: bool,
    pub metrics: MetricsSnapshot,
    pub last_report: Option<RenderReport>,
    pub last_error: Option<BenchError>,
    /// Producer timestamp of the last frame rendered, when it carried one.
    pub last_source_timestamp: Option<u64>,
    pub rendered: u64,
    pub skipped: u64,
    pub failed: u64,
}

struct InFlightFrame {
    seq: u64,
    size_kb: f64,
    source_timestamp: Option<u64>,
}

struct RendererInner {
    strategy: Strategy,
    backend_name: &'static str,
    metrics: FrameMetrics,
    ready: bool,
    in_flight: Option<InFlightFrame>,
    fallback: Option<BackendFactory>,
    fell_back: bool,
    fallback_pending: bool,
    last_report: Option<RenderReport>,
    last_error: Option<BenchError>,
    last_source_timestamp: Option<u64>,
    rendered: u64,
    skipped: u64,
    failed: u64,
    stopped: bool,
}

struct Shared {
    inner: RefCell<RendererInner>,
    backend: RefCell<Option<Box<dyn RenderBackend>>>,
    /// Bumped on every backend swap; events from older backends are dropped.
    generation: Cell<u64>,
    listener: RefCell<Option<SnapshotListener>>,
}

pub struct RendererStateMachine {
    shared: Rc<Shared>,
    subscription: Option<Subscription>,
}

impl RendererStateMachine {
    pub fn new(
        strategy: Strategy,
        backend: Box<dyn RenderBackend>,
        fallback: Option<BackendFactory>,
        clock: Rc<dyn Clock>,
        tracker: TrackerConfig,
    ) -> Self {
        let inner = RendererInner {
            strategy,
            backend_name: backend.name(),
            metrics: FrameMetrics::new(clock, tracker),
            ready: false,
            in_flight: None,
            fallback,
            fell_back: false,
            fallback_pending: false,
            last_report: None,
            last_error: None,
            last_source_timestamp: None,
            rendered: 0,
            skipped: 0,
            failed: 0,
            stopped: false,
        };
        Self {
            shared: Rc::new(Shared {
                inner: RefCell::new(inner),
                backend: RefCell::new(Some(backend)),
                generation: Cell::new(0),
                listener: RefCell::new(None),
            }),
            subscription: None,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.shared.inner.borrow().strategy
    }

    pub fn set_listener(&self, listener: SnapshotListener) {
        *self.shared.listener.borrow_mut() = Some(listener);
    }

    /// Initialize the backend and follow `slot` from now on.
    pub fn start(&mut self, slot: &FrameSlot) {
        if self.subscription.is_some() || self.shared.inner.borrow().stopped {
            return;
        }
        Shared::initialize_backend(&self.shared);

        let weak = Rc::downgrade(&self.shared);
        self.subscription = Some(slot.subscribe(move |frame| {
            if let Some(shared) = weak.upgrade() {
                Shared::on_frame(&shared, frame);
            }
        }));
    }

    /// Offer one frame directly, as the slot subscription does.
    pub fn on_frame(&self, frame: &Frame) {
        Shared::on_frame(&self.shared, frame);
    }

    pub fn snapshot(&self) -> RendererSnapshot {
        self.shared.snapshot()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.inner.borrow().metrics.snapshot()
    }

    pub fn is_processing(&self) -> bool {
        self.shared.inner.borrow().in_flight.is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.inner.borrow().stopped
    }

    /// Stop following the slot and release the backend. An in-flight render
    /// is abandoned; its completion, if any, is ignored.
    pub fn stop(&mut self) {
        self.subscription = None;
        self.shared.stop();
    }
}

impl Drop for RendererStateMachine {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn component(&self) -> LogComponent {
        LogComponent::Application("Renderer")
    }

    fn notifier(this: &Rc<Self>) -> BackendNotifier {
        let weak: Weak<Shared> = Rc::downgrade(this);
        let generation = this.generation.get();
        Rc::new(move |event| {
            if let Some(shared) = weak.upgrade() {
                Shared::on_backend_event(&shared, generation, event);
            }
        })
    }

    fn initialize_backend(this: &Rc<Self>) {
        let notify = Self::notifier(this);
        let result = match this.backend.borrow_mut().as_mut() {
            Some(backend) => backend.initialize(notify),
            None => Err(BenchError::NotReady),
        };
        if let Err(error) = result {
            Self::on_failure(this, error, true);
        }
    }

    fn on_frame(this: &Rc<Self>, frame: &Frame) {
        if this.inner.borrow().fallback_pending {
            Self::swap_to_fallback(this);
        }

        let Ok(mut backend) = this.backend.try_borrow_mut() else {
            this.inner.borrow_mut().skipped += 1;
            return;
        };

        {
            let mut inner = this.inner.borrow_mut();
            if inner.stopped {
                return;
            }
            let available = backend.as_ref().is_some_and(|b| b.is_ready() && !b.is_busy());
            if !available || inner.in_flight.is_some() {
                inner.skipped += 1;
                return;
            }
            inner.metrics.latency.start();
            inner.in_flight = Some(InFlightFrame {
                seq: frame.seq(),
                size_kb: frame.size_kb(),
                source_timestamp: frame.source_timestamp(),
            });
        }

        let result = match backend.as_mut() {
            Some(backend) => backend.dispatch(frame),
            None => Err(BenchError::NotReady),
        };
        drop(backend);

        if let Err(error) = result {
            Self::on_failure(this, error, true);
        } else if this.inner.borrow().fallback_pending {
            Self::swap_to_fallback(this);
        }
    }

    fn on_backend_event(this: &Rc<Self>, generation: u64, event: BackendEvent) {
        if generation != this.generation.get() || this.inner.borrow().stopped {
            return;
        }

        match event {
            BackendEvent::Ready => {
                let mut inner = this.inner.borrow_mut();
                inner.ready = true;
                get_logger().info(
                    this.component(),
                    &format!("✅ {} ready on {}", inner.strategy, inner.backend_name),
                );
            }
            BackendEvent::Finished(Ok(report)) => {
                let mut inner = this.inner.borrow_mut();
                let Some(frame) = inner.in_flight.take() else {
                    return;
                };
                if let Some(latency) = inner.metrics.latency.end() {
                    get_logger().trace(
                        this.component(),
                        &format!("{} frame #{} in {latency:.2}ms", inner.strategy, frame.seq),
                    );
                }
                inner.metrics.size.add_size(frame.size_kb);
                inner.rendered += 1;
                inner.last_report = Some(report);
                inner.last_error = None;
                if frame.source_timestamp.is_some() {
                    inner.last_source_timestamp = frame.source_timestamp;
                }
            }
            BackendEvent::Finished(Err(error)) => {
                // The backend is still on the stack here; any swap waits for the next frame.
                Self::on_failure(this, error, false);
                return;
            }
            BackendEvent::Lost(error) => {
                {
                    let mut inner = this.inner.borrow_mut();
                    inner.ready = false;
                }
                let error = match error {
                    e if e.is_permanent() => e,
                    other => BenchError::Capability(other.to_string()),
                };
                Self::on_failure(this, error, false);
                return;
            }
        }
        this.publish();
    }

    /// Clear the guard and record `error`. A permanent error replaces the
    /// backend, right away when `swap_now`, or before the next frame.
    fn on_failure(this: &Rc<Self>, error: BenchError, swap_now: bool) {
        let permanent = error.is_permanent();
        {
            let mut inner = this.inner.borrow_mut();
            inner.in_flight = None;
            if matches!(error, BenchError::Busy | BenchError::NotReady) {
                inner.skipped += 1;
                return;
            }
            inner.failed += 1;
            get_logger().warn(
                this.component(),
                &format!("⚠️ {} on {}: {error}", inner.strategy, inner.backend_name),
            );
            inner.last_error = Some(error);
            if permanent {
                inner.ready = false;
                inner.fallback_pending = true;
            }
        }
        if permanent && swap_now {
            Self::swap_to_fallback(this);
        }
        this.publish();
    }

    fn swap_to_fallback(this: &Rc<Self>) {
        let factory = {
            let mut inner = this.inner.borrow_mut();
            if inner.stopped || !inner.fallback_pending {
                return;
            }
            inner.fallback_pending = false;
            match inner.fallback.take() {
                Some(factory) => factory,
                None => {
                    get_logger().error(
                        this.component(),
                        &format!("❌ {} has no fallback left; strategy stays errored", inner.strategy),
                    );
                    return;
                }
            }
        };

        let Ok(mut slot) = this.backend.try_borrow_mut() else {
            // Still dispatching; put the factory back and retry on the next frame.
            let mut inner = this.inner.borrow_mut();
            inner.fallback = Some(factory);
            inner.fallback_pending = true;
            return;
        };
        let previous = slot.take();
        drop(slot);

        this.generation.set(this.generation.get() + 1);
        if let Some(mut previous) = previous {
            previous.teardown();
        }

        let built = factory();
        match built {
            Ok(backend) => {
                {
                    let mut inner = this.inner.borrow_mut();
                    get_logger().info(
                        this.component(),
                        &format!("🔄 {} switching from {} to {}", inner.strategy, inner.backend_name, backend.name()),
                    );
                    inner.backend_name = backend.name();
                    inner.fell_back = true;
                    inner.ready = false;
                }
                *this.backend.borrow_mut() = Some(backend);
                Self::initialize_backend(this);
            }
            Err(error) => {
                let mut inner = this.inner.borrow_mut();
                get_logger().error(
                    this.component(),
                    &format!("❌ {} fallback could not be built: {error}", inner.strategy),
                );
                inner.last_error = Some(error);
                inner.failed += 1;
            }
        }
        this.publish();
    }

    fn stop(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.stopped {
                return;
            }
            inner.stopped = true;
            inner.in_flight = None;
            inner.ready = false;
            inner.fallback = None;
            inner.fallback_pending = false;
        }
        self.generation.set(self.generation.get() + 1);
        self.listener.borrow_mut().take();

        let backend = match self.backend.try_borrow_mut() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(mut backend) = backend {
            backend.teardown();
        }
        get_logger().debug(self.component(), "Renderer stopped");
    }

    fn snapshot(&self) -> RendererSnapshot {
        let inner = self.inner.borrow();
        RendererSnapshot {
            strategy: inner.strategy,
            backend: inner.backend_name,
            ready: inner.ready,
            processing: inner.in_flight.is_some(),
            fell_back: inner.fell_back,
            metrics: inner.metrics.snapshot(),
            last_report: inner.last_report.clone(),
            last_error: inner.last_error.clone(),
            last_source_timestamp: inner.last_source_timestamp,
            rendered: inner.rendered,
            skipped: inner.skipped,
            failed: inner.failed,
        }
    }

    fn publish(&self) {
        let listener = self.listener.borrow().clone();
        if let Some(listener) = listener {
            listener(&self.snapshot());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::ManualClock;
    use crate::domain::frame::FramePayload;
    use crate::testing::RecordingBackend;

    fn machine(backend: &RecordingBackend, clock: &Rc<ManualClock>) -> RendererStateMachine {
        RendererStateMachine::new(
            Strategy::Base64Direct,
            Box::new(backend.clone()),
            None,
            clock.clone(),
            TrackerConfig::default(),
        )
    }

    fn frame(kb: usize) -> Frame {
        Frame::new(FramePayload::base64("A".repeat(kb * 1024)), 0.0)
    }

    #[test]
    fn frames_are_skipped_until_ready_and_while_busy() {
        let clock = Rc::new(ManualClock::new(0.0));
        let backend = RecordingBackend::new("img").ready_on_init(false);
        let slot = FrameSlot::new();
        let mut renderer = machine(&backend, &clock);
        renderer.start(&slot);

        slot.publish(frame(1));
        assert_eq!(backend.dispatched(), 0);

        backend.become_ready();
        slot.publish(frame(1));
        slot.publish(frame(2));
        assert_eq!(backend.dispatched(), 1);
        assert_eq!(renderer.snapshot().skipped, 2);
    }

    #[test]
    fn completion_records_latency_and_size() {
        let clock = Rc::new(ManualClock::new(0.0));
        let backend = RecordingBackend::new("img");
        let slot = FrameSlot::new();
        let mut renderer = machine(&backend, &clock);
        renderer.start(&slot);

        slot.publish(frame(50));
        clock.advance(12.0);
        backend.complete();

        let metrics = renderer.metrics();
        assert_eq!(metrics.latencies, vec![12.0]);
        assert_eq!(metrics.sizes, vec![50.0]);
        assert!(!renderer.is_processing());
    }

    #[test]
    fn failure_clears_the_guard() {
        let clock = Rc::new(ManualClock::new(0.0));
        let backend = RecordingBackend::new("img");
        let slot = FrameSlot::new();
        let mut renderer = machine(&backend, &clock);
        renderer.start(&slot);

        slot.publish(frame(1));
        backend.fail(BenchError::Decode("corrupt".into()));
        assert!(!renderer.is_processing());
        assert_eq!(renderer.snapshot().last_error, Some(BenchError::Decode("corrupt".into())));

        slot.publish(frame(1));
        assert_eq!(backend.dispatched(), 2);
        backend.complete();
        assert_eq!(renderer.snapshot().last_error, None);
    }

    #[test]
    fn synchronous_dispatch_error_clears_the_guard() {
        let clock = Rc::new(ManualClock::new(0.0));
        let backend = RecordingBackend::new("img");
        backend.fail_next_dispatch(BenchError::Decode("Invalid Base64 payload".into()));
        let mut renderer = machine(&backend, &clock);
        let slot = FrameSlot::new();
        renderer.start(&slot);

        slot.publish(frame(1));
        assert!(!renderer.is_processing());
        assert_eq!(renderer.snapshot().failed, 1);
        assert!(renderer.metrics().latencies.is_empty());
    }

    #[test]
    fn lost_backend_is_replaced_before_the_next_frame() {
        let clock = Rc::new(ManualClock::new(0.0));
        let primary = RecordingBackend::new("offscreen-worker");
        let fallback = RecordingBackend::new("fallback-canvas");
        let factory_backend = fallback.clone();
        let slot = FrameSlot::new();
        let mut renderer = RendererStateMachine::new(
            Strategy::BinaryOffscreen,
            Box::new(primary.clone()),
            Some(Box::new(move || Ok(Box::new(factory_backend) as Box<dyn RenderBackend>))),
            clock.clone(),
            TrackerConfig::default(),
        );
        renderer.start(&slot);

        primary.lose(BenchError::Capability("Worker error: boom".into()));
        assert!(!renderer.snapshot().ready);

        slot.publish(Frame::new(FramePayload::binary(vec![0xFF, 0xD8]), 0.0));
        assert!(primary.torn_down());
        assert_eq!(fallback.dispatched(), 1);
        let snapshot = renderer.snapshot();
        assert!(snapshot.fell_back);
        assert_eq!(snapshot.backend, "fallback-canvas");

        // Late events from the old backend no longer count.
        primary.complete();
        assert!(renderer.is_processing());
    }

    #[test]
    fn stop_releases_the_backend_and_ignores_late_completions() {
        let clock = Rc::new(ManualClock::new(0.0));
        let backend = RecordingBackend::new("img");
        let slot = FrameSlot::new();
        let mut renderer = machine(&backend, &clock);
        renderer.start(&slot);
        slot.publish(frame(1));

        renderer.stop();
        assert!(backend.torn_down());
        assert_eq!(slot.subscriber_count(), 0);
        backend.complete();
        assert!(renderer.metrics().latencies.is_empty());
    }
}
