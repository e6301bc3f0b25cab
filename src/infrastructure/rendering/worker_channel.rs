//! Page-side owner of one off-main-thread rendering surface.
//!
//! ```text
//! Uninitialized ──start──▶ Initializing ──CANVAS_READY──▶ Ready ◀──▶ Processing
//!        └──────────────────────┴──────────── any failure ──▶ Errored
//! ```
//!
//! The channel talks to its worker through a [`WorkerPort`], schedules its
//! settle delay and deadlines through a [`Scheduler`] and measures through a
//! [`Clock`], so the whole state machine runs natively under test.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use strum::Display;

use super::capabilities::RenderCapabilities;
use super::protocol::{WorkerCommand, WorkerResponse};
use crate::domain::{
    clock::Clock,
    errors::{BenchError, BenchResult},
    frame::{Frame, FramePayload},
    logging::{LogComponent, get_logger},
    render::{BackendEvent, BackendNotifier, BrightnessReport, RenderBackend, RenderReport},
};
use crate::infrastructure::scheduler::{Scheduler, TimerHandle};

/// What a port reports back from its worker.
#[derive(Debug, Clone, PartialEq)]
pub enum PortEvent {
    Response(WorkerResponse),
    /// A message arrived that does not match the protocol.
    Malformed(String),
    /// The worker raised an uncaught error.
    Crashed(String),
}

pub type PortHandler = Box<dyn FnMut(PortEvent)>;

/// Transport to one worker.
pub trait WorkerPort {
    /// Installed before any command is posted.
    fn set_handler(&mut self, handler: PortHandler);

    /// Move the rendering surface into the worker together with
    /// `INIT_CANVAS`. A surface can be moved once; later calls fail.
    fn transfer_surface(&mut self, width: u32, height: u32) -> BenchResult<()>;

    fn post(&mut self, command: WorkerCommand) -> BenchResult<()>;

    fn terminate(&mut self);
}

/// Spawns the worker. Called at most once per channel.
pub type PortFactory = Box<dyn FnOnce() -> BenchResult<Box<dyn WorkerPort>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ChannelState {
    Uninitialized,
    Initializing,
    Ready,
    Processing,
    Errored,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub width: u32,
    pub height: u32,
    pub settle_delay_ms: u32,
    /// Deadline for one render, and for the worker to acknowledge the surface.
    pub timeout_ms: u32,
    pub mime_type: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { width: 200, height: 150, settle_delay_ms: 50, timeout_ms: 5_000, mime_type: "image/jpeg".to_string() }
    }
}

/// Counters for the diagnostics panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub requests: u64,
    pub completed: u64,
    pub failed: u64,
    pub timeouts: u64,
    pub rejected_busy: u64,
    pub stale: u64,
}

struct InFlight {
    request_id: u64,
    brightness: Option<BrightnessReport>,
}

struct ChannelInner {
    state: ChannelState,
    config: ChannelConfig,
    capabilities: RenderCapabilities,
    factory: Option<PortFactory>,
    port: Option<Box<dyn WorkerPort>>,
    next_request_id: u64,
    in_flight: Option<InFlight>,
    settle_timer: Option<TimerHandle>,
    deadline: Option<TimerHandle>,
    last_error: Option<BenchError>,
    stats: ChannelStats,
    disposed: bool,
}

struct Shared {
    inner: RefCell<ChannelInner>,
    notify: RefCell<Option<BackendNotifier>>,
    scheduler: Rc<dyn Scheduler>,
    clock: Rc<dyn Clock>,
}

const COMPONENT: LogComponent = LogComponent::Infrastructure("RenderWorkerChannel");

pub struct RenderWorkerChannel {
    shared: Rc<Shared>,
}

impl RenderWorkerChannel {
    pub fn new(
        config: ChannelConfig,
        capabilities: RenderCapabilities,
        factory: PortFactory,
        scheduler: Rc<dyn Scheduler>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        let inner = ChannelInner {
            state: ChannelState::Uninitialized,
            config,
            capabilities,
            factory: Some(factory),
            port: None,
            next_request_id: 1,
            in_flight: None,
            settle_timer: None,
            deadline: None,
            last_error: None,
            stats: ChannelStats::default(),
            disposed: false,
        };
        Self {
            shared: Rc::new(Shared { inner: RefCell::new(inner), notify: RefCell::new(None), scheduler, clock }),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.shared.inner.borrow().state
    }

    pub fn last_error(&self) -> Option<BenchError> {
        self.shared.inner.borrow().last_error.clone()
    }

    pub fn stats(&self) -> ChannelStats {
        self.shared.inner.borrow().stats
    }

    pub fn set_listener(&self, notify: BackendNotifier) {
        *self.shared.notify.borrow_mut() = Some(notify);
    }

    /// Spawn the worker and schedule the surface transfer.
    ///
    /// Fails immediately, without spawning anything, when the environment
    /// cannot render off the main thread.
    pub fn start(&self) -> BenchResult<()> {
        Shared::start(&self.shared)
    }

    /// Send one payload to the worker. Returns the request id.
    pub fn render(&self, payload: &FramePayload) -> BenchResult<u64> {
        Shared::render(&self.shared, payload)
    }

    /// Terminate the worker and drop every timer. Safe in any state.
    pub fn teardown(&self) {
        self.shared.teardown();
    }
}

impl Drop for RenderWorkerChannel {
    fn drop(&mut self) {
        self.shared.teardown();
    }
}

impl RenderBackend for RenderWorkerChannel {
    fn name(&self) -> &'static str {
        "offscreen-worker"
    }

    fn initialize(&mut self, notify: BackendNotifier) -> BenchResult<()> {
        self.set_listener(notify);
        self.start()
    }

    fn is_ready(&self) -> bool {
        matches!(self.state(), ChannelState::Ready | ChannelState::Processing)
    }

    fn is_busy(&self) -> bool {
        self.state() == ChannelState::Processing
    }

    fn dispatch(&mut self, frame: &Frame) -> BenchResult<()> {
        self.render(frame.payload()).map(|_| ())
    }

    fn teardown(&mut self) {
        RenderWorkerChannel::teardown(self);
    }
}

impl Shared {
    fn emit(&self, events: Vec<BackendEvent>) {
        let notify = self.notify.borrow().clone();
        if let Some(notify) = notify {
            for event in events {
                notify(event);
            }
        }
    }

    fn start(this: &Rc<Self>) -> BenchResult<()> {
        let (settle_delay, deadline_ms) = {
            let mut inner = this.inner.borrow_mut();
            if inner.disposed {
                return Err(BenchError::NotReady);
            }
            if inner.state != ChannelState::Uninitialized {
                return Ok(());
            }

            if let Some(reason) = inner.capabilities.missing() {
                let error = BenchError::Capability(reason.to_string());
                get_logger().warn(COMPONENT, &format!("⚠️ {reason}; worker not started"));
                inner.fail(error.clone());
                return Err(error);
            }

            let Some(factory) = inner.factory.take() else {
                let error = BenchError::Surface("Worker was already spawned for this surface".to_string());
                inner.fail(error.clone());
                return Err(error);
            };

            let mut port = match factory() {
                Ok(port) => port,
                Err(e) => {
                    let error = match e {
                        BenchError::Capability(_) | BenchError::Surface(_) => e,
                        other => BenchError::Capability(format!("Failed to spawn worker: {other}")),
                    };
                    get_logger().error(COMPONENT, &format!("❌ {error}"));
                    inner.fail(error.clone());
                    return Err(error);
                }
            };

            let weak = Rc::downgrade(this);
            port.set_handler(Box::new(move |event| {
                if let Some(shared) = weak.upgrade() {
                    Shared::handle(&shared, event);
                }
            }));
            inner.port = Some(port);
            inner.state = ChannelState::Initializing;
            get_logger().info(COMPONENT, "🚀 Worker spawned, waiting for the surface to settle");
            (inner.config.settle_delay_ms, inner.config.settle_delay_ms + inner.config.timeout_ms)
        };

        let weak = Rc::downgrade(this);
        let settle = this.scheduler.schedule(
            settle_delay,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.transfer_surface();
                }
            }),
        );
        let weak = Rc::downgrade(this);
        let deadline = this.scheduler.schedule(
            deadline_ms,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.on_init_deadline();
                }
            }),
        );

        let mut inner = this.inner.borrow_mut();
        inner.settle_timer = Some(settle);
        inner.deadline = Some(deadline);
        Ok(())
    }

    fn transfer_surface(&self) {
        let events = {
            let mut inner = self.inner.borrow_mut();
            inner.settle_timer = None;
            if inner.disposed || inner.state != ChannelState::Initializing {
                return;
            }
            let (width, height) = (inner.config.width, inner.config.height);
            let result = match inner.port.as_mut() {
                Some(port) => port.transfer_surface(width, height),
                None => Err(BenchError::Surface("Worker port missing at transfer time".to_string())),
            };
            match result {
                Ok(()) => {
                    get_logger().debug(COMPONENT, &format!("Surface {width}x{height} transferred to worker"));
                    return;
                }
                Err(e) => {
                    let error = match e {
                        BenchError::Surface(_) | BenchError::Capability(_) => e,
                        other => BenchError::Surface(format!("Canvas control transfer failed: {other}")),
                    };
                    get_logger().error(COMPONENT, &format!("❌ {error}"));
                    inner.fail(error.clone());
                    vec![BackendEvent::Lost(error)]
                }
            }
        };
        self.emit(events);
    }

    fn on_init_deadline(&self) {
        let events = {
            let mut inner = self.inner.borrow_mut();
            if inner.disposed || inner.state != ChannelState::Initializing {
                return;
            }
            inner.deadline = None;
            let error = BenchError::Capability(format!(
                "Worker did not acknowledge the surface within {} ms",
                inner.config.timeout_ms
            ));
            get_logger().error(COMPONENT, &format!("❌ {error}"));
            inner.fail(error.clone());
            vec![BackendEvent::Lost(error)]
        };
        self.emit(events);
    }

    fn render(this: &Rc<Self>, payload: &FramePayload) -> BenchResult<u64> {
        let (request_id, timeout_ms) = {
            let mut inner = this.inner.borrow_mut();
            match inner.state {
                ChannelState::Ready => {}
                ChannelState::Processing => {
                    inner.stats.rejected_busy += 1;
                    get_logger().debug(COMPONENT, "Render rejected: a frame is already in flight");
                    return Err(BenchError::Busy);
                }
                _ => return Err(BenchError::NotReady),
            }

            let request_id = inner.next_request_id;
            let command = WorkerCommand::RenderImage {
                request_id,
                payload: payload.clone(),
                mime_type: inner.config.mime_type.clone(),
            };
            match inner.port.as_mut() {
                Some(port) => port.post(command)?,
                None => return Err(BenchError::NotReady),
            }

            inner.next_request_id += 1;
            inner.stats.requests += 1;
            inner.in_flight = Some(InFlight { request_id, brightness: None });
            inner.state = ChannelState::Processing;
            (request_id, inner.config.timeout_ms)
        };

        let weak: Weak<Shared> = Rc::downgrade(this);
        let deadline = this.scheduler.schedule(
            timeout_ms,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.on_render_deadline(request_id);
                }
            }),
        );
        this.inner.borrow_mut().deadline = Some(deadline);
        Ok(request_id)
    }

    fn on_render_deadline(&self, request_id: u64) {
        let events = {
            let mut inner = self.inner.borrow_mut();
            if inner.disposed || inner.in_flight.as_ref().map(|f| f.request_id) != Some(request_id) {
                return;
            }
            inner.deadline = None;
            inner.in_flight = None;
            inner.state = ChannelState::Ready;
            inner.stats.timeouts += 1;
            inner.stats.failed += 1;
            let error = BenchError::Timeout { after_ms: inner.config.timeout_ms };
            inner.last_error = Some(error.clone());
            get_logger().warn(COMPONENT, &format!("⏱️ Request #{request_id}: {error}"));
            vec![BackendEvent::Finished(Err(error))]
        };
        self.emit(events);
    }

    fn handle(this: &Rc<Self>, event: PortEvent) {
        let started_at = this.clock.now_ms();
        let events = {
            let mut inner = this.inner.borrow_mut();
            if inner.disposed {
                return;
            }
            match event {
                PortEvent::Response(response) => inner.on_response(response),
                PortEvent::Malformed(reason) => {
                    get_logger().warn(COMPONENT, &format!("Ignoring malformed worker message: {reason}"));
                    Vec::new()
                }
                PortEvent::Crashed(reason) => {
                    let error = BenchError::Capability(format!("Worker error: {reason}"));
                    get_logger().error(COMPONENT, &format!("❌ {error}"));
                    inner.fail(error.clone());
                    vec![BackendEvent::Lost(error)]
                }
            }
        };
        get_logger().trace(
            COMPONENT,
            &format!("Worker event handled in {:.2}ms", this.clock.now_ms() - started_at),
        );
        this.emit(events);
    }

    fn teardown(&self) {
        let port = {
            let mut inner = self.inner.borrow_mut();
            if inner.disposed {
                return;
            }
            inner.disposed = true;
            inner.settle_timer = None;
            inner.deadline = None;
            inner.in_flight = None;
            inner.factory = None;
            inner.state = ChannelState::Uninitialized;
            inner.port.take()
        };
        self.notify.borrow_mut().take();

        if let Some(mut port) = port {
            if let Err(e) = port.post(WorkerCommand::Cleanup) {
                get_logger().debug(COMPONENT, &format!("CLEANUP not delivered: {e}"));
            }
            port.terminate();
            get_logger().info(COMPONENT, "🧹 Worker terminated");
        }
    }
}

impl ChannelInner {
    fn fail(&mut self, error: BenchError) {
        self.state = ChannelState::Errored;
        self.in_flight = None;
        self.settle_timer = None;
        self.deadline = None;
        self.last_error = Some(error);
    }

    /// Request the response refers to, if it refers to the one in flight.
    /// A response without an id is taken to be about the current request.
    fn matches_in_flight(&self, request_id: Option<u64>) -> bool {
        match (&self.in_flight, request_id) {
            (Some(in_flight), Some(id)) => in_flight.request_id == id,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    fn ignore_stale(&mut self, kind: &str, request_id: Option<u64>) -> Vec<BackendEvent> {
        self.stats.stale += 1;
        get_logger().debug(COMPONENT, &format!("Ignoring stale {kind} for request {request_id:?}"));
        Vec::new()
    }

    fn on_response(&mut self, response: WorkerResponse) -> Vec<BackendEvent> {
        let request_id = response.request_id();
        match response {
            WorkerResponse::WorkerReady => {
                get_logger().debug(COMPONENT, "Worker script loaded");
                Vec::new()
            }
            WorkerResponse::CanvasReady { success: true, .. } => {
                if self.state != ChannelState::Initializing {
                    return Vec::new();
                }
                self.deadline = None;
                self.state = ChannelState::Ready;
                get_logger().info(COMPONENT, "✅ Offscreen surface ready");
                vec![BackendEvent::Ready]
            }
            WorkerResponse::CanvasReady { success: false, error } => {
                let error = BenchError::Surface(error.unwrap_or_else(|| "Canvas initialization failed".to_string()));
                get_logger().error(COMPONENT, &format!("❌ {error}"));
                self.fail(error.clone());
                vec![BackendEvent::Lost(error)]
            }
            WorkerResponse::ProcessingComplete { result, .. } => {
                if !self.matches_in_flight(request_id) {
                    return self.ignore_stale("PROCESSING_COMPLETE", request_id);
                }
                if let Some(in_flight) = self.in_flight.as_mut() {
                    in_flight.brightness = Some(result);
                }
                Vec::new()
            }
            WorkerResponse::RenderComplete { timing, dimensions, .. } => {
                if !self.matches_in_flight(request_id) {
                    return self.ignore_stale("RENDER_COMPLETE", request_id);
                }
                let brightness = self.in_flight.take().and_then(|f| f.brightness);
                self.deadline = None;
                self.state = ChannelState::Ready;
                self.stats.completed += 1;
                vec![BackendEvent::Finished(Ok(RenderReport {
                    timing: Some(timing),
                    dimensions: Some(dimensions),
                    brightness,
                }))]
            }
            WorkerResponse::RenderError { error, .. } => {
                if !self.matches_in_flight(request_id) {
                    return self.ignore_stale("RENDER_ERROR", request_id);
                }
                self.in_flight = None;
                self.deadline = None;
                self.state = ChannelState::Ready;
                self.stats.failed += 1;
                let error = BenchError::Decode(error);
                self.last_error = Some(error.clone());
                vec![BackendEvent::Finished(Err(error))]
            }
            WorkerResponse::CleanupComplete => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::render::{Dimensions, RenderTiming};
    use crate::testing::{ManualScheduler, RecordingWorkerPort};

    struct Harness {
        channel: RenderWorkerChannel,
        port: RecordingWorkerPort,
        scheduler: ManualScheduler,
        events: Rc<RefCell<Vec<BackendEvent>>>,
    }

    fn harness(capabilities: RenderCapabilities) -> Harness {
        let scheduler = ManualScheduler::new();
        let port = RecordingWorkerPort::new();
        let channel = RenderWorkerChannel::new(
            ChannelConfig::default(),
            capabilities,
            port.factory(),
            Rc::new(scheduler.clone()),
            Rc::new(scheduler.clone()),
        );
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        channel.set_listener(Rc::new(move |event| sink.borrow_mut().push(event)));
        Harness { channel, port, scheduler, events }
    }

    fn ready() -> Harness {
        let h = harness(RenderCapabilities::FULL);
        h.channel.start().unwrap();
        h.scheduler.advance(50.0);
        h.port.respond(WorkerResponse::CanvasReady { success: true, error: None });
        h.events.borrow_mut().clear();
        h
    }

    fn complete(id: u64) -> WorkerResponse {
        WorkerResponse::RenderComplete {
            request_id: id,
            timing: RenderTiming { blob_creation: 1.0, image_load: 2.0, rendering: 1.0, total: 4.0 },
            dimensions: Dimensions { width: 320, height: 240 },
        }
    }

    #[test]
    fn surface_is_transferred_after_settle_delay() {
        let h = harness(RenderCapabilities::FULL);
        h.channel.start().unwrap();
        assert_eq!(h.channel.state(), ChannelState::Initializing);
        assert!(h.port.has_handler());
        assert_eq!(h.port.transfers(), 0);

        h.scheduler.advance(49.0);
        assert_eq!(h.port.transfers(), 0);
        h.scheduler.advance(1.0);
        assert_eq!(h.port.transfers(), 1);

        h.port.respond(WorkerResponse::CanvasReady { success: true, error: None });
        assert_eq!(h.channel.state(), ChannelState::Ready);
        assert_eq!(*h.events.borrow(), vec![BackendEvent::Ready]);
    }

    #[test]
    fn unsupported_environment_never_spawns() {
        let h = harness(RenderCapabilities { offscreen_transfer: false, workers: true });
        let err = h.channel.start().unwrap_err();
        assert!(err.is_permanent());
        assert_eq!(h.channel.state(), ChannelState::Errored);
        assert_eq!(h.port.spawned(), 0);
        assert_eq!(h.scheduler.pending(), 0);
    }

    #[test]
    fn failed_transfer_is_reported_not_hung() {
        let h = harness(RenderCapabilities::FULL);
        h.port.fail_transfer("InvalidStateError");
        h.channel.start().unwrap();
        h.scheduler.advance(50.0);
        assert_eq!(h.channel.state(), ChannelState::Errored);
        assert!(matches!(h.events.borrow()[0], BackendEvent::Lost(BenchError::Surface(_))));
        assert_eq!(h.scheduler.pending(), 0);
    }

    #[test]
    fn silent_worker_fails_initialization() {
        let h = harness(RenderCapabilities::FULL);
        h.channel.start().unwrap();
        h.scheduler.advance(5_050.0);
        assert_eq!(h.channel.state(), ChannelState::Errored);
        assert!(matches!(h.events.borrow()[0], BackendEvent::Lost(BenchError::Capability(_))));
    }

    #[test]
    fn busy_channel_rejects_without_touching_in_flight_request() {
        let h = ready();
        let id = h.channel.render(&FramePayload::base64("AAAA")).unwrap();
        assert_eq!(h.channel.render(&FramePayload::base64("BBBB")), Err(BenchError::Busy));
        assert_eq!(h.port.renders(), vec![id]);

        h.port.respond(complete(id));
        assert_eq!(h.channel.state(), ChannelState::Ready);
        assert!(matches!(h.events.borrow()[0], BackendEvent::Finished(Ok(_))));
        assert_eq!(h.channel.stats().rejected_busy, 1);
    }

    #[test]
    fn brightness_is_attached_to_completion() {
        let h = ready();
        let id = h.channel.render(&FramePayload::binary(vec![1, 2, 3])).unwrap();
        let result = BrightnessReport { avg_brightness: 128.0, processing_time: 0.4, pixels_analyzed: 10_000 };
        h.port.respond(WorkerResponse::ProcessingComplete { request_id: id, result });
        h.port.respond(complete(id));
        let events = h.events.borrow();
        let BackendEvent::Finished(Ok(report)) = &events[0] else { panic!("expected completion") };
        assert_eq!(report.brightness, Some(result));
        assert_eq!(report.dimensions, Some(Dimensions { width: 320, height: 240 }));
    }

    #[test]
    fn timeout_fires_once_and_late_completion_is_ignored() {
        let h = ready();
        let id = h.channel.render(&FramePayload::base64("AAAA")).unwrap();
        h.scheduler.advance(4_999.0);
        assert_eq!(h.channel.state(), ChannelState::Processing);
        h.scheduler.advance(1.0);
        assert_eq!(h.channel.state(), ChannelState::Ready);
        assert_eq!(*h.events.borrow(), vec![BackendEvent::Finished(Err(BenchError::Timeout { after_ms: 5_000 }))]);

        h.scheduler.advance(10_000.0);
        h.port.respond(complete(id));
        assert_eq!(h.events.borrow().len(), 1);
        assert_eq!(h.channel.stats().timeouts, 1);
        assert_eq!(h.channel.stats().stale, 1);

        let next = h.channel.render(&FramePayload::base64("BBBB")).unwrap();
        assert_ne!(next, id);
    }

    #[test]
    fn render_error_frees_the_channel() {
        let h = ready();
        let id = h.channel.render(&FramePayload::base64("AAAA")).unwrap();
        h.port.respond(WorkerResponse::RenderError { request_id: Some(id), error: "bad jpeg".into() });
        assert_eq!(h.channel.state(), ChannelState::Ready);
        assert_eq!(*h.events.borrow(), vec![BackendEvent::Finished(Err(BenchError::Decode("bad jpeg".into())))]);
        assert_eq!(h.scheduler.pending(), 0);
    }

    #[test]
    fn teardown_is_safe_in_every_state() {
        let fresh = harness(RenderCapabilities::FULL);
        fresh.channel.teardown();
        fresh.channel.teardown();
        assert_eq!(fresh.port.spawned(), 0);

        let unsupported = harness(RenderCapabilities::NONE);
        let _ = unsupported.channel.start();
        unsupported.channel.teardown();

        let h = ready();
        h.channel.render(&FramePayload::base64("AAAA")).unwrap();
        h.channel.teardown();
        assert!(h.port.terminated());
        assert_eq!(h.port.commands().last(), Some(&"CLEANUP"));
        assert_eq!(h.scheduler.pending(), 0);
        assert_eq!(h.channel.render(&FramePayload::base64("AAAA")), Err(BenchError::NotReady));
    }
}
