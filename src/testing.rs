//! Deterministic doubles for the browser seams.
//!
//! Every state machine in the crate talks to the page through a trait
//! (`Clock`, `Scheduler`, `BlobUrlFactory`, `SocketConnector`, `WorkerPort`,
//! `RenderBackend`);
//! these implementations record what they were asked to do and let a test
//! decide when and how each call completes.

use std::cell::RefCell;
use std::rc::Rc;

pub use crate::domain::clock::ManualClock;
pub use crate::infrastructure::scheduler::ManualScheduler;

use crate::domain::{
    errors::{BenchError, BenchResult},
    frame::Frame,
    render::{BackendEvent, BackendNotifier, RenderBackend, RenderReport},
};
use crate::infrastructure::object_url::BlobUrlFactory;
use crate::infrastructure::rendering::protocol::{WorkerCommand, WorkerResponse};
use crate::infrastructure::rendering::worker_channel::{PortEvent, PortFactory, PortHandler, WorkerPort};
use crate::infrastructure::websocket::{ConnectionState, IncomingMessage, SocketConnector, SocketLink};

/// In-memory `URL.createObjectURL`: hands out `blob:test/<n>`.
#[derive(Default)]
pub struct RecordingBlobUrls {
    created: RefCell<Vec<(String, String)>>,
    revoked: RefCell<Vec<String>>,
}

impl RecordingBlobUrls {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(url, mime type)` of every URL created so far.
    pub fn created(&self) -> Vec<(String, String)> {
        self.created.borrow().clone()
    }

    pub fn revoked(&self) -> Vec<String> {
        self.revoked.borrow().clone()
    }

    /// URLs created and not yet revoked.
    pub fn live(&self) -> usize {
        let revoked = self.revoked.borrow();
        self.created.borrow().iter().filter(|(url, _)| !revoked.contains(url)).count()
    }
}

impl BlobUrlFactory for RecordingBlobUrls {
    fn create(&self, _bytes: &[u8], mime_type: &str) -> BenchResult<String> {
        let mut created = self.created.borrow_mut();
        let url = format!("blob:test/{}", created.len() + 1);
        created.push((url.clone(), mime_type.to_string()));
        Ok(url)
    }

    fn revoke(&self, url: &str) {
        self.revoked.borrow_mut().push(url.to_string());
    }
}

struct OpenedSocket {
    url: String,
    /// `None` once the reader loop has ended.
    link: Option<SocketLink>,
}

/// Socket connector without sockets: each `open` records the URL and keeps
/// the reader-side link so a test can feed messages or end the connection.
#[derive(Clone, Default)]
pub struct RecordingConnector {
    opened: Rc<RefCell<Vec<OpenedSocket>>>,
    fail_next: Rc<RefCell<Option<BenchError>>>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_open(&self, error: BenchError) {
        *self.fail_next.borrow_mut() = Some(error);
    }

    /// URL of every socket opened so far, in order.
    pub fn opened(&self) -> Vec<String> {
        self.opened.borrow().iter().map(|s| s.url.clone()).collect()
    }

    /// Whether socket `index` was told to stop or has ended.
    pub fn stopped(&self, index: usize) -> bool {
        let mut opened = self.opened.borrow_mut();
        match opened.get_mut(index).and_then(|s| s.link.as_mut()) {
            Some(link) => !matches!(link.stop.try_recv(), Ok(None)),
            None => true,
        }
    }

    /// Feed one message through socket `index` as its reader loop would.
    pub fn deliver(&self, index: usize, message: IncomingMessage) {
        let ingest = {
            let opened = self.opened.borrow();
            let Some(link) = opened.get(index).and_then(|s| s.link.as_ref()) else {
                return;
            };
            link.set_state(ConnectionState::Open);
            link.ingest.clone()
        };
        ingest.on_message(message);
    }

    /// End socket `index` from the far side, leaving `state` behind.
    pub fn end(&self, index: usize, state: ConnectionState) {
        let link = self.opened.borrow_mut().get_mut(index).and_then(|s| s.link.take());
        if let Some(link) = link {
            link.set_state(state);
        }
    }
}

impl SocketConnector for RecordingConnector {
    fn open(&self, url: &str, link: SocketLink) -> BenchResult<()> {
        if let Some(error) = self.fail_next.borrow_mut().take() {
            return Err(error);
        }
        self.opened.borrow_mut().push(OpenedSocket { url: url.to_string(), link: Some(link) });
        Ok(())
    }
}

#[derive(Default)]
struct PortLog {
    spawned: usize,
    transfers: usize,
    transfer_error: Option<String>,
    commands: Vec<WorkerCommand>,
    terminated: bool,
    handler: Option<PortHandler>,
}

/// Worker port whose worker is the test itself: commands are recorded and
/// responses are injected with [`RecordingWorkerPort::respond`].
#[derive(Clone, Default)]
pub struct RecordingWorkerPort {
    log: Rc<RefCell<PortLog>>,
}

impl RecordingWorkerPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory that "spawns" this port.
    pub fn factory(&self) -> PortFactory {
        let port = self.clone();
        Box::new(move || {
            port.log.borrow_mut().spawned += 1;
            Ok(Box::new(port) as Box<dyn WorkerPort>)
        })
    }

    /// Make the next surface transfer fail with `reason`.
    pub fn fail_transfer(&self, reason: &str) {
        self.log.borrow_mut().transfer_error = Some(reason.to_string());
    }

    pub fn respond(&self, response: WorkerResponse) {
        self.deliver(PortEvent::Response(response));
    }

    pub fn crash(&self, reason: &str) {
        self.deliver(PortEvent::Crashed(reason.to_string()));
    }

    pub fn send_malformed(&self, reason: &str) {
        self.deliver(PortEvent::Malformed(reason.to_string()));
    }

    fn deliver(&self, event: PortEvent) {
        let handler = self.log.borrow_mut().handler.take();
        if let Some(mut handler) = handler {
            handler(event);
            let mut log = self.log.borrow_mut();
            if log.handler.is_none() && !log.terminated {
                log.handler = Some(handler);
            }
        }
    }

    pub fn spawned(&self) -> usize {
        self.log.borrow().spawned
    }

    pub fn transfers(&self) -> usize {
        self.log.borrow().transfers
    }

    pub fn has_handler(&self) -> bool {
        self.log.borrow().handler.is_some()
    }

    pub fn terminated(&self) -> bool {
        self.log.borrow().terminated
    }

    /// Kind of every command posted, in order.
    pub fn commands(&self) -> Vec<&'static str> {
        self.log.borrow().commands.iter().map(WorkerCommand::kind).collect()
    }

    /// Request ids of every `RENDER_IMAGE` posted, in order.
    pub fn renders(&self) -> Vec<u64> {
        self.log
            .borrow()
            .commands
            .iter()
            .filter_map(|command| match command {
                WorkerCommand::RenderImage { request_id, .. } => Some(*request_id),
                _ => None,
            })
            .collect()
    }
}

impl WorkerPort for RecordingWorkerPort {
    fn set_handler(&mut self, handler: PortHandler) {
        self.log.borrow_mut().handler = Some(handler);
    }

    fn transfer_surface(&mut self, width: u32, height: u32) -> BenchResult<()> {
        let mut log = self.log.borrow_mut();
        if let Some(reason) = log.transfer_error.take() {
            return Err(BenchError::Surface(reason));
        }
        log.transfers += 1;
        log.commands.push(WorkerCommand::InitCanvas { width, height });
        Ok(())
    }

    fn post(&mut self, command: WorkerCommand) -> BenchResult<()> {
        let mut log = self.log.borrow_mut();
        if log.terminated {
            return Err(BenchError::NotReady);
        }
        log.commands.push(command);
        Ok(())
    }

    fn terminate(&mut self) {
        let mut log = self.log.borrow_mut();
        log.terminated = true;
        log.handler = None;
    }
}

struct BackendLog {
    name: &'static str,
    ready_on_init: bool,
    ready: bool,
    busy: bool,
    notify: Option<BackendNotifier>,
    dispatched: Vec<Frame>,
    fail_next_dispatch: Option<BenchError>,
    init_error: Option<BenchError>,
    initialized: usize,
    torn_down: bool,
}

/// Render backend completed by hand.
///
/// `dispatch` records the frame and leaves it in flight until the test calls
/// [`complete`](RecordingBackend::complete) or [`fail`](RecordingBackend::fail).
#[derive(Clone)]
pub struct RecordingBackend {
    log: Rc<RefCell<BackendLog>>,
}

impl RecordingBackend {
    pub fn new(name: &'static str) -> Self {
        Self {
            log: Rc::new(RefCell::new(BackendLog {
                name,
                ready_on_init: true,
                ready: false,
                busy: false,
                notify: None,
                dispatched: Vec::new(),
                fail_next_dispatch: None,
                init_error: None,
                initialized: 0,
                torn_down: false,
            })),
        }
    }

    /// Whether `initialize` reports `Ready` straight away. Defaults to true.
    pub fn ready_on_init(self, ready: bool) -> Self {
        self.log.borrow_mut().ready_on_init = ready;
        self
    }

    /// Make `initialize` fail with `error`.
    pub fn fail_init(self, error: BenchError) -> Self {
        self.log.borrow_mut().init_error = Some(error);
        self
    }

    pub fn fail_next_dispatch(&self, error: BenchError) {
        self.log.borrow_mut().fail_next_dispatch = Some(error);
    }

    pub fn become_ready(&self) {
        self.log.borrow_mut().ready = true;
        self.emit(BackendEvent::Ready);
    }

    pub fn complete(&self) {
        self.complete_with(RenderReport::default());
    }

    pub fn complete_with(&self, report: RenderReport) {
        if self.settle() {
            self.emit(BackendEvent::Finished(Ok(report)));
        }
    }

    pub fn fail(&self, error: BenchError) {
        if self.settle() {
            self.emit(BackendEvent::Finished(Err(error)));
        }
    }

    pub fn lose(&self, error: BenchError) {
        {
            let mut log = self.log.borrow_mut();
            log.ready = false;
            log.busy = false;
        }
        self.emit(BackendEvent::Lost(error));
    }

    pub fn dispatched(&self) -> usize {
        self.log.borrow().dispatched.len()
    }

    pub fn dispatched_frames(&self) -> Vec<Frame> {
        self.log.borrow().dispatched.clone()
    }

    pub fn initialized(&self) -> usize {
        self.log.borrow().initialized
    }

    pub fn torn_down(&self) -> bool {
        self.log.borrow().torn_down
    }

    fn settle(&self) -> bool {
        let mut log = self.log.borrow_mut();
        std::mem::replace(&mut log.busy, false)
    }

    fn emit(&self, event: BackendEvent) {
        let notify = self.log.borrow().notify.clone();
        if let Some(notify) = notify {
            notify(event);
        }
    }
}

impl RenderBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        self.log.borrow().name
    }

    fn initialize(&mut self, notify: BackendNotifier) -> BenchResult<()> {
        let ready = {
            let mut log = self.log.borrow_mut();
            log.initialized += 1;
            if let Some(error) = log.init_error.take() {
                return Err(error);
            }
            log.notify = Some(notify);
            log.ready = log.ready_on_init;
            log.ready
        };
        if ready {
            self.emit(BackendEvent::Ready);
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        let log = self.log.borrow();
        log.ready && !log.torn_down
    }

    fn is_busy(&self) -> bool {
        self.log.borrow().busy
    }

    fn dispatch(&mut self, frame: &Frame) -> BenchResult<()> {
        let mut log = self.log.borrow_mut();
        if let Some(error) = log.fail_next_dispatch.take() {
            return Err(error);
        }
        if !log.ready || log.torn_down {
            return Err(BenchError::NotReady);
        }
        log.busy = true;
        log.dispatched.push(frame.clone());
        Ok(())
    }

    fn teardown(&mut self) {
        let mut log = self.log.borrow_mut();
        log.torn_down = true;
        log.ready = false;
        log.busy = false;
        log.notify = None;
    }
}
