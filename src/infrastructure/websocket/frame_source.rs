use std::cell::RefCell;
use std::rc::Rc;

use futures::StreamExt;
use futures::channel::oneshot;
use futures::future::{Either, select};
use gloo_net::websocket::futures::WebSocket;
use strum::Display;

use super::client_handle::SourceHandle;
use super::dto::{IncomingMessage, decode_message};
use crate::domain::{
    admission::{Admission, AdmissionControl, AdmissionStats},
    clock::Clock,
    errors::{BenchError, BenchResult},
    frame::{Encoding, Frame},
    logging::{LogComponent, get_logger},
    store::{FrameSlot, Subscription},
};

/// Lifecycle of the underlying socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
    Failed,
}

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Published { seq: u64 },
    Throttled,
    Rejected(BenchError),
}

/// Reader-loop core: decode, admit, publish.
///
/// Owns the admission state of one source. Never fails: every problem with a
/// message is logged and counted, then the message is dropped.
pub struct FrameIngest {
    encoding: Encoding,
    admission: RefCell<AdmissionControl>,
    slot: FrameSlot,
    clock: Rc<dyn Clock>,
}

impl FrameIngest {
    pub fn new(encoding: Encoding, admission: AdmissionControl, slot: FrameSlot, clock: Rc<dyn Clock>) -> Self {
        Self { encoding, admission: RefCell::new(admission), slot, clock }
    }

    pub fn on_message(&self, message: IncomingMessage) -> IngestOutcome {
        let now = self.clock.now_ms();
        let frame = match decode_message(self.encoding, message, now) {
            Ok(frame) => frame,
            Err(e) => {
                self.admission.borrow_mut().record_rejected();
                get_logger().warn(
                    LogComponent::Infrastructure("FrameSource"),
                    &format!("Dropping {} message: {e}", self.encoding),
                );
                return IngestOutcome::Rejected(e);
            }
        };
        self.on_frame(frame)
    }

    /// Admission + publish for an already decoded frame.
    ///
    /// The admission borrow is released before subscribers run, so they may
    /// read back into the source.
    pub fn on_frame(&self, frame: Frame) -> IngestOutcome {
        let admission = self.admission.borrow_mut().offer(frame.received_at_ms());
        match admission {
            Admission::Admitted => {
                let seq = frame.seq();
                self.slot.publish(frame);
                IngestOutcome::Published { seq }
            }
            Admission::Throttled => IngestOutcome::Throttled,
        }
    }

    pub fn stats(&self) -> AdmissionStats {
        self.admission.borrow().stats()
    }

    pub fn slot(&self) -> &FrameSlot {
        &self.slot
    }
}

/// What a reader loop needs from its [`FrameSource`]: the stop signal, the
/// ingest it feeds and the state cell it keeps current.
pub struct SocketLink {
    pub stop: oneshot::Receiver<()>,
    pub ingest: Rc<FrameIngest>,
    pub state: Rc<RefCell<ConnectionState>>,
}

impl SocketLink {
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.borrow_mut() = state;
    }
}

/// Opens the socket behind a [`FrameSource`] and runs its reader loop.
///
/// The loop must drop `link.stop` when it ends, so the source can tell a
/// finished connection from a live one.
pub trait SocketConnector {
    fn open(&self, url: &str, link: SocketLink) -> BenchResult<()>;
}

/// `gloo-net` WebSocket driven on the page's microtask queue.
pub struct GlooConnector;

impl SocketConnector for GlooConnector {
    fn open(&self, url: &str, link: SocketLink) -> BenchResult<()> {
        let ws = WebSocket::open(url)
            .map_err(|e| BenchError::Transport(format!("Failed to open WebSocket {url}: {e:?}")))?;
        wasm_bindgen_futures::spawn_local(pump(ws, link));
        Ok(())
    }
}

/// One streaming connection feeding one latest-frame slot.
///
/// `connect(None)` is a deliberate no-op so a caller can declare a source
/// without paying for a socket.
pub struct FrameSource {
    encoding: Encoding,
    ingest: Rc<FrameIngest>,
    state: Rc<RefCell<ConnectionState>>,
    connector: Rc<dyn SocketConnector>,
    handle: Option<SourceHandle>,
}

impl FrameSource {
    pub fn new(
        encoding: Encoding,
        slot: FrameSlot,
        admission: AdmissionControl,
        clock: Rc<dyn Clock>,
        connector: Rc<dyn SocketConnector>,
    ) -> Self {
        Self {
            encoding,
            ingest: Rc::new(FrameIngest::new(encoding, admission, slot, clock)),
            state: Rc::new(RefCell::new(ConnectionState::Idle)),
            connector,
            handle: None,
        }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn stats(&self) -> AdmissionStats {
        self.ingest.stats()
    }

    pub fn slot(&self) -> FrameSlot {
        self.ingest.slot().clone()
    }

    /// Entry point the reader loop feeds; also usable to inject messages.
    pub fn ingest(&self) -> &FrameIngest {
        &self.ingest
    }

    /// A socket is open or opening and its reader loop is still running.
    pub fn is_connected(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_closed())
            && matches!(self.state(), ConnectionState::Connecting | ConnectionState::Open)
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.handle.as_ref().map(|h| h.endpoint())
    }

    pub fn on_frame(&self, callback: impl Fn(&Frame) + 'static) -> Subscription {
        self.slot().subscribe(callback)
    }

    /// Open the socket and start the reader loop.
    ///
    /// Reconnecting to a different endpoint, or after the previous socket
    /// closed or failed, replaces the old connection; connecting to the
    /// endpoint of a live connection is a no-op.
    pub fn connect(&mut self, endpoint: Option<&str>) -> BenchResult<()> {
        let Some(url) = endpoint.filter(|u| !u.is_empty()) else {
            get_logger().debug(
                LogComponent::Infrastructure("FrameSource"),
                &format!("No {} endpoint configured; source stays idle", self.encoding),
            );
            return Ok(());
        };

        if self.is_connected() && self.endpoint() == Some(url) {
            return Ok(());
        }
        self.disconnect();

        *self.state.borrow_mut() = ConnectionState::Connecting;
        let (handle, stop) = SourceHandle::new(url);
        let link = SocketLink { stop, ingest: self.ingest.clone(), state: self.state.clone() };
        if let Err(e) = self.connector.open(url, link) {
            *self.state.borrow_mut() = ConnectionState::Failed;
            return Err(e);
        }

        get_logger().info(
            LogComponent::Infrastructure("FrameSource"),
            &format!("🔌 Connecting {} stream: {url}", self.encoding),
        );
        self.handle = Some(handle);
        Ok(())
    }

    /// Close the socket. Safe to call any number of times.
    pub fn disconnect(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            if handle.close() {
                *self.state.borrow_mut() = ConnectionState::Closed;
                get_logger().info(
                    LogComponent::Infrastructure("FrameSource"),
                    &format!("{} stream disconnected from {}", self.encoding, handle.endpoint()),
                );
            }
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn pump(mut ws: WebSocket, link: SocketLink) {
    let SocketLink { mut stop, ingest, state } = link;
    let mut stopped = false;
    loop {
        match select(ws.next(), &mut stop).await {
            Either::Left((Some(Ok(message)), _)) => {
                *state.borrow_mut() = ConnectionState::Open;
                ingest.on_message(message.into());
            }
            Either::Left((Some(Err(e)), _)) => {
                // The latest frame is left untouched; no automatic reconnect.
                get_logger().error(
                    LogComponent::Infrastructure("FrameSource"),
                    &format!("❌ WebSocket error: {e:?}"),
                );
                *state.borrow_mut() = ConnectionState::Failed;
                break;
            }
            Either::Left((None, _)) => {
                get_logger().warn(LogComponent::Infrastructure("FrameSource"), "WebSocket closed by peer");
                *state.borrow_mut() = ConnectionState::Closed;
                break;
            }
            Either::Right(_) => {
                stopped = true;
                break;
            }
        }
    }
    drop(stop);

    if stopped {
        *state.borrow_mut() = ConnectionState::Closed;
        if let Err(e) = ws.close(Some(1000), Some("client disconnect")) {
            get_logger().debug(
                LogComponent::Infrastructure("FrameSource"),
                &format!("Close on an already closed socket: {e:?}"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::ManualClock;

    fn ingest(encoding: Encoding) -> (FrameIngest, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::new(0.0));
        (FrameIngest::new(encoding, AdmissionControl::default(), FrameSlot::new(), clock.clone()), clock)
    }

    #[test]
    fn parse_failure_is_counted_and_slot_untouched() {
        let (ingest, _) = ingest(Encoding::Base64);
        let outcome = ingest.on_message(IncomingMessage::Text("{oops".into()));
        assert!(matches!(outcome, IngestOutcome::Rejected(BenchError::Decode(_))));
        assert_eq!(ingest.stats().dropped, 1);
        assert!(ingest.slot().latest().is_none());
    }

    #[test]
    fn admitted_frame_becomes_latest() {
        let (ingest, clock) = ingest(Encoding::Binary);
        let first = ingest.on_message(IncomingMessage::Bytes(vec![1, 2, 3]));
        clock.advance(50.0);
        let second = ingest.on_message(IncomingMessage::Bytes(vec![4, 5, 6]));
        clock.advance(60.0);
        let third = ingest.on_message(IncomingMessage::Bytes(vec![7, 8, 9]));

        assert!(matches!(first, IngestOutcome::Published { .. }));
        assert_eq!(second, IngestOutcome::Throttled);
        let IngestOutcome::Published { seq } = third else { panic!("third frame should pass") };
        assert_eq!(ingest.slot().latest().map(|f| f.seq()), Some(seq));
        assert_eq!(ingest.stats(), AdmissionStats { processed: 2, dropped: 1 });
    }
}
