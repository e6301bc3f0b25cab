//! One benchmark page: a frame source per encoding, a renderer per enabled
//! strategy, and the order in which all of it is released.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use strum::IntoEnumIterator;

use super::config::BenchConfig;
use super::renderer::{BackendFactory, RendererSnapshot, RendererStateMachine, SnapshotListener};
use super::strategy::{RenderPath, Strategy, needs_encoding};
use crate::domain::{
    admission::{AdmissionControl, AdmissionStats},
    clock::Clock,
    errors::BenchResult,
    frame::Encoding,
    logging::{LogComponent, get_logger},
    render::RenderBackend,
    store::FrameSlot,
};
use crate::infrastructure::websocket::{ConnectionState, FrameSource, GlooConnector, SocketConnector};

const COMPONENT: LogComponent = LogComponent::Application("BenchmarkSession");

/// What the diagnostics row of one source shows.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDiagnostics {
    pub encoding: Encoding,
    pub state: ConnectionState,
    pub endpoint: Option<String>,
    pub stats: AdmissionStats,
}

/// One step of [`BenchmarkSession::teardown`], in the order it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    CloseSource(Encoding),
    StopRenderer(Strategy),
    ClearSlot(Encoding),
}

pub struct BenchmarkSession {
    config: BenchConfig,
    clock: Rc<dyn Clock>,
    sources: BTreeMap<Encoding, FrameSource>,
    runners: BTreeMap<Strategy, RendererStateMachine>,
    torn_down: bool,
}

const ENCODINGS: [Encoding; 2] = [Encoding::Base64, Encoding::Binary];

impl BenchmarkSession {
    pub fn new(config: BenchConfig, clock: Rc<dyn Clock>) -> BenchResult<Self> {
        Self::with_connector(config, clock, Rc::new(GlooConnector))
    }

    pub fn with_connector(
        config: BenchConfig,
        clock: Rc<dyn Clock>,
        connector: Rc<dyn SocketConnector>,
    ) -> BenchResult<Self> {
        config.validate()?;
        let sources = ENCODINGS
            .iter()
            .map(|&encoding| {
                let source = FrameSource::new(
                    encoding,
                    FrameSlot::new(),
                    AdmissionControl::new(config.admission_interval_ms),
                    clock.clone(),
                    connector.clone(),
                );
                (encoding, source)
            })
            .collect();

        get_logger().info(COMPONENT, "🚀 Benchmark session created");
        Ok(Self { config, clock, sources, runners: BTreeMap::new(), torn_down: false })
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    pub fn source(&self, encoding: Encoding) -> Option<&FrameSource> {
        self.sources.get(&encoding)
    }

    pub fn slot(&self, encoding: Encoding) -> Option<FrameSlot> {
        self.source(encoding).map(FrameSource::slot)
    }

    /// Strategies with a running renderer, in catalogue order.
    pub fn enabled(&self) -> Vec<Strategy> {
        self.runners.keys().copied().collect()
    }

    pub fn is_enabled(&self, strategy: Strategy) -> bool {
        self.runners.contains_key(&strategy)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Start `strategy` on `backend`, replacing a running instance of it.
    /// Connects the source for its encoding if that source was idle.
    pub fn enable(
        &mut self,
        strategy: Strategy,
        backend: Box<dyn RenderBackend>,
        fallback: Option<BackendFactory>,
        listener: Option<SnapshotListener>,
    ) -> BenchResult<()> {
        if self.torn_down {
            return Ok(());
        }
        if let Some(mut previous) = self.runners.remove(&strategy) {
            previous.stop();
        }

        let mut runner =
            RendererStateMachine::new(strategy, backend, fallback, self.clock.clone(), self.config.tracker());
        if let Some(listener) = listener {
            runner.set_listener(listener);
        }
        if let Some(slot) = self.slot(strategy.encoding()) {
            runner.start(&slot);
        }
        self.runners.insert(strategy, runner);
        get_logger().info(COMPONENT, &format!("▶️ {strategy} enabled"));
        self.sync_connections()
    }

    /// Stop `strategy` and release everything it holds. Disconnects the
    /// source for its encoding once no other strategy reads from it.
    pub fn disable(&mut self, strategy: Strategy) -> BenchResult<()> {
        if let Some(mut runner) = self.runners.remove(&strategy) {
            runner.stop();
            get_logger().info(COMPONENT, &format!("⏹️ {strategy} disabled"));
        }
        self.sync_connections()
    }

    /// Connect exactly the sources some enabled strategy consumes.
    pub fn sync_connections(&mut self) -> BenchResult<()> {
        if self.torn_down {
            return Ok(());
        }
        let enabled = self.enabled();
        for encoding in ENCODINGS {
            let endpoint = self.config.endpoint(encoding).map(str::to_string);
            let Some(source) = self.sources.get_mut(&encoding) else {
                continue;
            };
            if needs_encoding(&enabled, encoding) {
                source.connect(endpoint.as_deref())?;
            } else {
                source.disconnect();
            }
        }
        Ok(())
    }

    pub fn snapshot(&self, strategy: Strategy) -> Option<RendererSnapshot> {
        self.runners.get(&strategy).map(RendererStateMachine::snapshot)
    }

    pub fn snapshots(&self) -> Vec<RendererSnapshot> {
        self.runners.values().map(RendererStateMachine::snapshot).collect()
    }

    pub fn diagnostics(&self) -> Vec<SourceDiagnostics> {
        self.sources
            .values()
            .map(|source| SourceDiagnostics {
                encoding: source.encoding(),
                state: source.state(),
                endpoint: source.endpoint().map(str::to_string),
                stats: source.stats(),
            })
            .collect()
    }

    /// Release everything, in a fixed order: sockets, then workers, then
    /// object URLs, then everything else that may hold a timer. Safe to call
    /// repeatedly; only the first call does anything.
    pub fn teardown(&mut self) -> Vec<TeardownStep> {
        if self.torn_down {
            return Vec::new();
        }
        self.torn_down = true;
        let mut steps = Vec::new();

        for encoding in ENCODINGS {
            if let Some(source) = self.sources.get_mut(&encoding) {
                source.disconnect();
                steps.push(TeardownStep::CloseSource(encoding));
            }
        }

        for path in [RenderPath::Offscreen, RenderPath::ObjectUrl, RenderPath::DataUrl] {
            for strategy in Strategy::iter().filter(|s| s.render_path() == path) {
                if let Some(mut runner) = self.runners.remove(&strategy) {
                    runner.stop();
                    steps.push(TeardownStep::StopRenderer(strategy));
                }
            }
        }

        for encoding in ENCODINGS {
            if let Some(source) = self.sources.get(&encoding) {
                source.slot().clear();
                steps.push(TeardownStep::ClearSlot(encoding));
            }
        }

        get_logger().info(COMPONENT, &format!("🧹 Session torn down in {} steps", steps.len()));
        steps
    }
}

/// A session shared by the page's components.
pub type SharedSession = Rc<RefCell<BenchmarkSession>>;

/// One change to a shared session.
pub type SessionOp = Box<dyn FnOnce(&mut BenchmarkSession)>;

/// Runs a task once the current call stack has unwound.
pub type Deferrer = Rc<dyn Fn(Box<dyn FnOnce()>)>;

/// Apply `op` now, or through `defer` while a caller further up the stack
/// still holds the session. A deferred op is retried until it runs.
pub fn apply_or_defer(session: &SharedSession, op: SessionOp, defer: &Deferrer) {
    match session.try_borrow_mut() {
        Ok(mut guard) => op(&mut *guard),
        Err(_) => {
            get_logger().debug(COMPONENT, "Session busy; deferring update");
            let session = session.clone();
            let retry = defer.clone();
            defer(Box::new(move || apply_or_defer(&session, op, &retry)));
        }
    }
}

impl Drop for BenchmarkSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
