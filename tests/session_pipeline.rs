use frame_bench_wasm::application::{
    BenchConfig, BenchmarkSession, Deferrer, RendererSnapshot, SessionOp, SharedSession, SnapshotListener, Strategy,
    apply_or_defer,
};
use frame_bench_wasm::domain::{BenchError, Encoding, ManualClock, RenderReport, RenderTiming};
use frame_bench_wasm::infrastructure::websocket::{ConnectionState, IncomingMessage, IngestOutcome};
use frame_bench_wasm::testing::{RecordingBackend, RecordingConnector};
use std::cell::RefCell;
use std::rc::Rc;

fn session() -> (BenchmarkSession, Rc<ManualClock>) {
    let clock = Rc::new(ManualClock::new(10_000.0));
    let config = BenchConfig { base64_endpoint: None, binary_endpoint: None, ..BenchConfig::default() };
    (BenchmarkSession::new(config, clock.clone()).unwrap(), clock)
}

const BASE64_URL: &str = "ws://localhost:8080/base64";

fn connected_session() -> (BenchmarkSession, RecordingConnector) {
    let connector = RecordingConnector::new();
    let config = BenchConfig { base64_endpoint: Some(BASE64_URL.to_string()), binary_endpoint: None, ..BenchConfig::default() };
    let session =
        BenchmarkSession::with_connector(config, Rc::new(ManualClock::new(0.0)), Rc::new(connector.clone())).unwrap();
    (session, connector)
}

fn enable(session: &mut BenchmarkSession, strategy: Strategy) {
    session.enable(strategy, Box::new(RecordingBackend::new("img")), None, None).unwrap();
}

fn envelope(kb: usize, timestamp: u64) -> IncomingMessage {
    IncomingMessage::Text(format!(r#"{{"image":"{}","timestamp":{timestamp}}}"#, "A".repeat(kb * 1024)))
}

#[test]
fn base64_frame_is_measured_end_to_end() {
    let (mut session, clock) = session();
    let backend = RecordingBackend::new("img-data-url");
    let published = Rc::new(RefCell::new(Vec::<RendererSnapshot>::new()));
    let sink = published.clone();
    let listener: SnapshotListener = Rc::new(move |snapshot: &RendererSnapshot| sink.borrow_mut().push(snapshot.clone()));
    session.enable(Strategy::Base64Direct, Box::new(backend.clone()), None, Some(listener)).unwrap();

    let outcome = session.source(Encoding::Base64).unwrap().ingest().on_message(envelope(50, 1_700_000_000_000));
    assert!(matches!(outcome, IngestOutcome::Published { .. }));
    assert_eq!(backend.dispatched(), 1);

    clock.advance(12.0);
    backend.complete_with(RenderReport {
        timing: Some(RenderTiming { blob_creation: 0.0, image_load: 12.0, rendering: 0.0, total: 12.0 }),
        ..RenderReport::default()
    });

    let snapshot = session.snapshot(Strategy::Base64Direct).unwrap();
    let latency = snapshot.metrics.latency_stats();
    assert!((latency.last - 12.0).abs() <= 2.0);
    assert_eq!(snapshot.metrics.size_stats().last, 50.0);
    assert_eq!(snapshot.rendered, 1);
    assert_eq!(snapshot.last_source_timestamp, Some(1_700_000_000_000));
    assert_eq!(published.borrow().last(), Some(&snapshot));
}

#[test]
fn burst_is_thinned_by_admission() {
    let (mut session, clock) = session();
    let backend = RecordingBackend::new("img-object-url");
    session.enable(Strategy::BinaryObjectUrl, Box::new(backend.clone()), None, None).unwrap();

    let source = session.source(Encoding::Binary).unwrap();
    for _ in 0..10 {
        source.ingest().on_message(IncomingMessage::Bytes(vec![0xFF, 0xD8, 0xFF]));
        backend.complete();
        clock.advance(20.0);
    }

    let stats = source.stats();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.dropped, 8);
    assert_eq!(backend.dispatched(), 2);
}

#[test]
fn unparseable_messages_count_as_dropped() {
    let (mut session, _) = session();
    session.enable(Strategy::Base64Direct, Box::new(RecordingBackend::new("img")), None, None).unwrap();
    let source = session.source(Encoding::Base64).unwrap();

    let outcome = source.ingest().on_message(IncomingMessage::Text("{not json".to_string()));
    assert!(matches!(outcome, IngestOutcome::Rejected(_)));
    assert_eq!(source.stats().dropped, 1);
    assert_eq!(source.stats().processed, 0);
}

#[test]
fn diagnostics_list_both_sources() {
    let (session, _) = session();
    let diagnostics = session.diagnostics();
    let encodings: Vec<Encoding> = diagnostics.iter().map(|d| d.encoding).collect();
    assert_eq!(encodings, vec![Encoding::Base64, Encoding::Binary]);
    assert!(diagnostics.iter().all(|d| d.state == ConnectionState::Idle && d.endpoint.is_none()));
}

#[test]
fn teardown_stops_every_backend_and_later_calls_are_inert() {
    let (mut session, _) = session();
    let backends: Vec<(Strategy, RecordingBackend)> =
        Strategy::all().into_iter().map(|s| (s, RecordingBackend::new("img"))).collect();
    for (strategy, backend) in &backends {
        session.enable(*strategy, Box::new(backend.clone()), None, None).unwrap();
    }

    let steps = session.teardown();
    assert_eq!(steps.len(), 2 + backends.len() + 2);
    assert!(backends.iter().all(|(_, b)| b.torn_down()));
    assert!(session.is_torn_down());

    assert!(session.teardown().is_empty());
    let late = RecordingBackend::new("img");
    session.enable(Strategy::Base64Direct, Box::new(late.clone()), None, None).unwrap();
    assert_eq!(late.initialized(), 0);
}

#[test]
fn disabling_mid_render_discards_the_late_completion() {
    let (mut session, _) = session();
    let backend = RecordingBackend::new("img-object-url");
    let published = Rc::new(RefCell::new(0usize));
    let counter = published.clone();
    let listener: SnapshotListener = Rc::new(move |_: &RendererSnapshot| *counter.borrow_mut() += 1);
    session.enable(Strategy::BinaryObjectUrl, Box::new(backend.clone()), None, Some(listener)).unwrap();

    session.source(Encoding::Binary).unwrap().ingest().on_message(IncomingMessage::Bytes(vec![0xFF, 0xD8]));
    assert_eq!(backend.dispatched(), 1);
    let before = *published.borrow();

    session.disable(Strategy::BinaryObjectUrl).unwrap();
    assert!(backend.torn_down());
    backend.complete();

    assert_eq!(*published.borrow(), before);
    assert!(session.snapshot(Strategy::BinaryObjectUrl).is_none());
    assert_eq!(session.slot(Encoding::Binary).unwrap().subscriber_count(), 0);
}

#[test]
fn source_stays_open_until_its_last_strategy_is_disabled() {
    let (mut session, connector) = connected_session();
    let state = |s: &BenchmarkSession| s.source(Encoding::Base64).unwrap().state();

    enable(&mut session, Strategy::Base64Direct);
    assert_eq!(connector.opened(), vec![BASE64_URL]);
    assert_eq!(state(&session), ConnectionState::Connecting);
    assert_eq!(session.source(Encoding::Base64).unwrap().endpoint(), Some(BASE64_URL));

    enable(&mut session, Strategy::Base64ObjectUrl);
    assert_eq!(connector.opened().len(), 1);

    session.disable(Strategy::Base64Direct).unwrap();
    assert!(!connector.stopped(0));
    assert!(session.source(Encoding::Base64).unwrap().is_connected());

    session.disable(Strategy::Base64ObjectUrl).unwrap();
    assert!(connector.stopped(0));
    assert_eq!(state(&session), ConnectionState::Closed);
    assert_eq!(session.source(Encoding::Base64).unwrap().endpoint(), None);
    assert_eq!(session.source(Encoding::Binary).unwrap().state(), ConnectionState::Idle);
}

#[test]
fn messages_flow_through_the_opened_socket() {
    let (mut session, connector) = connected_session();
    enable(&mut session, Strategy::Base64Direct);

    connector.deliver(0, envelope(1, 42));
    let source = session.source(Encoding::Base64).unwrap();
    assert_eq!(source.state(), ConnectionState::Open);
    assert_eq!(source.stats().processed, 1);
}

#[test]
fn source_closed_by_peer_reconnects_when_strategies_change() {
    let (mut session, connector) = connected_session();
    enable(&mut session, Strategy::Base64Direct);

    connector.end(0, ConnectionState::Closed);
    assert!(!session.source(Encoding::Base64).unwrap().is_connected());

    enable(&mut session, Strategy::Base64Offscreen);
    assert_eq!(connector.opened(), vec![BASE64_URL, BASE64_URL]);
    assert!(!connector.stopped(1));
    assert!(session.source(Encoding::Base64).unwrap().is_connected());
}

#[test]
fn failed_open_marks_the_source_failed() {
    let (mut session, connector) = connected_session();
    connector.fail_next_open(BenchError::Transport("refused".to_string()));

    let result = session.enable(Strategy::Base64Direct, Box::new(RecordingBackend::new("img")), None, None);
    assert!(matches!(result, Err(BenchError::Transport(_))));
    assert_eq!(session.source(Encoding::Base64).unwrap().state(), ConnectionState::Failed);

    session.sync_connections().unwrap();
    assert_eq!(connector.opened().len(), 1);
    assert!(session.source(Encoding::Base64).unwrap().is_connected());
}

#[test]
fn updates_made_while_the_session_is_borrowed_run_once_it_is_free() {
    let (session, _) = session();
    let shared: SharedSession = Rc::new(RefCell::new(session));
    let queue: Rc<RefCell<Vec<Box<dyn FnOnce()>>>> = Rc::default();
    let pending = queue.clone();
    let defer: Deferrer = Rc::new(move |task: Box<dyn FnOnce()>| pending.borrow_mut().push(task));

    let enable_op: SessionOp = Box::new(|s: &mut BenchmarkSession| {
        s.enable(Strategy::BinaryObjectUrl, Box::new(RecordingBackend::new("img")), None, None).unwrap()
    });
    {
        let _held = shared.borrow_mut();
        apply_or_defer(&shared, enable_op, &defer);
    }
    assert!(!shared.borrow().is_enabled(Strategy::BinaryObjectUrl));
    assert_eq!(queue.borrow().len(), 1);

    // Still busy on the first retry: the op is queued again, not lost.
    let held = shared.borrow_mut();
    let task = queue.borrow_mut().remove(0);
    task();
    drop(held);
    assert_eq!(queue.borrow().len(), 1);

    let task = queue.borrow_mut().remove(0);
    task();
    assert!(shared.borrow().is_enabled(Strategy::BinaryObjectUrl));

    let disable_op: SessionOp = Box::new(|s: &mut BenchmarkSession| s.disable(Strategy::BinaryObjectUrl).unwrap());
    apply_or_defer(&shared, disable_op, &defer);
    assert!(queue.borrow().is_empty());
    assert!(!shared.borrow().is_enabled(Strategy::BinaryObjectUrl));
}
