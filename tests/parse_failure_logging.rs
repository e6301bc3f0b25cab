use frame_bench_wasm::domain::logging::{LogLevel, MemoryLogger, init_logger};
use frame_bench_wasm::domain::{AdmissionControl, Encoding, FrameSlot, ManualClock};
use frame_bench_wasm::infrastructure::websocket::{FrameIngest, IncomingMessage};
use std::rc::Rc;
use std::sync::Arc;

// The logger is process-wide, so this binary holds a single test.
#[test]
fn malformed_messages_are_logged_and_dropped() {
    let logger = Arc::new(MemoryLogger::new());
    init_logger(Box::new(logger.clone()));

    let slot = FrameSlot::new();
    let ingest = FrameIngest::new(Encoding::Base64, AdmissionControl::new(0.0), slot.clone(), Rc::new(ManualClock::new(0.0)));

    ingest.on_message(IncomingMessage::Text("{\"image\":".to_string()));
    ingest.on_message(IncomingMessage::Text(r#"{"image":""}"#.to_string()));
    ingest.on_message(IncomingMessage::Bytes(vec![1, 2, 3]));

    assert_eq!(logger.count_matching(LogLevel::Warn, "Dropping base64 message"), 3);
    assert_eq!(ingest.stats().dropped, 3);
    assert!(slot.latest().is_none());
}
