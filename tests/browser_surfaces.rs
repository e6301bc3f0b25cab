#![cfg(target_arch = "wasm32")]

use std::rc::Rc;

use frame_bench_wasm::application::{BenchConfig, Strategy};
use frame_bench_wasm::domain::{Clock, FramePayload, RenderBackend};
use frame_bench_wasm::infrastructure::object_url::ObjectUrlManager;
use frame_bench_wasm::infrastructure::rendering::RenderCapabilities;
use frame_bench_wasm::infrastructure::services::PerformanceClock;
use frame_bench_wasm::presentation::build_backend;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn browser_blob_urls_are_created_and_revoked() {
    let mut manager = ObjectUrlManager::browser();
    let url = manager.get_or_create(&FramePayload::binary(vec![0xFF, 0xD8, 0xFF]), "image/jpeg").unwrap();
    assert!(url.starts_with("blob:"));
    manager.release_all();
    assert_eq!(manager.revoked(), 1);
    assert!(manager.live_url().is_none());
}

#[wasm_bindgen_test]
fn performance_clock_is_monotonic() {
    let clock = PerformanceClock::new();
    let first = clock.now_ms();
    let second = clock.now_ms();
    assert!(second >= first);
}

#[wasm_bindgen_test]
fn page_has_workers() {
    assert!(RenderCapabilities::detect().workers);
}

#[wasm_bindgen_test]
fn fallback_swaps_in_a_fresh_canvas_with_the_same_attributes() {
    let document = web_sys::window().unwrap().document().unwrap();
    let old = document.create_element("canvas").unwrap();
    old.set_attribute("id", "fallback-swap").unwrap();
    old.set_attribute("class", "frame-surface").unwrap();
    document.body().unwrap().append_child(&old).unwrap();

    let config = BenchConfig::default();
    let (_, fallback) =
        build_backend(Strategy::BinaryOffscreen, old.clone(), &config, Rc::new(PerformanceClock::new())).unwrap();
    let fallback = fallback.unwrap()().unwrap();
    assert_eq!(fallback.name(), "fallback-canvas");

    let mounted = document.get_element_by_id("fallback-swap").unwrap();
    assert!(mounted != old);
    assert_eq!(mounted.get_attribute("class").as_deref(), Some("frame-surface"));
    assert_eq!(mounted.get_attribute("width").as_deref(), Some(config.surface_width.to_string().as_str()));
    assert!(old.parent_node().is_none());
}
