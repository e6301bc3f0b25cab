#![cfg(feature = "logic-only")]

use frame_bench_wasm::time_utils::{format_clock_time, format_frame_age};
use wasm_bindgen_test::*;

#[wasm_bindgen_test]
fn clock_time_wraps_at_midnight() {
    assert_eq!(format_clock_time(86_400_000), "00:00:00.000");
    assert_eq!(format_clock_time(86_399_999), "23:59:59.999");
}

#[wasm_bindgen_test]
fn frame_age_basic() {
    assert_eq!(format_frame_age(5_000, 5_000), "+0ms");
    assert_eq!(format_frame_age(5_999, 5_000), "+999ms");
    assert_eq!(format_frame_age(7_000, 5_000), "+2.0s");
}
