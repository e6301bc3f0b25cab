use base64::{Engine, engine::general_purpose::STANDARD};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use frame_bench_wasm::infrastructure::rendering::average_brightness;
use frame_bench_wasm::infrastructure::websocket::{decode_base64_envelope, decode_binary_frame};
use std::hint::black_box;
use std::time::Duration;

/// Pseudo JPEG body: the decoder never looks inside, only the size matters.
fn payload(kb: usize) -> Vec<u8> {
    (0..kb * 1024).map(|i| (i * 31 % 251) as u8).collect()
}

/// Envelope parse plus Base64 decode against wrapping the raw bytes.
fn bench_decode_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_paths");
    group.measurement_time(Duration::from_secs(5));

    for kb in [10usize, 50, 200] {
        let bytes = payload(kb);
        let envelope = format!(r#"{{"image":"{}","timestamp":1700000000000}}"#, STANDARD.encode(&bytes));

        group.bench_with_input(BenchmarkId::new("base64", kb), &envelope, |b, envelope| {
            b.iter(|| {
                let frame = decode_base64_envelope(black_box(envelope), 0.0).ok();
                frame.and_then(|f| f.payload().to_bytes().ok().map(|b| b.len()))
            })
        });
        group.bench_with_input(BenchmarkId::new("binary", kb), &bytes, |b, bytes| {
            b.iter(|| {
                let frame = decode_binary_frame(black_box(bytes.clone()), 0.0).ok();
                frame.and_then(|f| f.payload().to_bytes().ok().map(|b| b.len()))
            })
        });
    }
    group.finish();
}

fn bench_brightness(c: &mut Criterion) {
    let rgba: Vec<u8> = (0..200 * 150 * 4).map(|i| (i % 256) as u8).collect();
    let mut group = c.benchmark_group("brightness");
    for sample_bytes in [4_000usize, 40_000, 120_000] {
        group.bench_with_input(BenchmarkId::from_parameter(sample_bytes), &sample_bytes, |b, &n| {
            b.iter(|| average_brightness(black_box(&rgba), n))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_decode_paths, bench_brightness);
criterion_main!(benches);
