/// `HH:MM:SS.mmm` (UTC) of a unix timestamp in milliseconds.
pub fn format_clock_time(unix_ms: u64) -> String {
    let millis = unix_ms % 1_000;
    let seconds = unix_ms / 1_000;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        (seconds / 3_600) % 24,
        (seconds / 60) % 60,
        seconds % 60,
        millis
    )
}

/// How far behind `now_ms` a frame stamped at `source_ms` is, e.g. `+240ms`
/// or `+1.2s`. Clock skew can put the producer ahead; that shows as `-…`.
pub fn format_frame_age(now_ms: u64, source_ms: u64) -> String {
    let (sign, delta) =
        if now_ms >= source_ms { ('+', now_ms - source_ms) } else { ('-', source_ms - now_ms) };
    if delta < 1_000 {
        format!("{sign}{delta}ms")
    } else {
        format!("{sign}{:.1}s", delta as f64 / 1_000.0)
    }
}
