use std::cell::RefCell;
use std::rc::Rc;

use gloo_timers::callback::Interval;
use leptos::html::{Canvas, Img};
use leptos::*;
use wasm_bindgen::JsCast;
use web_sys::Event;

use crate::{
    application::{
        BenchConfig, BenchmarkSession, Deferrer, RendererSnapshot, SessionOp, SharedSession, SnapshotListener,
        SourceDiagnostics, Strategy, apply_or_defer,
    },
    domain::{
        clock::Clock,
        logging::{LogComponent, LogEntry, Logger, get_logger, get_time_provider},
        metrics::{format_latency, format_size},
    },
    event_utils::window_event_listener,
    global_state::{
        console_logs, enabled_strategies, globals, is_log_paused, publish_snapshot, push_console_line,
        renderer_snapshots, source_diagnostics,
    },
    infrastructure::services::{ConsoleLogger, PerformanceClock},
    presentation::build_backend,
    time_utils::{format_clock_time, format_frame_age},
};

/// Bridge from `domain::logging` to the browser console and the in-page
/// debug console.
pub struct LeptosLogger {
    console: ConsoleLogger,
}

impl LeptosLogger {
    pub fn new(console: ConsoleLogger) -> Self {
        Self { console }
    }
}

impl Logger for LeptosLogger {
    fn log(&self, entry: LogEntry) {
        let timestamp = get_time_provider().format_timestamp(entry.timestamp);
        push_console_line(format!("[{}] {} {}: {}", timestamp, entry.level, entry.component, entry.message));
        self.console.log(entry);
    }
}

/// Shared by every component of one mounted page.
#[derive(Clone)]
struct BenchContext {
    session: SharedSession,
    config: Rc<BenchConfig>,
    clock: Rc<dyn Clock>,
}

/// Mount the page into `<body>`.
pub fn mount(config: BenchConfig) {
    globals().enabled.set(config.enabled.clone());
    mount_to_body(move || view! { <App config=config /> });
}

#[component]
pub fn App(config: BenchConfig) -> impl IntoView {
    let clock: Rc<dyn Clock> = Rc::new(PerformanceClock::new());
    let session = match BenchmarkSession::new(config.clone(), clock.clone()) {
        Ok(session) => Rc::new(RefCell::new(session)),
        Err(e) => {
            get_logger().error(LogComponent::Presentation("App"), &format!("❌ {e}"));
            return view! { <div class="bench-fatal">{e.to_string()}</div> }.into_view();
        }
    };
    provide_context(BenchContext { session: session.clone(), config: Rc::new(config), clock });

    let teardown = {
        let session = session.clone();
        move || {
            let teardown: SessionOp = Box::new(|session: &mut BenchmarkSession| {
                session.teardown();
            });
            apply_or_defer(&session, teardown, &microtask_deferrer());
        }
    };

    let pagehide = {
        let teardown = teardown.clone();
        window_event_listener("pagehide", move |_: Event| teardown())
    };
    let diagnostics = {
        let session = session.clone();
        Interval::new(1_000, move || {
            if let Ok(session) = session.try_borrow() {
                source_diagnostics().set(session.diagnostics());
            }
        })
    };
    on_cleanup(move || {
        drop(diagnostics);
        drop(pagehide);
        teardown();
    });

    view! {
        <style>{STYLES}</style>
        <div class="bench-app">
            <div class="header">
                <h1>"🖼️ Frame Delivery Benchmark"</h1>
                <StrategyToggles />
                <SourceStatus />
            </div>
            <div class="panels">
                <For
                    each=move || enabled_strategies().get()
                    key=|strategy| *strategy
                    children=move |strategy| view! { <StrategyPanel strategy=strategy /> }
                />
            </div>
            <DebugConsole />
        </div>
    }
    .into_view()
}

fn toggle_strategy(strategy: Strategy) {
    enabled_strategies().update(|enabled| {
        if let Some(position) = enabled.iter().position(|s| *s == strategy) {
            enabled.remove(position);
        } else {
            enabled.push(strategy);
            enabled.sort();
        }
    });
}

#[component]
fn StrategyToggles() -> impl IntoView {
    let enabled = enabled_strategies();
    view! {
        <div class="toggles">
            {Strategy::all()
                .into_iter()
                .map(|strategy| {
                    view! {
                        <label class="toggle" style=format!("border-color: {}", strategy.color())>
                            <input
                                type="checkbox"
                                prop:checked=move || enabled.with(|e| e.contains(&strategy))
                                on:change=move |_| toggle_strategy(strategy)
                            />
                            {strategy.label()}
                        </label>
                    }
                })
                .collect_view()}
        </div>
    }
}

#[component]
fn SourceStatus() -> impl IntoView {
    view! {
        <div class="sources">
            {move || {
                source_diagnostics()
                    .get()
                    .iter()
                    .map(|d| view! { <div class="source-line">{source_line(d)}</div> })
                    .collect_view()
            }}
        </div>
    }
}

/// One strategy: its surface, its numbers and its error overlay.
#[component]
fn StrategyPanel(strategy: Strategy) -> impl IntoView {
    let context = use_context::<BenchContext>();
    let img_ref = create_node_ref::<Img>();
    let canvas_ref = create_node_ref::<Canvas>();
    let (setup_error, set_setup_error) = create_signal(None::<String>);

    let snapshot = create_memo(move |_| renderer_snapshots().with(|all| all.get(&strategy).cloned()));
    let (width, height) = context
        .as_ref()
        .map(|c| (c.config.surface_width, c.config.surface_height))
        .unwrap_or((200, 150));

    if let Some(context) = context {
        let session = context.session.clone();
        create_effect(move |started: Option<bool>| {
            if started == Some(true) {
                return true;
            }
            let element: Option<web_sys::Element> = if strategy.is_offscreen() {
                canvas_ref.get().map(|canvas| (*canvas).clone().unchecked_into())
            } else {
                img_ref.get().map(|img| (*img).clone().unchecked_into())
            };
            let Some(element) = element else {
                return false;
            };

            let report = move |e: String| {
                get_logger().error(LogComponent::Presentation("StrategyPanel"), &format!("❌ {strategy}: {e}"));
                set_setup_error.set(Some(e));
            };
            match build_backend(strategy, element, &context.config, context.clock.clone()) {
                Ok((backend, fallback)) => {
                    let listener: SnapshotListener = Rc::new(publish_snapshot);
                    let enable: SessionOp = Box::new(move |session: &mut BenchmarkSession| {
                        if let Err(e) = session.enable(strategy, backend, fallback, Some(listener)) {
                            report(e.to_string());
                        }
                    });
                    apply_or_defer(&context.session, enable, &microtask_deferrer());
                }
                Err(e) => report(e.to_string()),
            }
            true
        });

        on_cleanup(move || {
            let disable: SessionOp = Box::new(move |session: &mut BenchmarkSession| {
                if let Err(e) = session.disable(strategy) {
                    get_logger().warn(LogComponent::Presentation("StrategyPanel"), &format!("{strategy}: {e}"));
                }
            });
            apply_or_defer(&session, disable, &microtask_deferrer());
            renderer_snapshots().update(|all| {
                all.remove(&strategy);
            });
        });
    }

    let error_text = move || {
        setup_error
            .get()
            .or_else(|| snapshot.get().and_then(|s| s.last_error.map(|e| e.to_string())))
    };

    let surface = if strategy.is_offscreen() {
        view! {
            <canvas node_ref=canvas_ref class="frame-surface" width=width.to_string() height=height.to_string() />
        }
        .into_view()
    } else {
        view! { <img node_ref=img_ref class="frame-surface" alt=strategy.label() /> }.into_view()
    };

    view! {
        <div class="panel" style=format!("border-top: 4px solid {}", strategy.color())>
            <div class="panel-header">
                <span class="panel-title">{strategy.label()}</span>
                <span class="panel-backend">
                    {move || snapshot.get().map(|s| backend_label(&s)).unwrap_or_else(|| "starting".to_string())}
                </span>
            </div>
            <div class="panel-description">{strategy.description()}</div>
            <div class="surface">
                {surface}
                <Show when=move || error_text().is_some()>
                    <div class="error-overlay">{move || error_text().unwrap_or_default()}</div>
                </Show>
            </div>
            <div class="stats">
                {move || {
                    let now = js_sys::Date::now() as u64;
                    snapshot
                        .get()
                        .map(|s| panel_rows(&s, now))
                        .unwrap_or_default()
                        .into_iter()
                        .map(|(label, value)| {
                            view! {
                                <div class="stat-row">
                                    <span class="stat-label">{label}</span>
                                    <span class="stat-value">{value}</span>
                                </div>
                            }
                        })
                        .collect_view()
                }}
            </div>
        </div>
    }
}

/// 🐛 In-page console fed by [`LeptosLogger`].
#[component]
fn DebugConsole() -> impl IntoView {
    let logs = console_logs();
    let is_paused = is_log_paused();

    view! {
        <div class="debug-console">
            <div class="debug-header">
                <span>"🐛 Log Console"</span>
                <button
                    on:click=move |_| {
                        is_paused.update(|p| *p = !*p);
                        if is_paused.get_untracked() {
                            get_logger().info(LogComponent::Presentation("DebugConsole"), "🛑 Logging paused");
                        } else {
                            get_logger().info(LogComponent::Presentation("DebugConsole"), "▶️ Logging resumed");
                        }
                    }
                    class="debug-btn"
                >
                    {move || if is_paused.get() { "▶️ Resume" } else { "⏸️ Pause" }}
                </button>
                <button on:click=move |_| logs.set(Vec::new()) class="debug-btn">
                    "🗑️ Clear"
                </button>
            </div>
            <div class="debug-log">
                {move || {
                    logs.get()
                        .into_iter()
                        .map(|line| view! { <div class="log-line">{line}</div> })
                        .collect_view()
                }}
            </div>
        </div>
    }
}

/// Session updates that hit a borrowed session retry on the microtask queue.
fn microtask_deferrer() -> Deferrer {
    Rc::new(|task: Box<dyn FnOnce()>| spawn_local(async move { task() }))
}

fn backend_label(snapshot: &RendererSnapshot) -> String {
    let state = if snapshot.processing {
        "processing"
    } else if snapshot.ready {
        "ready"
    } else {
        "not ready"
    };
    if snapshot.fell_back {
        format!("{} (fallback) · {state}", snapshot.backend)
    } else {
        format!("{} · {state}", snapshot.backend)
    }
}

fn source_line(d: &SourceDiagnostics) -> String {
    format!(
        "{}: {} · {} processed / {} dropped ({:.1}%){}",
        d.encoding,
        d.state,
        d.stats.processed,
        d.stats.dropped,
        d.stats.drop_rate(),
        d.endpoint.as_deref().map(|e| format!(" · {e}")).unwrap_or_default()
    )
}

/// Label/value rows of a strategy panel.
fn panel_rows(snapshot: &RendererSnapshot, now_ms: u64) -> Vec<(&'static str, String)> {
    let latency = snapshot.metrics.latency_stats();
    let size = snapshot.metrics.size_stats();
    let mut rows = vec![
        ("Latency (avg)", format_latency(latency.average)),
        ("Latency (last)", format_latency(latency.last)),
        ("Latency (min / max)", format!("{} / {}", format_latency(latency.min), format_latency(latency.max))),
        ("Size (avg)", format_size(size.average)),
        ("Samples", format!("{} latency · {} size", latency.count, size.count)),
        (
            "Frames",
            format!("{} rendered · {} skipped · {} failed", snapshot.rendered, snapshot.skipped, snapshot.failed),
        ),
    ];

    if let Some(report) = &snapshot.last_report {
        if let Some(timing) = report.timing {
            rows.push((
                "Breakdown",
                format!(
                    "blob {} · load {} · draw {} · total {}",
                    format_latency(timing.blob_creation),
                    format_latency(timing.image_load),
                    format_latency(timing.rendering),
                    format_latency(timing.total)
                ),
            ));
        }
        if let Some(dimensions) = report.dimensions {
            rows.push(("Image", format!("{}x{}", dimensions.width, dimensions.height)));
        }
        if let Some(brightness) = report.brightness {
            rows.push((
                "Brightness",
                format!(
                    "{:.1} over {} px in {}",
                    brightness.avg_brightness,
                    brightness.pixels_analyzed,
                    format_latency(brightness.processing_time)
                ),
            ));
        }
    }

    if let Some(timestamp) = snapshot.last_source_timestamp {
        rows.push(("Source time", format!("{} ({})", format_clock_time(timestamp), format_frame_age(now_ms, timestamp))));
    }
    rows
}

const STYLES: &str = r#"
.bench-app {
    font-family: 'SF Pro Display', -apple-system, BlinkMacSystemFont, sans-serif;
    background: linear-gradient(135deg, #1e3c72 0%, #2a5298 100%);
    min-height: 100vh;
    padding: 20px;
    color: white;
}
.header {
    margin-bottom: 20px;
    background: rgba(255, 255, 255, 0.1);
    padding: 16px 20px;
    border-radius: 15px;
    border: 1px solid rgba(255, 255, 255, 0.2);
}
.toggles { display: flex; flex-wrap: wrap; gap: 8px; margin: 12px 0; }
.toggle {
    border: 1px solid;
    border-radius: 6px;
    padding: 6px 10px;
    cursor: pointer;
    font-size: 13px;
}
.sources { font-family: 'Courier New', monospace; font-size: 12px; color: #c8d6e5; }
.panels {
    display: grid;
    grid-template-columns: repeat(auto-fill, minmax(280px, 1fr));
    gap: 16px;
}
.panel {
    background: rgba(0, 0, 0, 0.25);
    border-radius: 10px;
    padding: 12px;
}
.panel-header { display: flex; justify-content: space-between; align-items: baseline; }
.panel-title { font-weight: 700; }
.panel-backend { font-size: 11px; color: #a0a0a0; }
.panel-description { font-size: 12px; color: #c8d6e5; margin: 4px 0 8px; }
.surface { position: relative; min-height: 150px; background: #2c3e50; border-radius: 6px; }
.frame-surface { display: block; max-width: 100%; }
.error-overlay {
    position: absolute;
    inset: 0;
    background: rgba(192, 57, 43, 0.85);
    padding: 8px;
    font-size: 12px;
    overflow: auto;
}
.stats { margin-top: 8px; font-size: 12px; }
.stat-row { display: flex; justify-content: space-between; gap: 8px; }
.stat-label { color: #a0a0a0; }
.stat-value { font-family: 'Courier New', monospace; }
.bench-fatal { padding: 20px; color: #e74c3c; }
.debug-console {
    margin-top: 20px;
    background: rgba(0, 0, 0, 0.4);
    border-radius: 10px;
    padding: 10px;
}
.debug-header { display: flex; gap: 8px; align-items: center; margin-bottom: 6px; }
.debug-btn {
    background: rgba(255, 255, 255, 0.1);
    border: 1px solid rgba(255, 255, 255, 0.3);
    color: white;
    border-radius: 4px;
    padding: 2px 8px;
    cursor: pointer;
}
.debug-log {
    max-height: 220px;
    overflow-y: auto;
    font-family: 'Courier New', monospace;
    font-size: 11px;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::MetricsSnapshot;
    use crate::domain::render::{BrightnessReport, RenderReport, RenderTiming};

    fn snapshot() -> RendererSnapshot {
        RendererSnapshot {
            strategy: Strategy::BinaryOffscreen,
            backend: "offscreen-worker",
            ready: true,
            processing: false,
            fell_back: false,
            metrics: MetricsSnapshot { latencies: vec![10.0, 14.0], sizes: vec![50.0] },
            last_report: None,
            last_error: None,
            last_source_timestamp: None,
            rendered: 2,
            skipped: 3,
            failed: 0,
        }
    }

    #[test]
    fn rows_show_aggregates() {
        let rows = panel_rows(&snapshot(), 0);
        assert_eq!(rows[0], ("Latency (avg)", "12.00ms".to_string()));
        assert_eq!(rows[1], ("Latency (last)", "14.00ms".to_string()));
        assert_eq!(rows[3], ("Size (avg)", "50.00KB".to_string()));
        assert_eq!(rows.len(), 6);
    }

    #[test]
    fn worker_report_adds_breakdown_and_brightness() {
        let mut s = snapshot();
        s.last_report = Some(RenderReport {
            timing: Some(RenderTiming { blob_creation: 1.0, image_load: 6.5, rendering: 0.5, total: 8.0 }),
            dimensions: None,
            brightness: Some(BrightnessReport { avg_brightness: 127.46, processing_time: 0.3, pixels_analyzed: 10_000 }),
        });
        s.last_source_timestamp = Some(1_000);
        let rows = panel_rows(&s, 1_240);
        let labels: Vec<_> = rows.iter().map(|(label, _)| *label).collect();
        assert!(labels.contains(&"Breakdown"));
        assert_eq!(rows.last().map(|(_, v)| v.as_str()), Some("00:00:01.000 (+240ms)"));
        assert!(rows.iter().any(|(_, v)| v == "127.5 over 10000 px in 0.30ms"));
    }

    #[test]
    fn fallback_is_visible_in_backend_label() {
        let mut s = snapshot();
        s.fell_back = true;
        s.backend = "fallback-canvas";
        assert_eq!(backend_label(&s), "fallback-canvas (fallback) · ready");
    }
}
