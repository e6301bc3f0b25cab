//! Page-wide UI signals. Frame data never lives here: each frame source owns
//! its own slot, and each renderer reports through its snapshot listener.

use std::collections::BTreeMap;

use leptos::*;
use once_cell::sync::OnceCell;

use crate::application::{RendererSnapshot, SourceDiagnostics, Strategy};

/// Lines kept by the debug console.
pub const MAX_CONSOLE_LINES: usize = 100;

pub struct Globals {
    pub logs: RwSignal<Vec<String>>,
    pub log_paused: RwSignal<bool>,
    pub enabled: RwSignal<Vec<Strategy>>,
    pub snapshots: RwSignal<BTreeMap<Strategy, RendererSnapshot>>,
    pub sources: RwSignal<Vec<SourceDiagnostics>>,
}

static GLOBALS: OnceCell<Globals> = OnceCell::new();

pub fn globals() -> &'static Globals {
    GLOBALS.get_or_init(|| Globals {
        logs: create_rw_signal(Vec::new()),
        log_paused: create_rw_signal(false),
        enabled: create_rw_signal(Strategy::default_enabled()),
        snapshots: create_rw_signal(BTreeMap::new()),
        sources: create_rw_signal(Vec::new()),
    })
}

crate::global_signals! {
    pub console_logs => logs: Vec<String>,
    pub is_log_paused => log_paused: bool,
    pub enabled_strategies => enabled: Vec<Strategy>,
    pub renderer_snapshots => snapshots: BTreeMap<Strategy, RendererSnapshot>,
    pub source_diagnostics => sources: Vec<SourceDiagnostics>,
}

/// Append one console line unless the console is paused.
pub fn push_console_line(line: String) {
    if is_log_paused().get_untracked() {
        return;
    }
    console_logs().update(|lines| {
        lines.push(line);
        let overflow = lines.len().saturating_sub(MAX_CONSOLE_LINES);
        lines.drain(..overflow);
    });
}

/// Record the latest snapshot of one strategy's renderer.
pub fn publish_snapshot(snapshot: &RendererSnapshot) {
    renderer_snapshots().update(|map| {
        map.insert(snapshot.strategy, snapshot.clone());
    });
}
