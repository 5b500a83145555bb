use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use edgecam_core::Resolution;
use edgecam_pipeline::IngestSnapshot;

const MAX_LOG_LINES: usize = 300;

// ── Phase ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Opening,
    Streaming { device: String, resolution: Resolution },
    Stopped { reason: String },
    Error(String),
}

impl Phase {
    pub fn label(&self) -> &str {
        match self {
            Phase::Idle              => "Idle",
            Phase::Opening           => "Opening camera…",
            Phase::Streaming { .. } => "Streaming",
            Phase::Stopped   { .. } => "Stopped",
            Phase::Error     ( _ )  => "Error",
        }
    }

    pub fn color(&self) -> egui::Color32 {
        match self {
            Phase::Idle              => egui::Color32::from_rgb(160, 160, 160),
            Phase::Opening           => egui::Color32::from_rgb(230, 185, 50),
            Phase::Streaming { .. } => egui::Color32::from_rgb(60, 200, 80),
            Phase::Stopped   { .. } => egui::Color32::from_rgb(50, 180, 230),
            Phase::Error     ( _ )  => egui::Color32::from_rgb(220, 60, 60),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Phase::Opening | Phase::Streaming { .. })
    }
}

// ── GuiState ──────────────────────────────────────────────────────────────────

/// Written by the session thread, read by the egui thread.
#[derive(Default)]
pub struct GuiState {
    pub phase:    Phase,
    pub ingest:   IngestSnapshot,
    pub sessions: u32,
    pub logs:     VecDeque<String>,
}

impl GuiState {
    /// Append a line to the circular log buffer.
    pub fn push_log(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::debug!("[GUI log] {}", line);
        if self.logs.len() >= MAX_LOG_LINES {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }
}

/// Shared handle passed between the GUI thread and the session thread.
pub type SharedState = Arc<Mutex<GuiState>>;

/// Lock the state; a panic on the other side does not make it unreadable.
pub fn lock(state: &SharedState) -> MutexGuard<'_, GuiState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_buffer_is_bounded() {
        let mut state = GuiState::default();
        for i in 0..MAX_LOG_LINES + 5 {
            state.push_log(format!("line {i}"));
        }
        assert_eq!(state.logs.len(), MAX_LOG_LINES);
        assert_eq!(state.logs.front().map(String::as_str), Some("line 5"));
    }

    #[test]
    fn only_opening_and_streaming_are_active() {
        assert!(Phase::Opening.is_active());
        assert!(Phase::Streaming { device: "cam".into(), resolution: Resolution::HD }.is_active());
        assert!(!Phase::Stopped { reason: "user".into() }.is_active());
        assert!(!Phase::Error("x".into()).is_active());
    }
}
