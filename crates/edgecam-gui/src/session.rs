use std::time::Duration;

use edgecam_capture::{choose_fps_range, take_device, CameraDevice, CaptureRequest, SessionEvent, TestPatternCamera};
use edgecam_core::{EdgecamConfig, RenderMode};
use edgecam_pipeline::{ConsumerUpdate, FrameNotifier, PipelineController};
use edgecam_processor::ProcessorFactory;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::state::{lock, Phase, SharedState};

const STATS_PERIOD: Duration = Duration::from_millis(500);

/// Requests from the window's buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
}

// ── Entry point (called from the tokio runtime thread) ─────────────────────────

/// Owns the [`PipelineController`] for the lifetime of the window. Starts a
/// session immediately and then follows the window's start/stop buttons.
/// Returns when the command channel closes (window shutting down).
pub async fn run(
    config: EdgecamConfig,
    consumer_tx: mpsc::UnboundedSender<ConsumerUpdate>,
    state: SharedState,
    ctx: egui::Context,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut controller = PipelineController::new(consumer_tx);
    if config.render_mode == RenderMode::OnDemand {
        let repaint = ctx.clone();
        controller = controller.with_notifier(FrameNotifier::new(move || repaint.request_repaint()));
    }
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut stats_tick = tokio::time::interval(STATS_PERIOD);

    start_session(&config, &mut controller, &events_tx, &state, &ctx);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Start) if !controller.is_running() => {
                    start_session(&config, &mut controller, &events_tx, &state, &ctx);
                }
                Some(Command::Start) => {}
                Some(Command::Stop) => stop_session(&mut controller, &state, "stopped by user"),
                None => break,
            },

            Some(event) = events_rx.recv() => match event {
                SessionEvent::Opened { device, request } => {
                    let mut s = lock(&state);
                    s.phase = Phase::Streaming { device: device.clone(), resolution: request.resolution };
                    s.push_log(format!("Streaming from '{}' at {} @ {}", device, request.resolution, request.fps_range));
                }
                SessionEvent::Disconnected => {
                    warn!("Camera disconnected");
                    stop_session(&mut controller, &state, "camera disconnected");
                }
                SessionEvent::Error(e) => {
                    warn!("Camera error: {}", e);
                    stop_session(&mut controller, &state, "camera error");
                    lock(&state).phase = Phase::Error(e.to_string());
                }
            },

            _ = stats_tick.tick() => {
                if let Some(counters) = controller.counters() {
                    lock(&state).ingest = counters.snapshot();
                    ctx.request_repaint();
                }
                continue;
            }
        }
        ctx.request_repaint();
    }

    stop_session(&mut controller, &state, "window closed");
    info!("Session thread exiting");
}

fn start_session(
    config: &EdgecamConfig,
    controller: &mut PipelineController,
    events_tx: &mpsc::UnboundedSender<SessionEvent>,
    state: &SharedState,
    ctx: &egui::Context,
) {
    let Some(camera) = take_device(TestPatternCamera::enumerate(), config.lens_facing) else {
        let msg = format!("No {}-facing camera", config.lens_facing);
        let mut s = lock(state);
        s.push_log(format!("[ERROR] {}", msg));
        s.phase = Phase::Error(msg);
        return;
    };
    let request = CaptureRequest::preview(config.resolution, choose_fps_range(&camera.info().fps_ranges));
    {
        let mut s = lock(state);
        s.phase = Phase::Opening;
        s.push_log(format!("Opening '{}' ({:?} processor)…", camera.info().name, config.processor));
    }
    ctx.request_repaint();

    let processor = ProcessorFactory::for_kind(config.processor);
    // Open blocks until the device answers.
    let started = tokio::task::block_in_place(|| controller.start(camera, request, processor, events_tx.clone()));

    let mut s = lock(state);
    match started {
        Ok(_) => s.sessions = controller.sessions_started(),
        Err(e) => {
            let msg = format!("Failed to start capture: {}", e);
            s.push_log(format!("[ERROR] {}", msg));
            s.phase = Phase::Error(msg);
        }
    }
}

fn stop_session(controller: &mut PipelineController, state: &SharedState, reason: &str) {
    if !controller.is_running() {
        return;
    }
    let stopped = tokio::task::block_in_place(|| controller.stop());

    let mut s = lock(state);
    match stopped {
        Ok(Some(summary)) => {
            s.ingest = summary.ingest;
            s.push_log(format!(
                "Session stopped ({}): processed={} dropped={} failed={}",
                reason, summary.ingest.processed, summary.ingest.dropped, summary.ingest.failed
            ));
        }
        Ok(None) => {}
        Err(e) => s.push_log(format!("[WARN] Stop failed: {}", e)),
    }
    s.phase = Phase::Stopped { reason: reason.to_string() };
}
