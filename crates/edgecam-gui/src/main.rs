mod egui_backend;
mod gui_app;
mod session;
mod state;

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use edgecam_core::EdgecamConfig;
use edgecam_pipeline::consumer_channel;
use state::GuiState;
use tokio::sync::mpsc;

fn main() -> Result<()> {
    // ── Logging ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .compact()
        .init();

    let config = EdgecamConfig::load().context("loading configuration")?;

    // ── Shared state ──────────────────────────────────────────────────────
    let shared_state: state::SharedState = Arc::new(Mutex::new(GuiState::default()));
    let (consumer_tx, port) = consumer_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    // ── Window options ────────────────────────────────────────────────────
    let window_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("edgecam")
            .with_inner_size([1280.0, 720.0])
            .with_min_inner_size([720.0, 480.0])
            .with_resizable(true),
        ..Default::default()
    };

    eframe::run_native(
        "edgecam",
        window_options,
        Box::new(move |cc| {
            let state_bg  = Arc::clone(&shared_state);
            let ctx_bg    = cc.egui_ctx.clone();
            let config_bg = config.clone();

            // Capture control runs on its own thread with a multi-thread
            // runtime; the egui thread only draws.
            std::thread::Builder::new()
                .name("edgecam-session".into())
                .spawn(move || {
                    let rt = match tokio::runtime::Builder::new_multi_thread()
                        .worker_threads(2)
                        .enable_all()
                        .build()
                    {
                        Ok(rt) => rt,
                        Err(e) => {
                            tracing::error!("Failed to build tokio runtime: {}", e);
                            return;
                        }
                    };
                    rt.block_on(session::run(config_bg, consumer_tx, state_bg, ctx_bg, command_rx));
                })?;

            Ok(Box::new(gui_app::EdgecamApp::new(cc, &config, port, shared_state, command_tx)))
        }),
    )
    .map_err(|e| anyhow::anyhow!("eframe: {e}"))
}
