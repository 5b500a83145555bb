use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use edgecam_capture::{choose_fps_range, take_device, CameraDevice, CaptureRequest, SessionEvent, TestPatternCamera};
use edgecam_core::{EdgecamConfig, EdgecamError, RenderMode};
use edgecam_pipeline::{consumer_channel, ConsumerPort, FrameNotifier, PipelineController};
use edgecam_processor::ProcessorFactory;
use edgecam_renderer::{Presenter, PresenterStats, SoftwareBackend};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Optional run time in seconds; without it the app runs until Ctrl-C.
const DURATION_ENV: &str = "EDGECAM_DURATION_SECS";
const STATS_PERIOD: Duration = Duration::from_secs(5);

/// Headless run: one capture session from the configured camera, rendered
/// into a software surface.
///
/// # Flow
/// 1. Load [`EdgecamConfig`] (file + `EDGECAM_*` overrides)
/// 2. Select the camera facing `lens_facing` and its preview FPS range
/// 3. Start the render driver on its own thread
/// 4. Start the pipeline session (blocking open, off the async workers)
/// 5. Run until Ctrl-C, the optional duration, or a device failure
/// 6. Stop the session, then the render driver
pub async fn run() -> Result<()> {
    let config = EdgecamConfig::load().context("loading configuration")?;
    info!(
        "Config: {} {:?} mode={:?} count={:?} processor={:?} refresh={} Hz",
        config.resolution, config.lens_facing, config.render_mode, config.count_policy, config.processor, config.refresh_hz
    );
    let duration = std::env::var(DURATION_ENV)
        .ok()
        .map(|s| s.trim().parse::<u64>().with_context(|| format!("{DURATION_ENV}='{s}'")))
        .transpose()?
        .map(Duration::from_secs);

    // ── Device selection ───────────────────────────────────────────────────
    let camera = take_device(TestPatternCamera::enumerate(), config.lens_facing)
        .ok_or(EdgecamError::DeviceNotFound { facing: config.lens_facing })?;
    let fps_range = choose_fps_range(&camera.info().fps_ranges);
    let request = CaptureRequest::preview(config.resolution, fps_range);

    // ── Render driver ──────────────────────────────────────────────────────
    let (consumer_tx, port) = consumer_channel();
    let wake = Arc::new(Notify::new());
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let render = spawn_render_driver(&config, port, Arc::clone(&wake), shutdown_rx)?;

    let mut controller = PipelineController::new(consumer_tx);
    if config.render_mode == RenderMode::OnDemand {
        controller = controller.with_notifier(FrameNotifier::new(move || wake.notify_one()));
    }

    // ── Capture session ────────────────────────────────────────────────────
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let processor = ProcessorFactory::for_kind(config.processor);
    let (mut controller, started) = tokio::task::spawn_blocking(move || {
        let started = controller.start(camera, request, processor, events_tx);
        (controller, started)
    })
    .await
    .context("capture start task panicked")?;
    let counters = started.map_err(EdgecamError::from).context("starting capture session")?;

    // ── Wait for a reason to stop ──────────────────────────────────────────
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let deadline = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);
    let mut stats_tick = tokio::time::interval(STATS_PERIOD);
    stats_tick.tick().await;

    let exit_reason = loop {
        tokio::select! {
            _ = &mut ctrl_c => break "interrupted",
            _ = &mut deadline => break "duration elapsed",
            event = events_rx.recv() => match event {
                Some(SessionEvent::Opened { device, request }) => {
                    info!("Streaming from '{}' at {} @ {}", device, request.resolution, request.fps_range);
                }
                Some(SessionEvent::Disconnected) => break "device disconnected",
                Some(SessionEvent::Error(e)) => {
                    warn!("Capture failed: {}", e);
                    break "device error";
                }
                None => break "capture events closed",
            },
            _ = stats_tick.tick() => {
                let s = counters.snapshot();
                info!(
                    "Stats: processed={} dropped={} failed={} resolution_changes={}",
                    s.processed, s.dropped, s.failed, s.resolution_changes
                );
            }
        }
    };
    info!("Stopping ({})", exit_reason);

    // ── Teardown: capture side first, then the render thread ───────────────
    let summary = tokio::task::spawn_blocking(move || controller.stop())
        .await
        .context("capture stop task panicked")?
        .map_err(EdgecamError::from)
        .context("stopping capture session")?;
    if let Some(summary) = summary {
        info!(
            "Session summary: delivered={} dropped={} processed={} failed={}",
            summary.capture.delivered, summary.capture.dropped, summary.ingest.processed, summary.ingest.failed
        );
    }

    let _ = shutdown_tx.send(());
    let stats = tokio::task::spawn_blocking(move || render.join())
        .await
        .context("render join task panicked")?
        .map_err(|_| anyhow::anyhow!("render driver panicked"))??;
    info!(
        "Presenter: ticks={} uploads={} (full={} partial={}) last_fps={}",
        stats.ticks, stats.uploads, stats.full_uploads, stats.partial_uploads, stats.last_fps
    );
    Ok(())
}

// ── Render driver ──────────────────────────────────────────────────────────────

/// Run the presenter on a dedicated thread with its own current-thread
/// runtime, so draw ticks never share a thread with capture.
fn spawn_render_driver(
    config: &EdgecamConfig,
    port: ConsumerPort,
    wake: Arc<Notify>,
    shutdown: oneshot::Receiver<()>,
) -> Result<JoinHandle<Result<PresenterStats>>> {
    let config = config.clone();
    std::thread::Builder::new()
        .name("render-driver".into())
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .context("building render runtime")?;
            runtime.block_on(render_loop(config, port, wake, shutdown))
        })
        .context("spawning render driver")
}

async fn render_loop(
    config: EdgecamConfig,
    port: ConsumerPort,
    wake: Arc<Notify>,
    mut shutdown: oneshot::Receiver<()>,
) -> Result<PresenterStats> {
    let viewport = config.resolution;
    let backend = SoftwareBackend::new(viewport);
    let mut presenter = Presenter::new(backend, port, config.count_policy, config.flip_vertical);
    let mut ticker = tokio::time::interval(config.refresh_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut tick_errors: u64 = 0;

    info!("Render driver running ({:?}, {} Hz, viewport {})", config.render_mode, config.refresh_hz, viewport);
    loop {
        match config.render_mode {
            RenderMode::Continuous => tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            },
            RenderMode::OnDemand => tokio::select! {
                _ = &mut shutdown => break,
                _ = wake.notified() => {}
            },
        }

        if let Err(e) = presenter.on_draw_tick(Instant::now()) {
            tick_errors += 1;
            if tick_errors <= 10 || tick_errors % 100 == 0 {
                warn!("Draw tick failed (#{}): {}; recreating surface", tick_errors, e);
            }
            presenter.surface_lost();
            presenter.on_surface_changed(viewport);
        }
    }
    debug!("Render driver exiting");
    Ok(presenter.stats())
}
