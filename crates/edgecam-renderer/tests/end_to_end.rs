//! Test-pattern camera → controller → presenter, across two sessions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use edgecam_capture::{CaptureRequest, FpsRange, SessionEvent, TestPatternCamera};
use edgecam_core::{CountPolicy, LensFacing, Resolution};
use edgecam_pipeline::{consumer_channel, FrameNotifier, PipelineController};
use edgecam_processor::{LumaPassthrough, SobelEdge};
use edgecam_renderer::{Presenter, SoftwareBackend, UploadKind};
use tokio::sync::mpsc;

fn tick_until_upload(presenter: &mut Presenter<SoftwareBackend>) -> UploadKind {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let outcome = presenter.on_draw_tick(Instant::now()).expect("tick");
        if let Some(kind) = outcome.upload {
            return kind;
        }
        assert!(Instant::now() < deadline, "no frame reached the presenter");
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn frames_flow_to_screen_and_restart_cleanly() {
    let (consumer_tx, port) = consumer_channel();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut controller = PipelineController::new(consumer_tx);
    let mut presenter = Presenter::new(SoftwareBackend::new(Resolution::new(64, 48)), port, CountPolicy::Ticks, false);

    let request = CaptureRequest::preview(Resolution::new(128, 96), FpsRange::new(120, 120));
    controller
        .start(TestPatternCamera::new(LensFacing::Back), request, Box::new(LumaPassthrough), events_tx.clone())
        .expect("first session");

    assert_eq!(tick_until_upload(&mut presenter), UploadKind::Created);
    assert_eq!(presenter.texture_extent(), Some(Resolution::new(128, 96)));
    // Luma bars are gray: R == G == B, never transparent.
    let surface = presenter.backend().surface();
    assert!(surface.chunks_exact(4).all(|px| px[0] == px[1] && px[1] == px[2] && px[3] == 255));
    assert!(surface.chunks_exact(4).any(|px| px[0] != surface[0]), "bars visible");

    let first = controller.stop().expect("stop").expect("running");
    assert_eq!(first.ingest.resolution_changes, 1);
    assert!(first.ingest.processed >= 1);

    let request = CaptureRequest::preview(Resolution::new(64, 32), FpsRange::new(120, 120));
    controller
        .start(TestPatternCamera::new(LensFacing::Front), request, Box::new(SobelEdge), events_tx)
        .expect("second session");

    // The new session re-specifies against its first frame.
    assert_eq!(tick_until_upload(&mut presenter), UploadKind::Respecified);
    assert_eq!(presenter.texture_extent(), Some(Resolution::new(64, 32)));
    assert!(presenter.stats().last_generation >= 1);

    controller.stop().expect("stop");
    presenter.on_draw_tick(Instant::now()).expect("tick after stop");
    assert!(!presenter.has_consumer());

    let mut opened = 0;
    while let Ok(event) = events_rx.try_recv() {
        if matches!(event, SessionEvent::Opened { .. }) {
            opened += 1;
        }
    }
    assert_eq!(opened, 2);
}

/// Ticks only when the notifier fired since the last call.
fn tick_if_woken(presenter: &mut Presenter<SoftwareBackend>, wakes: &AtomicUsize, seen: &mut usize) -> bool {
    let now = wakes.load(Ordering::Acquire);
    if now == *seen {
        return false;
    }
    *seen = now;
    presenter.on_draw_tick(Instant::now()).expect("tick");
    true
}

#[test]
fn on_demand_driver_releases_consumer_when_session_stops() {
    let wakes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&wakes);
    let (consumer_tx, port) = consumer_channel();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut controller = PipelineController::new(consumer_tx).with_notifier(FrameNotifier::new(move || {
        counter.fetch_add(1, Ordering::Release);
    }));
    let mut presenter = Presenter::new(SoftwareBackend::new(Resolution::new(32, 24)), port, CountPolicy::Uploads, false);
    let mut seen = 0;

    // A finite stream: every publish has happened once the device reports
    // disconnection, so later wakes can only come from the controller.
    let request = CaptureRequest::preview(Resolution::new(64, 48), FpsRange::new(120, 120));
    let camera = TestPatternCamera::new(LensFacing::Back).with_frame_limit(5);
    controller.start(camera, request, Box::new(LumaPassthrough), events_tx).expect("session");

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut disconnected = false;
    while !disconnected || presenter.stats().uploads == 0 {
        tick_if_woken(&mut presenter, &wakes, &mut seen);
        disconnected |= matches!(events_rx.try_recv(), Ok(SessionEvent::Disconnected));
        assert!(Instant::now() < deadline, "stream did not finish");
        std::thread::sleep(Duration::from_millis(2));
    }
    tick_if_woken(&mut presenter, &wakes, &mut seen);
    assert!(presenter.has_consumer());
    assert!(!tick_if_woken(&mut presenter, &wakes, &mut seen));

    controller.stop().expect("stop");
    assert!(tick_if_woken(&mut presenter, &wakes, &mut seen), "stop did not wake the driver");
    assert!(!presenter.has_consumer());
    assert_eq!(presenter.texture_extent(), Some(Resolution::new(64, 48)));
}
