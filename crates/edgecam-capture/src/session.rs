use std::thread::JoinHandle;

use edgecam_core::{CaptureError, RawFrame};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::device::{CameraDevice, CaptureRequest, PlanarImage, StopSignal};

// ── FrameSink ─────────────────────────────────────────────────────────────────

/// Receives raw frames on the capture worker, one call at a time.
pub trait FrameSink: Send + 'static {
    /// `frame` borrows device storage and is gone once this returns.
    fn on_raw_frame(&mut self, frame: &RawFrame<'_>);

    /// `count` older queued frames were discarded in favour of the one about
    /// to be delivered.
    fn on_frames_dropped(&mut self, _count: u64) {}
}

// ── Events / stats ────────────────────────────────────────────────────────────

/// Lifecycle notifications from the capture worker.
#[derive(Debug)]
pub enum SessionEvent {
    Opened { device: String, request: CaptureRequest },
    /// The device stopped delivering without being asked to.
    Disconnected,
    /// Device failure; the session is over.
    Error(CaptureError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames handed to the sink.
    pub delivered: u64,
    /// Frames discarded unread because a newer one was queued.
    pub dropped: u64,
}

// ── CaptureSession ────────────────────────────────────────────────────────────

/// A running capture session: one worker thread that owns the device and
/// feeds the sink serially.
pub struct CaptureSession<S: FrameSink> {
    device_name: String,
    stop: StopSignal,
    worker: Option<JoinHandle<(S, SessionStats)>>,
}

impl<S: FrameSink> CaptureSession<S> {
    /// Spawn the worker, open `device` on it, and wait for the open to
    /// succeed or fail. On failure everything acquired so far is released
    /// and the error returned.
    pub fn start<D: CameraDevice>(
        device: D,
        request: CaptureRequest,
        sink: S,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self, CaptureError> {
        let device_name = device.info().name.clone();
        let stop = StopSignal::new();
        let (opened_tx, opened_rx) = oneshot::channel::<Result<(), CaptureError>>();

        let worker_stop = stop.clone();
        let worker = std::thread::Builder::new()
            .name("capture-worker".into())
            .spawn(move || run_worker(device, request, sink, worker_stop, opened_tx, events))
            .map_err(|e| CaptureError::OpenFailed { reason: format!("spawn capture worker: {e}") })?;

        let opened = opened_rx
            .blocking_recv()
            .unwrap_or_else(|_| Err(CaptureError::OpenFailed { reason: "capture worker exited during open".into() }));

        match opened {
            Ok(()) => {
                info!("Capture session on '{}' started", device_name);
                Ok(Self { device_name, stop, worker: Some(worker) })
            }
            Err(e) => {
                let _ = worker.join();
                warn!("Capture session on '{}' failed to open: {}", device_name, e);
                Err(e)
            }
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// True once the worker has exited (stopped, disconnected, or failed).
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, |w| w.is_finished())
    }

    /// Stop the session: stop delivery, wait for the in-flight frame, and
    /// join the worker. Hands the sink back so the caller releases its
    /// storage last.
    pub fn stop(mut self) -> Result<(S, SessionStats), CaptureError> {
        self.shutdown()
            .ok_or_else(|| CaptureError::Device("capture worker panicked".into()))
    }

    fn shutdown(&mut self) -> Option<(S, SessionStats)> {
        let worker = self.worker.take()?;
        self.stop.raise();
        let result = worker.join().ok();
        if let Some((_, stats)) = &result {
            info!(
                "Capture session on '{}' stopped (delivered={}, dropped={})",
                self.device_name, stats.delivered, stats.dropped
            );
        }
        result
    }
}

impl<S: FrameSink> Drop for CaptureSession<S> {
    fn drop(&mut self) {
        // No callback may outlive the session handle.
        let _ = self.shutdown();
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

enum Exit {
    Stopped,
    Disconnected,
    Failed(CaptureError),
}

fn run_worker<D: CameraDevice, S: FrameSink>(
    mut device: D,
    request: CaptureRequest,
    mut sink: S,
    stop: StopSignal,
    opened_tx: oneshot::Sender<Result<(), CaptureError>>,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> (S, SessionStats) {
    let mut stats = SessionStats::default();

    if let Err(e) = device.open(&request, stop.clone()) {
        device.close();
        let _ = opened_tx.send(Err(e));
        return (sink, stats);
    }
    let _ = opened_tx.send(Ok(()));
    let _ = events.send(SessionEvent::Opened { device: device.info().name.clone(), request: request.clone() });
    debug!("Capture worker running {:?}", request);

    let exit = loop {
        if stop.is_raised() {
            break Exit::Stopped;
        }
        let image = match next_latest(&mut device) {
            Ok(Some((image, skipped))) => {
                if skipped > 0 {
                    stats.dropped += skipped;
                    sink.on_frames_dropped(skipped);
                }
                image
            }
            Ok(None) if stop.is_raised() => break Exit::Stopped,
            Ok(None) => break Exit::Disconnected,
            Err(e) => break Exit::Failed(e),
        };

        sink.on_raw_frame(&image.as_raw_frame());
        stats.delivered += 1;
        device.release(image);
    };

    device.close();
    match exit {
        Exit::Stopped => debug!("Capture worker stopped on request"),
        Exit::Disconnected => {
            warn!("Capture device disconnected");
            let _ = events.send(SessionEvent::Disconnected);
        }
        Exit::Failed(e) => {
            warn!("Capture device error: {}", e);
            let _ = events.send(SessionEvent::Error(e));
        }
    }
    (sink, stats)
}

/// Wait for one image, then drain anything queued behind it so only the
/// newest is processed. Returns the image and how many were skipped.
fn next_latest<D: CameraDevice>(device: &mut D) -> Result<Option<(PlanarImage, u64)>, CaptureError> {
    let Some(mut image) = device.next_image()? else {
        return Ok(None);
    };
    let mut skipped = 0;
    loop {
        match device.try_next_image() {
            Ok(Some(newer)) => {
                let older = std::mem::replace(&mut image, newer);
                device.release(older);
                skipped += 1;
            }
            Ok(None) => return Ok(Some((image, skipped))),
            Err(e) => {
                device.release(image);
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use edgecam_core::{LensFacing, PixelFormat, Resolution};

    use super::*;
    use crate::device::{DeviceInfo, FpsRange};
    use crate::test_pattern::TestPatternCamera;

    struct Counting {
        frames: Arc<AtomicU64>,
        last_width: u32,
    }

    impl FrameSink for Counting {
        fn on_raw_frame(&mut self, frame: &RawFrame<'_>) {
            self.last_width = frame.width;
            self.frames.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn request() -> CaptureRequest {
        CaptureRequest::preview(Resolution::new(64, 48), FpsRange::new(120, 120))
    }

    fn wait_for(frames: &AtomicU64, n: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while frames.load(Ordering::Relaxed) < n {
            assert!(Instant::now() < deadline, "timed out waiting for {n} frames");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn delivers_frames_and_returns_sink_on_stop() {
        let frames = Arc::new(AtomicU64::new(0));
        let sink = Counting { frames: Arc::clone(&frames), last_width: 0 };
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let session = CaptureSession::start(TestPatternCamera::new(LensFacing::Back), request(), sink, events_tx)
            .expect("session opens");
        assert!(matches!(events_rx.try_recv(), Ok(SessionEvent::Opened { .. })));

        wait_for(&frames, 3);
        let (sink, stats) = session.stop().expect("clean stop");
        assert_eq!(sink.last_width, 64);
        assert_eq!(stats.delivered, frames.load(Ordering::Relaxed));
        // A requested stop is not a disconnect.
        assert!(events_rx.try_recv().is_err());
    }

    #[test]
    fn open_failure_is_returned_to_caller() {
        let frames = Arc::new(AtomicU64::new(0));
        let sink = Counting { frames, last_width: 0 };
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let camera = TestPatternCamera::new(LensFacing::Back).failing_open();

        let err = CaptureSession::start(camera, request(), sink, events_tx).err().expect("open fails");
        assert!(matches!(err, CaptureError::OpenFailed { .. }));
        assert!(events_rx.try_recv().is_err());
    }

    #[test]
    fn end_of_stream_reports_disconnect() {
        let frames = Arc::new(AtomicU64::new(0));
        let sink = Counting { frames: Arc::clone(&frames), last_width: 0 };
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let camera = TestPatternCamera::new(LensFacing::Back).with_frame_limit(4);

        let session = CaptureSession::start(camera, request(), sink, events_tx).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !session.is_finished() {
            assert!(Instant::now() < deadline, "worker never finished");
            std::thread::sleep(Duration::from_millis(2));
        }
        let (_, stats) = session.stop().unwrap();
        assert!(stats.delivered + stats.dropped <= 4);
        assert!(matches!(events_rx.try_recv(), Ok(SessionEvent::Opened { .. })));
        assert!(matches!(events_rx.try_recv(), Ok(SessionEvent::Disconnected)));
    }

    /// Hands out one image, then fails on the drain.
    struct FlakyDevice {
        info: DeviceInfo,
        released: u32,
    }

    impl CameraDevice for FlakyDevice {
        fn info(&self) -> &DeviceInfo {
            &self.info
        }

        fn open(&mut self, _request: &CaptureRequest, _stop: StopSignal) -> Result<(), CaptureError> {
            Ok(())
        }

        fn next_image(&mut self) -> Result<Option<PlanarImage>, CaptureError> {
            Ok(Some(PlanarImage {
                width: 2,
                height: 2,
                format: PixelFormat::Gray8,
                row_stride: 2,
                pixel_stride: 1,
                data: vec![0; 4],
                timestamp: Duration::ZERO,
                sequence: 0,
            }))
        }

        fn try_next_image(&mut self) -> Result<Option<PlanarImage>, CaptureError> {
            Err(CaptureError::Device("bus reset".into()))
        }

        fn release(&mut self, _image: PlanarImage) {
            self.released += 1;
        }

        fn close(&mut self) {}
    }

    #[test]
    fn held_image_is_released_when_drain_fails() {
        let mut device = FlakyDevice {
            info: DeviceInfo {
                id: "flaky".into(),
                name: "Flaky".into(),
                facing: LensFacing::Back,
                fps_ranges: vec![FpsRange::new(30, 30)],
            },
            released: 0,
        };
        let err = next_latest(&mut device).err().expect("drain error");
        assert!(matches!(err, CaptureError::Device(_)));
        assert_eq!(device.released, 1);
    }
}
