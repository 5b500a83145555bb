//! Synthetic camera used by the headless binary and the tests.
//!
//! A sensor thread renders moving vertical bars into a small pool of padded
//! luma planes and queues them for the worker. When the queue is full the
//! sensor drops the image on the floor, as a real image reader does.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use edgecam_core::{CaptureError, LensFacing, PixelFormat, Resolution};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, info};

use crate::device::{CameraDevice, CaptureRequest, DeviceInfo, FpsRange, PlanarImage, StopSignal};
use crate::selection::choose_fps_range;

/// Images queued between sensor and worker.
const QUEUE_DEPTH: usize = 2;
/// Images in circulation: queued + held by the worker + being filled.
const POOL_SIZE: usize = QUEUE_DEPTH + 2;
/// Row stride alignment, mimicking sensor line padding.
const ROW_ALIGN: usize = 64;

pub struct TestPatternCamera {
    info: DeviceInfo,
    frame_limit: Option<u64>,
    fail_open: bool,
    frames_rx: Option<mpsc::Receiver<PlanarImage>>,
    return_tx: Option<mpsc::UnboundedSender<PlanarImage>>,
    sensor: Option<JoinHandle<()>>,
}

impl TestPatternCamera {
    pub fn new(facing: LensFacing) -> Self {
        let id = match facing {
            LensFacing::Back => "0",
            LensFacing::Front => "1",
            LensFacing::External => "2",
        };
        Self {
            info: DeviceInfo {
                id: id.into(),
                name: format!("Test pattern ({facing})"),
                facing,
                fps_ranges: vec![
                    FpsRange::new(15, 15),
                    FpsRange::new(7, 30),
                    FpsRange::new(24, 30),
                    FpsRange::new(30, 30),
                ],
            },
            frame_limit: None,
            fail_open: false,
            frames_rx: None,
            return_tx: None,
            sensor: None,
        }
    }

    /// The synthetic cameras a machine "has": one rear, one front.
    pub fn enumerate() -> Vec<Self> {
        vec![Self::new(LensFacing::Back), Self::new(LensFacing::Front)]
    }

    /// End the stream after `frames` images, as if the device went away.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Make [`open`](CameraDevice::open) fail.
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn preferred_fps_range(&self) -> FpsRange {
        choose_fps_range(&self.info.fps_ranges)
    }
}

impl CameraDevice for TestPatternCamera {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn open(&mut self, request: &CaptureRequest, stop: StopSignal) -> Result<(), CaptureError> {
        if self.fail_open {
            return Err(CaptureError::OpenFailed { reason: format!("{} refused to open", self.info.name) });
        }
        if request.resolution.is_empty() {
            return Err(CaptureError::ConfigurationFailed {
                reason: format!("unsupported resolution {}", request.resolution),
            });
        }

        let (frames_tx, frames_rx) = mpsc::channel(QUEUE_DEPTH);
        let (return_tx, return_rx) = mpsc::unbounded_channel();
        let interval = Duration::from_micros(1_000_000 / request.fps_range.max.max(1) as u64);
        let resolution = request.resolution;
        let limit = self.frame_limit;

        let sensor = std::thread::Builder::new()
            .name("test-pattern-sensor".into())
            .spawn(move || run_sensor(resolution, interval, limit, stop, frames_tx, return_rx))
            .map_err(|e| CaptureError::OpenFailed { reason: format!("spawn sensor: {e}") })?;

        info!(
            "{} opened {} @ {} (af={:?}, ae={})",
            self.info.name, request.resolution, request.fps_range, request.autofocus, request.auto_exposure
        );
        self.frames_rx = Some(frames_rx);
        self.return_tx = Some(return_tx);
        self.sensor = Some(sensor);
        Ok(())
    }

    fn next_image(&mut self) -> Result<Option<PlanarImage>, CaptureError> {
        let rx = self.frames_rx.as_mut().ok_or(CaptureError::NotStarted)?;
        Ok(rx.blocking_recv())
    }

    fn try_next_image(&mut self) -> Result<Option<PlanarImage>, CaptureError> {
        let rx = self.frames_rx.as_mut().ok_or(CaptureError::NotStarted)?;
        match rx.try_recv() {
            Ok(image) => Ok(Some(image)),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(None),
        }
    }

    fn release(&mut self, image: PlanarImage) {
        if let Some(tx) = &self.return_tx {
            let _ = tx.send(image);
        }
    }

    fn close(&mut self) {
        // Closing the queue tells the sensor to exit.
        self.frames_rx = None;
        self.return_tx = None;
        if let Some(sensor) = self.sensor.take() {
            let _ = sensor.join();
            debug!("{} closed", self.info.name);
        }
    }
}

impl Drop for TestPatternCamera {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_sensor(
    resolution: Resolution,
    interval: Duration,
    limit: Option<u64>,
    stop: StopSignal,
    frames_tx: mpsc::Sender<PlanarImage>,
    mut return_rx: mpsc::UnboundedReceiver<PlanarImage>,
) {
    let row_stride = (resolution.width as usize).div_ceil(ROW_ALIGN) * ROW_ALIGN;
    let mut pool: Vec<PlanarImage> = (0..POOL_SIZE)
        .map(|_| PlanarImage {
            width: resolution.width,
            height: resolution.height,
            format: PixelFormat::Gray8,
            row_stride,
            pixel_stride: 1,
            data: vec![0; row_stride * resolution.height as usize],
            timestamp: Duration::ZERO,
            sequence: 0,
        })
        .collect();

    let started = Instant::now();
    let mut sequence: u64 = 0;
    let mut sensor_drops: u64 = 0;

    while !stop.is_raised() && !frames_tx.is_closed() {
        if limit.is_some_and(|n| sequence >= n) {
            break;
        }
        while let Ok(image) = return_rx.try_recv() {
            pool.push(image);
        }

        match pool.pop() {
            Some(mut image) => {
                sequence += 1;
                image.sequence = sequence;
                image.timestamp = started.elapsed();
                paint_bars(&mut image, sequence);
                match frames_tx.try_send(image) {
                    Ok(()) => {}
                    Err(TrySendError::Full(image)) => {
                        sensor_drops += 1;
                        pool.push(image);
                    }
                    Err(TrySendError::Closed(_)) => break,
                }
            }
            None => sensor_drops += 1,
        }
        std::thread::sleep(interval);
    }
    debug!("Test-pattern sensor exiting after {} frame(s), {} sensor drop(s)", sequence, sensor_drops);
}

/// Vertical bars, 32 px wide, sliding 8 px per frame.
fn paint_bars(image: &mut PlanarImage, sequence: u64) {
    let width = image.width as usize;
    let shift = (sequence as usize).wrapping_mul(8);
    for row in image.data.chunks_exact_mut(image.row_stride) {
        for (x, sample) in row[..width].iter_mut().enumerate() {
            *sample = if ((x + shift) / 32) % 2 == 0 { 40 } else { 220 };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_range_qualifies_at_24() {
        let camera = TestPatternCamera::new(LensFacing::Back);
        assert_eq!(camera.preferred_fps_range(), FpsRange::new(24, 30));
        assert_eq!(camera.info().facing, LensFacing::Back);
    }

    #[test]
    fn streams_padded_images_until_limit() {
        let mut camera = TestPatternCamera::new(LensFacing::Back).with_frame_limit(3);
        let request = CaptureRequest::preview(Resolution::new(100, 4), FpsRange::new(240, 240));
        camera.open(&request, StopSignal::new()).unwrap();

        let mut seen = Vec::new();
        while let Some(image) = camera.next_image().unwrap() {
            assert_eq!(image.row_stride, 128);
            assert_eq!(image.data.len(), 128 * 4);
            assert_eq!(image.as_raw_frame().luma.required_len(100, 4), 3 * 128 + 100);
            seen.push(image.sequence);
            camera.release(image);
        }
        camera.close();
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert!(seen.iter().all(|&s| s <= 3));
    }

    #[test]
    fn stop_signal_ends_stream() {
        let mut camera = TestPatternCamera::new(LensFacing::Front);
        let stop = StopSignal::new();
        let request = CaptureRequest::preview(Resolution::new(16, 16), FpsRange::FIXED_30);
        camera.open(&request, stop.clone()).unwrap();
        stop.raise();
        while camera.next_image().unwrap().is_some() {}
        camera.close();
    }

    #[test]
    fn failing_open_reports_error() {
        let mut camera = TestPatternCamera::new(LensFacing::Back).failing_open();
        let request = CaptureRequest::preview(Resolution::HD, FpsRange::FIXED_30);
        let err = camera.open(&request, StopSignal::new()).unwrap_err();
        assert!(matches!(err, CaptureError::OpenFailed { .. }));
        assert!(matches!(camera.next_image(), Err(CaptureError::NotStarted)));
    }
}
