use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use edgecam_capture::FrameSink;
use edgecam_core::{RawFrame, Resolution};
use edgecam_processor::FrameProcessor;
use tracing::{debug, info, warn};

use crate::handoff::FramePublisher;

// ── FrameNotifier ─────────────────────────────────────────────────────────────

/// Wakes the render driver after a publish (on-demand rendering).
/// Must not block.
#[derive(Clone)]
pub struct FrameNotifier(Arc<dyn Fn() + Send + Sync>);

impl FrameNotifier {
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn notify(&self) {
        (self.0)()
    }
}

impl std::fmt::Debug for FrameNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FrameNotifier")
    }
}

// ── Counters ──────────────────────────────────────────────────────────────────

/// Ingest counters, readable from any thread while the session runs.
#[derive(Debug, Default)]
pub struct IngestCounters {
    processed: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
    resolution_changes: AtomicU64,
    slot_allocations: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSnapshot {
    /// Frames processed and published.
    pub processed: u64,
    /// Raw frames discarded unread because a newer one was queued.
    pub dropped: u64,
    /// Frames lost to processor errors.
    pub failed: u64,
    /// Changes of frame dimensions, including the first frame of the
    /// session. Each one marks all slots for reallocation; slots are
    /// resized lazily as they rotate back to the producer.
    pub resolution_changes: u64,
    /// Individual handoff slots sized to a new resolution (up to three per
    /// resolution change).
    pub slot_allocations: u64,
}

impl IngestCounters {
    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            resolution_changes: self.resolution_changes.load(Ordering::Relaxed),
            slot_allocations: self.slot_allocations.load(Ordering::Relaxed),
        }
    }
}

// ── FrameIngest ───────────────────────────────────────────────────────────────

/// Capture-side half of the pipeline: converts each delivered raw frame
/// into the publisher's back buffer and publishes it.
pub struct FrameIngest<P: FrameProcessor> {
    processor: P,
    publisher: FramePublisher,
    resolution: Resolution,
    notifier: Option<FrameNotifier>,
    counters: Arc<IngestCounters>,
}

impl<P: FrameProcessor> FrameIngest<P> {
    pub fn new(processor: P, publisher: FramePublisher) -> Self {
        Self {
            processor,
            publisher,
            resolution: Resolution::new(0, 0),
            notifier: None,
            counters: Arc::new(IngestCounters::default()),
        }
    }

    pub fn with_notifier(mut self, notifier: FrameNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn counters(&self) -> Arc<IngestCounters> {
        Arc::clone(&self.counters)
    }

    /// Generation of the last published frame.
    pub fn generation(&self) -> u64 {
        self.publisher.generation()
    }

    /// Convert `frame` and publish it. Processing errors drop the frame.
    pub fn on_raw_frame(&mut self, frame: &RawFrame<'_>) {
        let resolution = frame.resolution();
        if resolution != self.resolution {
            info!("Frame size {} → {}, reallocating packed storage", self.resolution, resolution);
            self.resolution = resolution;
            self.counters.resolution_changes.fetch_add(1, Ordering::Relaxed);
        }

        let buffer = self.publisher.back_buffer();
        if buffer.ensure_resolution(resolution) {
            self.counters.slot_allocations.fetch_add(1, Ordering::Relaxed);
        }
        debug_assert!(
            buffer.pixels().len() >= resolution.packed_len(),
            "destination smaller than {} frame",
            resolution
        );

        match self.processor.process(frame, buffer.pixels_mut()) {
            Ok(()) => {
                let generation = self.publisher.publish();
                self.counters.processed.fetch_add(1, Ordering::Relaxed);
                if let Some(notifier) = &self.notifier {
                    notifier.notify();
                }
                debug!("Published frame gen={} {} ts={:?}", generation, resolution, frame.timestamp);
            }
            Err(e) => {
                let failed = self.counters.failed.fetch_add(1, Ordering::Relaxed) + 1;
                if failed < 20 || failed % 120 == 0 {
                    warn!("{} failed on {} frame (failure #{}): {}", self.processor.name(), resolution, failed, e);
                }
            }
        }
    }
}

impl<P: FrameProcessor + 'static> FrameSink for FrameIngest<P> {
    fn on_raw_frame(&mut self, frame: &RawFrame<'_>) {
        FrameIngest::on_raw_frame(self, frame);
    }

    fn on_frames_dropped(&mut self, count: u64) {
        let total = self.counters.dropped.fetch_add(count, Ordering::Relaxed) + count;
        debug!("Backpressure: skipped {} stale frame(s), {} total", count, total);
    }
}
