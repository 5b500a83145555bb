use std::sync::Arc;

use edgecam_capture::{CameraDevice, CaptureRequest, CaptureSession, SessionEvent, SessionStats};
use edgecam_core::CaptureError;
use edgecam_processor::FrameProcessor;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::handoff::{handoff, FrameConsumer};
use crate::ingest::{FrameIngest, FrameNotifier, IngestCounters, IngestSnapshot};

// ── Consumer hand-over ────────────────────────────────────────────────────────

/// Sent from the controller to the render thread when sessions change.
pub enum ConsumerUpdate {
    Attach(FrameConsumer),
    Detach,
}

/// Render-thread end of the consumer hand-over channel.
pub struct ConsumerPort {
    rx: mpsc::UnboundedReceiver<ConsumerUpdate>,
    current: Option<FrameConsumer>,
}

/// Create the channel the controller uses to hand each session's
/// [`FrameConsumer`] to the render thread.
pub fn consumer_channel() -> (mpsc::UnboundedSender<ConsumerUpdate>, ConsumerPort) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, ConsumerPort { rx, current: None })
}

impl ConsumerPort {
    /// Apply queued attach/detach updates without blocking. Returns `true`
    /// if the attached consumer changed.
    pub fn poll_updates(&mut self) -> bool {
        let mut changed = false;
        while let Ok(update) = self.rx.try_recv() {
            changed = true;
            match update {
                ConsumerUpdate::Attach(consumer) => {
                    debug!("Render thread attached new frame consumer");
                    self.current = Some(consumer);
                }
                ConsumerUpdate::Detach => {
                    debug!("Render thread detached frame consumer");
                    self.current = None;
                }
            }
        }
        changed
    }

    pub fn consumer_mut(&mut self) -> Option<&mut FrameConsumer> {
        self.current.as_mut()
    }

    pub fn is_attached(&self) -> bool {
        self.current.is_some()
    }
}

// ── PipelineController ────────────────────────────────────────────────────────

type Ingest = FrameIngest<Box<dyn FrameProcessor>>;

struct ActiveSession {
    capture: CaptureSession<Ingest>,
    counters: Arc<IngestCounters>,
}

/// Final numbers of a stopped session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub capture: SessionStats,
    pub ingest: IngestSnapshot,
}

/// Starts and stops capture sessions, each with fresh buffers and a fresh
/// handoff, and hands the consumer half to the render thread.
pub struct PipelineController {
    consumer_tx: mpsc::UnboundedSender<ConsumerUpdate>,
    notifier: Option<FrameNotifier>,
    session: Option<ActiveSession>,
    session_count: u32,
}

impl PipelineController {
    pub fn new(consumer_tx: mpsc::UnboundedSender<ConsumerUpdate>) -> Self {
        Self { consumer_tx, notifier: None, session: None, session_count: 0 }
    }

    /// Wake the render driver after every publish (on-demand rendering).
    pub fn with_notifier(mut self, notifier: FrameNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Open `device` and start streaming into a new handoff. Blocks until
    /// the device has opened; call from a blocking context.
    pub fn start<D: CameraDevice>(
        &mut self,
        device: D,
        request: CaptureRequest,
        processor: Box<dyn FrameProcessor>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Arc<IngestCounters>, CaptureError> {
        if self.session.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }

        let (publisher, consumer) = handoff();
        let mut ingest = FrameIngest::new(processor, publisher);
        if let Some(notifier) = &self.notifier {
            ingest = ingest.with_notifier(notifier.clone());
        }
        let counters = ingest.counters();

        // On failure the ingest (and its storage) is dropped with the worker.
        let capture = CaptureSession::start(device, request, ingest, events)?;

        self.session_count += 1;
        info!("Pipeline session #{} running on '{}'", self.session_count, capture.device_name());
        if !self.hand_over(ConsumerUpdate::Attach(consumer)) {
            warn!("Render thread gone; frames will not be presented");
        }
        self.session = Some(ActiveSession { capture, counters: Arc::clone(&counters) });
        Ok(counters)
    }

    /// Stop the running session: delivery stops, the in-flight frame
    /// finishes, the worker is joined, then packed storage is released.
    pub fn stop(&mut self) -> Result<Option<SessionSummary>, CaptureError> {
        let Some(active) = self.session.take() else {
            return Ok(None);
        };
        // Worker is joined before the ingest (and its slots) is released.
        let result = active.capture.stop().map(|(ingest, capture)| {
            drop(ingest);
            capture
        });
        // Consumer-side slots go on the render thread's next poll.
        self.hand_over(ConsumerUpdate::Detach);
        let capture = result?;

        let summary = SessionSummary { capture, ingest: active.counters.snapshot() };
        info!(
            "Pipeline session #{} stopped: processed={} dropped={} failed={}",
            self.session_count, summary.ingest.processed, summary.ingest.dropped, summary.ingest.failed
        );
        Ok(Some(summary))
    }

    /// Queue `update` for the render thread and wake an on-demand driver.
    fn hand_over(&self, update: ConsumerUpdate) -> bool {
        let sent = self.consumer_tx.send(update).is_ok();
        if let Some(notifier) = &self.notifier {
            notifier.notify();
        }
        sent
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn counters(&self) -> Option<Arc<IngestCounters>> {
        self.session.as_ref().map(|s| Arc::clone(&s.counters))
    }

    pub fn sessions_started(&self) -> u32 {
        self.session_count
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Stopping pipeline on drop: {}", e);
        }
    }
}
