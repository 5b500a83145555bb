//! edgecam-pipeline: capture → process → handoff, one session at a time.
//!
//! ```text
//! CaptureSession (capture-worker)          render thread
//!   └─ FrameIngest ── FramePublisher ══► FrameConsumer ── Presenter
//!        (processor)      triple buffer        ▲
//!                                              │ ConsumerUpdate::Attach/Detach
//!                         PipelineController ──┘
//! ```
//!
//! The capture worker converts each raw frame into the back slot of a
//! lock-free triple buffer and publishes it; the render thread takes the
//! newest frame whenever it draws. Neither side waits on the other.
//!
//! Each call to [`PipelineController::start`] builds a new handoff with
//! empty buffers and generation 0, and hands the consumer half to the
//! render thread over a channel that the presenter polls with
//! [`ConsumerPort::poll_updates`].

mod controller;
mod handoff;
mod ingest;
mod rate;

pub use controller::{consumer_channel, ConsumerPort, ConsumerUpdate, PipelineController, SessionSummary};
pub use handoff::{handoff, FrameConsumer, FramePublisher, PublishedFrame};
pub use ingest::{FrameIngest, FrameNotifier, IngestCounters, IngestSnapshot};
pub use rate::RateMonitor;
