//! Single-producer / single-consumer frame handoff.
//!
//! Three [`FrameBuffer`] slots rotate between the producer (back), the
//! shared middle, and the consumer (front). The middle index and a "fresh"
//! bit share one atomic byte, so both publishing and consuming are a single
//! `swap` and neither side ever waits for the other.
//!
//! ```text
//!  producer                    middle                    consumer
//!  back ── publish(): swap ──► [idx|FRESH] ── try_consume(): swap ──► front
//! ```
//!
//! The producer only ever writes its back slot and the consumer only reads
//! its front slot; a slot changes hands only through the swap, whose
//! acquire/release pairing makes the writes visible before the read.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use edgecam_core::FrameBuffer;

const INDEX_MASK: u8 = 0b0011;
const FRESH: u8 = 0b0100;

struct Slot {
    frame: FrameBuffer,
    generation: u64,
}

struct Shared {
    slots: [UnsafeCell<Slot>; 3],
    middle: AtomicU8,
}

// SAFETY: each slot is reachable from exactly one side at a time (back for
// the publisher, front for the consumer, middle for neither), and ownership
// moves only through `middle.swap` with AcqRel ordering.
unsafe impl Sync for Shared {}

impl Shared {
    fn new() -> Self {
        let slot = || UnsafeCell::new(Slot { frame: FrameBuffer::new(), generation: 0 });
        Self { slots: [slot(), slot(), slot()], middle: AtomicU8::new(1) }
    }
}

/// Create a connected publisher / consumer pair with empty slots and the
/// generation counter at zero.
pub fn handoff() -> (FramePublisher, FrameConsumer) {
    let shared = Arc::new(Shared::new());
    let publisher = FramePublisher { shared: Arc::clone(&shared), back: 0, generation: 0 };
    let consumer = FrameConsumer { shared, front: 2, last_generation: 0 };
    (publisher, consumer)
}

// ── Producer side ─────────────────────────────────────────────────────────────

/// Write half, owned by the frame ingest.
pub struct FramePublisher {
    shared: Arc<Shared>,
    back: u8,
    generation: u64,
}

impl FramePublisher {
    /// The slot being filled. Exclusively ours until [`publish`](Self::publish).
    pub fn back_buffer(&mut self) -> &mut FrameBuffer {
        // SAFETY: `back` is never the middle or front index, so no other
        // reference to this slot exists.
        unsafe { &mut (*self.shared.slots[self.back as usize].get()).frame }
    }

    /// Make the back slot the newest frame, replacing any unconsumed one.
    /// Returns the generation it was stamped with.
    pub fn publish(&mut self) -> u64 {
        self.generation += 1;
        // SAFETY: as in `back_buffer`.
        unsafe { (*self.shared.slots[self.back as usize].get()).generation = self.generation };
        let previous = self.shared.middle.swap(self.back | FRESH, Ordering::AcqRel);
        self.back = previous & INDEX_MASK;
        self.generation
    }

    /// Generation of the most recent publish (0 before the first).
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

// ── Consumer side ─────────────────────────────────────────────────────────────

/// A published frame lent to the consumer until its next `try_consume`.
#[derive(Debug, Clone, Copy)]
pub struct PublishedFrame<'a> {
    pub frame: &'a FrameBuffer,
    pub generation: u64,
}

/// Read half, owned by the presenter.
pub struct FrameConsumer {
    shared: Arc<Shared>,
    front: u8,
    last_generation: u64,
}

impl FrameConsumer {
    /// True when a frame has been published since the last consume.
    pub fn has_fresh(&self) -> bool {
        self.shared.middle.load(Ordering::Acquire) & FRESH != 0
    }

    /// Take the newest published frame if it has not been seen yet.
    pub fn try_consume(&mut self) -> Option<PublishedFrame<'_>> {
        if !self.has_fresh() {
            return None;
        }
        // Only this side clears FRESH, so the slot is still fresh here even
        // if the producer published again since the load.
        let previous = self.shared.middle.swap(self.front, Ordering::AcqRel);
        self.front = previous & INDEX_MASK;

        // SAFETY: `front` is never the back or middle index.
        let slot = unsafe { &*self.shared.slots[self.front as usize].get() };
        debug_assert!(slot.generation > self.last_generation, "generation went backwards");
        self.last_generation = slot.generation;
        Some(PublishedFrame { frame: &slot.frame, generation: slot.generation })
    }

    /// Generation of the last frame returned by `try_consume`.
    pub fn last_generation(&self) -> u64 {
        self.last_generation
    }
}
