//! One-shot deferred actions aligned to the quantize grid
//!
//! A control-thread trigger arms the quantizer with an action id; the audio
//! thread fires it at the first grid boundary that falls inside a block.
//! The armed state is a single atomic so both sides can touch it without a
//! lock.

use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::types::Frame;

/// Sentinel stored while nothing is armed
const IDLE: u32 = u32::MAX;

/// Quantize grid: `step` frames between boundaries, restarting every `period`
///
/// The period is a beat, so the grid stays on the beat (and on the loop
/// start) when the beat does not divide evenly by the step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub step: Frame,
    pub period: Frame,
}

impl Grid {
    /// Offset from `frame` to the next boundary at or after it
    pub fn distance(&self, frame: Frame) -> Frame {
        let step = self.step.max(1);
        let period = self.period.max(step);
        let pos = frame % period;

        let mut next = pos.div_ceil(step) * step;
        // The last partial step before the period end is not a boundary
        if next + step > period {
            next = period;
        }
        next - pos
    }
}

/// Deferred action slot
#[derive(Debug)]
pub struct Quantizer {
    pending: AtomicU32,
}

impl Default for Quantizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Quantizer {
    pub fn new() -> Self {
        Self {
            pending: AtomicU32::new(IDLE),
        }
    }

    /// Arm with an action; replaces any action still pending
    pub fn trigger(&self, action: u32) {
        debug_assert_ne!(action, IDLE);
        self.pending.store(action, Ordering::Release);
    }

    /// Disarm without firing
    pub fn clear(&self) {
        self.pending.store(IDLE, Ordering::Release);
    }

    pub fn has_been_triggered(&self) -> bool {
        self.pending.load(Ordering::Acquire) != IDLE
    }

    /// Fire the pending action if a grid boundary falls inside `block`
    ///
    /// `fire` receives the action and the boundary's offset from the start
    /// of the block. A zero step fires on the first frame.
    pub fn advance(&self, block: Range<Frame>, grid: Grid, mut fire: impl FnMut(u32, Frame)) {
        if !self.has_been_triggered() {
            return;
        }

        let delta = grid.distance(block.start);
        if delta >= block.len() {
            return;
        }

        // A trigger may have replaced the action since the check above
        let action = self.pending.swap(IDLE, Ordering::AcqRel);
        if action != IDLE {
            fire(action, delta);
        }
    }
}
