//! Take buffer for input recording
//!
//! The control thread sizes a silent take when recording is armed and moves
//! it out again when recording stops, both under the data lock. In between
//! only the audio thread writes into it, so nothing is allocated or freed
//! on the real-time path.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::shared::RtCell;
use crate::types::{Frame, StereoBuffer};

struct Take {
    audio: StereoBuffer,
    /// Frames written so far (free mode) or distinct loop frames touched
    /// (rigid mode, capped at the loop length)
    captured: Frame,
}

/// Input capture state shared by the control and audio threads
pub struct InputCapture {
    /// The input crossed the trigger level while the transport was waiting
    signalled: AtomicBool,
    captured: AtomicUsize,
    take: RtCell<Take>,
}

impl Default for InputCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InputCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputCapture")
            .field("signalled", &self.is_signalled())
            .field("captured", &self.captured())
            .finish()
    }
}

impl InputCapture {
    pub fn new() -> Self {
        Self {
            signalled: AtomicBool::new(false),
            captured: AtomicUsize::new(0),
            take: RtCell::new(Take {
                audio: StereoBuffer::default(),
                captured: 0,
            }),
        }
    }

    pub fn is_signalled(&self) -> bool {
        self.signalled.load(Ordering::Acquire)
    }

    pub(crate) fn set_signalled(&self) {
        self.signalled.store(true, Ordering::Release);
    }

    /// Frames captured by the current take
    pub fn captured(&self) -> Frame {
        self.captured.load(Ordering::Relaxed)
    }

    /// Replace the take with `frames` of silence
    ///
    /// # Safety
    ///
    /// Control thread holding the data lock.
    pub(crate) unsafe fn arm(&self, frames: Frame) {
        let take = self.take.get_mut();
        take.audio = StereoBuffer::silence(frames);
        take.captured = 0;
        self.captured.store(0, Ordering::Relaxed);
        self.signalled.store(false, Ordering::Release);
    }

    /// Move the take out, leaving an empty one behind
    ///
    /// Returns the buffer and how many frames were captured.
    ///
    /// # Safety
    ///
    /// Control thread holding the data lock.
    pub(crate) unsafe fn take(&self) -> (StereoBuffer, Frame) {
        let take = self.take.get_mut();
        let captured = std::mem::take(&mut take.captured);
        let audio = std::mem::take(&mut take.audio);
        self.captured.store(0, Ordering::Relaxed);
        self.signalled.store(false, Ordering::Release);
        (audio, captured)
    }

    /// Sum one block into the take at its loop position, wrapping at the loop end
    ///
    /// # Safety
    ///
    /// Audio thread rendering an unlocked Document.
    pub(crate) unsafe fn write_rigid(&self, input: &StereoBuffer, frames: usize, start: Frame, loop_len: Frame) {
        let take = self.take.get_mut();
        let limit = loop_len.min(take.audio.len());
        if limit == 0 {
            return;
        }
        let frames = frames.min(input.len());
        for i in 0..frames {
            take.audio[(start + i) % limit] += input[i];
        }
        take.captured = (take.captured + frames).min(limit);
        self.captured.store(take.captured, Ordering::Relaxed);
    }

    /// Append one block; capture stops once the take is full
    ///
    /// # Safety
    ///
    /// Audio thread rendering an unlocked Document.
    pub(crate) unsafe fn write_free(&self, input: &StereoBuffer, frames: usize) {
        let take = self.take.get_mut();
        let room = take.audio.len() - take.captured;
        let frames = frames.min(input.len()).min(room);
        for i in 0..frames {
            take.audio[take.captured + i] = input[i];
        }
        take.captured += frames;
        self.captured.store(take.captured, Ordering::Relaxed);
    }
}
