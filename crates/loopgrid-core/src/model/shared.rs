//! Per-channel state shared between the control and audio threads
//!
//! Exactly one `ChannelShared` exists per channel id. Every Document version
//! of a channel points at the same instance, so play status, the position
//! tracker and the queues survive any number of Document swaps.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};

use crossbeam::queue::ArrayQueue;

use super::document::ChannelStatus;
use crate::midi::MidiEvent;
use crate::quantizer::Quantizer;
use crate::types::{ChannelId, Frame, StereoBuffer, MAX_BUFFER_SIZE};

/// Render commands a channel can hold before new ones are dropped
pub const RENDER_QUEUE_SIZE: usize = 32;
/// MIDI events a channel can hold per block before new ones are dropped
pub const MIDI_QUEUE_SIZE: usize = 256;

/// Quantizer action ids used by sample channels
pub mod quantizer_action {
    pub const PLAY: u32 = 0;
    pub const REWIND: u32 = 1;
}

/// What the sample player should do at a given offset of the block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Start playing
    Normal,
    /// Jump back to the begin trim and keep playing
    Rewind,
    /// Stop playing
    Stop,
}

/// A start/stop/rewind request for the sample player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderCommand {
    pub mode: RenderMode,
    /// Offset within the block where the command takes effect
    pub offset: Frame,
}

impl RenderCommand {
    pub fn new(mode: RenderMode, offset: Frame) -> Self {
        Self { mode, offset }
    }
}

/// Interior-mutable cell reserved for the audio thread
///
/// The Document lock is what makes this sound: the control thread only
/// touches the contents while the model is locked and every reader has
/// released, and the audio thread never touches them while locked.
pub struct RtCell<T>(UnsafeCell<T>);

// Safe because access is serialized by the data lock (see above).
unsafe impl<T: Send> Sync for RtCell<T> {}

impl<T> RtCell<T> {
    pub fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// # Safety
    ///
    /// The caller is the audio thread rendering an unlocked Document, or the
    /// control thread holding a `DataLock`. No other reference may be alive.
    #[allow(clippy::mut_from_ref)]
    #[inline]
    pub unsafe fn get_mut(&self) -> &mut T {
        &mut *self.0.get()
    }
}

/// Sample player state that persists across blocks
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerState {
    pub active: bool,
    /// Fractional part of the read position when pitched
    pub frac: f64,
}

/// Buffers and player state owned by the audio thread
pub struct ChannelRt {
    pub audio: StereoBuffer,
    pub midi: Vec<MidiEvent>,
    pub player: PlayerState,
}

impl ChannelRt {
    fn new(buffer_size: usize) -> Self {
        let mut audio = StereoBuffer::with_capacity(MAX_BUFFER_SIZE);
        audio.set_len_from_capacity(buffer_size);
        Self {
            audio,
            midi: Vec::with_capacity(MIDI_QUEUE_SIZE),
            player: PlayerState::default(),
        }
    }
}

/// Lock-free shared state of one channel
pub struct ChannelShared {
    pub id: ChannelId,
    play_status: AtomicU8,
    rec_status: AtomicU8,
    read_actions: AtomicBool,
    /// All-notes-off requested by the control thread, flushed by the audio thread
    notes_off: AtomicBool,
    tracker: AtomicUsize,
    /// Internal volume (velocity as volume), stored as f32 bits
    volume_i: AtomicU32,
    render_queue: ArrayQueue<RenderCommand>,
    midi_queue: ArrayQueue<MidiEvent>,
    quantizer: Option<Quantizer>,
    rt: RtCell<ChannelRt>,
}

impl ChannelShared {
    /// New shared state; only sample and preview channels get a quantizer
    pub fn new(id: ChannelId, with_quantizer: bool) -> Self {
        Self::with_buffer_size(id, with_quantizer, crate::types::DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(id: ChannelId, with_quantizer: bool, buffer_size: usize) -> Self {
        Self {
            id,
            play_status: AtomicU8::new(ChannelStatus::Off as u8),
            rec_status: AtomicU8::new(ChannelStatus::Off as u8),
            read_actions: AtomicBool::new(false),
            notes_off: AtomicBool::new(false),
            tracker: AtomicUsize::new(0),
            volume_i: AtomicU32::new(1.0_f32.to_bits()),
            render_queue: ArrayQueue::new(RENDER_QUEUE_SIZE),
            midi_queue: ArrayQueue::new(MIDI_QUEUE_SIZE),
            quantizer: with_quantizer.then(Quantizer::new),
            rt: RtCell::new(ChannelRt::new(buffer_size)),
        }
    }

    #[inline]
    pub fn play_status(&self) -> ChannelStatus {
        ChannelStatus::from_u8(self.play_status.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_play_status(&self, status: ChannelStatus) {
        self.play_status.store(status as u8, Ordering::Release);
    }

    #[inline]
    pub fn rec_status(&self) -> ChannelStatus {
        ChannelStatus::from_u8(self.rec_status.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_rec_status(&self, status: ChannelStatus) {
        self.rec_status.store(status as u8, Ordering::Release);
    }

    #[inline]
    pub fn read_actions(&self) -> bool {
        self.read_actions.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_read_actions(&self, read: bool) {
        self.read_actions.store(read, Ordering::Release);
    }

    /// Reading recorded actions right now
    pub fn is_reading_actions(&self) -> bool {
        self.read_actions() && self.rec_status().is_playing()
    }

    pub fn request_notes_off(&self) {
        self.notes_off.store(true, Ordering::Release);
    }

    /// Consume a pending all-notes-off request
    pub fn take_notes_off(&self) -> bool {
        self.notes_off.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub fn tracker(&self) -> Frame {
        self.tracker.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_tracker(&self, frame: Frame) {
        self.tracker.store(frame, Ordering::Relaxed);
    }

    #[inline]
    pub fn volume_i(&self) -> f32 {
        f32::from_bits(self.volume_i.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set_volume_i(&self, volume: f32) {
        self.volume_i.store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn quantizer(&self) -> Option<&Quantizer> {
        self.quantizer.as_ref()
    }

    /// Queue a render command; dropped if the queue is full
    pub fn push_render(&self, command: RenderCommand) -> bool {
        self.render_queue.push(command).is_ok()
    }

    pub fn pop_render(&self) -> Option<RenderCommand> {
        self.render_queue.pop()
    }

    /// Queue a MIDI event for the plugin stack; dropped if the queue is full
    pub fn push_midi(&self, event: MidiEvent) -> bool {
        self.midi_queue.push(event).is_ok()
    }

    pub fn pop_midi(&self) -> Option<MidiEvent> {
        self.midi_queue.pop()
    }

    /// Audio-thread buffers and player state
    ///
    /// # Safety
    ///
    /// See [`RtCell::get_mut`].
    #[allow(clippy::mut_from_ref)]
    #[inline]
    pub unsafe fn rt(&self) -> &mut ChannelRt {
        self.rt.get_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let shared = ChannelShared::new(ChannelId(4), true);
        assert_eq!(shared.play_status(), ChannelStatus::Off);
        assert!(shared.quantizer().is_some());
        assert!(!shared.is_reading_actions());
        assert_eq!(shared.volume_i(), 1.0);
        assert!(ChannelShared::new(ChannelId(5), false).quantizer().is_none());
    }

    #[test]
    fn test_reading_actions_needs_rec_status() {
        let shared = ChannelShared::new(ChannelId(4), true);
        shared.set_read_actions(true);
        assert!(!shared.is_reading_actions());
        shared.set_rec_status(ChannelStatus::Play);
        assert!(shared.is_reading_actions());
        shared.set_rec_status(ChannelStatus::Ending);
        assert!(shared.is_reading_actions());
        shared.set_rec_status(ChannelStatus::Wait);
        assert!(!shared.is_reading_actions());
    }

    #[test]
    fn test_full_render_queue_drops() {
        let shared = ChannelShared::new(ChannelId(4), true);
        for _ in 0..RENDER_QUEUE_SIZE {
            assert!(shared.push_render(RenderCommand::new(RenderMode::Normal, 0)));
        }
        assert!(!shared.push_render(RenderCommand::new(RenderMode::Stop, 0)));
        assert_eq!(shared.pop_render().map(|c| c.mode), Some(RenderMode::Normal));
    }
}
