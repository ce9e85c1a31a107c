//! Minimal MIDI event type
//!
//! Recorded actions, the per-channel MIDI queue and the MIDI output all carry
//! the same three-byte channel message plus a frame delta within the block.

use serde::{Deserialize, Serialize};

use crate::types::Frame;

pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const CONTROL_CHANGE: u8 = 0xB0;
/// Controller number of the "all notes off" channel mode message
pub const ALL_NOTES_OFF_CC: u8 = 0x7B;

/// What a recorded event means to a sample channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiKind {
    NoteOn,
    NoteOff,
    /// All notes off; sample channels treat it as a key kill
    Kill,
    Other,
}

/// A channel voice message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiEvent {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
    /// Offset within the current block (not persisted)
    #[serde(skip)]
    pub delta: Frame,
}

impl MidiEvent {
    pub fn new(status: u8, data1: u8, data2: u8) -> Self {
        Self { status, data1, data2, delta: 0 }
    }

    pub fn note_on(note: u8, velocity: u8) -> Self {
        Self::new(NOTE_ON, note & 0x7F, velocity & 0x7F)
    }

    pub fn note_off(note: u8, velocity: u8) -> Self {
        Self::new(NOTE_OFF, note & 0x7F, velocity & 0x7F)
    }

    pub fn all_notes_off() -> Self {
        Self::new(CONTROL_CHANGE, ALL_NOTES_OFF_CC, 0)
    }

    /// Classify the message (note on with zero velocity counts as note off)
    pub fn kind(&self) -> MidiKind {
        match self.status & 0xF0 {
            NOTE_ON if self.data2 == 0 => MidiKind::NoteOff,
            NOTE_ON => MidiKind::NoteOn,
            NOTE_OFF => MidiKind::NoteOff,
            CONTROL_CHANGE if self.data1 == ALL_NOTES_OFF_CC => MidiKind::Kill,
            _ => MidiKind::Other,
        }
    }

    #[inline]
    pub fn channel(&self) -> u8 {
        self.status & 0x0F
    }

    #[inline]
    pub fn note(&self) -> u8 {
        self.data1
    }

    #[inline]
    pub fn velocity(&self) -> u8 {
        self.data2
    }

    /// Copy of this event re-addressed to another MIDI channel
    pub fn with_channel(mut self, channel: u8) -> Self {
        self.status = (self.status & 0xF0) | (channel & 0x0F);
        self
    }

    /// Copy of this event placed at a block offset
    pub fn with_delta(mut self, delta: Frame) -> Self {
        self.delta = delta;
        self
    }

    /// Velocity mapped to 0.0 - 1.0
    pub fn velocity_float(&self) -> f32 {
        self.data2.min(crate::types::MAX_VELOCITY) as f32 / crate::types::MAX_VELOCITY as f32
    }
}

/// Destination for outgoing MIDI (called on the audio thread)
pub trait MidiOutput: Send {
    fn send(&mut self, event: MidiEvent);
}

/// Output that discards everything
#[derive(Debug, Default)]
pub struct NullMidiOutput;

impl MidiOutput for NullMidiOutput {
    fn send(&mut self, _event: MidiEvent) {}
}
