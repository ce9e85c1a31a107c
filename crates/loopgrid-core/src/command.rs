//! Lock-free command queue from the control thread to the renderer
//!
//! Almost all engine state travels through the published Document or the
//! channels' shared atomics. The exceptions are transport jumps, which must
//! be applied by the audio-thread sequencer so that its quantizer and clock
//! follower see them: those go through this queue.
//!
//! The `rtrb` ringbuffer is single-producer single-consumer, wait-free and
//! allocated once at startup.
//!
//! # Usage
//!
//! ```ignore
//! let (mut tx, mut rx) = command_channel();
//!
//! // Control thread
//! tx.push(EngineCommand::Rewind)?;
//!
//! // Audio thread, at the start of each block
//! while let Ok(command) = rx.pop() { /* ... */ }
//! ```

use crate::types::Frame;

/// Commands applied by the renderer at the start of the next block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    /// Rewind to frame 0, at the next quantize boundary when quantizing
    Rewind,
    /// Rewind to frame 0 right away, ignoring the quantizer
    RewindNow,
    /// Move the transport to a frame (wrapped on the loop length)
    SetFrame { frame: Frame },
}

/// Command queue capacity
///
/// Transport commands are rare; 64 leaves plenty of room for bursts from a
/// MIDI controller between two blocks.
pub const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Create a command channel pair (producer for control, consumer for audio)
pub fn command_channel() -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}
