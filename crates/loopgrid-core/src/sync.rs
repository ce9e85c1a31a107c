//! External synchronization seams
//!
//! [`TransportSync`] lets an external transport master (house sync) claim
//! start/stop/rewind/tempo/position requests on the control thread.
//! [`ClockSync`] is driven by the sequencer on the audio thread, e.g. to send
//! MIDI clock.

use std::ops::Range;

use crate::midi::{MidiEvent, MidiOutput};
use crate::model::SeqStatus;
use crate::types::Frame;

/// External transport master
///
/// Every method returns `true` when the external transport took the request;
/// the engine then skips its internal equivalent.
pub trait TransportSync: Send {
    fn start(&mut self) -> bool;
    fn stop(&mut self) -> bool;
    fn set_position(&mut self, frame: Frame) -> bool;
    fn set_bpm(&mut self, bpm: f32) -> bool;
}

/// No external transport: everything is handled internally
#[derive(Debug, Default)]
pub struct InternalTransport;

impl TransportSync for InternalTransport {
    fn start(&mut self) -> bool {
        false
    }

    fn stop(&mut self) -> bool {
        false
    }

    fn set_position(&mut self, _frame: Frame) -> bool {
        false
    }

    fn set_bpm(&mut self, _bpm: f32) -> bool {
        false
    }
}

/// Clock follower driven from the audio thread
pub trait ClockSync: Send {
    /// Called once per running block over the un-wrapped frame range
    fn advance(&mut self, block: Range<Frame>, frames_in_beat: Frame);
    fn on_status(&mut self, status: SeqStatus);
    fn on_rewind(&mut self);
}

/// Clock sync that does nothing
#[derive(Debug, Default)]
pub struct NoClockSync;

impl ClockSync for NoClockSync {
    fn advance(&mut self, _block: Range<Frame>, _frames_in_beat: Frame) {}
    fn on_status(&mut self, _status: SeqStatus) {}
    fn on_rewind(&mut self) {}
}

pub const MIDI_CLOCK: u8 = 0xF8;
pub const MIDI_START: u8 = 0xFA;
pub const MIDI_STOP: u8 = 0xFC;
/// Song position pointer
pub const MIDI_POSITION: u8 = 0xF2;

/// Pulses per quarter note of MIDI clock
const CLOCK_PPQ: Frame = 24;

/// MIDI clock sender (24 pulses per beat, start/stop/rewind messages)
pub struct MidiClock {
    output: Box<dyn MidiOutput>,
}

impl MidiClock {
    pub fn new(output: Box<dyn MidiOutput>) -> Self {
        Self { output }
    }
}

impl ClockSync for MidiClock {
    fn advance(&mut self, block: Range<Frame>, frames_in_beat: Frame) {
        let pulse = (frames_in_beat / CLOCK_PPQ).max(1);
        for frame in block.clone() {
            if frame % pulse == 0 {
                self.output
                    .send(MidiEvent::new(MIDI_CLOCK, 0, 0).with_delta(frame - block.start));
            }
        }
    }

    fn on_status(&mut self, status: SeqStatus) {
        match status {
            SeqStatus::Running => self.output.send(MidiEvent::new(MIDI_START, 0, 0)),
            SeqStatus::Stopped => self.output.send(MidiEvent::new(MIDI_STOP, 0, 0)),
            SeqStatus::Waiting => {}
        }
    }

    fn on_rewind(&mut self) {
        self.output.send(MidiEvent::new(MIDI_POSITION, 0, 0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<MidiEvent>>>);

    impl MidiOutput for Capture {
        fn send(&mut self, event: MidiEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[test]
    fn test_clock_pulses_per_beat() {
        let capture = Capture::default();
        let mut clock = MidiClock::new(Box::new(capture.clone()));

        // 2400 frames per beat -> one pulse every 100 frames
        clock.advance(0..2400, 2400);
        let sent = capture.0.lock().unwrap();
        assert_eq!(sent.len(), 24);
        assert!(sent.iter().all(|e| e.status == MIDI_CLOCK));
        assert_eq!(sent[1].delta, 100);
    }

    #[test]
    fn test_status_messages() {
        let capture = Capture::default();
        let mut clock = MidiClock::new(Box::new(capture.clone()));
        clock.on_status(SeqStatus::Running);
        clock.on_status(SeqStatus::Waiting);
        clock.on_status(SeqStatus::Stopped);

        let statuses: Vec<u8> = capture.0.lock().unwrap().iter().map(|e| e.status).collect();
        assert_eq!(statuses, vec![MIDI_START, MIDI_STOP]);
    }
}
