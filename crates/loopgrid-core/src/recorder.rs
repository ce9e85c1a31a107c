//! Action recording (control thread)
//!
//! While recording, key presses on one-shot sample channels and live MIDI on
//! armed MIDI channels are written to the Document's action store at the
//! (quantized) current frame. When recording stops, every channel that got
//! new actions starts reading them right away.
//!
//! In signal mode, arming the recorder only puts the transport in
//! [`SeqStatus::Waiting`]; the first key press starts both the transport and
//! the recording.
//!
//! Input takes follow the same trigger modes, except that the signal is the
//! master input reaching the trigger level. The audio itself is captured by
//! the renderer; here only the transport and Document flags change.

use std::collections::BTreeSet;

use log::debug;

use crate::midi::MidiEvent;
use crate::model::{Action, ChannelKind, ChannelStatus, Document, InputRecMode, RecTriggerMode, SeqStatus};
use crate::types::ChannelId;

/// Bookkeeping for one recording pass
#[derive(Debug, Default)]
pub struct Recorder {
    /// Channels that received actions since recording started
    recorded: BTreeSet<ChannelId>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recording and the transport is rolling
    pub fn can_record_actions(doc: &Document) -> bool {
        doc.mixer.recording_actions && doc.sequencer.is_running() && !doc.mixer.recording_input
    }

    pub fn is_armed(doc: &Document) -> bool {
        doc.mixer.recording_actions || (doc.sequencer.status == SeqStatus::Waiting && !doc.mixer.recording_input)
    }

    /// Arm recording in the given trigger mode
    pub fn prepare(&mut self, doc: &mut Document, mode: RecTriggerMode) {
        self.recorded.clear();
        match mode {
            RecTriggerMode::Normal => {
                doc.mixer.recording_actions = true;
                doc.sequencer.status = SeqStatus::Running;
                debug!("Start action rec, normal mode");
            }
            RecTriggerMode::Signal => {
                doc.sequencer.status = SeqStatus::Waiting;
                debug!("Start action rec, signal mode (waiting for the first key press)");
            }
        }
    }

    /// Stop recording and hand the new actions to their channels
    ///
    /// Returns the channels that got consolidated.
    pub fn stop(&mut self, doc: &mut Document) -> Vec<ChannelId> {
        // Armed in signal mode but nothing happened yet
        if doc.sequencer.status == SeqStatus::Waiting && !doc.mixer.recording_input {
            doc.sequencer.status = SeqStatus::Stopped;
            doc.mixer.recording_actions = false;
            self.recorded.clear();
            return Vec::new();
        }
        if !doc.mixer.recording_actions {
            return Vec::new();
        }
        doc.mixer.recording_actions = false;

        let ids: Vec<ChannelId> = std::mem::take(&mut self.recorded).into_iter().collect();
        for &id in &ids {
            let Some(channel) = doc.channel_mut(id) else {
                continue;
            };
            channel.has_actions = true;
            channel.shared.set_read_actions(true);
            channel.shared.set_rec_status(ChannelStatus::Play);
            if matches!(channel.kind, ChannelKind::Midi(_)) {
                channel.shared.set_play_status(ChannelStatus::Play);
            }
        }
        debug!("Stop action rec, {} channel(s) consolidated", ids.len());
        ids
    }

    pub fn toggle(&mut self, doc: &mut Document) {
        if Self::is_armed(doc) {
            self.stop(doc);
        } else {
            let mode = doc.mixer.rec_trigger_mode;
            self.prepare(doc, mode);
        }
    }

    /// First signal in signal mode: start transport and recording
    ///
    /// Returns `true` when the transport has just been started.
    pub fn start_on_signal(&mut self, doc: &mut Document) -> bool {
        if doc.sequencer.status != SeqStatus::Waiting || doc.mixer.recording_input {
            return false;
        }
        doc.mixer.recording_actions = true;
        doc.sequencer.status = SeqStatus::Running;
        true
    }

    /// Record `event` for a channel at the current (quantized) frame
    ///
    /// Returns `false` when the channel cannot take actions or nothing is
    /// being recorded.
    pub fn record(&mut self, doc: &mut Document, channel_id: ChannelId, event: MidiEvent) -> bool {
        if !Self::can_record_actions(doc) {
            return false;
        }
        let accepts = match doc.channel(channel_id) {
            Some(channel) => match channel.kind {
                ChannelKind::Midi(_) => channel.armed,
                _ => channel.can_action_rec(),
            },
            None => false,
        };
        if !accepts {
            return false;
        }

        let frame = doc.sequencer.quantize(doc.sequencer.current_frame());
        let mut actions = (*doc.actions).clone();
        actions.record(Action {
            channel_id,
            frame,
            event: event.with_delta(0),
        });
        doc.set_actions(actions);
        self.recorded.insert(channel_id);
        true
    }

    /// Forget a channel (it is being deleted or its actions cleared)
    pub fn forget(&mut self, channel_id: ChannelId) {
        self.recorded.remove(&channel_id);
    }

    // ── Input takes ─────────────────────────────────────────────

    pub fn has_input_recordable_channels(doc: &Document) -> bool {
        doc.channels.iter().any(|c| c.can_input_rec())
    }

    /// Free takes set the loop length, so no sample channel may hold audio yet
    pub fn can_enable_free_input_rec(doc: &Document) -> bool {
        !doc.channels.iter().any(|c| matches!(c.kind, ChannelKind::Sample(_)) && c.has_wave())
    }

    /// Frames the take buffer needs for the current mode
    pub fn input_rec_frames(doc: &Document) -> usize {
        match doc.mixer.input_rec_mode {
            InputRecMode::Rigid => doc.sequencer.frames_in_loop,
            InputRecMode::Free => doc.sequencer.frames_in_seq,
        }
    }

    /// Arm an input take
    ///
    /// The caller sizes the take buffer under the data lock.
    pub fn prepare_input(&mut self, doc: &mut Document, trigger: RecTriggerMode) {
        doc.mixer.recording_input = true;
        match trigger {
            RecTriggerMode::Normal => {
                doc.sequencer.status = SeqStatus::Running;
                debug!("Start input rec, normal mode");
            }
            RecTriggerMode::Signal => {
                doc.sequencer.status = SeqStatus::Waiting;
                debug!("Start input rec, signal mode (waiting for input)");
            }
        }
    }

    /// Publish `Running` once the renderer has seen the trigger signal
    ///
    /// Returns `true` when the status changed.
    pub fn start_input_on_signal(&mut self, doc: &mut Document) -> bool {
        if !doc.mixer.recording_input || doc.sequencer.status != SeqStatus::Waiting {
            return false;
        }
        if !doc.mixer.shared.input.is_signalled() {
            return false;
        }
        doc.sequencer.status = SeqStatus::Running;
        true
    }

    /// End the input take
    ///
    /// Returns `true` when there is audio to hand to the channels. A take
    /// still waiting for its signal is cancelled and the transport stops.
    pub fn stop_input(&mut self, doc: &mut Document) -> bool {
        if !doc.mixer.recording_input {
            return false;
        }
        doc.mixer.recording_input = false;

        if doc.sequencer.status == SeqStatus::Waiting {
            if !doc.mixer.shared.input.is_signalled() {
                doc.sequencer.status = SeqStatus::Stopped;
                debug!("Input rec cancelled before the signal");
                return false;
            }
            doc.sequencer.status = SeqStatus::Running;
        }
        debug!("Stop input rec, {} frame(s) captured", doc.mixer.shared.input.captured());
        doc.mixer.shared.input.captured() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::gc_handle;
    use crate::model::{Channel, ChannelShared, MidiParams, SampleParams, SamplePlayerMode};
    use crate::types::{StereoBuffer, StereoSample, WaveId};
    use crate::wave::Wave;
    use basedrop::Shared;

    const SAMPLE: ChannelId = ChannelId(4);
    const MIDI: ChannelId = ChannelId(5);

    fn document() -> Document {
        let mut doc = Document::new(48000, 256);
        let mut params = SampleParams {
            mode: SamplePlayerMode::SingleBasic,
            ..SampleParams::default()
        };
        let wave = Wave::new(WaveId(1), "kick.wav", 48000, StereoBuffer::from_vec(vec![StereoSample::mono(1.0); 16]));
        params.set_wave(Some(Shared::new(&gc_handle(), wave)));
        let shared = Shared::new(&gc_handle(), ChannelShared::new(SAMPLE, true));
        doc.channels.push(Channel::new(SAMPLE, ChannelKind::Sample(params), shared));

        let shared = Shared::new(&gc_handle(), ChannelShared::new(MIDI, false));
        doc.channels.push(Channel::new(MIDI, ChannelKind::Midi(MidiParams::default()), shared));
        doc
    }

    #[test]
    fn test_normal_mode_records_and_consolidates() {
        let mut doc = document();
        let mut rec = Recorder::new();

        rec.prepare(&mut doc, RecTriggerMode::Normal);
        assert!(doc.mixer.recording_actions);
        assert!(doc.sequencer.is_running());

        doc.sequencer.shared.set_current_frame(1234);
        assert!(rec.record(&mut doc, SAMPLE, MidiEvent::note_on(60, 100)));
        assert_eq!(doc.actions.all()[0].frame, 1234);

        let channel = doc.channel(SAMPLE).unwrap();
        assert!(!channel.shared.is_reading_actions());

        assert_eq!(rec.stop(&mut doc), vec![SAMPLE]);
        let channel = doc.channel(SAMPLE).unwrap();
        assert!(channel.has_actions);
        assert!(channel.shared.is_reading_actions());
        assert!(!doc.mixer.recording_actions);
    }

    #[test]
    fn test_recorded_frame_is_quantized() {
        let mut doc = document();
        let mut rec = Recorder::new();
        doc.sequencer.set_quantize(1);
        rec.prepare(&mut doc, RecTriggerMode::Normal);

        let beat = doc.sequencer.frames_in_beat;
        doc.sequencer.shared.set_current_frame(beat + 10);
        rec.record(&mut doc, SAMPLE, MidiEvent::note_on(60, 100));
        assert_eq!(doc.actions.all()[0].frame, beat);
    }

    #[test]
    fn test_signal_mode_waits_for_first_press() {
        let mut doc = document();
        let mut rec = Recorder::new();
        rec.prepare(&mut doc, RecTriggerMode::Signal);
        assert_eq!(doc.sequencer.status, SeqStatus::Waiting);
        assert!(!rec.record(&mut doc, SAMPLE, MidiEvent::note_on(60, 100)));

        assert!(rec.start_on_signal(&mut doc));
        assert!(doc.sequencer.is_running());
        assert!(rec.record(&mut doc, SAMPLE, MidiEvent::note_on(60, 100)));
        assert!(!rec.start_on_signal(&mut doc));
    }

    #[test]
    fn test_stop_while_waiting_cancels() {
        let mut doc = document();
        let mut rec = Recorder::new();
        doc.mixer.rec_trigger_mode = RecTriggerMode::Signal;

        rec.toggle(&mut doc);
        assert_eq!(doc.sequencer.status, SeqStatus::Waiting);
        rec.toggle(&mut doc);
        assert_eq!(doc.sequencer.status, SeqStatus::Stopped);
        assert!(doc.actions.is_empty());
    }

    #[test]
    fn test_midi_channels_record_only_when_armed() {
        let mut doc = document();
        let mut rec = Recorder::new();
        rec.prepare(&mut doc, RecTriggerMode::Normal);

        assert!(!rec.record(&mut doc, MIDI, MidiEvent::note_on(64, 80)));
        doc.channel_mut(MIDI).unwrap().armed = true;
        assert!(rec.record(&mut doc, MIDI, MidiEvent::note_on(64, 80)));

        rec.stop(&mut doc);
        assert_eq!(doc.channel(MIDI).unwrap().play_status(), ChannelStatus::Play);
    }

    #[test]
    fn test_input_take_blocks_action_rec() {
        let mut doc = document();
        let mut rec = Recorder::new();
        doc.channel_mut(SAMPLE).unwrap().armed = true;
        assert!(Recorder::has_input_recordable_channels(&doc));

        rec.prepare_input(&mut doc, RecTriggerMode::Normal);
        doc.mixer.recording_actions = true;
        assert!(!Recorder::can_record_actions(&doc));
        assert!(!rec.record(&mut doc, SAMPLE, MidiEvent::note_on(60, 100)));
    }

    #[test]
    fn test_input_signal_mode_waits_for_capture_signal() {
        let mut doc = document();
        let mut rec = Recorder::new();
        rec.prepare_input(&mut doc, RecTriggerMode::Signal);
        assert_eq!(doc.sequencer.status, SeqStatus::Waiting);
        // a waiting input take does not count as armed action recording
        assert!(!Recorder::is_armed(&doc));
        assert!(!rec.start_on_signal(&mut doc));
        assert!(!rec.start_input_on_signal(&mut doc));

        doc.mixer.shared.input.set_signalled();
        assert!(rec.start_input_on_signal(&mut doc));
        assert!(doc.sequencer.is_running());
    }

    #[test]
    fn test_input_stop_before_signal_cancels() {
        let mut doc = document();
        let mut rec = Recorder::new();
        rec.prepare_input(&mut doc, RecTriggerMode::Signal);
        assert!(!rec.stop_input(&mut doc));
        assert_eq!(doc.sequencer.status, SeqStatus::Stopped);
        assert!(!doc.mixer.recording_input);
        assert!(!rec.stop_input(&mut doc));
    }

    #[test]
    fn test_free_input_rec_needs_empty_channels() {
        let mut doc = document();
        assert!(!Recorder::can_enable_free_input_rec(&doc));
        if let Some(p) = doc.channel_mut(SAMPLE).unwrap().sample_mut() {
            p.set_wave(None);
        }
        assert!(Recorder::can_enable_free_input_rec(&doc));

        doc.mixer.input_rec_mode = InputRecMode::Free;
        assert_eq!(Recorder::input_rec_frames(&doc), doc.sequencer.frames_in_seq);
        doc.mixer.input_rec_mode = InputRecMode::Rigid;
        assert_eq!(Recorder::input_rec_frames(&doc), doc.sequencer.frames_in_loop);
    }

    #[test]
    fn test_loop_channels_do_not_record() {
        let mut doc = document();
        let mut rec = Recorder::new();
        if let Some(p) = doc.channel_mut(SAMPLE).unwrap().sample_mut() {
            p.mode = SamplePlayerMode::LoopBasic;
        }
        rec.prepare(&mut doc, RecTriggerMode::Normal);
        assert!(!rec.record(&mut doc, SAMPLE, MidiEvent::note_on(60, 100)));
    }
}
