//! The versioned Document and its value types
//!
//! A Document is cloned on the control thread after every mutation and then
//! published; once published it is never modified. Anything the audio thread
//! has to change lives behind a `Shared` handle instead (channel shared
//! state, the current frame, meters).

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use basedrop::Shared;
use serde::{Deserialize, Serialize};

use super::actions::Actions;
use super::input::InputCapture;
use super::shared::ChannelShared;
use crate::gc::gc_handle;
use crate::plugin::Plugin;
use crate::quantizer::Grid;
use crate::types::{
    beat_to_frames, ChannelId, Frame, DEFAULT_BARS, DEFAULT_BEATS, DEFAULT_BPM, DEFAULT_PAN, DEFAULT_PITCH,
    DEFAULT_QUANTIZE, DEFAULT_REC_TRIGGER_LEVEL, DEFAULT_VOLUME, MAX_BEATS, MAX_BPM, MAX_QUANTIZE, MIN_BPM,
};
use crate::wave::Wave;

// ────────────────────────────────────────────────────────────────
// Status enums
// ────────────────────────────────────────────────────────────────

/// Transport status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SeqStatus {
    #[default]
    Stopped,
    /// Armed, waiting for a signal (e.g. first key press while recording)
    Waiting,
    Running,
}

/// Playback (and recording) status of a channel
///
/// Stored in `AtomicU8`s; see [`ChannelStatus::from_u8`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ChannelStatus {
    #[default]
    Off = 0,
    Wait = 1,
    Play = 2,
    Ending = 3,
}

impl ChannelStatus {
    #[inline]
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ChannelStatus::Wait,
            2 => ChannelStatus::Play,
            3 => ChannelStatus::Ending,
            _ => ChannelStatus::Off,
        }
    }

    /// Play or Ending
    #[inline]
    pub fn is_playing(self) -> bool {
        matches!(self, ChannelStatus::Play | ChannelStatus::Ending)
    }
}

/// Playback mode of a sample channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SamplePlayerMode {
    #[default]
    SingleBasic,
    SingleBasicPause,
    SinglePress,
    SingleRetrig,
    SingleEndless,
    LoopBasic,
    LoopOnce,
    LoopRepeat,
    LoopOnceBar,
}

impl SamplePlayerMode {
    pub fn is_loop(self) -> bool {
        matches!(
            self,
            SamplePlayerMode::LoopBasic
                | SamplePlayerMode::LoopOnce
                | SamplePlayerMode::LoopRepeat
                | SamplePlayerMode::LoopOnceBar
        )
    }
}

/// How recording starts once requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecTriggerMode {
    /// Start right away
    #[default]
    Normal,
    /// Put the transport in `Waiting`; action recording starts on the first
    /// key press, input recording when the input crosses the trigger level
    Signal,
}

/// How an input take maps onto the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InputRecMode {
    /// Exactly one loop long; recording past the loop end wraps around
    #[default]
    Rigid,
    /// As long as the recording; the tempo is fitted to the take afterwards
    Free,
}

// ────────────────────────────────────────────────────────────────
// Sequencer
// ────────────────────────────────────────────────────────────────

/// State the audio thread writes back for the sequencer
#[derive(Debug, Default)]
pub struct SequencerShared {
    current_frame: AtomicUsize,
}

impl SequencerShared {
    #[inline]
    pub fn current_frame(&self) -> Frame {
        self.current_frame.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_current_frame(&self, frame: Frame) {
        self.current_frame.store(frame, Ordering::Relaxed);
    }
}

/// Transport state
#[derive(Clone)]
pub struct SequencerState {
    pub status: SeqStatus,
    pub bpm: f32,
    pub bars: u32,
    pub beats: u32,
    /// Subdivisions per beat, 0 disables quantization
    pub quantize: u32,
    pub metronome: bool,
    pub frames_in_beat: Frame,
    pub frames_in_bar: Frame,
    pub frames_in_loop: Frame,
    pub frames_in_seq: Frame,
    pub shared: Shared<SequencerShared>,
}

impl SequencerState {
    pub fn new(sample_rate: u32) -> Self {
        let mut state = Self {
            status: SeqStatus::Stopped,
            bpm: DEFAULT_BPM,
            bars: DEFAULT_BARS,
            beats: DEFAULT_BEATS,
            quantize: DEFAULT_QUANTIZE,
            metronome: false,
            frames_in_beat: 0,
            frames_in_bar: 0,
            frames_in_loop: 0,
            frames_in_seq: 0,
            shared: Shared::new(&gc_handle(), SequencerShared::default()),
        };
        state.recompute_frames(sample_rate);
        state
    }

    /// Refresh every derived frame count from bpm, beats and bars
    pub fn recompute_frames(&mut self, sample_rate: u32) {
        self.frames_in_beat = beat_to_frames(1.0, sample_rate, self.bpm).max(1);
        self.frames_in_bar = self.frames_in_beat * self.bars as Frame;
        self.frames_in_loop = self.frames_in_beat * self.beats as Frame;
        self.frames_in_seq = self.frames_in_beat * MAX_BEATS as Frame;
    }

    pub fn set_bpm(&mut self, bpm: f32, sample_rate: u32) {
        self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        self.recompute_frames(sample_rate);
    }

    pub fn set_beats(&mut self, beats: u32, bars: u32, sample_rate: u32) {
        self.beats = beats.clamp(1, MAX_BEATS);
        self.bars = bars.clamp(1, self.beats);
        self.recompute_frames(sample_rate);
    }

    pub fn set_quantize(&mut self, quantize: u32) {
        self.quantize = quantize.min(MAX_QUANTIZE);
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.status == SeqStatus::Running
    }

    /// Frames between two quantize boundaries (a whole beat when off)
    pub fn quantizer_step(&self) -> Frame {
        if self.quantize == 0 {
            self.frames_in_beat
        } else {
            (self.frames_in_beat / self.quantize as Frame).max(1)
        }
    }

    pub fn quantizer_grid(&self) -> Grid {
        Grid {
            step: self.quantizer_step(),
            period: self.frames_in_beat,
        }
    }

    /// Quantization only applies while the transport is running
    pub fn can_quantize(&self) -> bool {
        self.quantize > 0 && self.is_running()
    }

    /// Snap a frame to the nearest quantize boundary, modulo the loop length
    ///
    /// Identity when quantization is not possible; idempotent otherwise.
    pub fn quantize(&self, frame: Frame) -> Frame {
        if !self.can_quantize() {
            return frame;
        }
        let step = self.quantizer_step();
        let snapped = ((frame as f64 / step as f64).round() as Frame) * step;
        snapped % self.frames_in_loop.max(1)
    }

    #[inline]
    pub fn current_frame(&self) -> Frame {
        self.shared.current_frame()
    }

    pub fn current_beat(&self) -> u32 {
        (self.current_frame() / self.frames_in_beat.max(1)) as u32
    }

    #[inline]
    pub fn is_on_bar(&self, frame: Frame) -> bool {
        frame % self.frames_in_bar.max(1) == 0
    }

    #[inline]
    pub fn is_on_beat(&self, frame: Frame) -> bool {
        frame % self.frames_in_beat.max(1) == 0
    }
}

// ────────────────────────────────────────────────────────────────
// Mixer and behaviors
// ────────────────────────────────────────────────────────────────

/// Meters and the input take, written by the audio thread
#[derive(Debug, Default)]
pub struct MixerShared {
    peak_out_l: AtomicU32,
    peak_out_r: AtomicU32,
    peak_in_l: AtomicU32,
    peak_in_r: AtomicU32,
    pub input: InputCapture,
}

/// A stereo peak reading
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Peak {
    pub left: f32,
    pub right: f32,
}

impl MixerShared {
    pub fn peak_out(&self) -> Peak {
        Peak {
            left: f32::from_bits(self.peak_out_l.load(Ordering::Relaxed)),
            right: f32::from_bits(self.peak_out_r.load(Ordering::Relaxed)),
        }
    }

    pub fn peak_in(&self) -> Peak {
        Peak {
            left: f32::from_bits(self.peak_in_l.load(Ordering::Relaxed)),
            right: f32::from_bits(self.peak_in_r.load(Ordering::Relaxed)),
        }
    }

    pub(crate) fn store_out(&self, peak: Peak) {
        self.peak_out_l.store(peak.left.to_bits(), Ordering::Relaxed);
        self.peak_out_r.store(peak.right.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn store_in(&self, peak: Peak) {
        self.peak_in_l.store(peak.left.to_bits(), Ordering::Relaxed);
        self.peak_in_r.store(peak.right.to_bits(), Ordering::Relaxed);
    }
}

#[derive(Clone)]
pub struct MixerState {
    pub has_solos: bool,
    /// Route the (processed) input straight to the output
    pub in_to_out: bool,
    pub recording_actions: bool,
    pub recording_input: bool,
    pub rec_trigger_mode: RecTriggerMode,
    pub input_rec_mode: InputRecMode,
    /// dBFS the input must reach to start a signal-triggered take
    pub rec_trigger_level: f32,
    pub shared: Shared<MixerShared>,
}

impl MixerState {
    /// Linear peak matching `rec_trigger_level`
    pub fn rec_trigger_gain(&self) -> f32 {
        10f32.powf(self.rec_trigger_level / 20.0)
    }
}

impl Default for MixerState {
    fn default() -> Self {
        Self {
            has_solos: false,
            in_to_out: false,
            recording_actions: false,
            recording_input: false,
            rec_trigger_mode: RecTriggerMode::Normal,
            input_rec_mode: InputRecMode::Rigid,
            rec_trigger_level: DEFAULT_REC_TRIGGER_LEVEL,
            shared: Shared::new(&gc_handle(), MixerShared::default()),
        }
    }
}

/// User preferences the engine consults while running
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Behaviors {
    /// Stop playing loops (and action-driven channels) when the transport stops
    pub chans_stop_on_seq_halt: bool,
    /// Toggling read-actions waits for the next first beat
    pub treat_recs_as_loops: bool,
}

// ────────────────────────────────────────────────────────────────
// Channels
// ────────────────────────────────────────────────────────────────

/// Parameters of a sample (or preview) channel
#[derive(Clone)]
pub struct SampleParams {
    pub mode: SamplePlayerMode,
    pub begin: Frame,
    pub end: Frame,
    pub shift: Frame,
    pub pitch: f32,
    pub wave: Option<Shared<Wave>>,
    pub input_monitor: bool,
    pub overdub_protection: bool,
    pub velocity_as_volume: bool,
}

impl Default for SampleParams {
    fn default() -> Self {
        Self {
            mode: SamplePlayerMode::SingleBasic,
            begin: 0,
            end: 0,
            shift: 0,
            pitch: DEFAULT_PITCH,
            wave: None,
            input_monitor: false,
            overdub_protection: false,
            velocity_as_volume: false,
        }
    }
}

impl SampleParams {
    pub fn has_wave(&self) -> bool {
        self.wave.is_some()
    }

    /// Attach a wave and reset the trims to its full length
    pub fn set_wave(&mut self, wave: Option<Shared<Wave>>) {
        self.begin = 0;
        self.shift = 0;
        self.end = wave.as_ref().map_or(0, |w| w.len());
        self.wave = wave;
    }

    /// Set trim points, kept inside the wave and ordered
    pub fn set_trims(&mut self, begin: Frame, end: Frame) {
        let len = self.wave.as_ref().map_or(0, |w| w.len());
        let end = end.min(len);
        self.begin = begin.min(end.saturating_sub(1));
        self.end = end.max(self.begin);
    }
}

/// Parameters of a MIDI channel
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MidiParams {
    pub output_enabled: bool,
    /// MIDI channel (0-15) outgoing events are re-addressed to
    pub output_filter: u8,
}

/// What kind of channel this is, with its per-kind parameters
#[derive(Clone)]
pub enum ChannelKind {
    Sample(SampleParams),
    Preview(SampleParams),
    Midi(MidiParams),
    MasterIn,
    MasterOut,
}

impl ChannelKind {
    pub fn name(&self) -> &'static str {
        match self {
            ChannelKind::Sample(_) => "sample",
            ChannelKind::Preview(_) => "preview",
            ChannelKind::Midi(_) => "midi",
            ChannelKind::MasterIn => "master-in",
            ChannelKind::MasterOut => "master-out",
        }
    }
}

/// A channel as seen by one Document version
#[derive(Clone)]
pub struct Channel {
    pub id: ChannelId,
    pub kind: ChannelKind,
    pub name: String,
    pub volume: f32,
    pub pan: f32,
    pub mute: bool,
    pub solo: bool,
    pub armed: bool,
    /// Keyboard key bound to this channel (0 = none)
    pub key: u32,
    pub has_actions: bool,
    pub plugins: Vec<Shared<Plugin>>,
    pub shared: Shared<ChannelShared>,
}

impl Channel {
    pub fn new(id: ChannelId, kind: ChannelKind, shared: Shared<ChannelShared>) -> Self {
        Self {
            id,
            name: String::new(),
            kind,
            volume: DEFAULT_VOLUME,
            pan: DEFAULT_PAN,
            mute: false,
            solo: false,
            armed: false,
            key: 0,
            has_actions: false,
            plugins: Vec::new(),
            shared,
        }
    }

    /// Master and preview channels
    pub fn is_internal(&self) -> bool {
        matches!(
            self.kind,
            ChannelKind::MasterIn | ChannelKind::MasterOut | ChannelKind::Preview(_)
        )
    }

    /// Internal channels cannot be muted
    pub fn is_muted(&self) -> bool {
        !self.is_internal() && self.mute
    }

    pub fn is_audible(&self, mixer_has_solos: bool) -> bool {
        if self.is_internal() {
            return true;
        }
        if self.is_muted() {
            return false;
        }
        !mixer_has_solos || self.solo
    }

    pub fn play_status(&self) -> ChannelStatus {
        self.shared.play_status()
    }

    pub fn is_playing(&self) -> bool {
        self.play_status().is_playing()
    }

    pub fn sample(&self) -> Option<&SampleParams> {
        match &self.kind {
            ChannelKind::Sample(p) | ChannelKind::Preview(p) => Some(p),
            _ => None,
        }
    }

    pub fn sample_mut(&mut self) -> Option<&mut SampleParams> {
        match &mut self.kind {
            ChannelKind::Sample(p) | ChannelKind::Preview(p) => Some(p),
            _ => None,
        }
    }

    pub fn midi(&self) -> Option<&MidiParams> {
        match &self.kind {
            ChannelKind::Midi(p) => Some(p),
            _ => None,
        }
    }

    pub fn midi_mut(&mut self) -> Option<&mut MidiParams> {
        match &mut self.kind {
            ChannelKind::Midi(p) => Some(p),
            _ => None,
        }
    }

    pub fn has_wave(&self) -> bool {
        self.sample().is_some_and(|p| p.has_wave())
    }

    pub fn is_any_loop_mode(&self) -> bool {
        self.sample().is_some_and(|p| p.mode.is_loop())
    }

    /// Loop channels play on their own; only one-shot modes take actions
    pub fn can_action_rec(&self) -> bool {
        matches!(self.kind, ChannelKind::Sample(_)) && self.has_wave() && !self.is_any_loop_mode()
    }

    /// Armed sample channel whose wave may be overwritten
    pub fn can_input_rec(&self) -> bool {
        match &self.kind {
            ChannelKind::Sample(p) => self.armed && (!p.has_wave() || !p.overdub_protection),
            _ => false,
        }
    }
}

// ────────────────────────────────────────────────────────────────
// Document
// ────────────────────────────────────────────────────────────────

/// One immutable version of the engine state
#[derive(Clone)]
pub struct Document {
    /// While set, the renderer outputs silence and touches no channel
    pub locked: bool,
    pub sample_rate: u32,
    pub buffer_size: usize,
    pub sequencer: SequencerState,
    pub mixer: MixerState,
    pub behaviors: Behaviors,
    pub channels: Vec<Channel>,
    pub actions: Shared<Actions>,
}

impl Document {
    pub fn new(sample_rate: u32, buffer_size: usize) -> Self {
        Self {
            locked: false,
            sample_rate,
            buffer_size,
            sequencer: SequencerState::new(sample_rate),
            mixer: MixerState::default(),
            behaviors: Behaviors::default(),
            channels: Vec::new(),
            actions: Shared::new(&gc_handle(), Actions::default()),
        }
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.id == id)
    }

    /// Refresh `mixer.has_solos` after a solo change
    pub fn update_solos(&mut self) {
        self.mixer.has_solos = self.channels.iter().any(|c| !c.is_internal() && c.solo);
    }

    /// Replace the recorded actions
    pub fn set_actions(&mut self, actions: Actions) {
        self.actions = Shared::new(&gc_handle(), actions);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::shared::ChannelShared;

    fn state() -> SequencerState {
        let mut s = SequencerState::new(48000);
        s.set_bpm(120.0, 48000);
        s
    }

    #[test]
    fn test_frame_counts() {
        let mut s = state();
        s.set_beats(4, 1, 48000);
        assert_eq!(s.frames_in_beat, 24000);
        assert_eq!(s.frames_in_bar, 24000);
        assert_eq!(s.frames_in_loop, 96000);
        assert_eq!(s.frames_in_seq, 24000 * 32);
    }

    #[test]
    fn test_clamping() {
        let mut s = state();
        s.set_bpm(5.0, 48000);
        assert_eq!(s.bpm, MIN_BPM);
        s.set_bpm(5000.0, 48000);
        assert_eq!(s.bpm, MAX_BPM);

        s.set_beats(64, 80, 48000);
        assert_eq!((s.beats, s.bars), (32, 32));
        s.set_beats(0, 0, 48000);
        assert_eq!((s.beats, s.bars), (1, 1));
        s.set_beats(4, 9, 48000);
        assert_eq!((s.beats, s.bars), (4, 4));

        s.set_quantize(100);
        assert_eq!(s.quantize, MAX_QUANTIZE);
    }

    #[test]
    fn test_quantize_identity_when_stopped() {
        let mut s = state();
        s.set_quantize(4);
        assert_eq!(s.quantize(12345), 12345);
    }

    #[test]
    fn test_quantize_snaps_and_is_idempotent() {
        let mut s = state();
        s.set_quantize(4);
        s.status = SeqStatus::Running;
        assert_eq!(s.quantizer_step(), 6000);
        assert_eq!(s.quantizer_grid(), Grid { step: 6000, period: 24000 });
        assert_eq!(s.quantize(6100), 6000);
        assert_eq!(s.quantize(8999), 6000);
        assert_eq!(s.quantize(9001), 12000);
        // wraps at the loop end
        assert_eq!(s.quantize(95999), 0);

        for frame in (0..96000).step_by(777) {
            let once = s.quantize(frame);
            assert_eq!(s.quantize(once), once);
        }
    }

    #[test]
    fn test_audibility() {
        let shared = Shared::new(&gc_handle(), ChannelShared::new(ChannelId(10), false));
        let mut ch = Channel::new(ChannelId(10), ChannelKind::Midi(MidiParams::default()), shared);
        assert!(ch.is_audible(false));
        assert!(!ch.is_audible(true));
        ch.solo = true;
        assert!(ch.is_audible(true));
        ch.mute = true;
        assert!(!ch.is_audible(false));

        let shared = Shared::new(&gc_handle(), ChannelShared::new(ChannelId::MASTER_OUT, false));
        let mut master = Channel::new(ChannelId::MASTER_OUT, ChannelKind::MasterOut, shared);
        master.mute = true;
        assert!(master.is_audible(true));
    }
}
