//! Control-thread engine facade
//!
//! [`Engine`] owns the writer side of the model and the producer side of the
//! real-time command queue. Every operation mutates the working Document and
//! publishes it; structural edits that touch shared real-time objects run
//! under the model's data lock. The paired [`Renderer`] goes to the audio
//! callback.
//!
//! # Usage
//!
//! ```ignore
//! let (mut engine, mut renderer) = Engine::new(EngineConfig::default());
//! std::thread::spawn(move || loop { renderer.render(&mut out, &input) });
//!
//! let ch = engine.add_channel(NewChannel::Sample);
//! engine.load_wave(ch, Path::new("kick.wav"), &mut decoder)?;
//! engine.key_press(ch, 127)?;
//! ```

use std::path::Path;

use log::{debug, info, warn};

use crate::channel;
use crate::command::{command_channel, EngineCommand};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::midi::{MidiEvent, MidiOutput, NullMidiOutput};
use crate::model::{
    Behaviors, Channel, ChannelKind, ChannelShared, ChannelStatus, Document, InputRecMode, MidiParams, Model, Peak,
    PlayerState, RecTriggerMode, SampleParams, SamplePlayerMode, SeqStatus, SwapType,
};
use crate::plugin::{NullPluginHost, Plugin, PluginHost};
use crate::project::{LoadReport, Project};
use crate::recorder::Recorder;
use crate::renderer::Renderer;
use crate::sync::{ClockSync, InternalTransport, NoClockSync, TransportSync};
use crate::types::{
    frames_to_bpm, ChannelId, Frame, IdGenerator, PluginId, WaveId, MAX_BUFFER_SIZE, MAX_PITCH, MAX_VOLUME, MIN_PITCH,
    MIN_REC_TRIGGER_LEVEL,
};
use crate::wave::{overdub, Wave, WaveLoader};

/// Kind of a user channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewChannel {
    Sample,
    Midi,
}

/// External collaborators plugged into the engine
pub struct Collaborators {
    pub transport: Box<dyn TransportSync>,
    pub clock: Box<dyn ClockSync>,
    pub plugin_host: Box<dyn PluginHost>,
    pub midi_output: Box<dyn MidiOutput>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            transport: Box::new(InternalTransport),
            clock: Box::new(NoClockSync),
            plugin_host: Box::new(NullPluginHost),
            midi_output: Box::new(NullMidiOutput),
        }
    }
}

/// Id generators for the three registries
pub(crate) struct Ids {
    pub channels: IdGenerator,
    pub waves: IdGenerator,
    pub plugins: IdGenerator,
}

impl Ids {
    fn new() -> Self {
        Self {
            channels: IdGenerator::new(ChannelId::FIRST_USER),
            waves: IdGenerator::new(1),
            plugins: IdGenerator::new(1),
        }
    }
}

/// Control half of the engine
pub struct Engine {
    config: EngineConfig,
    model: Model,
    commands: rtrb::Producer<EngineCommand>,
    transport: Box<dyn TransportSync>,
    recorder: Recorder,
    ids: Ids,
}

impl Engine {
    /// Engine with no external collaborators
    pub fn new(config: EngineConfig) -> (Engine, Renderer) {
        Self::with_collaborators(config, Collaborators::default())
    }

    pub fn with_collaborators(config: EngineConfig, collaborators: Collaborators) -> (Engine, Renderer) {
        let config = config.sanitized();
        let model = Model::new(config.sample_rate, config.buffer_size);
        let (tx, rx) = command_channel();

        let renderer = Renderer::new(
            model.reader(),
            rx,
            config.sample_rate,
            collaborators.clock,
            collaborators.plugin_host,
            collaborators.midi_output,
        );

        let mut engine = Engine {
            config,
            model,
            commands: tx,
            transport: collaborators.transport,
            recorder: Recorder::new(),
            ids: Ids::new(),
        };
        engine.apply_config();
        info!(
            "Engine created: {} Hz, {} frames per block",
            engine.config.sample_rate, engine.config.buffer_size
        );
        (engine, renderer)
    }

    fn apply_config(&mut self) {
        let config = self.config.clone();
        let doc = self.model.get_mut();
        doc.behaviors = config.behaviors;
        doc.sequencer.set_bpm(config.bpm, config.sample_rate);
        doc.sequencer.metronome = config.metronome;
        doc.mixer.in_to_out = config.in_to_out;
        doc.mixer.rec_trigger_mode = config.rec_trigger_mode;
        doc.mixer.input_rec_mode = config.input_rec_mode;
        doc.mixer.rec_trigger_level = config.rec_trigger_level;
        self.model.swap(SwapType::Hard);
    }

    // ── Queries ─────────────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The working Document (what the audio thread sees after the last swap)
    pub fn document(&self) -> &Document {
        self.model.get()
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn channel(&self, id: ChannelId) -> EngineResult<&Channel> {
        self.model.get().channel(id).ok_or(EngineError::ChannelNotFound(id))
    }

    pub fn status(&self) -> SeqStatus {
        self.model.get().sequencer.status
    }

    pub fn is_running(&self) -> bool {
        self.model.get().sequencer.is_running()
    }

    pub fn current_frame(&self) -> Frame {
        self.model.get().sequencer.current_frame()
    }

    pub fn current_beat(&self) -> u32 {
        self.model.get().sequencer.current_beat()
    }

    pub fn peak_out(&self) -> Peak {
        self.model.get().mixer.shared.peak_out()
    }

    pub fn peak_in(&self) -> Peak {
        self.model.get().mixer.shared.peak_in()
    }

    pub fn is_recording_input(&self) -> bool {
        self.model.get().mixer.recording_input
    }

    /// Frames captured by the current input take
    pub fn input_rec_frames(&self) -> Frame {
        self.model.get().mixer.shared.input.captured()
    }

    pub fn is_recording_actions(&self) -> bool {
        self.model.get().mixer.recording_actions
    }

    /// Listener called after every publish (e.g. to refresh a UI)
    pub fn set_on_swap(&mut self, listener: impl FnMut(SwapType) + Send + 'static) {
        self.model.set_on_swap(listener);
    }

    fn push_command(&mut self, command: EngineCommand) -> EngineResult<()> {
        self.commands.push(command).map_err(|_| {
            warn!("Command queue full, dropping {:?}", command);
            EngineError::QueueFull
        })
    }

    // ── Transport ───────────────────────────────────────────────

    pub fn start(&mut self) {
        if self.transport.start() {
            debug!("Start handled by external transport");
            return;
        }
        let doc = self.model.get_mut();
        match doc.sequencer.status {
            SeqStatus::Running => return,
            SeqStatus::Waiting if doc.mixer.recording_input => {
                doc.mixer.shared.input.set_signalled();
                self.recorder.start_input_on_signal(doc);
            }
            SeqStatus::Waiting => {
                self.recorder.start_on_signal(doc);
            }
            SeqStatus::Stopped => doc.sequencer.status = SeqStatus::Running,
        }
        debug!("Sequencer started");
        self.model.swap(SwapType::Soft);
    }

    pub fn stop(&mut self) {
        if self.transport.stop() {
            debug!("Stop handled by external transport");
            return;
        }
        if self.is_recording_input() {
            self.stop_input_rec();
        }
        let doc = self.model.get_mut();
        if doc.sequencer.status == SeqStatus::Stopped {
            return;
        }
        self.recorder.stop(doc);
        doc.sequencer.status = SeqStatus::Stopped;

        let stop_on_halt = doc.behaviors.chans_stop_on_seq_halt;
        for ch in &doc.channels {
            channel::stop_by_seq(ch, stop_on_halt);
        }
        debug!("Sequencer stopped");
        self.model.swap(SwapType::Soft);
    }

    pub fn toggle_sequencer(&mut self) {
        if self.is_running() {
            self.stop();
        } else {
            self.start();
        }
    }

    /// Back to frame 0, on the next quantize boundary when quantizing
    pub fn rewind(&mut self) -> EngineResult<()> {
        if self.transport.set_position(0) {
            return Ok(());
        }
        self.push_command(EngineCommand::Rewind)
    }

    /// Jump to the start of a beat inside the loop
    pub fn go_to_beat(&mut self, beat: u32) -> EngineResult<()> {
        let seq = &self.model.get().sequencer;
        let frame = (beat % seq.beats.max(1)) as Frame * seq.frames_in_beat;
        if self.transport.set_position(frame) {
            return Ok(());
        }
        self.push_command(EngineCommand::SetFrame { frame })
    }

    /// Change tempo; recorded actions are moved to keep their musical position
    pub fn set_bpm(&mut self, bpm: f32) {
        if self.transport.set_bpm(bpm) {
            debug!("Tempo handled by external transport");
            return;
        }
        let new = retime(self.model.get_mut(), bpm);
        info!("Tempo set to {} bpm", new);
        self.model.swap(SwapType::Soft);
    }

    pub fn set_beats(&mut self, beats: u32, bars: u32) {
        let doc = self.model.get_mut();
        doc.sequencer.set_beats(beats, bars, doc.sample_rate);
        debug!("Grid set to {} beats, {} bars", doc.sequencer.beats, doc.sequencer.bars);
        self.model.swap(SwapType::Soft);
    }

    pub fn set_quantize(&mut self, quantize: u32) {
        self.model.get_mut().sequencer.set_quantize(quantize);
        self.model.swap(SwapType::Soft);
    }

    pub fn set_metronome(&mut self, on: bool) {
        self.model.get_mut().sequencer.metronome = on;
        self.model.swap(SwapType::Soft);
    }

    pub fn toggle_metronome(&mut self) {
        let on = self.model.get().sequencer.metronome;
        self.set_metronome(!on);
    }

    // ── Channels ────────────────────────────────────────────────

    pub fn add_channel(&mut self, kind: NewChannel) -> ChannelId {
        let id = ChannelId(self.ids.channels.generate());
        let buffer_size = self.model.get().buffer_size;
        let (channel_kind, with_quantizer) = match kind {
            NewChannel::Sample => (ChannelKind::Sample(SampleParams::default()), true),
            NewChannel::Midi => (ChannelKind::Midi(MidiParams::default()), false),
        };

        let shared = self
            .model
            .add_channel_shared(ChannelShared::with_buffer_size(id, with_quantizer, buffer_size));
        let mut channel = Channel::new(id, channel_kind, shared);
        channel.name = format!("{} {}", channel.kind.name(), id);
        self.model.get_mut().channels.push(channel);

        info!("Added {:?} channel {}", kind, id);
        self.model.swap(SwapType::Hard);
        id
    }

    /// Delete a user channel with its actions, plugins and wave
    pub fn remove_channel(&mut self, id: ChannelId) -> EngineResult<()> {
        let channel = self.channel(id)?;
        if channel.is_internal() {
            return Err(EngineError::InternalChannel(id));
        }
        let wave_id = channel.sample().and_then(|p| p.wave.as_ref()).map(|w| w.id);
        let plugin_ids: Vec<PluginId> = channel.plugins.iter().map(|p| p.id).collect();

        let mut lock = self.model.lock_data(SwapType::Hard);
        let doc = lock.get_mut();
        doc.channels.retain(|c| c.id != id);
        if doc.actions.has_actions(id) {
            let mut actions = (*doc.actions).clone();
            actions.clear_channel(id);
            doc.set_actions(actions);
        }
        lock.remove_channel_shared(id);
        if let Some(wave_id) = wave_id {
            lock.remove_wave(wave_id);
        }
        for plugin_id in plugin_ids {
            lock.remove_plugin(plugin_id);
        }
        drop(lock);

        self.recorder.forget(id);
        info!("Removed channel {}", id);
        Ok(())
    }

    fn edit_channel<R>(
        &mut self,
        id: ChannelId,
        swap_type: SwapType,
        edit: impl FnOnce(&mut Channel) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let channel = self
            .model
            .get_mut()
            .channel_mut(id)
            .ok_or(EngineError::ChannelNotFound(id))?;
        let result = edit(channel)?;
        self.model.swap(swap_type);
        Ok(result)
    }

    fn edit_sample<R>(&mut self, id: ChannelId, edit: impl FnOnce(&mut SampleParams) -> R) -> EngineResult<R> {
        self.edit_channel(id, SwapType::Soft, |channel| {
            channel
                .sample_mut()
                .map(edit)
                .ok_or(EngineError::WrongChannelKind { id, expected: "sample" })
        })
    }

    fn edit_midi<R>(&mut self, id: ChannelId, edit: impl FnOnce(&mut MidiParams) -> R) -> EngineResult<R> {
        self.edit_channel(id, SwapType::Soft, |channel| {
            channel
                .midi_mut()
                .map(edit)
                .ok_or(EngineError::WrongChannelKind { id, expected: "midi" })
        })
    }

    pub fn set_name(&mut self, id: ChannelId, name: impl Into<String>) -> EngineResult<()> {
        let name = name.into();
        self.edit_channel(id, SwapType::Soft, |c| {
            c.name = name;
            Ok(())
        })
    }

    /// Bind a keyboard key (0 unbinds)
    pub fn set_key(&mut self, id: ChannelId, key: u32) -> EngineResult<()> {
        self.edit_channel(id, SwapType::None, |c| {
            c.key = key;
            Ok(())
        })
    }

    pub fn set_volume(&mut self, id: ChannelId, volume: f32) -> EngineResult<()> {
        self.edit_channel(id, SwapType::None, |c| {
            c.volume = volume.clamp(0.0, MAX_VOLUME);
            Ok(())
        })
    }

    pub fn set_pan(&mut self, id: ChannelId, pan: f32) -> EngineResult<()> {
        self.edit_channel(id, SwapType::None, |c| {
            c.pan = pan.clamp(0.0, 1.0);
            Ok(())
        })
    }

    pub fn set_mute(&mut self, id: ChannelId, mute: bool) -> EngineResult<()> {
        self.edit_channel(id, SwapType::Soft, |c| {
            c.mute = mute;
            Ok(())
        })
    }

    pub fn set_solo(&mut self, id: ChannelId, solo: bool) -> EngineResult<()> {
        self.model
            .get_mut()
            .channel_mut(id)
            .ok_or(EngineError::ChannelNotFound(id))?
            .solo = solo;
        self.model.get_mut().update_solos();
        self.model.swap(SwapType::Soft);
        Ok(())
    }

    pub fn set_armed(&mut self, id: ChannelId, armed: bool) -> EngineResult<()> {
        self.edit_channel(id, SwapType::Soft, |c| {
            c.armed = armed;
            Ok(())
        })
    }

    pub fn set_sample_mode(&mut self, id: ChannelId, mode: SamplePlayerMode) -> EngineResult<()> {
        self.edit_sample(id, |p| p.mode = mode)
    }

    pub fn set_pitch(&mut self, id: ChannelId, pitch: f32) -> EngineResult<()> {
        self.edit_sample(id, |p| p.pitch = pitch.clamp(MIN_PITCH, MAX_PITCH))
    }

    /// Trim points, kept inside the wave
    pub fn set_trims(&mut self, id: ChannelId, begin: Frame, end: Frame) -> EngineResult<()> {
        self.edit_sample(id, |p| {
            p.set_trims(begin, end);
            if p.begin + p.shift >= p.end {
                p.shift = 0;
            }
        })
    }

    /// Restart offset from the begin trim
    pub fn set_shift(&mut self, id: ChannelId, shift: Frame) -> EngineResult<()> {
        self.edit_sample(id, |p| p.shift = if p.begin + shift < p.end { shift } else { 0 })
    }

    pub fn set_input_monitor(&mut self, id: ChannelId, on: bool) -> EngineResult<()> {
        self.edit_sample(id, |p| p.input_monitor = on)
    }

    pub fn set_overdub_protection(&mut self, id: ChannelId, on: bool) -> EngineResult<()> {
        self.edit_sample(id, |p| p.overdub_protection = on)
    }

    pub fn set_velocity_as_volume(&mut self, id: ChannelId, on: bool) -> EngineResult<()> {
        let shared = self.channel(id)?.shared.clone();
        self.edit_sample(id, |p| p.velocity_as_volume = on)?;
        if !on {
            shared.set_volume_i(1.0);
        }
        Ok(())
    }

    /// Enable MIDI output of a MIDI channel on the given MIDI channel (0-15)
    pub fn set_midi_output(&mut self, id: ChannelId, enabled: bool, filter: u8) -> EngineResult<()> {
        self.edit_midi(id, |p| {
            p.output_enabled = enabled;
            p.output_filter = filter.min(15);
        })
    }

    // ── Waves ───────────────────────────────────────────────────

    /// Decode `path` with `loader` and attach it to a sample or preview channel
    ///
    /// The channel is stopped and its previous wave released.
    pub fn load_wave(&mut self, id: ChannelId, path: &Path, loader: &mut impl WaveLoader) -> EngineResult<WaveId> {
        if self.channel(id)?.sample().is_none() {
            return Err(EngineError::WrongChannelKind { id, expected: "sample" });
        }
        let wave_id = WaveId(self.ids.waves.generate());
        let wave = loader.load(wave_id, path).ok_or_else(|| {
            warn!("Cannot load wave {:?}", path);
            EngineError::WaveUnreadable(path.to_path_buf())
        })?;
        if wave.sample_rate != self.config.sample_rate {
            warn!(
                "Wave {:?} is {} Hz, engine runs at {} Hz",
                path, wave.sample_rate, self.config.sample_rate
            );
        }
        self.attach_wave(id, Some(wave))?;
        info!("Loaded {:?} into channel {}", path, id);
        Ok(wave_id)
    }

    /// Detach and release the wave of a sample channel
    pub fn free_wave(&mut self, id: ChannelId) -> EngineResult<()> {
        if self.channel(id)?.sample().is_none() {
            return Err(EngineError::WrongChannelKind { id, expected: "sample" });
        }
        self.attach_wave(id, None)
    }

    fn attach_wave(&mut self, id: ChannelId, wave: Option<crate::wave::Wave>) -> EngineResult<()> {
        let mut lock = self.model.lock_data(SwapType::Hard);
        let wave = wave.map(|w| lock.add_wave(w));

        let channel = lock
            .get_mut()
            .channel_mut(id)
            .ok_or(EngineError::ChannelNotFound(id))?;
        let old = channel.sample().and_then(|p| p.wave.as_ref()).map(|w| w.id);
        if let Some(params) = channel.sample_mut() {
            params.set_wave(wave);
        }

        let shared = channel.shared.clone();
        shared.set_play_status(ChannelStatus::Off);
        shared.set_tracker(0);
        if let Some(quantizer) = shared.quantizer() {
            quantizer.clear();
        }
        while shared.pop_render().is_some() {}
        // SAFETY: the data lock is held, the audio thread is not rendering
        unsafe {
            shared.rt().player = Default::default();
        }

        if let Some(old) = old {
            lock.remove_wave(old);
        }
        Ok(())
    }

    // ── Plugins ─────────────────────────────────────────────────

    /// Append a plugin to a channel's stack (master channels included)
    pub fn add_plugin(&mut self, id: ChannelId, path: &str, name: &str) -> EngineResult<PluginId> {
        self.channel(id)?;
        let plugin_id = PluginId(self.ids.plugins.generate());
        let plugin = self.model.add_plugin(Plugin::new(plugin_id, path, name));
        self.edit_channel(id, SwapType::Hard, |c| {
            c.plugins.push(plugin);
            Ok(())
        })?;
        info!("Added plugin {} to channel {}", name, id);
        Ok(plugin_id)
    }

    pub fn remove_plugin(&mut self, id: ChannelId, plugin_id: PluginId) -> EngineResult<()> {
        let channel = self.channel(id)?;
        if !channel.plugins.iter().any(|p| p.id == plugin_id) {
            return Err(EngineError::PluginNotFound(plugin_id));
        }

        let mut lock = self.model.lock_data(SwapType::Hard);
        if let Some(channel) = lock.get_mut().channel_mut(id) {
            channel.plugins.retain(|p| p.id != plugin_id);
        }
        lock.remove_plugin(plugin_id);
        drop(lock);

        debug!("Removed plugin {:?} from channel {}", plugin_id, id);
        Ok(())
    }

    pub fn set_plugin_bypass(&mut self, plugin_id: PluginId, bypass: bool) -> EngineResult<()> {
        let plugin = self
            .model
            .find_plugin(plugin_id)
            .ok_or(EngineError::PluginNotFound(plugin_id))?;
        plugin.set_bypass(bypass);
        Ok(())
    }

    // ── Live input ──────────────────────────────────────────────

    /// Key (or note on) pressed on a channel
    pub fn key_press(&mut self, id: ChannelId, velocity: u8) -> EngineResult<()> {
        let records = self.channel(id)?.can_action_rec();

        let doc = self.model.get_mut();
        if records && doc.mixer.rec_trigger_mode == RecTriggerMode::Signal && self.recorder.start_on_signal(doc) {
            info!("Action rec started by channel {}", id);
            self.model.swap(SwapType::Soft);
        }

        let doc = self.model.get();
        if let Some(ch) = doc.channel(id) {
            channel::key_press(ch, velocity, doc.sequencer.can_quantize());
        }

        if records {
            self.record(id, MidiEvent::note_on(0, velocity.max(1)));
        }
        Ok(())
    }

    pub fn key_release(&mut self, id: ChannelId) -> EngineResult<()> {
        let ch = self.channel(id)?;
        channel::key_release(ch);
        if ch.sample().is_some_and(|p| p.mode == SamplePlayerMode::SinglePress) {
            self.record(id, MidiEvent::note_off(0, 0));
        }
        Ok(())
    }

    /// Stop a channel right away
    pub fn key_kill(&mut self, id: ChannelId) -> EngineResult<()> {
        let ch = self.channel(id)?;
        let records = ch.can_action_rec();
        channel::key_kill(ch);
        if records {
            self.record(id, MidiEvent::all_notes_off());
        }
        Ok(())
    }

    /// Live MIDI for a MIDI channel: played through its plugins, recorded when armed
    pub fn send_midi_to_channel(&mut self, id: ChannelId, event: MidiEvent) -> EngineResult<()> {
        let ch = self.channel(id)?;
        if ch.midi().is_none() {
            return Err(EngineError::WrongChannelKind { id, expected: "midi" });
        }
        channel::receive_live_midi(ch, event);
        self.record(id, event);
        Ok(())
    }

    fn record(&mut self, id: ChannelId, event: MidiEvent) {
        if self.recorder.record(self.model.get_mut(), id, event) {
            self.model.swap(SwapType::None);
        }
    }

    // ── Action recording ────────────────────────────────────────

    pub fn prepare_action_rec(&mut self) {
        let mode = self.model.get().mixer.rec_trigger_mode;
        self.recorder.prepare(self.model.get_mut(), mode);
        self.model.swap(SwapType::Soft);
    }

    pub fn stop_action_rec(&mut self) {
        let consolidated = self.recorder.stop(self.model.get_mut());
        if !consolidated.is_empty() {
            info!("Channels now reading actions: {:?}", consolidated);
        }
        self.model.swap(SwapType::Soft);
    }

    pub fn toggle_action_rec(&mut self) {
        self.recorder.toggle(self.model.get_mut());
        self.model.swap(SwapType::Soft);
    }

    /// Signal mode can only be chosen while the transport is stopped
    pub fn set_rec_trigger_mode(&mut self, mode: RecTriggerMode) {
        let doc = self.model.get_mut();
        doc.mixer.rec_trigger_mode = if doc.sequencer.is_running() {
            RecTriggerMode::Normal
        } else {
            mode
        };
        self.model.swap(SwapType::Soft);
    }

    // ── Input recording ─────────────────────────────────────────

    /// Arm an input take on every armed sample channel
    ///
    /// Returns `false` when no channel can take it or a take is already
    /// running. Free takes rewind the transport first.
    pub fn prepare_input_rec(&mut self) -> bool {
        let doc = self.model.get();
        if doc.mixer.recording_input {
            return false;
        }
        if !Recorder::has_input_recordable_channels(doc) {
            debug!("Input rec: no armed channel");
            return false;
        }
        let trigger = doc.mixer.rec_trigger_mode;
        if doc.mixer.input_rec_mode == InputRecMode::Free && self.push_command(EngineCommand::RewindNow).is_err() {
            warn!("Input rec: transport rewind dropped");
        }

        let mut lock = self.model.lock_data(SwapType::Soft);
        let frames = Recorder::input_rec_frames(lock.get());
        // SAFETY: the data lock is held, the audio thread is not rendering
        unsafe { lock.get().mixer.shared.input.arm(frames) };
        self.recorder.prepare_input(lock.get_mut(), trigger);
        true
    }

    /// End the input take and load it into the channels that were armed
    ///
    /// Channels with audio get the take layered over it and every channel
    /// ends up looping from the current position. A free take also sets the
    /// tempo so the loop spans the take. Returns the channels that got audio.
    pub fn stop_input_rec(&mut self) -> Vec<ChannelId> {
        let mut lock = self.model.lock_data(SwapType::Hard);
        let has_audio = self.recorder.stop_input(lock.get_mut());

        let capture = lock.get().mixer.shared.clone();
        // SAFETY: the data lock is held, the audio thread is not rendering
        let (mut audio, captured) = unsafe { capture.input.take() };
        if !has_audio {
            return Vec::new();
        }

        let doc = lock.get_mut();
        let mode = doc.mixer.input_rec_mode;
        let frames = match mode {
            InputRecMode::Rigid => doc.sequencer.frames_in_loop.min(audio.len()),
            InputRecMode::Free => captured,
        };
        audio.set_len_from_capacity(frames);

        let tracker = match mode {
            InputRecMode::Rigid => doc.sequencer.current_frame() % frames.max(1),
            InputRecMode::Free => {
                let beats = doc.sequencer.beats.max(1) as Frame;
                let fitted = frames_to_bpm(frames / beats, doc.sample_rate);
                let bpm = retime(doc, fitted);
                if self.commands.push(EngineCommand::RewindNow).is_err() {
                    warn!("Input rec: transport rewind dropped");
                }
                info!("Tempo fitted to the take: {} bpm", bpm);
                0
            }
        };

        let sample_rate = doc.sample_rate;
        let ids: Vec<ChannelId> = doc.channels.iter().filter(|c| c.can_input_rec()).map(|c| c.id).collect();
        for &id in &ids {
            let old = lock.get().channel(id).and_then(|c| c.sample()).and_then(|p| p.wave.clone());
            let buffer = match &old {
                Some(wave) => overdub(wave.buffer(), &audio),
                None => audio.clone(),
            };
            let wave_id = WaveId(self.ids.waves.generate());
            let wave = lock.add_wave(Wave::new(wave_id, format!("TAKE-{}.wav", wave_id.0), sample_rate, buffer));

            let Some(channel) = lock.get_mut().channel_mut(id) else {
                continue;
            };
            if let Some(params) = channel.sample_mut() {
                params.set_wave(Some(wave));
                if !params.mode.is_loop() {
                    params.mode = SamplePlayerMode::LoopBasic;
                }
            }

            let shared = channel.shared.clone();
            if let Some(quantizer) = shared.quantizer() {
                quantizer.clear();
            }
            while shared.pop_render().is_some() {}
            shared.set_tracker(tracker);
            // SAFETY: the data lock is held, the audio thread is not rendering
            unsafe {
                shared.rt().player = PlayerState { active: true, frac: 0.0 };
            }
            shared.set_play_status(ChannelStatus::Play);

            if let Some(old) = old {
                lock.remove_wave(old.id);
            }
        }
        drop(lock);

        info!("Input take of {} frames loaded into {:?}", frames, ids);
        ids
    }

    pub fn toggle_input_rec(&mut self) {
        if self.is_recording_input() {
            self.stop_input_rec();
        } else {
            self.prepare_input_rec();
        }
    }

    /// Free takes are only allowed while no sample channel holds audio
    pub fn set_input_rec_mode(&mut self, mode: InputRecMode) {
        let doc = self.model.get_mut();
        if doc.mixer.recording_input {
            debug!("Input rec mode kept while recording");
            return;
        }
        doc.mixer.input_rec_mode = if mode == InputRecMode::Free && !Recorder::can_enable_free_input_rec(doc) {
            InputRecMode::Rigid
        } else {
            mode
        };
        self.model.swap(SwapType::Soft);
    }

    /// Trigger level in dBFS for signal-triggered takes
    pub fn set_rec_trigger_level(&mut self, level: f32) {
        self.model.get_mut().mixer.rec_trigger_level = level.clamp(MIN_REC_TRIGGER_LEVEL, 0.0);
        self.model.swap(SwapType::None);
    }

    /// Pick up what the audio thread decided on its own
    ///
    /// Call regularly from the control loop. Returns `true` when a
    /// signal-triggered input take has just started.
    pub fn poll(&mut self) -> bool {
        if !self.recorder.start_input_on_signal(self.model.get_mut()) {
            return false;
        }
        info!("Input rec started by signal");
        self.model.swap(SwapType::Soft);
        true
    }

    /// Start or stop following recorded actions
    ///
    /// With `treat_recs_as_loops` and a running transport the change waits
    /// for the next first beat.
    pub fn toggle_read_actions(&mut self, id: ChannelId) -> EngineResult<()> {
        let doc = self.model.get();
        let deferred = doc.behaviors.treat_recs_as_loops && doc.sequencer.is_running();
        let ch = doc.channel(id).ok_or(EngineError::ChannelNotFound(id))?;
        if !ch.has_actions {
            return Ok(());
        }

        let shared = &ch.shared;
        if deferred {
            let status = match shared.rec_status() {
                ChannelStatus::Off => ChannelStatus::Wait,
                ChannelStatus::Wait => ChannelStatus::Off,
                ChannelStatus::Play => ChannelStatus::Ending,
                ChannelStatus::Ending => ChannelStatus::Play,
            };
            shared.set_rec_status(status);
        } else if shared.read_actions() {
            shared.set_read_actions(false);
            shared.set_rec_status(ChannelStatus::Off);
        } else {
            shared.set_read_actions(true);
            shared.set_rec_status(ChannelStatus::Play);
        }
        self.model.swap(SwapType::Soft);
        Ok(())
    }

    /// Delete a channel's recorded actions
    pub fn clear_actions(&mut self, id: ChannelId) -> EngineResult<()> {
        let doc = self.model.get_mut();
        let ch = doc.channel_mut(id).ok_or(EngineError::ChannelNotFound(id))?;
        ch.has_actions = false;
        ch.shared.set_read_actions(false);
        ch.shared.set_rec_status(ChannelStatus::Off);

        let mut actions = (*doc.actions).clone();
        actions.clear_channel(id);
        doc.set_actions(actions);

        self.recorder.forget(id);
        self.model.swap(SwapType::Soft);
        Ok(())
    }

    // ── Mixer and settings ──────────────────────────────────────

    pub fn set_in_to_out(&mut self, on: bool) {
        self.model.get_mut().mixer.in_to_out = on;
        self.model.swap(SwapType::Soft);
    }

    pub fn set_behaviors(&mut self, behaviors: Behaviors) {
        self.config.behaviors = behaviors;
        self.model.get_mut().behaviors = behaviors;
        self.model.swap(SwapType::None);
    }

    /// Change the expected block size; channel buffers are resized under lock
    pub fn set_buffer_size(&mut self, size: usize) -> EngineResult<()> {
        if size == 0 || size > MAX_BUFFER_SIZE {
            return Err(EngineError::InvalidBufferSize {
                size,
                max: MAX_BUFFER_SIZE,
            });
        }
        let mut lock = self.model.lock_data(SwapType::Hard);
        lock.get_mut().buffer_size = size;
        for shared in lock.channels_shared() {
            // SAFETY: the data lock is held, the audio thread is not rendering
            unsafe { shared.rt().audio.set_len_from_capacity(size) };
        }
        drop(lock);

        self.config.buffer_size = size;
        info!("Buffer size set to {}", size);
        Ok(())
    }

    /// Back to an empty session with only the internal channels
    pub fn reset(&mut self) {
        self.model.reset();
        self.recorder = Recorder::new();
        self.ids = Ids::new();
        self.apply_config();
        if self.push_command(EngineCommand::RewindNow).is_err() {
            warn!("Reset: transport rewind dropped");
        }
        info!("Engine reset");
    }

    // ── Projects ────────────────────────────────────────────────

    pub fn save_project(&self, path: &Path) -> EngineResult<()> {
        Project::capture(self.model.get()).write(path)?;
        info!("Project saved to {:?}", path);
        Ok(())
    }

    /// Replace the session with a saved project
    ///
    /// Waves the loader cannot decode are reported, their channels are
    /// created empty.
    pub fn load_project(&mut self, path: &Path, loader: &mut impl WaveLoader) -> EngineResult<LoadReport> {
        let project = Project::read(path)?;

        self.model.reset();
        self.recorder = Recorder::new();
        self.ids = Ids::new();

        let report = {
            let mut lock = self.model.lock_data(SwapType::Hard);
            project.restore(&mut lock, &mut self.ids, loader)
        };
        self.config.bpm = self.model.get().sequencer.bpm;
        if self.push_command(EngineCommand::RewindNow).is_err() {
            warn!("Load: transport rewind dropped");
        }

        if report.missing_waves.is_empty() {
            info!("Project loaded from {:?}", path);
        } else {
            warn!(
                "Project loaded from {:?}, {} wave(s) missing",
                path,
                report.missing_waves.len()
            );
        }
        Ok(report)
    }
}

/// Set the tempo and move recorded actions to keep their musical position
///
/// Returns the tempo actually applied.
fn retime(doc: &mut Document, bpm: f32) -> f32 {
    let old = doc.sequencer.bpm;
    doc.sequencer.set_bpm(bpm, doc.sample_rate);
    let new = doc.sequencer.bpm;

    if old != new && !doc.actions.is_empty() {
        let mut actions = (*doc.actions).clone();
        actions.rescale(old / new, 0);
        doc.set_actions(actions);
    }
    new
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Actions;
    use crate::types::{StereoBuffer, StereoSample};
    use std::sync::{Arc, Mutex};
    use crate::wave::Wave;

    const BLOCK: usize = 512;

    fn engine() -> (Engine, Renderer) {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = EngineConfig {
            sample_rate: 48000,
            buffer_size: BLOCK,
            ..EngineConfig::default()
        };
        Engine::new(config)
    }

    /// Loader producing a constant 0.5 wave of `len` frames for any path
    fn dc_loader(len: usize) -> impl FnMut(WaveId, &Path) -> Option<Wave> {
        move |id: WaveId, path: &Path| {
            Some(Wave::new(
                id,
                path,
                48000,
                StereoBuffer::from_vec(vec![StereoSample::mono(0.5); len]),
            ))
        }
    }

    fn render(renderer: &mut Renderer) -> StereoBuffer {
        let mut out = StereoBuffer::silence(BLOCK);
        renderer.render(&mut out, &StereoBuffer::silence(BLOCK));
        out
    }

    #[test]
    fn test_new_engine_has_internal_channels() {
        let (engine, _renderer) = engine();
        assert_eq!(engine.document().channels.len(), 3);
        assert_eq!(engine.status(), SeqStatus::Stopped);
        assert_eq!(engine.document().sequencer.frames_in_beat, 24000);
    }

    #[test]
    fn test_add_load_and_play() {
        let (mut engine, mut renderer) = engine();
        let ch = engine.add_channel(NewChannel::Sample);
        assert_eq!(ch, ChannelId(ChannelId::FIRST_USER));

        engine.load_wave(ch, Path::new("kick.wav"), &mut dc_loader(10_000)).unwrap();
        engine.key_press(ch, 127).unwrap();

        let out = render(&mut renderer);
        assert_eq!(out[0], StereoSample::mono(0.5));
        assert_eq!(engine.peak_out().left, 0.5);
        assert_eq!(engine.channel(ch).unwrap().play_status(), ChannelStatus::Play);
    }

    #[test]
    fn test_failed_load_reports_path() {
        let (mut engine, _renderer) = engine();
        let ch = engine.add_channel(NewChannel::Sample);
        let mut failing = |_: WaveId, _: &Path| -> Option<Wave> { None };
        let err = engine.load_wave(ch, Path::new("missing.wav"), &mut failing).unwrap_err();
        assert!(matches!(err, EngineError::WaveUnreadable(_)));

        let midi = engine.add_channel(NewChannel::Midi);
        let err = engine.load_wave(midi, Path::new("kick.wav"), &mut dc_loader(4)).unwrap_err();
        assert!(matches!(err, EngineError::WrongChannelKind { .. }));
    }

    #[test]
    fn test_remove_channel() {
        let (mut engine, _renderer) = engine();
        let ch = engine.add_channel(NewChannel::Sample);
        engine.load_wave(ch, Path::new("kick.wav"), &mut dc_loader(4)).unwrap();
        assert_eq!(engine.model().waves().len(), 1);

        engine.remove_channel(ch).unwrap();
        assert!(engine.channel(ch).is_err());
        assert!(engine.model().waves().is_empty());
        assert!(engine.model().find_channel_shared(ch).is_none());

        let err = engine.remove_channel(ChannelId::MASTER_OUT).unwrap_err();
        assert!(matches!(err, EngineError::InternalChannel(_)));
    }

    #[test]
    fn test_remove_plugin_runs_under_lock() {
        let (mut engine, _renderer) = engine();
        let ch = engine.add_channel(NewChannel::Sample);
        let plugin = engine.add_plugin(ch, "fx.clap", "Reverb").unwrap();

        // what the audio thread would see at every publish
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let reader = engine.model.reader();
        engine.model.set_on_swap(move |t| {
            let doc = reader.get_rt();
            let plugins = doc.channel(ch).map_or(0, |c| c.plugins.len());
            log.lock().unwrap().push((t, doc.locked, plugins));
        });

        engine.remove_plugin(ch, plugin).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(SwapType::None, true, 1), (SwapType::Hard, false, 0)]
        );
        assert!(engine.model().plugins().is_empty());
        assert!(engine.model().find_plugin(plugin).is_none());

        let err = engine.remove_plugin(ch, plugin).unwrap_err();
        assert!(matches!(err, EngineError::PluginNotFound(_)));
    }

    #[test]
    fn test_quantized_loop_starts_on_first_beat() {
        let (mut engine, mut renderer) = engine();
        let ch = engine.add_channel(NewChannel::Sample);
        engine.load_wave(ch, Path::new("loop.wav"), &mut dc_loader(96_000)).unwrap();
        engine.set_sample_mode(ch, SamplePlayerMode::LoopBasic).unwrap();

        engine.start();
        engine.go_to_beat(3).unwrap();
        render(&mut renderer);
        assert_eq!(engine.current_frame(), 72_000 + BLOCK);

        engine.key_press(ch, 127).unwrap();
        assert_eq!(engine.channel(ch).unwrap().play_status(), ChannelStatus::Wait);

        // run to the end of the loop
        let blocks = (96_000 - 72_000 - BLOCK) / BLOCK;
        for _ in 0..blocks {
            render(&mut renderer);
        }
        assert_eq!(engine.channel(ch).unwrap().play_status(), ChannelStatus::Wait);
        render(&mut renderer);
        assert_eq!(engine.channel(ch).unwrap().play_status(), ChannelStatus::Play);
    }

    #[test]
    fn test_stop_halts_loops_when_configured() {
        let (mut engine, mut renderer) = engine();
        engine.set_behaviors(Behaviors {
            chans_stop_on_seq_halt: true,
            ..Behaviors::default()
        });
        let ch = engine.add_channel(NewChannel::Sample);
        engine.load_wave(ch, Path::new("loop.wav"), &mut dc_loader(96_000)).unwrap();
        engine.set_sample_mode(ch, SamplePlayerMode::LoopBasic).unwrap();

        engine.start();
        engine.key_press(ch, 127).unwrap();
        render(&mut renderer);
        assert_eq!(engine.channel(ch).unwrap().play_status(), ChannelStatus::Play);

        engine.stop();
        render(&mut renderer);
        assert_eq!(engine.channel(ch).unwrap().play_status(), ChannelStatus::Off);
    }

    #[test]
    fn test_bpm_change_rescales_actions() {
        let (mut engine, _renderer) = engine();
        let ch = engine.add_channel(NewChannel::Sample);
        let mut actions = Actions::default();
        actions.record(crate::model::Action {
            channel_id: ch,
            frame: 24_000,
            event: MidiEvent::note_on(0, 100),
        });
        engine.model.get_mut().set_actions(actions);

        engine.set_bpm(60.0);
        assert_eq!(engine.document().sequencer.frames_in_beat, 48_000);
        assert_eq!(engine.document().actions.all()[0].frame, 48_000);
    }

    #[test]
    fn test_signal_mode_recording() {
        let (mut engine, mut renderer) = engine();
        let ch = engine.add_channel(NewChannel::Sample);
        engine.load_wave(ch, Path::new("snare.wav"), &mut dc_loader(100)).unwrap();

        engine.set_rec_trigger_mode(RecTriggerMode::Signal);
        engine.toggle_action_rec();
        assert_eq!(engine.status(), SeqStatus::Waiting);
        render(&mut renderer);
        assert_eq!(engine.current_frame(), 0);

        engine.key_press(ch, 100).unwrap();
        assert!(engine.is_running());
        assert!(engine.is_recording_actions());
        assert_eq!(engine.document().actions.len(), 1);

        engine.toggle_action_rec();
        assert!(!engine.is_recording_actions());
        let channel = engine.channel(ch).unwrap();
        assert!(channel.has_actions);
        assert!(channel.shared.is_reading_actions());
    }

    fn render_input(renderer: &mut Renderer, level: f32) {
        let mut out = StereoBuffer::silence(BLOCK);
        renderer.render(&mut out, &StereoBuffer::from_vec(vec![StereoSample::mono(level); BLOCK]));
    }

    fn take_of(engine: &Engine, ch: ChannelId) -> basedrop::Shared<Wave> {
        engine.channel(ch).unwrap().sample().unwrap().wave.clone().unwrap()
    }

    #[test]
    fn test_rigid_input_take_loops_from_current_frame() {
        let (mut engine, mut renderer) = engine();
        let ch = engine.add_channel(NewChannel::Sample);
        assert!(!engine.prepare_input_rec());
        engine.set_armed(ch, true).unwrap();
        engine.set_beats(1, 1);

        assert!(engine.prepare_input_rec());
        assert!(engine.is_recording_input());
        assert!(engine.is_running());
        for _ in 0..10 {
            render_input(&mut renderer, 0.25);
        }
        assert_eq!(engine.input_rec_frames(), 10 * BLOCK);

        assert_eq!(engine.stop_input_rec(), vec![ch]);
        assert!(!engine.is_recording_input());
        assert!(engine.is_running());

        let wave = take_of(&engine, ch);
        assert_eq!(wave.len(), 24_000);
        assert_eq!(wave.basename(), "TAKE-1.wav");
        assert_eq!(wave.frame(0), StereoSample::mono(0.25));
        assert_eq!(wave.frame(10 * BLOCK - 1), StereoSample::mono(0.25));
        assert_eq!(wave.frame(10 * BLOCK), StereoSample::silence());

        let channel = engine.channel(ch).unwrap();
        assert_eq!(channel.sample().unwrap().mode, SamplePlayerMode::LoopBasic);
        assert_eq!(channel.play_status(), ChannelStatus::Play);
        assert_eq!(channel.shared.tracker(), 10 * BLOCK);
        assert_eq!(engine.model().waves().len(), 1);
    }

    #[test]
    fn test_second_rigid_take_overdubs() {
        let (mut engine, mut renderer) = engine();
        let ch = engine.add_channel(NewChannel::Sample);
        engine.set_armed(ch, true).unwrap();
        engine.set_beats(1, 1);

        engine.prepare_input_rec();
        render_input(&mut renderer, 0.25);
        engine.stop_input_rec();

        engine.rewind().unwrap();
        engine.prepare_input_rec();
        render_input(&mut renderer, 0.25);
        engine.stop_input_rec();

        let wave = take_of(&engine, ch);
        assert_eq!(wave.frame(0), StereoSample::mono(0.5));
        // the first take's wave was released
        assert_eq!(engine.model().waves().len(), 1);
    }

    #[test]
    fn test_free_input_take_sets_tempo() {
        let (mut engine, mut renderer) = engine();
        let ch = engine.add_channel(NewChannel::Sample);
        engine.set_armed(ch, true).unwrap();
        engine.set_input_rec_mode(InputRecMode::Free);
        assert_eq!(engine.document().mixer.input_rec_mode, InputRecMode::Free);

        engine.prepare_input_rec();
        for _ in 0..150 {
            render_input(&mut renderer, 0.25);
        }
        assert_eq!(engine.stop_input_rec(), vec![ch]);

        assert_eq!(take_of(&engine, ch).len(), 76_800);
        assert!((engine.document().sequencer.bpm - 150.0).abs() < 1e-3);
        assert_eq!(engine.channel(ch).unwrap().shared.tracker(), 0);

        // transport went back to the loop start
        render(&mut renderer);
        assert_eq!(engine.current_frame(), BLOCK);

        // audio exists now, so free takes are off
        engine.set_input_rec_mode(InputRecMode::Free);
        assert_eq!(engine.document().mixer.input_rec_mode, InputRecMode::Rigid);
    }

    #[test]
    fn test_signal_triggered_input_take() {
        let (mut engine, mut renderer) = engine();
        let ch = engine.add_channel(NewChannel::Sample);
        engine.set_armed(ch, true).unwrap();
        engine.set_rec_trigger_mode(RecTriggerMode::Signal);

        engine.prepare_input_rec();
        assert_eq!(engine.status(), SeqStatus::Waiting);
        assert!(!engine.is_recording_actions());

        // below -10 dBFS
        render_input(&mut renderer, 0.1);
        assert_eq!(engine.current_frame(), 0);
        assert!(!engine.poll());

        render_input(&mut renderer, 0.5);
        assert_eq!(engine.current_frame(), BLOCK);
        assert_eq!(engine.input_rec_frames(), BLOCK);
        assert!(engine.poll());
        assert!(engine.is_running());
        assert!(!engine.poll());

        assert_eq!(engine.stop_input_rec(), vec![ch]);
        assert_eq!(take_of(&engine, ch).frame(0), StereoSample::mono(0.5));
    }

    #[test]
    fn test_input_take_cancelled_while_waiting() {
        let (mut engine, mut renderer) = engine();
        let ch = engine.add_channel(NewChannel::Sample);
        engine.set_armed(ch, true).unwrap();
        engine.set_rec_trigger_mode(RecTriggerMode::Signal);

        engine.toggle_input_rec();
        render(&mut renderer);
        engine.toggle_input_rec();

        assert_eq!(engine.status(), SeqStatus::Stopped);
        assert!(!engine.is_recording_input());
        assert!(!engine.channel(ch).unwrap().has_wave());
    }

    #[test]
    fn test_stop_finishes_input_take() {
        let (mut engine, mut renderer) = engine();
        let ch = engine.add_channel(NewChannel::Sample);
        engine.set_armed(ch, true).unwrap();

        engine.prepare_input_rec();
        render_input(&mut renderer, 0.25);
        engine.stop();

        assert_eq!(engine.status(), SeqStatus::Stopped);
        assert!(!engine.is_recording_input());
        assert!(engine.channel(ch).unwrap().has_wave());
    }

    #[test]
    fn test_toggle_read_actions() {
        let (mut engine, _renderer) = engine();
        let ch = engine.add_channel(NewChannel::Sample);
        engine.model.get_mut().channel_mut(ch).unwrap().has_actions = true;

        engine.toggle_read_actions(ch).unwrap();
        assert!(engine.channel(ch).unwrap().shared.is_reading_actions());
        engine.toggle_read_actions(ch).unwrap();
        assert!(!engine.channel(ch).unwrap().shared.is_reading_actions());

        // deferred to the first beat
        engine.set_behaviors(Behaviors {
            treat_recs_as_loops: true,
            ..Behaviors::default()
        });
        engine.start();
        engine.toggle_read_actions(ch).unwrap();
        let shared = &engine.channel(ch).unwrap().shared;
        assert_eq!(shared.rec_status(), ChannelStatus::Wait);
        assert!(!shared.is_reading_actions());
    }

    #[test]
    fn test_solo_updates_mixer() {
        let (mut engine, _renderer) = engine();
        let a = engine.add_channel(NewChannel::Sample);
        engine.set_solo(a, true).unwrap();
        assert!(engine.document().mixer.has_solos);
        engine.set_solo(a, false).unwrap();
        assert!(!engine.document().mixer.has_solos);
        assert!(engine.set_solo(ChannelId(99), true).is_err());
    }

    #[test]
    fn test_buffer_size_bounds() {
        let (mut engine, _renderer) = engine();
        assert!(engine.set_buffer_size(0).is_err());
        assert!(engine.set_buffer_size(MAX_BUFFER_SIZE + 1).is_err());
        engine.set_buffer_size(256).unwrap();
        assert_eq!(engine.document().buffer_size, 256);
        let shared = engine.model().find_channel_shared(ChannelId::MASTER_OUT).unwrap();
        assert_eq!(unsafe { shared.rt().audio.len() }, 256);
    }

    #[test]
    fn test_metronome_is_audible_while_running() {
        let (mut engine, mut renderer) = engine();
        engine.toggle_metronome();
        assert!(render(&mut renderer).peak() == 0.0);

        engine.start();
        assert!(render(&mut renderer).peak() > 0.0);
    }

    #[test]
    fn test_midi_input_reaches_channel() {
        let (mut engine, _renderer) = engine();
        let midi = engine.add_channel(NewChannel::Midi);
        engine.send_midi_to_channel(midi, MidiEvent::note_on(60, 90)).unwrap();
        let shared = engine.model().find_channel_shared(midi).unwrap();
        assert_eq!(shared.pop_midi().map(|e| e.note()), Some(60));

        let sample = engine.add_channel(NewChannel::Sample);
        assert!(engine.send_midi_to_channel(sample, MidiEvent::note_on(60, 90)).is_err());
    }
}
