//! Project persistence
//!
//! A [`Project`] is a flat, serializable description of a session: transport,
//! channels with their parameters, wave and plugin references, and the
//! recorded actions. Waves are stored by path and decoded again on load
//! through the caller's [`WaveLoader`].

use std::path::{Path, PathBuf};

use basedrop::Shared;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::default_project_dir;
use crate::engine::Ids;
use crate::error::{ProjectError, ProjectResult};
use crate::model::{
    Action, Actions, Behaviors, Channel, ChannelKind, ChannelShared, ChannelStatus, Document, MidiParams, Model,
    RecTriggerMode, SampleParams, SamplePlayerMode,
};
use crate::plugin::Plugin;
use crate::types::{ChannelId, Frame, PluginId, WaveId};
use crate::wave::WaveLoader;

/// Project format version written by this build
pub const PROJECT_VERSION: u32 = 1;

/// Serializable session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub version: u32,
    /// Sample rate the action frames were recorded at
    pub sample_rate: u32,
    pub bpm: f32,
    pub beats: u32,
    pub bars: u32,
    pub quantize: u32,
    pub metronome: bool,
    pub in_to_out: bool,
    pub rec_trigger_mode: RecTriggerMode,
    #[serde(default)]
    pub behaviors: Behaviors,
    pub channels: Vec<ChannelEntry>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEntry {
    pub id: ChannelId,
    #[serde(default)]
    pub name: String,
    pub volume: f32,
    pub pan: f32,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default)]
    pub armed: bool,
    #[serde(default)]
    pub key: u32,
    #[serde(default)]
    pub read_actions: bool,
    pub kind: ChannelEntryKind,
    #[serde(default)]
    pub plugins: Vec<PluginEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelEntryKind {
    Sample(SampleEntry),
    Midi(MidiParams),
    MasterIn,
    MasterOut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleEntry {
    pub mode: SamplePlayerMode,
    pub wave: Option<WaveEntry>,
    pub begin: Frame,
    pub end: Frame,
    #[serde(default)]
    pub shift: Frame,
    pub pitch: f32,
    #[serde(default)]
    pub input_monitor: bool,
    #[serde(default)]
    pub overdub_protection: bool,
    #[serde(default)]
    pub velocity_as_volume: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveEntry {
    pub id: WaveId,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginEntry {
    pub id: PluginId,
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub bypass: bool,
}

/// Outcome of restoring a project
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Waves the loader could not decode; their channels were created empty
    pub missing_waves: Vec<PathBuf>,
}

impl Project {
    /// Describe the given Document (the preview channel is not saved)
    pub fn capture(doc: &Document) -> Self {
        let seq = &doc.sequencer;
        Self {
            version: PROJECT_VERSION,
            sample_rate: doc.sample_rate,
            bpm: seq.bpm,
            beats: seq.beats,
            bars: seq.bars,
            quantize: seq.quantize,
            metronome: seq.metronome,
            in_to_out: doc.mixer.in_to_out,
            rec_trigger_mode: doc.mixer.rec_trigger_mode,
            behaviors: doc.behaviors,
            channels: doc.channels.iter().filter_map(capture_channel).collect(),
            actions: doc.actions.all(),
        }
    }

    /// Where a project called `name` is saved by default
    pub fn default_path(name: &str) -> PathBuf {
        default_project_dir().join(format!("{name}.yaml"))
    }

    pub fn write(&self, path: &Path) -> ProjectResult<()> {
        let unreadable = |source| ProjectError::Unreadable {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(unreadable)?;
        }
        let yaml = serde_yaml::to_string(self).map_err(|e| ProjectError::Invalid(e.to_string()))?;
        std::fs::write(path, yaml).map_err(unreadable)
    }

    pub fn read(path: &Path) -> ProjectResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ProjectError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let project: Project = serde_yaml::from_str(&contents).map_err(|e| ProjectError::Invalid(e.to_string()))?;
        if project.version != PROJECT_VERSION {
            return Err(ProjectError::Unsupported {
                found: project.version,
                supported: PROJECT_VERSION,
            });
        }
        Ok(project)
    }

    /// Rebuild the session into a freshly reset model
    ///
    /// Must run under the model's data lock. Ids found in the project are
    /// reserved so new channels, waves and plugins never collide with them.
    pub(crate) fn restore(&self, model: &mut Model, ids: &mut Ids, loader: &mut impl WaveLoader) -> LoadReport {
        let mut report = LoadReport::default();
        let sample_rate = model.get().sample_rate;
        let buffer_size = model.get().buffer_size;

        let doc = model.get_mut();
        doc.sequencer.set_bpm(self.bpm, sample_rate);
        doc.sequencer.set_beats(self.beats, self.bars, sample_rate);
        doc.sequencer.set_quantize(self.quantize);
        doc.sequencer.metronome = self.metronome;
        doc.mixer.in_to_out = self.in_to_out;
        doc.mixer.rec_trigger_mode = self.rec_trigger_mode;
        doc.behaviors = self.behaviors;

        let mut channels = Vec::new();
        for entry in &self.channels {
            let plugins: Vec<Shared<Plugin>> = entry
                .plugins
                .iter()
                .map(|p| {
                    ids.plugins.reserve(p.id.0);
                    let plugin = model.add_plugin(Plugin::new(p.id, p.path.as_str(), p.name.as_str()));
                    plugin.set_bypass(p.bypass);
                    plugin
                })
                .collect();

            let kind = match &entry.kind {
                ChannelEntryKind::MasterIn | ChannelEntryKind::MasterOut => {
                    if let Some(channel) = model.get_mut().channel_mut(entry.id) {
                        entry.apply_to(channel);
                        channel.plugins = plugins;
                    }
                    continue;
                }
                ChannelEntryKind::Sample(sample) => {
                    ChannelKind::Sample(restore_sample(sample, model, ids, loader, &mut report))
                }
                ChannelEntryKind::Midi(params) => ChannelKind::Midi(*params),
            };

            ids.channels.reserve(entry.id.0);
            let with_quantizer = matches!(kind, ChannelKind::Sample(_));
            let shared = model.add_channel_shared(ChannelShared::with_buffer_size(entry.id, with_quantizer, buffer_size));
            let mut channel = Channel::new(entry.id, kind, shared);
            entry.apply_to(&mut channel);
            channel.plugins = plugins;
            channels.push(channel);
        }

        let doc = model.get_mut();
        doc.channels.extend(channels);

        // Actions of channels that did not make it are dropped
        let ratio = sample_rate as f32 / self.sample_rate.max(1) as f32;
        let mut actions: Actions = self
            .actions
            .iter()
            .filter(|a| doc.channel(a.channel_id).is_some())
            .copied()
            .collect();
        if self.sample_rate != sample_rate {
            debug!("Project recorded at {} Hz, rescaling actions", self.sample_rate);
            actions.rescale(ratio, 0);
        }
        for channel in &mut doc.channels {
            channel.has_actions = actions.has_actions(channel.id);
        }
        doc.set_actions(actions);
        doc.update_solos();

        report
    }
}

impl ChannelEntry {
    fn apply_to(&self, channel: &mut Channel) {
        channel.name = self.name.clone();
        channel.volume = self.volume;
        channel.pan = self.pan;
        channel.mute = self.mute;
        channel.solo = self.solo;
        channel.armed = self.armed;
        channel.key = self.key;
        if self.read_actions {
            channel.shared.set_read_actions(true);
            channel.shared.set_rec_status(ChannelStatus::Play);
        }
    }
}

fn capture_channel(channel: &Channel) -> Option<ChannelEntry> {
    let kind = match &channel.kind {
        ChannelKind::Sample(p) => ChannelEntryKind::Sample(SampleEntry {
            mode: p.mode,
            wave: p.wave.as_ref().map(|w| WaveEntry {
                id: w.id,
                path: w.path.clone(),
            }),
            begin: p.begin,
            end: p.end,
            shift: p.shift,
            pitch: p.pitch,
            input_monitor: p.input_monitor,
            overdub_protection: p.overdub_protection,
            velocity_as_volume: p.velocity_as_volume,
        }),
        ChannelKind::Midi(p) => ChannelEntryKind::Midi(*p),
        ChannelKind::MasterIn => ChannelEntryKind::MasterIn,
        ChannelKind::MasterOut => ChannelEntryKind::MasterOut,
        ChannelKind::Preview(_) => return None,
    };

    Some(ChannelEntry {
        id: channel.id,
        name: channel.name.clone(),
        volume: channel.volume,
        pan: channel.pan,
        mute: channel.mute,
        solo: channel.solo,
        armed: channel.armed,
        key: channel.key,
        read_actions: channel.shared.read_actions(),
        kind,
        plugins: channel
            .plugins
            .iter()
            .map(|p| PluginEntry {
                id: p.id,
                path: p.path.clone(),
                name: p.name.clone(),
                bypass: p.is_bypassed(),
            })
            .collect(),
    })
}

fn restore_sample(
    entry: &SampleEntry,
    model: &mut Model,
    ids: &mut Ids,
    loader: &mut impl WaveLoader,
    report: &mut LoadReport,
) -> SampleParams {
    let mut params = SampleParams {
        mode: entry.mode,
        pitch: entry.pitch,
        input_monitor: entry.input_monitor,
        overdub_protection: entry.overdub_protection,
        velocity_as_volume: entry.velocity_as_volume,
        ..SampleParams::default()
    };

    let Some(wave_entry) = &entry.wave else {
        return params;
    };
    ids.waves.reserve(wave_entry.id.0);
    match loader.load(wave_entry.id, &wave_entry.path) {
        Some(wave) => {
            if wave.sample_rate != model.get().sample_rate {
                warn!("Wave {:?} is {} Hz", wave_entry.path, wave.sample_rate);
            }
            params.set_wave(Some(model.add_wave(wave)));
            params.set_trims(entry.begin, entry.end);
            if params.begin + entry.shift < params.end {
                params.shift = entry.shift;
            }
        }
        None => {
            warn!("Missing wave {:?}", wave_entry.path);
            report.missing_waves.push(wave_entry.path.clone());
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::{Engine, NewChannel};
    use crate::error::EngineError;
    use crate::types::{StereoBuffer, StereoSample};
    use crate::wave::Wave;

    fn loader(id: WaveId, path: &Path) -> Option<Wave> {
        if path.ends_with("missing.wav") {
            return None;
        }
        Some(Wave::new(
            id,
            path,
            48000,
            StereoBuffer::from_vec(vec![StereoSample::mono(0.25); 48_000]),
        ))
    }

    fn engine() -> Engine {
        let config = EngineConfig {
            sample_rate: 48000,
            ..EngineConfig::default()
        };
        Engine::new(config).0
    }

    /// Session with a sample channel carrying actions, a MIDI channel and a
    /// plugin on the master output
    fn session() -> Engine {
        let mut engine = engine();
        engine.set_bpm(90.0);
        engine.set_quantize(4);

        let kick = engine.add_channel(NewChannel::Sample);
        engine.load_wave(kick, Path::new("/audio/kick.wav"), &mut loader).unwrap();
        engine.set_trims(kick, 100, 40_000).unwrap();
        engine.set_name(kick, "Kick").unwrap();
        engine.set_volume(kick, 0.8).unwrap();

        let synth = engine.add_channel(NewChannel::Midi);
        engine.set_midi_output(synth, true, 3).unwrap();

        let reverb = engine.add_plugin(ChannelId::MASTER_OUT, "lv2:reverb", "Reverb").unwrap();
        engine.set_plugin_bypass(reverb, true).unwrap();

        engine.prepare_action_rec();
        engine.key_press(kick, 100).unwrap();
        engine.stop_action_rec();
        engine.stop();
        engine
    }

    #[test]
    fn test_capture_skips_preview() {
        let project = Project::capture(session().document());
        let ids: Vec<ChannelId> = project.channels.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![ChannelId::MASTER_OUT, ChannelId::MASTER_IN, ChannelId(4), ChannelId(5)]);
        assert_eq!(project.actions.len(), 1);
        assert!(project.channels[2].read_actions);
    }

    #[test]
    fn test_save_and_load_reproduces_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("set").join("project.yaml");
        let saved = session();
        saved.save_project(&path).unwrap();

        let mut engine = engine();
        let report = engine.load_project(&path, &mut loader).unwrap();
        assert!(report.missing_waves.is_empty());
        assert_eq!(Project::capture(engine.document()), Project::capture(saved.document()));

        let kick = engine.channel(ChannelId(4)).unwrap();
        assert_eq!(kick.name, "Kick");
        assert_eq!(kick.sample().map(|p| (p.begin, p.end)), Some((100, 40_000)));
        assert!(kick.has_actions);

        let master = engine.channel(ChannelId::MASTER_OUT).unwrap();
        assert!(master.plugins[0].is_bypassed());
        assert_eq!(engine.document().sequencer.bpm, 90.0);

        // Loaded ids are never handed out again
        assert_eq!(engine.add_channel(NewChannel::Sample), ChannelId(6));
    }

    #[test]
    fn test_missing_wave_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.yaml");
        let mut project = Project::capture(session().document());
        if let ChannelEntryKind::Sample(sample) = &mut project.channels[2].kind {
            sample.wave.as_mut().unwrap().path = PathBuf::from("/audio/missing.wav");
        }
        project.write(&path).unwrap();

        let mut engine = engine();
        let report = engine.load_project(&path, &mut loader).unwrap();
        assert_eq!(report.missing_waves, vec![PathBuf::from("/audio/missing.wav")]);
        assert!(!engine.channel(ChannelId(4)).unwrap().has_wave());
    }

    #[test]
    fn test_actions_follow_sample_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.yaml");
        let mut project = Project::capture(session().document());
        project.sample_rate = 24000;
        project.actions[0].frame = 1000;
        project.write(&path).unwrap();

        let mut engine = engine();
        engine.load_project(&path, &mut loader).unwrap();
        assert_eq!(engine.document().actions.all()[0].frame, 2000);
    }

    #[test]
    fn test_default_path_in_project_dir() {
        let path = Project::default_path("friday set");
        assert_eq!(path.parent(), Some(default_project_dir().as_path()));
        assert!(path.ends_with("friday set.yaml"));
    }

    #[test]
    fn test_read_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = Project::read(&dir.path().join("nope.yaml"));
        assert!(matches!(missing, Err(ProjectError::Unreadable { .. })));

        let garbage = dir.path().join("garbage.yaml");
        std::fs::write(&garbage, "channels: [[[").unwrap();
        assert!(matches!(Project::read(&garbage), Err(ProjectError::Invalid(_))));

        let future = dir.path().join("future.yaml");
        let mut project = Project::capture(engine().document());
        project.version = 9;
        project.write(&future).unwrap();
        let mut engine = engine();
        let err = engine.load_project(&future, &mut loader).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Project(ProjectError::Unsupported { found: 9, .. })
        ));
    }
}
