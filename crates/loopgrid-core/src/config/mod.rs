//! Engine preferences
//!
//! - [`EngineConfig`]: sample rate, block size and the behaviors the engine
//!   consults while running
//! - Generic YAML loading/saving
//! - Standard file locations (the project directory is used by
//!   [`crate::Project::default_path`])
//!
//! # Usage
//!
//! ```ignore
//! use loopgrid_core::config::{default_config_path, load_config, save_config, EngineConfig};
//!
//! let config: EngineConfig = load_config(&default_config_path());
//! save_config(&config, &default_config_path())?;
//! ```

mod io;
mod paths;

pub use io::{load_config, save_config};
pub use paths::{config_dir, default_config_path, default_project_dir};

use serde::{Deserialize, Serialize};

use crate::model::{Behaviors, InputRecMode, RecTriggerMode};
use crate::types::{
    DEFAULT_BPM, DEFAULT_BUFFER_SIZE, DEFAULT_REC_TRIGGER_LEVEL, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE, MAX_BPM, MIN_BPM,
    MIN_REC_TRIGGER_LEVEL,
};

/// Engine preferences, persisted as YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Device sample rate in Hz
    /// Default: 44100
    pub sample_rate: u32,

    /// Expected frames per block; blocks up to `MAX_BUFFER_SIZE` are accepted
    /// Default: 512
    pub buffer_size: usize,

    /// Tempo of a new session
    pub bpm: f32,

    pub behaviors: Behaviors,

    /// How action and input recording start
    pub rec_trigger_mode: RecTriggerMode,

    pub input_rec_mode: InputRecMode,

    /// Input level (dBFS) that starts a signal-triggered take
    /// Default: -10
    pub rec_trigger_level: f32,

    /// Metronome enabled in a new session
    pub metronome: bool,

    /// Route the input to the output in a new session
    pub in_to_out: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            bpm: DEFAULT_BPM,
            behaviors: Behaviors::default(),
            rec_trigger_mode: RecTriggerMode::Normal,
            input_rec_mode: InputRecMode::Rigid,
            rec_trigger_level: DEFAULT_REC_TRIGGER_LEVEL,
            metronome: false,
            in_to_out: false,
        }
    }
}

impl EngineConfig {
    /// Copy with every value brought into its valid range
    pub fn sanitized(&self) -> Self {
        Self {
            sample_rate: if self.sample_rate == 0 { DEFAULT_SAMPLE_RATE } else { self.sample_rate },
            buffer_size: self.buffer_size.clamp(1, MAX_BUFFER_SIZE),
            bpm: self.bpm.clamp(MIN_BPM, MAX_BPM),
            rec_trigger_level: self.rec_trigger_level.clamp(MIN_REC_TRIGGER_LEVEL, 0.0),
            ..self.clone()
        }
    }
}
