//! Loopgrid Core - Real-time loop engine

pub mod types;
pub mod error;
pub mod gc;
pub mod swapper;
pub mod quantizer;
pub mod midi;
pub mod model;
pub mod wave;
pub mod plugin;
pub mod sync;
pub mod sequencer;
pub mod channel;
pub mod mixer;
pub mod command;
pub mod renderer;
pub mod recorder;
pub mod config;
pub mod engine;
pub mod project;

pub use config::EngineConfig;
pub use engine::{Collaborators, Engine, NewChannel};
pub use error::{EngineError, EngineResult, ProjectError, ProjectResult};
pub use project::{LoadReport, Project};
pub use renderer::Renderer;
pub use types::*;
