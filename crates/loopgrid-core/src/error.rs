//! Engine and project error types
//!
//! Only the control thread ever sees these. The real-time path clamps values
//! and drops commands instead of failing.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{ChannelId, PluginId, WaveId};

/// Errors returned by control-thread engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// No channel with this id in the current document
    #[error("Channel not found: {0}")]
    ChannelNotFound(ChannelId),

    /// Operation only valid on another kind of channel
    #[error("Channel {id} is not a {expected} channel")]
    WrongChannelKind { id: ChannelId, expected: &'static str },

    /// Internal channels (master in/out, preview) cannot be removed
    #[error("Channel {0} is internal and cannot be removed")]
    InternalChannel(ChannelId),

    /// Wave registry lookup failed
    #[error("Wave not found: {0:?}")]
    WaveNotFound(WaveId),

    /// The wave loader could not decode the file
    #[error("Cannot load wave from {0:?}")]
    WaveUnreadable(PathBuf),

    /// Plugin registry lookup failed
    #[error("Plugin not found: {0:?}")]
    PluginNotFound(PluginId),

    /// Block size outside the pre-allocated range
    #[error("Invalid buffer size {size} (max {max})")]
    InvalidBufferSize { size: usize, max: usize },

    /// The real-time command ring buffer is full
    #[error("Real-time command queue is full")]
    QueueFull,

    /// Project persistence failed
    #[error(transparent)]
    Project(#[from] ProjectError),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised while saving or loading a project
#[derive(Error, Debug)]
pub enum ProjectError {
    /// The file could not be read or written
    #[error("Cannot access project file {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file was read but its content is not a valid project
    #[error("Invalid project: {0}")]
    Invalid(String),

    /// The project was written by an incompatible version
    #[error("Unsupported project version {found} (supported: {supported})")]
    Unsupported { found: u32, supported: u32 },
}

/// Result type for project persistence
pub type ProjectResult<T> = Result<T, ProjectError>;
