//! Plugin references and the host seam
//!
//! Plugin instances live in an external host. The engine keeps a lightweight
//! [`Plugin`] record per instance and hands the host a channel's buffer, its
//! plugin stack and any MIDI due this block.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::midi::MidiEvent;
use crate::types::{PluginId, StereoBuffer};

/// A plugin instance as known to the engine
#[derive(Debug)]
pub struct Plugin {
    pub id: PluginId,
    /// Path or unique id of the plugin in the host
    pub path: String,
    pub name: String,
    bypass: AtomicBool,
}

impl Plugin {
    pub fn new(id: PluginId, path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            path: path.into(),
            name: name.into(),
            bypass: AtomicBool::new(false),
        }
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass.load(Ordering::Relaxed)
    }

    pub fn set_bypass(&self, bypass: bool) {
        self.bypass.store(bypass, Ordering::Relaxed);
    }
}

/// Processes plugin stacks in place (called on the audio thread)
pub trait PluginHost: Send {
    fn process_stack(&mut self, buffer: &mut StereoBuffer, plugins: &[basedrop::Shared<Plugin>], midi: &[MidiEvent]);
}

/// Host used when no plugin support is available; leaves audio untouched
#[derive(Debug, Default)]
pub struct NullPluginHost;

impl PluginHost for NullPluginHost {
    fn process_stack(&mut self, _buffer: &mut StereoBuffer, _plugins: &[basedrop::Shared<Plugin>], _midi: &[MidiEvent]) {}
}
