//! Versioned document model
//!
//! The control thread owns a working [`Document`], mutates it in place and
//! publishes a clone with [`Model::swap`]. The audio thread grabs the latest
//! published version once per block through a [`ModelReader`].
//!
//! Objects that must keep their identity across versions (channel shared
//! state, waves, plugins) are kept in registries here and referenced from
//! the Document through `basedrop::Shared` handles.

mod actions;
mod document;
mod input;
mod shared;

use std::ops::{Deref, DerefMut};

use basedrop::Shared;

pub use actions::{Action, ActionSource, Actions};
pub use document::{
    Behaviors, Channel, ChannelKind, ChannelStatus, Document, InputRecMode, MidiParams, MixerShared, MixerState,
    Peak, RecTriggerMode, SamplePlayerMode, SampleParams, SeqStatus, SequencerShared, SequencerState,
};
pub use input::InputCapture;
pub use shared::{
    quantizer_action, ChannelRt, ChannelShared, PlayerState, RenderCommand, RenderMode, RtCell,
    MIDI_QUEUE_SIZE, RENDER_QUEUE_SIZE,
};

use crate::gc::gc_handle;
use crate::plugin::Plugin;
use crate::swapper::{swapper, SwapperGuard, SwapperReader, SwapperWriter};
use crate::types::{ChannelId, PluginId, WaveId};
use crate::wave::Wave;

/// What kind of change a swap publishes
///
/// Advisory only: forwarded to the `on_swap` listener so observers can decide
/// how much to refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapType {
    /// Structure changed (channels added or removed, ...)
    Hard,
    /// A property changed (volume, bpm, ...)
    Soft,
    /// Nothing observers care about
    None,
}

/// Read-only guard over the Document version used for one block
pub type DocumentGuard<'a> = SwapperGuard<'a, Document>;

/// Audio-thread handle to the model
#[derive(Clone)]
pub struct ModelReader {
    reader: SwapperReader<Document>,
}

impl ModelReader {
    /// Latest published Document; hold the guard for the whole block
    #[inline]
    pub fn get_rt(&self) -> DocumentGuard<'_> {
        self.reader.acquire()
    }
}

/// Control-thread owner of the document and the shared registries
pub struct Model {
    document: Document,
    writer: SwapperWriter<Document>,
    channels_shared: Vec<Shared<ChannelShared>>,
    waves: Vec<Shared<Wave>>,
    plugins: Vec<Shared<Plugin>>,
    on_swap: Option<Box<dyn FnMut(SwapType) + Send>>,
}

impl Model {
    pub fn new(sample_rate: u32, buffer_size: usize) -> Self {
        let document = Document::new(sample_rate, buffer_size);
        let (writer, _reader) = swapper(document.clone());

        let mut model = Self {
            document,
            writer,
            channels_shared: Vec::new(),
            waves: Vec::new(),
            plugins: Vec::new(),
            on_swap: None,
        };
        model.reset();
        model
    }

    /// Handle for the audio thread
    pub fn reader(&self) -> ModelReader {
        ModelReader {
            reader: self.writer.reader(),
        }
    }

    /// The working Document (what the next swap will publish)
    pub fn get(&self) -> &Document {
        &self.document
    }

    pub fn get_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    /// Publish the working Document
    pub fn swap(&mut self, swap_type: SwapType) {
        self.writer.publish(self.document.clone());
        if let Some(listener) = self.on_swap.as_mut() {
            listener(swap_type);
        }
    }

    /// Register a listener called after every swap
    pub fn set_on_swap(&mut self, listener: impl FnMut(SwapType) + Send + 'static) {
        self.on_swap = Some(Box::new(listener));
    }

    pub fn is_locked(&self) -> bool {
        self.document.locked
    }

    /// Lock the model until the returned guard is dropped
    ///
    /// Once this returns, the audio thread is rendering silence and no longer
    /// holds any Document that references channel state, so shared objects
    /// and real-time cells can be touched freely.
    #[must_use]
    pub fn lock_data(&mut self, swap_type: SwapType) -> DataLock<'_> {
        self.document.locked = true;
        self.swap(SwapType::None);
        self.writer.wait_for_readers();
        DataLock { model: self, swap_type }
    }

    /// Back to an empty session with only the internal channels
    ///
    /// Sample rate, buffer size and behaviors are kept.
    pub fn reset(&mut self) {
        let mut lock = self.lock_data(SwapType::Hard);
        let sample_rate = lock.document.sample_rate;
        let buffer_size = lock.document.buffer_size;
        let behaviors = lock.document.behaviors;

        lock.channels_shared.clear();
        lock.waves.clear();
        lock.plugins.clear();

        let mut document = Document::new(sample_rate, buffer_size);
        document.locked = true;
        document.behaviors = behaviors;
        lock.document = document;

        for (id, kind) in [
            (ChannelId::MASTER_OUT, ChannelKind::MasterOut),
            (ChannelId::MASTER_IN, ChannelKind::MasterIn),
            (ChannelId::PREVIEW, ChannelKind::Preview(SampleParams::default())),
        ] {
            let with_quantizer = matches!(kind, ChannelKind::Preview(_));
            let shared = lock.add_channel_shared(ChannelShared::with_buffer_size(id, with_quantizer, buffer_size));
            lock.document.channels.push(Channel::new(id, kind, shared));
        }
    }

    // ── Channel shared state ────────────────────────────────────

    pub fn add_channel_shared(&mut self, shared: ChannelShared) -> Shared<ChannelShared> {
        let shared = Shared::new(&gc_handle(), shared);
        self.channels_shared.push(shared.clone());
        shared
    }

    pub fn find_channel_shared(&self, id: ChannelId) -> Option<Shared<ChannelShared>> {
        self.channels_shared.iter().find(|s| s.id == id).cloned()
    }

    pub fn remove_channel_shared(&mut self, id: ChannelId) {
        self.channels_shared.retain(|s| s.id != id);
    }

    pub fn channels_shared(&self) -> &[Shared<ChannelShared>] {
        &self.channels_shared
    }

    // ── Waves ───────────────────────────────────────────────────

    pub fn add_wave(&mut self, wave: Wave) -> Shared<Wave> {
        let wave = Shared::new(&gc_handle(), wave);
        self.waves.push(wave.clone());
        wave
    }

    pub fn find_wave(&self, id: WaveId) -> Option<Shared<Wave>> {
        self.waves.iter().find(|w| w.id == id).cloned()
    }

    pub fn remove_wave(&mut self, id: WaveId) -> bool {
        let before = self.waves.len();
        self.waves.retain(|w| w.id != id);
        self.waves.len() != before
    }

    pub fn clear_waves(&mut self) {
        self.waves.clear();
    }

    pub fn waves(&self) -> &[Shared<Wave>] {
        &self.waves
    }

    // ── Plugins ─────────────────────────────────────────────────

    pub fn add_plugin(&mut self, plugin: Plugin) -> Shared<Plugin> {
        let plugin = Shared::new(&gc_handle(), plugin);
        self.plugins.push(plugin.clone());
        plugin
    }

    pub fn find_plugin(&self, id: PluginId) -> Option<Shared<Plugin>> {
        self.plugins.iter().find(|p| p.id == id).cloned()
    }

    pub fn remove_plugin(&mut self, id: PluginId) -> bool {
        let before = self.plugins.len();
        self.plugins.retain(|p| p.id != id);
        self.plugins.len() != before
    }

    pub fn clear_plugins(&mut self) {
        self.plugins.clear();
    }

    pub fn plugins(&self) -> &[Shared<Plugin>] {
        &self.plugins
    }
}

/// Scoped model lock; unlocks and publishes on drop
pub struct DataLock<'a> {
    model: &'a mut Model,
    swap_type: SwapType,
}

impl Deref for DataLock<'_> {
    type Target = Model;

    fn deref(&self) -> &Model {
        self.model
    }
}

impl DerefMut for DataLock<'_> {
    fn deref_mut(&mut self) -> &mut Model {
        self.model
    }
}

impl Drop for DataLock<'_> {
    fn drop(&mut self) {
        self.model.document.locked = false;
        self.model.swap(self.swap_type);
    }
}
