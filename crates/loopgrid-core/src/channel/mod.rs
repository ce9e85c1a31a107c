//! Per-channel behavior
//!
//! Control-thread entry points (`key_*`, `stop_by_seq`) only touch the
//! channel's shared atomics and queues. `advance` and `render` run on the
//! audio thread once per block.

pub mod midi_controller;
pub mod midi_io;
pub mod sample_advancer;
pub mod sample_player;
pub mod sample_reactor;

use std::ops::Range;

use crate::midi::{MidiEvent, MidiOutput};
use crate::model::{Channel, ChannelKind};
use crate::plugin::PluginHost;
use crate::quantizer::Grid;
use crate::sequencer::Event;
use crate::types::{Frame, StereoBuffer, MAX_BUFFER_SIZE};

// ────────────────────────────────────────────────────────────────
// Control thread
// ────────────────────────────────────────────────────────────────

pub fn key_press(channel: &Channel, velocity: u8, can_quantize: bool) {
    match &channel.kind {
        ChannelKind::Sample(p) | ChannelKind::Preview(p) => {
            if p.has_wave() {
                sample_reactor::key_press(&channel.shared, p.mode, velocity, can_quantize, p.velocity_as_volume);
            }
        }
        ChannelKind::Midi(_) => midi_controller::key_press(&channel.shared),
        ChannelKind::MasterIn | ChannelKind::MasterOut => {}
    }
}

pub fn key_release(channel: &Channel) {
    if let ChannelKind::Sample(p) | ChannelKind::Preview(p) = &channel.kind {
        sample_reactor::key_release(&channel.shared, p.mode);
    }
}

pub fn key_kill(channel: &Channel) {
    match &channel.kind {
        ChannelKind::Sample(p) | ChannelKind::Preview(p) => sample_reactor::key_kill(&channel.shared, p.mode),
        ChannelKind::Midi(_) => midi_controller::key_kill(&channel.shared),
        ChannelKind::MasterIn | ChannelKind::MasterOut => {}
    }
}

/// The transport has been stopped
pub fn stop_by_seq(channel: &Channel, chans_stop_on_seq_halt: bool) {
    match &channel.kind {
        ChannelKind::Sample(p) => sample_reactor::stop_by_seq(&channel.shared, p.mode, chans_stop_on_seq_halt),
        ChannelKind::Midi(_) => midi_controller::stop_by_seq(&channel.shared),
        _ => {}
    }
}

/// Live MIDI from a controller or keyboard, routed to a MIDI channel
pub fn receive_live_midi(channel: &Channel, event: MidiEvent) {
    if matches!(channel.kind, ChannelKind::Midi(_)) {
        midi_io::receive_live(&channel.shared, event);
    }
}

// ────────────────────────────────────────────────────────────────
// Audio thread
// ────────────────────────────────────────────────────────────────

/// Feed one block of sequencer events to the channel
///
/// `block` is the global frame range the block covers, used by the channel
/// quantizer to find its boundary. Event reactions are queued before the
/// quantizer fires; the player sorts the result by offset.
pub fn advance(
    channel: &Channel,
    events: &[Event],
    block: Range<Frame>,
    grid: Grid,
    output: &mut dyn MidiOutput,
) {
    let shared = &*channel.shared;

    match &channel.kind {
        ChannelKind::Sample(p) | ChannelKind::Preview(p) => {
            for event in events {
                sample_advancer::advance(channel.id, shared, event, p.mode, p.velocity_as_volume);
            }
            if let Some(quantizer) = shared.quantizer() {
                quantizer.advance(block, grid, |action, delta| {
                    sample_advancer::on_quantizer(shared, action, delta);
                });
            }
        }
        ChannelKind::Midi(p) => {
            for event in events {
                if midi_controller::advance(shared, event) {
                    midi_io::notes_off(shared, p, output);
                }
                if channel.is_playing() {
                    if !channel.is_muted() {
                        midi_io::send(channel.id, p, event, output);
                    }
                    midi_io::receive(channel.id, shared, event);
                }
            }
        }
        ChannelKind::MasterIn | ChannelKind::MasterOut => {}
    }
}

/// Render one block into the channel's own buffer
///
/// Master channels are processed by the mixer and are left untouched here.
///
/// # Safety
///
/// Audio thread only, with an unlocked Document (see
/// [`crate::model::ChannelShared::rt`]).
pub unsafe fn render(
    channel: &Channel,
    input: &StereoBuffer,
    block_len: usize,
    seq_running: bool,
    host: &mut dyn PluginHost,
    output: &mut dyn MidiOutput,
) {
    let shared = &*channel.shared;

    match &channel.kind {
        ChannelKind::Sample(p) | ChannelKind::Preview(p) => {
            let rt = shared.rt();
            rt.audio.set_len_from_capacity(block_len.min(MAX_BUFFER_SIZE));
            sample_player::render(shared, p, seq_running);

            if channel.armed && p.input_monitor {
                rt.audio.add_scaled(input, 1.0, 1.0);
            }
            if !channel.plugins.is_empty() {
                host.process_stack(&mut rt.audio, &channel.plugins, &[]);
            }
        }
        ChannelKind::Midi(p) => {
            if shared.take_notes_off() {
                midi_io::notes_off(shared, p, output);
            }
            let rt = shared.rt();
            rt.audio.set_len_from_capacity(block_len.min(MAX_BUFFER_SIZE));
            rt.audio.fill_silence();

            midi_io::drain_queue(shared);
            if !channel.plugins.is_empty() {
                host.process_stack(&mut rt.audio, &channel.plugins, &rt.midi);
            }
        }
        ChannelKind::MasterIn | ChannelKind::MasterOut => {}
    }
}
