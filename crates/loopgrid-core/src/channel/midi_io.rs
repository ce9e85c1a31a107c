//! MIDI routing for MIDI channels (audio thread)
//!
//! The sender forwards due actions to the external MIDI output; the receiver
//! queues them (with their block offset) for the channel's plugin stack.

use crate::midi::{MidiEvent, MidiOutput};
use crate::model::{ChannelShared, MidiParams};
use crate::sequencer::{Event, EventType};
use crate::types::ChannelId;

/// Send this channel's due actions to the MIDI output
pub fn send(id: ChannelId, params: &MidiParams, event: &Event, output: &mut dyn MidiOutput) {
    if !params.output_enabled || event.kind != EventType::Actions {
        return;
    }
    let Some(actions) = &event.actions else {
        return;
    };
    for action in actions.iter().filter(|a| a.channel_id == id) {
        output.send(
            action
                .event
                .with_channel(params.output_filter)
                .with_delta(event.delta),
        );
    }
}

/// Queue this channel's due actions for the plugin stack
pub fn receive(id: ChannelId, shared: &ChannelShared, event: &Event) {
    if event.kind != EventType::Actions {
        return;
    }
    let Some(actions) = &event.actions else {
        return;
    };
    for action in actions.iter().filter(|a| a.channel_id == id) {
        shared.push_midi(action.event.with_delta(event.delta));
    }
}

/// Live MIDI input: flattened to channel 0 and queued at the block start
pub fn receive_live(shared: &ChannelShared, event: MidiEvent) {
    shared.push_midi(event.with_channel(0).with_delta(0));
}

/// All notes off on both the output and the plugin stack
pub fn notes_off(shared: &ChannelShared, params: &MidiParams, output: &mut dyn MidiOutput) {
    if params.output_enabled {
        output.send(MidiEvent::all_notes_off().with_channel(params.output_filter));
    }
    shared.push_midi(MidiEvent::all_notes_off());
}

/// Move queued MIDI into the channel's per-block buffer
///
/// # Safety
///
/// Audio thread only, see [`ChannelShared::rt`].
pub unsafe fn drain_queue(shared: &ChannelShared) {
    let rt = shared.rt();
    rt.midi.clear();
    while let Some(event) = shared.pop_midi() {
        if rt.midi.len() < rt.midi.capacity() {
            rt.midi.push(event);
        }
    }
}
