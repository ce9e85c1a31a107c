//! MIDI channel play status
//!
//! MIDI channels are always "loops" of recorded actions: a key press only
//! schedules start or stop, which happen on the next first beat.

use crate::model::{ChannelShared, ChannelStatus};
use crate::sequencer::{Event, EventType};

pub fn key_press(shared: &ChannelShared) {
    let status = match shared.play_status() {
        ChannelStatus::Off => ChannelStatus::Wait,
        ChannelStatus::Wait => ChannelStatus::Off,
        ChannelStatus::Play => ChannelStatus::Ending,
        ChannelStatus::Ending => ChannelStatus::Play,
    };
    shared.set_play_status(status);
}

/// Stop now and silence hanging notes
pub fn key_kill(shared: &ChannelShared) {
    if shared.play_status() != ChannelStatus::Off {
        shared.request_notes_off();
    }
    shared.set_play_status(ChannelStatus::Off);
}

pub fn stop_by_seq(shared: &ChannelShared) {
    key_kill(shared);
}

/// React to a sequencer event; returns `true` when the channel just stopped
pub fn advance(shared: &ChannelShared, event: &Event) -> bool {
    if !matches!(event.kind, EventType::FirstBeat | EventType::Rewind) {
        return false;
    }
    match shared.play_status() {
        ChannelStatus::Wait => {
            shared.set_play_status(ChannelStatus::Play);
            false
        }
        ChannelStatus::Ending => {
            shared.set_play_status(ChannelStatus::Off);
            true
        }
        _ => false,
    }
}
