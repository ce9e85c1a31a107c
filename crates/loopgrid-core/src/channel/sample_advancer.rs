//! Sample channel reactions to sequencer events (audio thread)

use super::sample_reactor::{play, rewind, stop};
use crate::midi::MidiKind;
use crate::model::{quantizer_action, Action, ChannelShared, ChannelStatus, SamplePlayerMode};
use crate::sequencer::{Event, EventType};
use crate::types::{ChannelId, Frame};

/// Deferred action fired by the channel quantizer
pub fn on_quantizer(shared: &ChannelShared, action: u32, delta: Frame) {
    match action {
        quantizer_action::PLAY => play(shared, delta),
        quantizer_action::REWIND => rewind(shared, delta),
        _ => {}
    }
}

/// React to one sequencer event
pub fn advance(id: ChannelId, shared: &ChannelShared, event: &Event, mode: SamplePlayerMode, velocity_as_volume: bool) {
    match event.kind {
        EventType::FirstBeat => on_first_beat(shared, event.delta, mode),
        EventType::Bar => on_bar(shared, event.delta, mode),
        EventType::Rewind => on_rewind(shared, event.delta, mode),
        EventType::Actions => {
            if let Some(actions) = &event.actions {
                parse_actions(id, shared, actions, event.delta, mode, velocity_as_volume);
            }
        }
    }
}

/// The player ran out of data (`natural`) or was stopped
pub fn on_last_frame(shared: &ChannelShared, seq_running: bool, natural: bool, mode: SamplePlayerMode) {
    match shared.play_status() {
        ChannelStatus::Play => {
            let single = matches!(
                mode,
                SamplePlayerMode::SingleBasic
                    | SamplePlayerMode::SingleBasicPause
                    | SamplePlayerMode::SinglePress
                    | SamplePlayerMode::SingleRetrig
            );
            // Endless and repeating loops keep going
            if single || (mode.is_loop() && !seq_running) || !natural {
                shared.set_play_status(ChannelStatus::Off);
            } else if matches!(mode, SamplePlayerMode::LoopOnce | SamplePlayerMode::LoopOnceBar) {
                shared.set_play_status(ChannelStatus::Wait);
            }
        }
        ChannelStatus::Ending => shared.set_play_status(ChannelStatus::Off),
        _ => {}
    }
}

fn on_first_beat(shared: &ChannelShared, delta: Frame, mode: SamplePlayerMode) {
    let is_loop = mode.is_loop();

    match shared.play_status() {
        ChannelStatus::Play if is_loop => rewind(shared, delta),
        ChannelStatus::Wait => play(shared, delta),
        ChannelStatus::Ending if is_loop => stop(shared, delta),
        _ => {}
    }

    match shared.rec_status() {
        ChannelStatus::Wait => {
            shared.set_rec_status(ChannelStatus::Play);
            shared.set_read_actions(true);
        }
        ChannelStatus::Ending => {
            shared.set_rec_status(ChannelStatus::Off);
            shared.set_read_actions(false);
        }
        _ => {}
    }
}

fn on_bar(shared: &ChannelShared, delta: Frame, mode: SamplePlayerMode) {
    let status = shared.play_status();
    let repeats = matches!(mode, SamplePlayerMode::LoopRepeat | SamplePlayerMode::LoopOnceBar);

    if status == ChannelStatus::Play && repeats {
        rewind(shared, delta);
    } else if status == ChannelStatus::Wait && mode == SamplePlayerMode::LoopOnceBar {
        play(shared, delta);
    }
}

fn on_rewind(shared: &ChannelShared, delta: Frame, mode: SamplePlayerMode) {
    if mode.is_loop() && shared.play_status().is_playing() {
        rewind(shared, delta);
    }
}

fn parse_actions(
    id: ChannelId,
    shared: &ChannelShared,
    actions: &[Action],
    delta: Frame,
    mode: SamplePlayerMode,
    velocity_as_volume: bool,
) {
    if mode.is_loop() || !shared.is_reading_actions() {
        return;
    }

    for action in actions.iter().filter(|a| a.channel_id == id) {
        match action.event.kind() {
            MidiKind::NoteOn => {
                if velocity_as_volume {
                    shared.set_volume_i(action.event.velocity_float());
                }
                match shared.play_status() {
                    ChannelStatus::Off => play(shared, delta),
                    ChannelStatus::Play if mode == SamplePlayerMode::SingleRetrig => rewind(shared, delta),
                    ChannelStatus::Play => stop(shared, delta),
                    _ => {}
                }
            }
            MidiKind::NoteOff if mode == SamplePlayerMode::SinglePress => stop(shared, delta),
            MidiKind::Kill => stop(shared, delta),
            _ => {}
        }
    }
}
