//! Sample channel reactions to user input (control thread)
//!
//! Key press/release/kill and sequencer stop only flip the atomic play
//! status and queue render commands; the sample player applies them at the
//! right offset of the next block.

use crate::model::{quantizer_action, ChannelShared, ChannelStatus, RenderCommand, RenderMode, SamplePlayerMode};
use crate::types::MAX_VELOCITY;

pub(crate) fn play(shared: &ChannelShared, offset: usize) {
    shared.set_play_status(ChannelStatus::Play);
    shared.push_render(RenderCommand::new(RenderMode::Normal, offset));
}

pub(crate) fn rewind(shared: &ChannelShared, offset: usize) {
    shared.push_render(RenderCommand::new(RenderMode::Rewind, offset));
}

pub(crate) fn stop(shared: &ChannelShared, offset: usize) {
    shared.push_render(RenderCommand::new(RenderMode::Stop, offset));
}

fn press_while_off(shared: &ChannelShared, velocity: u8, can_quantize: bool, velocity_as_volume: bool) -> ChannelStatus {
    if velocity_as_volume {
        shared.set_volume_i(velocity.min(MAX_VELOCITY) as f32 / MAX_VELOCITY as f32);
    }

    match shared.quantizer() {
        Some(quantizer) if can_quantize => {
            quantizer.trigger(quantizer_action::PLAY);
            ChannelStatus::Off
        }
        _ => {
            play(shared, 0);
            ChannelStatus::Play
        }
    }
}

fn press_while_play(shared: &ChannelShared, mode: SamplePlayerMode, can_quantize: bool) -> ChannelStatus {
    match mode {
        SamplePlayerMode::SingleRetrig => {
            match shared.quantizer() {
                Some(quantizer) if can_quantize => quantizer.trigger(quantizer_action::REWIND),
                _ => rewind(shared, 0),
            }
            ChannelStatus::Play
        }
        SamplePlayerMode::SingleEndless => ChannelStatus::Ending,
        SamplePlayerMode::SingleBasic => {
            // The player flips the status once it processes the stop
            stop(shared, 0);
            ChannelStatus::Play
        }
        // Pause mode: the player halts in place and keeps the tracker
        _ => ChannelStatus::Off,
    }
}

/// Key (or note on) pressed
pub fn key_press(
    shared: &ChannelShared,
    mode: SamplePlayerMode,
    velocity: u8,
    can_quantize: bool,
    velocity_as_volume: bool,
) {
    let is_loop = mode.is_loop();

    let status = match shared.play_status() {
        ChannelStatus::Off if is_loop => ChannelStatus::Wait,
        ChannelStatus::Off => press_while_off(shared, velocity, can_quantize, velocity_as_volume),
        ChannelStatus::Play if is_loop => ChannelStatus::Ending,
        ChannelStatus::Play => press_while_play(shared, mode, can_quantize),
        ChannelStatus::Wait => ChannelStatus::Off,
        ChannelStatus::Ending => ChannelStatus::Play,
    };

    shared.set_play_status(status);
}

/// Key released; only meaningful in press mode
pub fn key_release(shared: &ChannelShared, mode: SamplePlayerMode) {
    if mode != SamplePlayerMode::SinglePress {
        return;
    }

    // Not playing yet: a quantized start may still be pending
    if shared.play_status() == ChannelStatus::Play {
        stop(shared, 0);
    } else if let Some(quantizer) = shared.quantizer() {
        if quantizer.has_been_triggered() {
            quantizer.clear();
        }
    }
}

/// Stop right away regardless of mode
pub fn key_kill(shared: &ChannelShared, mode: SamplePlayerMode) {
    if shared.play_status().is_playing() {
        stop(shared, 0);
    }
    if mode == SamplePlayerMode::SingleBasicPause {
        shared.set_tracker(0);
    }
}

/// The transport has been stopped
pub fn stop_by_seq(shared: &ChannelShared, mode: SamplePlayerMode, chans_stop_on_seq_halt: bool) {
    let is_loop = mode.is_loop();

    match shared.play_status() {
        // Loops waiting for the first beat would never get it
        ChannelStatus::Wait if is_loop => shared.set_play_status(ChannelStatus::Off),
        ChannelStatus::Play if chans_stop_on_seq_halt && (is_loop || shared.is_reading_actions()) => {
            stop(shared, 0)
        }
        _ => {}
    }
}
