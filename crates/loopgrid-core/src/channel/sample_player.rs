//! Sample playback into the channel buffer (audio thread)
//!
//! The player drains the channel's render queue and applies the commands in
//! ascending offset order, ties keeping queue order. Audio between two
//! command offsets is rendered with the state in effect at that point, so a
//! command queued at offset 200 takes effect exactly on frame 200 even when
//! it was queued after one at offset 300.

use std::ops::Range;

use super::sample_advancer::on_last_frame;
use crate::model::{
    ChannelShared, PlayerState, RenderCommand, RenderMode, SampleParams, SamplePlayerMode, RENDER_QUEUE_SIZE,
};
use crate::types::{Frame, StereoBuffer};
use crate::wave::Wave;

/// Where playback (re)starts: the begin trim plus the shift, inside the trims
fn start_frame(params: &SampleParams) -> Frame {
    let start = params.begin + params.shift;
    if start < params.end {
        start
    } else {
        params.begin
    }
}

struct Cursor<'a> {
    shared: &'a ChannelShared,
    params: &'a SampleParams,
    wave: &'a Wave,
    seq_running: bool,
    tracker: Frame,
}

impl Cursor<'_> {
    /// Render `range` of the block; returns early once playback stops
    fn render(&mut self, player: &mut PlayerState, out: &mut StereoBuffer, range: Range<Frame>) {
        let end = self.params.end.min(self.wave.len());
        let pitch = self.params.pitch as f64;

        // Switched off without a stop command: pause mode keeps its place
        if player.active && !self.shared.play_status().is_playing() {
            player.active = false;
            player.frac = 0.0;
            if self.params.mode != SamplePlayerMode::SingleBasicPause {
                self.tracker = start_frame(self.params);
            }
            return;
        }

        for frame in range {
            if !player.active {
                return;
            }

            if self.tracker >= end {
                on_last_frame(self.shared, self.seq_running, true, self.params.mode);
                self.tracker = start_frame(self.params);
                player.frac = 0.0;

                if !self.shared.play_status().is_playing() || self.tracker >= end {
                    player.active = false;
                    return;
                }
            }

            let sample = if player.frac == 0.0 {
                self.wave.frame(self.tracker)
            } else {
                let next = if self.tracker + 1 < end { self.tracker + 1 } else { self.tracker };
                self.wave
                    .frame(self.tracker)
                    .lerp(&self.wave.frame(next), player.frac as f32)
            };
            out[frame] = sample;

            if pitch == 1.0 {
                self.tracker += 1;
            } else {
                player.frac += pitch;
                let whole = player.frac.floor();
                self.tracker += whole as Frame;
                player.frac -= whole;
            }
        }
    }
}

/// Stable in-place sort by offset; the queue never holds more than a handful
fn sort_by_offset(commands: &mut [RenderCommand]) {
    for i in 1..commands.len() {
        let mut j = i;
        while j > 0 && commands[j - 1].offset > commands[j].offset {
            commands.swap(j - 1, j);
            j -= 1;
        }
    }
}

/// Render the channel's wave into its buffer for one block
///
/// # Safety
///
/// Must be called on the audio thread with an unlocked Document (see
/// [`ChannelShared::rt`]).
pub unsafe fn render(shared: &ChannelShared, params: &SampleParams, seq_running: bool) {
    let rt = shared.rt();
    rt.audio.fill_silence();

    let Some(wave) = params.wave.as_deref() else {
        // Nothing to play: honour stops so statuses do not hang
        while let Some(command) = shared.pop_render() {
            if command.mode == RenderMode::Stop {
                rt.player.active = false;
                on_last_frame(shared, seq_running, false, params.mode);
            }
        }
        return;
    };

    let len = rt.audio.len();
    let mut cursor = Cursor {
        shared,
        params,
        wave,
        seq_running,
        tracker: shared.tracker().clamp(params.begin, params.end.max(params.begin)),
    };

    let mut pending = [RenderCommand::new(RenderMode::Normal, 0); RENDER_QUEUE_SIZE];
    let mut count = 0;
    while count < RENDER_QUEUE_SIZE {
        let Some(command) = shared.pop_render() else { break };
        pending[count] = command;
        count += 1;
    }
    sort_by_offset(&mut pending[..count]);

    let mut rendered = 0;
    for command in &pending[..count] {
        let offset = command.offset.min(len).max(rendered);
        cursor.render(&mut rt.player, &mut rt.audio, rendered..offset);
        rendered = offset;

        match command.mode {
            RenderMode::Normal => {
                rt.player.active = true;
            }
            RenderMode::Rewind => {
                cursor.tracker = start_frame(params);
                rt.player.frac = 0.0;
            }
            RenderMode::Stop => {
                rt.player.active = false;
                rt.player.frac = 0.0;
                on_last_frame(shared, seq_running, false, params.mode);
                if params.mode != SamplePlayerMode::SingleBasicPause {
                    cursor.tracker = start_frame(params);
                }
            }
        }
    }
    cursor.render(&mut rt.player, &mut rt.audio, rendered..len);

    shared.set_tracker(cursor.tracker);
}
