//! Real-time side of the transport
//!
//! The transport *settings* live in the Document ([`SequencerState`]). This
//! module is what the audio thread runs every block: it walks the block
//! frame by frame and turns the tempo grid into an ordered list of
//! [`Event`]s that channels react to.
//!
//! ## Per block
//!
//! 1. A pending immediate rewind emits REWIND at offset 0.
//! 2. Every frame of `[current, current + block)` is wrapped on the loop
//!    length: FIRST_BEAT at grid 0, BAR on bar boundaries, ACTIONS where
//!    recorded actions are due. Beat boundaries trigger metronome clicks.
//! 3. The current frame moves to the wrapped end of the block.
//! 4. The quantizer fires a deferred rewind (appended REWIND, frame reset).
//! 5. The clock follower sees the same frame range.

use basedrop::Shared;

use crate::model::{quantizer_action, Action, ActionSource, SeqStatus, SequencerState};
use crate::quantizer::Quantizer;
use crate::sync::ClockSync;
use crate::types::{Frame, StereoBuffer, StereoSample, MAX_BUFFER_SIZE};

/// Event buffer capacity; events beyond it are dropped rather than allocated
pub const MAX_EVENTS: usize = MAX_BUFFER_SIZE + 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    FirstBeat,
    Bar,
    Actions,
    Rewind,
}

/// Something that happens at a precise frame of the current block
#[derive(Clone)]
pub struct Event {
    pub kind: EventType,
    /// Position on the loop grid
    pub global_frame: Frame,
    /// Offset within the block
    pub delta: Frame,
    /// Actions due on this frame (ACTIONS only)
    pub actions: Option<Shared<Vec<Action>>>,
}

impl Event {
    fn new(kind: EventType, global_frame: Frame, delta: Frame) -> Self {
        Self {
            kind,
            global_frame,
            delta,
            actions: None,
        }
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind)
            .field("global_frame", &self.global_frame)
            .field("delta", &self.delta)
            .field("actions", &self.actions.as_ref().map(|a| a.len()))
            .finish()
    }
}

#[inline]
fn push_event(events: &mut Vec<Event>, event: Event) {
    if events.len() < events.capacity() {
        events.push(event);
    }
}

// ────────────────────────────────────────────────────────────────
// Metronome
// ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Click {
    Beat,
    Bar,
}

const BEAT_CLICK_HZ: f32 = 1000.0;
const BAR_CLICK_HZ: f32 = 1500.0;
const CLICK_GAIN: f32 = 0.5;

/// Short decaying sine clicks mixed into the output
pub struct Metronome {
    beat: Vec<f32>,
    bar: Vec<f32>,
    click: Click,
    rendering: bool,
    offset: Frame,
    tracker: usize,
}

impl Metronome {
    pub fn new(sample_rate: u32) -> Self {
        // 10 ms per click
        let len = (sample_rate as usize / 100).max(1);
        let make = |hz: f32| -> Vec<f32> {
            (0..len)
                .map(|i| {
                    let t = i as f32 / sample_rate as f32;
                    let decay = 1.0 - i as f32 / len as f32;
                    (t * hz * std::f32::consts::TAU).sin() * decay * CLICK_GAIN
                })
                .collect()
        };

        Self {
            beat: make(BEAT_CLICK_HZ),
            bar: make(BAR_CLICK_HZ),
            click: Click::Beat,
            rendering: false,
            offset: 0,
            tracker: 0,
        }
    }

    /// Start a click at `offset` in the current block
    pub fn trigger(&mut self, click: Click, offset: Frame) {
        self.click = click;
        self.rendering = true;
        self.offset = offset;
        self.tracker = 0;
    }

    pub fn is_rendering(&self) -> bool {
        self.rendering
    }

    /// Mix the pending click into `out`, continuing into the next block if
    /// it does not fit
    pub fn render(&mut self, out: &mut StereoBuffer) {
        let data = match self.click {
            Click::Beat => &self.beat,
            Click::Bar => &self.bar,
        };

        let mut frame = self.offset;
        while self.rendering && frame < out.len() {
            out[frame] += StereoSample::mono(data[self.tracker]);
            self.tracker += 1;
            if self.tracker >= data.len() {
                self.rendering = false;
                self.tracker = 0;
            }
            frame += 1;
        }
        self.offset = 0;
    }
}

// ────────────────────────────────────────────────────────────────
// Sequencer
// ────────────────────────────────────────────────────────────────

/// Audio-thread transport runner
pub struct Sequencer {
    events: Vec<Event>,
    quantizer: Quantizer,
    metronome: Metronome,
    clock: Box<dyn ClockSync>,
    rewind_pending: bool,
    last_status: SeqStatus,
}

impl Sequencer {
    pub fn new(sample_rate: u32, clock: Box<dyn ClockSync>) -> Self {
        Self {
            events: Vec::with_capacity(MAX_EVENTS),
            quantizer: Quantizer::new(),
            metronome: Metronome::new(sample_rate),
            clock,
            rewind_pending: false,
            last_status: SeqStatus::Stopped,
        }
    }

    /// Events produced by the last `advance`
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Forward transport status changes to the clock follower
    pub fn sync_status(&mut self, status: SeqStatus) {
        if status != self.last_status {
            self.last_status = status;
            self.clock.on_status(status);
        }
    }

    /// Rewind now, or at the next quantize boundary when quantizing
    pub fn raw_rewind(&mut self, state: &SequencerState) {
        if state.can_quantize() {
            self.quantizer.trigger(quantizer_action::REWIND);
            return;
        }
        self.rewind_now(state);
    }

    /// Rewind to frame 0 regardless of quantization
    pub fn rewind_now(&mut self, state: &SequencerState) {
        self.quantizer.clear();
        state.shared.set_current_frame(0);
        self.clock.on_rewind();
        if state.is_running() {
            self.rewind_pending = true;
        }
    }

    /// Jump to a frame (wrapped on the loop length)
    pub fn set_frame(&mut self, state: &SequencerState, frame: Frame) {
        state.shared.set_current_frame(frame % state.frames_in_loop.max(1));
    }

    /// Build the event list for the next `block_size` frames
    pub fn advance(&mut self, state: &SequencerState, block_size: usize, actions: &impl ActionSource) {
        self.events.clear();

        if std::mem::take(&mut self.rewind_pending) {
            push_event(&mut self.events, Event::new(EventType::Rewind, 0, 0));
        }

        let frames_in_loop = state.frames_in_loop.max(1);
        let frames_in_bar = state.frames_in_bar.max(1);
        let frames_in_beat = state.frames_in_beat.max(1);

        let start = state.current_frame();
        let end = start + block_size;

        for (local, i) in (start..end).enumerate() {
            let global = i % frames_in_loop;

            if global == 0 {
                push_event(&mut self.events, Event::new(EventType::FirstBeat, global, local));
                self.metronome.trigger(Click::Beat, local);
            } else if global % frames_in_bar == 0 {
                push_event(&mut self.events, Event::new(EventType::Bar, global, local));
                self.metronome.trigger(Click::Bar, local);
            } else if global % frames_in_beat == 0 {
                self.metronome.trigger(Click::Beat, local);
            }

            if let Some(due) = actions.actions_on_frame(global) {
                let mut event = Event::new(EventType::Actions, global, local);
                event.actions = Some(due.clone());
                push_event(&mut self.events, event);
            }
        }

        state.shared.set_current_frame(end % frames_in_loop);

        let events = &mut self.events;
        let clock = &mut self.clock;
        self.quantizer.advance(start..end, state.quantizer_grid(), |action, delta| {
            if action == quantizer_action::REWIND {
                state.shared.set_current_frame(0);
                push_event(events, Event::new(EventType::Rewind, 0, delta));
                clock.on_rewind();
            }
        });

        self.clock.advance(start..end, frames_in_beat);
    }

    /// Mix metronome clicks into the output
    pub fn render(&mut self, out: &mut StereoBuffer, metronome_on: bool) {
        if metronome_on {
            self.metronome.render(out);
        }
    }
}
