//! Recorded actions
//!
//! Actions are MIDI events recorded against a grid frame. The store maps a
//! frame to the list of actions due on it; each list is a `Shared` vector so
//! the sequencer can hand it to channels without copying or allocating.

use std::collections::HashMap;

use basedrop::Shared;
use serde::{Deserialize, Serialize};

use crate::gc::gc_handle;
use crate::midi::MidiEvent;
use crate::types::{ChannelId, Frame};

/// A recorded MIDI event for one channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub channel_id: ChannelId,
    pub frame: Frame,
    pub event: MidiEvent,
}

/// Anything that can tell which actions are due on a frame
pub trait ActionSource {
    fn actions_on_frame(&self, frame: Frame) -> Option<&Shared<Vec<Action>>>;
}

/// Frame-indexed action store
#[derive(Clone, Default)]
pub struct Actions {
    by_frame: HashMap<Frame, Shared<Vec<Action>>>,
}

impl ActionSource for Actions {
    #[inline]
    fn actions_on_frame(&self, frame: Frame) -> Option<&Shared<Vec<Action>>> {
        self.by_frame.get(&frame)
    }
}

impl Actions {
    pub fn is_empty(&self) -> bool {
        self.by_frame.is_empty()
    }

    /// Total number of actions
    pub fn len(&self) -> usize {
        self.by_frame.values().map(|v| v.len()).sum()
    }

    /// Add an action at its frame
    pub fn record(&mut self, action: Action) {
        let mut list = self
            .by_frame
            .get(&action.frame)
            .map(|v| (**v).clone())
            .unwrap_or_default();
        list.push(action);
        self.by_frame.insert(action.frame, Shared::new(&gc_handle(), list));
    }

    /// Keep only the actions matching `keep`
    pub fn retain(&mut self, mut keep: impl FnMut(&Action) -> bool) {
        let frames: Vec<Frame> = self.by_frame.keys().copied().collect();
        for frame in frames {
            let Some(list) = self.by_frame.get(&frame) else {
                continue;
            };
            if list.iter().all(&mut keep) {
                continue;
            }
            let kept: Vec<Action> = list.iter().copied().filter(|a| keep(a)).collect();
            if kept.is_empty() {
                self.by_frame.remove(&frame);
            } else {
                self.by_frame.insert(frame, Shared::new(&gc_handle(), kept));
            }
        }
    }

    pub fn clear_channel(&mut self, channel_id: ChannelId) {
        self.retain(|a| a.channel_id != channel_id);
    }

    pub fn clear(&mut self) {
        self.by_frame.clear();
    }

    pub fn has_actions(&self, channel_id: ChannelId) -> bool {
        self.by_frame
            .values()
            .any(|list| list.iter().any(|a| a.channel_id == channel_id))
    }

    /// Every action, ordered by frame
    pub fn all(&self) -> Vec<Action> {
        let mut out: Vec<Action> = self.by_frame.values().flat_map(|v| v.iter().copied()).collect();
        out.sort_by_key(|a| a.frame);
        out
    }

    /// Move every action after a tempo change
    ///
    /// `ratio` is old bpm / new bpm; frames are scaled and then snapped to a
    /// multiple of `step` (when non-zero) so they stay on the grid.
    pub fn rescale(&mut self, ratio: f32, step: Frame) {
        let mut rescaled = Actions::default();
        for mut action in self.all() {
            let mut frame = (action.frame as f64 * ratio as f64).round() as Frame;
            if step > 0 {
                frame = ((frame as f64 / step as f64).round() as Frame) * step;
            }
            action.frame = frame;
            rescaled.record(action);
        }
        *self = rescaled;
    }
}

impl FromIterator<Action> for Actions {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        let mut actions = Actions::default();
        for action in iter {
            actions.record(action);
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(channel: u32, frame: Frame) -> Action {
        Action {
            channel_id: ChannelId(channel),
            frame,
            event: MidiEvent::note_on(60, 100),
        }
    }

    #[test]
    fn test_lookup_by_frame() {
        let actions: Actions = [note(4, 100), note(5, 100), note(4, 200)].into_iter().collect();
        assert_eq!(actions.len(), 3);
        assert_eq!(actions.actions_on_frame(100).map(|v| v.len()), Some(2));
        assert!(actions.actions_on_frame(150).is_none());
    }

    #[test]
    fn test_clear_channel() {
        let mut actions: Actions = [note(4, 100), note(5, 100), note(4, 200)].into_iter().collect();
        actions.clear_channel(ChannelId(4));
        assert!(!actions.has_actions(ChannelId(4)));
        assert!(actions.has_actions(ChannelId(5)));
        assert!(actions.actions_on_frame(200).is_none());
    }

    #[test]
    fn test_rescale_halves_frames() {
        let mut actions: Actions = [note(4, 1000), note(4, 2000)].into_iter().collect();
        actions.rescale(0.5, 0);
        let frames: Vec<Frame> = actions.all().iter().map(|a| a.frame).collect();
        assert_eq!(frames, vec![500, 1000]);
    }

    #[test]
    fn test_old_list_survives_record() {
        let mut actions: Actions = [note(4, 100)].into_iter().collect();
        let held = actions.actions_on_frame(100).cloned();
        actions.record(note(5, 100));
        assert_eq!(held.map(|v| v.len()), Some(1));
        assert_eq!(actions.actions_on_frame(100).map(|v| v.len()), Some(2));
    }
}
