//! Mixer - sums channel buffers into the output and runs the master buses
//!
//! Order within a block:
//! - master in: the driver input goes through the master-in plugin stack
//!   (the result is what armed channels monitor and input takes record)
//! - normal channels: audible ones are summed with volume and pan
//! - input to output, when enabled
//! - master out: plugin stack, then master volume and pan
//! - preview: summed last so it is never affected by the master bus

use crate::model::{Channel, Document, InputRecMode, Peak};
use crate::plugin::PluginHost;
use crate::types::{pan_gains, ChannelId, Frame, StereoBuffer, MAX_BUFFER_SIZE};

/// Per-side gains for a channel (fader, velocity volume and pan)
pub fn channel_gains(channel: &Channel) -> (f32, f32) {
    let gain = channel.volume * channel.shared.volume_i();
    let (left, right) = pan_gains(channel.pan);
    (gain * left, gain * right)
}

/// Per-side absolute peak of a buffer
pub fn buffer_peak(buffer: &StereoBuffer) -> Peak {
    buffer.iter().fold(Peak::default(), |peak, s| Peak {
        left: peak.left.max(s.left.abs()),
        right: peak.right.max(s.right.abs()),
    })
}

/// Main mixer; owns the pre-allocated master-in buffer
pub struct Mixer {
    input: StereoBuffer,
}

impl Mixer {
    pub fn new() -> Self {
        Self {
            input: StereoBuffer::silence(MAX_BUFFER_SIZE),
        }
    }

    /// Input as processed by the master-in bus this block
    pub fn input(&self) -> &StereoBuffer {
        &self.input
    }

    /// Copy the driver input and run the master-in plugin stack on it
    pub fn process_input(&mut self, doc: &Document, input: &StereoBuffer, host: &mut dyn PluginHost) {
        self.input.copy_from(input);
        if let Some(master_in) = doc.channel(ChannelId::MASTER_IN) {
            if !master_in.plugins.is_empty() {
                host.process_stack(&mut self.input, &master_in.plugins, &[]);
            }
        }
    }

    /// Write the processed input into the input take
    ///
    /// `start` is the loop frame the block started on.
    ///
    /// # Safety
    ///
    /// Audio thread only, with an unlocked Document.
    pub unsafe fn record_input(&self, doc: &Document, start: Frame, frames: usize) {
        let capture = &doc.mixer.shared.input;
        match doc.mixer.input_rec_mode {
            InputRecMode::Rigid => capture.write_rigid(&self.input, frames, start, doc.sequencer.frames_in_loop),
            InputRecMode::Free => capture.write_free(&self.input, frames),
        }
    }

    /// Mix every channel rendered this block into `out`
    ///
    /// # Safety
    ///
    /// Audio thread only, after the channels have rendered (reads each
    /// channel's real-time buffer).
    pub unsafe fn mix(&mut self, doc: &Document, out: &mut StereoBuffer, host: &mut dyn PluginHost) {
        let has_solos = doc.mixer.has_solos;

        for channel in doc.channels.iter().filter(|c| !c.is_internal()) {
            if !channel.is_audible(has_solos) {
                continue;
            }
            let (left, right) = channel_gains(channel);
            out.add_scaled(&channel.shared.rt().audio, left, right);
        }

        if doc.mixer.in_to_out {
            if let Some(master_in) = doc.channel(ChannelId::MASTER_IN) {
                let (left, right) = channel_gains(master_in);
                out.add_scaled(&self.input, left, right);
            }
        }

        if let Some(master_out) = doc.channel(ChannelId::MASTER_OUT) {
            if !master_out.plugins.is_empty() {
                host.process_stack(out, &master_out.plugins, &[]);
            }
            let (left, right) = channel_gains(master_out);
            for sample in out.iter_mut() {
                sample.left *= left;
                sample.right *= right;
            }
        }

        if let Some(preview) = doc.channel(ChannelId::PREVIEW) {
            if preview.has_wave() {
                let (left, right) = channel_gains(preview);
                out.add_scaled(&preview.shared.rt().audio, left, right);
            }
        }
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChannelKind, ChannelShared, Model, SampleParams};
    use crate::plugin::NullPluginHost;
    use crate::types::StereoSample;

    const BLOCK: usize = 4;

    /// Model with two sample channels whose buffers hold 1.0 and 2.0
    fn model() -> Model {
        let mut model = Model::new(48000, BLOCK);
        for (id, value) in [(ChannelId(4), 1.0), (ChannelId(5), 2.0)] {
            let shared = model.add_channel_shared(ChannelShared::with_buffer_size(id, true, BLOCK));
            unsafe {
                shared.rt().audio.as_mut_slice().fill(StereoSample::mono(value));
            }
            let channel = Channel::new(id, ChannelKind::Sample(SampleParams::default()), shared);
            model.get_mut().channels.push(channel);
        }
        model
    }

    fn mix(model: &Model) -> StereoBuffer {
        let mut out = StereoBuffer::silence(BLOCK);
        let mut mixer = Mixer::new();
        unsafe { mixer.mix(model.get(), &mut out, &mut NullPluginHost) };
        out
    }

    #[test]
    fn test_sums_audible_channels() {
        let model = model();
        assert_eq!(mix(&model)[0], StereoSample::mono(3.0));
    }

    #[test]
    fn test_solo_and_mute() {
        let mut model = model();
        model.get_mut().channel_mut(ChannelId(5)).unwrap().solo = true;
        model.get_mut().update_solos();
        assert_eq!(mix(&model)[0], StereoSample::mono(2.0));

        model.get_mut().channel_mut(ChannelId(5)).unwrap().mute = true;
        assert_eq!(mix(&model)[0], StereoSample::mono(0.0));
    }

    #[test]
    fn test_pan_and_master_volume() {
        let mut model = model();
        model.get_mut().channel_mut(ChannelId(4)).unwrap().pan = 0.0;
        model.get_mut().channel_mut(ChannelId(5)).unwrap().mute = true;
        model.get_mut().channel_mut(ChannelId::MASTER_OUT).unwrap().volume = 0.5;

        let out = mix(&model);
        assert_eq!(out[0], StereoSample::new(0.5, 0.0));
    }

    #[test]
    fn test_input_to_output() {
        let mut model = model();
        for id in [ChannelId(4), ChannelId(5)] {
            model.get_mut().channel_mut(id).unwrap().mute = true;
        }
        let input = StereoBuffer::from_vec(vec![StereoSample::mono(0.25); BLOCK]);

        let mut mixer = Mixer::new();
        mixer.process_input(model.get(), &input, &mut NullPluginHost);
        assert_eq!(mixer.input().len(), BLOCK);

        let mut out = StereoBuffer::silence(BLOCK);
        unsafe { mixer.mix(model.get(), &mut out, &mut NullPluginHost) };
        assert_eq!(out[0], StereoSample::mono(0.0));

        model.get_mut().mixer.in_to_out = true;
        unsafe { mixer.mix(model.get(), &mut out, &mut NullPluginHost) };
        assert_eq!(out[0], StereoSample::mono(0.25));
    }

    #[test]
    fn test_buffer_peak() {
        let buffer = StereoBuffer::from_vec(vec![StereoSample::new(-0.8, 0.1), StereoSample::new(0.3, 0.6)]);
        let peak = buffer_peak(&buffer);
        assert_eq!(peak.left, 0.8);
        assert_eq!(peak.right, 0.6);
    }
}
