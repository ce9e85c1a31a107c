//! Audio-thread block renderer - ties together sequencer, channels and mixer
//!
//! The driver calls [`Renderer::render`] once per block. Nothing here
//! allocates, locks or logs: the Document is read through the swapper,
//! transport jumps arrive on the command ring buffer and every buffer is
//! pre-allocated to [`MAX_BUFFER_SIZE`].

use crate::channel;
use crate::command::EngineCommand;
use crate::midi::MidiOutput;
use crate::mixer::{buffer_peak, Mixer};
use crate::model::{Document, ModelReader, Peak, SeqStatus};
use crate::plugin::PluginHost;
use crate::sequencer::Sequencer;
use crate::sync::ClockSync;
use crate::types::{StereoBuffer, MAX_BUFFER_SIZE};

/// Real-time half of the engine
///
/// Created together with its [`crate::Engine`]; move it into the audio
/// callback.
pub struct Renderer {
    reader: ModelReader,
    commands: rtrb::Consumer<EngineCommand>,
    sequencer: Sequencer,
    mixer: Mixer,
    plugin_host: Box<dyn PluginHost>,
    midi_output: Box<dyn MidiOutput>,
}

impl Renderer {
    pub(crate) fn new(
        reader: ModelReader,
        commands: rtrb::Consumer<EngineCommand>,
        sample_rate: u32,
        clock: Box<dyn ClockSync>,
        plugin_host: Box<dyn PluginHost>,
        midi_output: Box<dyn MidiOutput>,
    ) -> Self {
        Self {
            reader,
            commands,
            sequencer: Sequencer::new(sample_rate, clock),
            mixer: Mixer::new(),
            plugin_host,
            midi_output,
        }
    }

    /// Render one block
    ///
    /// `out` is overwritten; its length is the block size and must not
    /// exceed [`MAX_BUFFER_SIZE`]. `input` is the driver input for the same
    /// block (silence when there is none).
    pub fn render(&mut self, out: &mut StereoBuffer, input: &StereoBuffer) {
        let doc = self.reader.get_rt();
        let block_len = out.len().min(MAX_BUFFER_SIZE);
        out.fill_silence();

        while let Ok(command) = self.commands.pop() {
            match command {
                EngineCommand::Rewind => self.sequencer.raw_rewind(&doc.sequencer),
                EngineCommand::RewindNow => self.sequencer.rewind_now(&doc.sequencer),
                EngineCommand::SetFrame { frame } => self.sequencer.set_frame(&doc.sequencer, frame),
            }
        }

        let peak_in = buffer_peak(input);
        doc.mixer.shared.store_in(peak_in);

        if doc.locked {
            doc.mixer.shared.store_out(Peak::default());
            return;
        }

        let status = transport_status(&doc, peak_in);
        self.sequencer.sync_status(status);
        let seq_running = status == SeqStatus::Running;
        let start = doc.sequencer.current_frame();

        if seq_running {
            self.sequencer.advance(&doc.sequencer, block_len, &*doc.actions);
            self.sequencer.render(out, doc.sequencer.metronome);

            let grid = doc.sequencer.quantizer_grid();
            for ch in &doc.channels {
                channel::advance(ch, self.sequencer.events(), start..start + block_len, grid, &mut *self.midi_output);
            }
        }

        self.mixer.process_input(&doc, input, &mut *self.plugin_host);
        if seq_running && doc.mixer.recording_input {
            // SAFETY: audio thread, Document not locked
            unsafe { self.mixer.record_input(&doc, start, block_len) };
        }

        // SAFETY: audio thread, Document not locked: no control-side code
        // touches the channels' real-time cells until we release `doc`.
        unsafe {
            for ch in &doc.channels {
                channel::render(
                    ch,
                    self.mixer.input(),
                    block_len,
                    seq_running,
                    &mut *self.plugin_host,
                    &mut *self.midi_output,
                );
            }
            self.mixer.mix(&doc, out, &mut *self.plugin_host);
        }

        doc.mixer.shared.store_out(buffer_peak(out));
    }
}

/// Transport status for this block
///
/// An input take armed in signal mode starts the transport on the block
/// where the input reaches the trigger level, before the control thread
/// gets to publish `Running`.
fn transport_status(doc: &Document, peak_in: Peak) -> SeqStatus {
    let status = doc.sequencer.status;
    if status != SeqStatus::Waiting || !doc.mixer.recording_input {
        return status;
    }

    let capture = &doc.mixer.shared.input;
    if !capture.is_signalled() && peak_in.left.max(peak_in.right) >= doc.mixer.rec_trigger_gain() {
        capture.set_signalled();
    }
    if capture.is_signalled() {
        SeqStatus::Running
    } else {
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::command_channel;
    use crate::gc::gc_handle;
    use crate::midi::NullMidiOutput;
    use crate::model::{Channel, ChannelKind, ChannelShared, ChannelStatus, Model, SampleParams, SamplePlayerMode, SwapType};
    use crate::plugin::NullPluginHost;
    use crate::sync::NoClockSync;
    use crate::types::{ChannelId, StereoSample, WaveId};
    use crate::wave::Wave;
    use basedrop::Shared;

    const BLOCK: usize = 64;

    fn setup() -> (Model, Renderer, rtrb::Producer<EngineCommand>) {
        let model = Model::new(48000, BLOCK);
        let (tx, rx) = command_channel();
        let renderer = Renderer::new(
            model.reader(),
            rx,
            48000,
            Box::new(NoClockSync),
            Box::new(NullPluginHost),
            Box::new(NullMidiOutput),
        );
        (model, renderer, tx)
    }

    fn add_sample_channel(model: &mut Model, id: ChannelId, mode: SamplePlayerMode) {
        let shared = model.add_channel_shared(ChannelShared::with_buffer_size(id, true, BLOCK));
        let mut params = SampleParams {
            mode,
            ..SampleParams::default()
        };
        let wave = Wave::new(WaveId(1), "dc.wav", 48000, StereoBuffer::from_vec(vec![StereoSample::mono(0.5); 1000]));
        params.set_wave(Some(Shared::new(&gc_handle(), wave)));
        model.get_mut().channels.push(Channel::new(id, ChannelKind::Sample(params), shared));
        model.swap(SwapType::Hard);
    }

    fn block() -> (StereoBuffer, StereoBuffer) {
        (StereoBuffer::silence(BLOCK), StereoBuffer::silence(BLOCK))
    }

    #[test]
    fn test_stopped_and_empty_is_silent() {
        let (_model, mut renderer, _tx) = setup();
        let (mut out, input) = block();
        out.as_mut_slice().fill(StereoSample::mono(1.0));

        renderer.render(&mut out, &input);
        assert_eq!(out.peak(), 0.0);
    }

    #[test]
    fn test_one_shot_plays_without_transport() {
        let (mut model, mut renderer, _tx) = setup();
        add_sample_channel(&mut model, ChannelId(4), SamplePlayerMode::SingleBasic);
        channel::key_press(model.get().channel(ChannelId(4)).unwrap(), 127, false);

        let (mut out, input) = block();
        renderer.render(&mut out, &input);

        assert_eq!(out[0], StereoSample::mono(0.5));
        assert_eq!(model.get().mixer.shared.peak_out().left, 0.5);
    }

    #[test]
    fn test_locked_document_renders_silence() {
        let (mut model, mut renderer, _tx) = setup();
        add_sample_channel(&mut model, ChannelId(4), SamplePlayerMode::SingleBasic);
        channel::key_press(model.get().channel(ChannelId(4)).unwrap(), 127, false);

        model.get_mut().locked = true;
        model.swap(SwapType::None);

        let (mut out, input) = block();
        renderer.render(&mut out, &input);
        assert_eq!(out.peak(), 0.0);

        // the play command is still queued for when the lock goes away
        let shared = model.find_channel_shared(ChannelId(4)).unwrap();
        assert_eq!(shared.play_status(), ChannelStatus::Play);
        assert_eq!(shared.tracker(), 0);

        model.get_mut().locked = false;
        model.swap(SwapType::None);
        renderer.render(&mut out, &input);
        assert_eq!(out[0], StereoSample::mono(0.5));
    }

    #[test]
    fn test_running_transport_advances_and_starts_loops() {
        let (mut model, mut renderer, _tx) = setup();
        add_sample_channel(&mut model, ChannelId(4), SamplePlayerMode::LoopBasic);
        model.get_mut().sequencer.status = SeqStatus::Running;
        model.swap(SwapType::Soft);

        channel::key_press(model.get().channel(ChannelId(4)).unwrap(), 127, false);
        let shared = model.find_channel_shared(ChannelId(4)).unwrap();
        assert_eq!(shared.play_status(), ChannelStatus::Wait);

        // frame 0 is the first beat: the loop starts right away
        let (mut out, input) = block();
        renderer.render(&mut out, &input);
        assert_eq!(shared.play_status(), ChannelStatus::Play);
        assert_eq!(model.get().sequencer.current_frame(), BLOCK);
        assert_eq!(out[0], StereoSample::mono(0.5));
    }

    #[test]
    fn test_commands_move_the_transport() {
        let (mut model, mut renderer, mut tx) = setup();
        model.get_mut().sequencer.status = SeqStatus::Running;
        model.swap(SwapType::Soft);

        tx.push(EngineCommand::SetFrame { frame: 1000 }).unwrap();
        let (mut out, input) = block();
        renderer.render(&mut out, &input);
        assert_eq!(model.get().sequencer.current_frame(), 1000 + BLOCK);

        tx.push(EngineCommand::RewindNow).unwrap();
        renderer.render(&mut out, &input);
        assert_eq!(model.get().sequencer.current_frame(), BLOCK);
    }

    #[test]
    fn test_input_is_metered() {
        let (model, mut renderer, _tx) = setup();
        let mut out = StereoBuffer::silence(BLOCK);
        let input = StereoBuffer::from_vec(vec![StereoSample::new(0.2, 0.4); BLOCK]);

        renderer.render(&mut out, &input);
        let peak = model.get().mixer.shared.peak_in();
        assert_eq!(peak.left, 0.2);
        assert_eq!(peak.right, 0.4);
        assert_eq!(out.peak(), 0.0);
    }
}
