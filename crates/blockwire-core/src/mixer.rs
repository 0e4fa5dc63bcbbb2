//! Pull-style audio sources and a mixer that sums them.

use crate::buffer::SampleBuffer;
use crate::sample::Sample;
use crate::types::SampleRate;

/// The region of a buffer an [`AudioSource`] must fill.
#[derive(Debug)]
pub struct SourceChannelInfo<'i, 'a, S: Sample = f32> {
    /// Destination buffer.
    pub buffer: &'i mut SampleBuffer<'a, S>,
    /// First frame to write.
    pub start_frame: usize,
    /// Number of frames to write.
    pub num_frames: usize,
}

impl<S: Sample> SourceChannelInfo<'_, '_, S> {
    /// Zero the region in every channel.
    #[inline]
    pub fn clear_active_region(&mut self) {
        self.buffer.clear_range(self.start_frame, self.num_frames);
    }
}

/// Something that produces consecutive blocks of audio on request.
///
/// The lifecycle mirrors a processor's: `prepare_to_play` before the first
/// block, `release_resources` once playback stops.
pub trait AudioSource<S: Sample = f32>: Send {
    /// Called before playback with the expected block size and sample rate.
    fn prepare_to_play(&mut self, block_size: usize, sample_rate: SampleRate);

    /// Called when playback stops. Free anything allocated in `prepare_to_play`.
    fn release_resources(&mut self);

    /// Fill `info.num_frames` frames of `info.buffer` from `info.start_frame`.
    fn next_block(&mut self, info: &mut SourceChannelInfo<'_, '_, S>);
}

/// Handle identifying an input of a [`MixerSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

/// Sums any number of [`AudioSource`]s into one stream.
///
/// The first input renders straight into the destination. Every further
/// input renders into an internal buffer that is then added. With no inputs
/// the destination region is cleared.
pub struct MixerSource<S: Sample = f32> {
    inputs: Vec<(SourceId, Box<dyn AudioSource<S>>)>,
    temp: SampleBuffer<'static, S>,
    next_id: u64,
    sample_rate: SampleRate,
    block_size: usize,
}

impl<S: Sample> MixerSource<S> {
    /// Create a mixer with no inputs.
    pub fn new() -> Self {
        Self {
            inputs: Vec::new(),
            temp: SampleBuffer::default(),
            next_id: 0,
            sample_rate: 0.0,
            block_size: 0,
        }
    }

    /// Number of inputs.
    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// Add an input. If the mixer is already prepared, the input is prepared
    /// before it is added.
    pub fn add_input(&mut self, mut source: Box<dyn AudioSource<S>>) -> SourceId {
        if self.sample_rate > 0.0 {
            source.prepare_to_play(self.block_size, self.sample_rate);
        }
        let id = SourceId(self.next_id);
        self.next_id += 1;
        self.inputs.push((id, source));
        id
    }

    /// Remove an input, release its resources and hand it back.
    pub fn remove_input(&mut self, id: SourceId) -> Option<Box<dyn AudioSource<S>>> {
        let index = self.inputs.iter().position(|(input_id, _)| *input_id == id)?;
        let (_, mut source) = self.inputs.remove(index);
        source.release_resources();
        Some(source)
    }

    /// Remove every input without releasing them and hand them back.
    pub fn remove_all_inputs(&mut self) -> Vec<Box<dyn AudioSource<S>>> {
        self.inputs.drain(..).map(|(_, source)| source).collect()
    }
}

impl<S: Sample> Default for MixerSource<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Sample> AudioSource<S> for MixerSource<S> {
    fn prepare_to_play(&mut self, block_size: usize, sample_rate: SampleRate) {
        if let Err(err) = self.temp.set_size(2, block_size, false, false, false) {
            log::warn!("Mixer could not pre-size its buffer: {}", err);
            self.temp = SampleBuffer::default();
        }
        self.sample_rate = sample_rate;
        self.block_size = block_size;
        for (_, input) in self.inputs.iter_mut().rev() {
            input.prepare_to_play(block_size, sample_rate);
        }
    }

    fn release_resources(&mut self) {
        for (_, input) in self.inputs.iter_mut().rev() {
            input.release_resources();
        }
        self.temp = SampleBuffer::default();
        self.sample_rate = 0.0;
        self.block_size = 0;
    }

    fn next_block(&mut self, info: &mut SourceChannelInfo<'_, '_, S>) {
        let Self { inputs, temp, .. } = self;
        let Some(((_, first), rest)) = inputs.split_first_mut() else {
            info.clear_active_region();
            return;
        };

        first.next_block(info);
        if rest.is_empty() {
            return;
        }

        let channels = info.buffer.num_channels();
        if temp
            .set_size(channels.max(1), info.buffer.num_frames(), false, false, true)
            .is_err()
        {
            return;
        }

        for (_, input) in rest {
            let mut temp_info = SourceChannelInfo {
                buffer: &mut *temp,
                start_frame: 0,
                num_frames: info.num_frames,
            };
            input.next_block(&mut temp_info);
            for ch in 0..channels {
                info.buffer
                    .add_from(ch, info.start_frame, temp, ch, 0, info.num_frames, S::ONE);
            }
        }
    }
}
