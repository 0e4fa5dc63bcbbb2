//! Stream codec interfaces.
//!
//! Concrete file and stream formats live outside Blockwire. They plug in
//! through [`StreamReader`] and [`StreamWriter`], which is all
//! [`SampleBuffer::read_from_codec`](crate::SampleBuffer::read_from_codec) and
//! [`SampleBuffer::write_to_codec`](crate::SampleBuffer::write_to_codec) need.
//!
//! Codec I/O is never called from the audio thread.

use crate::buffer::SampleBuffer;
use crate::types::SampleRate;

/// Typed destination channels handed to a [`StreamReader`].
///
/// A reader that reports integer PCM fills the `Int` variant with full-scale
/// 32-bit samples. A floating-point reader fills the `Float` variant. `None`
/// slots are channels the caller does not want.
#[derive(Debug)]
pub enum PcmDestination<'d, 'b> {
    /// Left-justified 32-bit integer PCM.
    Int(&'d mut [Option<&'b mut [i32]>]),
    /// Floating-point samples in [-1, 1].
    Float(&'d mut [Option<&'b mut [f32]>]),
}

/// Source of sample frames from persistent or streaming storage.
pub trait StreamReader {
    /// Channels in the stream.
    fn num_channels(&self) -> usize;

    /// Sample rate of the stream.
    fn sample_rate(&self) -> SampleRate;

    /// Total frames in the stream.
    fn length_in_frames(&self) -> u64;

    /// True if the reader delivers [`PcmDestination::Float`] data.
    fn uses_floating_point_data(&self) -> bool;

    /// Read `num_frames` frames starting at `start_frame` into `dest`.
    ///
    /// When `fill_leftover_channels` is set and the stream has fewer
    /// channels than `dest` has wanted slots, the reader repeats its last
    /// channel into the remaining ones. Returns `false` if the frames could
    /// not be read.
    fn read_frames(
        &mut self,
        dest: PcmDestination<'_, '_>,
        start_frame: u64,
        num_frames: usize,
        fill_leftover_channels: bool,
    ) -> bool;
}

/// Sink for sample frames.
pub trait StreamWriter {
    /// Channels the writer expects.
    fn num_channels(&self) -> usize;

    /// Sample rate being written.
    fn sample_rate(&self) -> SampleRate;

    /// Bit depth of the encoded output.
    fn bits_per_sample(&self) -> u32;

    /// Encode `num_frames` frames of `source` starting at `start_frame`.
    ///
    /// Returns `false` if the writer could not accept them.
    fn write_from_buffer(
        &mut self,
        source: &SampleBuffer<'_, f32>,
        start_frame: usize,
        num_frames: usize,
    ) -> bool;
}

