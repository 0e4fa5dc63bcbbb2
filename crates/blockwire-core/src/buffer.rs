//! Planar multichannel sample storage.
//!
//! [`SampleBuffer`] is the audio container shared by every layer of
//! Blockwire. It either owns one contiguous allocation laid out channel after
//! channel, or borrows caller-supplied channel memory (typically host
//! pointers) without allocating.
//!
//! # Ownership
//!
//! The storage mode is explicit: [`SampleBuffer::ownership`] reports
//! [`Ownership::Owned`] or [`Ownership::Borrowed`]. A borrowed buffer never
//! frees the memory it wraps. Resizing a borrowed buffer to a different shape
//! turns it into an owned one.
//!
//! # Real-Time Safety
//!
//! Only [`SampleBuffer::new`], [`SampleBuffer::set_size`] and
//! [`SampleBuffer::clone_owned`] allocate. Wrapping external memory uses
//! fixed-size storage for the channel table. All arithmetic runs in place.
//!
//! # Preconditions
//!
//! Channel indices and frame ranges are preconditions, not runtime errors.
//! They are checked with `debug_assert!`. In release builds an out-of-range
//! channel turns the call into a no-op and an out-of-range frame span is
//! clamped to the buffer. Operations never panic on the audio thread.
//!
//! # Example
//!
//! ```ignore
//! let mut mix = SampleBuffer::<f32>::new(2, 512)?;
//! mix.clear();
//! mix.add_from_slice(0, 0, &voice_left, 0.5);
//! mix.add_from_slice(1, 0, &voice_right, 0.5);
//! mix.apply_gain_ramp(0, 0, 512, 1.0, 0.0);
//! let peak = mix.magnitude_all(0, 512);
//! ```

use std::fmt;
use std::ops::Range;

use crate::codec::{PcmDestination, StreamReader, StreamWriter};
use crate::error::{CoreError, CoreResult};
use crate::sample::Sample;
use crate::types::MAX_CHANNELS;

// =============================================================================
// Ownership
// =============================================================================

/// Whether a [`SampleBuffer`] owns its samples or references external memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Samples live in a heap allocation freed with the buffer.
    Owned,
    /// Samples live in caller memory that outlives the buffer.
    Borrowed,
}

enum Storage<'a, S: Sample> {
    /// Channel-major, `num_frames` samples per channel.
    Owned(Vec<S>),
    /// One slice per channel, each at least `num_frames` long.
    Borrowed([Option<&'a mut [S]>; MAX_CHANNELS]),
}

// =============================================================================
// SampleBuffer
// =============================================================================

/// Planar multichannel sample buffer.
///
/// # Type Parameter
///
/// `S` is the sample type, defaulting to `f32`.
///
/// # Lifetime
///
/// `'a` ties a borrowed buffer to the memory it wraps. Owned buffers can be
/// `SampleBuffer<'static, S>`.
pub struct SampleBuffer<'a, S: Sample = f32> {
    storage: Storage<'a, S>,
    num_channels: usize,
    num_frames: usize,
}

impl<S: Sample> SampleBuffer<'static, S> {
    /// Allocate an owned buffer of `num_channels` x `num_frames` zeroed samples.
    ///
    /// Fails with [`CoreError::InvalidArgument`] when `num_channels` is zero
    /// or the total size overflows.
    pub fn new(num_channels: usize, num_frames: usize) -> CoreResult<Self> {
        let total = owned_len(num_channels, num_frames)?;
        Ok(Self {
            storage: Storage::Owned(vec![S::ZERO; total]),
            num_channels,
            num_frames,
        })
    }
}

impl<'a, S: Sample> SampleBuffer<'a, S> {
    /// Wrap caller-owned channel memory given as raw pointers.
    ///
    /// Channel `i` of the buffer starts at `channels[i] + offset_frames`.
    /// Nothing is allocated and nothing is freed when the buffer drops.
    ///
    /// Fails with [`CoreError::InvalidArgument`] if no pointers are given,
    /// if more than [`MAX_CHANNELS`] are given, or if any pointer is null.
    ///
    /// # Safety
    ///
    /// Every pointer must be valid for reads and writes of
    /// `offset_frames + num_frames` samples for the whole of `'a`, and no two
    /// pointers may address overlapping memory.
    pub unsafe fn from_raw_parts(
        channels: &[*mut S],
        num_frames: usize,
        offset_frames: usize,
    ) -> CoreResult<Self> {
        check_channel_count(channels.len())?;

        let mut table: [Option<&'a mut [S]>; MAX_CHANNELS] = std::array::from_fn(|_| None);
        for (i, &ptr) in channels.iter().enumerate() {
            if ptr.is_null() {
                return Err(CoreError::InvalidArgument(format!(
                    "channel pointer {} is null",
                    i
                )));
            }
            // Safety: the caller guarantees validity and disjointness.
            table[i] = Some(unsafe {
                std::slice::from_raw_parts_mut(ptr.add(offset_frames), num_frames)
            });
        }

        Ok(Self {
            storage: Storage::Borrowed(table),
            num_channels: channels.len(),
            num_frames,
        })
    }

    /// Wrap mutable channel slices.
    ///
    /// The frame count is the length of the shortest slice.
    pub fn from_channels<I>(channels: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = &'a mut [S]>,
    {
        let mut table: [Option<&'a mut [S]>; MAX_CHANNELS] = std::array::from_fn(|_| None);
        let mut num_channels = 0;
        let mut num_frames = usize::MAX;

        for slice in channels {
            if num_channels == MAX_CHANNELS {
                return Err(CoreError::InvalidArgument(format!(
                    "more than {} channels",
                    MAX_CHANNELS
                )));
            }
            num_frames = num_frames.min(slice.len());
            table[num_channels] = Some(slice);
            num_channels += 1;
        }

        check_channel_count(num_channels)?;

        Ok(Self {
            storage: Storage::Borrowed(table),
            num_channels,
            num_frames,
        })
    }

    // =========================================================================
    // Buffer Info
    // =========================================================================

    /// Number of channels.
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Number of frames per channel.
    #[inline]
    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Storage mode of this buffer.
    #[inline]
    pub fn ownership(&self) -> Ownership {
        match self.storage {
            Storage::Owned(_) => Ownership::Owned,
            Storage::Borrowed(_) => Ownership::Borrowed,
        }
    }

    // =========================================================================
    // Channel Access
    // =========================================================================

    /// Samples of one channel.
    ///
    /// Returns an empty slice if the channel doesn't exist.
    #[inline]
    pub fn channel(&self, channel: usize) -> &[S] {
        debug_assert!(channel < self.num_channels, "channel {} out of range", channel);
        if channel >= self.num_channels {
            return &[];
        }
        let n = self.num_frames;
        match &self.storage {
            Storage::Owned(data) => &data[channel * n..(channel + 1) * n],
            Storage::Borrowed(table) => table[channel]
                .as_deref()
                .map(|ch| &ch[..n])
                .unwrap_or_default(),
        }
    }

    /// Mutable samples of one channel.
    ///
    /// Returns an empty slice if the channel doesn't exist.
    #[inline]
    pub fn channel_mut(&mut self, channel: usize) -> &mut [S] {
        debug_assert!(channel < self.num_channels, "channel {} out of range", channel);
        if channel >= self.num_channels {
            return Default::default();
        }
        let n = self.num_frames;
        match &mut self.storage {
            Storage::Owned(data) => &mut data[channel * n..(channel + 1) * n],
            Storage::Borrowed(table) => table[channel]
                .as_deref_mut()
                .map(|ch| &mut ch[..n])
                .unwrap_or_default(),
        }
    }

    /// Two distinct channels of this buffer, the first mutable.
    fn channel_pair_mut(&mut self, dest: usize, source: usize) -> Option<(&mut [S], &[S])> {
        if dest == source || dest >= self.num_channels || source >= self.num_channels {
            return None;
        }
        let n = self.num_frames;
        let (lo, hi) = (dest.min(source), dest.max(source));
        let (low, high): (&mut [S], &mut [S]) = match &mut self.storage {
            Storage::Owned(data) => {
                let (head, tail) = data.split_at_mut(hi * n);
                (&mut head[lo * n..(lo + 1) * n], &mut tail[..n])
            }
            Storage::Borrowed(table) => {
                let (head, tail) = table.split_at_mut(hi);
                (&mut head[lo].as_deref_mut()?[..n], &mut tail[0].as_deref_mut()?[..n])
            }
        };
        Some(if dest < source { (low, &*high) } else { (high, &*low) })
    }

    // =========================================================================
    // Resizing
    // =========================================================================

    /// Change the shape of the buffer.
    ///
    /// - `keep_existing`: copy the overlapping region into fresh storage.
    /// - `clear_extra`: zero the storage when it is reused in place.
    /// - `avoid_reallocating`: reuse the current allocation if it is large enough.
    ///
    /// Freshly allocated storage is always zeroed. Requesting the current
    /// shape is a no-op. Borrowed buffers become owned on any shape change.
    /// Must not be called on the audio thread.
    pub fn set_size(
        &mut self,
        num_channels: usize,
        num_frames: usize,
        keep_existing: bool,
        clear_extra: bool,
        avoid_reallocating: bool,
    ) -> CoreResult<()> {
        let total = owned_len(num_channels, num_frames)?;
        if num_channels == self.num_channels && num_frames == self.num_frames {
            return Ok(());
        }

        if keep_existing {
            let mut data = vec![S::ZERO; total];
            let frames_to_copy = num_frames.min(self.num_frames);
            for ch in 0..num_channels.min(self.num_channels) {
                let dest = ch * num_frames;
                data[dest..dest + frames_to_copy]
                    .copy_from_slice(&self.channel(ch)[..frames_to_copy]);
            }
            self.storage = Storage::Owned(data);
        } else {
            match &mut self.storage {
                Storage::Owned(data) if avoid_reallocating && data.capacity() >= total => {
                    data.resize(total, S::ZERO);
                    if clear_extra {
                        data.fill(S::ZERO);
                    }
                }
                _ => self.storage = Storage::Owned(vec![S::ZERO; total]),
            }
        }

        self.num_channels = num_channels;
        self.num_frames = num_frames;
        Ok(())
    }

    /// Deep copy into a new owned buffer.
    pub fn clone_owned(&self) -> SampleBuffer<'static, S> {
        let mut data = Vec::with_capacity(self.num_channels * self.num_frames);
        for ch in 0..self.num_channels {
            data.extend_from_slice(self.channel(ch));
        }
        SampleBuffer {
            storage: Storage::Owned(data),
            num_channels: self.num_channels,
            num_frames: self.num_frames,
        }
    }

    // =========================================================================
    // Clearing and Gain
    // =========================================================================

    /// Zero every sample.
    pub fn clear(&mut self) {
        for ch in 0..self.num_channels {
            self.channel_mut(ch).fill(S::ZERO);
        }
    }

    /// Zero `count` frames from `start` in every channel.
    pub fn clear_range(&mut self, start: usize, count: usize) {
        let range = frame_range(self.num_frames, start, count);
        for ch in 0..self.num_channels {
            self.channel_mut(ch)[range.clone()].fill(S::ZERO);
        }
    }

    /// Zero `count` frames from `start` in one channel.
    pub fn clear_channel(&mut self, channel: usize, start: usize, count: usize) {
        let range = frame_range(self.num_frames, start, count);
        if let Some(dest) = self.channel_mut(channel).get_mut(range) {
            dest.fill(S::ZERO);
        }
    }

    /// Multiply a region of one channel by `gain`.
    ///
    /// A gain of one leaves the samples untouched and a gain of zero writes
    /// exact zeros.
    pub fn apply_gain(&mut self, channel: usize, start: usize, count: usize, gain: S) {
        if gain == S::ONE {
            return;
        }
        let range = frame_range(self.num_frames, start, count);
        if let Some(dest) = self.channel_mut(channel).get_mut(range) {
            scale(dest, gain);
        }
    }

    /// Multiply a region of every channel by `gain`.
    pub fn apply_gain_all(&mut self, start: usize, count: usize, gain: S) {
        for ch in 0..self.num_channels {
            self.apply_gain(ch, start, count, gain);
        }
    }

    /// Multiply a region by a gain moving linearly from `start_gain` toward
    /// `end_gain`.
    ///
    /// The gain advances by `(end_gain - start_gain) / count` per frame, so
    /// the last frame gets one step short of `end_gain`.
    pub fn apply_gain_ramp(
        &mut self,
        channel: usize,
        start: usize,
        count: usize,
        start_gain: S,
        end_gain: S,
    ) {
        if start_gain == end_gain {
            self.apply_gain(channel, start, count, start_gain);
            return;
        }
        let range = frame_range(self.num_frames, start, count);
        let Some(dest) = self.channel_mut(channel).get_mut(range) else {
            return;
        };
        if dest.is_empty() {
            return;
        }
        let increment = (end_gain - start_gain) / S::from_f64(dest.len() as f64);
        let mut gain = start_gain;
        for s in dest {
            *s = *s * gain;
            gain = gain + increment;
        }
    }

    // =========================================================================
    // Mixing
    // =========================================================================

    /// Add `count` frames of another buffer's channel, scaled by `gain`.
    pub fn add_from(
        &mut self,
        dest_channel: usize,
        dest_start: usize,
        source: &SampleBuffer<'_, S>,
        source_channel: usize,
        source_start: usize,
        count: usize,
        gain: S,
    ) {
        let src = source.channel(source_channel);
        let range = frame_range(src.len(), source_start, count);
        self.add_from_slice(dest_channel, dest_start, &src[range], gain);
    }

    /// Add a slice of samples, scaled by `gain`, starting at `dest_start`.
    pub fn add_from_slice(&mut self, dest_channel: usize, dest_start: usize, source: &[S], gain: S) {
        if gain == S::ZERO || source.is_empty() {
            return;
        }
        let range = frame_range(self.num_frames, dest_start, source.len());
        if let Some(dest) = self.channel_mut(dest_channel).get_mut(range) {
            add_scaled(dest, source, gain);
        }
    }

    /// Add a slice of samples under a linear gain ramp.
    ///
    /// Nothing is added when both gains are zero.
    pub fn add_from_slice_with_ramp(
        &mut self,
        dest_channel: usize,
        dest_start: usize,
        source: &[S],
        start_gain: S,
        end_gain: S,
    ) {
        if start_gain == end_gain {
            self.add_from_slice(dest_channel, dest_start, source, start_gain);
            return;
        }
        if source.is_empty() {
            return;
        }
        let range = frame_range(self.num_frames, dest_start, source.len());
        let Some(dest) = self.channel_mut(dest_channel).get_mut(range) else {
            return;
        };
        let increment = (end_gain - start_gain) / S::from_f64(source.len() as f64);
        let mut gain = start_gain;
        for (d, &s) in dest.iter_mut().zip(source) {
            *d = *d + s * gain;
            gain = gain + increment;
        }
    }

    /// Add another channel of this same buffer, scaled by `gain`.
    ///
    /// The two channels must differ.
    pub fn add_from_channel(
        &mut self,
        dest_channel: usize,
        dest_start: usize,
        source_channel: usize,
        source_start: usize,
        count: usize,
        gain: S,
    ) {
        debug_assert_ne!(dest_channel, source_channel, "mixing a channel into itself");
        if gain == S::ZERO {
            return;
        }
        let n = self.num_frames;
        let Some((dest, src)) = self.channel_pair_mut(dest_channel, source_channel) else {
            return;
        };
        let src = &src[frame_range(n, source_start, count)];
        let dest = &mut dest[frame_range(n, dest_start, src.len())];
        add_scaled(dest, src, gain);
    }

    // =========================================================================
    // Copying
    // =========================================================================

    /// Overwrite with `count` frames of another buffer's channel.
    pub fn copy_from(
        &mut self,
        dest_channel: usize,
        dest_start: usize,
        source: &SampleBuffer<'_, S>,
        source_channel: usize,
        source_start: usize,
        count: usize,
    ) {
        let src = source.channel(source_channel);
        let range = frame_range(src.len(), source_start, count);
        self.copy_from_slice(dest_channel, dest_start, &src[range], S::ONE);
    }

    /// Overwrite with a slice of samples scaled by `gain`.
    ///
    /// Unity gain copies the samples bit for bit.
    pub fn copy_from_slice(&mut self, dest_channel: usize, dest_start: usize, source: &[S], gain: S) {
        if source.is_empty() {
            return;
        }
        let range = frame_range(self.num_frames, dest_start, source.len());
        if let Some(dest) = self.channel_mut(dest_channel).get_mut(range) {
            copy_scaled(dest, source, gain);
        }
    }

    /// Overwrite with a slice of samples under a linear gain ramp.
    pub fn copy_from_slice_with_ramp(
        &mut self,
        dest_channel: usize,
        dest_start: usize,
        source: &[S],
        start_gain: S,
        end_gain: S,
    ) {
        if start_gain == end_gain {
            self.copy_from_slice(dest_channel, dest_start, source, start_gain);
            return;
        }
        if source.is_empty() {
            return;
        }
        let range = frame_range(self.num_frames, dest_start, source.len());
        let Some(dest) = self.channel_mut(dest_channel).get_mut(range) else {
            return;
        };
        let increment = (end_gain - start_gain) / S::from_f64(source.len() as f64);
        let mut gain = start_gain;
        for (d, &s) in dest.iter_mut().zip(source) {
            *d = s * gain;
            gain = gain + increment;
        }
    }

    /// Overwrite one channel with another channel of this same buffer.
    pub fn copy_from_channel(
        &mut self,
        dest_channel: usize,
        dest_start: usize,
        source_channel: usize,
        source_start: usize,
        count: usize,
    ) {
        debug_assert_ne!(dest_channel, source_channel, "copying a channel onto itself");
        let n = self.num_frames;
        let Some((dest, src)) = self.channel_pair_mut(dest_channel, source_channel) else {
            return;
        };
        let src = &src[frame_range(n, source_start, count)];
        let dest = &mut dest[frame_range(n, dest_start, src.len())];
        let len = dest.len();
        dest.copy_from_slice(&src[..len]);
    }

    // =========================================================================
    // Metering
    // =========================================================================

    /// Lowest and highest sample in a region, `(0, 0)` when the region is empty.
    pub fn find_min_max(&self, channel: usize, start: usize, count: usize) -> (S, S) {
        let range = frame_range(self.num_frames, start, count);
        let data = self.channel(channel).get(range).unwrap_or_default();
        match data.split_first() {
            Some((&first, rest)) => rest
                .iter()
                .fold((first, first), |(lo, hi), &s| (lo.min(s), hi.max(s))),
            None => (S::ZERO, S::ZERO),
        }
    }

    /// Peak absolute value in a region of one channel.
    pub fn magnitude(&self, channel: usize, start: usize, count: usize) -> S {
        let (lo, hi) = self.find_min_max(channel, start, count);
        lo.abs().max(hi.abs())
    }

    /// Peak absolute value in a region across all channels.
    pub fn magnitude_all(&self, start: usize, count: usize) -> S {
        (0..self.num_channels)
            .map(|ch| self.magnitude(ch, start, count))
            .fold(S::ZERO, S::max)
    }

    /// Root-mean-square level of a region, accumulated in `f64`.
    pub fn rms_level(&self, channel: usize, start: usize, count: usize) -> S {
        let range = frame_range(self.num_frames, start, count);
        let data = self.channel(channel).get(range).unwrap_or_default();
        if data.is_empty() {
            return S::ZERO;
        }
        let sum: f64 = data.iter().map(|s| {
            let v = s.to_f64();
            v * v
        }).sum();
        S::from_f64((sum / data.len() as f64).sqrt())
    }

    /// True if both buffers have the same shape and bit-identical samples.
    pub fn has_identical_content(&self, other: &SampleBuffer<'_, S>) -> bool {
        self.num_channels == other.num_channels
            && self.num_frames == other.num_frames
            && (0..self.num_channels).all(|ch| {
                self.channel(ch)
                    .iter()
                    .zip(other.channel(ch))
                    .all(|(a, b)| a.to_f64().to_bits() == b.to_f64().to_bits())
            })
    }

    // =========================================================================
    // Codec Transfer
    // =========================================================================

    /// Read `count` frames from a stream into this buffer at `start`.
    ///
    /// Only the first two channels are filled. With `use_left == use_right`
    /// the reader's left and right channels land in channels 0 and 1 (right
    /// only when both sides are multichannel). Otherwise the selected reader
    /// side lands in channel 0. Whenever channel 1 did not receive data of its
    /// own and the buffer has more than one channel, channel 0 is duplicated
    /// into it. Integer PCM is scaled by `1 / (2^31 - 1)`.
    ///
    /// Allocates conversion storage; never call this on the audio thread.
    pub fn read_from_codec(
        &mut self,
        reader: &mut dyn StreamReader,
        start: usize,
        count: usize,
        reader_start_frame: u64,
        use_left: bool,
        use_right: bool,
    ) -> CoreResult<()> {
        let range = frame_range(self.num_frames, start, count);
        let n = range.len();
        if n == 0 {
            return Ok(());
        }

        let reader_channels = reader.num_channels();
        let targets: [Option<usize>; 2] = if use_left == use_right {
            [Some(0), (reader_channels > 1 && self.num_channels > 1).then_some(1)]
        } else if use_left || reader_channels == 1 {
            [Some(0), None]
        } else {
            [None, Some(0)]
        };
        let wanted = |slot: usize| if targets[slot].is_some() { n } else { 0 };

        let (ok, converted): (bool, [Vec<S>; 2]) = if reader.uses_floating_point_data() {
            let mut left = vec![0.0f32; wanted(0)];
            let mut right = vec![0.0f32; wanted(1)];
            let mut dest = [
                targets[0].is_some().then_some(left.as_mut_slice()),
                targets[1].is_some().then_some(right.as_mut_slice()),
            ];
            let ok = reader.read_frames(PcmDestination::Float(&mut dest), reader_start_frame, n, true);
            (ok, [left, right].map(|v| v.into_iter().map(S::from_f32).collect()))
        } else {
            let mut left = vec![0i32; wanted(0)];
            let mut right = vec![0i32; wanted(1)];
            let mut dest = [
                targets[0].is_some().then_some(left.as_mut_slice()),
                targets[1].is_some().then_some(right.as_mut_slice()),
            ];
            let ok = reader.read_frames(PcmDestination::Int(&mut dest), reader_start_frame, n, true);
            (ok, [left, right].map(|v| v.into_iter().map(S::from_pcm_i32).collect()))
        };

        if !ok {
            return Err(CoreError::Codec(format!(
                "reader failed to deliver {} frames from frame {}",
                n, reader_start_frame
            )));
        }

        for (target, data) in targets.iter().zip(&converted) {
            if let Some(ch) = *target {
                self.channel_mut(ch)[range.clone()].copy_from_slice(data);
            }
        }

        if self.num_channels > 1 && targets.iter().any(Option::is_none) {
            self.copy_from_channel(1, range.start, 0, range.start, n);
        }

        Ok(())
    }
}

impl SampleBuffer<'_, f32> {
    /// Hand `count` frames starting at `start` to a stream writer.
    pub fn write_to_codec(
        &self,
        writer: &mut dyn StreamWriter,
        start: usize,
        count: usize,
    ) -> CoreResult<()> {
        let range = frame_range(self.num_frames, start, count);
        if writer.write_from_buffer(self, range.start, range.len()) {
            Ok(())
        } else {
            Err(CoreError::Codec(format!(
                "writer rejected {} frames from frame {}",
                range.len(),
                range.start
            )))
        }
    }
}

impl<S: Sample> Default for SampleBuffer<'static, S> {
    /// One owned channel with no frames.
    fn default() -> Self {
        Self {
            storage: Storage::Owned(Vec::new()),
            num_channels: 1,
            num_frames: 0,
        }
    }
}

impl<S: Sample> fmt::Debug for SampleBuffer<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("num_channels", &self.num_channels)
            .field("num_frames", &self.num_frames)
            .field("ownership", &self.ownership())
            .finish()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn check_channel_count(num_channels: usize) -> CoreResult<()> {
    if num_channels == 0 {
        return Err(CoreError::InvalidArgument(
            "a sample buffer needs at least one channel".to_string(),
        ));
    }
    if num_channels > MAX_CHANNELS {
        return Err(CoreError::InvalidArgument(format!(
            "{} channels exceeds the limit of {}",
            num_channels, MAX_CHANNELS
        )));
    }
    Ok(())
}

fn owned_len(num_channels: usize, num_frames: usize) -> CoreResult<usize> {
    if num_channels == 0 {
        return Err(CoreError::InvalidArgument(
            "a sample buffer needs at least one channel".to_string(),
        ));
    }
    num_channels.checked_mul(num_frames).ok_or_else(|| {
        CoreError::InvalidArgument(format!(
            "{} channels x {} frames overflows",
            num_channels, num_frames
        ))
    })
}

/// Clamp `start..start + count` into `0..len`.
#[inline]
fn frame_range(len: usize, start: usize, count: usize) -> Range<usize> {
    debug_assert!(
        start.checked_add(count).is_some_and(|end| end <= len),
        "frames {}..{}+{} outside buffer of {}",
        start,
        start,
        count,
        len
    );
    let start = start.min(len);
    start..start.saturating_add(count).min(len)
}

#[inline]
fn scale<S: Sample>(dest: &mut [S], gain: S) {
    if gain == S::ZERO {
        dest.fill(S::ZERO);
    } else {
        for s in dest {
            *s = *s * gain;
        }
    }
}

#[inline]
fn add_scaled<S: Sample>(dest: &mut [S], source: &[S], gain: S) {
    if gain == S::ONE {
        for (d, &s) in dest.iter_mut().zip(source) {
            *d = *d + s;
        }
    } else {
        for (d, &s) in dest.iter_mut().zip(source) {
            *d = *d + s * gain;
        }
    }
}

#[inline]
fn copy_scaled<S: Sample>(dest: &mut [S], source: &[S], gain: S) {
    let n = dest.len().min(source.len());
    let (dest, source) = (&mut dest[..n], &source[..n]);
    if gain == S::ONE {
        dest.copy_from_slice(source);
    } else if gain == S::ZERO {
        dest.fill(S::ZERO);
    } else {
        for (d, &s) in dest.iter_mut().zip(source) {
            *d = s * gain;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_buffer(channels: usize, frames: usize) -> SampleBuffer<'static, f32> {
        let mut buffer = SampleBuffer::new(channels, frames).unwrap();
        for ch in 0..channels {
            for (i, s) in buffer.channel_mut(ch).iter_mut().enumerate() {
                *s = (ch as f32 + 1.0) * 0.01 * (i as f32 + 1.0) - 0.3;
            }
        }
        buffer
    }

    #[test]
    fn test_new_rejects_zero_channels() {
        assert!(matches!(
            SampleBuffer::<f32>::new(0, 16),
            Err(CoreError::InvalidArgument(_))
        ));
        let empty = SampleBuffer::<f32>::new(2, 0).unwrap();
        assert_eq!(empty.num_frames(), 0);
        assert!(empty.channel(1).is_empty());
    }

    #[test]
    fn test_clear_yields_silence() {
        for &(channels, frames) in &[(1, 0), (1, 7), (2, 64), (6, 33)] {
            let mut buffer = ramp_buffer(channels, frames);
            buffer.clear();
            for ch in 0..channels {
                assert!(buffer.channel(ch).iter().all(|&s| s == 0.0));
            }
        }
    }

    #[test]
    fn test_clear_range_leaves_outside_untouched() {
        let mut buffer = ramp_buffer(2, 10);
        let before = buffer.clone_owned();
        buffer.clear_range(3, 4);
        for ch in 0..2 {
            for i in 0..10 {
                let expected = if (3..7).contains(&i) { 0.0 } else { before.channel(ch)[i] };
                assert_eq!(buffer.channel(ch)[i], expected);
            }
        }
    }

    #[test]
    fn test_zero_gain_gives_zero_magnitude() {
        let mut buffer = ramp_buffer(2, 128);
        buffer.apply_gain(1, 0, 128, 0.0);
        assert_eq!(buffer.magnitude(1, 0, 128), 0.0);
        assert!(buffer.magnitude(0, 0, 128) > 0.0);
    }

    #[test]
    fn test_unity_copy_is_bit_identical() {
        let source = ramp_buffer(2, 50);
        let mut dest = SampleBuffer::<f32>::new(2, 50).unwrap();
        for ch in 0..2 {
            dest.copy_from(ch, 0, &source, ch, 0, 50);
        }
        assert!(dest.has_identical_content(&source));
    }

    #[test]
    fn test_add_from_is_linear() {
        let source = ramp_buffer(1, 40);
        let mut twice = SampleBuffer::<f32>::new(1, 40).unwrap();
        twice.add_from(0, 0, &source, 0, 0, 40, 0.3);
        twice.add_from(0, 0, &source, 0, 0, 40, 0.45);

        let mut once = SampleBuffer::<f32>::new(1, 40).unwrap();
        once.add_from(0, 0, &source, 0, 0, 40, 0.75);

        for (a, b) in twice.channel(0).iter().zip(once.channel(0)) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_flat_ramp_matches_apply_gain() {
        let mut ramped = ramp_buffer(1, 32);
        let mut plain = ramped.clone_owned();
        ramped.apply_gain_ramp(0, 0, 32, 0.6, 0.6);
        plain.apply_gain(0, 0, 32, 0.6);
        assert!(ramped.has_identical_content(&plain));
    }

    #[test]
    fn test_ramp_increment() {
        let mut buffer = SampleBuffer::<f64>::new(1, 4).unwrap();
        buffer.channel_mut(0).fill(1.0);
        buffer.apply_gain_ramp(0, 0, 4, 0.0, 1.0);
        let expected = [0.0, 0.25, 0.5, 0.75];
        for (s, e) in buffer.channel(0).iter().zip(expected) {
            assert!((s - e).abs() < 1e-12);
        }
    }

    #[test]
    fn test_copy_with_ramp_and_gain() {
        let source = [1.0f32; 4];
        let mut buffer = SampleBuffer::<f32>::new(1, 4).unwrap();
        buffer.copy_from_slice_with_ramp(0, 0, &source, 1.0, 0.0);
        assert_eq!(buffer.channel(0), &[1.0, 0.75, 0.5, 0.25]);

        buffer.copy_from_slice(0, 0, &source, 0.0);
        assert!(buffer.channel(0).iter().all(|&s| s == 0.0));

        buffer.add_from_slice_with_ramp(0, 2, &source[..2], 0.0, 1.0);
        assert_eq!(buffer.channel(0), &[0.0, 0.0, 0.0, 0.5]);
    }

    #[test]
    fn test_same_buffer_channel_mix() {
        let mut buffer = ramp_buffer(3, 16);
        let original = buffer.clone_owned();

        buffer.copy_from_channel(2, 0, 0, 0, 16);
        assert_eq!(buffer.channel(2), original.channel(0));

        buffer.add_from_channel(0, 0, 1, 0, 16, 2.0);
        for i in 0..16 {
            let expected = original.channel(0)[i] + 2.0 * original.channel(1)[i];
            assert!((buffer.channel(0)[i] - expected).abs() < 1e-6);
        }
        assert_eq!(buffer.channel(1), original.channel(1));
    }

    #[test]
    fn test_metering() {
        let mut buffer = SampleBuffer::<f32>::new(2, 4).unwrap();
        buffer.copy_from_slice(0, 0, &[0.5, -0.8, 0.25, 0.0], 1.0);
        buffer.copy_from_slice(1, 0, &[0.5, 0.5, 0.5, 0.5], 1.0);

        assert_eq!(buffer.find_min_max(0, 0, 4), (-0.8, 0.5));
        assert_eq!(buffer.find_min_max(0, 0, 0), (0.0, 0.0));
        assert!((buffer.magnitude(0, 0, 4) - 0.8).abs() < 1e-7);
        assert!((buffer.magnitude_all(0, 4) - 0.8).abs() < 1e-7);
        assert!((buffer.rms_level(1, 0, 4) - 0.5).abs() < 1e-7);
        assert_eq!(buffer.rms_level(1, 0, 0), 0.0);
    }

    #[test]
    fn test_raw_parts_reject_null() {
        let mut left = [0.0f32; 8];
        let pointers = [left.as_mut_ptr(), std::ptr::null_mut()];
        let result = unsafe { SampleBuffer::from_raw_parts(&pointers, 8, 0) };
        assert!(matches!(result, Err(CoreError::InvalidArgument(_))));

        let none: [*mut f32; 0] = [];
        assert!(unsafe { SampleBuffer::from_raw_parts(&none, 8, 0) }.is_err());
    }

    #[test]
    fn test_raw_parts_offset_writes_through() {
        let mut left = [0.0f32; 8];
        let mut right = [0.0f32; 8];
        {
            let pointers = [left.as_mut_ptr(), right.as_mut_ptr()];
            let mut view = unsafe { SampleBuffer::from_raw_parts(&pointers, 4, 2) }.unwrap();
            assert_eq!(view.ownership(), Ownership::Borrowed);
            assert_eq!(view.num_frames(), 4);
            view.channel_mut(0).fill(1.0);
            view.channel_mut(1)[3] = -1.0;
        }
        assert_eq!(left, [0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0]);
        assert_eq!(right[5], -1.0);
    }

    #[test]
    fn test_from_channels_uses_shortest() {
        let mut a = vec![1.0f64; 10];
        let mut b = vec![2.0f64; 6];
        let view = SampleBuffer::from_channels([a.as_mut_slice(), b.as_mut_slice()]).unwrap();
        assert_eq!(view.num_channels(), 2);
        assert_eq!(view.num_frames(), 6);
        assert_eq!(view.channel(1), &[2.0; 6]);
    }

    #[test]
    fn test_set_size_keeps_overlap() {
        let mut buffer = ramp_buffer(2, 8);
        let original = buffer.clone_owned();
        buffer.set_size(3, 4, true, true, false).unwrap();
        assert_eq!(buffer.num_channels(), 3);
        assert_eq!(buffer.channel(0), &original.channel(0)[..4]);
        assert_eq!(buffer.channel(1), &original.channel(1)[..4]);
        assert!(buffer.channel(2).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_set_size_reuses_allocation() {
        let mut buffer = SampleBuffer::<f32>::new(2, 256).unwrap();
        let before = buffer.channel(0).as_ptr();
        buffer.set_size(2, 64, false, true, true).unwrap();
        assert_eq!(buffer.num_frames(), 64);
        assert_eq!(buffer.channel(0).as_ptr(), before);
        assert!(buffer.channel(1).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_set_size_same_shape_is_noop() {
        let mut data = [0.5f32; 4];
        let mut view = SampleBuffer::from_channels([data.as_mut_slice()]).unwrap();
        view.set_size(1, 4, false, true, false).unwrap();
        assert_eq!(view.ownership(), Ownership::Borrowed);
        assert!(view.set_size(0, 4, false, false, false).is_err());
    }

    #[test]
    fn test_borrowed_resize_becomes_owned() {
        let mut data = [0.5f32; 4];
        {
            let mut view = SampleBuffer::from_channels([data.as_mut_slice()]).unwrap();
            view.set_size(1, 8, true, true, false).unwrap();
            assert_eq!(view.ownership(), Ownership::Owned);
            assert_eq!(&view.channel(0)[..4], &[0.5; 4]);
            view.channel_mut(0).fill(9.0);
        }
        assert_eq!(data, [0.5; 4]);
    }

    // =========================================================================
    // Codec transfer
    // =========================================================================

    struct MonoIntReader {
        frames: Vec<i32>,
        last_fill_flag: Option<bool>,
    }

    impl StreamReader for MonoIntReader {
        fn num_channels(&self) -> usize {
            1
        }

        fn sample_rate(&self) -> f64 {
            48_000.0
        }

        fn length_in_frames(&self) -> u64 {
            self.frames.len() as u64
        }

        fn uses_floating_point_data(&self) -> bool {
            false
        }

        fn read_frames(
            &mut self,
            dest: PcmDestination<'_, '_>,
            start_frame: u64,
            num_frames: usize,
            fill_leftover_channels: bool,
        ) -> bool {
            self.last_fill_flag = Some(fill_leftover_channels);
            let PcmDestination::Int(channels) = dest else {
                return false;
            };
            let start = start_frame as usize;
            let Some(src) = self.frames.get(start..start + num_frames) else {
                return false;
            };
            if let Some(left) = channels[0].as_deref_mut() {
                left.copy_from_slice(src);
            }
            true
        }
    }

    struct StereoFloatReader;

    impl StreamReader for StereoFloatReader {
        fn num_channels(&self) -> usize {
            2
        }

        fn sample_rate(&self) -> f64 {
            44_100.0
        }

        fn length_in_frames(&self) -> u64 {
            1_000
        }

        fn uses_floating_point_data(&self) -> bool {
            true
        }

        fn read_frames(
            &mut self,
            dest: PcmDestination<'_, '_>,
            _start_frame: u64,
            _num_frames: usize,
            _fill_leftover_channels: bool,
        ) -> bool {
            let PcmDestination::Float(channels) = dest else {
                return false;
            };
            for (value, slot) in [0.25f32, -0.25].into_iter().zip(channels.iter_mut()) {
                if let Some(ch) = slot.as_deref_mut() {
                    ch.fill(value);
                }
            }
            true
        }
    }

    #[test]
    fn test_read_mono_int_duplicates_into_stereo() {
        let mut reader = MonoIntReader {
            frames: vec![i32::MAX, 0x4000_0000, 0, -0x4000_0000],
            last_fill_flag: None,
        };
        let mut buffer = SampleBuffer::<f32>::new(2, 6).unwrap();
        buffer.read_from_codec(&mut reader, 1, 4, 0, true, true).unwrap();

        assert_eq!(reader.last_fill_flag, Some(true));
        let left = buffer.channel(0);
        assert_eq!(left[0], 0.0);
        assert!((left[1] - 1.0).abs() < 1e-6);
        assert!((left[2] - 0.5).abs() < 1e-6);
        assert!((left[4] + 0.5).abs() < 1e-6);
        assert_eq!(buffer.channel(1), buffer.channel(0));
    }

    #[test]
    fn test_read_right_only_lands_in_first_channel() {
        let mut buffer = SampleBuffer::<f64>::new(2, 3).unwrap();
        buffer
            .read_from_codec(&mut StereoFloatReader, 0, 3, 0, false, true)
            .unwrap();
        assert_eq!(buffer.channel(0), &[-0.25; 3]);
        assert_eq!(buffer.channel(1), &[-0.25; 3]);

        buffer
            .read_from_codec(&mut StereoFloatReader, 0, 3, 0, true, true)
            .unwrap();
        assert_eq!(buffer.channel(0), &[0.25; 3]);
        assert_eq!(buffer.channel(1), &[-0.25; 3]);
    }

    #[test]
    fn test_read_failure_is_reported() {
        let mut reader = MonoIntReader {
            frames: vec![0; 2],
            last_fill_flag: None,
        };
        let mut buffer = SampleBuffer::<f32>::new(1, 8).unwrap();
        let result = buffer.read_from_codec(&mut reader, 0, 8, 0, true, false);
        assert!(matches!(result, Err(CoreError::Codec(_))));
    }

    struct CountingWriter {
        frames_written: usize,
        peak: f32,
    }

    impl StreamWriter for CountingWriter {
        fn num_channels(&self) -> usize {
            2
        }

        fn sample_rate(&self) -> f64 {
            44_100.0
        }

        fn bits_per_sample(&self) -> u32 {
            24
        }

        fn write_from_buffer(
            &mut self,
            source: &SampleBuffer<'_, f32>,
            start_frame: usize,
            num_frames: usize,
        ) -> bool {
            self.frames_written += num_frames;
            self.peak = source.magnitude_all(start_frame, num_frames);
            true
        }
    }

    #[test]
    fn test_write_hands_range_to_writer() {
        let mut buffer = SampleBuffer::<f32>::new(2, 16).unwrap();
        buffer.channel_mut(1)[10] = -0.9;
        let mut writer = CountingWriter {
            frames_written: 0,
            peak: 0.0,
        };
        buffer.write_to_codec(&mut writer, 8, 8).unwrap();
        assert_eq!(writer.frames_written, 8);
        assert!((writer.peak - 0.9).abs() < 1e-7);
    }
}
