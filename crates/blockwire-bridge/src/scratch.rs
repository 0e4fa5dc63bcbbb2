//! Pre-allocated scratch channels.
//!
//! The bridge renders into scratch memory whenever it cannot write to a host
//! pointer directly: an output pointer shared with an earlier output, an
//! input channel without a matching output, or the saved output of an
//! accumulating process call.
//!
//! # Real-Time Safety
//!
//! - `allocate()` and `free()` run on resume and suspend (non-real-time)
//! - Channel access during processing never allocates
//! - Channels are sized `block_size * scratch_block_factor` so hosts that
//!   slightly overrun their announced block size still fit

/// Fixed set of equally sized `f32` channels in one allocation.
#[derive(Debug, Default)]
pub struct ScratchChannels {
    data: Vec<f32>,
    num_channels: usize,
    channel_len: usize,
}

impl ScratchChannels {
    /// Create empty storage. Nothing is allocated.
    pub const fn new() -> Self {
        Self {
            data: Vec::new(),
            num_channels: 0,
            channel_len: 0,
        }
    }

    /// Replace the storage with `num_channels` zeroed channels of
    /// `channel_len` frames.
    pub fn allocate(&mut self, num_channels: usize, channel_len: usize) {
        self.data = vec![0.0; num_channels * channel_len];
        self.num_channels = num_channels;
        self.channel_len = channel_len;
    }

    /// Release the storage.
    pub fn free(&mut self) {
        self.data = Vec::new();
        self.num_channels = 0;
        self.channel_len = 0;
    }

    /// Number of channels.
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Frames per channel.
    #[inline]
    pub fn channel_len(&self) -> usize {
        self.channel_len
    }

    /// True if `num_frames` fit in every channel.
    #[inline]
    pub fn fits(&self, num_frames: usize) -> bool {
        num_frames <= self.channel_len
    }

    /// Samples of one channel, empty if it doesn't exist.
    #[inline]
    pub fn channel(&self, channel: usize) -> &[f32] {
        if channel >= self.num_channels {
            return &[];
        }
        let start = channel * self.channel_len;
        &self.data[start..start + self.channel_len]
    }

    /// Mutable samples of one channel, empty if it doesn't exist.
    #[inline]
    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        if channel >= self.num_channels {
            return &mut [];
        }
        let start = channel * self.channel_len;
        &mut self.data[start..start + self.channel_len]
    }

    /// Raw pointer to the start of one channel, null if it doesn't exist.
    ///
    /// Pointers to different channels stay usable alongside each other as
    /// long as no reference into the storage is created in between.
    #[inline]
    pub fn channel_ptr(&mut self, channel: usize) -> *mut f32 {
        if channel >= self.num_channels {
            return std::ptr::null_mut();
        }
        // Safety: `channel * channel_len` is within the allocation. No slice
        // reference is formed, so earlier channel pointers are not invalidated.
        unsafe { self.data.as_mut_ptr().add(channel * self.channel_len) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_free() {
        let mut scratch = ScratchChannels::new();
        assert!(!scratch.fits(1));
        assert!(scratch.channel_ptr(0).is_null());

        scratch.allocate(3, 128);
        assert_eq!(scratch.num_channels(), 3);
        assert!(scratch.fits(128));
        assert!(!scratch.fits(129));
        assert!(scratch.channel(2).iter().all(|&s| s == 0.0));

        scratch.channel_mut(1)[0] = 0.5;
        assert_eq!(scratch.channel(1)[0], 0.5);
        assert_eq!(scratch.channel(0)[0], 0.0);

        scratch.free();
        assert_eq!(scratch.channel_len(), 0);
        assert!(scratch.channel(0).is_empty());
    }

    #[test]
    fn test_channel_pointers_are_distinct() {
        let mut scratch = ScratchChannels::new();
        scratch.allocate(2, 16);
        let a = scratch.channel_ptr(0);
        let b = scratch.channel_ptr(1);
        assert_eq!(unsafe { b.offset_from(a) }, 16);
    }

    #[test]
    fn test_earlier_pointers_survive_later_ones() {
        let mut scratch = ScratchChannels::new();
        scratch.allocate(3, 4);
        let a = scratch.channel_ptr(0);
        let b = scratch.channel_ptr(1);
        let c = scratch.channel_ptr(2);

        unsafe {
            std::ptr::write_bytes(c, 0, 4);
            *a = 1.0;
            *b.add(3) = 2.0;
            *c.add(1) = 3.0;
        }

        assert_eq!(scratch.channel(0), &[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(scratch.channel(1), &[0.0, 0.0, 0.0, 2.0]);
        assert_eq!(scratch.channel(2), &[0.0, 3.0, 0.0, 0.0]);
    }
}
