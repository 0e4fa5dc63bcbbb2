//! Common types used throughout Blockwire.

// =============================================================================
// Channel Limits
// =============================================================================
//
// Borrowed sample buffers keep their channel table in fixed-size storage so
// that wrapping host pointers never allocates. 32 channels covers 22.2
// surround and Atmos 9.1.6 with headroom.
// =============================================================================

/// Maximum number of channels a borrowed [`SampleBuffer`](crate::SampleBuffer) can reference.
///
/// Owned buffers are not limited by this constant, but the processing bridge
/// rejects channel layouts above it during configuration.
pub const MAX_CHANNELS: usize = 32;

/// Sample rate in Hz.
pub type SampleRate = f64;

/// Sample-offset timestamp of an event relative to the start of a block.
pub type Timestamp = i32;
