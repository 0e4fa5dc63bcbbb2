//! # blockwire-core
//!
//! Real-time data containers for the Blockwire audio/MIDI data plane.
//!
//! This crate holds everything that runs inside a host's audio callback
//! without knowing anything about the host itself:
//!
//! ## Containers
//!
//! - [`SampleBuffer`] - Planar multichannel sample store, owned or borrowed
//! - [`EventBuffer`] - Byte-packed, time-ordered MIDI-style event arena
//!
//! ## Interfaces
//!
//! - [`Sample`] - f32/f64 sample abstraction
//! - [`StreamReader`] / [`StreamWriter`] - Codec collaborators for persistent audio
//! - [`AudioSource`] - Pull-style block source, with [`MixerSource`] summing many of them
//!
//! ## Real-Time Contract
//!
//! Only construction and resizing allocate. Everything else is safe to call
//! from the audio thread: no locks, no logging, no panics on well-formed
//! input. Range violations are caught by `debug_assert!` during development
//! and are clamped in release builds.

pub mod buffer;
pub mod codec;
pub mod error;
pub mod events;
pub mod mixer;
pub mod sample;
pub mod types;

// Re-exports for convenience
pub use buffer::{Ownership, SampleBuffer};
pub use codec::{PcmDestination, StreamReader, StreamWriter};
pub use error::{CoreError, CoreResult};
pub use events::{
    decode_event_length, read_variable_length, Event, EventBuffer, EventIter, EventLength, VarLen,
    EVENT_HEADER_SIZE, MAX_EVENT_SIZE,
};
pub use mixer::{AudioSource, MixerSource, SourceChannelInfo, SourceId};
pub use sample::Sample;
pub use types::{SampleRate, Timestamp, MAX_CHANNELS};
