//! # Blockwire
//!
//! Real-time audio/MIDI data plane for Rust.
//!
//! Blockwire provides planar sample buffers, a byte-packed event arena and a
//! bridge that drives a processing object from raw host callbacks.
//!
//! ## Architecture
//!
//! ```text
//! Your processor (implements Processor)
//!        ↓
//! ProcessingBridge<P> (lifecycle, channel routing, events)
//!        ↓
//! Host callback (raw channel pointers)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use blockwire::prelude::*;
//! use std::sync::Arc;
//!
//! struct Gain { gain: f32 }
//!
//! impl Processor for Gain {
//!     fn prepare(&mut self, _sample_rate: SampleRate, _max_block_size: usize) {}
//!     fn process(&mut self, buffer: &mut SampleBuffer<'_, f32>, _events: &mut EventBuffer) {
//!         let frames = buffer.num_frames();
//!         buffer.apply_gain_all(0, frames, self.gain);
//!     }
//!     fn release(&mut self) {}
//! }
//!
//! let registry = Arc::new(InstanceRegistry::new());
//! let bridge = ProcessingBridge::new(Gain { gain: 0.5 }, BridgeConfig::new(2, 2), registry)?;
//! bridge.resume()?;
//! ```

// Re-export sub-crates
pub use blockwire_bridge as bridge;
pub use blockwire_core as core;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use blockwire::prelude::*;
/// ```
pub mod prelude {
    // Containers and core traits
    pub use blockwire_core::{
        // Buffers
        EventBuffer, SampleBuffer, Ownership,
        // Events
        decode_event_length, Event, EventLength,
        // Sample trait for generic f32/f64 processing
        Sample,
        // Sources
        AudioSource, MixerSource, SourceChannelInfo,
        // Codecs
        PcmDestination, StreamReader, StreamWriter,
        // Errors
        CoreError, CoreResult,
        // Units
        SampleRate, Timestamp, MAX_CHANNELS,
    };

    // Bridge
    pub use blockwire_bridge::{
        BridgeConfig, BridgeError, BridgeResult, BridgeState, HostCallbacks, InstanceRegistry,
        NoHost, ProcessingBridge, Processor,
    };
}
