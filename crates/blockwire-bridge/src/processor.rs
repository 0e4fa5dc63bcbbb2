//! Extension points between the bridge and the object it drives.
//!
//! - **[`Processor`]**: implemented by the processing object. Three required
//!   hooks (`prepare`, `process`, `release`) plus optional parameter, program
//!   and state hooks with neutral defaults.
//! - **[`HostCallbacks`]**: implemented by the host side. The bridge reports
//!   outgoing events, parameter edits and latency through it.

use blockwire_core::{EventBuffer, SampleBuffer, SampleRate};

use crate::error::BridgeResult;

// =============================================================================
// Processor Trait
// =============================================================================

/// The processing object wrapped by a [`ProcessingBridge`](crate::ProcessingBridge).
///
/// # Lifecycle
///
/// ```text
/// new ──> prepare(rate, block) ──> process(..)* ──> release() ──> prepare(..) ...
/// ```
///
/// `prepare` is called on every resume, `release` on every suspend and once
/// more before the object is dropped if it was still processing.
///
/// # Thread Safety
///
/// Implementors must be `Send` because the bridge may be created on one thread
/// and processed on another. `process` runs on the audio thread and must be
/// real-time safe:
/// - No allocations
/// - No locks
/// - No unbounded loops
pub trait Processor: Send {
    /// Prepare for processing at `sample_rate` with blocks of at most
    /// `max_block_size` frames. Allocate everything `process` needs here.
    fn prepare(&mut self, sample_rate: SampleRate, max_block_size: usize);

    /// Render one block.
    ///
    /// `buffer` holds the input samples on entry and must hold the output
    /// samples on return. It has `max(inputs, outputs)` channels. `events`
    /// holds this block's incoming events in timestamp order. Whatever is left
    /// in it on return is sent to the host if the bridge was configured to
    /// produce events.
    fn process(&mut self, buffer: &mut SampleBuffer<'_, f32>, events: &mut EventBuffer);

    /// Free whatever `prepare` allocated.
    fn release(&mut self);

    // =========================================================================
    // Processing State
    // =========================================================================

    /// True while the processor is paused internally.
    ///
    /// The bridge outputs silence instead of calling `process` while this
    /// returns true.
    ///
    /// Default returns false.
    fn is_suspended(&self) -> bool {
        false
    }

    /// Processing latency in samples, reported to the host on every resume.
    ///
    /// Default returns 0 (no latency).
    fn latency_samples(&self) -> u32 {
        0
    }

    // =========================================================================
    // Parameters
    // =========================================================================

    /// Number of automatable parameters.
    fn num_parameters(&self) -> usize {
        0
    }

    /// Normalized value (0.0 to 1.0) of a parameter.
    fn parameter(&self, _index: usize) -> f32 {
        0.0
    }

    /// Set the normalized value of a parameter.
    fn set_parameter(&mut self, _index: usize, _value: f32) {}

    /// Display name of a parameter.
    fn parameter_name(&self, _index: usize) -> String {
        String::new()
    }

    // =========================================================================
    // Programs
    // =========================================================================

    /// Number of programs. Every processor has at least one.
    fn num_programs(&self) -> usize {
        1
    }

    /// Index of the active program.
    fn current_program(&self) -> usize {
        0
    }

    /// Switch to another program.
    fn set_current_program(&mut self, _index: usize) {}

    /// Display name of a program.
    fn program_name(&self, _index: usize) -> String {
        String::new()
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Serialize the complete processor state.
    ///
    /// Default returns an empty vector.
    fn save_state(&self) -> BridgeResult<Vec<u8>> {
        Ok(Vec::new())
    }

    /// Restore state produced by [`save_state`](Self::save_state).
    ///
    /// Default does nothing.
    fn load_state(&mut self, _data: &[u8]) -> BridgeResult<()> {
        Ok(())
    }

    /// Serialize only the current program.
    ///
    /// Default delegates to [`save_state`](Self::save_state).
    fn save_program_state(&self) -> BridgeResult<Vec<u8>> {
        self.save_state()
    }

    /// Restore state produced by [`save_program_state`](Self::save_program_state).
    ///
    /// Default delegates to [`load_state`](Self::load_state).
    fn load_program_state(&mut self, data: &[u8]) -> BridgeResult<()> {
        self.load_state(data)
    }
}

// =============================================================================
// Host Callbacks
// =============================================================================

/// Notifications from the bridge to the host.
///
/// `send_events` is called on the audio thread and must not block. The other
/// callbacks run on whatever thread triggered them.
pub trait HostCallbacks: Send {
    /// Events the processor left in the buffer after a block.
    fn send_events(&mut self, _events: &EventBuffer) {}

    /// A parameter was changed from the processor side.
    fn parameter_changed(&mut self, _index: usize, _value: f32) {}

    /// The processor reported a latency on resume.
    fn latency_changed(&mut self, _samples: u32) {}
}

/// Host that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHost;

impl HostCallbacks for NoHost {}
