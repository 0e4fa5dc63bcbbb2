//! Bridge lifecycle states.
//!
//! ```text
//! Unconfigured --[resume]--> Processing --[suspend]--> Suspended
//!                                ^                         |
//!                                `--------[resume]---------'
//!
//! any state --[drop]--> ShuttingDown
//! ```
//!
//! The first `resume` configures the bridge: scratch channels are sized, the
//! processor is prepared and the event buffer is primed. A `process_block`
//! call while `Unconfigured` forces that transition before rendering. In
//! `Suspended` the call renders silence and the state does not change.
//! Sample rate, block size and channel layout can only change while not
//! processing.

use std::fmt;

/// Lifecycle state of a [`ProcessingBridge`](crate::ProcessingBridge).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Constructed, never resumed.
    Unconfigured,
    /// Configured but not processing. Resources are released.
    Suspended,
    /// Resources allocated, process calls render audio.
    Processing,
    /// Being dropped. Terminal.
    ShuttingDown,
}

impl BridgeState {
    /// Check if process calls render audio.
    #[inline]
    pub fn is_processing(self) -> bool {
        matches!(self, Self::Processing)
    }

    /// Check if the sample rate, block size and channel layout may change.
    #[inline]
    pub fn allows_reconfiguration(self) -> bool {
        matches!(self, Self::Unconfigured | Self::Suspended)
    }

    /// Lowercase name used in messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Suspended => "suspended",
            Self::Processing => "processing",
            Self::ShuttingDown => "shutting down",
        }
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
