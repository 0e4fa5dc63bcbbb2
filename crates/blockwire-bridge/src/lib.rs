//! # blockwire-bridge
//!
//! Adapts a block-oriented host callback to Blockwire's real-time containers.
//!
//! The host hands over raw channel pointers and incoming events. The
//! [`ProcessingBridge`] wraps them in a [`SampleBuffer`](blockwire_core::SampleBuffer)
//! view, resolves output-pointer aliasing through pre-allocated scratch
//! channels, calls the wrapped [`Processor`] and forwards any events it
//! produced back to the host.
//!
//! ## Main Types
//!
//! - [`ProcessingBridge`] - Lifecycle state machine and process entry points
//! - [`Processor`] - Extension points implemented by the processing object
//! - [`HostCallbacks`] - Notifications sent back to the host
//! - [`BridgeConfig`] - Channel layout, defaults and pre-allocation sizes
//! - [`InstanceRegistry`] - Explicit registry of live bridges
//!
//! ## Lifecycle
//!
//! ```text
//! Unconfigured --resume--> Processing <--resume/suspend--> Suspended
//!                                  \                        /
//!                                   `------- drop -------> ShuttingDown
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod processor;
pub mod registry;
pub mod scratch;
pub mod state_dump;

pub use bridge::ProcessingBridge;
pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
pub use lifecycle::BridgeState;
pub use processor::{HostCallbacks, NoHost, Processor};
pub use registry::{InstanceId, InstanceRegistry};
pub use scratch::ScratchChannels;
pub use state_dump::StateDump;
