//! Bridge configuration.
//!
//! # Example
//!
//! ```ignore
//! use blockwire_bridge::BridgeConfig;
//!
//! pub static CONFIG: BridgeConfig = BridgeConfig::new(2, 2)
//!     .with_events(true, true)
//!     .with_event_capacity(4096, 1024);
//! ```
//!
//! Configurations can also be loaded from JSON. Missing fields take their
//! default values:
//!
//! ```ignore
//! let config = BridgeConfig::from_json(r#"{ "num_inputs": 1, "num_outputs": 2 }"#)?;
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};
use blockwire_core::MAX_CHANNELS;

/// Sample rate used when the host never supplies a positive one.
pub const DEFAULT_SAMPLE_RATE: f64 = 44_100.0;

/// Block size used when the host never supplies one.
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Bytes reserved for incoming events on resume.
pub const DEFAULT_INCOMING_EVENT_CAPACITY: usize = 2048;

/// Bytes reserved for outgoing events on resume.
pub const DEFAULT_OUTGOING_EVENT_CAPACITY: usize = 512;

/// How long a returned state blob stays alive without further requests.
pub const DEFAULT_STATE_DUMP_IDLE_MS: u64 = 2000;

/// Channel layout, defaults and pre-allocation sizes of a bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Host input channels.
    pub num_inputs: usize,

    /// Host output channels.
    pub num_outputs: usize,

    /// Sample rate used when the host reports none.
    pub default_sample_rate: f64,

    /// Maximum block size used when the host reports none.
    pub default_block_size: usize,

    /// Bytes reserved in the incoming event buffer on resume.
    pub incoming_event_capacity: usize,

    /// Bytes reserved in the outgoing event buffer on resume.
    ///
    /// The outgoing buffer never grows past this while processing. Larger
    /// event sets are sent to the host without the copy.
    pub outgoing_event_capacity: usize,

    /// Milliseconds a state blob survives housekeeping.
    pub state_dump_idle_ms: u64,

    /// Whether incoming events are accepted.
    pub wants_events: bool,

    /// Whether events left in the buffer after processing go to the host.
    pub produces_events: bool,

    /// Scratch channels hold `block_size * scratch_block_factor` frames.
    pub scratch_block_factor: usize,
}

impl BridgeConfig {
    /// Create a configuration for the given channel layout with default values.
    pub const fn new(num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            num_inputs,
            num_outputs,
            default_sample_rate: DEFAULT_SAMPLE_RATE,
            default_block_size: DEFAULT_BLOCK_SIZE,
            incoming_event_capacity: DEFAULT_INCOMING_EVENT_CAPACITY,
            outgoing_event_capacity: DEFAULT_OUTGOING_EVENT_CAPACITY,
            state_dump_idle_ms: DEFAULT_STATE_DUMP_IDLE_MS,
            wants_events: true,
            produces_events: false,
            scratch_block_factor: 2,
        }
    }

    /// Set whether events are accepted and whether they are produced.
    pub const fn with_events(mut self, wants: bool, produces: bool) -> Self {
        self.wants_events = wants;
        self.produces_events = produces;
        self
    }

    /// Set the sample rate and block size used when the host supplies none.
    pub const fn with_defaults(mut self, sample_rate: f64, block_size: usize) -> Self {
        self.default_sample_rate = sample_rate;
        self.default_block_size = block_size;
        self
    }

    /// Set the bytes reserved for incoming and outgoing events.
    pub const fn with_event_capacity(mut self, incoming: usize, outgoing: usize) -> Self {
        self.incoming_event_capacity = incoming;
        self.outgoing_event_capacity = outgoing;
        self
    }

    /// Set the idle window of returned state blobs.
    pub const fn with_state_dump_idle_ms(mut self, millis: u64) -> Self {
        self.state_dump_idle_ms = millis;
        self
    }

    /// Set the scratch channel length as a multiple of the block size.
    pub const fn with_scratch_block_factor(mut self, factor: usize) -> Self {
        self.scratch_block_factor = factor;
        self
    }

    /// Idle window of returned state blobs.
    pub const fn state_dump_idle(&self) -> Duration {
        Duration::from_millis(self.state_dump_idle_ms)
    }

    /// Parse a configuration from JSON and validate it.
    pub fn from_json(json: &str) -> BridgeResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration as JSON.
    pub fn to_json(&self) -> BridgeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the configuration against system limits.
    pub fn validate(&self) -> BridgeResult<()> {
        validate_layout(self.num_inputs, self.num_outputs)?;

        if !self.default_sample_rate.is_finite() || self.default_sample_rate <= 0.0 {
            return Err(BridgeError::InvalidConfiguration(format!(
                "default sample rate {} must be positive",
                self.default_sample_rate
            )));
        }
        if self.default_block_size == 0 {
            return Err(BridgeError::InvalidConfiguration(
                "default block size must be at least one frame".to_string(),
            ));
        }
        if self.scratch_block_factor == 0 {
            return Err(BridgeError::InvalidConfiguration(
                "scratch block factor must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new(2, 2)
    }
}

/// Check a channel layout against [`MAX_CHANNELS`].
pub(crate) fn validate_layout(num_inputs: usize, num_outputs: usize) -> BridgeResult<()> {
    if num_inputs > MAX_CHANNELS {
        return Err(BridgeError::InvalidConfiguration(format!(
            "{} input channels, but MAX_CHANNELS is {}",
            num_inputs, MAX_CHANNELS
        )));
    }
    if num_outputs > MAX_CHANNELS {
        return Err(BridgeError::InvalidConfiguration(format!(
            "{} output channels, but MAX_CHANNELS is {}",
            num_outputs, MAX_CHANNELS
        )));
    }
    if num_inputs == 0 && num_outputs == 0 {
        return Err(BridgeError::InvalidConfiguration(
            "a bridge needs at least one input or output channel".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.num_inputs, 2);
        assert_eq!(config.default_sample_rate, 44_100.0);
        assert_eq!(config.incoming_event_capacity, 2048);
        assert_eq!(config.outgoing_event_capacity, 512);
        assert_eq!(config.state_dump_idle(), Duration::from_secs(2));
        assert!(config.wants_events);
        assert!(!config.produces_events);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_is_const() {
        const CONFIG: BridgeConfig = BridgeConfig::new(1, 2)
            .with_events(false, true)
            .with_defaults(48_000.0, 256)
            .with_scratch_block_factor(4);
        assert_eq!(CONFIG.num_outputs, 2);
        assert!(!CONFIG.wants_events);
        assert!(CONFIG.produces_events);
        assert_eq!(CONFIG.default_block_size, 256);
        assert_eq!(CONFIG.scratch_block_factor, 4);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            BridgeConfig::from_json(r#"{ "num_inputs": 1, "produces_events": true }"#).unwrap();
        assert_eq!(config.num_inputs, 1);
        assert_eq!(config.num_outputs, 2);
        assert!(config.produces_events);
        assert_eq!(config.default_block_size, 1024);

        let json = config.to_json().unwrap();
        assert_eq!(BridgeConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            BridgeConfig::from_json(r#"{ "num_outputs": 33 }"#),
            Err(BridgeError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            BridgeConfig::from_json(r#"{ "num_inputs": "two" }"#),
            Err(BridgeError::Config(_))
        ));
        assert!(BridgeConfig::new(0, 0).validate().is_err());
        assert!(BridgeConfig::new(0, 1).validate().is_ok());
        assert!(BridgeConfig::new(2, 2)
            .with_defaults(-1.0, 64)
            .validate()
            .is_err());
        assert!(BridgeConfig::new(2, 2)
            .with_scratch_block_factor(0)
            .validate()
            .is_err());
    }
}
