//! Transient storage for state blobs handed to the host by pointer.
//!
//! A host asking for the processor state receives a pointer into bridge-owned
//! memory. Some hosts keep reading through it well after the call returns, so
//! the bytes stay put until the next state request, a state restore, or until
//! housekeeping finds them idle for longer than the configured window.

use std::time::{Duration, Instant};

/// Last state blob returned to the host and when it was returned.
#[derive(Debug)]
pub struct StateDump {
    bytes: Vec<u8>,
    stamped_at: Option<Instant>,
    idle: Duration,
}

impl StateDump {
    /// Create an empty dump that expires after `idle`.
    pub fn new(idle: Duration) -> Self {
        Self {
            bytes: Vec::new(),
            stamped_at: None,
            idle,
        }
    }

    /// Keep `bytes` alive and return a pointer to them.
    ///
    /// The pointer stays valid until the next `store`, `clear` or expiry.
    pub fn store(&mut self, bytes: Vec<u8>, now: Instant) -> (*const u8, usize) {
        self.bytes = bytes;
        self.stamped_at = Some(now);
        (self.bytes.as_ptr(), self.bytes.len())
    }

    /// Drop the held blob immediately.
    pub fn clear(&mut self) {
        self.bytes = Vec::new();
        self.stamped_at = None;
    }

    /// Free the blob if it has been idle for longer than the window.
    ///
    /// Returns true if it was freed.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.stamped_at {
            Some(stamp) if now.saturating_duration_since(stamp) > self.idle => {
                self.clear();
                true
            }
            _ => false,
        }
    }

    /// True while a blob is held.
    #[inline]
    pub fn is_held(&self) -> bool {
        self.stamped_at.is_some()
    }

    /// The held bytes.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}
