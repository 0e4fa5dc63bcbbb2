//! Blockwire Gain - example processor driven through the Blockwire bridge.
//!
//! This processor shows how to:
//! 1. Implement the `Processor` extension points
//! 2. Ramp gain changes across a block to avoid zipper noise
//! 3. React to incoming events (MIDI volume) and pass every event through
//! 4. Save and restore state through the bridge's state blobs

use blockwire::prelude::*;

// =============================================================================
// Configuration
// =============================================================================

/// Stereo in, stereo out, events in both directions.
pub static CONFIG: BridgeConfig = BridgeConfig::new(2, 2).with_events(true, true);

/// Lowest gain in dB, at normalized 0.0.
pub const MIN_DB: f32 = -60.0;

/// Highest gain in dB, at normalized 1.0.
pub const MAX_DB: f32 = 12.0;

/// MIDI controller number that sets the gain.
pub const VOLUME_CC: u8 = 7;

/// Normalized value of 0 dB.
pub const UNITY_NORMALIZED: f32 = -MIN_DB / (MAX_DB - MIN_DB);

/// Map a normalized value to dB.
#[inline]
pub fn normalized_to_db(normalized: f32) -> f32 {
    MIN_DB + normalized.clamp(0.0, 1.0) * (MAX_DB - MIN_DB)
}

/// Convert dB to a linear multiplier.
///
/// ```text
/// linear = 10^(dB / 20)
/// ```
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

// =============================================================================
// Processor
// =============================================================================

/// Gain with per-block linear ramps.
#[derive(Debug)]
pub struct GainProcessor {
    /// Gain parameter, 0.0 to 1.0.
    normalized: f32,
    /// Gain reached at the end of the last block.
    current_gain: f32,
}

impl GainProcessor {
    /// Create a processor at unity gain.
    pub fn new() -> Self {
        Self {
            normalized: UNITY_NORMALIZED,
            current_gain: 1.0,
        }
    }

    /// Gain the processor is moving toward.
    #[inline]
    pub fn target_gain(&self) -> f32 {
        db_to_linear(normalized_to_db(self.normalized))
    }

    /// Apply controller messages found in the block.
    fn read_events(&mut self, events: &EventBuffer) {
        for event in events {
            if let &[status, VOLUME_CC, value] = event.data {
                if status & 0xF0 == 0xB0 {
                    self.normalized = f32::from(value) / 127.0;
                }
            }
        }
    }
}

impl Default for GainProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for GainProcessor {
    fn prepare(&mut self, sample_rate: SampleRate, max_block_size: usize) {
        log::debug!(
            "Gain prepared at {} Hz, up to {} frames",
            sample_rate,
            max_block_size
        );
        self.current_gain = self.target_gain();
    }

    fn process(&mut self, buffer: &mut SampleBuffer<'_, f32>, events: &mut EventBuffer) {
        // Events stay in the buffer and are passed through to the host.
        self.read_events(events);

        let frames = buffer.num_frames();
        if frames == 0 {
            return;
        }
        let target = self.target_gain();
        for ch in 0..buffer.num_channels() {
            buffer.apply_gain_ramp(ch, 0, frames, self.current_gain, target);
        }
        self.current_gain = target;
    }

    fn release(&mut self) {}

    // =========================================================================
    // Parameters
    // =========================================================================

    fn num_parameters(&self) -> usize {
        1
    }

    fn parameter(&self, index: usize) -> f32 {
        match index {
            0 => self.normalized,
            _ => 0.0,
        }
    }

    fn set_parameter(&mut self, index: usize, value: f32) {
        if index == 0 {
            self.normalized = value.clamp(0.0, 1.0);
        }
    }

    fn parameter_name(&self, index: usize) -> String {
        match index {
            0 => "Gain".to_string(),
            _ => String::new(),
        }
    }

    // =========================================================================
    // State
    // =========================================================================

    fn save_state(&self) -> BridgeResult<Vec<u8>> {
        Ok(self.normalized.to_le_bytes().to_vec())
    }

    fn load_state(&mut self, data: &[u8]) -> BridgeResult<()> {
        let bytes: [u8; 4] = data.try_into().map_err(|_| {
            BridgeError::State(format!("expected 4 bytes of gain state, got {}", data.len()))
        })?;
        self.normalized = f32::from_le_bytes(bytes).clamp(0.0, 1.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::{channel, Receiver, Sender};
    use std::sync::Arc;

    struct ForwardingHost(Sender<(Timestamp, Vec<u8>)>);

    impl HostCallbacks for ForwardingHost {
        fn send_events(&mut self, events: &EventBuffer) {
            for event in events {
                let _ = self.0.send((event.timestamp, event.data.to_vec()));
            }
        }
    }

    fn running_bridge() -> (ProcessingBridge<GainProcessor>, Receiver<(Timestamp, Vec<u8>)>) {
        let (sender, receiver) = channel();
        let bridge = ProcessingBridge::new(
            GainProcessor::new(),
            CONFIG.clone(),
            Arc::new(InstanceRegistry::new()),
        )
        .unwrap()
        .with_host(ForwardingHost(sender));
        bridge.set_sample_rate(48_000.0).unwrap();
        bridge.set_block_size(8).unwrap();
        bridge.resume().unwrap();
        (bridge, receiver)
    }

    /// Run one block of constant input and return both output channels.
    fn run_block(bridge: &ProcessingBridge<GainProcessor>, value: f32) -> [[f32; 8]; 2] {
        let left = [value; 8];
        let right = [-value; 8];
        let mut out = [[0.0f32; 8]; 2];
        let [out_left, out_right] = &mut out;
        unsafe {
            bridge.process_block(
                &[left.as_ptr(), right.as_ptr()],
                &[out_left.as_mut_ptr(), out_right.as_mut_ptr()],
                8,
            )
        };
        out
    }

    #[test]
    fn test_db_mapping() {
        assert!((normalized_to_db(UNITY_NORMALIZED)).abs() < 1e-5);
        assert_eq!(normalized_to_db(0.0), MIN_DB);
        assert_eq!(normalized_to_db(2.0), MAX_DB);
        assert!((db_to_linear(-20.0) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_unity_passes_audio_through() {
        let (bridge, _events) = running_bridge();
        let [left, right] = run_block(&bridge, 0.5);
        assert!(left.iter().all(|&s| (s - 0.5).abs() < 1e-5));
        assert!(right.iter().all(|&s| (s + 0.5).abs() < 1e-5));
    }

    #[test]
    fn test_gain_change_is_ramped_over_one_block() {
        let (bridge, _events) = running_bridge();
        bridge.set_parameter(0, 0.0);
        let target = db_to_linear(MIN_DB);

        let [left, _] = run_block(&bridge, 1.0);
        let step = (target - 1.0) / 8.0;
        for (i, &s) in left.iter().enumerate() {
            assert!((s - (1.0 + step * i as f32)).abs() < 1e-5, "frame {}", i);
        }

        let [left, right] = run_block(&bridge, 1.0);
        assert!(left.iter().all(|&s| (s - target).abs() < 1e-6));
        assert!(right.iter().all(|&s| (s + target).abs() < 1e-6));
    }

    #[test]
    fn test_events_pass_through_and_volume_cc_sets_gain() {
        let (bridge, events) = running_bridge();
        assert!(bridge.queue_incoming_event(&[0x90, 60, 100], 4));
        assert!(bridge.queue_incoming_event(&[0xB0, VOLUME_CC, 0], 1));

        run_block(&bridge, 1.0);
        let forwarded: Vec<_> = events.try_iter().collect();
        assert_eq!(
            forwarded,
            vec![(1, vec![0xB0, VOLUME_CC, 0]), (4, vec![0x90, 60, 100])]
        );
        assert_eq!(bridge.parameter(0), 0.0);

        let [left, _] = run_block(&bridge, 1.0);
        assert!(left.iter().all(|&s| (s - db_to_linear(MIN_DB)).abs() < 1e-6));
        assert_eq!(events.try_iter().count(), 0);
    }

    #[test]
    fn test_state_moves_between_bridges() {
        let (source, _) = running_bridge();
        source.set_parameter(0, 0.25);
        let (ptr, len) = source.get_state_blob(false).unwrap();
        let blob = unsafe { std::slice::from_raw_parts(ptr, len) }.to_vec();

        let (dest, _) = running_bridge();
        dest.set_state_blob(&blob, false).unwrap();
        assert_eq!(dest.parameter(0), 0.25);
        assert_eq!(dest.parameter_name(0), "Gain");

        assert!(matches!(
            dest.set_state_blob(&[1, 2], false),
            Err(BridgeError::State(_))
        ));
    }
}
