//! The processing bridge.
//!
//! [`ProcessingBridge`] sits between a host that calls back with raw channel
//! pointers and a [`Processor`] that works on [`SampleBuffer`]s and
//! [`EventBuffer`]s.
//!
//! # Locking
//!
//! All mutable state lives behind one `parking_lot::Mutex`. Process calls
//! only ever `try_lock` it: if configuration holds the lock (or a process
//! call re-enters), the block is rendered as silence instead of waiting.
//! Configuration calls `lock()` it and may block until the current block is
//! finished. The host is still expected to serialize configuration against
//! processing; the lock only keeps a violation from corrupting state.
//!
//! # Real-Time Safety
//!
//! In the `Processing` state, `process_block` does not allocate, log or block.
//! Scratch channels, the accumulation buffer and event storage are all sized
//! during `resume`. Host contract violations are recovered where possible
//! (a forced resume when the first block arrives before any resume) and
//! turned into silence otherwise. A block after an explicit suspend is
//! silence; the processor is not prepared again.
//!
//! Outgoing event storage is reserved up to `outgoing_event_capacity` bytes
//! and never grows while processing. Events that do not fit are handed to
//! the host straight from the incoming buffer.

use std::ptr;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};

use blockwire_core::{EventBuffer, SampleBuffer, SampleRate, Timestamp, MAX_CHANNELS};

use crate::config::{validate_layout, BridgeConfig};
use crate::error::{BridgeError, BridgeResult};
use crate::lifecycle::BridgeState;
use crate::processor::{HostCallbacks, NoHost, Processor};
use crate::registry::{InstanceId, InstanceRegistry};
use crate::scratch::ScratchChannels;
use crate::state_dump::StateDump;

// =============================================================================
// Inner State
// =============================================================================

/// Everything guarded by the bridge lock.
struct Inner<P: Processor> {
    processor: P,
    host: Box<dyn HostCallbacks>,
    state: BridgeState,
    sample_rate: SampleRate,
    block_size: usize,
    num_inputs: usize,
    num_outputs: usize,
    /// Incoming events for the next block. The processor may edit it.
    events: EventBuffer,
    /// Events handed to the host after a block.
    outgoing: EventBuffer,
    /// `max(inputs, outputs)` channels for aliased outputs and extra inputs.
    routing: ScratchChannels,
    /// `min(inputs, outputs)` channels for saved output in accumulating calls.
    accumulator: ScratchChannels,
    state_dump: StateDump,
    editor_attached: bool,
}

impl<P: Processor> Inner<P> {
    fn resume(&mut self, config: &BridgeConfig) -> BridgeResult<()> {
        match self.state {
            BridgeState::ShuttingDown => {
                return Err(BridgeError::InvalidState {
                    operation: "resume",
                    state: self.state,
                })
            }
            BridgeState::Processing => return Ok(()),
            BridgeState::Unconfigured | BridgeState::Suspended => {}
        }

        if self.sample_rate.is_nan() || self.sample_rate <= 0.0 {
            log::warn!(
                "No valid sample rate set ({}), using {}",
                self.sample_rate,
                config.default_sample_rate
            );
            self.sample_rate = config.default_sample_rate;
        }
        if self.block_size == 0 {
            log::warn!(
                "No block size set, using {} frames",
                config.default_block_size
            );
            self.block_size = config.default_block_size;
        }
        if self.state == BridgeState::Unconfigured {
            self.state = BridgeState::Suspended;
        }

        let scratch_len = self.block_size * config.scratch_block_factor;
        self.routing
            .allocate(self.num_inputs.max(self.num_outputs), scratch_len);
        self.accumulator
            .allocate(self.num_inputs.min(self.num_outputs), scratch_len);

        self.processor.prepare(self.sample_rate, self.block_size);

        self.events.ensure_size(config.incoming_event_capacity);
        self.events.clear();
        if config.produces_events {
            self.outgoing.ensure_size(config.outgoing_event_capacity);
        }

        self.host.latency_changed(self.processor.latency_samples());
        self.state = BridgeState::Processing;

        log::debug!(
            "Resumed at {} Hz, {} frames, {} in / {} out",
            self.sample_rate,
            self.block_size,
            self.num_inputs,
            self.num_outputs
        );
        Ok(())
    }

    fn suspend(&mut self) {
        self.processor.release();
        self.outgoing = EventBuffer::new();
        self.routing.free();
        self.accumulator.free();
        self.state = BridgeState::Suspended;
        log::debug!("Suspended");
    }

    /// Render one block in place.
    ///
    /// # Safety
    ///
    /// Every non-null pointer must be valid for `num_frames` samples. Output
    /// pointers must not overlap input pointers of a different channel index.
    unsafe fn render(&mut self, inputs: &[*const f32], outputs: &[*mut f32], num_frames: usize) {
        let num_in = self.num_inputs.min(inputs.len());
        let num_out = self.num_outputs.min(outputs.len());
        let outputs = &outputs[..num_out];

        if self.processor.is_suspended() {
            unsafe { zero_channels(outputs, num_frames) };
            return;
        }

        if !self.routing.fits(num_frames) {
            debug_assert!(
                false,
                "Block of {} frames exceeds scratch capacity of {}",
                num_frames,
                self.routing.channel_len()
            );
            unsafe { zero_channels(outputs, num_frames) };
            return;
        }

        // Pick one distinct write target per channel.
        let num_channels = num_in.max(num_out);
        let mut targets = [ptr::null_mut::<f32>(); MAX_CHANNELS];
        for ch in 0..num_channels {
            let host_target = if ch < num_out {
                let out = outputs[ch];
                (!out.is_null() && !outputs[..ch].contains(&out)).then_some(out)
            } else {
                None
            };
            let target = host_target.unwrap_or_else(|| self.routing.channel_ptr(ch));
            targets[ch] = target;

            let input = if ch < num_in { inputs[ch] } else { ptr::null() };
            if !input.is_null() {
                if input != target.cast_const() {
                    // Safety: both pointers are valid for `num_frames` samples.
                    unsafe { ptr::copy(input, target, num_frames) };
                }
            } else if host_target.is_none() {
                // Safety: scratch channels hold at least `num_frames` samples.
                // Writing through `target` keeps the earlier pointers valid.
                unsafe { ptr::write_bytes(target, 0, num_frames) };
            }
        }

        // Safety: targets are non-null, valid for `num_frames` samples and
        // pairwise distinct for the duration of the call.
        match unsafe { SampleBuffer::from_raw_parts(&targets[..num_channels], num_frames, 0) } {
            Ok(mut buffer) => self.processor.process(&mut buffer, &mut self.events),
            Err(_) => unsafe { zero_channels(outputs, num_frames) },
        }
    }

    fn finish_events(&mut self, config: &BridgeConfig, incoming: usize) {
        if config.produces_events {
            if self.events.bytes_used() > self.outgoing.capacity() {
                // Larger than the reserved storage, send in place.
                self.host.send_events(&self.events);
            } else if !self.events.is_empty() {
                self.outgoing.copy_from(&self.events);
                self.host.send_events(&self.outgoing);
            }
        } else {
            debug_assert!(
                self.events.num_events() <= incoming,
                "Processor added events but the bridge is not configured to produce them"
            );
        }
        self.events.clear();
    }
}

/// Zero `num_frames` samples of every non-null channel.
///
/// # Safety
///
/// Every non-null pointer must be valid for writes of `num_frames` samples.
unsafe fn zero_channels(channels: &[*mut f32], num_frames: usize) {
    for &channel in channels {
        if !channel.is_null() {
            unsafe { ptr::write_bytes(channel, 0, num_frames) };
        }
    }
}

// =============================================================================
// ProcessingBridge
// =============================================================================

/// Drives a [`Processor`] from raw host callbacks.
///
/// # Example
///
/// ```ignore
/// let registry = Arc::new(InstanceRegistry::new());
/// let bridge = ProcessingBridge::new(MyProcessor::default(), BridgeConfig::new(2, 2), registry)?;
///
/// bridge.set_sample_rate(48_000.0)?;
/// bridge.set_block_size(512)?;
/// bridge.resume()?;
///
/// // On the audio thread:
/// unsafe { bridge.process_block(&inputs, &outputs, num_frames) };
/// ```
pub struct ProcessingBridge<P: Processor> {
    inner: Mutex<Inner<P>>,
    config: BridgeConfig,
    registry: Arc<InstanceRegistry>,
    id: InstanceId,
}

impl<P: Processor> ProcessingBridge<P> {
    /// Wrap `processor` and register with `registry`.
    ///
    /// The bridge starts `Unconfigured` with the configured channel layout.
    pub fn new(
        processor: P,
        config: BridgeConfig,
        registry: Arc<InstanceRegistry>,
    ) -> BridgeResult<Self> {
        config.validate()?;

        let id = registry.register();
        log::debug!(
            "Created bridge {} ({} in / {} out)",
            id,
            config.num_inputs,
            config.num_outputs
        );

        let inner = Inner {
            processor,
            host: Box::new(NoHost),
            state: BridgeState::Unconfigured,
            sample_rate: 0.0,
            block_size: 0,
            num_inputs: config.num_inputs,
            num_outputs: config.num_outputs,
            events: EventBuffer::new(),
            outgoing: EventBuffer::new(),
            routing: ScratchChannels::new(),
            accumulator: ScratchChannels::new(),
            state_dump: StateDump::new(config.state_dump_idle()),
            editor_attached: false,
        };

        Ok(Self {
            inner: Mutex::new(inner),
            config,
            registry,
            id,
        })
    }

    /// Replace the host callbacks.
    pub fn with_host(mut self, host: impl HostCallbacks + 'static) -> Self {
        self.inner.get_mut().host = Box::new(host);
        self
    }

    // =========================================================================
    // Info
    // =========================================================================

    /// Registry id of this bridge.
    #[inline]
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Configuration the bridge was created with.
    #[inline]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Registry this bridge is registered with.
    #[inline]
    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.registry
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BridgeState {
        self.inner.lock().state
    }

    /// Sample rate, 0 until set or resumed.
    pub fn sample_rate(&self) -> SampleRate {
        self.inner.lock().sample_rate
    }

    /// Maximum block size, 0 until set or resumed.
    pub fn block_size(&self) -> usize {
        self.inner.lock().block_size
    }

    /// Negotiated input channel count.
    pub fn num_inputs(&self) -> usize {
        self.inner.lock().num_inputs
    }

    /// Negotiated output channel count.
    pub fn num_outputs(&self) -> usize {
        self.inner.lock().num_outputs
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Set the sample rate used by the next resume.
    pub fn set_sample_rate(&self, sample_rate: SampleRate) -> BridgeResult<()> {
        let mut inner = self.lock_for_reconfiguration("change the sample rate")?;
        inner.sample_rate = sample_rate;
        Ok(())
    }

    /// Set the maximum block size used by the next resume.
    pub fn set_block_size(&self, block_size: usize) -> BridgeResult<()> {
        let mut inner = self.lock_for_reconfiguration("change the block size")?;
        inner.block_size = block_size;
        Ok(())
    }

    /// Renegotiate the channel layout.
    pub fn set_channel_layout(&self, num_inputs: usize, num_outputs: usize) -> BridgeResult<()> {
        let mut inner = self.lock_for_reconfiguration("change the channel layout")?;
        validate_layout(num_inputs, num_outputs)?;
        inner.num_inputs = num_inputs;
        inner.num_outputs = num_outputs;
        Ok(())
    }

    fn lock_for_reconfiguration(
        &self,
        operation: &'static str,
    ) -> BridgeResult<MutexGuard<'_, Inner<P>>> {
        let inner = self.inner.lock();
        if inner.state.allows_reconfiguration() {
            Ok(inner)
        } else {
            Err(BridgeError::InvalidState {
                operation,
                state: inner.state,
            })
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Allocate resources, prepare the processor and start processing.
    ///
    /// A non-positive sample rate or a zero block size falls back to the
    /// configured defaults. Resuming while processing does nothing.
    pub fn resume(&self) -> BridgeResult<()> {
        self.inner.lock().resume(&self.config)
    }

    /// Stop processing, release the processor and free scratch storage.
    ///
    /// Fails if the bridge was never resumed. Suspending twice does nothing.
    pub fn suspend(&self) -> BridgeResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            BridgeState::Processing => {
                inner.suspend();
                Ok(())
            }
            BridgeState::Suspended => Ok(()),
            state @ (BridgeState::Unconfigured | BridgeState::ShuttingDown) => {
                Err(BridgeError::InvalidState {
                    operation: "suspend",
                    state,
                })
            }
        }
    }

    // =========================================================================
    // Processing
    // =========================================================================

    /// Render one block, replacing the output content.
    ///
    /// Output pointers shared between channel indices are detected and the
    /// later channels are rendered into scratch memory instead. Inputs are
    /// copied into their write target unless they already are it. Events
    /// left in the buffer afterwards go to the host if the bridge produces
    /// events.
    ///
    /// If the lock is taken or the bridge is suspended the outputs are
    /// zeroed. If the bridge was never resumed it is resumed first.
    ///
    /// # Safety
    ///
    /// Every non-null pointer must be valid for `num_frames` samples. An
    /// output pointer may equal the input pointer of the same channel index
    /// or another output pointer, but must not otherwise overlap any input.
    pub unsafe fn process_block(
        &self,
        inputs: &[*const f32],
        outputs: &[*mut f32],
        num_frames: usize,
    ) {
        let Some(mut guard) = self.lock_for_processing() else {
            unsafe { zero_channels(outputs, num_frames) };
            return;
        };
        let inner = &mut *guard;

        let incoming = inner.events.num_events();
        unsafe { inner.render(inputs, outputs, num_frames) };
        inner.finish_events(&self.config, incoming);
    }

    /// Render one block, adding to the existing output content.
    ///
    /// The first `min(inputs, outputs)` output channels are saved before
    /// rendering and added back afterwards. If the lock is taken or the
    /// bridge is suspended the outputs are left untouched.
    ///
    /// # Safety
    ///
    /// Same contract as [`process_block`](Self::process_block).
    pub unsafe fn process_block_accumulating(
        &self,
        inputs: &[*const f32],
        outputs: &[*mut f32],
        num_frames: usize,
    ) {
        let Some(mut guard) = self.lock_for_processing() else {
            return;
        };
        let inner = &mut *guard;

        let saved = if inner.accumulator.fits(num_frames) {
            inner.accumulator.num_channels().min(outputs.len())
        } else {
            0
        };
        let is_saved = |ch: usize| {
            let out = outputs[ch];
            !out.is_null() && !outputs[..ch].contains(&out)
        };

        for ch in (0..saved).filter(|&ch| is_saved(ch)) {
            // Safety: the caller guarantees `num_frames` valid samples.
            let out = unsafe { std::slice::from_raw_parts(outputs[ch], num_frames) };
            inner.accumulator.channel_mut(ch)[..num_frames].copy_from_slice(out);
        }

        let incoming = inner.events.num_events();
        unsafe { inner.render(inputs, outputs, num_frames) };

        for ch in (0..saved).filter(|&ch| is_saved(ch)) {
            // Safety: as above.
            let out = unsafe { std::slice::from_raw_parts_mut(outputs[ch], num_frames) };
            for (dest, &kept) in out.iter_mut().zip(inner.accumulator.channel(ch)) {
                *dest += kept;
            }
        }

        inner.finish_events(&self.config, incoming);
    }

    /// Lock for one block, or `None` if the block must not be rendered.
    ///
    /// Only a bridge that was never resumed is resumed here. After an
    /// explicit suspend the block is rejected.
    fn lock_for_processing(&self) -> Option<MutexGuard<'_, Inner<P>>> {
        let mut inner = self.inner.try_lock()?;
        match inner.state {
            BridgeState::Processing => {}
            BridgeState::Unconfigured => {
                log::warn!(
                    "Bridge {} asked to process before resume, resuming",
                    self.id
                );
                inner.resume(&self.config).ok()?;
            }
            BridgeState::Suspended | BridgeState::ShuttingDown => return None,
        }
        Some(inner)
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Queue one event for the next block.
    ///
    /// Returns false if the bridge does not accept events or is busy.
    pub fn queue_incoming_event(&self, bytes: &[u8], timestamp: Timestamp) -> bool {
        if !self.config.wants_events {
            return false;
        }
        let Some(mut inner) = self.inner.try_lock() else {
            return false;
        };
        inner.events.add_event(bytes, bytes.len(), timestamp);
        true
    }

    /// Queue every event of `events` for the next block.
    ///
    /// Returns false if the bridge does not accept events or is busy.
    pub fn queue_incoming_events(&self, events: &EventBuffer) -> bool {
        if !self.config.wants_events {
            return false;
        }
        let Some(mut inner) = self.inner.try_lock() else {
            return false;
        };
        inner.events.add_events(events, Timestamp::MIN, -1, 0);
        true
    }

    // =========================================================================
    // State Blobs
    // =========================================================================

    /// Serialize the processor state and return a pointer to the bytes.
    ///
    /// The bytes stay valid until the next call to this method, a call to
    /// [`set_state_blob`](Self::set_state_blob), or until housekeeping finds
    /// them idle for longer than the configured window.
    pub fn get_state_blob(&self, current_program_only: bool) -> BridgeResult<(*const u8, usize)> {
        let mut inner = self.inner.lock();
        let bytes = if current_program_only {
            inner.processor.save_program_state()?
        } else {
            inner.processor.save_state()?
        };
        Ok(inner.state_dump.store(bytes, Instant::now()))
    }

    /// Restore processor state from bytes produced by
    /// [`get_state_blob`](Self::get_state_blob).
    pub fn set_state_blob(&self, data: &[u8], current_program_only: bool) -> BridgeResult<()> {
        let mut inner = self.inner.lock();
        let result = if current_program_only {
            inner.processor.load_program_state(data)
        } else {
            inner.processor.load_state(data)
        };
        inner.state_dump.clear();

        if let Err(err) = &result {
            log::error!("Failed to restore state of bridge {}: {}", self.id, err);
        }
        result
    }

    /// Periodic maintenance. Frees an idle state blob.
    ///
    /// Returns true if something was freed.
    pub fn housekeep(&self) -> bool {
        self.housekeep_at(Instant::now())
    }

    /// [`housekeep`](Self::housekeep) with an explicit clock reading.
    pub fn housekeep_at(&self, now: Instant) -> bool {
        self.inner.lock().state_dump.expire(now)
    }

    // =========================================================================
    // Parameters and Programs
    // =========================================================================

    /// Number of processor parameters.
    pub fn num_parameters(&self) -> usize {
        self.inner.lock().processor.num_parameters()
    }

    /// Normalized value of a parameter.
    pub fn parameter(&self, index: usize) -> f32 {
        self.inner.lock().processor.parameter(index)
    }

    /// Set a parameter on behalf of the host. The host is not notified.
    pub fn set_parameter(&self, index: usize, value: f32) {
        self.inner.lock().processor.set_parameter(index, value);
    }

    /// Set a parameter from the processor side and report it to the host.
    pub fn set_parameter_notifying_host(&self, index: usize, value: f32) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.processor.set_parameter(index, value);
        inner.host.parameter_changed(index, value);
    }

    /// Display name of a parameter.
    pub fn parameter_name(&self, index: usize) -> String {
        self.inner.lock().processor.parameter_name(index)
    }

    /// Number of processor programs.
    pub fn num_programs(&self) -> usize {
        self.inner.lock().processor.num_programs()
    }

    /// Index of the active program.
    pub fn current_program(&self) -> usize {
        self.inner.lock().processor.current_program()
    }

    /// Switch programs.
    pub fn set_current_program(&self, index: usize) {
        self.inner.lock().processor.set_current_program(index);
    }

    /// Display name of a program.
    pub fn program_name(&self, index: usize) -> String {
        self.inner.lock().processor.program_name(index)
    }

    // =========================================================================
    // Editor
    // =========================================================================

    /// Record that an editor is attached to the processor.
    pub fn attach_editor(&self) {
        self.inner.lock().editor_attached = true;
    }

    /// Record that the editor is gone.
    pub fn detach_editor(&self) {
        self.inner.lock().editor_attached = false;
    }

    /// True while an editor is attached.
    pub fn has_editor(&self) -> bool {
        self.inner.lock().editor_attached
    }

    /// Run `f` with exclusive access to the processor.
    ///
    /// Process calls made while `f` runs render silence.
    pub fn with_processor<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        f(&mut self.inner.lock().processor)
    }
}

impl<P: Processor> Drop for ProcessingBridge<P> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        let was_processing = inner.state.is_processing();
        inner.state = BridgeState::ShuttingDown;
        if was_processing {
            inner.processor.release();
        }
        let editor_attached = inner.editor_attached;

        self.registry.deregister(self.id);

        if editor_attached {
            log::error!("Bridge {} dropped with an editor still attached", self.id);
            debug_assert!(false, "Bridge dropped with an editor still attached");
        }
    }
}

impl<P: Processor> std::fmt::Debug for ProcessingBridge<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingBridge")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
