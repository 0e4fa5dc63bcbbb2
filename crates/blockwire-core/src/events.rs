//! Time-ordered MIDI-style event storage.
//!
//! [`EventBuffer`] keeps every event in one growable byte arena. Each record
//! is laid out as
//!
//! ```text
//! i32 LE timestamp | u16 LE payload length | payload bytes
//! ```
//!
//! packed back to back with no padding, in non-decreasing timestamp order.
//! [`EventBuffer::as_bytes`] exposes exactly this layout and
//! [`EventBuffer::from_bytes`] imports it after validation.
//!
//! ## Insertion Order
//!
//! [`EventBuffer::add_event`] scans from the start for the first event with a
//! later timestamp and inserts in front of it. Events sharing a timestamp
//! therefore keep the order they were added in. The scan is linear per insert.
//!
//! ## Malformed Input
//!
//! The stored length of an event comes from its leading status byte (see
//! [`decode_event_length`]). Payloads that decode to zero bytes, such as
//! running-status data bytes, are dropped without error.
//!
//! ## Real-Time Safety
//!
//! Insertion only allocates when the arena has to grow. Call
//! [`EventBuffer::ensure_size`] ahead of time to keep the audio thread free of
//! allocations. Clearing never frees storage.

use crate::error::{CoreError, CoreResult};
use crate::types::Timestamp;

// =============================================================================
// Record Layout
// =============================================================================

/// Bytes in a record header: `i32` timestamp plus `u16` length.
pub const EVENT_HEADER_SIZE: usize = 6;

/// Largest payload a single record can carry.
pub const MAX_EVENT_SIZE: usize = u16::MAX as usize;

/// Longest variable-length quantity read when sizing a meta event.
const MAX_VARLEN_BYTES: usize = 6;

// =============================================================================
// Event Length Decoding
// =============================================================================

/// A decoded MIDI variable-length quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarLen {
    /// Decoded value.
    pub value: u64,
    /// Number of input bytes it occupied.
    pub consumed: usize,
}

/// Decode a variable-length quantity: 7 bits per byte, high bit set on every
/// byte but the last. At most six bytes are read.
pub fn read_variable_length(bytes: &[u8]) -> VarLen {
    let mut value = 0u64;
    let mut consumed = 0;
    for &byte in bytes.iter().take(MAX_VARLEN_BYTES) {
        consumed += 1;
        value = (value << 7) | u64::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            break;
        }
    }
    VarLen { value, consumed }
}

/// Storage length of an event, classified by its status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLength {
    /// System exclusive: everything up to and including the `0xF7`
    /// terminator, or up to the byte limit if no terminator was found.
    SysEx(usize),
    /// Meta event (`0xFF`) sized by the variable-length count after the
    /// status byte.
    Meta {
        /// Total stored length, capped at the byte limit.
        len: usize,
        /// The variable-length count that produced it.
        count: VarLen,
    },
    /// Channel-voice or system-common message of a fixed size.
    Fixed(usize),
    /// Running status, empty input or no readable bytes.
    Invalid,
}

impl EventLength {
    /// Number of payload bytes to store, zero for [`EventLength::Invalid`].
    #[inline]
    pub fn len(self) -> usize {
        match self {
            Self::SysEx(n) | Self::Fixed(n) => n,
            Self::Meta { len, .. } => len,
            Self::Invalid => 0,
        }
    }

    /// True if nothing should be stored.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
}

/// Work out how many bytes of `bytes` form one event, reading at most
/// `max_bytes`.
pub fn decode_event_length(bytes: &[u8], max_bytes: usize) -> EventLength {
    let max = max_bytes.min(bytes.len());
    if max == 0 {
        return EventLength::Invalid;
    }

    match bytes[0] {
        0xf0 | 0xf7 => {
            let len = bytes[1..max]
                .iter()
                .position(|&b| b == 0xf7)
                .map_or(max, |i| i + 2);
            EventLength::SysEx(len)
        }
        0xff => {
            let count = read_variable_length(&bytes[1..]);
            let total = count.value.saturating_add(2 + count.consumed as u64);
            EventLength::Meta {
                len: total.min(max as u64) as usize,
                count,
            }
        }
        status @ 0x80..=0xfe => EventLength::Fixed(fixed_message_length(status).min(max)),
        _ => EventLength::Invalid,
    }
}

/// Length of a message implied by its status byte.
#[inline]
fn fixed_message_length(status: u8) -> usize {
    match status {
        0x80..=0xbf | 0xe0..=0xef | 0xf2 => 3,
        0xc0..=0xdf | 0xf1 | 0xf3 => 2,
        _ => 1,
    }
}

// =============================================================================
// Event
// =============================================================================

/// One event borrowed from an [`EventBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event<'a> {
    /// Sample offset within the block.
    pub timestamp: Timestamp,
    /// Raw message bytes.
    pub data: &'a [u8],
}

// =============================================================================
// EventBuffer
// =============================================================================

/// Byte-packed, time-ordered event arena.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EventBuffer {
    /// `len()` is the number of bytes in use.
    data: Vec<u8>,
}

impl EventBuffer {
    /// Create an empty buffer without allocating.
    pub const fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Create an empty buffer with room for `bytes` bytes of records.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            data: Vec::with_capacity(bytes),
        }
    }

    /// Import records in wire layout.
    ///
    /// Fails with [`CoreError::MalformedEvents`] on a truncated record or a
    /// timestamp lower than its predecessor.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let mut pos = 0;
        let mut previous = Timestamp::MIN;
        while pos < bytes.len() {
            if bytes.len() - pos < EVENT_HEADER_SIZE {
                return Err(CoreError::MalformedEvents {
                    offset: pos,
                    reason: "truncated record header".to_string(),
                });
            }
            let timestamp = read_timestamp(bytes, pos);
            if timestamp < previous {
                return Err(CoreError::MalformedEvents {
                    offset: pos,
                    reason: format!("timestamp {} follows {}", timestamp, previous),
                });
            }
            let total = EVENT_HEADER_SIZE + read_length(bytes, pos);
            if bytes.len() - pos < total {
                return Err(CoreError::MalformedEvents {
                    offset: pos,
                    reason: "payload runs past the end".to_string(),
                });
            }
            previous = timestamp;
            pos += total;
        }
        Ok(Self {
            data: bytes.to_vec(),
        })
    }

    // =========================================================================
    // Buffer Info
    // =========================================================================

    /// Records in wire layout.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Bytes currently holding records.
    #[inline]
    pub fn bytes_used(&self) -> usize {
        self.data.len()
    }

    /// Bytes available before the arena has to grow.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// True if the buffer holds no events.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of events. Walks every record.
    pub fn num_events(&self) -> usize {
        let mut count = 0;
        let mut pos = 0;
        while pos < self.data.len() {
            pos += self.record_size(pos);
            count += 1;
        }
        count
    }

    /// Timestamp of the first event, 0 when empty.
    #[inline]
    pub fn first_event_time(&self) -> Timestamp {
        if self.data.is_empty() {
            0
        } else {
            read_timestamp(&self.data, 0)
        }
    }

    /// Timestamp of the last event, 0 when empty. Walks every record.
    pub fn last_event_time(&self) -> Timestamp {
        let mut pos = 0;
        let mut last = 0;
        while pos < self.data.len() {
            last = read_timestamp(&self.data, pos);
            pos += self.record_size(pos);
        }
        last
    }

    // =========================================================================
    // Storage
    // =========================================================================

    /// Make room for at least `min_bytes` bytes of records.
    pub fn ensure_size(&mut self, min_bytes: usize) {
        if self.data.capacity() < min_bytes {
            self.data.reserve_exact(min_bytes - self.data.len());
        }
    }

    /// Exchange contents with another buffer without copying.
    #[inline]
    pub fn swap_with(&mut self, other: &mut EventBuffer) {
        std::mem::swap(&mut self.data, &mut other.data);
    }

    /// Replace the contents with a copy of `other`, reusing storage.
    pub fn copy_from(&mut self, other: &EventBuffer) {
        self.data.clear();
        self.data.extend_from_slice(&other.data);
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    /// Add one event at `timestamp`.
    ///
    /// The stored length is decoded from the status byte, reading at most
    /// `max_bytes` of `bytes`. Events that decode to zero bytes are ignored.
    pub fn add_event(&mut self, bytes: &[u8], max_bytes: usize, timestamp: Timestamp) {
        let len = decode_event_length(bytes, max_bytes).len();
        if len == 0 || len > MAX_EVENT_SIZE {
            return;
        }
        self.insert_record(timestamp, &bytes[..len]);
    }

    /// Copy events from `source` whose timestamp lies in
    /// `[start, start + num)`, shifted by `offset`.
    ///
    /// A negative `num` copies every event from `start` onward. Payloads are
    /// copied verbatim.
    pub fn add_events(&mut self, source: &EventBuffer, start: Timestamp, num: i32, offset: i32) {
        let end = i64::from(start) + i64::from(num);
        let mut iter = source.iter();
        iter.set_next_sample_position(start);
        while let Some(event) = iter.next_event() {
            if num >= 0 && i64::from(event.timestamp) >= end {
                break;
            }
            self.insert_record(event.timestamp.wrapping_add(offset), event.data);
        }
    }

    fn insert_record(&mut self, timestamp: Timestamp, payload: &[u8]) {
        let record = EVENT_HEADER_SIZE + payload.len();
        let used = self.data.len();
        let needed = used + record;
        if self.data.capacity() < needed {
            let grown = (needed + needed / 2 + 8) & !7;
            self.data.reserve_exact(grown - used);
        }

        let at = self.find_event_after(0, i64::from(timestamp));
        self.data.resize(needed, 0);
        self.data.copy_within(at..used, at + record);
        self.data[at..at + 4].copy_from_slice(&timestamp.to_le_bytes());
        self.data[at + 4..at + EVENT_HEADER_SIZE].copy_from_slice(&(payload.len() as u16).to_le_bytes());
        self.data[at + EVENT_HEADER_SIZE..at + record].copy_from_slice(payload);
    }

    // =========================================================================
    // Clearing
    // =========================================================================

    /// Remove every event. Keeps the allocation.
    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Remove events whose timestamp lies in `[start, start + num)`.
    pub fn clear_range(&mut self, start: Timestamp, num: i32) {
        let first = self.find_event_after(0, i64::from(start) - 1);
        let last = self.find_event_after(first, i64::from(start) + i64::from(num) - 1);
        if last > first {
            self.data.drain(first..last);
        }
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Forward cursor over the events.
    ///
    /// The borrow keeps the buffer from being mutated while iterating.
    #[inline]
    pub fn iter(&self) -> EventIter<'_> {
        EventIter {
            data: &self.data,
            pos: 0,
        }
    }

    /// Offset of the first record at or after `from` with a timestamp above `position`.
    fn find_event_after(&self, from: usize, position: i64) -> usize {
        let mut pos = from;
        while pos < self.data.len() && i64::from(read_timestamp(&self.data, pos)) <= position {
            pos += self.record_size(pos);
        }
        pos
    }

    #[inline]
    fn record_size(&self, pos: usize) -> usize {
        EVENT_HEADER_SIZE + read_length(&self.data, pos)
    }
}

impl std::fmt::Debug for EventBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a EventBuffer {
    type Item = Event<'a>;
    type IntoIter = EventIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[inline]
fn read_timestamp(data: &[u8], pos: usize) -> Timestamp {
    Timestamp::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

#[inline]
fn read_length(data: &[u8], pos: usize) -> usize {
    u16::from_le_bytes([data[pos + 4], data[pos + 5]]) as usize
}

// =============================================================================
// EventIter
// =============================================================================

/// Sequential cursor over an [`EventBuffer`].
#[derive(Debug, Clone)]
pub struct EventIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> EventIter<'a> {
    /// Move to the first event whose timestamp is at least `position`.
    ///
    /// Always scans from the start of the buffer.
    pub fn set_next_sample_position(&mut self, position: Timestamp) {
        self.pos = 0;
        while self.pos < self.data.len() && read_timestamp(self.data, self.pos) < position {
            self.pos += EVENT_HEADER_SIZE + read_length(self.data, self.pos);
        }
    }

    /// Return the event under the cursor and advance past it.
    pub fn next_event(&mut self) -> Option<Event<'a>> {
        if self.pos >= self.data.len() {
            return None;
        }
        let timestamp = read_timestamp(self.data, self.pos);
        let start = self.pos + EVENT_HEADER_SIZE;
        let end = start + read_length(self.data, self.pos);
        self.pos = end;
        Some(Event {
            timestamp,
            data: &self.data[start..end],
        })
    }
}

impl<'a> Iterator for EventIter<'a> {
    type Item = Event<'a>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.next_event()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_on(pitch: u8) -> [u8; 3] {
        [0x90, pitch, 100]
    }

    fn timestamps(buffer: &EventBuffer) -> Vec<Timestamp> {
        buffer.iter().map(|e| e.timestamp).collect()
    }

    fn buffer_at(times: &[Timestamp]) -> EventBuffer {
        let mut buffer = EventBuffer::new();
        for (i, &t) in times.iter().enumerate() {
            buffer.add_event(&note_on(i as u8), 3, t);
        }
        buffer
    }

    #[test]
    fn test_insertion_is_sorted_and_stable() {
        let buffer = buffer_at(&[5, 2, 8, 2]);
        let events: Vec<_> = buffer.iter().collect();
        assert_eq!(timestamps(&buffer), vec![2, 2, 5, 8]);
        // Equal timestamps keep insertion order.
        assert_eq!(events[0].data, &note_on(1));
        assert_eq!(events[1].data, &note_on(3));
        assert_eq!(buffer.num_events(), 4);
    }

    #[test]
    fn test_wire_layout() {
        let mut buffer = EventBuffer::new();
        buffer.add_event(&[0xc3, 0x05, 0x7f], 3, -2);
        assert_eq!(
            buffer.as_bytes(),
            &[0xfe, 0xff, 0xff, 0xff, 0x02, 0x00, 0xc3, 0x05]
        );
    }

    #[test]
    fn test_add_all_events_is_byte_identical() {
        let mut source = buffer_at(&[4, 0, 4, 17, 9]);
        source.add_event(&[0xf0, 0x7e, 0x01, 0xf7], 4, 3);
        let mut copy = EventBuffer::new();
        copy.add_events(&source, 0, -1, 0);
        assert_eq!(copy.as_bytes(), source.as_bytes());
    }

    #[test]
    fn test_add_events_window_and_offset() {
        let source = buffer_at(&[0, 3, 5, 8, 12]);
        let mut dest = buffer_at(&[6]);
        dest.add_events(&source, 3, 6, 100);
        assert_eq!(timestamps(&dest), vec![6, 103, 105, 108]);
    }

    #[test]
    fn test_clear_range_removes_exact_window() {
        let mut buffer = buffer_at(&[0, 3, 5, 5, 7, 8, 10]);
        buffer.clear_range(5, 3);
        assert_eq!(timestamps(&buffer), vec![0, 3, 8, 10]);
        let payloads: Vec<u8> = buffer.iter().map(|e| e.data[1]).collect();
        assert_eq!(payloads, vec![0, 1, 5, 6]);

        buffer.clear_range(20, 5);
        assert_eq!(buffer.num_events(), 4);
        buffer.clear_range(0, -1);
        assert_eq!(buffer.num_events(), 4);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut buffer = buffer_at(&[1, 2, 3]);
        let capacity = buffer.capacity();
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), capacity);
        assert_eq!(buffer.first_event_time(), 0);
        assert_eq!(buffer.last_event_time(), 0);
    }

    #[test]
    fn test_first_and_last_times() {
        let buffer = buffer_at(&[9, -4, 30]);
        assert_eq!(buffer.first_event_time(), -4);
        assert_eq!(buffer.last_event_time(), 30);
    }

    #[test]
    fn test_growth_policy() {
        let mut buffer = EventBuffer::new();
        buffer.add_event(&note_on(60), 3, 0);
        // 9 bytes needed: (9 + 4 + 8) & !7 = 16
        assert!(buffer.capacity() >= 16);
        assert_eq!(buffer.bytes_used(), 9);
    }

    #[test]
    fn test_malformed_payloads_are_dropped() {
        let mut buffer = EventBuffer::new();
        buffer.add_event(&[0x40, 0x7f], 2, 0);
        buffer.add_event(&[], 0, 0);
        buffer.add_event(&note_on(1), 0, 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_iterator_seek() {
        let buffer = buffer_at(&[1, 4, 4, 9]);
        let mut iter = buffer.iter();
        iter.set_next_sample_position(4);
        assert_eq!(iter.next_event().map(|e| e.timestamp), Some(4));
        iter.set_next_sample_position(5);
        assert_eq!(iter.next_event().map(|e| e.timestamp), Some(9));
        assert!(iter.next_event().is_none());
        iter.set_next_sample_position(100);
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_swap_and_copy() {
        let mut a = buffer_at(&[1, 2]);
        let mut b = buffer_at(&[7]);
        a.swap_with(&mut b);
        assert_eq!(timestamps(&a), vec![7]);
        assert_eq!(timestamps(&b), vec![1, 2]);

        a.copy_from(&b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_ensure_size() {
        let mut buffer = EventBuffer::new();
        buffer.ensure_size(2048);
        assert!(buffer.capacity() >= 2048);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_from_bytes_validation() {
        let source = buffer_at(&[0, 2, 2, 11]);
        let imported = EventBuffer::from_bytes(source.as_bytes()).unwrap();
        assert_eq!(imported, source);

        let bytes = source.as_bytes();
        assert!(matches!(
            EventBuffer::from_bytes(&bytes[..bytes.len() - 1]),
            Err(CoreError::MalformedEvents { offset: 27, .. })
        ));
        assert!(matches!(
            EventBuffer::from_bytes(&bytes[..4]),
            Err(CoreError::MalformedEvents { offset: 0, .. })
        ));

        let mut unordered = buffer_at(&[5]).as_bytes().to_vec();
        unordered.extend_from_slice(buffer_at(&[1]).as_bytes());
        assert!(EventBuffer::from_bytes(&unordered).is_err());
    }

    // =========================================================================
    // Length decoding
    // =========================================================================

    #[test]
    fn test_decode_channel_messages() {
        assert_eq!(decode_event_length(&[0x90, 60, 100], 3), EventLength::Fixed(3));
        assert_eq!(decode_event_length(&[0x90, 60, 100], 2), EventLength::Fixed(2));
        assert_eq!(decode_event_length(&[0xc0, 3, 0xff], 3), EventLength::Fixed(2));
        assert_eq!(decode_event_length(&[0xd0, 3], 3), EventLength::Fixed(2));
        assert_eq!(decode_event_length(&[0xe0, 0, 64], 8), EventLength::Fixed(3));
        assert_eq!(decode_event_length(&[0xf2, 1, 2], 3), EventLength::Fixed(3));
        assert_eq!(decode_event_length(&[0xf3, 1], 3), EventLength::Fixed(2));
        assert_eq!(decode_event_length(&[0xf8], 3), EventLength::Fixed(1));
        assert_eq!(decode_event_length(&[0x3c, 0x40], 2), EventLength::Invalid);
        assert_eq!(decode_event_length(&[], 4), EventLength::Invalid);
    }

    #[test]
    fn test_decode_sysex() {
        let sysex = [0xf0, 0x43, 0x12, 0x00, 0xf7, 0x90];
        assert_eq!(decode_event_length(&sysex, 6), EventLength::SysEx(5));
        assert_eq!(decode_event_length(&sysex, 3), EventLength::SysEx(3));
        assert_eq!(decode_event_length(&[0xf0], 1), EventLength::SysEx(1));
    }

    #[test]
    fn test_decode_meta() {
        let tempo = [0xff, 0x03, 0x07, 0xa1, 0x20];
        let decoded = decode_event_length(&tempo, 5);
        assert_eq!(decoded.len(), 5);
        assert!(matches!(
            decoded,
            EventLength::Meta {
                count: VarLen { value: 3, consumed: 1 },
                ..
            }
        ));
        assert_eq!(decode_event_length(&[0xff, 0x00], 8).len(), 2);
    }

    #[test]
    fn test_variable_length_quantity() {
        assert_eq!(read_variable_length(&[0x7f]), VarLen { value: 0x7f, consumed: 1 });
        assert_eq!(
            read_variable_length(&[0x81, 0x80, 0x00]),
            VarLen { value: 0x4000, consumed: 3 }
        );
        assert_eq!(read_variable_length(&[0xff; 10]).consumed, 6);
        assert_eq!(read_variable_length(&[]), VarLen { value: 0, consumed: 0 });
    }
}
