// gate-acceptor-runner/src/tail.rs
// ============================================================================
// Module: Output Tail Buffer
// Description: Fixed-capacity buffer keeping the most recent bytes of a stream.
// Purpose: Produce a bounded stdout snippet for results and reports.
// Dependencies: stdlib
// ============================================================================

//! ## Overview
//! The tail is a snippet, not an archive: the complete stream is captured to
//! disk and handed to the raw output store separately.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Marker prepended to a snippet whose head was dropped.
pub const TRUNCATED_PREFIX: &str = "...[truncated]\n";

// ============================================================================
// SECTION: Tail Buffer
// ============================================================================

/// Ring buffer retaining the last `capacity` bytes written to it.
///
/// # Invariants
/// - `bytes.len() <= capacity`.
/// - `dropped` counts every byte evicted or never stored.
#[derive(Debug, Clone)]
pub struct TailBuffer {
    /// Maximum retained bytes.
    capacity: usize,
    /// Retained bytes.
    bytes: VecDeque<u8>,
    /// Bytes discarded so far.
    dropped: u64,
}

impl TailBuffer {
    /// Creates an empty buffer with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            bytes: VecDeque::with_capacity(capacity.min(64 * 1024)),
            dropped: 0,
        }
    }

    /// Appends a chunk, evicting the oldest bytes past capacity.
    pub fn push(&mut self, chunk: &[u8]) {
        let keep = chunk.len().min(self.capacity);
        let skipped = chunk.len() - keep;
        let overflow = (self.bytes.len() + keep).saturating_sub(self.capacity);
        self.bytes.drain(.. overflow);
        self.bytes.extend(&chunk[skipped ..]);
        self.dropped = self.dropped.saturating_add(u64::try_from(skipped + overflow).unwrap_or(u64::MAX));
    }

    /// Returns true when any byte was discarded.
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.dropped > 0
    }

    /// Returns the number of discarded bytes.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Returns the number of retained bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true when nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Renders the retained bytes as text, marking truncation.
    ///
    /// Returns `None` when nothing was written.
    #[must_use]
    pub fn snippet(&self) -> Option<String> {
        if self.bytes.is_empty() {
            return None;
        }
        let (head, tail) = self.bytes.as_slices();
        let mut raw = Vec::with_capacity(self.bytes.len());
        raw.extend_from_slice(head);
        raw.extend_from_slice(tail);
        let text = String::from_utf8_lossy(&raw);
        Some(if self.is_truncated() {
            format!("{TRUNCATED_PREFIX}{text}")
        } else {
            text.into_owned()
        })
    }
}
