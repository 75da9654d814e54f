#![forbid(unsafe_code)]

//! Shared parse-outcome tag used by every byte-level decoder in the pipeline.
//!
//! Buffer-overflow and ambiguous-prefix handling is expressed as an explicit
//! result rather than exceptions or sentinel values: parse attempts return
//! `Matched(event, consumed)` / `Partial` / `Reject`, and the router
//! dispatches on the tag. This module is that result type, generic over the
//! event payload so [`crate::kitty_parser`] and [`crate::legacy_decoder`] can
//! share one vocabulary without depending on each other.

/// Outcome of attempting to parse a prefix of a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome<T> {
    /// A complete sequence matched; `consumed` bytes should be dropped from
    /// the front of the buffer and `event` emitted.
    Matched {
        /// The decoded event.
        event: T,
        /// Number of leading bytes the match consumed.
        consumed: usize,
    },
    /// The buffer looks like the start of a valid sequence but is
    /// incomplete; leave it intact and wait for more bytes.
    Partial,
    /// The buffer definitely does not match; the caller should fall through
    /// to the next decoder in the cascade with the same bytes.
    Reject,
}

impl<T> ParseOutcome<T> {
    /// Construct a [`ParseOutcome::Matched`].
    #[must_use]
    pub fn matched(event: T, consumed: usize) -> Self {
        Self::Matched { event, consumed }
    }

    /// True if this is [`ParseOutcome::Partial`].
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        matches!(self, Self::Partial)
    }

    /// True if this is [`ParseOutcome::Reject`].
    #[must_use]
    pub const fn is_reject(&self) -> bool {
        matches!(self, Self::Reject)
    }
}
