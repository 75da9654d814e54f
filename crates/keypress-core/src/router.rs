#![forbid(unsafe_code)]

//! Top-level state machine composing the byte-level decoders.
//!
//! `Router` owns every buffer in the pipeline (`kitty_buffer`, `raw_buffer`,
//! the paste/drag accumulators via their owning components) and dispatches
//! each incoming [`IntakeEvent`] through the cascade:
//! `PasteFramer` → (`KittyParser` | `LegacyDecoder`) → `DragHeuristic` →
//! [`Subscription::broadcast`]. Timers are pull-based: callers drive time
//! forward with [`Router::tick`] and consult [`Router::next_deadline`] to
//! know when next to call it, rather than the router spawning anything
//! itself.

use std::time::{Duration, Instant};

use crate::byte_intake::IntakeEvent;
use crate::drag_heuristic::{DragAction, DragHeuristic};
use crate::event::{KeyEvent, PipelineConfig};
use crate::kitty_parser;
use crate::legacy_decoder::LegacyDecoder;
use crate::parse::ParseOutcome;
use crate::paste_framer::{FramerEvent, PasteFramer};
use crate::subscription::{Subscription, SubscriptionId};

/// Cap on the pending Kitty-sequence buffer; long enough for any well-formed
/// sequence this decoder recognises, short enough that a malformed stream
/// can't grow it unbounded.
const KITTY_BUFFER_CAP: usize = 64;
/// Passthrough raw-buffer length that forces an immediate flush rather than
/// waiting out the short-flush window.
const RAW_BUFFER_FLUSH_LEN: usize = 64;
/// Passthrough short-flush coalescing window (see `DESIGN.md`).
const SHORT_FLUSH_WINDOW: Duration = Duration::from_millis(8);

const PASTE_START_MARKER: &[u8] = b"\x1b[200~";

/// Composes the byte-level decoders and fans decoded events out to
/// subscribers.
pub struct Router {
    config: PipelineConfig,
    kitty_buffer: Vec<u8>,
    raw_buffer: Vec<u8>,
    flush_deadline: Option<Instant>,
    paste_framer: PasteFramer,
    drag: DragHeuristic,
    legacy: LegacyDecoder,
    subscription: Subscription,
}

impl Router {
    /// Create a router with empty buffers.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            kitty_buffer: Vec::new(),
            raw_buffer: Vec::new(),
            flush_deadline: None,
            paste_framer: PasteFramer::new(),
            drag: DragHeuristic::new(),
            legacy: LegacyDecoder::new(),
            subscription: Subscription::new(),
        }
    }

    /// Register a handler; see [`Subscription::subscribe`].
    pub fn subscribe(&mut self, handler: impl FnMut(&KeyEvent) + 'static) -> SubscriptionId {
        self.subscription.subscribe(handler)
    }

    /// Remove a previously registered handler.
    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscription.unsubscribe(id);
    }

    /// The next instant at which [`Router::tick`] should be called, if any
    /// timer is currently armed.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.drag.next_deadline(), self.flush_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) | (None, Some(a)) => Some(a),
            (None, None) => None,
        }
    }

    /// Advance time, firing any timer whose deadline has passed.
    pub fn tick(&mut self, now: Instant) {
        let debug_logging = self.config.debug_keystroke_logging;
        if let Some(paste) = self.drag.tick(now, |m| {
            if debug_logging {
                crate::debug!("{m}");
            }
        }) {
            self.broadcast(paste);
        }
        if let Some(deadline) = self.flush_deadline {
            if now >= deadline {
                self.flush_raw_buffer(now);
            }
        }
    }

    /// Feed one intake event (a pre-parsed keypress record or a raw byte
    /// chunk) into the pipeline.
    pub fn handle_intake_event(&mut self, now: Instant, event: IntakeEvent) {
        match event {
            IntakeEvent::KeypressRecord(record) => self.handle_keypress_record(now, record),
            IntakeEvent::RawChunk(chunk) => self.handle_raw_chunk(now, &chunk),
        }
    }

    /// Feed a raw byte chunk directly (bypassing [`IntakeEvent`] wrapping) —
    /// convenient for byte-array-driven tests and the PTY-fixture harness.
    pub fn feed_raw(&mut self, now: Instant, chunk: &[u8]) {
        self.handle_raw_chunk(now, chunk);
    }

    /// Feed a pre-parsed keypress record directly.
    pub fn feed_keypress_record(&mut self, now: Instant, record: KeyEvent) {
        self.handle_keypress_record(now, record);
    }

    fn handle_keypress_record(&mut self, now: Instant, record: KeyEvent) {
        if self.config.paste_workaround {
            // In passthrough mode pre-parsed records are ignored entirely;
            // only raw chunks drive the pipeline.
            return;
        }

        if record.ctrl && record.name == "c" && !self.kitty_buffer.is_empty() {
            self.diagnostic("ctrl+c clearing stuck kitty buffer");
            self.kitty_buffer.clear();
            self.broadcast(record);
            return;
        }

        let forwarded = LegacyDecoder::forward_record(record);
        self.dispatch_through_drag(now, forwarded);
    }

    fn handle_raw_chunk(&mut self, now: Instant, chunk: &[u8]) {
        if self.config.paste_workaround {
            self.raw_buffer.extend_from_slice(chunk);
            self.flush_deadline = Some(now + SHORT_FLUSH_WINDOW);
            if self.raw_buffer.len() > RAW_BUFFER_FLUSH_LEN {
                self.flush_raw_buffer(now);
            }
            return;
        }
        self.ingest_raw_bytes(now, chunk);
    }

    fn flush_raw_buffer(&mut self, now: Instant) {
        self.flush_deadline = None;
        let buffer = std::mem::take(&mut self.raw_buffer);
        if buffer.is_empty() {
            return;
        }
        if Self::should_coalesce_as_paste(&buffer) {
            let sequence = String::from_utf8_lossy(&buffer).into_owned();
            self.broadcast(KeyEvent::paste(sequence));
        } else {
            self.ingest_raw_bytes(now, &buffer);
        }
    }

    /// Buffered bytes that contain a paste start marker, a drag-opening
    /// quote followed by more bytes, or a bare carriage return coalesce into
    /// a single paste event rather than individual keypresses.
    fn should_coalesce_as_paste(buf: &[u8]) -> bool {
        let has_start_marker = buf.windows(PASTE_START_MARKER.len()).any(|w| w == PASTE_START_MARKER);
        let drag_opening = buf.len() > 1 && matches!(buf.first(), Some(b'\'') | Some(b'"'));
        let has_cr = buf.contains(&b'\r');
        has_start_marker || drag_opening || has_cr
    }

    fn ingest_raw_bytes(&mut self, now: Instant, chunk: &[u8]) {
        let debug_logging = self.config.debug_keystroke_logging;
        let framer_events = self.paste_framer.process_chunk(chunk, |m| {
            if debug_logging {
                crate::debug!("{m}");
            }
        });
        for framer_event in framer_events {
            match framer_event {
                FramerEvent::Paste(event) => self.broadcast(event),
                FramerEvent::Bytes(bytes) => {
                    for b in bytes {
                        self.feed_byte(now, b);
                    }
                }
            }
        }
    }

    fn feed_byte(&mut self, now: Instant, byte: u8) {
        if self.config.kitty_protocol_enabled && (!self.kitty_buffer.is_empty() || byte == 0x1b) {
            self.kitty_buffer.push(byte);
            self.drain_kitty_buffer(now);
        } else {
            let debug_logging = self.config.debug_keystroke_logging;
            let decoded = self.legacy.feed_byte(byte, |m| {
                if debug_logging {
                    crate::debug!("{m}");
                }
            });
            if let Some(event) = decoded {
                self.dispatch_through_drag(now, event);
            }
        }
    }

    fn drain_kitty_buffer(&mut self, now: Instant) {
        loop {
            match kitty_parser::try_parse(&self.kitty_buffer) {
                ParseOutcome::Matched { event, consumed } => {
                    self.kitty_buffer.drain(..consumed);
                    if let Some(event) = event {
                        self.dispatch_through_drag(now, event);
                    }
                    if self.kitty_buffer.is_empty() {
                        break;
                    }
                }
                ParseOutcome::Partial => {
                    if self.kitty_buffer.len() > KITTY_BUFFER_CAP {
                        self.diagnostic("kitty buffer exceeded cap, clearing and falling back");
                        let overflow = std::mem::take(&mut self.kitty_buffer);
                        self.replay_to_legacy(now, &overflow);
                    }
                    break;
                }
                ParseOutcome::Reject => {
                    self.diagnostic("kitty parse rejected, falling back to legacy decoder");
                    let rejected = std::mem::take(&mut self.kitty_buffer);
                    self.replay_to_legacy(now, &rejected);
                    break;
                }
            }
        }
    }

    fn replay_to_legacy(&mut self, now: Instant, bytes: &[u8]) {
        let debug_logging = self.config.debug_keystroke_logging;
        for &b in bytes {
            let decoded = self.legacy.feed_byte(b, |m| {
                if debug_logging {
                    crate::debug!("{m}");
                }
            });
            if let Some(event) = decoded {
                self.dispatch_through_drag(now, event);
            }
        }
    }

    fn dispatch_through_drag(&mut self, now: Instant, event: KeyEvent) {
        let debug_logging = self.config.debug_keystroke_logging;
        match self.drag.observe(now, event, |m| {
            if debug_logging {
                crate::debug!("{m}");
            }
        }) {
            DragAction::Forward(event) => self.broadcast(event),
            DragAction::Suppressed => {}
            DragAction::FlushThenForward(buffered, event) => {
                for buffered_event in buffered {
                    self.broadcast(buffered_event);
                }
                self.broadcast(event);
            }
        }
    }

    fn broadcast(&mut self, event: KeyEvent) {
        self.subscription.broadcast(&event);
    }

    fn diagnostic(&self, message: &str) {
        if self.config.debug_keystroke_logging {
            crate::debug!("{message}");
        }
    }
}
