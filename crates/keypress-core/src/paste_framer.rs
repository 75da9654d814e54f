#![forbid(unsafe_code)]

//! Bracketed-paste framing across raw chunk boundaries.
//!
//! The framer is a tiny two-state machine (idle / pasting) plus a retained
//! tail of up to 5 bytes so that a marker split across two `read()` calls —
//! `ESC[20` arriving in one chunk and `0~` in the next — is still recognised.
//! It never interprets payload bytes; paste content is passed through
//! verbatim, newlines included.

use crate::event::KeyEvent;

const START_MARKER: &[u8] = b"\x1b[200~";
const END_MARKER: &[u8] = b"\x1b[201~";

/// Cap on the paste accumulator, mirroring the cap already enforced on
/// `Router`'s `kitty_buffer`: an unterminated `ESC[200~` followed by an
/// unbounded raw stream (no `ESC[201~` ever arrives) would otherwise grow
/// this buffer forever. On overflow the accumulated payload is discarded and
/// the framer returns to idle, the same "clear buffer, emit diagnostic,
/// continue" policy spec.md §7 gives the kitty buffer.
const MAX_PASTE_LEN: usize = 1024 * 1024;

/// One action produced while scanning a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramerEvent {
    /// Bytes outside any paste region; hand these to the kitty/legacy cascade.
    Bytes(Vec<u8>),
    /// A complete bracketed-paste payload.
    Paste(KeyEvent),
}

enum Scan {
    Found(usize),
    /// The buffer ends with a proper, non-empty prefix of `marker`.
    Partial(usize),
    NotFound,
}

fn scan(haystack: &[u8], marker: &[u8]) -> Scan {
    for i in 0..haystack.len() {
        let remaining = haystack.len() - i;
        if remaining >= marker.len() {
            if haystack[i..i + marker.len()] == *marker {
                return Scan::Found(i);
            }
        } else if marker.starts_with(&haystack[i..]) {
            return Scan::Partial(i);
        }
    }
    Scan::NotFound
}

/// Scans raw chunks for bracketed-paste markers, emitting ordinary byte runs
/// and paste events in arrival order.
#[derive(Default)]
pub struct PasteFramer {
    /// `Some` while inside a paste region; holds the bytes seen so far.
    accumulator: Option<Vec<u8>>,
    /// A marker prefix held back from the previous chunk, retried here.
    pending: Vec<u8>,
}

impl PasteFramer {
    /// Create an idle framer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a paste region is open (markers seen, payload accumulating).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.accumulator.is_some()
    }

    /// Scan one raw chunk, returning the ordinary-byte runs and any completed
    /// paste events, in order.
    ///
    /// `diagnostic` is invoked at idle→pasting, pasting→idle, and
    /// cap-overflow transitions; callers that don't care can pass `|_| {}`.
    /// `Router` is the only caller that wires this to `debug_keystroke_logging`
    /// since it's the only component holding `PipelineConfig`.
    pub fn process_chunk(&mut self, chunk: &[u8], mut diagnostic: impl FnMut(&str)) -> Vec<FramerEvent> {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(chunk);

        let mut out = Vec::new();
        let mut cur = 0;

        loop {
            if let Some(acc) = self.accumulator.as_mut() {
                match scan(&buf[cur..], END_MARKER) {
                    Scan::Found(i) => {
                        acc.extend_from_slice(&buf[cur..cur + i]);
                        cur += i + END_MARKER.len();
                        if acc.len() > MAX_PASTE_LEN {
                            diagnostic("paste accumulator exceeded cap before end marker, discarding and returning to idle");
                            self.accumulator = None;
                        } else {
                            let sequence = String::from_utf8_lossy(acc).into_owned();
                            out.push(FramerEvent::Paste(KeyEvent::paste(sequence)));
                            self.accumulator = None;
                            diagnostic("paste accumulator closed at end marker, pasting -> idle");
                        }
                    }
                    Scan::Partial(i) => {
                        acc.extend_from_slice(&buf[cur..cur + i]);
                        if acc.len() > MAX_PASTE_LEN {
                            diagnostic("paste accumulator exceeded cap, discarding and returning to idle");
                            self.accumulator = None;
                            self.pending.clear();
                        } else {
                            self.pending = buf[cur + i..].to_vec();
                        }
                        return out;
                    }
                    Scan::NotFound => {
                        acc.extend_from_slice(&buf[cur..]);
                        if acc.len() > MAX_PASTE_LEN {
                            diagnostic("paste accumulator exceeded cap, discarding and returning to idle");
                            self.accumulator = None;
                        }
                        return out;
                    }
                }
            } else {
                match scan(&buf[cur..], START_MARKER) {
                    Scan::Found(i) => {
                        if i > 0 {
                            out.push(FramerEvent::Bytes(buf[cur..cur + i].to_vec()));
                        }
                        self.accumulator = Some(Vec::new());
                        diagnostic("paste accumulator opened at start marker, idle -> pasting");
                        cur += i + START_MARKER.len();
                    }
                    Scan::Partial(i) => {
                        if i > 0 {
                            out.push(FramerEvent::Bytes(buf[cur..cur + i].to_vec()));
                        }
                        self.pending = buf[cur + i..].to_vec();
                        return out;
                    }
                    Scan::NotFound => {
                        if cur < buf.len() {
                            out.push(FramerEvent::Bytes(buf[cur..].to_vec()));
                        }
                        return out;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive `process_chunk` with a no-op diagnostic sink; most tests don't
    /// care about the diagnostic text, only the emitted events.
    fn chunk(framer: &mut PasteFramer, bytes: &[u8]) -> Vec<FramerEvent> {
        framer.process_chunk(bytes, |_| {})
    }

    fn bytes_out(events: &[FramerEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                FramerEvent::Bytes(b) => Some(b.clone()),
                FramerEvent::Paste(_) => None,
            })
            .flatten()
            .collect()
    }

    #[test]
    fn plain_bytes_pass_through_untouched() {
        let mut framer = PasteFramer::new();
        let out = chunk(&mut framer, b"hello");
        assert_eq!(out, vec![FramerEvent::Bytes(b"hello".to_vec())]);
    }

    #[test]
    fn single_chunk_paste() {
        let mut framer = PasteFramer::new();
        let out = chunk(&mut framer, b"\x1b[200~pasted\x1b[201~");
        assert_eq!(out, vec![FramerEvent::Paste(KeyEvent::paste("pasted"))]);
        assert!(!framer.is_active());
    }

    #[test]
    fn fragmented_paste_across_chunks() {
        let mut framer = PasteFramer::new();
        let mut out = chunk(&mut framer, b"\x1b[200~partial");
        out.extend(chunk(&mut framer, b" content\x1b[201~"));
        let pastes: Vec<_> = out
            .into_iter()
            .filter_map(|e| match e {
                FramerEvent::Paste(ev) => Some(ev),
                FramerEvent::Bytes(_) => None,
            })
            .collect();
        assert_eq!(pastes, vec![KeyEvent::paste("partial content")]);
    }

    #[test]
    fn mixed_stream_before_and_during_paste() {
        let mut framer = PasteFramer::new();
        let out = chunk(&mut framer, b"before\x1b[200~pasted\x1b[201~");
        assert_eq!(out[0], FramerEvent::Bytes(b"before".to_vec()));
        assert_eq!(out[1], FramerEvent::Paste(KeyEvent::paste("pasted")));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn marker_split_across_chunk_boundary() {
        let mut framer = PasteFramer::new();
        let out1 = chunk(&mut framer, b"\x1b[20");
        assert!(out1.is_empty());
        let out2 = chunk(&mut framer, b"0~hi\x1b[201~");
        assert_eq!(out2, vec![FramerEvent::Paste(KeyEvent::paste("hi"))]);
    }

    #[test]
    fn end_marker_split_across_chunk_boundary() {
        let mut framer = PasteFramer::new();
        chunk(&mut framer, b"\x1b[200~hi\x1b[20");
        assert!(framer.is_active());
        let out = chunk(&mut framer, b"1~");
        assert_eq!(out, vec![FramerEvent::Paste(KeyEvent::paste("hi"))]);
    }

    #[test]
    fn end_marker_while_idle_is_not_a_start_marker() {
        let mut framer = PasteFramer::new();
        let out = chunk(&mut framer, b"\x1b[201~");
        assert_eq!(bytes_out(&out), b"\x1b[201~".to_vec());
        assert!(!framer.is_active());
    }

    #[test]
    fn two_pastes_in_one_chunk() {
        let mut framer = PasteFramer::new();
        let out = chunk(&mut framer, b"\x1b[200~one\x1b[201~\x1b[200~two\x1b[201~");
        assert_eq!(
            out,
            vec![
                FramerEvent::Paste(KeyEvent::paste("one")),
                FramerEvent::Paste(KeyEvent::paste("two")),
            ]
        );
    }

    #[test]
    fn unterminated_paste_past_cap_is_discarded_not_grown_forever() {
        let mut framer = PasteFramer::new();
        chunk(&mut framer, b"\x1b[200~");
        assert!(framer.is_active());

        let filler = vec![b'x'; MAX_PASTE_LEN + 1];
        let out = chunk(&mut framer, &filler);

        assert!(out.is_empty(), "overflowing payload is discarded, not emitted");
        assert!(!framer.is_active(), "framer returns to idle on overflow");
    }

    #[test]
    fn overflow_diagnostic_fires_exactly_once_on_the_overflowing_chunk() {
        let mut framer = PasteFramer::new();
        let mut messages = Vec::new();
        framer.process_chunk(b"\x1b[200~", |m| messages.push(m.to_string()));
        let filler = vec![b'x'; MAX_PASTE_LEN + 1];
        framer.process_chunk(&filler, |m| messages.push(m.to_string()));

        assert!(messages.iter().any(|m| m.contains("exceeded cap")));
    }

    #[test]
    fn paste_open_and_close_each_emit_one_diagnostic() {
        let mut framer = PasteFramer::new();
        let mut messages = Vec::new();
        framer.process_chunk(b"\x1b[200~pasted\x1b[201~", |m| messages.push(m.to_string()));

        assert!(messages.iter().any(|m| m.contains("idle -> pasting")));
        assert!(messages.iter().any(|m| m.contains("pasting -> idle")));
    }
}
