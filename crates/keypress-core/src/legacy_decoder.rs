#![forbid(unsafe_code)]

//! Classic (non-Kitty) keypress decoding.
//!
//! Receives bytes the Kitty parser declined, or the entire raw stream when
//! Kitty protocol decoding is disabled. It is a small byte-at-a-time state
//! machine — Ground / Escape / Csi / a short UTF-8 continuation buffer —
//! deliberately narrower than [`crate::kitty_parser`]: only the classic
//! arrow/home/end/shift-tab CSI letter forms are recognised here (exactly
//! `A..D`, `H`, `F`, `Z`); anything else terminating a CSI sequence is
//! dropped silently, an explicit discard rather than a guess.

use crate::event::{key_names, KeyEvent};

/// Cap on accumulated CSI parameter bytes, mirroring the cap already
/// enforced on `Router`'s `kitty_buffer`: a parameter-byte stream with no
/// final byte (Kitty protocol disabled, or mid-sequence after a kitty-buffer
/// overflow replay) would otherwise grow `State::Csi`'s `Vec<u8>` forever.
const MAX_CSI_LEN: usize = 256;

enum State {
    Ground,
    /// Saw a bare `ESC`; waiting to see whether `[` follows (CSI) or some
    /// other byte (Alt+key).
    Escape,
    /// Saw `ESC [`; accumulating parameter bytes until a final byte.
    Csi(Vec<u8>),
    /// Saw a UTF-8 lead byte; accumulating continuation bytes.
    Utf8 { buf: Vec<u8>, remaining: u8 },
}

/// Byte-at-a-time decoder for traditional (pre-Kitty) terminal input.
pub struct LegacyDecoder {
    state: State,
}

impl Default for LegacyDecoder {
    fn default() -> Self {
        Self { state: State::Ground }
    }
}

impl LegacyDecoder {
    /// Create a decoder starting in the ground state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-parsed keypress records from the intake are forwarded unchanged;
    /// this decoder never reinterprets them. Paste/drag suppression is
    /// applied by the router before a record reaches here.
    #[must_use]
    pub fn forward_record(record: KeyEvent) -> KeyEvent {
        record
    }

    /// Feed one raw byte, returning a decoded event if this byte completed
    /// one.
    ///
    /// `diagnostic` is invoked only if the CSI parameter buffer overflows
    /// its cap; callers that don't care can pass `|_| {}`. `Router` is the
    /// only caller that wires this to `debug_keystroke_logging` since it's
    /// the only component holding `PipelineConfig`.
    pub fn feed_byte(&mut self, byte: u8, mut diagnostic: impl FnMut(&str)) -> Option<KeyEvent> {
        match &mut self.state {
            State::Ground => self.feed_ground(byte),
            State::Escape => self.feed_escape(byte),
            State::Csi(_) => self.feed_csi(byte, &mut diagnostic),
            State::Utf8 { .. } => self.feed_utf8(byte),
        }
    }

    fn feed_ground(&mut self, byte: u8) -> Option<KeyEvent> {
        match byte {
            0x1b => {
                self.state = State::Escape;
                None
            }
            b'\r' => Some(KeyEvent::key(key_names::RETURN, "\r")),
            0x09 => Some(KeyEvent::key(key_names::TAB, "\t")),
            0x7f => Some(KeyEvent::key(key_names::BACKSPACE, "\x7f")),
            0x01..=0x1a => {
                let letter = (byte - 0x01 + b'a') as char;
                Some(
                    KeyEvent::key(letter.to_string(), (byte as char).to_string())
                        .with_modifiers(true, false, false),
                )
            }
            0x00..=0x7f => Some(KeyEvent::key((byte as char).to_string(), (byte as char).to_string())),
            _ => {
                let remaining = utf8_continuation_len(byte);
                if remaining == 0 {
                    // Invalid UTF-8 lead byte; explicit discard.
                    return None;
                }
                self.state = State::Utf8 { buf: vec![byte], remaining };
                None
            }
        }
    }

    fn feed_escape(&mut self, byte: u8) -> Option<KeyEvent> {
        if byte == b'[' {
            self.state = State::Csi(Vec::new());
            return None;
        }
        self.state = State::Ground;
        if byte == 0x1b {
            return Some(KeyEvent::key(key_names::ESCAPE, "\x1b\x1b").with_modifiers(false, true, false));
        }
        if byte.is_ascii_graphic() || byte == b' ' {
            let mut sequence = String::from('\x1b');
            sequence.push(byte as char);
            return Some(KeyEvent::key((byte as char).to_string(), sequence).with_modifiers(false, true, false));
        }
        None
    }

    fn feed_csi(&mut self, byte: u8, diagnostic: &mut dyn FnMut(&str)) -> Option<KeyEvent> {
        let State::Csi(params) = &mut self.state else {
            unreachable!("feed_csi only called in Csi state")
        };
        match byte {
            0x30..=0x3F => {
                params.push(byte);
                if params.len() > MAX_CSI_LEN {
                    diagnostic("legacy CSI parameter buffer exceeded cap, discarding and returning to ground");
                    self.state = State::Ground;
                }
                None
            }
            0x40..=0x7E => {
                let params = std::mem::take(params);
                self.state = State::Ground;
                decode_classic_csi(&params, byte)
            }
            _ => {
                // Malformed CSI sequence; explicit discard.
                self.state = State::Ground;
                None
            }
        }
    }

    fn feed_utf8(&mut self, byte: u8) -> Option<KeyEvent> {
        let State::Utf8 { buf, remaining } = &mut self.state else {
            unreachable!("feed_utf8 only called in Utf8 state")
        };
        buf.push(byte);
        *remaining -= 1;
        if *remaining > 0 {
            return None;
        }
        let buf = std::mem::take(buf);
        self.state = State::Ground;
        match std::str::from_utf8(&buf) {
            Ok(s) => Some(KeyEvent::key(s, s)),
            Err(_) => None,
        }
    }
}

fn utf8_continuation_len(lead: u8) -> u8 {
    match lead {
        0xC0..=0xDF => 1,
        0xE0..=0xEF => 2,
        0xF0..=0xF7 => 3,
        _ => 0,
    }
}

fn decode_classic_csi(params: &[u8], final_byte: u8) -> Option<KeyEvent> {
    let sequence = {
        let mut s = String::from("\x1b[");
        s.push_str(std::str::from_utf8(params).unwrap_or(""));
        s.push(final_byte as char);
        s
    };
    let name = match final_byte {
        b'A' => key_names::UP,
        b'B' => key_names::DOWN,
        b'C' => key_names::RIGHT,
        b'D' => key_names::LEFT,
        b'H' => key_names::HOME,
        b'F' => key_names::END,
        b'Z' => return Some(KeyEvent::key(key_names::TAB, sequence).with_modifiers(false, false, true)),
        _ => return None,
    };
    Some(KeyEvent::key(name, sequence))
}
