#![forbid(unsafe_code)]

//! Kitty keyboard protocol / CSI decoding.
//!
//! This module is a pure, buffer-in / outcome-out decoder: it owns no state
//! of its own. [`crate::router::Router`] owns the accumulating `kitty_buffer`
//! and repeatedly calls [`try_parse`] against it, draining consumed bytes and
//! emitting events as matches are found:
//!
//! 1. Append incoming bytes to the buffer.
//! 2. Attempt a parse from the start; on [`ParseOutcome::Matched`], consume
//!    the matched prefix and retry (so two sequences concatenated in one
//!    chunk each produce an event).
//! 3. On [`ParseOutcome::Partial`], stop and wait for more bytes.
//! 4. On [`ParseOutcome::Reject`] (or when the buffer exceeds the router's
//!    cap), the caller clears the buffer and replays the same bytes through
//!    [`crate::legacy_decoder`].
//!
//! A structurally valid sequence whose keycode has no known mapping (e.g. a
//! reserved Kitty functional keycode, or an unmapped tilde number) still
//! consumes its bytes — it is matched with `event: None`, an explicit silent
//! discard rather than a fallback, so every byte still leaves the pipeline as
//! one event, part of a paste, or an explicit drop.

use crate::event::{key_names, KeyEvent};
use crate::parse::ParseOutcome;

const ESC: u8 = 0x1B;

/// Recognized CSI letter-form final bytes.
const RECOGNIZED_LETTERS: &[u8] = b"ABCDHFZPQRS";

/// Try to parse a Kitty/CSI sequence from the front of `buf`.
///
/// `buf` is expected to start with `ESC` (0x1B); callers only route bytes
/// into the Kitty buffer once an escape has been seen, per
/// [`crate::router::Router`]'s dispatch rule.
pub fn try_parse(buf: &[u8]) -> ParseOutcome<Option<KeyEvent>> {
    if buf.is_empty() {
        return ParseOutcome::Partial;
    }
    if buf[0] != ESC {
        return ParseOutcome::Reject;
    }
    if buf.len() == 1 {
        return ParseOutcome::Partial;
    }
    if buf[1] != b'[' {
        // Not a CSI introducer (e.g. Alt+letter, or ESC ESC) — out of scope
        // for this decoder; let the legacy decoder's escape-state handle it.
        return ParseOutcome::Reject;
    }
    if buf.len() == 2 {
        return ParseOutcome::Partial;
    }

    // Scan for the final byte, validating parameter bytes along the way.
    let mut idx = 2;
    let final_byte = loop {
        if idx >= buf.len() {
            return ParseOutcome::Partial;
        }
        let b = buf[idx];
        match b {
            0x30..=0x3F => idx += 1, // parameter/intermediate byte (digits, ';', ':', etc.)
            0x40..=0x7E => break b,  // final byte
            _ => return ParseOutcome::Reject, // e.g. a bare ESC restarting the sequence
        }
    };

    if final_byte != b'u' && final_byte != b'~' && !RECOGNIZED_LETTERS.contains(&final_byte) {
        return ParseOutcome::Reject;
    }

    let consumed = idx + 1;
    let params = match std::str::from_utf8(&buf[2..idx]) {
        Ok(s) => s,
        Err(_) => return ParseOutcome::Reject,
    };

    let event = decode_sequence(params, final_byte);
    ParseOutcome::matched(event, consumed)
}

fn decode_sequence(params: &str, final_byte: u8) -> Option<KeyEvent> {
    let sequence = format!("\x1b[{params}{}", final_byte as char);
    match final_byte {
        b'u' => decode_kitty_u(params, &sequence),
        b'~' => decode_tilde(params, &sequence),
        _ => decode_letter(params, final_byte, &sequence),
    }
}

fn decode_kitty_u(params: &str, sequence: &str) -> Option<KeyEvent> {
    let mut parts = params.split(';');
    let key_code: u32 = parts.next()?.parse().ok()?;
    let (shift, meta, ctrl) = parts.next().map_or((false, false, false), parse_modifier_field);

    let name = kitty_keycode_name(key_code)?;
    Some(
        KeyEvent::key(name, sequence)
            .with_modifiers(ctrl, meta, shift)
            .with_kitty(true),
    )
}

fn kitty_keycode_name(code: u32) -> Option<String> {
    match code {
        13 | 57_414 => Some(key_names::RETURN.to_string()),
        27 => Some(key_names::ESCAPE.to_string()),
        9 => Some(key_names::TAB.to_string()),
        127 => Some(key_names::BACKSPACE.to_string()),
        _ => char::from_u32(code)
            .filter(|c| !c.is_control())
            .map(|c| c.to_string()),
    }
}

fn decode_tilde(params: &str, sequence: &str) -> Option<KeyEvent> {
    let mut parts = params.split(';');
    let num: u32 = parts.next()?.parse().ok()?;
    let (shift, meta, ctrl) = parts.next().map_or((false, false, false), parse_modifier_field);

    let name = match num {
        1 => key_names::HOME,
        2 => key_names::INSERT,
        3 => key_names::DELETE,
        4 => key_names::END,
        5 => key_names::PAGEUP,
        6 => key_names::PAGEDOWN,
        _ => return None,
    };

    Some(
        KeyEvent::key(name, sequence)
            .with_modifiers(ctrl, meta, shift)
            .with_kitty(true),
    )
}

fn decode_letter(params: &str, final_byte: u8, sequence: &str) -> Option<KeyEvent> {
    // The modifier, when present, is always the *last* semicolon-delimited
    // field (`ESC[1;2Z` as well as the bare `ESC[Z` form with no params).
    let modifier_field = params.rsplit(';').next().filter(|s| !s.is_empty());
    let (mut shift, meta, ctrl) = modifier_field.map_or((false, false, false), parse_modifier_field);

    let name = match final_byte {
        b'A' => key_names::UP,
        b'B' => key_names::DOWN,
        b'C' => key_names::RIGHT,
        b'D' => key_names::LEFT,
        b'H' => key_names::HOME,
        b'F' => key_names::END,
        b'Z' => {
            shift = true;
            key_names::TAB
        }
        b'P' => return Some(f_key(1, ctrl, meta, shift, sequence)),
        b'Q' => return Some(f_key(2, ctrl, meta, shift, sequence)),
        b'R' => return Some(f_key(3, ctrl, meta, shift, sequence)),
        b'S' => return Some(f_key(4, ctrl, meta, shift, sequence)),
        _ => return None,
    };

    Some(
        KeyEvent::key(name, sequence)
            .with_modifiers(ctrl, meta, shift)
            .with_kitty(true),
    )
}

fn f_key(n: u8, ctrl: bool, meta: bool, shift: bool, sequence: &str) -> KeyEvent {
    KeyEvent::key(key_names::f(n), sequence)
        .with_modifiers(ctrl, meta, shift)
        .with_kitty(true)
}

/// Decode the one-origin xterm modifier bitmask: `mod - 1` = bit0 shift,
/// bit1 alt/meta, bit2 ctrl.
fn parse_modifier_field(field: &str) -> (bool, bool, bool) {
    // Kitty's extended form allows a `:event-type` suffix (e.g. `5:2`); we
    // only care about the modifier value itself.
    let value: u32 = field
        .split(':')
        .next()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    let bits = value.saturating_sub(1);
    (bits & 1 != 0, bits & 2 != 0, bits & 4 != 0)
}
