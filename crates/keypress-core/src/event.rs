#![forbid(unsafe_code)]

//! Canonical output type and configuration for the keypress pipeline.
//!
//! # Design Notes
//!
//! - `KeyEvent::name` is a canonical key identifier string (`"return"`,
//!   `"escape"`, a single printable character, or `""` for paste events)
//!   rather than an enum, so the pipeline can emit keys that have no fixed
//!   enum variant (arbitrary Kitty Unicode codepoints, function keys beyond
//!   F12) without a catch-all escape hatch.
//! - `sequence` always carries the exact bytes (as UTF-8) that produced the
//!   event, so callers can reconstruct or re-log the raw wire form.

use std::fmt;

/// A single decoded key or paste event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyEvent {
    /// Canonical key identifier, or `""` for paste events.
    pub name: String,
    /// The exact byte run that produced this event, as UTF-8 text.
    pub sequence: String,
    /// Ctrl modifier.
    pub ctrl: bool,
    /// Alt/meta modifier.
    pub meta: bool,
    /// Shift modifier.
    pub shift: bool,
    /// True for bracketed-paste and drag-synthesised events.
    pub paste: bool,
    /// True iff this event was decoded via a Kitty keyboard protocol sequence.
    pub kitty_protocol: bool,
}

impl KeyEvent {
    /// Build a plain key event with no modifiers, not paste, not kitty.
    #[must_use]
    pub fn key(name: impl Into<String>, sequence: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sequence: sequence.into(),
            ..Self::default()
        }
    }

    /// Build a paste event; `name` is always empty since a paste carries a
    /// run of bytes rather than a single key identifier.
    #[must_use]
    pub fn paste(sequence: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            sequence: sequence.into(),
            paste: true,
            ..Self::default()
        }
    }

    /// Set modifiers in one call.
    #[must_use]
    pub const fn with_modifiers(mut self, ctrl: bool, meta: bool, shift: bool) -> Self {
        self.ctrl = ctrl;
        self.meta = meta;
        self.shift = shift;
        self
    }

    /// Mark this event as decoded via the Kitty keyboard protocol.
    #[must_use]
    pub const fn with_kitty(mut self, kitty: bool) -> Self {
        self.kitty_protocol = kitty;
        self
    }
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.paste {
            write!(f, "paste({} bytes)", self.sequence.len())
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// Canonical key identifier strings shared across decoders.
pub mod key_names {
    pub const RETURN: &str = "return";
    pub const ESCAPE: &str = "escape";
    pub const TAB: &str = "tab";
    pub const BACKSPACE: &str = "backspace";
    pub const DELETE: &str = "delete";
    pub const HOME: &str = "home";
    pub const END: &str = "end";
    pub const UP: &str = "up";
    pub const DOWN: &str = "down";
    pub const LEFT: &str = "left";
    pub const RIGHT: &str = "right";
    pub const PAGEUP: &str = "pageup";
    pub const PAGEDOWN: &str = "pagedown";
    pub const INSERT: &str = "insert";

    /// Function key name, e.g. `f(1) == "f1"`.
    #[must_use]
    pub fn f(n: u8) -> String {
        format!("f{n}")
    }
}

/// Immutable configuration for a router instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineConfig {
    /// Enables Kitty keyboard protocol decoding.
    pub kitty_protocol_enabled: bool,
    /// When true, pre-parsed keypress records from the intake are bypassed
    /// and raw data chunks alone drive event generation (passthrough mode).
    pub paste_workaround: bool,
    /// Emits diagnostic records for buffer state transitions.
    pub debug_keystroke_logging: bool,
}

impl PipelineConfig {
    /// Create a config with Kitty protocol decoding enabled and nothing else.
    #[must_use]
    pub const fn kitty() -> Self {
        Self {
            kitty_protocol_enabled: true,
            paste_workaround: false,
            debug_keystroke_logging: false,
        }
    }
}
