#![forbid(unsafe_code)]

//! Terminal keypress pipeline: turns a raw terminal byte stream into a typed
//! stream of [`event::KeyEvent`]s, disambiguating ordinary keypresses, the
//! Kitty keyboard protocol, and bracketed-paste / drag-and-drop input.
//!
//! [`router::Router`] is the entry point: construct one with a
//! [`event::PipelineConfig`], [`router::Router::subscribe`] a handler, then
//! feed it [`byte_intake::IntakeEvent`]s (or raw byte chunks directly via
//! [`router::Router::feed_raw`]) as they arrive from a
//! [`byte_intake::ByteIntake`].

pub mod byte_intake;
pub mod drag_heuristic;
pub mod event;
pub mod kitty_parser;
pub mod legacy_decoder;
pub mod logging;
pub mod parse;
pub mod paste_framer;
pub mod router;
pub mod subscription;

pub use event::{KeyEvent, PipelineConfig};
pub use router::Router;
pub use subscription::SubscriptionId;

// Re-export tracing macros at crate root for ergonomic use.
#[cfg(feature = "tracing")]
pub use logging::{
    debug, debug_span, error, error_span, info, info_span, trace, trace_span, warn, warn_span,
};
