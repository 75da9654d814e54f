#![forbid(unsafe_code)]

//! Heuristic drag-and-drop detection.
//!
//! Several terminals deliver a dropped file path as an unbracketed quoted
//! literal (`'/path/to/file'`) followed by a brief pause, rather than as a
//! bracketed paste. This module watches the stream of already-decoded
//! single-character [`KeyEvent`]s for that shape: an opening quote starts a
//! suppressed accumulation that flushes either when a non-plain-character
//! event arrives (ordinary typing, not a drag) or when a quiet period
//! elapses (a drag, emitted as a synthetic paste).
//!
//! Timing is pull-based, matching the rest of the pipeline
//! ([`crate::router::Router`]): [`DragHeuristic::tick`] is the only place
//! time is observed, so tests can drive it with synthetic [`Instant`]s
//! instead of sleeping.

use std::time::{Duration, Instant};

use crate::event::KeyEvent;

/// Quiet period after the last absorbed character before an in-progress
/// accumulation is treated as a completed drop rather than ordinary typing.
pub const DRAG_COMPLETION_TIMEOUT: Duration = Duration::from_millis(100);

/// Result of feeding one decoded event through the heuristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragAction {
    /// No drag in progress; forward the event as ordinary input.
    Forward(KeyEvent),
    /// Event absorbed into an in-progress accumulation; nothing to emit yet.
    Suppressed,
    /// The accumulation turned out not to be a drag: replay the buffered
    /// events as ordinary input, followed by the event that ended drag mode.
    FlushThenForward(Vec<KeyEvent>, KeyEvent),
}

fn is_plain_char(event: &KeyEvent) -> bool {
    !event.ctrl && !event.meta && !event.shift && !event.paste && event.name.chars().count() == 1
}

fn is_opening_quote(event: &KeyEvent) -> bool {
    is_plain_char(event) && (event.name == "'" || event.name == "\"")
}

/// Quote-triggered drag-and-drop detector.
#[derive(Default)]
pub struct DragHeuristic {
    accumulator: Option<Vec<KeyEvent>>,
    deadline: Option<Instant>,
}

impl DragHeuristic {
    /// Create a heuristic with no accumulation in progress.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True while an accumulation is open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.accumulator.is_some()
    }

    /// The instant at which a pending accumulation should flush, if any.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Feed one decoded event through the heuristic.
    ///
    /// `diagnostic` is invoked on the quote-open and non-timeout flush
    /// transitions; callers that don't care can pass `|_| {}`. `Router` is
    /// the only caller that wires this to `debug_keystroke_logging` since
    /// it's the only component holding `PipelineConfig`.
    pub fn observe(&mut self, now: Instant, event: KeyEvent, mut diagnostic: impl FnMut(&str)) -> DragAction {
        match &mut self.accumulator {
            None => {
                if is_opening_quote(&event) {
                    self.accumulator = Some(vec![event]);
                    self.deadline = Some(now + DRAG_COMPLETION_TIMEOUT);
                    diagnostic("drag accumulator opened on leading quote byte");
                    DragAction::Suppressed
                } else {
                    DragAction::Forward(event)
                }
            }
            Some(buf) => {
                if is_plain_char(&event) {
                    buf.push(event);
                    self.deadline = Some(now + DRAG_COMPLETION_TIMEOUT);
                    DragAction::Suppressed
                } else {
                    let flushed = self.accumulator.take().expect("checked Some above");
                    self.deadline = None;
                    diagnostic("drag accumulator flushed as ordinary input, non-plain event observed");
                    DragAction::FlushThenForward(flushed, event)
                }
            }
        }
    }

    /// Advance time. Returns a synthetic paste event if the quiet timer has
    /// elapsed since the last byte observed.
    ///
    /// `diagnostic` is invoked when the quiet timer fires; see [`Self::observe`].
    pub fn tick(&mut self, now: Instant, mut diagnostic: impl FnMut(&str)) -> Option<KeyEvent> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        let buf = self.accumulator.take()?;
        self.deadline = None;
        diagnostic("drag accumulator quiet timer elapsed, emitting synthetic paste");
        let sequence: String = buf.iter().map(|e| e.sequence.as_str()).collect();
        Some(KeyEvent::paste(sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(c: char) -> KeyEvent {
        KeyEvent::key(c.to_string(), c.to_string())
    }

    /// Drive `observe` with a no-op diagnostic sink; most tests don't care
    /// about the diagnostic text, only the returned action.
    fn observe(drag: &mut DragHeuristic, now: Instant, event: KeyEvent) -> DragAction {
        drag.observe(now, event, |_| {})
    }

    fn tick(drag: &mut DragHeuristic, now: Instant) -> Option<KeyEvent> {
        drag.tick(now, |_| {})
    }

    #[test]
    fn plain_typing_never_enters_drag_mode() {
        let mut drag = DragHeuristic::new();
        let now = Instant::now();
        let action = observe(&mut drag, now, ch('x'));
        assert_eq!(action, DragAction::Forward(ch('x')));
        assert!(!drag.is_active());
    }

    #[test]
    fn opening_quote_suppresses_and_arms_timer() {
        let mut drag = DragHeuristic::new();
        let now = Instant::now();
        let action = observe(&mut drag, now, ch('\''));
        assert_eq!(action, DragAction::Suppressed);
        assert!(drag.is_active());
        assert_eq!(drag.next_deadline(), Some(now + DRAG_COMPLETION_TIMEOUT));
    }

    #[test]
    fn subsequent_plain_chars_reset_the_timer() {
        let mut drag = DragHeuristic::new();
        let t0 = Instant::now();
        observe(&mut drag, t0, ch('\''));
        let t1 = t0 + Duration::from_millis(50);
        observe(&mut drag, t1, ch('p'));
        assert_eq!(drag.next_deadline(), Some(t1 + DRAG_COMPLETION_TIMEOUT));
    }

    #[test]
    fn timer_expiry_emits_drag_paste() {
        let mut drag = DragHeuristic::new();
        let t0 = Instant::now();
        for c in ['\'', 'p', 'a', 't', 'h'] {
            observe(&mut drag, t0, ch(c));
        }
        assert!(tick(&mut drag, t0 + Duration::from_millis(50)).is_none());
        let flushed = tick(&mut drag, t0 + DRAG_COMPLETION_TIMEOUT).expect("expired");
        assert!(flushed.paste);
        assert_eq!(flushed.sequence, "'path");
        assert!(!drag.is_active());
    }

    #[test]
    fn non_plain_event_flushes_as_ordinary_run() {
        let mut drag = DragHeuristic::new();
        let t0 = Instant::now();
        observe(&mut drag, t0, ch('\''));
        observe(&mut drag, t0, ch('p'));

        let enter = KeyEvent::key("return", "\r");
        let action = observe(&mut drag, t0, enter.clone());
        assert_eq!(
            action,
            DragAction::FlushThenForward(vec![ch('\''), ch('p')], enter)
        );
        assert!(!drag.is_active());
    }

    #[test]
    fn quote_open_and_timeout_each_emit_one_diagnostic() {
        let mut drag = DragHeuristic::new();
        let t0 = Instant::now();
        let mut messages = Vec::new();
        drag.observe(t0, ch('\''), |m| messages.push(m.to_string()));
        drag.tick(t0 + DRAG_COMPLETION_TIMEOUT, |m| messages.push(m.to_string()));

        assert!(messages.iter().any(|m| m.contains("opened")));
        assert!(messages.iter().any(|m| m.contains("quiet timer elapsed")));
    }

    #[test]
    fn non_timeout_flush_emits_one_diagnostic() {
        let mut drag = DragHeuristic::new();
        let t0 = Instant::now();
        drag.observe(t0, ch('\''), |_| {});
        let mut messages = Vec::new();
        drag.observe(t0, KeyEvent::key("return", "\r"), |m| messages.push(m.to_string()));

        assert!(messages.iter().any(|m| m.contains("flushed")));
    }
}
