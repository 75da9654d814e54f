#![forbid(unsafe_code)]

//! Raw-mode lifecycle and byte/record intake.
//!
//! [`ByteIntake`] flips the terminal to raw mode on construction and back on
//! drop — panic-safe, because cleanup runs during unwinding. It cares only
//! about raw mode and the byte stream, so it is generic over a small
//! [`RawTerminal`] trait: production code drives it with
//! [`CrosstermTerminal`]; tests drive it with [`FixtureTerminal`] feeding
//! pre-recorded byte chunks, which is how the passthrough/framer tests in
//! this crate avoid needing a real TTY.

use std::io;
use std::time::Duration;

use crate::event::KeyEvent;

#[cfg(unix)]
use signal_hook::consts::signal::{SIGINT, SIGTERM};
#[cfg(unix)]
use signal_hook::iterator::Signals;

/// One item delivered by the intake, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeEvent {
    /// A keypress already decoded by the terminal backend.
    KeypressRecord(KeyEvent),
    /// An unparsed run of bytes for the router to decode itself.
    RawChunk(Vec<u8>),
}

/// Backend abstraction for raw-mode toggling and event delivery.
///
/// Implemented by [`CrosstermTerminal`] for production use and
/// [`FixtureTerminal`] for tests.
pub trait RawTerminal {
    /// Put the terminal into raw (unbuffered, unechoed) mode.
    fn enable_raw_mode(&mut self) -> io::Result<()>;
    /// Restore the terminal's previous mode.
    fn disable_raw_mode(&mut self) -> io::Result<()>;
    /// Block up to `timeout` for the next event; `Ok(false)` on timeout.
    fn poll(&mut self, timeout: Duration) -> io::Result<bool>;
    /// Retrieve the next available event, if any.
    fn next_event(&mut self) -> io::Result<Option<IntakeEvent>>;
}

/// Owns raw-mode entry/exit and forwards intake events to the router.
pub struct ByteIntake<T: RawTerminal> {
    terminal: T,
    active: bool,
    #[cfg(unix)]
    signal_guard: Option<SignalGuard>,
}

impl<T: RawTerminal> ByteIntake<T> {
    /// Enable raw mode and begin intake.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if raw mode cannot be enabled; the
    /// caller should treat this as fatal rather than retrying.
    pub fn activate(mut terminal: T) -> io::Result<Self> {
        install_panic_hook();

        #[cfg(unix)]
        let signal_guard = Some(SignalGuard::new()?);

        terminal.enable_raw_mode()?;

        Ok(Self {
            terminal,
            active: true,
            #[cfg(unix)]
            signal_guard,
        })
    }

    /// Block up to `timeout` for the next event.
    pub fn poll(&mut self, timeout: Duration) -> io::Result<bool> {
        self.terminal.poll(timeout)
    }

    /// Retrieve the next intake event, if any is ready.
    pub fn next_event(&mut self) -> io::Result<Option<IntakeEvent>> {
        self.terminal.next_event()
    }
}

impl<T: RawTerminal> Drop for ByteIntake<T> {
    fn drop(&mut self) {
        if self.active {
            let _ = self.terminal.disable_raw_mode();
            self.active = false;
        }
        #[cfg(unix)]
        {
            self.signal_guard.take();
        }
    }
}

fn install_panic_hook() {
    use std::sync::OnceLock;
    static HOOK: OnceLock<()> = OnceLock::new();
    HOOK.get_or_init(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let _ = crossterm::terminal::disable_raw_mode();
            previous(info);
        }));
    });
}

#[cfg(unix)]
struct SignalGuard {
    handle: signal_hook::iterator::Handle,
    thread: Option<std::thread::JoinHandle<()>>,
}

#[cfg(unix)]
impl SignalGuard {
    fn new() -> io::Result<Self> {
        let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(io::Error::other)?;
        let handle = signals.handle();
        let thread = std::thread::spawn(move || {
            for signal in signals.forever() {
                crate::warn!("termination signal {signal} received, restoring terminal");
                let _ = crossterm::terminal::disable_raw_mode();
                std::process::exit(128 + signal);
            }
        });
        Ok(Self { handle, thread: Some(thread) })
    }
}

#[cfg(unix)]
impl Drop for SignalGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Production [`RawTerminal`] backed by Crossterm.
pub struct CrosstermTerminal;

impl CrosstermTerminal {
    /// Construct the backend. Raw mode is not yet enabled; that happens in
    /// [`ByteIntake::activate`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for CrosstermTerminal {
    fn default() -> Self {
        Self::new()
    }
}

impl RawTerminal for CrosstermTerminal {
    fn enable_raw_mode(&mut self) -> io::Result<()> {
        crossterm::terminal::enable_raw_mode()
    }

    fn disable_raw_mode(&mut self) -> io::Result<()> {
        crossterm::terminal::disable_raw_mode()
    }

    fn poll(&mut self, timeout: Duration) -> io::Result<bool> {
        crossterm::event::poll(timeout)
    }

    fn next_event(&mut self) -> io::Result<Option<IntakeEvent>> {
        if !crossterm::event::poll(Duration::ZERO)? {
            return Ok(None);
        }
        match crossterm::event::read()? {
            crossterm::event::Event::Key(key) => Ok(keypress_record_from_crossterm(key).map(IntakeEvent::KeypressRecord)),
            _ => Ok(None),
        }
    }
}

fn keypress_record_from_crossterm(key: crossterm::event::KeyEvent) -> Option<KeyEvent> {
    use crossterm::event::{KeyCode, KeyEventKind, KeyModifiers};

    if key.kind != KeyEventKind::Press {
        return None;
    }

    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let meta = key.modifiers.contains(KeyModifiers::ALT);
    let shift = key.modifiers.contains(KeyModifiers::SHIFT);

    let (name, sequence) = match key.code {
        KeyCode::Char(c) => (c.to_string(), c.to_string()),
        KeyCode::Enter => (crate::event::key_names::RETURN.to_string(), "\r".to_string()),
        KeyCode::Esc => (crate::event::key_names::ESCAPE.to_string(), "\x1b".to_string()),
        KeyCode::Tab => (crate::event::key_names::TAB.to_string(), "\t".to_string()),
        KeyCode::Backspace => (crate::event::key_names::BACKSPACE.to_string(), "\x7f".to_string()),
        KeyCode::Delete => (crate::event::key_names::DELETE.to_string(), "\x1b[3~".to_string()),
        KeyCode::Home => (crate::event::key_names::HOME.to_string(), "\x1b[H".to_string()),
        KeyCode::End => (crate::event::key_names::END.to_string(), "\x1b[F".to_string()),
        KeyCode::Up => (crate::event::key_names::UP.to_string(), "\x1b[A".to_string()),
        KeyCode::Down => (crate::event::key_names::DOWN.to_string(), "\x1b[B".to_string()),
        KeyCode::Left => (crate::event::key_names::LEFT.to_string(), "\x1b[D".to_string()),
        KeyCode::Right => (crate::event::key_names::RIGHT.to_string(), "\x1b[C".to_string()),
        KeyCode::PageUp => (crate::event::key_names::PAGEUP.to_string(), "\x1b[5~".to_string()),
        KeyCode::PageDown => (crate::event::key_names::PAGEDOWN.to_string(), "\x1b[6~".to_string()),
        KeyCode::Insert => (crate::event::key_names::INSERT.to_string(), "\x1b[2~".to_string()),
        KeyCode::F(n) => (crate::event::key_names::f(n), format!("\x1b[{n}~")),
        _ => return None,
    };

    Some(KeyEvent::key(name, sequence).with_modifiers(ctrl, meta, shift))
}

/// Deterministic [`RawTerminal`] for tests: replays a queue of pre-recorded
/// [`IntakeEvent`]s instead of reading a real TTY, and no-ops raw-mode
/// toggling. This is how this crate's tests exercise the framer/router
/// against fixture byte arrays without a PTY.
#[cfg(any(test, feature = "test-helpers"))]
pub struct FixtureTerminal {
    queue: std::collections::VecDeque<IntakeEvent>,
}

#[cfg(any(test, feature = "test-helpers"))]
impl FixtureTerminal {
    /// Build a fixture backend that will yield `events` in order, then
    /// report no further events.
    #[must_use]
    pub fn new(events: Vec<IntakeEvent>) -> Self {
        Self { queue: events.into() }
    }

    /// Convenience constructor for a single raw chunk.
    #[must_use]
    pub fn from_raw_chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self::new(chunks.into_iter().map(IntakeEvent::RawChunk).collect())
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl RawTerminal for FixtureTerminal {
    fn enable_raw_mode(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn disable_raw_mode(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn poll(&mut self, _timeout: Duration) -> io::Result<bool> {
        Ok(!self.queue.is_empty())
    }

    fn next_event(&mut self) -> io::Result<Option<IntakeEvent>> {
        Ok(self.queue.pop_front())
    }
}
