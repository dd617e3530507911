//! Terminal session ownership.
//!
//! A [`TerminalSession`] owns the terminal for the lifetime of the page UI:
//!
//! ```text
//! Idle ──enter()──▶ Active ──leave()──▶ Idle
//! ```
//!
//! [`SessionGuard`] calls `leave()` on drop so the terminal is restored
//! even when the loop exits through an error or a panic unwind.

use std::time::Duration;

use ratatui::Frame;

use super::output_gate::{self, GatePhase};
use crate::keymap::KeyInput;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    Idle,
    Active,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid phase transition: expected {expected:?}, got {actual:?}")]
    InvalidPhase {
        expected: SessionPhase,
        actual: SessionPhase,
    },
}

impl From<std::convert::Infallible> for SessionError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

/// Terminal input the event loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Key(KeyInput),
    Resize { width: u16, height: u16 },
}

/// Lifecycle interface over the real terminal and test doubles.
pub trait TerminalSession {
    fn phase(&self) -> SessionPhase;

    /// Acquire the terminal: raw mode on, alternate screen entered.
    fn enter(&mut self) -> Result<(), SessionError>;

    /// Current terminal size as `(width, height)`.
    fn size(&self) -> Result<(u16, u16), SessionError>;

    /// Render one frame.
    fn draw(&mut self, render: &mut dyn FnMut(&mut Frame<'_>)) -> Result<(), SessionError>;

    /// Wait up to `timeout` for the next input event.
    fn poll_event(&mut self, timeout: Duration) -> Result<Option<SessionEvent>, SessionError>;

    /// Release the terminal. No-op when already idle.
    fn leave(&mut self);
}

fn require(actual: SessionPhase, expected: SessionPhase) -> Result<(), SessionError> {
    if actual == expected {
        Ok(())
    } else {
        Err(SessionError::InvalidPhase { expected, actual })
    }
}

/// Leaves the wrapped session when dropped.
pub struct SessionGuard<S: TerminalSession> {
    session: S,
}

impl<S: TerminalSession> SessionGuard<S> {
    pub fn enter(mut session: S) -> Result<Self, SessionError> {
        session.enter()?;
        Ok(Self { session })
    }
}

impl<S: TerminalSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        self.session.leave();
    }
}

impl<S: TerminalSession> std::ops::Deref for SessionGuard<S> {
    type Target = S;
    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: TerminalSession> std::ops::DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

type CrosstermTerminal = ratatui::Terminal<ratatui::backend::CrosstermBackend<std::io::Stdout>>;

/// The real terminal, driven through crossterm.
#[derive(Default)]
pub struct CrosstermSession {
    phase: SessionPhase,
    terminal: Option<CrosstermTerminal>,
}

impl CrosstermSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn terminal(&mut self) -> Result<&mut CrosstermTerminal, SessionError> {
        let phase = self.phase;
        self.terminal.as_mut().ok_or(SessionError::InvalidPhase {
            expected: SessionPhase::Active,
            actual: phase,
        })
    }
}

impl TerminalSession for CrosstermSession {
    fn phase(&self) -> SessionPhase {
        self.phase
    }

    fn enter(&mut self) -> Result<(), SessionError> {
        require(self.phase, SessionPhase::Idle)?;

        crossterm::terminal::enable_raw_mode()?;
        if let Err(err) =
            crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)
        {
            let _ = crossterm::terminal::disable_raw_mode();
            return Err(err.into());
        }

        let backend = ratatui::backend::CrosstermBackend::new(std::io::stdout());
        match ratatui::Terminal::new(backend) {
            Ok(terminal) => {
                self.terminal = Some(terminal);
                self.phase = SessionPhase::Active;
                output_gate::set_phase(GatePhase::Active);
                Ok(())
            }
            Err(err) => {
                let _ = crossterm::terminal::disable_raw_mode();
                let _ = crossterm::execute!(
                    std::io::stdout(),
                    crossterm::terminal::LeaveAlternateScreen
                );
                Err(err.into())
            }
        }
    }

    fn size(&self) -> Result<(u16, u16), SessionError> {
        Ok(crossterm::terminal::size()?)
    }

    fn draw(&mut self, render: &mut dyn FnMut(&mut Frame<'_>)) -> Result<(), SessionError> {
        require(self.phase, SessionPhase::Active)?;
        self.terminal()?.draw(|frame| render(frame))?;
        Ok(())
    }

    fn poll_event(&mut self, timeout: Duration) -> Result<Option<SessionEvent>, SessionError> {
        use crossterm::event::{Event, KeyEventKind};

        require(self.phase, SessionPhase::Active)?;
        if !crossterm::event::poll(timeout)? {
            return Ok(None);
        }
        Ok(match crossterm::event::read()? {
            Event::Key(key) if key.kind != KeyEventKind::Release => {
                KeyInput::from_crossterm(&key).map(SessionEvent::Key)
            }
            Event::Resize(width, height) => Some(SessionEvent::Resize { width, height }),
            _ => None,
        })
    }

    fn leave(&mut self) {
        if self.phase == SessionPhase::Idle {
            return;
        }
        let _ = crossterm::terminal::disable_raw_mode();
        if let Some(terminal) = &mut self.terminal {
            let _ = crossterm::execute!(
                terminal.backend_mut(),
                crossterm::terminal::LeaveAlternateScreen
            );
            let _ = terminal.show_cursor();
        }
        self.terminal = None;
        self.phase = SessionPhase::Idle;
        output_gate::set_phase(GatePhase::Inactive);
    }
}

/// In-memory session for tests: renders into a `TestBackend` and replays
/// queued events.
#[cfg(any(test, feature = "test-util"))]
pub struct MockTerminalSession {
    phase: SessionPhase,
    terminal: ratatui::Terminal<ratatui::backend::TestBackend>,
    /// Lifecycle transitions in order.
    pub history: Vec<&'static str>,
    /// Scripted `poll_event` results, front first. `None` entries are idle
    /// ticks. Polling past the end of the script is an error.
    pub pending_events: std::collections::VecDeque<Option<SessionEvent>>,
}

#[cfg(any(test, feature = "test-util"))]
impl MockTerminalSession {
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        let backend = ratatui::backend::TestBackend::new(width, height);
        #[allow(clippy::expect_used)]
        let terminal = ratatui::Terminal::new(backend).expect("test backend");
        Self {
            phase: SessionPhase::Idle,
            terminal,
            history: Vec::new(),
            pending_events: std::collections::VecDeque::new(),
        }
    }

    #[must_use]
    pub fn with_events(mut self, events: impl IntoIterator<Item = SessionEvent>) -> Self {
        self.pending_events.extend(events.into_iter().map(Some));
        self
    }

    /// Append `ticks` idle polls, each sleeping for the poll timeout.
    #[must_use]
    pub fn then_idle(mut self, ticks: usize) -> Self {
        self.pending_events.extend(std::iter::repeat_n(None, ticks));
        self
    }

    /// Text of the last rendered frame, one line per row.
    #[must_use]
    pub fn screen(&self) -> String {
        let buffer = self.terminal.backend().buffer();
        let area = buffer.area;
        (0..area.height)
            .map(|y| {
                (0..area.width)
                    .map(|x| buffer[(x, y)].symbol())
                    .collect::<String>()
                    .trim_end()
                    .to_string()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(any(test, feature = "test-util"))]
impl TerminalSession for MockTerminalSession {
    fn phase(&self) -> SessionPhase {
        self.phase
    }

    fn enter(&mut self) -> Result<(), SessionError> {
        require(self.phase, SessionPhase::Idle)?;
        self.phase = SessionPhase::Active;
        self.history.push("enter");
        Ok(())
    }

    fn size(&self) -> Result<(u16, u16), SessionError> {
        let area = self.terminal.backend().buffer().area;
        Ok((area.width, area.height))
    }

    fn draw(&mut self, render: &mut dyn FnMut(&mut Frame<'_>)) -> Result<(), SessionError> {
        require(self.phase, SessionPhase::Active)?;
        self.terminal.draw(|frame| render(frame))?;
        self.history.push("draw");
        Ok(())
    }

    fn poll_event(&mut self, timeout: Duration) -> Result<Option<SessionEvent>, SessionError> {
        require(self.phase, SessionPhase::Active)?;
        match self.pending_events.pop_front() {
            Some(Some(event)) => Ok(Some(event)),
            Some(None) => {
                std::thread::sleep(timeout);
                Ok(None)
            }
            None => Err(SessionError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "scripted events exhausted",
            ))),
        }
    }

    fn leave(&mut self) {
        if self.phase != SessionPhase::Idle {
            self.history.push("leave");
            self.phase = SessionPhase::Idle;
        }
    }
}
