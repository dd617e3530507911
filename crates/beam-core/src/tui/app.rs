//! Event loop.
//!
//! The loop runs on the calling thread and is the only place the paginator
//! is touched. Each iteration carries out pending effects, draws the top
//! frame, drains task completions and waits one tick for terminal input.
//! Tasks run on the tokio runtime behind `handle` and report back through
//! an unbounded channel.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::command_handoff;
use super::terminal_session::{SessionError, SessionEvent, SessionGuard, TerminalSession};
use super::views::{RenderOptions, render_runner};
use crate::generator::{GeneratorContext, ProcessSpec};
use crate::paginator::{Effect, Msg, Paginator};

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// How long one poll for terminal input may block.
    pub tick: Duration,
    pub show_accessories: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(50),
            show_accessories: true,
        }
    }
}

pub type TuiResult<T> = std::result::Result<T, TuiError>;

#[derive(Debug, thiserror::Error)]
pub enum TuiError {
    #[error("terminal error: {0}")]
    Session(#[from] SessionError),

    #[error(transparent)]
    Beam(#[from] crate::error::Error),
}

impl From<SessionEvent> for Msg {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::Key(key) => Self::Key(key),
            SessionEvent::Resize { width, height } => Self::Resize { width, height },
        }
    }
}

pub struct App {
    paginator: Paginator,
    ctx: GeneratorContext,
    handle: Handle,
    config: AppConfig,
    tx: mpsc::UnboundedSender<Msg>,
    rx: mpsc::UnboundedReceiver<Msg>,
    pending: VecDeque<Effect>,
}

impl App {
    #[must_use]
    pub fn new(paginator: Paginator, ctx: GeneratorContext, handle: Handle, config: AppConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            paginator,
            ctx,
            handle,
            config,
            tx,
            rx,
            pending: VecDeque::new(),
        }
    }

    /// Run until a frame quits or hands the terminal to a process. Returns
    /// the exit code for the program.
    pub fn run<S: TerminalSession>(mut self, session: S) -> TuiResult<i32> {
        let mut session = SessionGuard::enter(session)?;
        let (width, height) = session.size()?;
        self.pending.extend(self.paginator.handle(Msg::Resize { width, height }));
        self.pending.extend(self.paginator.start());

        loop {
            while let Some(effect) = self.pending.pop_front() {
                match effect {
                    Effect::Spawn(task) => self.spawn(task),
                    Effect::Quit => {
                        debug!("quit requested");
                        return Ok(0);
                    }
                    Effect::Exec(command) => {
                        let spec = ProcessSpec::from_command(&command, &self.ctx.shell)?;
                        return Ok(command_handoff::execute(&mut *session, &spec)?);
                    }
                }
            }

            let options = RenderOptions {
                show_accessories: self.config.show_accessories,
                depth: self.paginator.depth(),
            };
            let paginator = &self.paginator;
            session.draw(&mut |frame| {
                let area = frame.area();
                render_runner(paginator.top(), &options, area, frame.buffer_mut());
            })?;

            while let Ok(msg) = self.rx.try_recv() {
                self.pending.extend(self.paginator.handle(msg));
            }
            if !self.pending.is_empty() {
                continue;
            }

            if let Some(event) = session.poll_event(self.config.tick)? {
                self.pending.extend(self.paginator.handle(event.into()));
            }
        }
    }

    fn spawn(&self, task: crate::task::Task) {
        trace!(runner = %task.runner, task = task.kind.name(), "spawning task");
        let tx = self.tx.clone();
        let ctx = self.ctx.clone();
        self.handle.spawn(async move {
            let completion = task.run(&ctx).await;
            // The receiver is gone once the loop has exited.
            let _ = tx.send(Msg::Completion(completion));
        });
    }
}

/// Run the page UI on the real terminal.
pub fn run_tui(
    paginator: Paginator,
    ctx: GeneratorContext,
    handle: Handle,
    config: AppConfig,
) -> TuiResult<i32> {
    App::new(paginator, ctx, handle, config).run(super::terminal_session::CrosstermSession::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::environment::Environment;
    use crate::generator::Generator;
    use crate::keymap::{Key, KeyInput};
    use crate::location::BaseLocation;
    use crate::page::{Action, Command, List, ListItem, Page};
    use crate::platform::{PlatformCall, RecordingPlatform};
    use crate::tui::terminal_session::MockTerminalSession;
    use crate::validate::SchemaValidator;

    fn fixture(page: Page, platform: RecordingPlatform) -> (App, tokio::runtime::Runtime) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let env = Arc::new(Environment::builder().cwd("/tmp").build());
        let base = BaseLocation::parse("file:///tmp/").unwrap();
        let paginator = Paginator::new(
            Generator::fixed(page, base),
            Arc::clone(&env),
            Box::new(platform),
            "Beam",
        )
        .unwrap();
        let ctx = GeneratorContext::new(
            env,
            Arc::new(SchemaValidator),
            "sh",
            reqwest::Client::new(),
        );
        let config = AppConfig {
            tick: Duration::from_millis(20),
            ..AppConfig::default()
        };
        let app = App::new(paginator, ctx, runtime.handle().clone(), config);
        (app, runtime)
    }

    fn key(key: Key) -> SessionEvent {
        SessionEvent::Key(KeyInput::plain(key))
    }

    #[test]
    fn escape_while_loading_quits() {
        let (app, _runtime) = fixture(Page::List(List::default()), RecordingPlatform::new());
        let session = MockTerminalSession::new(40, 10).with_events([key(Key::Esc)]);
        assert_eq!(app.run(session).unwrap(), 0);
    }

    #[test]
    fn enter_copies_after_load() {
        let platform = RecordingPlatform::new();
        let page = Page::List(List {
            items: vec![ListItem::new("A").with_action(Action::copy("hello"))],
            ..List::default()
        });
        let (app, _runtime) = fixture(page, platform.clone());
        let session = MockTerminalSession::new(40, 10)
            .then_idle(10)
            .with_events([key(Key::Enter)]);
        assert_eq!(app.run(session).unwrap(), 0);
        assert_eq!(platform.calls(), vec![PlatformCall::Copy("hello".into())]);
    }

    #[test]
    fn run_action_exits_with_process_status() {
        let page = Page::List(List {
            items: vec![ListItem::new("A").with_action(Action::run(Command::shell("exit 4"), None))],
            ..List::default()
        });
        let (app, _runtime) = fixture(page, RecordingPlatform::new());
        let session = MockTerminalSession::new(40, 10)
            .then_idle(10)
            .with_events([key(Key::Enter)]);
        assert_eq!(app.run(session).unwrap(), 4);
    }
}
