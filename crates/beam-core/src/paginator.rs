//! Navigation stack and message routing.
//!
//! The paginator owns every runner and is the only place state changes:
//! [`Paginator::handle`] consumes one [`Msg`] and returns the [`Effect`]s the
//! event loop must carry out. Only the top runner receives keys; task
//! completions are routed by runner id, and completions for runners no
//! longer on the stack are dropped.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::environment::Environment;
use crate::error::Result;
use crate::generator::Generator;
use crate::keymap::KeyInput;
use crate::page::{Command, Input};
use crate::platform::Platform;
use crate::runner::{Outcome, Runner};
use crate::task::{Completion, RunnerId, Task};

/// Input to the state machine.
#[derive(Debug)]
pub enum Msg {
    Key(KeyInput),
    Resize { width: u16, height: u16 },
    Completion(Completion),
}

/// Work the event loop performs on the paginator's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Run a task off the UI loop and post its completion back.
    Spawn(Task),
    /// Hand the terminal to a process, then exit with its status.
    Exec(Command),
    /// Terminate the program.
    Quit,
}

pub struct Paginator {
    stack: Vec<Runner>,
    next_id: u64,
    env: Arc<Environment>,
    platform: Box<dyn Platform>,
    default_title: String,
    height: u16,
}

impl std::fmt::Debug for Paginator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paginator")
            .field("depth", &self.stack.len())
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl Paginator {
    /// Build the root frame. Failure here is the only fatal error.
    pub fn new(
        root: Generator,
        env: Arc<Environment>,
        platform: Box<dyn Platform>,
        default_title: impl Into<String>,
    ) -> Result<Self> {
        Self::with_inputs(root, Vec::new(), env, platform, default_title)
    }

    /// Build the root frame, collecting `inputs` before its first load.
    pub fn with_inputs(
        root: Generator,
        inputs: Vec<Input>,
        env: Arc<Environment>,
        platform: Box<dyn Platform>,
        default_title: impl Into<String>,
    ) -> Result<Self> {
        let default_title = default_title.into();
        let runner = Runner::new(RunnerId(0), root, Arc::clone(&env), default_title.clone())?
            .with_inputs(inputs);
        Ok(Self {
            stack: vec![runner],
            next_id: 1,
            env,
            platform,
            default_title,
            height: 0,
        })
    }

    /// Effects of the root frame's first load.
    pub fn start(&mut self) -> Vec<Effect> {
        let index = self.stack.len() - 1;
        let outcomes = self.stack[index].init();
        self.apply(index, outcomes)
    }

    /// The frame being shown.
    #[must_use]
    pub fn top(&self) -> &Runner {
        // The stack is never empty: popping the last frame quits instead.
        &self.stack[self.stack.len() - 1]
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn handle(&mut self, msg: Msg) -> Vec<Effect> {
        match msg {
            Msg::Key(key) => {
                let index = self.stack.len() - 1;
                let outcomes = self.stack[index].handle_key(key);
                self.apply(index, outcomes)
            }
            Msg::Resize { height, .. } => {
                self.height = height;
                for runner in &mut self.stack {
                    runner.resize(height);
                }
                Vec::new()
            }
            Msg::Completion(completion) => {
                let Some(index) = self
                    .stack
                    .iter()
                    .position(|runner| runner.id() == completion.runner)
                else {
                    trace!(runner = %completion.runner, "dropping result for discarded runner");
                    return Vec::new();
                };
                let outcomes = self.stack[index].on_completion(completion.epoch, completion.output);
                self.apply(index, outcomes)
            }
        }
    }

    fn apply(&mut self, index: usize, outcomes: Vec<Outcome>) -> Vec<Effect> {
        let mut effects = Vec::new();
        for outcome in outcomes {
            match outcome {
                Outcome::Spawn(kind) => {
                    let runner = &self.stack[index];
                    effects.push(Effect::Spawn(Task {
                        runner: runner.id(),
                        epoch: runner.epoch(),
                        kind,
                    }));
                }
                Outcome::Push(generator) => effects.extend(self.push(index, generator)),
                Outcome::Pop => {
                    if self.stack.len() == 1 {
                        effects.push(Effect::Quit);
                    } else if index == self.stack.len() - 1 {
                        let popped = self.stack.pop();
                        debug!(
                            runner = ?popped.map(|runner| runner.id()),
                            depth = self.stack.len(),
                            "popped runner"
                        );
                    }
                }
                Outcome::Quit => effects.push(Effect::Quit),
                Outcome::Exec(command) => effects.push(Effect::Exec(command)),
                Outcome::Copy(text) => match self.platform.copy_to_clipboard(&text) {
                    Ok(()) => effects.push(Effect::Quit),
                    Err(err) => self.stack[index].show_error(&err),
                },
                Outcome::Open(target) => match self.platform.open_target(&target) {
                    Ok(()) => effects.push(Effect::Quit),
                    Err(err) => self.stack[index].show_error(&err),
                },
            }
            if effects.contains(&Effect::Quit) {
                break;
            }
        }
        effects
    }

    fn push(&mut self, index: usize, generator: Generator) -> Vec<Effect> {
        let id = RunnerId(self.next_id);
        self.next_id += 1;
        let mut runner =
            match Runner::new(id, generator, Arc::clone(&self.env), self.default_title.clone()) {
                Ok(runner) => runner,
                Err(err) => {
                    self.stack[index].show_error(&err);
                    return Vec::new();
                }
            };
        if self.height > 0 {
            runner.resize(self.height);
        }
        let outcomes = runner.init();
        self.stack.push(runner);
        debug!(runner = %id, depth = self.stack.len(), "pushed runner");
        let top = self.stack.len() - 1;
        self.apply(top, outcomes)
    }
}
