//! Asynchronous work executed off the UI loop.
//!
//! A [`Task`] is spawned for every generator invocation, nested process or
//! preview request. It runs to completion on the runtime and produces
//! exactly one [`Completion`], tagged with the runner and epoch it was
//! started for so stale results can be recognized and dropped.

use crate::error::Result;
use crate::generator::{Generator, GeneratorContext, ProcessSpec, run_process, send_request};
use crate::page::{Command, Page, Preview};

/// Identity of a runner for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunnerId(pub u64);

impl std::fmt::Display for RunnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runner-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskKind {
    /// Invoke the runner's generator.
    Generate {
        generator: Generator,
        /// Frame inputs bound by the initial-load form.
        inputs: Vec<(String, String)>,
        query: String,
    },
    /// Produce the text of a detail page backed by a command.
    DetailContent { command: Command },
    /// Evaluate a list item's preview.
    Preview { item: String, preview: Preview },
    /// Run a command once for a `run` action that reloads on success.
    RunOnce { command: Command },
}

impl TaskKind {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Generate { .. } => "generate",
            Self::DetailContent { .. } => "detail",
            Self::Preview { .. } => "preview",
            Self::RunOnce { .. } => "run",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub runner: RunnerId,
    pub epoch: u64,
    pub kind: TaskKind,
}

/// Payload of a finished task.
#[derive(Debug)]
pub enum TaskOutput {
    Page(Result<Page>),
    DetailContent(Result<String>),
    Preview { item: String, result: Result<String> },
    RunOnce(Result<()>),
}

/// Message posted back to the UI loop when a task finishes.
#[derive(Debug)]
pub struct Completion {
    pub runner: RunnerId,
    pub epoch: u64,
    pub output: TaskOutput,
}

impl Task {
    pub async fn run(self, ctx: &GeneratorContext) -> Completion {
        let output = match self.kind {
            TaskKind::Generate {
                generator,
                inputs,
                query,
            } => {
                let bindings = ctx.bindings().with_inputs(inputs).with_query(query);
                TaskOutput::Page(generator.load(&bindings, ctx).await)
            }
            TaskKind::DetailContent { command } => {
                TaskOutput::DetailContent(command_text(&command, ctx).await)
            }
            TaskKind::Preview { item, preview } => {
                let result = match preview {
                    Preview::Text(text) => Ok(text),
                    Preview::Command(command) => command_text(&command, ctx).await,
                    Preview::Request(request) => send_request(&request, &ctx.http)
                        .await
                        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
                };
                TaskOutput::Preview { item, result }
            }
            TaskKind::RunOnce { command } => {
                let result = match ProcessSpec::from_command(&command, &ctx.shell) {
                    Ok(spec) => run_process(&spec).await.map(drop),
                    Err(err) => Err(err),
                };
                TaskOutput::RunOnce(result)
            }
        };
        Completion {
            runner: self.runner,
            epoch: self.epoch,
            output,
        }
    }
}

async fn command_text(command: &Command, ctx: &GeneratorContext) -> Result<String> {
    let spec = ProcessSpec::from_command(command, &ctx.shell)?;
    let stdout = run_process(&spec).await?;
    Ok(String::from_utf8_lossy(&stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::environment::Environment;
    use crate::location::BaseLocation;
    use crate::page::{Detail, Page};
    use crate::validate::SchemaValidator;

    fn ctx() -> GeneratorContext {
        let env = Environment::builder().cwd("/tmp").build();
        GeneratorContext::new(
            Arc::new(env),
            Arc::new(SchemaValidator),
            "sh",
            reqwest::Client::new(),
        )
    }

    fn task(kind: TaskKind) -> Task {
        Task {
            runner: RunnerId(7),
            epoch: 3,
            kind,
        }
    }

    #[tokio::test]
    async fn completion_keeps_runner_and_epoch() {
        let page = Page::Detail(Detail {
            text: Some("hi".into()),
            ..Detail::default()
        });
        let generator = Generator::fixed(page.clone(), BaseLocation::parse("file:///tmp/").unwrap());
        let completion = task(TaskKind::Generate {
            generator,
            inputs: Vec::new(),
            query: String::new(),
        })
        .run(&ctx())
        .await;
        assert_eq!(completion.runner, RunnerId(7));
        assert_eq!(completion.epoch, 3);
        assert!(matches!(completion.output, TaskOutput::Page(Ok(loaded)) if loaded == page));
    }

    #[tokio::test]
    async fn command_preview_captures_stdout() {
        let completion = task(TaskKind::Preview {
            item: "a".into(),
            preview: Preview::Command(Command::shell("printf 'line 1\\nline 2'")),
        })
        .run(&ctx())
        .await;
        let TaskOutput::Preview { item, result } = completion.output else {
            panic!("expected a preview");
        };
        assert_eq!(item, "a");
        assert_eq!(result.unwrap(), "line 1\nline 2");
    }

    #[tokio::test]
    async fn run_once_reports_failure() {
        let completion = task(TaskKind::RunOnce {
            command: Command::shell("exit 5"),
        })
        .run(&ctx())
        .await;
        assert!(matches!(
            completion.output,
            TaskOutput::RunOnce(Err(crate::error::Error::CommandFailed { code: 5, .. }))
        ));
    }
}
