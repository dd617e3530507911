//! Terminal handoff for `run` actions that exit.
//!
//! The session is left (raw mode off, alternate screen left) before the
//! process starts so it inherits a normal terminal. The process replaces the
//! UI: its exit code becomes beam's exit code.

use std::io::Write;
use std::process::{Child, Stdio};

use tracing::{debug, info};

use super::terminal_session::TerminalSession;
use crate::environment::HOST_MARKER_VAR;
use crate::error::{Error, Result};
use crate::generator::ProcessSpec;

/// Exit code reported when the process was terminated by a signal.
pub const SIGNALED_EXIT_CODE: i32 = 1;

/// Release the terminal, run `spec` with inherited stdio and return its
/// exit code.
pub fn execute<S: TerminalSession>(session: &mut S, spec: &ProcessSpec) -> Result<i32> {
    session.leave();
    info!(command = %spec.display(), "handing terminal to process");
    run_inherited(spec)
}

/// Run a process attached to the current terminal. `stdin` text, when
/// given, is piped instead of inheriting the terminal's input.
pub fn run_inherited(spec: &ProcessSpec) -> Result<i32> {
    let mut cmd = std::process::Command::new(&spec.program);
    cmd.args(&spec.args).env(HOST_MARKER_VAR, "1");
    if let Some(dir) = &spec.dir {
        cmd.current_dir(dir);
    }
    if spec.stdin.is_some() {
        cmd.stdin(Stdio::piped());
    }
    let mut child = cmd.spawn().map_err(|source| Error::Spawn {
        program: spec.program.clone(),
        source,
    })?;
    feed_stdin(&mut child, spec.stdin.as_deref())?;
    let status = child.wait()?;
    debug!(status = %status, "process exited");
    Ok(status.code().unwrap_or(SIGNALED_EXIT_CODE))
}

fn feed_stdin(child: &mut Child, input: Option<&str>) -> Result<()> {
    if let (Some(mut stdin), Some(input)) = (child.stdin.take(), input) {
        match stdin.write_all(input.as_bytes()) {
            Ok(()) => {}
            // The process may exit without reading its input.
            Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
