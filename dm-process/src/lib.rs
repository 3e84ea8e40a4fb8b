// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#![deny(
  clippy::expect_used,
  clippy::panic,
  clippy::todo,
  clippy::unimplemented,
  clippy::unreachable,
  clippy::unwrap_used
)]


mod test_spawner;
mod tokio_spawner;

use async_trait::async_trait;
use dm_shutdown::Cancellation;
use std::collections::BTreeMap;
use std::path::PathBuf;
pub use test_spawner::{SpawnedProcess, TestChildHandle, TestProcessSpawner};
pub use tokio_spawner::TokioProcessSpawner;

#[cfg(test)]
#[ctor::ctor]
fn global_init() {
  dm_test_helpers::test_global_init();
}

//
// ProcessCommand
//

/// Everything needed to start a child process.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessCommand {
  pub program: String,
  pub args: Vec<String>,
  pub cwd: Option<PathBuf>,
  pub env: BTreeMap<String, String>,
  /// When false stdout and stderr are discarded and only the exit status is reported.
  pub capture_output: bool,
}

impl ProcessCommand {
  #[must_use]
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      ..Default::default()
    }
  }

  #[must_use]
  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  #[must_use]
  pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
    self.cwd = Some(cwd.into());
    self
  }

  #[must_use]
  pub fn envs(mut self, env: BTreeMap<String, String>) -> Self {
    self.env.extend(env);
    self
  }

  #[must_use]
  pub const fn capture_output(mut self, capture_output: bool) -> Self {
    self.capture_output = capture_output;
    self
  }
}

//
// ExitStatus
//

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExitStatus {
  code: Option<i32>,
}

impl ExitStatus {
  #[must_use]
  pub const fn from_code(code: i32) -> Self {
    Self { code: Some(code) }
  }

  /// The process was terminated by a signal and has no exit code.
  #[must_use]
  pub const fn signaled() -> Self {
    Self { code: None }
  }

  #[must_use]
  pub const fn code(&self) -> Option<i32> {
    self.code
  }

  #[must_use]
  pub const fn success(&self) -> bool {
    matches!(self.code, Some(0))
  }
}

impl From<std::process::ExitStatus> for ExitStatus {
  fn from(status: std::process::ExitStatus) -> Self {
    Self {
      code: status.code(),
    }
  }
}

impl std::fmt::Display for ExitStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self.code {
      Some(code) => write!(f, "exit code {code}"),
      None => write!(f, "terminated by signal"),
    }
  }
}

//
// Stream
//

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stream {
  Stdout,
  Stderr,
}

//
// ChildEvent
//

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChildEvent {
  Line(Stream, String),
  Exited(ExitStatus),
}

//
// ChildProcess
//

/// A running child. Output lines are delivered in order through `next_event()`, always before the
/// final `Exited` event.
#[async_trait]
pub trait ChildProcess: Send {
  fn pid(&self) -> Option<u32>;

  /// Must not be called again after `Exited` has been returned.
  async fn next_event(&mut self) -> anyhow::Result<ChildEvent>;

  /// Requests a forced kill. Does not wait for the process to exit.
  fn terminate(&mut self) -> anyhow::Result<()>;
}

//
// ProcessSpawner
//

#[async_trait]
pub trait ProcessSpawner: Send + Sync {
  async fn spawn(&self, command: &ProcessCommand) -> anyhow::Result<Box<dyn ChildProcess>>;
}

//
// ProcessOutput
//

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessOutput {
  pub status: ExitStatus,
  /// Lines joined with `\n`.
  pub stdout: String,
  /// Lines joined with `\n`.
  pub stderr: String,
}

//
// RunError
//

#[derive(thiserror::Error, Debug)]
pub enum RunError {
  #[error("process cancelled")]
  Cancelled,
  #[error("unhandled error: {0}")]
  Unhandled(#[from] anyhow::Error),
}

fn append_line(buffer: &mut String, line: &str) {
  if !buffer.is_empty() {
    buffer.push('\n');
  }
  buffer.push_str(line);
}

/// Drives a child to completion, handing each output line to `on_line` as it arrives. If the
/// cancellation fires first the child is terminated once and `RunError::Cancelled` is returned.
pub async fn run_to_completion(
  mut child: Box<dyn ChildProcess>,
  cancellation: &mut Cancellation,
  mut on_line: impl FnMut(Stream, &str) + Send,
) -> Result<ProcessOutput, RunError> {
  let mut stdout = String::new();
  let mut stderr = String::new();

  loop {
    let event = tokio::select! {
      biased;
      () = cancellation.cancelled() => None,
      event = child.next_event() => Some(event?),
    };

    let Some(event) = event else {
      log::debug!("cancelling child process {:?}", child.pid());
      if let Err(e) = child.terminate() {
        log::warn!("failed to terminate child process {:?}: {e}", child.pid());
      }
      return Err(RunError::Cancelled);
    };

    match event {
      ChildEvent::Line(stream, line) => {
        on_line(stream, &line);
        match stream {
          Stream::Stdout => append_line(&mut stdout, &line),
          Stream::Stderr => append_line(&mut stderr, &line),
        }
      },
      ChildEvent::Exited(status) => {
        log::debug!("child process {:?} exited: {status}", child.pid());
        return Ok(ProcessOutput {
          status,
          stdout,
          stderr,
        });
      },
    }
  }
}
