// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use crate::{ChildEvent, ChildProcess, ExitStatus, ProcessCommand, ProcessSpawner, Stream};
use anyhow::anyhow;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use tokio::sync::mpsc;

const FIRST_TEST_PID: u32 = 1000;

//
// SpawnedProcess
//

/// Handed to the test for every spawn so it can inspect the command and script the child.
#[derive(Debug)]
pub struct SpawnedProcess {
  pub command: ProcessCommand,
  pub pid: u32,
  pub handle: TestChildHandle,
}

//
// TestChildHandle
//

#[derive(Debug)]
pub struct TestChildHandle {
  events_tx: mpsc::UnboundedSender<ChildEvent>,
  terminations: Arc<AtomicUsize>,
}

impl TestChildHandle {
  pub fn stdout(&self, line: &str) {
    self.send(ChildEvent::Line(Stream::Stdout, line.to_string()));
  }

  pub fn stderr(&self, line: &str) {
    self.send(ChildEvent::Line(Stream::Stderr, line.to_string()));
  }

  pub fn exit(&self, code: i32) {
    self.send(ChildEvent::Exited(ExitStatus::from_code(code)));
  }

  /// Number of times the child was asked to terminate.
  #[must_use]
  pub fn terminations(&self) -> usize {
    self.terminations.load(Ordering::SeqCst)
  }

  fn send(&self, event: ChildEvent) {
    // The child may already be gone if the caller was cancelled.
    if self.events_tx.send(event).is_err() {
      log::debug!("test child already dropped");
    }
  }
}

//
// TestProcessSpawner
//

/// A spawner whose children are driven by the test through `TestChildHandle`.
pub struct TestProcessSpawner {
  spawned_tx: mpsc::UnboundedSender<SpawnedProcess>,
  next_pid: AtomicU32,
  fail_next_spawn: AtomicBool,
}

impl TestProcessSpawner {
  #[must_use]
  pub fn new() -> (Self, mpsc::UnboundedReceiver<SpawnedProcess>) {
    let (spawned_tx, spawned_rx) = mpsc::unbounded_channel();
    (
      Self {
        spawned_tx,
        next_pid: AtomicU32::new(FIRST_TEST_PID),
        fail_next_spawn: AtomicBool::new(false),
      },
      spawned_rx,
    )
  }

  /// Makes the next spawn return an error, as if the executable could not be started.
  pub fn fail_next_spawn(&self) {
    self.fail_next_spawn.store(true, Ordering::SeqCst);
  }
}

#[async_trait]
impl ProcessSpawner for TestProcessSpawner {
  async fn spawn(&self, command: &ProcessCommand) -> anyhow::Result<Box<dyn ChildProcess>> {
    if self.fail_next_spawn.swap(false, Ordering::SeqCst) {
      anyhow::bail!("failed to spawn {}", command.program);
    }

    let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let terminations = Arc::new(AtomicUsize::new(0));

    self
      .spawned_tx
      .send(SpawnedProcess {
        command: command.clone(),
        pid,
        handle: TestChildHandle {
          events_tx,
          terminations: terminations.clone(),
        },
      })
      .map_err(|_| anyhow!("test spawn receiver dropped"))?;

    Ok(Box::new(TestChild {
      pid,
      events_rx,
      terminations,
    }))
  }
}

//
// TestChild
//

struct TestChild {
  pid: u32,
  events_rx: mpsc::UnboundedReceiver<ChildEvent>,
  terminations: Arc<AtomicUsize>,
}

#[async_trait]
impl ChildProcess for TestChild {
  fn pid(&self) -> Option<u32> {
    Some(self.pid)
  }

  async fn next_event(&mut self) -> anyhow::Result<ChildEvent> {
    match self.events_rx.recv().await {
      Some(event) => Ok(event),
      None if self.terminations.load(Ordering::SeqCst) > 0 => {
        Ok(ChildEvent::Exited(ExitStatus::signaled()))
      },
      None => Err(anyhow!("test child handle dropped")),
    }
  }

  fn terminate(&mut self) -> anyhow::Result<()> {
    self.terminations.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}
