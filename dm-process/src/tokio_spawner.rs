// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use crate::{ChildEvent, ChildProcess, ExitStatus, ProcessCommand, ProcessSpawner, Stream};
use anyhow::anyhow;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

const LINE_CHANNEL_CAPACITY: usize = 128;

//
// TokioProcessSpawner
//

/// Spawns real processes through `tokio::process`.
pub struct TokioProcessSpawner;

#[async_trait]
impl ProcessSpawner for TokioProcessSpawner {
  async fn spawn(&self, command: &ProcessCommand) -> anyhow::Result<Box<dyn ChildProcess>> {
    let mut process = tokio::process::Command::new(&command.program);
    process
      .args(&command.args)
      .envs(&command.env)
      .stdin(Stdio::null())
      .kill_on_drop(true);
    if let Some(cwd) = &command.cwd {
      process.current_dir(cwd);
    }
    if command.capture_output {
      process.stdout(Stdio::piped()).stderr(Stdio::piped());
    } else {
      process.stdout(Stdio::null()).stderr(Stdio::null());
    }

    let mut child = process
      .spawn()
      .map_err(|e| anyhow!("failed to spawn {}: {e}", command.program))?;

    // Each reader task owns a sender. Once both pipes hit EOF the channel closes, which is how
    // next_event() knows that all output has been delivered.
    let (lines_tx, lines_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
    if let Some(stdout) = child.stdout.take() {
      forward_lines(stdout, Stream::Stdout, lines_tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
      forward_lines(stderr, Stream::Stderr, lines_tx.clone());
    }
    drop(lines_tx);

    log::debug!("spawned {} {:?} as {:?}", command.program, command.args, child.id());

    Ok(Box::new(TokioChild {
      pid: child.id(),
      child,
      lines_rx,
    }))
  }
}

// Output is decoded lossily. The pipe is drained until EOF even if reading or forwarding fails so
// the child never writes into a closed pipe.
fn forward_lines(
  reader: impl AsyncRead + Unpin + Send + 'static,
  stream: Stream,
  lines_tx: mpsc::Sender<(Stream, String)>,
) {
  tokio::spawn(async move {
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::new();
    loop {
      buffer.clear();
      match reader.read_until(b'\n', &mut buffer).await {
        Ok(0) => return,
        Ok(_) => {
          if lines_tx.send((stream, decode_line(&buffer))).await.is_err() {
            break;
          }
        },
        Err(e) => {
          log::debug!("failed to read {stream:?}: {e}");
          break;
        },
      }
    }

    if let Err(e) = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await {
      log::debug!("failed to drain {stream:?}: {e}");
    }
  });
}

fn decode_line(bytes: &[u8]) -> String {
  let line = bytes.strip_suffix(b"\n").unwrap_or(bytes);
  let line = line.strip_suffix(b"\r").unwrap_or(line);
  String::from_utf8_lossy(line).into_owned()
}

//
// TokioChild
//

struct TokioChild {
  pid: Option<u32>,
  child: tokio::process::Child,
  lines_rx: mpsc::Receiver<(Stream, String)>,
}

#[async_trait]
impl ChildProcess for TokioChild {
  fn pid(&self) -> Option<u32> {
    self.pid
  }

  async fn next_event(&mut self) -> anyhow::Result<ChildEvent> {
    if let Some((stream, line)) = self.lines_rx.recv().await {
      return Ok(ChildEvent::Line(stream, line));
    }

    let status = self.child.wait().await?;
    Ok(ChildEvent::Exited(ExitStatus::from(status)))
  }

  fn terminate(&mut self) -> anyhow::Result<()> {
    Ok(self.child.start_kill()?)
  }
}
