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


pub mod disposal;

pub use disposal::{CancellationGuard, Disposable, DisposalRegistry};
use std::sync::Arc;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;

#[cfg(test)]
#[ctor::ctor]
fn global_init() {
  dm_test_helpers::test_global_init();
}

// Waits for SIGTERM or SIGINT. Used by the binary to dispose any in-flight install.
#[cfg(unix)]
pub async fn real_graceful_shutdown() -> std::io::Result<()> {
  let mut sigterm_stream = signal(SignalKind::terminate())?;
  let mut sigint_stream = signal(SignalKind::interrupt())?;
  tokio::select! {
    _ = sigterm_stream.recv() => {},
    _ = sigint_stream.recv() => {},
  }

  log::info!("received SIGTERM or SIGINT");
  Ok(())
}

#[cfg(windows)]
pub async fn real_graceful_shutdown() -> std::io::Result<()> {
  tokio::signal::ctrl_c().await?;
  log::info!("received CTRL-C");
  Ok(())
}

//
// CancellationStatus
//

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CancellationStatus {
  Running,
  Cancelled,
}

//
// CancellationTrigger
//

/// Owning side of a cancellation token. Cancelling is sticky: once cancelled every current and
/// future `Cancellation` made from this trigger observes it.
#[derive(Clone, Debug)]
pub struct CancellationTrigger {
  status_tx: Arc<watch::Sender<CancellationStatus>>,
}

impl Default for CancellationTrigger {
  fn default() -> Self {
    let (status_tx, _) = watch::channel(CancellationStatus::Running);
    Self {
      status_tx: Arc::new(status_tx),
    }
  }
}

impl CancellationTrigger {
  #[must_use]
  pub fn make_cancellation(&self) -> Cancellation {
    Cancellation {
      status_rx: self.status_tx.subscribe(),
    }
  }

  pub fn cancel(&self) {
    self.status_tx.send_replace(CancellationStatus::Cancelled);
  }

  #[must_use]
  pub fn is_cancelled(&self) -> bool {
    *self.status_tx.borrow() == CancellationStatus::Cancelled
  }
}

//
// Cancellation
//

/// Receiving side of a cancellation token. Long running operations select on `cancelled()` at
/// each of their suspension points.
#[derive(Clone, Debug)]
pub struct Cancellation {
  status_rx: watch::Receiver<CancellationStatus>,
}

impl Cancellation {
  /// A token that can never be cancelled.
  #[must_use]
  pub fn never() -> Self {
    let (_, status_rx) = watch::channel(CancellationStatus::Running);
    Self { status_rx }
  }

  /// Returns once the token has been cancelled. If the trigger is dropped without cancelling,
  /// this never returns.
  pub async fn cancelled(&mut self) {
    loop {
      if *self.status_rx.borrow_and_update() == CancellationStatus::Cancelled {
        return;
      }

      if self.status_rx.changed().await.is_err() {
        std::future::pending::<()>().await;
      }
    }
  }

  #[must_use]
  pub fn is_cancelled(&self) -> bool {
    *self.status_rx.borrow() == CancellationStatus::Cancelled
  }
}
