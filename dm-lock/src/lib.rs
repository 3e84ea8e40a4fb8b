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

#[cfg(test)]
#[path = "./lib_test.rs"]
mod lib_test;

use dm_fs::{CreateExclusiveError, FileSystem};
use dm_process::{ProcessCommand, ProcessSpawner, RunError, run_to_completion};
use dm_shutdown::Cancellation;
use dm_time::TimeProvider;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(test)]
#[ctor::ctor]
fn global_init() {
  dm_test_helpers::test_global_init();
}

/// Name of the lock file inside the guarded directory.
pub const LOCK_FILE_NAME: &str = "LOCK";

/// How often a waiter re-checks a contended lock.
pub const LOCK_CHECK_INTERVAL: time::Duration = time::Duration::milliseconds(500);

/// A lock whose holder cannot be verified is considered abandoned once its mtime is this old.
pub const LOCK_EXPIRY: time::Duration = time::Duration::minutes(5);

//
// Claim
//

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Claim {
  /// The caller owns the lock and must release it.
  Held,
  /// Someone else owns the lock.
  Contended,
}

//
// StaleLock
//

/// Why a contended lock was judged abandoned. These are recovered from by clearing the lock and
/// starting over.
#[derive(thiserror::Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum StaleLock {
  #[error("install process not running")]
  HolderNotRunning,
  #[error("lockfile is too old")]
  Expired,
}

//
// WaitError
//

#[derive(thiserror::Error, Debug)]
pub enum WaitError {
  #[error("{0}")]
  Stale(StaleLock),
  #[error("wait cancelled")]
  Cancelled,
  #[error("unhandled error: {0}")]
  Unhandled(#[from] anyhow::Error),
}

//
// LockController
//

/// Owns the lifecycle of `<directory>/LOCK`. Exclusive creation of the file is the lock; once the
/// guarded process starts, the file holds its pid so that waiters can tell a live holder from a
/// crashed one.
pub struct LockController {
  lock_path: PathBuf,
  file_system: Arc<dyn FileSystem>,
  spawner: Arc<dyn ProcessSpawner>,
  time_provider: Arc<dyn TimeProvider>,
}

impl LockController {
  #[must_use]
  pub fn new(
    directory: &Path,
    file_system: Arc<dyn FileSystem>,
    spawner: Arc<dyn ProcessSpawner>,
    time_provider: Arc<dyn TimeProvider>,
  ) -> Self {
    Self {
      lock_path: directory.join(LOCK_FILE_NAME),
      file_system,
      spawner,
      time_provider,
    }
  }

  #[must_use]
  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }

  pub async fn try_claim(&self) -> anyhow::Result<Claim> {
    match self.file_system.create_exclusive(&self.lock_path).await {
      Ok(()) => Ok(Claim::Held),
      Err(CreateExclusiveError::AlreadyExists) => Ok(Claim::Contended),
      Err(CreateExclusiveError::Unhandled(e)) => Err(e),
    }
  }

  /// Records the pid of the process doing the guarded work. Only the holder may call this.
  pub async fn record_holder(&self, pid: u32) -> anyhow::Result<()> {
    self
      .file_system
      .write(&self.lock_path, pid.to_string().as_bytes())
      .await
  }

  /// Removes the lock file. A missing lock file is not an error.
  pub async fn clear(&self) -> anyhow::Result<()> {
    self.file_system.remove_file(&self.lock_path).await
  }

  /// Polls a contended lock until it is released (`Ok`), judged stale (`WaitError::Stale`) or the
  /// wait is cancelled. There is no timeout beyond the staleness check.
  pub async fn wait_until_unlocked(
    &self,
    cancellation: &mut Cancellation,
  ) -> Result<(), WaitError> {
    loop {
      tokio::select! {
        biased;
        () = cancellation.cancelled() => return Err(WaitError::Cancelled),
        () = self.time_provider.sleep(LOCK_CHECK_INTERVAL) => {},
      }

      if self.check_once(cancellation).await? == LockState::Released {
        return Ok(());
      }
    }
  }

  async fn check_once(&self, cancellation: &mut Cancellation) -> Result<LockState, WaitError> {
    // The clean path: the holder finished and removed the file.
    let Some(contents) = self.file_system.read_to_string(&self.lock_path).await? else {
      return Ok(LockState::Released);
    };

    // The pid only shows up once the holder has spawned its process, so an empty file is normal
    // for a short while after the claim. Anything that isn't a pid is treated the same way.
    if let Ok(pid) = contents.trim().parse::<u32>() {
      match self.holder_running(pid, cancellation).await? {
        Some(true) => return Ok(LockState::Held),
        Some(false) => return Err(WaitError::Stale(StaleLock::HolderNotRunning)),
        None => {},
      }
    }

    let Some(modified) = self.file_system.modified(&self.lock_path).await? else {
      return Ok(LockState::Released);
    };
    let age = self.time_provider.now() - modified;
    if age > LOCK_EXPIRY {
      log::debug!("lock file age {age} exceeds {LOCK_EXPIRY}");
      return Err(WaitError::Stale(StaleLock::Expired));
    }

    Ok(LockState::Held)
  }

  /// Runs `ps -p <pid>`. Returns `None` if the check itself could not be run.
  async fn holder_running(
    &self,
    pid: u32,
    cancellation: &mut Cancellation,
  ) -> Result<Option<bool>, WaitError> {
    let command = ProcessCommand::new("/usr/bin/env").args([
      "ps".to_string(),
      "-p".to_string(),
      pid.to_string(),
    ]);
    let child = match self.spawner.spawn(&command).await {
      Ok(child) => child,
      Err(e) => {
        log::debug!("unable to check holder {pid}: {e}");
        return Ok(None);
      },
    };

    match run_to_completion(child, cancellation, |_, _| {}).await {
      Ok(output) => Ok(Some(output.status.success())),
      Err(RunError::Cancelled) => Err(WaitError::Cancelled),
      Err(RunError::Unhandled(e)) => {
        log::debug!("unable to check holder {pid}: {e}");
        Ok(None)
      },
    }
  }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum LockState {
  Held,
  Released,
}
