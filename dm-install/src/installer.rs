// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./installer_test.rs"]
mod installer_test;

use crate::config::InstallConfig;
use crate::logger::{InstallOptions, Sink};
use dm_fs::FileSystem;
use dm_lock::{Claim, LockController, WaitError};
use dm_process::{ExitStatus, ProcessSpawner, RunError, Stream, run_to_completion};
use dm_shutdown::{Cancellation, DisposalRegistry};
use dm_time::TimeProvider;
use std::sync::Arc;

//
// InstallError
//

#[derive(thiserror::Error, Debug)]
pub enum InstallError {
  #[error("Failed to install:\n\n{stderr}")]
  Failed { status: ExitStatus, stderr: String },
  #[error("install cancelled")]
  Cancelled,
  #[error("unhandled error: {0}")]
  Unhandled(#[from] anyhow::Error),
}

// Mirrors String.prototype.trimEnd, which also strips the byte order mark.
fn trim_end(line: &str) -> &str {
  line.trim_end_matches(|c: char| c.is_whitespace() || c == '\u{feff}')
}

//
// Installer
//

/// Installs the shared dependency tree. Any number of host processes may call this concurrently;
/// the lock in the dependency directory makes sure only one of them runs the package manager at
/// a time while the rest wait and then re-run the install themselves.
pub struct Installer {
  config: InstallConfig,
  file_system: Arc<dyn FileSystem>,
  spawner: Arc<dyn ProcessSpawner>,
  lock: Arc<LockController>,
}

impl Installer {
  #[must_use]
  pub fn new(
    config: InstallConfig,
    file_system: Arc<dyn FileSystem>,
    spawner: Arc<dyn ProcessSpawner>,
    time_provider: Arc<dyn TimeProvider>,
  ) -> Self {
    let lock = Arc::new(LockController::new(
      &config.dependency_directory(),
      file_system.clone(),
      spawner.clone(),
      time_provider,
    ));

    Self {
      config,
      file_system,
      spawner,
      lock,
    }
  }

  #[must_use]
  pub const fn config(&self) -> &InstallConfig {
    &self.config
  }

  #[must_use]
  pub fn lock(&self) -> Arc<LockController> {
    self.lock.clone()
  }

  /// Runs one install. Registers a single entry with `registry`; disposing the registry while
  /// this call is in flight terminates whatever it is waiting on and makes it return
  /// `InstallError::Cancelled`. Only a failed or cancelled install is reported as an error, stale
  /// locks left behind by other processes are recovered from internally.
  pub async fn install_wrapped_dependencies(
    &self,
    registry: &DisposalRegistry,
    options: &InstallOptions,
  ) -> Result<(), InstallError> {
    let guard = registry.register_cancellation();
    let mut cancellation = guard.cancellation();
    let logger = options.sink();

    // Every iteration is a fresh attempt, after either a clean unlock or a stale lock recovery.
    loop {
      if cancellation.is_cancelled() {
        return Err(InstallError::Cancelled);
      }

      self
        .file_system
        .create_dir_all(&self.config.dependency_directory())
        .await?;

      match self.lock.try_claim().await? {
        Claim::Held => {
          logger.log("claimed lock");
          break;
        },
        Claim::Contended => {
          logger.log("already locked");
          match self.lock.wait_until_unlocked(&mut cancellation).await {
            Ok(()) => logger.log("unlocked cleanly"),
            Err(WaitError::Stale(reason)) => {
              logger.warn(&format!("unlocked: {reason}"));
              self.lock.clear().await?;
            },
            Err(WaitError::Cancelled) => {
              // A disposed waiter releases the lock as well.
              logger.log("clearing lock");
              self.lock.clear().await?;
              return Err(InstallError::Cancelled);
            },
            Err(WaitError::Unhandled(e)) => return Err(e.into()),
          }
        },
      }
    }

    let result = self.install_under_lock(&mut cancellation, &logger).await;

    logger.log("clearing lock");
    match (result, self.lock.clear().await) {
      (Ok(()), Err(e)) => Err(e.into()),
      (result, Err(e)) => {
        logger.warn(&format!("failed to clear lock: {e}"));
        result
      },
      (result, Ok(())) => result,
    }
  }

  async fn install_under_lock(
    &self,
    cancellation: &mut Cancellation,
    logger: &Sink<'_>,
  ) -> Result<(), InstallError> {
    for manifest in &self.config.manifests {
      if let Err(e) = self.copy_for_install(manifest).await {
        logger.warn(&format!("failed to copy {manifest}: {e}"));
      }
    }

    let child = self.spawner.spawn(&self.config.install_command()).await?;

    // Waiters use the pid to tell whether this install is still alive.
    if let Some(pid) = child.pid() {
      if let Err(e) = self.lock.record_holder(pid).await {
        logger.warn(&format!("failed to record install pid {pid}: {e}"));
      }
    }

    let output = run_to_completion(child, cancellation, |stream, line| {
      let message = format!("installing: {}", trim_end(line));
      match stream {
        Stream::Stdout => logger.info(&message),
        Stream::Stderr => logger.warn(&message),
      }
    })
    .await
    .map_err(|e| match e {
      RunError::Cancelled => InstallError::Cancelled,
      RunError::Unhandled(e) => InstallError::Unhandled(e),
    })?;

    if output.status.success() {
      Ok(())
    } else {
      Err(InstallError::Failed {
        status: output.status,
        stderr: output.stderr,
      })
    }
  }

  // Replaces rather than merges: an existing copy is removed first.
  async fn copy_for_install(&self, manifest: &str) -> anyhow::Result<()> {
    let source = self.config.extension_path.join(manifest);
    let destination = self.config.dependency_directory().join(manifest);

    if self.file_system.exists(&destination).await? {
      self.file_system.remove_file(&destination).await?;
    }
    self.file_system.copy(&source, &destination).await
  }
}
