// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./command_test.rs"]
mod command_test;

use dm_lock::LockController;
use futures::future::BoxFuture;
use std::sync::Arc;

pub type CommandHandler = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// The host's command table.
#[mockall::automock]
pub trait CommandRegistry: Send + Sync {
  fn register(&self, command: &str, handler: CommandHandler);
}

/// Registers `command` as a manual escape hatch which removes the dependency lock, for when a
/// lock is stuck and the user doesn't want to wait for it to expire.
pub fn register_dependency_unlock_command(
  commands: &dyn CommandRegistry,
  command: &str,
  lock: Arc<LockController>,
) {
  commands.register(
    command,
    Arc::new(move || {
      let lock = lock.clone();
      Box::pin(async move {
        log::info!("clearing {}", lock.lock_path().display());
        lock.clear().await
      })
    }),
  );
}
