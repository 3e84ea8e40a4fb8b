// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use crate::cli::{Command, Options};
use clap::Parser;
use dm_fs::RealFileSystem;
use dm_install::{InstallOptions, Installer};
use dm_lock::LockController;
use dm_log::SwapLogger;
use dm_process::TokioProcessSpawner;
use dm_shutdown::{DisposalRegistry, real_graceful_shutdown};
use dm_time::SystemTimeProvider;
use std::sync::Arc;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  SwapLogger::initialize();
  let args = Options::parse();
  if let Some(filter) = args.log_filter() {
    SwapLogger::swap(filter)?;
  }

  match args.command {
    Command::Install => {
      let installer = Installer::new(
        args.install_config()?,
        Arc::new(RealFileSystem),
        Arc::new(TokioProcessSpawner),
        Arc::new(SystemTimeProvider),
      );
      let registry = Arc::new(DisposalRegistry::new());
      let signal_registry = registry.clone();
      tokio::spawn(async move {
        match real_graceful_shutdown().await {
          Ok(()) => {
            log::info!("shutdown requested, cancelling install");
            signal_registry.dispose();
          },
          Err(e) => log::warn!("failed to listen for shutdown signals: {e}"),
        }
      });

      let options = if args.quiet {
        InstallOptions::silent()
      } else {
        InstallOptions::default()
      };
      installer
        .install_wrapped_dependencies(&registry, &options)
        .await?;
    },
    Command::ClearLock => {
      let lock = LockController::new(
        &args.dependency_directory()?,
        Arc::new(RealFileSystem),
        Arc::new(TokioProcessSpawner),
        Arc::new(SystemTimeProvider),
      );
      lock.clear().await?;
      eprintln!("removed {}", lock.lock_path().display());
    },
  }

  Ok(())
}
