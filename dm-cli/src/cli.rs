// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./cli_test.rs"]
mod cli_test;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use dm_install::InstallConfig;
use dm_install::config::DEPENDENCY_DIRECTORY_NAME;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Options {
  /// Directory shared by every host process; dependencies land in its `dependencyManagement`
  /// subdirectory
  #[clap(env = "DM_STORAGE_ROOT", long, required = false)]
  pub storage_root: Option<PathBuf>,

  /// Directory containing the manifests to install from
  #[clap(env = "DM_EXTENSION_PATH", long, required = false)]
  pub extension_path: Option<PathBuf>,

  /// YAML install configuration. Flags take precedence over values in the file.
  #[clap(long, required = false)]
  pub config: Option<PathBuf>,

  /// Suppress installer output
  #[clap(long, default_value_t = false)]
  pub quiet: bool,

  /// Also show debug logs, overriding RUST_LOG
  #[clap(long, short, default_value_t = false)]
  pub verbose: bool,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
  /// Install the shared dependencies, waiting for any other install to finish first
  Install,

  /// Remove the dependency lock
  ClearLock,
}

impl Options {
  /// Log filter to swap in after startup, if the default one should be replaced.
  #[must_use]
  pub const fn log_filter(&self) -> Option<&'static str> {
    if self.verbose { Some("debug") } else { None }
  }

  /// The directory holding the lock. Only the storage root is needed for this, so unlike
  /// `install_config()` the extension path may be missing.
  pub fn dependency_directory(&self) -> anyhow::Result<PathBuf> {
    if let Some(storage_root) = &self.storage_root {
      return Ok(storage_root.join(DEPENDENCY_DIRECTORY_NAME));
    }

    match &self.config {
      Some(path) => Ok(InstallConfig::load(path)?.dependency_directory()),
      None => Err(anyhow!("--storage-root is required without --config")),
    }
  }

  pub fn install_config(&self) -> anyhow::Result<InstallConfig> {
    if let Some(path) = &self.config {
      let mut config = InstallConfig::load(path)?;
      if let Some(storage_root) = &self.storage_root {
        config.global_storage_root.clone_from(storage_root);
      }
      if let Some(extension_path) = &self.extension_path {
        config.extension_path.clone_from(extension_path);
      }
      return Ok(config);
    }

    match (&self.storage_root, &self.extension_path) {
      (Some(storage_root), Some(extension_path)) => {
        Ok(InstallConfig::new(storage_root, extension_path))
      },
      _ => Err(anyhow!(
        "--storage-root and --extension-path are required without --config"
      )),
    }
  }
}
