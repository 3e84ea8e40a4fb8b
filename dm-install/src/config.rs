// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./config_test.rs"]
mod config_test;

use dm_lock::LOCK_FILE_NAME;
use dm_process::ProcessCommand;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Subfolder of the global storage root that holds the shared dependency tree.
pub const DEPENDENCY_DIRECTORY_NAME: &str = "dependencyManagement";

//
// ConfigError
//

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
  #[error("failed to read {}: {source}", path.display())]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("invalid config: {0}")]
  Parse(#[from] serde_yaml::Error),
}

fn default_manifests() -> Vec<String> {
  vec!["npm-shrinkwrap.json".to_string(), "package.json".to_string()]
}

fn default_package_manager() -> String {
  "npm".to_string()
}

fn default_install_args() -> Vec<String> {
  vec!["install".to_string(), "--no-audit".to_string()]
}

fn default_env() -> BTreeMap<String, String> {
  BTreeMap::from([("NO_UPDATE_NOTIFIER".to_string(), "true".to_string())])
}

//
// InstallConfig
//

/// Where dependencies get installed and how. Passed explicitly to everything that needs the
/// dependency directory.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InstallConfig {
  /// Per-user storage root shared by every host process.
  pub global_storage_root: PathBuf,

  /// Directory the manifests are copied from.
  pub extension_path: PathBuf,

  /// Copied in this order before every install.
  #[serde(default = "default_manifests")]
  pub manifests: Vec<String>,

  #[serde(default = "default_package_manager")]
  pub package_manager: String,

  #[serde(default = "default_install_args")]
  pub install_args: Vec<String>,

  #[serde(default = "default_env")]
  pub env: BTreeMap<String, String>,
}

impl InstallConfig {
  #[must_use]
  pub fn new(global_storage_root: impl Into<PathBuf>, extension_path: impl Into<PathBuf>) -> Self {
    Self {
      global_storage_root: global_storage_root.into(),
      extension_path: extension_path.into(),
      manifests: default_manifests(),
      package_manager: default_package_manager(),
      install_args: default_install_args(),
      env: default_env(),
    }
  }

  pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
    Ok(serde_yaml::from_str(yaml)?)
  }

  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_yaml(&yaml)
  }

  #[must_use]
  pub fn dependency_directory(&self) -> PathBuf {
    self.global_storage_root.join(DEPENDENCY_DIRECTORY_NAME)
  }

  #[must_use]
  pub fn lock_path(&self) -> PathBuf {
    self.dependency_directory().join(LOCK_FILE_NAME)
  }

  #[must_use]
  pub fn install_command(&self) -> ProcessCommand {
    ProcessCommand::new(&self.package_manager)
      .args(&self.install_args)
      .cwd(self.dependency_directory())
      .envs(self.env.clone())
      .capture_output(true)
  }
}
