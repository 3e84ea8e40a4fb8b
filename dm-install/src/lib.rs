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

pub mod command;
pub mod config;
mod installer;
pub mod logger;

pub use command::{CommandHandler, CommandRegistry, MockCommandRegistry};
pub use config::{ConfigError, InstallConfig};
pub use installer::{InstallError, Installer};
pub use logger::{InstallLogger, InstallOptions, LogCrateLogger};

#[cfg(test)]
#[ctor::ctor]
fn global_init() {
  dm_test_helpers::test_global_init();
}
