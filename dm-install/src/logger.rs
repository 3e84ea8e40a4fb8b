// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./logger_test.rs"]
mod logger_test;

use std::sync::Arc;

// Progress messages show with the default `info` filter.
pub(crate) const PROGRESS_LEVEL: log::Level = log::Level::Info;

//
// InstallLogger
//

/// Receives the installer's progress and diagnostics.
pub trait InstallLogger: Send + Sync {
  fn log(&self, message: &str);
  fn info(&self, message: &str);
  fn warn(&self, message: &str);
}

//
// LogCrateLogger
//

/// Forwards to the `log` facade.
pub struct LogCrateLogger;

impl InstallLogger for LogCrateLogger {
  fn log(&self, message: &str) {
    log::log!(PROGRESS_LEVEL, "{message}");
  }

  fn info(&self, message: &str) {
    log::info!("{message}");
  }

  fn warn(&self, message: &str) {
    log::warn!("{message}");
  }
}

//
// InstallOptions
//

#[derive(Clone)]
pub struct InstallOptions {
  logger: Option<Arc<dyn InstallLogger>>,
}

impl Default for InstallOptions {
  fn default() -> Self {
    Self {
      logger: Some(Arc::new(LogCrateLogger)),
    }
  }
}

impl InstallOptions {
  #[must_use]
  pub fn with_logger(logger: Arc<dyn InstallLogger>) -> Self {
    Self {
      logger: Some(logger),
    }
  }

  /// Disables all installer output. Behavior is otherwise unchanged.
  #[must_use]
  pub const fn silent() -> Self {
    Self { logger: None }
  }

  pub(crate) fn sink(&self) -> Sink<'_> {
    Sink {
      logger: self.logger.as_deref(),
    }
  }
}

//
// Sink
//

pub(crate) struct Sink<'a> {
  logger: Option<&'a dyn InstallLogger>,
}

impl Sink<'_> {
  pub(crate) fn log(&self, message: &str) {
    if let Some(logger) = self.logger {
      logger.log(message);
    }
  }

  pub(crate) fn info(&self, message: &str) {
    if let Some(logger) = self.logger {
      logger.info(message);
    }
  }

  pub(crate) fn warn(&self, message: &str) {
    if let Some(logger) = self.logger {
      logger.warn(message);
    }
  }
}
