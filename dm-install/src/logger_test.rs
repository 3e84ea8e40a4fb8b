// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use super::{InstallLogger, InstallOptions, LogCrateLogger, PROGRESS_LEVEL};
use parking_lot::Mutex;
use std::sync::Arc;

#[test]
fn progress_is_visible_at_info() {
  assert!(PROGRESS_LEVEL <= log::LevelFilter::Info);

  // Smoke test through the facade.
  LogCrateLogger.log("claimed lock");
  LogCrateLogger.info("installing: ok");
  LogCrateLogger.warn("unlocked: lockfile is too old");
}

#[derive(Default)]
struct Counting {
  calls: Mutex<usize>,
}

impl InstallLogger for Counting {
  fn log(&self, _: &str) {
    *self.calls.lock() += 1;
  }

  fn info(&self, _: &str) {
    *self.calls.lock() += 1;
  }

  fn warn(&self, _: &str) {
    *self.calls.lock() += 1;
  }
}

#[test]
fn sink_forwards_or_drops() {
  let counting = Arc::new(Counting::default());
  let options = InstallOptions::with_logger(counting.clone());
  let sink = options.sink();
  sink.log("a");
  sink.info("b");
  sink.warn("c");
  assert_eq!(*counting.calls.lock(), 3);

  let silent = InstallOptions::silent();
  let sink = silent.sink();
  sink.log("a");
  sink.warn("c");
  assert_eq!(*counting.calls.lock(), 3);
}
