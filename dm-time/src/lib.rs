// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt


use parking_lot::Mutex;
use std::sync::Arc;
use std::time::SystemTime;
use time::OffsetDateTime;

//
// TimeProvider
//

/// Source of wall clock time and sleeping. Lock staleness is computed against `now()`, and the
/// lock wait loop sleeps through `sleep()`, so tests can drive both without real delays.
#[async_trait::async_trait]
pub trait TimeProvider: Send + Sync {
  fn now(&self) -> OffsetDateTime;
  async fn sleep(&self, duration: time::Duration);
}

//
// SystemTimeProvider
//

pub struct SystemTimeProvider;

#[async_trait::async_trait]
impl TimeProvider for SystemTimeProvider {
  fn now(&self) -> OffsetDateTime {
    OffsetDateTime::now_utc()
  }

  async fn sleep(&self, duration: time::Duration) {
    tokio::time::sleep(duration.unsigned_abs()).await;
  }
}

/// Converts a filesystem timestamp into an `OffsetDateTime`.
#[must_use]
pub fn system_time_to_offset(system_time: SystemTime) -> OffsetDateTime {
  OffsetDateTime::from(system_time)
}

//
// TestTimeProvider
//

#[derive(Clone)]
pub struct TestTimeProvider {
  now: Arc<Mutex<OffsetDateTime>>,
  sleeps: Arc<Mutex<Vec<time::Duration>>>,
}

impl TestTimeProvider {
  #[must_use]
  pub fn new(now: OffsetDateTime) -> Self {
    Self {
      now: Arc::new(Mutex::new(now)),
      sleeps: Arc::default(),
    }
  }

  pub fn advance(&self, duration: time::Duration) {
    *self.now.lock() += duration;
  }

  pub fn set_time(&self, new_time: OffsetDateTime) {
    *self.now.lock() = new_time;
  }

  /// Every duration passed to `sleep()` so far, in call order.
  #[must_use]
  pub fn sleeps(&self) -> Vec<time::Duration> {
    self.sleeps.lock().clone()
  }
}

#[async_trait::async_trait]
impl TimeProvider for TestTimeProvider {
  fn now(&self) -> OffsetDateTime {
    *self.now.lock()
  }

  async fn sleep(&self, duration: time::Duration) {
    // Sleeping only advances the fake clock. Yield so that a polling loop driven by this provider
    // still gives other tasks on the runtime a chance to run.
    *self.now.lock() += duration;
    self.sleeps.lock().push(duration);

    tokio::task::yield_now().await;
  }
}
