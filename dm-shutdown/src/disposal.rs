// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

#[cfg(test)]
#[path = "./disposal_test.rs"]
mod disposal_test;

use crate::{Cancellation, CancellationTrigger};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

//
// Disposable
//

/// A cleanup action owned by a `DisposalRegistry`.
pub trait Disposable: Send + Sync {
  fn dispose(&self);

  /// Settled entries have nothing left to dispose and are dropped from the registry.
  fn is_settled(&self) -> bool {
    false
  }
}

//
// DisposalRegistry
//

/// A composite of disposables owned by the embedding host. Disposing the registry disposes every
/// entry that was added to it, in insertion order.
#[derive(Default)]
pub struct DisposalRegistry {
  entries: Mutex<Vec<Box<dyn Disposable>>>,
}

impl DisposalRegistry {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add(&self, disposable: Box<dyn Disposable>) {
    let mut entries = self.entries.lock();
    entries.retain(|entry| !entry.is_settled());
    entries.push(disposable);
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.entries.lock().len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.entries.lock().is_empty()
  }

  pub fn dispose(&self) {
    // Take the entries before running them so a disposable is free to touch the registry.
    let entries = std::mem::take(&mut *self.entries.lock());
    log::debug!("disposing {} registered entries", entries.len());
    for entry in entries {
      entry.dispose();
    }
  }

  /// Registers a single entry which cancels the returned guard's token when disposed. Once the
  /// guard is dropped the entry becomes a no-op.
  #[must_use]
  pub fn register_cancellation(&self) -> CancellationGuard {
    let trigger = CancellationTrigger::default();
    let settled = Arc::new(AtomicBool::new(false));

    self.add(Box::new(CancellationEntry {
      trigger: trigger.clone(),
      settled: settled.clone(),
    }));

    CancellationGuard {
      cancellation: trigger.make_cancellation(),
      settled,
    }
  }
}

//
// CancellationEntry
//

struct CancellationEntry {
  trigger: CancellationTrigger,
  settled: Arc<AtomicBool>,
}

impl Disposable for CancellationEntry {
  fn dispose(&self) {
    if self.is_settled() {
      log::debug!("operation already settled, ignoring dispose");
      return;
    }

    self.trigger.cancel();
  }

  fn is_settled(&self) -> bool {
    self.settled.load(Ordering::SeqCst)
  }
}

//
// CancellationGuard
//

/// Held by the operation for as long as it is in flight. Dropping the guard marks the operation
/// as settled.
pub struct CancellationGuard {
  cancellation: Cancellation,
  settled: Arc<AtomicBool>,
}

impl CancellationGuard {
  #[must_use]
  pub fn cancellation(&self) -> Cancellation {
    self.cancellation.clone()
  }
}

impl Drop for CancellationGuard {
  fn drop(&mut self) {
    self.settled.store(true, Ordering::SeqCst);
  }
}
