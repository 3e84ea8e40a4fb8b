// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use crate::{Claim, LOCK_CHECK_INTERVAL, LockController, StaleLock, WaitError};
use assert_matches::assert_matches;
use dm_fs::{FsCall, RealFileSystem, TestFileSystem};
use dm_process::{SpawnedProcess, TestProcessSpawner, TokioProcessSpawner};
use dm_shutdown::{Cancellation, CancellationTrigger};
use dm_time::{SystemTimeProvider, TestTimeProvider, TimeProvider};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use time::ext::NumericalDuration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Setup {
  controller: Arc<LockController>,
  file_system: Arc<TestFileSystem>,
  spawner: Arc<TestProcessSpawner>,
  spawned_rx: mpsc::UnboundedReceiver<SpawnedProcess>,
  time_provider: Arc<TestTimeProvider>,
  trigger: CancellationTrigger,
}

impl Setup {
  fn new() -> Self {
    let time_provider = Arc::new(TestTimeProvider::new(OffsetDateTime::now_utc()));
    let file_system = Arc::new(TestFileSystem::new(time_provider.clone()));
    let (spawner, spawned_rx) = TestProcessSpawner::new();
    let spawner = Arc::new(spawner);

    Self {
      controller: Arc::new(LockController::new(
        Path::new("/deps"),
        file_system.clone(),
        spawner.clone(),
        time_provider.clone(),
      )),
      file_system,
      spawner,
      spawned_rx,
      time_provider,
      trigger: CancellationTrigger::default(),
    }
  }

  fn lock_path() -> PathBuf {
    PathBuf::from("/deps/LOCK")
  }

  fn start_wait(&self) -> JoinHandle<Result<(), WaitError>> {
    let controller = self.controller.clone();
    let mut cancellation = self.trigger.make_cancellation();
    tokio::spawn(async move { controller.wait_until_unlocked(&mut cancellation).await })
  }

  async fn next_liveness_check(&mut self, pid: &str) -> SpawnedProcess {
    let spawned = self.spawned_rx.recv().await.unwrap();
    assert_eq!(spawned.command.program, "/usr/bin/env");
    assert_eq!(spawned.command.args, vec!["ps", "-p", pid]);
    assert!(!spawned.command.capture_output);
    spawned
  }
}

#[tokio::test]
async fn claim_is_exclusive() {
  let setup = Setup::new();

  assert_eq!(setup.controller.try_claim().await.unwrap(), Claim::Held);
  assert_eq!(setup.controller.try_claim().await.unwrap(), Claim::Contended);

  setup.controller.record_holder(4321).await.unwrap();
  assert_eq!(
    setup.file_system.file(&Setup::lock_path()),
    Some(b"4321".to_vec())
  );

  setup.controller.clear().await.unwrap();
  assert_eq!(setup.file_system.file(&Setup::lock_path()), None);
  assert_eq!(setup.controller.try_claim().await.unwrap(), Claim::Held);
}

#[tokio::test]
async fn concurrent_claims_on_disk() {
  let directory = tempfile_dir();
  let mut handles = Vec::new();
  for _ in 0 .. 16 {
    let controller = LockController::new(
      directory.path(),
      Arc::new(RealFileSystem),
      Arc::new(TokioProcessSpawner),
      Arc::new(SystemTimeProvider),
    );
    handles.push(tokio::spawn(async move { controller.try_claim().await.unwrap() }));
  }

  let mut held = 0;
  for handle in handles {
    if handle.await.unwrap() == Claim::Held {
      held += 1;
    }
  }
  assert_eq!(held, 1);
}

fn tempfile_dir() -> tempfile::TempDir {
  tempfile::tempdir().unwrap()
}

#[tokio::test]
async fn live_holder_then_clean_unlock() {
  let mut setup = Setup::new();
  setup.file_system.insert_file(Setup::lock_path(), "1234");
  let wait = setup.start_wait();

  // The holder is alive for a couple of polls.
  setup.next_liveness_check("1234").await.handle.exit(0);
  setup.next_liveness_check("1234").await.handle.exit(0);

  // Then it finishes and removes the lock before the next poll observes it.
  let check = setup.next_liveness_check("1234").await;
  setup.file_system.delete_externally(&Setup::lock_path());
  check.handle.exit(0);

  wait.await.unwrap().unwrap();
  assert_eq!(setup.time_provider.sleeps(), vec![LOCK_CHECK_INTERVAL; 4]);
  // A waiter never touches the lock.
  assert_eq!(
    setup.file_system.count_calls(|call| matches!(
      call,
      FsCall::RemoveFile(_) | FsCall::Write(..) | FsCall::CreateExclusive(_)
    )),
    0
  );
}

#[tokio::test]
async fn holder_not_running() {
  let mut setup = Setup::new();
  setup.file_system.insert_file(Setup::lock_path(), "1234\n");
  let wait = setup.start_wait();

  setup.next_liveness_check("1234").await.handle.exit(1);

  let error = wait.await.unwrap().unwrap_err();
  assert_matches!(error, WaitError::Stale(StaleLock::HolderNotRunning));
  assert_eq!(error.to_string(), "install process not running");
}

#[tokio::test]
async fn expired_without_pid() {
  let mut setup = Setup::new();
  let modified = setup.time_provider.now() - 6.minutes();
  setup
    .file_system
    .insert_file_modified_at(Setup::lock_path(), "", modified);

  let error = setup.start_wait().await.unwrap().unwrap_err();
  assert_matches!(error, WaitError::Stale(StaleLock::Expired));
  assert_eq!(error.to_string(), "lockfile is too old");
  assert!(setup.spawned_rx.try_recv().is_err());
}

#[tokio::test]
async fn empty_lock_expires_after_window() {
  let mut setup = Setup::new();
  setup.file_system.insert_file(Setup::lock_path(), "");

  let error = setup.start_wait().await.unwrap().unwrap_err();
  assert_matches!(error, WaitError::Stale(StaleLock::Expired));

  // 600 polls land exactly on the five minute mark, which is not yet stale.
  assert_eq!(setup.time_provider.sleeps().len(), 601);
  assert!(setup.spawned_rx.try_recv().is_err());
}

#[tokio::test]
async fn liveness_check_unavailable_falls_back_to_expiry() {
  let setup = Setup::new();
  let modified = setup.time_provider.now() - 10.minutes();
  setup
    .file_system
    .insert_file_modified_at(Setup::lock_path(), "1234", modified);
  setup.spawner.fail_next_spawn();

  assert_matches!(
    setup.start_wait().await.unwrap(),
    Err(WaitError::Stale(StaleLock::Expired))
  );
}

#[tokio::test]
async fn cancel_during_liveness_check() {
  let mut setup = Setup::new();
  setup.file_system.insert_file(Setup::lock_path(), "1234");
  let wait = setup.start_wait();

  let check = setup.next_liveness_check("1234").await;
  setup.trigger.cancel();

  assert_matches!(wait.await.unwrap(), Err(WaitError::Cancelled));
  assert_eq!(check.handle.terminations(), 1);
  assert_eq!(
    setup.file_system.file(&Setup::lock_path()),
    Some(b"1234".to_vec())
  );
}

#[tokio::test]
async fn cancel_before_poll() {
  let setup = Setup::new();
  setup.file_system.insert_file(Setup::lock_path(), "1234");
  setup.trigger.cancel();

  assert_matches!(setup.start_wait().await.unwrap(), Err(WaitError::Cancelled));
  assert!(setup.file_system.calls().is_empty());
  assert!(setup.time_provider.sleeps().is_empty());
}

#[tokio::test]
async fn uncancellable_wait_sees_missing_lock() {
  let setup = Setup::new();

  setup
    .controller
    .wait_until_unlocked(&mut Cancellation::never())
    .await
    .unwrap();
  assert_eq!(
    setup.file_system.calls(),
    vec![FsCall::ReadToString(Setup::lock_path())]
  );
}
