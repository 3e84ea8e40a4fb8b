// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use super::{CommandHandler, MockCommandRegistry, register_dependency_unlock_command};
use dm_fs::{FsCall, TestFileSystem};
use dm_lock::LockController;
use dm_process::TestProcessSpawner;
use dm_time::TestTimeProvider;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;

#[tokio::test]
async fn registers_lock_clearing_command() {
  let time_provider = Arc::new(TestTimeProvider::new(OffsetDateTime::now_utc()));
  let file_system = Arc::new(TestFileSystem::new(time_provider.clone()));
  let (spawner, _spawned_rx) = TestProcessSpawner::new();
  let lock = Arc::new(LockController::new(
    Path::new("/globalStorage/dependencyManagement"),
    file_system.clone(),
    Arc::new(spawner),
    time_provider,
  ));
  let lock_path = PathBuf::from("/globalStorage/dependencyManagement/LOCK");
  file_system.insert_file(&lock_path, "1234");

  let registered: Arc<Mutex<Option<CommandHandler>>> = Arc::default();
  let mut commands = MockCommandRegistry::new();
  let captured = registered.clone();
  commands
    .expect_register()
    .withf(|command, _| command.to_string() == "command.id")
    .times(1)
    .returning(move |_, handler| {
      *captured.lock() = Some(handler);
    });

  register_dependency_unlock_command(&commands, "command.id", lock);

  let handler = registered.lock().take().unwrap();
  handler().await.unwrap();

  assert_eq!(file_system.file(&lock_path), None);
  assert_eq!(file_system.calls(), vec![FsCall::RemoveFile(lock_path)]);

  // Running it again with nothing to clear is fine.
  handler().await.unwrap();
}
