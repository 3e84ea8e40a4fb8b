// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use crate::{CreateExclusiveError, FileSystem};
use anyhow::anyhow;
use async_trait::async_trait;
use dm_time::TimeProvider;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;

//
// FsCall
//

/// A single call made against a `TestFileSystem`, recorded in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FsCall {
  CreateDirAll(PathBuf),
  CreateExclusive(PathBuf),
  Exists(PathBuf),
  ReadToString(PathBuf),
  Write(PathBuf, Vec<u8>),
  RemoveFile(PathBuf),
  Copy(PathBuf, PathBuf),
  Modified(PathBuf),
}

struct TestFile {
  contents: Vec<u8>,
  modified: OffsetDateTime,
}

#[derive(Default)]
struct State {
  files: BTreeMap<PathBuf, TestFile>,
  directories: BTreeSet<PathBuf>,
  calls: Vec<FsCall>,
  failing_copies: HashSet<PathBuf>,
}

//
// TestFileSystem
//

/// An in-memory filesystem that records every call. Modification times are stamped from the
/// provided time source so staleness can be driven by a test clock.
pub struct TestFileSystem {
  state: Mutex<State>,
  time_provider: Arc<dyn TimeProvider>,
}

impl TestFileSystem {
  #[must_use]
  pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
    Self {
      state: Mutex::default(),
      time_provider,
    }
  }

  /// Seeds a file without recording a call.
  pub fn insert_file(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
    let modified = self.time_provider.now();
    self.insert_file_modified_at(path, contents, modified);
  }

  pub fn insert_file_modified_at(
    &self,
    path: impl Into<PathBuf>,
    contents: impl Into<Vec<u8>>,
    modified: OffsetDateTime,
  ) {
    self.state.lock().files.insert(
      path.into(),
      TestFile {
        contents: contents.into(),
        modified,
      },
    );
  }

  /// Removes a file without recording a call, as if another process deleted it.
  pub fn delete_externally(&self, path: &Path) {
    self.state.lock().files.remove(path);
  }

  /// Makes every copy from `source` fail.
  pub fn fail_copies_from(&self, source: impl Into<PathBuf>) {
    self.state.lock().failing_copies.insert(source.into());
  }

  #[must_use]
  pub fn file(&self, path: &Path) -> Option<Vec<u8>> {
    self
      .state
      .lock()
      .files
      .get(path)
      .map(|file| file.contents.clone())
  }

  #[must_use]
  pub fn contains_dir(&self, path: &Path) -> bool {
    self.state.lock().directories.contains(path)
  }

  #[must_use]
  pub fn calls(&self) -> Vec<FsCall> {
    self.state.lock().calls.clone()
  }

  /// Number of recorded calls matching the predicate.
  pub fn count_calls(&self, f: impl Fn(&FsCall) -> bool) -> usize {
    self.state.lock().calls.iter().filter(|call| f(*call)).count()
  }

  fn record(&self, call: FsCall) -> parking_lot::MutexGuard<'_, State> {
    let mut state = self.state.lock();
    state.calls.push(call);
    state
  }
}

#[async_trait]
impl FileSystem for TestFileSystem {
  async fn create_dir_all(&self, path: &Path) -> anyhow::Result<()> {
    let mut state = self.record(FsCall::CreateDirAll(path.to_path_buf()));
    state.directories.insert(path.to_path_buf());
    Ok(())
  }

  async fn create_exclusive(&self, path: &Path) -> Result<(), CreateExclusiveError> {
    let now = self.time_provider.now();
    let mut state = self.record(FsCall::CreateExclusive(path.to_path_buf()));
    if state.files.contains_key(path) {
      return Err(CreateExclusiveError::AlreadyExists);
    }

    state.files.insert(
      path.to_path_buf(),
      TestFile {
        contents: Vec::new(),
        modified: now,
      },
    );
    Ok(())
  }

  async fn exists(&self, path: &Path) -> anyhow::Result<bool> {
    let state = self.record(FsCall::Exists(path.to_path_buf()));
    Ok(state.files.contains_key(path) || state.directories.contains(path))
  }

  async fn read_to_string(&self, path: &Path) -> anyhow::Result<Option<String>> {
    let state = self.record(FsCall::ReadToString(path.to_path_buf()));
    state
      .files
      .get(path)
      .map(|file| String::from_utf8(file.contents.clone()))
      .transpose()
      .map_err(Into::into)
  }

  async fn write(&self, path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    let now = self.time_provider.now();
    let mut state = self.record(FsCall::Write(path.to_path_buf(), contents.to_vec()));
    state.files.insert(
      path.to_path_buf(),
      TestFile {
        contents: contents.to_vec(),
        modified: now,
      },
    );
    Ok(())
  }

  async fn remove_file(&self, path: &Path) -> anyhow::Result<()> {
    let mut state = self.record(FsCall::RemoveFile(path.to_path_buf()));
    state.files.remove(path);
    Ok(())
  }

  async fn copy(&self, from: &Path, to: &Path) -> anyhow::Result<()> {
    let now = self.time_provider.now();
    let mut state = self.record(FsCall::Copy(from.to_path_buf(), to.to_path_buf()));
    if state.failing_copies.contains(from) {
      return Err(anyhow!("failed to copy {}", from.display()));
    }

    let contents = state
      .files
      .get(from)
      .map(|file| file.contents.clone())
      .ok_or_else(|| anyhow!("not found: {}", from.display()))?;
    state.files.insert(
      to.to_path_buf(),
      TestFile {
        contents,
        modified: now,
      },
    );
    Ok(())
  }

  async fn modified(&self, path: &Path) -> anyhow::Result<Option<OffsetDateTime>> {
    let state = self.record(FsCall::Modified(path.to_path_buf()));
    Ok(state.files.get(path).map(|file| file.modified))
  }
}
