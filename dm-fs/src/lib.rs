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


mod test_file_system;

use async_trait::async_trait;
use dm_time::system_time_to_offset;
use std::path::Path;
pub use test_file_system::{FsCall, TestFileSystem};
use time::OffsetDateTime;

#[cfg(test)]
#[ctor::ctor]
fn global_init() {
  dm_test_helpers::test_global_init();
}

//
// CreateExclusiveError
//

#[derive(thiserror::Error, Debug)]
pub enum CreateExclusiveError {
  #[error("file already exists")]
  AlreadyExists,
  #[error("unhandled error: {0}")]
  Unhandled(#[from] anyhow::Error),
}

//
// FileSystem
//

/// The filesystem primitives the lock protocol is built on. All paths are absolute.
#[async_trait]
pub trait FileSystem: Send + Sync {
  /// Creates the directory and any missing parents. Succeeds if it already exists.
  async fn create_dir_all(&self, path: &Path) -> anyhow::Result<()>;

  /// Creates an empty file, failing with `AlreadyExists` if anything is present at the path. This
  /// is the atomic test-and-set that the lock relies on.
  async fn create_exclusive(&self, path: &Path) -> Result<(), CreateExclusiveError>;

  async fn exists(&self, path: &Path) -> anyhow::Result<bool>;

  /// Returns `None` if the file does not exist.
  async fn read_to_string(&self, path: &Path) -> anyhow::Result<Option<String>>;

  async fn write(&self, path: &Path, contents: &[u8]) -> anyhow::Result<()>;

  /// Deletes the file if it exists.
  async fn remove_file(&self, path: &Path) -> anyhow::Result<()>;

  async fn copy(&self, from: &Path, to: &Path) -> anyhow::Result<()>;

  /// Last modification time, or `None` if the file does not exist.
  async fn modified(&self, path: &Path) -> anyhow::Result<Option<OffsetDateTime>>;
}

//
// RealFileSystem
//

/// Delegates to `tokio::fs`.
pub struct RealFileSystem;

fn not_found(e: &std::io::Error) -> bool {
  e.kind() == std::io::ErrorKind::NotFound
}

#[async_trait]
impl FileSystem for RealFileSystem {
  async fn create_dir_all(&self, path: &Path) -> anyhow::Result<()> {
    Ok(tokio::fs::create_dir_all(path).await?)
  }

  async fn create_exclusive(&self, path: &Path) -> Result<(), CreateExclusiveError> {
    match tokio::fs::OpenOptions::new()
      .write(true)
      .create_new(true)
      .open(path)
      .await
    {
      Ok(_) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
        Err(CreateExclusiveError::AlreadyExists)
      },
      Err(e) => Err(anyhow::Error::from(e).into()),
    }
  }

  async fn exists(&self, path: &Path) -> anyhow::Result<bool> {
    Ok(tokio::fs::try_exists(path).await?)
  }

  async fn read_to_string(&self, path: &Path) -> anyhow::Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
      Ok(contents) => Ok(Some(contents)),
      Err(e) if not_found(&e) => Ok(None),
      Err(e) => Err(e.into()),
    }
  }

  async fn write(&self, path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    Ok(tokio::fs::write(path, contents).await?)
  }

  async fn remove_file(&self, path: &Path) -> anyhow::Result<()> {
    match tokio::fs::remove_file(path).await {
      Ok(()) => Ok(()),
      Err(e) if not_found(&e) => Ok(()),
      Err(e) => Err(e.into()),
    }
  }

  async fn copy(&self, from: &Path, to: &Path) -> anyhow::Result<()> {
    tokio::fs::copy(from, to).await.map_err(|e| {
      anyhow::anyhow!(
        "failed to copy {} to {}: {e}",
        from.display(),
        to.display()
      )
    })?;
    Ok(())
  }

  async fn modified(&self, path: &Path) -> anyhow::Result<Option<OffsetDateTime>> {
    match tokio::fs::metadata(path).await {
      Ok(metadata) => Ok(Some(system_time_to_offset(metadata.modified()?))),
      Err(e) if not_found(&e) => Ok(None),
      Err(e) => Err(e.into()),
    }
  }
}
