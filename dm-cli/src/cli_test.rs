// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use super::{Command, Options};
use clap::Parser;
use pretty_assertions::assert_eq;
use std::io::Write;
use std::path::Path;

fn parse(args: &[&str]) -> Options {
  Options::try_parse_from(std::iter::once("dm-install").chain(args.iter().copied())).unwrap()
}

#[test]
fn flags_build_default_config() {
  let options = parse(&[
    "--storage-root",
    "/globalStorage",
    "--extension-path",
    "/extension",
    "--quiet",
    "install",
  ]);
  assert_eq!(options.command, Command::Install);
  assert!(options.quiet);

  let config = options.install_config().unwrap();
  assert_eq!(
    config.lock_path(),
    Path::new("/globalStorage/dependencyManagement/LOCK")
  );
  assert_eq!(config.extension_path, Path::new("/extension"));
  assert_eq!(config.package_manager, "npm");
}

#[test]
fn clear_lock_subcommand() {
  let options = parse(&["clear-lock"]);
  assert_eq!(options.command, Command::ClearLock);
}

#[test]
fn missing_paths_without_config() {
  let options = parse(&["--storage-root", "/globalStorage", "install"]);
  assert!(options.install_config().is_err());
}

#[test]
fn flags_override_config_file() {
  let mut file = tempfile::NamedTempFile::new().unwrap();
  write!(
    file,
    "global_storage_root: /fromFile\nextension_path: /extension\npackage_manager: pnpm\n"
  )
  .unwrap();

  let options = parse(&[
    "--config",
    file.path().to_str().unwrap(),
    "--storage-root",
    "/fromFlag",
    "install",
  ]);
  let config = options.install_config().unwrap();
  assert_eq!(config.global_storage_root, Path::new("/fromFlag"));
  assert_eq!(config.extension_path, Path::new("/extension"));
  assert_eq!(config.package_manager, "pnpm");
}

#[test]
fn verbose_swaps_in_debug_filter() {
  assert_eq!(parse(&["install"]).log_filter(), None);
  assert_eq!(parse(&["-v", "install"]).log_filter(), Some("debug"));
  assert_eq!(parse(&["--verbose", "clear-lock"]).log_filter(), Some("debug"));
}

#[test]
fn clear_lock_needs_only_storage_root() {
  let options = parse(&["--storage-root", "/globalStorage", "clear-lock"]);
  assert!(options.install_config().is_err());
  assert_eq!(
    options.dependency_directory().unwrap(),
    Path::new("/globalStorage/dependencyManagement")
  );

  assert!(parse(&["clear-lock"]).dependency_directory().is_err());
}

#[test]
fn clear_lock_falls_back_to_config_file() {
  let mut file = tempfile::NamedTempFile::new().unwrap();
  write!(
    file,
    "global_storage_root: /fromFile\nextension_path: /extension\n"
  )
  .unwrap();

  let options = parse(&["--config", file.path().to_str().unwrap(), "clear-lock"]);
  assert_eq!(
    options.dependency_directory().unwrap(),
    Path::new("/fromFile/dependencyManagement")
  );
}
