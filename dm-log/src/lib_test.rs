// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use crate::SwapLogger;

#[test]
fn swap_filter() {
  SwapLogger::initialize();
  SwapLogger::initialize();

  SwapLogger::swap("debug").unwrap();
  assert_eq!(log::max_level(), log::LevelFilter::Debug);

  SwapLogger::swap("warn").unwrap();
  assert_eq!(log::max_level(), log::LevelFilter::Warn);

  assert!(SwapLogger::swap("dm_log=notalevel").is_err());
  assert_eq!(log::max_level(), log::LevelFilter::Warn);
}
