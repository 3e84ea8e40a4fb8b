// shared-core - bitdrift's common client/server libraries
// Copyright Bitdrift, Inc. All rights reserved.
//
// Use of this source code is governed by a source available license that can be found in the
// LICENSE file or at:
// https://polyformproject.org/wp-content/uploads/2020/06/PolyForm-Shield-1.0.0.txt

use parking_lot::Once;

// Called from a ctor in every crate's test binary.
pub fn test_global_init() {
  static INIT: Once = Once::new();

  INIT.call_once(|| {
    dm_log::SwapLogger::initialize();
    log::debug!("test logging initialized");
  });
}
