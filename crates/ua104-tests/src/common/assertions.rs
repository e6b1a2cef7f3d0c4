// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Custom Test Assertions
//!
//! Assertion helpers with informative failure messages.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use ua104_core::sink::ValueUpdate;
use ua104_core::types::{IoAddress, Value};
use ua104_opcua::NodeRecord;

/// Polls `condition` every 5 ms until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Asserts that no node id appears twice.
pub fn assert_unique_nodes(records: &[NodeRecord]) {
    let mut seen = HashSet::new();
    for record in records {
        assert!(
            seen.insert(record.node_id.as_str()),
            "node {} emitted twice in {:?}",
            record.node_id,
            records.iter().map(|r| r.node_id.as_str()).collect::<Vec<_>>()
        );
    }
}

/// Node ids of `records` in emission order.
pub fn node_ids(records: &[NodeRecord]) -> Vec<&str> {
    records.iter().map(|r| r.node_id.as_str()).collect()
}

/// Asserts that `elapsed` lies in `[min, max]`.
pub fn assert_elapsed_between(elapsed: Duration, min: Duration, max: Duration) {
    assert!(
        elapsed >= min && elapsed <= max,
        "elapsed {:?} outside [{:?}, {:?}]",
        elapsed,
        min,
        max
    );
}

/// Asserts that `update` targets `ioa` with `value` and good quality.
pub fn assert_good_update(update: &ValueUpdate, ioa: IoAddress, value: &Value) {
    assert_eq!(update.target_address, ioa, "unexpected target in {:?}", update);
    assert_eq!(&update.value, value, "unexpected value in {:?}", update);
    assert!(update.quality.is_good(), "expected good quality in {:?}", update);
}
