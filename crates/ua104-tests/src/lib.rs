// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # ua104 Integration Tests
//!
//! Test utilities and cross-crate suites for the ua104 gateway.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p ua104-tests
//! cargo test -p ua104-tests --test integration_subscription
//! cargo test -p ua104-tests -- --nocapture
//! ```
//!
//! ## Test Suites
//!
//! - `integration_bridge.rs`: run/timeout/stop behaviour of the bridge
//! - `integration_registry.rs`: connection state machine and reconnect sweep
//! - `integration_browse.rs`: traversal order, depth, cycles, stop flags
//! - `integration_subscription.rs`: subscribe/unsubscribe, bulk, notifications
//! - `integration_station.rs`: point updates and a master over TCP
//! - `integration_config.rs`: loading and validating gateway files
//! - `integration_gateway.rs`: mock server to station, end to end
//!
//! ## Writing New Tests
//!
//! ```rust,ignore
//! use ua104_tests::prelude::*;
//!
//! #[test]
//! fn test_something() {
//!     let harness = GatewayHarness::new();
//!     harness.connect(PLANT).unwrap();
//!     let report = harness.engine.subscribe_all(&plant_mapping_set());
//!     assert_eq!(report.succeeded, 3);
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::assertions::*;
    pub use crate::common::builders::*;
    pub use crate::common::fixtures::*;
    pub use crate::common::harness::*;
    pub use crate::common::mocks::*;
    pub use crate::common::{init_test_logging, temp_test_dir};
}
