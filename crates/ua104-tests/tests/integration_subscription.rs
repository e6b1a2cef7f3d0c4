// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Subscription Engine Integration Tests

use std::time::Duration;

use ua104_core::{Mapping, MappingId, QualityFlags, Value};
use ua104_opcua::{OpcUaError, OpcUaValue, OperationError, StatusCode};
use ua104_tests::prelude::*;

const SAMPLING: Duration = Duration::from_millis(100);

fn subscribe_mapping(harness: &GatewayHarness, mapping: &Mapping) {
    harness.engine.subscribe_mapping(mapping).unwrap();
}

fn breaker_mapping() -> Mapping {
    plant_mappings().remove(0)
}

#[test]
fn test_good_change_reaches_sink() {
    let harness = GatewayHarness::new();
    harness.connect(PLANT).unwrap();
    subscribe_mapping(&harness, &breaker_mapping());

    let delivered = harness
        .transport(PLANT)
        .notify(&PlantNodes::breaker(), OpcUaValue::Boolean(true), StatusCode::GOOD);
    assert_eq!(delivered, 1);
    assert!(harness.sink.wait_for(1, WAIT));

    let update = &harness.sink.updates()[0];
    assert_good_update(update, 10, &Value::Bool(true));
    assert_eq!(update.mapping_id, MappingId::new(1));
    assert_eq!(update.server_id.as_str(), PLANT);
    assert_eq!(update.node_id, "ns=2;s=Breaker");
}

#[test]
fn test_subscribe_twice_keeps_one_subscription() {
    let harness = GatewayHarness::new();
    harness.connect(PLANT).unwrap();
    let mapping = breaker_mapping();

    subscribe_mapping(&harness, &mapping);
    subscribe_mapping(&harness, &mapping);

    assert_eq!(harness.engine.active_count(), 1);
    let transport = harness.transport(PLANT);
    assert_eq!(transport.subscriptions_created(), 1);
    assert_eq!(transport.monitored_item_count(), 1);

    let info = harness.engine.subscription(mapping.id).unwrap();
    assert_eq!(info.target_address, 10);
    assert_eq!(info.node_id, "ns=2;s=Breaker");
}

#[test]
fn test_unsubscribe_twice_is_harmless() {
    let harness = GatewayHarness::new();
    harness.connect(PLANT).unwrap();
    let mapping = breaker_mapping();
    subscribe_mapping(&harness, &mapping);

    harness.engine.unsubscribe(mapping.id).unwrap();
    harness.engine.unsubscribe(mapping.id).unwrap();

    assert!(!harness.engine.is_active(mapping.id));
    let transport = harness.transport(PLANT);
    assert_eq!(transport.subscription_count(), 0);
    assert_eq!(transport.subscriptions_deleted(), 1);

    // The node is no longer monitored.
    assert_eq!(
        transport.notify(&PlantNodes::breaker(), OpcUaValue::Boolean(true), StatusCode::GOOD),
        0
    );
}

#[test]
fn test_non_good_status_never_reaches_sink() {
    let harness = GatewayHarness::new();
    harness.connect(PLANT).unwrap();
    subscribe_mapping(&harness, &plant_mappings()[1]);

    let transport = harness.transport(PLANT);
    transport.notify(&PlantNodes::level(), OpcUaValue::Double(9.0), StatusCode::BAD_COMMUNICATION_ERROR);
    transport.notify(&PlantNodes::level(), OpcUaValue::Double(8.0), StatusCode::UNCERTAIN_LAST_USABLE_VALUE);
    transport.notify(&PlantNodes::level(), OpcUaValue::Double(0.75), StatusCode::GOOD);

    // Changes of one item are dispatched in order, so the good one comes last.
    assert!(harness.sink.wait_for(1, WAIT));
    let updates = harness.sink.updates();
    assert_eq!(updates.len(), 1);
    assert_good_update(&updates[0], 20, &Value::Float(0.75));
}

#[test]
fn test_overflow_sets_quality_bit() {
    let harness = GatewayHarness::new();
    harness.connect(PLANT).unwrap();
    subscribe_mapping(&harness, &plant_mappings()[2]);

    harness
        .transport(PLANT)
        .notify(&PlantNodes::counter(), OpcUaValue::Int32(8), StatusCode::good_with_overflow());
    assert!(harness.sink.wait_for(1, WAIT));

    let update = &harness.sink.updates()[0];
    assert_eq!(update.value, Value::Int(8));
    assert!(update.quality.contains(QualityFlags::OVERFLOW));
    assert!(!update.quality.contains(QualityFlags::INVALID));
}

#[test]
fn test_non_variable_node_is_refused() {
    let harness = GatewayHarness::new();
    harness.connect(PLANT).unwrap();

    let err = harness
        .engine
        .subscribe(
            &GatewayHarness::id(PLANT),
            "ns=2;s=Line1",
            40,
            SAMPLING,
            SAMPLING,
            MappingId::new(9),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        OpcUaError::Operation(OperationError::NotAVariable { ref node_class, .. }) if node_class == "Object"
    ));
    assert_eq!(harness.engine.active_count(), 0);
    assert_eq!(harness.transport(PLANT).subscriptions_created(), 0);
}

#[test]
fn test_unparsable_node_id_is_refused() {
    let harness = GatewayHarness::new();
    harness.connect(PLANT).unwrap();

    let result = harness.engine.subscribe(
        &GatewayHarness::id(PLANT),
        "not a node id",
        40,
        SAMPLING,
        SAMPLING,
        MappingId::new(9),
    );
    assert!(result.is_err());
    assert_eq!(harness.engine.active_count(), 0);
}

#[test]
fn test_failed_monitored_item_deletes_subscription() {
    let harness = GatewayHarness::new();
    harness.server(PLANT).behavior.set_fail_monitored_item(true);
    harness.connect(PLANT).unwrap();

    let err = harness.engine.subscribe_mapping(&breaker_mapping()).unwrap_err();
    assert!(matches!(err, OpcUaError::Subscription(_)));

    let transport = harness.transport(PLANT);
    assert_eq!(transport.subscriptions_created(), 1);
    assert_eq!(transport.subscriptions_deleted(), 1);
    assert_eq!(transport.subscription_count(), 0);
    assert!(!harness.engine.is_active(MappingId::new(1)));
}

#[test]
fn test_failed_subscription_leaves_nothing_behind() {
    let harness = GatewayHarness::new();
    harness.server(PLANT).behavior.set_fail_create_subscription(true);
    harness.connect(PLANT).unwrap();

    assert!(harness.engine.subscribe_mapping(&breaker_mapping()).is_err());
    assert_eq!(harness.engine.active_count(), 0);
}

#[test]
fn test_subscribe_requires_connection() {
    let harness = GatewayHarness::new();
    let err = harness.engine.subscribe_mapping(&breaker_mapping()).unwrap_err();
    assert!(matches!(err, OpcUaError::ServerNotConnected(_)));
}

#[test]
fn test_subscribe_all_reports_each_outcome() {
    let harness = GatewayHarness::new();
    harness.server(BACKUP).behavior.set_fail_connect(true);
    harness.connect(PLANT).unwrap();
    assert!(harness.connect(BACKUP).is_err());

    let mut mappings = plant_mappings();
    mappings.push(Mapping::new(4, BACKUP, "ns=2;s=Level", 40));
    mappings.push(Mapping::new(5, PLANT, "ns=2;s=Shared", 50).with_active(false));
    mappings.push(Mapping::new(6, PLANT, "ns=2;s=Plant", 60));

    let report = harness.engine.subscribe_all(&mappings);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.skipped_server_disconnected, 1);
    assert_eq!(report.skipped_inactive, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].0, MappingId::new(6));
    assert_eq!(report.total(), 6);
    assert_eq!(
        harness.engine.active_mappings(),
        vec![MappingId::new(1), MappingId::new(2), MappingId::new(3)]
    );

    // A second pass only finds work that is already done.
    let again = harness.engine.subscribe_all(&mappings);
    assert_eq!(again.succeeded, 0);
    assert_eq!(again.skipped_already_active, 3);
    assert_eq!(harness.transport(PLANT).subscriptions_created(), 3);
}

#[test]
fn test_unsubscribe_all_clears_table() {
    let harness = GatewayHarness::new();
    harness.connect(PLANT).unwrap();
    let mappings = plant_mappings();
    harness.engine.subscribe_all(&mappings);

    let report = harness.engine.unsubscribe_all();
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(harness.engine.active_count(), 0);
    assert_eq!(harness.transport(PLANT).subscription_count(), 0);
}

#[test]
fn test_disconnect_forgets_server_subscriptions() {
    let harness = GatewayHarness::new();
    harness.connect(PLANT).unwrap();
    harness.engine.subscribe_all(&plant_mappings());
    assert_eq!(harness.engine.active_count(), 3);

    harness.registry.disconnect(&GatewayHarness::id(PLANT)).unwrap();
    assert_eq!(harness.engine.active_count(), 0);

    // After reconnecting, the mappings subscribe again on the new session.
    harness.connect(PLANT).unwrap();
    let report = harness.engine.subscribe_all(&plant_mappings());
    assert_eq!(report.succeeded, 3);
    assert_eq!(harness.factory.created(), 2);
}

#[test]
fn test_mark_error_forgets_server_subscriptions() {
    let harness = GatewayHarness::new();
    harness.connect(PLANT).unwrap();
    harness.engine.subscribe_all(&plant_mappings());

    harness.registry.mark_error(&GatewayHarness::id(PLANT), "publish timed out");
    assert_eq!(harness.engine.active_count(), 0);
}

#[test]
fn test_rejecting_sink_keeps_subscription_alive() {
    let harness = GatewayHarness::new();
    harness.connect(PLANT).unwrap();
    subscribe_mapping(&harness, &plant_mappings()[1]);
    harness.sink.set_reject(true);

    let transport = harness.transport(PLANT);
    transport.notify(&PlantNodes::level(), OpcUaValue::Double(1.0), StatusCode::GOOD);
    assert!(harness.sink.wait_for(1, WAIT));
    transport.notify(&PlantNodes::level(), OpcUaValue::Double(2.0), StatusCode::GOOD);
    assert!(harness.sink.wait_for(2, WAIT));

    assert!(harness.engine.is_active(MappingId::new(2)));
    assert_eq!(harness.sink.updates()[1].value, Value::Float(2.0));
}

#[test]
fn test_concurrent_subscribe_creates_one_monitored_item() {
    let harness = GatewayHarness::new();
    harness.connect(PLANT).unwrap();
    harness.server(PLANT).behavior.set_read_delay(Duration::from_millis(50));

    let workers: Vec<_> = (0..2)
        .map(|_| {
            let engine = harness.engine.clone();
            std::thread::spawn(move || engine.subscribe_mapping(&breaker_mapping()))
        })
        .collect();
    for worker in workers {
        worker.join().unwrap().unwrap();
    }

    let transport = harness.transport(PLANT);
    assert_eq!(harness.engine.active_count(), 1);
    assert_eq!(transport.subscription_count(), 1);
    assert_eq!(transport.monitored_item_count(), 1);

    let delivered = transport.notify(&PlantNodes::breaker(), OpcUaValue::Boolean(true), StatusCode::GOOD);
    assert_eq!(delivered, 1);
    assert!(harness.sink.wait_for(1, WAIT));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(harness.sink.len(), 1);
}

#[test]
fn test_unsubscribe_cancels_subscribe_in_flight() {
    let harness = GatewayHarness::new();
    harness.connect(PLANT).unwrap();
    harness.server(PLANT).behavior.set_read_delay(Duration::from_millis(300));

    let engine = harness.engine.clone();
    let pending = std::thread::spawn(move || engine.subscribe_mapping(&breaker_mapping()));
    std::thread::sleep(Duration::from_millis(100));
    harness.engine.unsubscribe(MappingId::new(1)).unwrap();

    let err = pending.join().unwrap().unwrap_err();
    assert!(matches!(err, OpcUaError::Subscription(_)), "got {err:?}");
    assert!(!harness.engine.is_active(MappingId::new(1)));
    assert_eq!(harness.transport(PLANT).subscription_count(), 0);
}

#[test]
fn test_unsubscribe_after_bridge_stop_still_succeeds() {
    let harness = GatewayHarness::new();
    harness.connect(PLANT).unwrap();
    subscribe_mapping(&harness, &breaker_mapping());

    harness.bridge.stop();
    harness.engine.unsubscribe(MappingId::new(1)).unwrap();

    assert!(!harness.engine.is_active(MappingId::new(1)));
    assert_eq!(harness.engine.active_count(), 0);
}
