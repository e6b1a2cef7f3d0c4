// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Per-mapping subscriptions and change forwarding.
//!
//! Every active mapping owns one server-side subscription with one
//! monitored item on the node's Value attribute. Data changes travel from
//! the transport over a channel into a dispatcher task on the bridge,
//! which filters and converts them and hands them to the [`Sink`] on a
//! blocking thread.
//!
//! ```text
//!  transport ──DataChange──► dispatcher (bridge) ──ValueUpdate──► spawn_blocking ──► Sink
//!                               │
//!                               └─ bad status: dropped
//! ```

use std::str::FromStr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use ua104_core::mapping::Mapping;
use ua104_core::quality::QualityFlags;
use ua104_core::sink::{Sink, ValueUpdate};
use ua104_core::types::{IoAddress, MappingId, ServerId};

use crate::client::{DataChange, DataChangeReceiver, SharedTransport};
use crate::error::{OpcUaError, OpcUaResult, OperationError};
use crate::registry::ConnectionRegistry;
use crate::types::{AttributeId, NodeClass, NodeId};

/// Queue size of every monitored item.
pub const MONITORED_ITEM_QUEUE_SIZE: u32 = 1;

// =============================================================================
// Reports and snapshots
// =============================================================================

/// A registered monitored item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveSubscription {
    /// Owning mapping.
    pub mapping_id: MappingId,
    /// Server the item lives on.
    pub server_id: ServerId,
    /// Monitored node.
    pub node_id: String,
    /// Target point.
    pub target_address: IoAddress,
    /// Server-side subscription id.
    pub subscription_id: u32,
    /// Server-side monitored item id.
    pub monitored_item_id: u32,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

/// Per-mapping outcome counts of a bulk operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    /// Mappings processed successfully.
    pub succeeded: usize,
    /// Mappings that failed.
    pub failed: usize,
    /// Mappings that already had a subscription.
    pub skipped_already_active: usize,
    /// Mappings whose server has no live handle.
    pub skipped_server_disconnected: usize,
    /// Mappings flagged inactive.
    pub skipped_inactive: usize,
    /// Failure reasons by mapping.
    pub failures: Vec<(MappingId, String)>,
}

impl BulkReport {
    /// Total number of mappings looked at.
    pub fn total(&self) -> usize {
        self.succeeded
            + self.failed
            + self.skipped_already_active
            + self.skipped_server_disconnected
            + self.skipped_inactive
    }

    fn fail(&mut self, mapping_id: MappingId, error: &OpcUaError) {
        self.failed += 1;
        self.failures.push((mapping_id, error.to_string()));
    }
}

// =============================================================================
// NotificationRoute
// =============================================================================

/// Where the changes of one monitored item go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRoute {
    /// Source server.
    pub server_id: ServerId,
    /// Owning mapping.
    pub mapping_id: MappingId,
    /// Monitored node in text form.
    pub node_id: String,
    /// Target point.
    pub target_address: IoAddress,
}

impl NotificationRoute {
    /// Converts a data change into a sink update.
    ///
    /// Returns `None` for non-good statuses; those never reach the sink.
    pub fn accept(&self, change: &DataChange) -> Option<ValueUpdate> {
        if !change.status.is_good() {
            debug!(
                mapping_id = %self.mapping_id,
                ioa = self.target_address,
                status = %change.status,
                "Dropping data change with non-good status"
            );
            return None;
        }

        let mut quality = QualityFlags::GOOD;
        quality.set(QualityFlags::OVERFLOW, change.status.has_overflow());

        Some(ValueUpdate {
            server_id: self.server_id.clone(),
            mapping_id: self.mapping_id,
            node_id: self.node_id.clone(),
            target_address: self.target_address,
            value: change.value.to_value(),
            quality,
            timestamp: change
                .source_timestamp
                .or(change.server_timestamp)
                .unwrap_or_else(Utc::now),
        })
    }
}

async fn dispatch(mut changes: DataChangeReceiver, route: NotificationRoute, sink: Arc<dyn Sink>) {
    while let Some(change) = changes.recv().await {
        let Some(update) = route.accept(&change) else {
            continue;
        };
        trace!(mapping_id = %route.mapping_id, ioa = route.target_address, value = %update.value, "Forwarding change");

        let target = sink.clone();
        match tokio::task::spawn_blocking(move || target.on_value_changed(&update)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                mapping_id = %route.mapping_id,
                ioa = route.target_address,
                sink = sink.name(),
                error = %e,
                "Sink rejected update"
            ),
            Err(e) => warn!(mapping_id = %route.mapping_id, error = %e, "Sink call panicked"),
        }
    }
    trace!(mapping_id = %route.mapping_id, "Dispatcher finished");
}

// =============================================================================
// SubscriptionEngine
// =============================================================================

struct ActiveEntry {
    info: ActiveSubscription,
    dispatcher: JoinHandle<()>,
}

/// A mapping's place in the active table. `Pending` is taken before the
/// first server call so concurrent subscribes of one mapping create a
/// single monitored item.
enum Slot {
    Pending(ServerId),
    Active(ActiveEntry),
}

impl Slot {
    fn server_id(&self) -> &ServerId {
        match self {
            Self::Pending(server_id) => server_id,
            Self::Active(entry) => &entry.info.server_id,
        }
    }

    fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

struct EngineInner {
    registry: ConnectionRegistry,
    sink: Arc<dyn Sink>,
    active: DashMap<MappingId, Slot>,
}

/// Creates and tears down monitored items per mapping.
///
/// Cloning is cheap; clones share the active table.
#[derive(Clone)]
pub struct SubscriptionEngine {
    inner: Arc<EngineInner>,
}

impl SubscriptionEngine {
    /// Creates an engine forwarding changes to `sink`.
    ///
    /// Subscriptions of a server are forgotten whenever the registry drops
    /// its handle.
    pub fn new(registry: ConnectionRegistry, sink: Arc<dyn Sink>) -> Self {
        let inner = Arc::new(EngineInner {
            registry: registry.clone(),
            sink,
            active: DashMap::new(),
        });

        let weak: Weak<EngineInner> = Arc::downgrade(&inner);
        registry.on_handle_dropped(Box::new(move |server_id| {
            if let Some(inner) = weak.upgrade() {
                inner.drop_server(server_id);
            }
        }));

        Self { inner }
    }

    // =========================================================================
    // Single mapping
    // =========================================================================

    /// Subscribes one node on behalf of `mapping_id`.
    ///
    /// A mapping that is already active, or being subscribed by another
    /// caller, succeeds without side effects. A failure caused by a lost
    /// session moves the server to `ERROR`.
    ///
    /// # Errors
    ///
    /// `ServerNotConnected` without a live handle, `NotAVariable` for
    /// non-Variable nodes, or the transport failure.
    pub fn subscribe(
        &self,
        server_id: &ServerId,
        node_id: &str,
        target_address: IoAddress,
        sampling_interval: Duration,
        publishing_interval: Duration,
        mapping_id: MappingId,
    ) -> OpcUaResult<()> {
        if self.is_active(mapping_id) {
            debug!(mapping_id = %mapping_id, "Mapping already subscribed");
            return Ok(());
        }
        let transport = self.inner.registry.require_handle(server_id)?;
        let node = NodeId::from_str(node_id)?;

        let route = NotificationRoute {
            server_id: server_id.clone(),
            mapping_id,
            node_id: node_id.to_string(),
            target_address,
        };
        let inner = self.inner.clone();
        let handle = transport.clone();
        let result = self
            .inner
            .registry
            .bridge()
            .run(async move {
                inner
                    .subscribe(transport, node, route, sampling_interval, publishing_interval)
                    .await
            })
            .map_err(OpcUaError::from)
            .and_then(|r| r);

        if let Err(ref e) = result {
            self.inner.registry.report_failure(server_id, &handle, e);
        }
        result
    }

    /// Subscribes a configured mapping.
    pub fn subscribe_mapping(&self, mapping: &Mapping) -> OpcUaResult<()> {
        self.subscribe(
            &mapping.server_id,
            &mapping.node_id,
            mapping.target_address,
            mapping.sampling_interval(),
            mapping.publishing_interval(),
            mapping.id,
        )
    }

    /// Removes the subscription of `mapping_id`. Inactive mappings succeed.
    ///
    /// The entry is forgotten even if the server or the bridge refuses the
    /// teardown. A subscribe still in flight is cancelled and cleans up after
    /// itself.
    pub fn unsubscribe(&self, mapping_id: MappingId) -> OpcUaResult<()> {
        let entry = match self.inner.active.remove(&mapping_id) {
            Some((_, Slot::Active(entry))) => entry,
            Some((_, Slot::Pending(_))) => {
                debug!(mapping_id = %mapping_id, "Cancelled subscription in progress");
                return Ok(());
            }
            None => {
                debug!(mapping_id = %mapping_id, "Mapping not subscribed");
                return Ok(());
            }
        };
        entry.dispatcher.abort();

        let Some(transport) = self.inner.registry.handle(&entry.info.server_id) else {
            debug!(mapping_id = %mapping_id, "Server gone; subscription forgotten");
            return Ok(());
        };
        let info = entry.info;
        if let Err(e) = self
            .inner
            .registry
            .bridge()
            .run(async move { teardown(transport, &info).await })
        {
            warn!(mapping_id = %mapping_id, error = %e, "Server-side teardown skipped");
        }
        Ok(())
    }

    // =========================================================================
    // Bulk
    // =========================================================================

    /// Subscribes every active mapping whose server is connected.
    pub fn subscribe_all<'a>(&self, mappings: impl IntoIterator<Item = &'a Mapping>) -> BulkReport {
        let mut report = BulkReport::default();

        for mapping in mappings {
            if !mapping.active {
                report.skipped_inactive += 1;
            } else if self.is_active(mapping.id) {
                report.skipped_already_active += 1;
            } else if !self.inner.registry.is_connected(&mapping.server_id) {
                debug!(mapping_id = %mapping.id, server_id = %mapping.server_id, "Server not connected; mapping skipped");
                report.skipped_server_disconnected += 1;
            } else {
                match self.subscribe_mapping(mapping) {
                    Ok(()) => report.succeeded += 1,
                    Err(e) => {
                        warn!(mapping_id = %mapping.id, node_id = %mapping.node_id, error = %e, "Subscription failed");
                        report.fail(mapping.id, &e);
                    }
                }
            }
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            already_active = report.skipped_already_active,
            server_disconnected = report.skipped_server_disconnected,
            inactive = report.skipped_inactive,
            "Bulk subscribe finished"
        );
        report
    }

    /// Unsubscribes every active mapping.
    pub fn unsubscribe_all(&self) -> BulkReport {
        let mut report = BulkReport::default();
        for mapping_id in self.active_mappings() {
            match self.unsubscribe(mapping_id) {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    warn!(mapping_id = %mapping_id, error = %e, "Unsubscribe failed");
                    report.fail(mapping_id, &e);
                }
            }
        }
        info!(removed = report.succeeded, failed = report.failed, "Bulk unsubscribe finished");
        report
    }

    /// Forgets every subscription of a server whose connection is gone.
    ///
    /// Returns the number of forgotten entries.
    pub fn drop_server_subscriptions(&self, server_id: &ServerId) -> usize {
        self.inner.drop_server(server_id)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Returns `true` if the mapping has a registered monitored item.
    pub fn is_active(&self, mapping_id: MappingId) -> bool {
        self.inner
            .active
            .get(&mapping_id)
            .is_some_and(|slot| !slot.is_pending())
    }

    /// Number of active subscriptions.
    pub fn active_count(&self) -> usize {
        self.inner.active.iter().filter(|e| !e.is_pending()).count()
    }

    /// Ids of active mappings, sorted.
    pub fn active_mappings(&self) -> Vec<MappingId> {
        let mut ids: Vec<MappingId> = self
            .inner
            .active
            .iter()
            .filter(|e| !e.is_pending())
            .map(|e| *e.key())
            .collect();
        ids.sort();
        ids
    }

    /// Snapshot of one active subscription.
    pub fn subscription(&self, mapping_id: MappingId) -> Option<ActiveSubscription> {
        self.inner.active.get(&mapping_id).and_then(|slot| match &*slot {
            Slot::Active(entry) => Some(entry.info.clone()),
            Slot::Pending(_) => None,
        })
    }
}

impl std::fmt::Debug for SubscriptionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionEngine")
            .field("active", &self.active_count())
            .field("sink", &self.inner.sink.name())
            .finish()
    }
}

impl EngineInner {
    async fn subscribe(
        &self,
        transport: SharedTransport,
        node: NodeId,
        route: NotificationRoute,
        sampling_interval: Duration,
        publishing_interval: Duration,
    ) -> OpcUaResult<()> {
        let mapping_id = route.mapping_id;
        match self.active.entry(mapping_id) {
            Entry::Occupied(_) => {
                debug!(mapping_id = %mapping_id, "Mapping already subscribed or in progress");
                return Ok(());
            }
            Entry::Vacant(slot) => {
                slot.insert(Slot::Pending(route.server_id.clone()));
            }
        }

        let (info, changes) = match self
            .create(&transport, &node, &route, sampling_interval, publishing_interval)
            .await
        {
            Ok(created) => created,
            Err(e) => {
                self.active.remove_if(&mapping_id, |_, slot| slot.is_pending());
                return Err(e);
            }
        };

        let installed = match self.active.get_mut(&mapping_id) {
            Some(mut slot) if slot.is_pending() => {
                let dispatcher = tokio::spawn(dispatch(changes, route, self.sink.clone()));
                *slot = Slot::Active(ActiveEntry {
                    info: info.clone(),
                    dispatcher,
                });
                true
            }
            _ => false,
        };
        if !installed {
            debug!(mapping_id = %mapping_id, "Subscription cancelled while being created");
            teardown(transport, &info).await;
            return Err(OpcUaError::subscription_failed(format!(
                "subscription of mapping {} was cancelled before it completed",
                mapping_id
            )));
        }

        info!(
            mapping_id = %info.mapping_id,
            server_id = %info.server_id,
            node_id = %info.node_id,
            ioa = info.target_address,
            subscription_id = info.subscription_id,
            monitored_item_id = info.monitored_item_id,
            "Subscribed"
        );
        Ok(())
    }

    async fn create(
        &self,
        transport: &SharedTransport,
        node: &NodeId,
        route: &NotificationRoute,
        sampling_interval: Duration,
        publishing_interval: Duration,
    ) -> OpcUaResult<(ActiveSubscription, DataChangeReceiver)> {
        let class = transport.read_attribute(node, AttributeId::NodeClass).await?;
        if !class.is_good() {
            return Err(OpcUaError::bad_status(node.to_string(), class.status));
        }
        let node_class = class
            .value
            .as_i64()
            .and_then(|v| u32::try_from(v).ok())
            .and_then(NodeClass::from_value);
        if node_class != Some(NodeClass::Variable) {
            return Err(OperationError::NotAVariable {
                node_id: node.to_string(),
                node_class: node_class.map(|c| c.name()).unwrap_or("Unknown").to_string(),
            }
            .into());
        }

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let subscription_id = transport.create_subscription(publishing_interval, tx).await?;

        let monitored_item_id = match transport
            .create_monitored_item(subscription_id, node, sampling_interval, MONITORED_ITEM_QUEUE_SIZE)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                if let Err(cleanup) = transport.delete_subscription(subscription_id).await {
                    warn!(subscription_id, error = %cleanup, "Deleting orphaned subscription failed");
                }
                return Err(e);
            }
        };

        let info = ActiveSubscription {
            mapping_id: route.mapping_id,
            server_id: route.server_id.clone(),
            node_id: route.node_id.clone(),
            target_address: route.target_address,
            subscription_id,
            monitored_item_id,
            created_at: Utc::now(),
        };
        Ok((info, rx))
    }

    fn drop_server(&self, server_id: &ServerId) -> usize {
        let ids: Vec<MappingId> = self
            .active
            .iter()
            .filter(|e| e.server_id() == server_id)
            .map(|e| *e.key())
            .collect();

        let mut dropped = 0;
        for id in ids {
            match self.active.remove(&id) {
                Some((_, Slot::Active(entry))) => {
                    entry.dispatcher.abort();
                    dropped += 1;
                }
                Some((_, Slot::Pending(_))) => {
                    debug!(mapping_id = %id, "Cancelled subscription in progress");
                }
                None => {}
            }
        }
        if dropped > 0 {
            info!(server_id = %server_id, dropped, "Dropped subscriptions of disconnected server");
        }
        dropped
    }
}

async fn teardown(transport: SharedTransport, info: &ActiveSubscription) {
    if let Err(e) = transport
        .delete_monitored_item(info.subscription_id, info.monitored_item_id)
        .await
    {
        warn!(mapping_id = %info.mapping_id, error = %e, "Deleting monitored item failed");
    }
    if let Err(e) = transport.delete_subscription(info.subscription_id).await {
        warn!(mapping_id = %info.mapping_id, error = %e, "Deleting subscription failed");
    }
    info!(mapping_id = %info.mapping_id, ioa = info.target_address, "Unsubscribed");
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::OpcUaValue;
    use crate::types::StatusCode;
    use chrono::TimeZone;
    use ua104_core::types::Value;

    fn route() -> NotificationRoute {
        NotificationRoute {
            server_id: ServerId::new("a"),
            mapping_id: MappingId::new(1),
            node_id: "ns=2;s=Level".into(),
            target_address: 300,
        }
    }

    fn change(status: StatusCode) -> DataChange {
        DataChange {
            subscription_id: 1,
            monitored_item_id: 1,
            node_id: NodeId::string(2, "Level"),
            value: OpcUaValue::Double(4.5),
            status,
            source_timestamp: None,
            server_timestamp: None,
        }
    }

    #[test]
    fn test_bad_status_is_dropped() {
        assert!(route().accept(&change(StatusCode::BAD_NODE_ID_UNKNOWN)).is_none());
        assert!(route().accept(&change(StatusCode::UNCERTAIN_LAST_USABLE_VALUE)).is_none());
    }

    #[test]
    fn test_good_status_is_forwarded() {
        let update = route().accept(&change(StatusCode::GOOD)).unwrap();
        assert_eq!(update.target_address, 300);
        assert_eq!(update.value, Value::Float(4.5));
        assert!(update.quality.is_good());
    }

    #[test]
    fn test_overflow_bit_sets_ov() {
        let update = route().accept(&change(StatusCode::good_with_overflow())).unwrap();
        assert!(update.quality.contains(QualityFlags::OVERFLOW));
    }

    #[test]
    fn test_timestamp_precedence() {
        let source = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let server = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        let mut both = change(StatusCode::GOOD);
        both.source_timestamp = Some(source);
        both.server_timestamp = Some(server);
        assert_eq!(route().accept(&both).unwrap().timestamp, source);

        let mut server_only = change(StatusCode::GOOD);
        server_only.server_timestamp = Some(server);
        assert_eq!(route().accept(&server_only).unwrap().timestamp, server);

        let before = Utc::now();
        let neither = route().accept(&change(StatusCode::GOOD)).unwrap();
        assert!(neither.timestamp >= before);
    }

    #[test]
    fn test_bulk_report_total() {
        let report = BulkReport {
            succeeded: 2,
            skipped_server_disconnected: 1,
            skipped_inactive: 1,
            ..Default::default()
        };
        assert_eq!(report.total(), 4);
    }
}
