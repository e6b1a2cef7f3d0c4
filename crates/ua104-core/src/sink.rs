// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Downstream consumers of OPC UA value changes.
//!
//! The subscription engine calls [`Sink::on_value_changed`] once per accepted
//! data change, off the bridge loop. Implementations live next to their
//! targets: the IEC 104 station sink in `ua104-iec104`, the HTTP push sink in
//! the binary.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::SinkResult;
use crate::quality::QualityFlags;
use crate::types::{IoAddress, MappingId, ServerId, Value};

/// One value change routed from a monitored item to its target point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueUpdate {
    /// Server that produced the change.
    pub server_id: ServerId,
    /// Mapping the monitored item belongs to.
    pub mapping_id: MappingId,
    /// Source node.
    pub node_id: String,
    /// IEC 104 information object address of the target point.
    pub target_address: IoAddress,
    /// Converted value.
    pub value: Value,
    /// Quality mask.
    pub quality: QualityFlags,
    /// Source timestamp, else server timestamp, else receive time.
    pub timestamp: DateTime<Utc>,
}

/// Receiver of value updates.
///
/// Calls may block; the engine never runs them on the bridge loop. Errors
/// are logged by the caller and otherwise ignored.
pub trait Sink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str {
        "sink"
    }

    /// Delivers one update.
    fn on_value_changed(&self, update: &ValueUpdate) -> SinkResult<()>;
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn on_value_changed(&self, update: &ValueUpdate) -> SinkResult<()> {
        (**self).on_value_changed(update)
    }
}

/// Sink that only logs the updates it receives.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl Sink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn on_value_changed(&self, update: &ValueUpdate) -> SinkResult<()> {
        info!(
            server_id = %update.server_id,
            mapping_id = %update.mapping_id,
            node_id = %update.node_id,
            ioa = update.target_address,
            value = %update.value,
            quality = %update.quality,
            timestamp = %update.timestamp,
            "Value changed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update() -> ValueUpdate {
        ValueUpdate {
            server_id: ServerId::new("srv"),
            mapping_id: MappingId::new(1),
            node_id: "ns=2;s=Temp".to_string(),
            target_address: 100,
            value: Value::Float(21.5),
            quality: QualityFlags::GOOD,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_log_sink_accepts_everything() {
        assert!(LogSink.on_value_changed(&update()).is_ok());
    }

    #[test]
    fn test_arc_sink_delegates() {
        let sink: Arc<dyn Sink> = Arc::new(LogSink);
        assert_eq!(sink.name(), "log");
        assert!(sink.on_value_changed(&update()).is_ok());
    }

    #[test]
    fn test_update_serializes() {
        let json = serde_json::to_value(update()).unwrap();
        assert_eq!(json["target_address"], 100);
        assert_eq!(json["value"], 21.5);
        assert_eq!(json["quality"], 0);
    }
}
