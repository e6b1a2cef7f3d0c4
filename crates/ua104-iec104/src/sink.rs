// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! [`Sink`] writing value updates into the running station.

use ua104_core::error::{SinkError, SinkResult};
use ua104_core::sink::{Sink, ValueUpdate};
use ua104_core::types::CommonAddress;

use crate::error::Iec104Error;
use crate::station::StationManager;

/// Routes every update to `StationManager::update_point` at the update's
/// target IOA.
#[derive(Debug, Clone)]
pub struct StationSink {
    manager: StationManager,
    common_address: CommonAddress,
}

impl StationSink {
    /// Creates a sink writing to `common_address` of `manager`'s station.
    pub fn new(manager: StationManager, common_address: CommonAddress) -> Self {
        Self {
            manager,
            common_address,
        }
    }

    /// Returns the common address written to.
    pub fn common_address(&self) -> CommonAddress {
        self.common_address
    }
}

impl Sink for StationSink {
    fn name(&self) -> &str {
        "iec104-station"
    }

    fn on_value_changed(&self, update: &ValueUpdate) -> SinkResult<()> {
        self.manager
            .update_point(
                self.common_address,
                update.target_address,
                &update.value,
                update.quality,
                Some(update.timestamp),
            )
            .map(|_| ())
            .map_err(|e| match e {
                Iec104Error::StationNotRunning => SinkError::delivery(e.to_string()),
                other => SinkError::rejected(update.target_address, other.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PointConfig, PointType, PointValue, StationConfig};
    use chrono::Utc;
    use ua104_core::quality::QualityFlags;
    use ua104_core::types::{MappingId, ServerId, Value};

    fn update(ioa: u32, value: Value) -> ValueUpdate {
        ValueUpdate {
            server_id: ServerId::new("plant"),
            mapping_id: MappingId::new(1),
            node_id: "ns=2;s=Level".to_string(),
            target_address: ioa,
            value,
            quality: QualityFlags::GOOD,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_sink_routes_to_station() {
        let manager = StationManager::new();
        let sink = StationSink::new(manager.clone(), 3);

        assert!(matches!(
            sink.on_value_changed(&update(100, Value::Int(42))),
            Err(SinkError::Delivery(_))
        ));

        manager
            .start(
                StationConfig::new("sink", "127.0.0.1", 0)
                    .with_common_address(3)
                    .with_point(PointConfig::new(100, PointType::Scaled)),
            )
            .unwrap();

        sink.on_value_changed(&update(100, Value::Int(42))).unwrap();
        assert_eq!(manager.point(3, 100).unwrap().value, PointValue::Scaled(42));

        assert!(matches!(
            sink.on_value_changed(&update(101, Value::Int(1))),
            Err(SinkError::Rejected { address: 101, .. })
        ));
        assert!(matches!(
            sink.on_value_changed(&update(100, Value::Int(70_000))),
            Err(SinkError::Rejected { address: 100, .. })
        ));
        manager.stop();
    }
}
