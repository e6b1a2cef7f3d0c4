// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! A small plant used across the suites:
//!
//! ```text
//! Objects (i=85)
//! └── Plant          ns=2;s=Plant
//!     ├── Line1      ns=2;s=Line1
//!     │   ├── Breaker   Boolean
//!     │   ├── Level     Double
//!     │   ├── Counter   Int32
//!     │   └── Plant     (cycle back to the parent)
//!     ├── Line2      ns=2;s=Line2
//!     │   └── Shared    Double
//!     └── Shared     (second path to Line2/Shared)
//! ```

use ua104_core::mapping::{Mapping, MappingSet};
use ua104_iec104::{PointConfig, PointType, StationConfig};
use ua104_opcua::{NodeId, OpcUaValue, ServerConfig};

use super::builders::AddressSpaceBuilder;
use super::mocks::{AddressSpace, MockServer};

/// Server id of the plant fixture.
pub const PLANT: &str = "plant";
/// Server id used for a second, usually unreachable, server.
pub const BACKUP: &str = "backup";
/// Common address of the fixture station.
pub const STATION_CA: u16 = 1;

/// Node ids of the plant fixture.
pub struct PlantNodes;

impl PlantNodes {
    /// `ns=2;s=Plant`
    pub fn plant() -> NodeId {
        NodeId::string(2, "Plant")
    }

    /// `ns=2;s=Line1`
    pub fn line1() -> NodeId {
        NodeId::string(2, "Line1")
    }

    /// `ns=2;s=Line2`
    pub fn line2() -> NodeId {
        NodeId::string(2, "Line2")
    }

    /// `ns=2;s=Breaker`, Boolean.
    pub fn breaker() -> NodeId {
        NodeId::string(2, "Breaker")
    }

    /// `ns=2;s=Level`, Double.
    pub fn level() -> NodeId {
        NodeId::string(2, "Level")
    }

    /// `ns=2;s=Counter`, Int32.
    pub fn counter() -> NodeId {
        NodeId::string(2, "Counter")
    }

    /// `ns=2;s=Shared`, reachable over two paths.
    pub fn shared() -> NodeId {
        NodeId::string(2, "Shared")
    }
}

/// The plant address space.
pub fn plant_space() -> AddressSpace {
    AddressSpaceBuilder::standard()
        .object(NodeId::OBJECTS_FOLDER, PlantNodes::plant(), "Plant")
        .object(PlantNodes::plant(), PlantNodes::line1(), "Line1")
        .object(PlantNodes::plant(), PlantNodes::line2(), "Line2")
        .variable(PlantNodes::line1(), PlantNodes::breaker(), "Breaker", OpcUaValue::Boolean(false))
        .variable(PlantNodes::line1(), PlantNodes::level(), "Level", OpcUaValue::Double(0.25))
        .variable(PlantNodes::line1(), PlantNodes::counter(), "Counter", OpcUaValue::Int32(7))
        .variable(PlantNodes::line2(), PlantNodes::shared(), "Shared", OpcUaValue::Double(1.5))
        .reference(PlantNodes::line1(), PlantNodes::plant())
        .reference(PlantNodes::plant(), PlantNodes::shared())
        .build()
}

/// A mock server serving [`plant_space`].
pub fn plant_server() -> MockServer {
    MockServer {
        space: plant_space(),
        ..MockServer::default()
    }
}

/// Server configuration of `server_id`.
pub fn server_config(server_id: &str) -> ServerConfig {
    ServerConfig::new(server_id, format!("opc.tcp://{}.test:4840", server_id)).with_auto_connect(true)
}

/// Mappings of the plant fixture onto the station points.
///
/// | id | node    | IOA |
/// |----|---------|-----|
/// | 1  | Breaker | 10  |
/// | 2  | Level   | 20  |
/// | 3  | Counter | 30  |
pub fn plant_mappings() -> Vec<Mapping> {
    vec![
        Mapping::new(1, PLANT, "ns=2;s=Breaker", 10),
        Mapping::new(2, PLANT, "ns=2;s=Level", 20),
        Mapping::new(3, PLANT, "ns=2;s=Counter", 30),
    ]
}

/// [`plant_mappings`] as a set.
pub fn plant_mapping_set() -> MappingSet {
    MappingSet::new(plant_mappings())
}

/// Station on an ephemeral local port with one point per plant mapping.
pub fn plant_station() -> StationConfig {
    StationConfig::new("rtu-test", "127.0.0.1", 0)
        .with_common_address(STATION_CA)
        .with_point(PointConfig::new(10, PointType::SinglePoint))
        .with_point(PointConfig::new(20, PointType::ShortFloat))
        .with_point(PointConfig::new(30, PointType::Scaled))
}
