// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA node to IEC 104 point mappings.
//!
//! A [`Mapping`] binds one node of one server to one information object
//! address. [`MappingSet::validate`] enforces that a node is mapped at most
//! once per server and that an address is targeted at most once per server.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MappingError;
use crate::types::{IoAddress, MappingId, ServerId, MAX_IO_ADDRESS};

/// Default sampling and publishing interval in milliseconds.
pub const DEFAULT_INTERVAL_MS: u64 = 1000;

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_MS
}

fn default_active() -> bool {
    true
}

/// A configured node to point binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    /// Unique mapping identifier.
    pub id: MappingId,
    /// Server owning the node.
    pub server_id: ServerId,
    /// Node identifier in OPC UA text form (`ns=2;s=Temp`).
    pub node_id: String,
    /// Target information object address.
    pub target_address: IoAddress,
    /// Monitored item sampling interval.
    #[serde(default = "default_interval")]
    pub sampling_interval_ms: u64,
    /// Subscription publishing interval.
    #[serde(default = "default_interval")]
    pub publishing_interval_ms: u64,
    /// Inactive mappings are skipped by bulk subscription.
    #[serde(default = "default_active")]
    pub active: bool,
    /// Free text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Mapping {
    /// Creates an active mapping with default intervals.
    pub fn new(
        id: u64,
        server_id: impl Into<ServerId>,
        node_id: impl Into<String>,
        target_address: IoAddress,
    ) -> Self {
        Self {
            id: MappingId::new(id),
            server_id: server_id.into(),
            node_id: node_id.into(),
            target_address,
            sampling_interval_ms: DEFAULT_INTERVAL_MS,
            publishing_interval_ms: DEFAULT_INTERVAL_MS,
            active: true,
            description: None,
        }
    }

    /// Sets both intervals.
    pub fn with_intervals(mut self, sampling_ms: u64, publishing_ms: u64) -> Self {
        self.sampling_interval_ms = sampling_ms;
        self.publishing_interval_ms = publishing_ms;
        self
    }

    /// Sets the active flag.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Sampling interval as a duration.
    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_interval_ms)
    }

    /// Publishing interval as a duration.
    pub fn publishing_interval(&self) -> Duration {
        Duration::from_millis(self.publishing_interval_ms)
    }

    /// Checks the fields of this mapping in isolation.
    pub fn validate(&self) -> Result<(), MappingError> {
        let invalid = |reason: &str| MappingError::Invalid {
            id: self.id,
            reason: reason.to_string(),
        };
        if self.server_id.as_str().trim().is_empty() {
            return Err(invalid("server_id is empty"));
        }
        if self.node_id.trim().is_empty() {
            return Err(invalid("node_id is empty"));
        }
        if self.target_address > MAX_IO_ADDRESS {
            return Err(invalid("target_address exceeds 0xFFFFFF"));
        }
        if self.publishing_interval_ms == 0 {
            return Err(invalid("publishing_interval_ms must be positive"));
        }
        Ok(())
    }
}

/// An ordered collection of mappings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingSet {
    mappings: Vec<Mapping>,
}

impl MappingSet {
    /// Creates a set without validating it.
    pub fn new(mappings: Vec<Mapping>) -> Self {
        Self { mappings }
    }

    /// Creates a set and validates it.
    pub fn try_new(mappings: Vec<Mapping>) -> Result<Self, MappingError> {
        let set = Self::new(mappings);
        set.validate()?;
        Ok(set)
    }

    /// Checks every mapping and the uniqueness constraints.
    pub fn validate(&self) -> Result<(), MappingError> {
        let mut ids: HashSet<MappingId> = HashSet::new();
        let mut nodes: HashMap<(&ServerId, &str), MappingId> = HashMap::new();
        let mut addresses: HashMap<(&ServerId, IoAddress), MappingId> = HashMap::new();

        for mapping in &self.mappings {
            mapping.validate()?;

            if !ids.insert(mapping.id) {
                return Err(MappingError::DuplicateId(mapping.id));
            }
            if let Some(first) = nodes.insert((&mapping.server_id, mapping.node_id.as_str()), mapping.id) {
                return Err(MappingError::DuplicateNode {
                    server_id: mapping.server_id.clone(),
                    node_id: mapping.node_id.clone(),
                    first,
                    second: mapping.id,
                });
            }
            if let Some(first) = addresses.insert((&mapping.server_id, mapping.target_address), mapping.id) {
                return Err(MappingError::DuplicateAddress {
                    server_id: mapping.server_id.clone(),
                    address: mapping.target_address,
                    first,
                    second: mapping.id,
                });
            }
        }
        Ok(())
    }

    /// Returns the mapping with `id`.
    pub fn get(&self, id: MappingId) -> Option<&Mapping> {
        self.mappings.iter().find(|m| m.id == id)
    }

    /// Iterates over all mappings in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &Mapping> {
        self.mappings.iter()
    }

    /// Iterates over the mappings of one server.
    pub fn for_server<'a>(&'a self, server_id: &'a ServerId) -> impl Iterator<Item = &'a Mapping> + 'a {
        self.mappings.iter().filter(move |m| &m.server_id == server_id)
    }

    /// Returns the number of mappings.
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Returns `true` if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Returns the mappings as a slice.
    pub fn as_slice(&self) -> &[Mapping] {
        &self.mappings
    }
}

impl From<Vec<Mapping>> for MappingSet {
    fn from(mappings: Vec<Mapping>) -> Self {
        Self::new(mappings)
    }
}

impl<'a> IntoIterator for &'a MappingSet {
    type Item = &'a Mapping;
    type IntoIter = std::slice::Iter<'a, Mapping>;

    fn into_iter(self) -> Self::IntoIter {
        self.mappings.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_set() {
        let set = MappingSet::try_new(vec![
            Mapping::new(1, "a", "ns=2;s=X", 10),
            Mapping::new(2, "a", "ns=2;s=Y", 11),
            Mapping::new(3, "b", "ns=2;s=X", 10),
        ])
        .unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.for_server(&ServerId::new("a")).count(), 2);
        assert_eq!(set.get(MappingId::new(3)).map(|m| m.target_address), Some(10));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let err = MappingSet::try_new(vec![
            Mapping::new(1, "a", "ns=2;s=X", 10),
            Mapping::new(2, "a", "ns=2;s=X", 11),
        ])
        .unwrap_err();
        assert!(matches!(err, MappingError::DuplicateNode { .. }));
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let err = MappingSet::try_new(vec![
            Mapping::new(1, "a", "ns=2;s=X", 10),
            Mapping::new(2, "a", "ns=2;s=Y", 10),
        ])
        .unwrap_err();
        assert!(matches!(err, MappingError::DuplicateAddress { address: 10, .. }));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = MappingSet::try_new(vec![
            Mapping::new(1, "a", "ns=2;s=X", 10),
            Mapping::new(1, "b", "ns=2;s=Y", 11),
        ])
        .unwrap_err();
        assert_eq!(err, MappingError::DuplicateId(MappingId::new(1)));
    }

    #[test]
    fn test_field_validation() {
        assert!(Mapping::new(1, "a", "", 10).validate().is_err());
        assert!(Mapping::new(1, "a", "i=1", 0x0100_0000).validate().is_err());
        assert!(Mapping::new(1, "a", "i=1", 1).with_intervals(0, 0).validate().is_err());
    }

    #[test]
    fn test_serde_defaults() {
        let mapping: Mapping = serde_json::from_str(
            r#"{"id": 7, "server_id": "a", "node_id": "ns=2;i=5", "target_address": 300}"#,
        )
        .unwrap();
        assert_eq!(mapping.sampling_interval_ms, 1000);
        assert_eq!(mapping.publishing_interval(), Duration::from_secs(1));
        assert!(mapping.active);
    }
}
