// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Runtime point table shared by the station manager and the server tasks.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use ua104_core::types::{CommonAddress, IoAddress};

use crate::error::{Iec104Error, Iec104Result};
use crate::types::{PointConfig, PointType, RuntimePoint};

/// Runtime points keyed by common address, then IOA.
///
/// Cloning shares the table. Locks are held only for the duration of a
/// lookup or a single point mutation.
///
/// Every registration gets a generation number. A station only removes
/// the points of its own generation, so a late exit of a stopped station
/// leaves the points of its successor alone.
#[derive(Debug, Clone, Default)]
pub struct PointTable {
    inner: Arc<RwLock<HashMap<CommonAddress, BTreeMap<IoAddress, RuntimePoint>>>>,
    // Lock order: owners, then inner.
    owners: Arc<Mutex<HashMap<CommonAddress, u64>>>,
    generations: Arc<AtomicU64>,
}

impl PointTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the points of `common_address` with fresh runtime points.
    ///
    /// Returns the generation of the registration.
    pub fn register(&self, common_address: CommonAddress, points: &[PointConfig]) -> u64 {
        let station: BTreeMap<_, _> = points
            .iter()
            .map(|p| (p.io_address, RuntimePoint::from_config(p)))
            .collect();

        let mut owners = self.owners.lock();
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.write().insert(common_address, station);
        owners.insert(common_address, generation);
        generation
    }

    /// Removes every point of `common_address`.
    pub fn clear(&self, common_address: CommonAddress) {
        let mut owners = self.owners.lock();
        self.inner.write().remove(&common_address);
        owners.remove(&common_address);
    }

    /// Removes the points of `common_address` if they still belong to
    /// `generation`. Returns `true` if they were removed.
    pub fn clear_generation(&self, common_address: CommonAddress, generation: u64) -> bool {
        let mut owners = self.owners.lock();
        if owners.get(&common_address) != Some(&generation) {
            return false;
        }
        self.inner.write().remove(&common_address);
        owners.remove(&common_address);
        true
    }

    /// Returns `true` if `common_address` has registered points.
    pub fn contains_station(&self, common_address: CommonAddress) -> bool {
        self.inner.read().contains_key(&common_address)
    }

    /// Returns a snapshot of one point.
    pub fn get(&self, common_address: CommonAddress, io_address: IoAddress) -> Option<RuntimePoint> {
        self.inner
            .read()
            .get(&common_address)
            .and_then(|station| station.get(&io_address))
            .cloned()
    }

    /// Returns the number of points of `common_address`.
    pub fn len(&self, common_address: CommonAddress) -> usize {
        self.inner.read().get(&common_address).map_or(0, BTreeMap::len)
    }

    /// Returns snapshots of every point of `common_address`, grouped by
    /// type in type id order and by IOA within a type.
    pub fn snapshot_by_type(&self, common_address: CommonAddress) -> Vec<(PointType, Vec<RuntimePoint>)> {
        let guard = self.inner.read();
        let Some(station) = guard.get(&common_address) else {
            return Vec::new();
        };

        let mut groups: BTreeMap<u8, (PointType, Vec<RuntimePoint>)> = BTreeMap::new();
        for point in station.values() {
            groups
                .entry(point.point_type.type_id())
                .or_insert_with(|| (point.point_type, Vec::new()))
                .1
                .push(point.clone());
        }
        groups.into_values().collect()
    }

    /// Applies `change` to one point under the write lock.
    ///
    /// The point is left untouched when `change` fails.
    pub fn update<F>(&self, common_address: CommonAddress, io_address: IoAddress, change: F) -> Iec104Result<RuntimePoint>
    where
        F: FnOnce(&RuntimePoint) -> Iec104Result<RuntimePoint>,
    {
        let mut guard = self.inner.write();
        let point = guard
            .get_mut(&common_address)
            .and_then(|station| station.get_mut(&io_address))
            .ok_or_else(|| Iec104Error::unknown_point(common_address, io_address))?;

        let updated = change(point)?;
        *point = updated.clone();
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PointValue;

    fn table() -> PointTable {
        let table = PointTable::new();
        table.register(
            1,
            &[
                PointConfig::new(20, PointType::Scaled),
                PointConfig::new(10, PointType::SinglePoint),
                PointConfig::new(11, PointType::SinglePoint),
            ],
        );
        table
    }

    #[test]
    fn test_register_and_clear() {
        let table = table();
        assert_eq!(table.len(1), 3);
        assert!(table.get(1, 10).is_some());
        assert!(table.get(2, 10).is_none());
        table.clear(1);
        assert_eq!(table.len(1), 0);
        assert!(!table.contains_station(1));
    }

    #[test]
    fn test_clear_generation_spares_newer_registration() {
        let table = PointTable::new();
        let old = table.register(1, &[PointConfig::new(10, PointType::SinglePoint)]);
        let new = table.register(1, &[PointConfig::new(10, PointType::SinglePoint)]);
        assert_ne!(old, new);

        assert!(!table.clear_generation(1, old));
        assert!(table.get(1, 10).is_some());

        assert!(table.clear_generation(1, new));
        assert!(!table.contains_station(1));
        assert!(!table.clear_generation(1, new));
    }

    #[test]
    fn test_snapshot_grouping() {
        let groups = table().snapshot_by_type(1);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, PointType::SinglePoint);
        let ioas: Vec<_> = groups[0].1.iter().map(|p| p.io_address).collect();
        assert_eq!(ioas, vec![10, 11]);
        assert_eq!(groups[1].0, PointType::Scaled);
    }

    #[test]
    fn test_failed_update_keeps_point() {
        let table = table();
        let err = table
            .update(1, 10, |_| Err(Iec104Error::invalid_value(10, "M_SP_NA_1", "no")))
            .unwrap_err();
        assert_eq!(err.category(), "point");
        assert_eq!(table.get(1, 10).unwrap().value, PointValue::Single(false));

        let updated = table
            .update(1, 10, |p| {
                let mut next = p.clone();
                next.value = PointValue::Single(true);
                Ok(next)
            })
            .unwrap();
        assert_eq!(updated.value, PointValue::Single(true));
        assert!(matches!(
            table.update(1, 99, |p| Ok(p.clone())),
            Err(Iec104Error::UnknownPoint { io_address: 99, .. })
        ));
    }
}
