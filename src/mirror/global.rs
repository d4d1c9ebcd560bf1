//! The in-memory aggregate of config units.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::mirror::unit::ConfigUnit;

/// Identifies one write to an entry.
///
/// Every insert gets a fresh stamp, so a rollback can tell its own write
/// apart from an identical value applied by someone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteStamp(u64);

#[derive(Debug, Clone)]
struct Slot {
    unit: ConfigUnit,
    stamp: WriteStamp,
}

/// Mapping from unit name to [`ConfigUnit`].
///
/// Backed by a sharded concurrent map: every operation locks only the shard
/// holding the key. Cloning takes a deep snapshot.
#[derive(Debug, Default)]
pub struct GlobalConfig {
    configs: DashMap<String, Slot>,
    next_stamp: AtomicU64,
}

impl GlobalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, unit: ConfigUnit) -> Slot {
        Slot {
            unit,
            stamp: WriteStamp(self.next_stamp.fetch_add(1, Ordering::Relaxed)),
        }
    }

    pub fn get(&self, name: &str) -> Option<ConfigUnit> {
        self.configs.get(name).map(|r| r.unit.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.configs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Unit names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// All units, sorted by name.
    pub fn units(&self) -> Vec<ConfigUnit> {
        let mut units: Vec<ConfigUnit> = self.configs.iter().map(|r| r.unit.clone()).collect();
        units.sort_by(|a, b| a.name.cmp(&b.name));
        units
    }

    /// Insert or wholesale-replace a unit, returning the value it replaced.
    pub fn upsert(&self, unit: ConfigUnit) -> Option<ConfigUnit> {
        self.stamped_upsert(unit).1
    }

    /// [`upsert`](Self::upsert), also returning the stamp of this write for
    /// a later [`restore`](Self::restore).
    pub fn stamped_upsert(&self, unit: ConfigUnit) -> (WriteStamp, Option<ConfigUnit>) {
        let slot = self.slot(unit);
        let stamp = slot.stamp;
        let previous = self.configs.insert(slot.unit.name.clone(), slot);
        (stamp, previous.map(|s| s.unit))
    }

    /// Remove a unit. Removing an absent name is a no-op.
    pub fn remove(&self, name: &str) -> Option<ConfigUnit> {
        self.configs.remove(name).map(|(_, slot)| slot.unit)
    }

    /// Undo the write to `name` identified by `stamp`.
    ///
    /// Only acts while the entry still holds that write; any later write wins,
    /// even one carrying an equal value. Returns whether the entry was restored.
    pub fn restore(&self, name: &str, stamp: WriteStamp, previous: Option<ConfigUnit>) -> bool {
        match self.configs.entry(name.to_string()) {
            Entry::Occupied(mut entry) if entry.get().stamp == stamp => {
                match previous {
                    Some(previous) => {
                        entry.insert(self.slot(previous));
                    }
                    None => {
                        entry.remove();
                    }
                }
                true
            }
            _ => false,
        }
    }

    /// Undo a [`remove`](Self::remove) unless the name was re-created since.
    pub fn restore_removed(&self, removed: ConfigUnit) -> bool {
        match self.configs.entry(removed.name.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(self.slot(removed));
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Drop every unit whose name is not in `keep`, returning the dropped names.
    pub fn retain_names(&self, keep: &HashSet<String>) -> Vec<String> {
        let mut dropped = Vec::new();
        self.configs.retain(|name, _| {
            let retained = keep.contains(name);
            if !retained {
                dropped.push(name.clone());
            }
            retained
        });
        dropped
    }
}

impl Clone for GlobalConfig {
    fn clone(&self) -> Self {
        Self {
            configs: self.configs.clone(),
            next_stamp: AtomicU64::new(self.next_stamp.load(Ordering::Relaxed)),
        }
    }
}

impl PartialEq for GlobalConfig {
    fn eq(&self, other: &Self) -> bool {
        // Compare detached snapshots; never hold shard locks of both maps.
        std::ptr::eq(self, other) || self.units() == other.units()
    }
}

impl FromIterator<ConfigUnit> for GlobalConfig {
    fn from_iter<I: IntoIterator<Item = ConfigUnit>>(iter: I) -> Self {
        let config = GlobalConfig::new();
        for unit in iter {
            config.upsert(unit);
        }
        config
    }
}

/// Wire shape: `{"configs": {name: unit}}`.
#[derive(Serialize, Deserialize)]
struct ConfigsWire {
    configs: BTreeMap<String, ConfigUnit>,
}

impl Serialize for GlobalConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let configs = self
            .units()
            .into_iter()
            .map(|unit| (unit.name.clone(), unit))
            .collect();
        ConfigsWire { configs }.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for GlobalConfig {
    /// A unit without a name takes the name of its map key.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = ConfigsWire::deserialize(deserializer)?;
        Ok(wire
            .configs
            .into_iter()
            .map(|(name, mut unit)| {
                if unit.name.is_empty() {
                    unit.name = name;
                }
                unit
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_replaces_wholesale() {
        let config = GlobalConfig::new();
        config.upsert(ConfigUnit::new("a", "1").with_cn_name("first"));
        let previous = config.upsert(ConfigUnit::new("a", "2"));

        assert_eq!(previous.unwrap().cn_name, "first");
        assert_eq!(config.get("a"), Some(ConfigUnit::new("a", "2")));
        assert_eq!(config.len(), 1);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let config = GlobalConfig::new();
        assert!(config.remove("missing").is_none());
        assert!(config.is_empty());
    }

    #[test]
    fn test_restore_previous_value() {
        let config = GlobalConfig::new();
        let old = ConfigUnit::new("a", "1");
        let new = ConfigUnit::new("a", "2");
        config.upsert(old.clone());
        let (stamp, previous) = config.stamped_upsert(new);

        assert!(config.restore("a", stamp, previous));
        assert_eq!(config.get("a"), Some(old));
    }

    #[test]
    fn test_restore_removes_fresh_entry() {
        let config = GlobalConfig::new();
        let unit = ConfigUnit::new("a", "1");
        let (stamp, previous) = config.stamped_upsert(unit);

        assert!(config.restore("a", stamp, previous));
        assert!(!config.contains("a"));
    }

    #[test]
    fn test_restore_skips_newer_value() {
        let config = GlobalConfig::new();
        let (stamp, previous) = config.stamped_upsert(ConfigUnit::new("a", "1"));
        config.upsert(ConfigUnit::new("a", "from-watch"));

        assert!(!config.restore("a", stamp, previous));
        assert_eq!(config.get("a").unwrap().value_str(), Some("from-watch"));
    }

    #[test]
    fn test_restore_skips_equal_value_written_later() {
        let config = GlobalConfig::new();
        config.upsert(ConfigUnit::new("a", "old"));
        let (stamp, previous) = config.stamped_upsert(ConfigUnit::new("a", "new"));
        // The same value arrives from the change feed before the write fails.
        config.upsert(ConfigUnit::new("a", "new"));

        assert!(!config.restore("a", stamp, previous));
        assert_eq!(config.get("a").unwrap().value_str(), Some("new"));
    }

    #[test]
    fn test_restore_removed() {
        let config = GlobalConfig::new();
        let unit = ConfigUnit::new("a", "1");
        assert!(config.restore_removed(unit.clone()));
        assert!(!config.restore_removed(ConfigUnit::new("a", "2")));
        assert_eq!(config.get("a"), Some(unit));
    }

    #[test]
    fn test_retain_names() {
        let config: GlobalConfig = ["a", "b", "c"]
            .into_iter()
            .map(|n| ConfigUnit::new(n, n))
            .collect();
        let keep: HashSet<String> = ["b".to_string()].into_iter().collect();

        let mut dropped = config.retain_names(&keep);
        dropped.sort();
        assert_eq!(dropped, vec!["a", "c"]);
        assert_eq!(config.names(), vec!["b"]);
    }

    #[test]
    fn test_json_shape_and_equality() {
        let config: GlobalConfig = [ConfigUnit::new("timeout", "30")].into_iter().collect();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"configs": {"timeout": {"name": "timeout", "value": "30"}}})
        );

        let back: GlobalConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
        assert_ne!(back, GlobalConfig::new());
    }

    #[test]
    fn test_deserialize_fills_missing_names_from_keys() {
        let config: GlobalConfig =
            serde_json::from_value(serde_json::json!({"configs": {"timeout": {"value": "30"}}}))
                .unwrap();
        assert_eq!(config.get("timeout"), Some(ConfigUnit::new("timeout", "30")));
    }

    #[test]
    fn test_self_equality_while_written() {
        let config = std::sync::Arc::new(
            (0..64)
                .map(|i| ConfigUnit::new(format!("u{i}"), i))
                .collect::<GlobalConfig>(),
        );
        let writer = {
            let config = config.clone();
            std::thread::spawn(move || {
                for i in 0..1_000 {
                    config.upsert(ConfigUnit::new(format!("u{}", i % 64), i % 64));
                }
            })
        };
        let (a, b): (&GlobalConfig, &GlobalConfig) = (&config, &config);
        for _ in 0..1_000 {
            assert!(a == b);
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_clone_is_a_snapshot() {
        let config: GlobalConfig = [ConfigUnit::new("a", "1")].into_iter().collect();
        let snapshot = config.clone();
        config.upsert(ConfigUnit::new("b", "2"));
        assert_eq!(snapshot.len(), 1);
    }
}
