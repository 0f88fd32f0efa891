//! Two-tier weight storage.
//!
//! Tier one is an in-memory map per owner, read by drivers and tools. Tier two
//! is a host [`PropertyStore`] (a proxy object or the owner's own data block)
//! that only ever receives writes from here.

use hashbrown::HashMap;
use indexmap::{IndexMap, IndexSet};
use psd_api_core::{ResultKey, WriteBatch};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::OwnerId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistError {
    #[error("no property container for '{0}'")]
    Unavailable(String),
    #[error("property container rejected '{key}': {reason}")]
    Rejected { key: String, reason: String },
}

/// Host-side container that persisted weights are mirrored into.
pub trait PropertyStore {
    fn property(&self, key: &ResultKey) -> Option<f64>;

    fn set_property(&mut self, key: &ResultKey, value: f64) -> Result<(), PersistError>;

    fn remove_property(&mut self, key: &ResultKey) -> Result<(), PersistError>;

    /// Tell the host that dependents of this container need re-evaluation.
    fn tag_update(&mut self) {}
}

/// In-memory container used by tests and headless hosts.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub values: IndexMap<ResultKey, f64>,
    pub update_tags: usize,
    pub sets: usize,
    /// When set every write fails.
    pub read_only: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| *v)
    }
}

impl PropertyStore for MemoryStore {
    fn property(&self, key: &ResultKey) -> Option<f64> {
        self.values.get(key).copied()
    }

    fn set_property(&mut self, key: &ResultKey, value: f64) -> Result<(), PersistError> {
        if self.read_only {
            return Err(PersistError::Rejected {
                key: key.to_string(),
                reason: "read only".into(),
            });
        }
        self.values.insert(key.clone(), value);
        self.sets += 1;
        Ok(())
    }

    fn remove_property(&mut self, key: &ResultKey) -> Result<(), PersistError> {
        if self.read_only {
            return Err(PersistError::Rejected {
                key: key.to_string(),
                reason: "read only".into(),
            });
        }
        self.values.shift_remove(key);
        Ok(())
    }

    fn tag_update(&mut self) {
        self.update_tags += 1;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushReport {
    pub written: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Default)]
struct OwnerResults {
    values: IndexMap<ResultKey, f64>,
    /// Keys removed from memory that still need deleting from the container.
    pending_purge: IndexSet<ResultKey>,
}

#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    owners: HashMap<OwnerId, OwnerResults>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store every op whose value is new or moved by more than `epsilon`.
    /// Returns the keys that changed, in batch order.
    pub fn apply_batch(&mut self, owner: OwnerId, batch: &WriteBatch, epsilon: f64) -> Vec<ResultKey> {
        let slot = self.owners.entry(owner).or_default();
        let mut changed = Vec::new();
        for op in batch.iter() {
            let write = match slot.values.get(&op.key) {
                Some(old) => (old - op.value).abs() > epsilon,
                None => true,
            };
            if write {
                slot.values.insert(op.key.clone(), op.value);
                slot.pending_purge.shift_remove(&op.key);
                changed.push(op.key.clone());
            }
        }
        changed
    }

    /// Unconditional single-key write, used to seed freshly saved entries.
    pub fn set(&mut self, owner: OwnerId, key: ResultKey, value: f64) {
        let slot = self.owners.entry(owner).or_default();
        slot.pending_purge.shift_remove(&key);
        slot.values.insert(key, value);
    }

    pub fn get(&self, owner: OwnerId, key: &ResultKey) -> Option<f64> {
        self.owners.get(&owner)?.values.get(key).copied()
    }

    pub fn values(&self, owner: OwnerId) -> Option<&IndexMap<ResultKey, f64>> {
        self.owners.get(&owner).map(|o| &o.values)
    }

    /// Drop keys from memory and queue them for removal from the container.
    pub fn purge<'k>(&mut self, owner: OwnerId, keys: impl IntoIterator<Item = &'k ResultKey>) -> usize {
        let Some(slot) = self.owners.get_mut(&owner) else {
            return 0;
        };
        let mut removed = 0;
        for key in keys {
            if slot.values.shift_remove(key).is_some() {
                removed += 1;
            }
            slot.pending_purge.insert(key.clone());
        }
        removed
    }

    pub fn pending_purges(&self, owner: OwnerId) -> usize {
        self.owners.get(&owner).map_or(0, |o| o.pending_purge.len())
    }

    /// Forget queued removals when nothing is persisted.
    pub fn discard_pending(&mut self, owner: OwnerId) {
        if let Some(slot) = self.owners.get_mut(&owner) {
            slot.pending_purge.clear();
        }
    }

    pub fn remove_owner(&mut self, owner: OwnerId) {
        self.owners.remove(&owner);
    }

    pub fn clear_owner(&mut self, owner: OwnerId) {
        if let Some(slot) = self.owners.get_mut(&owner) {
            let keys: Vec<ResultKey> = slot.values.keys().cloned().collect();
            slot.values.clear();
            slot.pending_purge.extend(keys);
        }
    }

    /// Bulk path: write keys that differ from the container by more than
    /// `epsilon`, delete pending purges, and tag the container once.
    pub fn flush(
        &mut self,
        owner: OwnerId,
        store: &mut dyn PropertyStore,
        epsilon: f64,
    ) -> Result<FlushReport, PersistError> {
        let Some(slot) = self.owners.get_mut(&owner) else {
            return Ok(FlushReport::default());
        };
        let mut report = FlushReport::default();
        for (key, value) in &slot.values {
            if differs(store.property(key), *value, epsilon) {
                store.set_property(key, *value)?;
                report.written += 1;
            }
        }
        let pending: Vec<ResultKey> = slot.pending_purge.iter().cloned().collect();
        for key in pending {
            if store.property(&key).is_some() {
                store.remove_property(&key)?;
                report.removed += 1;
            }
            slot.pending_purge.shift_remove(&key);
        }
        if report.written + report.removed > 0 {
            store.tag_update();
        }
        Ok(report)
    }

    /// Direct path: write the given keys individually with a fine threshold,
    /// tagging after each write. Pending purges are applied the same way.
    pub fn write_through(
        &mut self,
        owner: OwnerId,
        keys: &[ResultKey],
        store: &mut dyn PropertyStore,
        epsilon: f64,
    ) -> Result<FlushReport, PersistError> {
        let Some(slot) = self.owners.get_mut(&owner) else {
            return Ok(FlushReport::default());
        };
        let mut report = FlushReport::default();
        for key in keys {
            let Some(value) = slot.values.get(key).copied() else {
                continue;
            };
            if differs(store.property(key), value, epsilon) {
                store.set_property(key, value)?;
                store.tag_update();
                report.written += 1;
            }
        }
        let pending: Vec<ResultKey> = slot.pending_purge.iter().cloned().collect();
        for key in pending {
            if store.property(&key).is_some() {
                store.remove_property(&key)?;
                store.tag_update();
                report.removed += 1;
            }
            slot.pending_purge.shift_remove(&key);
        }
        Ok(report)
    }
}

fn differs(current: Option<f64>, value: f64, epsilon: f64) -> bool {
    match current {
        Some(cur) => (cur - value).abs() > epsilon,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use psd_api_core::WriteOp;

    const OWNER: OwnerId = OwnerId(3);

    fn key(s: &str) -> ResultKey {
        ResultKey::parse(s).unwrap()
    }

    fn batch(pairs: &[(&str, f64)]) -> WriteBatch {
        pairs.iter().map(|(k, v)| WriteOp::new(key(k), *v)).collect()
    }

    #[test]
    fn small_changes_do_not_rewrite_memory() {
        let mut store = ResultStore::new();
        let changed = store.apply_batch(OWNER, &batch(&[("psd_rot_A_a", 0.5)]), 1e-3);
        assert_eq!(changed.len(), 1);
        let changed = store.apply_batch(OWNER, &batch(&[("psd_rot_A_a", 0.5005)]), 1e-3);
        assert!(changed.is_empty());
        assert_eq!(store.get(OWNER, &key("psd_rot_A_a")), Some(0.5));
        let changed = store.apply_batch(OWNER, &batch(&[("psd_rot_A_a", 0.6)]), 1e-3);
        assert_eq!(changed, vec![key("psd_rot_A_a")]);
    }

    #[test]
    fn flush_tags_once_and_skips_unchanged() {
        let mut store = ResultStore::new();
        store.apply_batch(OWNER, &batch(&[("psd_rot_A_a", 0.5), ("psd_rot_A_b", 0.25)]), 1e-3);
        let mut host = MemoryStore::new();
        let r = store.flush(OWNER, &mut host, 1e-3).unwrap();
        assert_eq!(r.written, 2);
        assert_eq!(host.update_tags, 1);
        let r = store.flush(OWNER, &mut host, 1e-3).unwrap();
        assert_eq!(r, FlushReport::default());
        assert_eq!(host.update_tags, 1);
    }

    #[test]
    fn purges_reach_the_container_on_next_flush() {
        let mut store = ResultStore::new();
        store.apply_batch(OWNER, &batch(&[("psd_rot_A_a", 0.5), ("psd_rot_A_b", 0.25)]), 1e-3);
        let mut host = MemoryStore::new();
        store.flush(OWNER, &mut host, 1e-3).unwrap();
        assert_eq!(store.purge(OWNER, [&key("psd_rot_A_a")]), 1);
        assert_eq!(store.pending_purges(OWNER), 1);
        assert!(host.get("psd_rot_A_a").is_some());
        let r = store.flush(OWNER, &mut host, 1e-3).unwrap();
        assert_eq!(r.removed, 1);
        assert!(host.get("psd_rot_A_a").is_none());
        assert_eq!(store.pending_purges(OWNER), 0);
    }

    #[test]
    fn failed_flush_keeps_state_for_retry() {
        let mut store = ResultStore::new();
        store.apply_batch(OWNER, &batch(&[("psd_rot_A_a", 0.5)]), 1e-3);
        let mut host = MemoryStore {
            read_only: true,
            ..Default::default()
        };
        assert!(store.flush(OWNER, &mut host, 1e-3).is_err());
        host.read_only = false;
        assert_eq!(store.flush(OWNER, &mut host, 1e-3).unwrap().written, 1);
    }

    #[test]
    fn write_through_uses_fine_threshold() {
        let mut store = ResultStore::new();
        let mut host = MemoryStore::new();
        let changed = store.apply_batch(OWNER, &batch(&[("psd_rot_A_record_X", 0.785)]), 0.0);
        let r = store.write_through(OWNER, &changed, &mut host, 1e-6).unwrap();
        assert_eq!(r.written, 1);
        let changed = store.apply_batch(OWNER, &batch(&[("psd_rot_A_record_X", 0.78501)]), 0.0);
        store.write_through(OWNER, &changed, &mut host, 1e-6).unwrap();
        assert_eq!(host.get("psd_rot_A_record_X"), Some(0.78501));
        assert_eq!(host.update_tags, 2);
    }

    #[test]
    fn owners_are_isolated() {
        let mut store = ResultStore::new();
        store.apply_batch(OWNER, &batch(&[("psd_rot_A_a", 0.5)]), 1e-3);
        store.apply_batch(OwnerId(4), &batch(&[("psd_rot_A_a", 0.9)]), 1e-3);
        store.remove_owner(OWNER);
        assert!(store.values(OWNER).is_none());
        assert_eq!(store.get(OwnerId(4), &key("psd_rot_A_a")), Some(0.9));
    }
}
