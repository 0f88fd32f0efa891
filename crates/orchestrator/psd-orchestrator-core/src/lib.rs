//! psd-orchestrator
//!
//! [`PsdEngine`] is the context object that owns every registry of the weight
//! engine: registered owners with their libraries and driver files, the change
//! cache, the result store, the scheduler and diagnostics. Hosts drive it through
//! the scheduler hooks (or [`PsdEngine::compute_pass`] directly) and expose their
//! scene through [`Host`].

pub mod capture;
pub mod change_cache;
pub mod config;
pub mod controllers;
pub mod diagnostics;
pub mod error;
pub mod host;
pub mod ids;
pub mod owner;
pub mod pass;
pub mod result_store;
pub mod scheduler;

use std::path::Path;
use std::time::Instant;

use indexmap::IndexMap;
use psd_api_core::{ResultKey, ResultKind};
use psd_driver_core::LoadReport;
use psd_weights_core::{
    export_document, merge_document, Axis, ConfigDocument, DirectChannel, JointSampler,
    LibraryError, MergeReport, SavedPoseEntry, TriggerEntry, Vec3,
};

pub use crate::capture::{Capture, CaptureBuffer, CaptureSlot, Channel};
pub use crate::change_cache::{ChangeCache, ChangeTolerance};
pub use crate::config::{EngineConfig, PersistMode};
pub use crate::controllers::DriverController;
pub use crate::diagnostics::{Diagnostics, DiagnosticsCfg};
pub use crate::error::EngineError;
pub use crate::host::{Host, SimpleHost};
pub use crate::ids::{IdAllocator, OwnerId};
pub use crate::owner::Owner;
pub use crate::pass::{OwnerFailure, OwnerPassReport, PassReport};
pub use crate::result_store::{FlushReport, MemoryStore, PersistError, PropertyStore, ResultStore};
pub use crate::scheduler::{ScheduleMode, Scheduler, Subscriptions, TimerTick};

/// Which cached state an invalidation drops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheScope {
    All,
    Owner(OwnerId),
    Joint(OwnerId, String),
}

/// Result of a timer callback.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerOutcome {
    pub report: Option<PassReport>,
    /// Seconds until the next callback; `None` means do not reschedule.
    pub reschedule: Option<f64>,
}

#[derive(Debug)]
pub struct PsdEngine {
    config: EngineConfig,
    ids: IdAllocator,
    owners: IndexMap<OwnerId, Owner>,
    scheduler: Scheduler,
    changes: ChangeCache,
    results: ResultStore,
    diagnostics: Diagnostics,
    pass: u64,
}

impl PsdEngine {
    pub fn new(config: EngineConfig) -> Self {
        let scheduler = Scheduler::new(config.mode, config.idle_hz);
        Self {
            config,
            ids: IdAllocator::new(),
            owners: IndexMap::new(),
            scheduler,
            changes: ChangeCache::new(),
            results: ResultStore::new(),
            diagnostics: Diagnostics::new(),
            pass: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn change_cache(&self) -> &ChangeCache {
        &self.changes
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    // ----- owners -----

    pub fn register_owner(&mut self, name: impl Into<String>) -> Result<OwnerId, EngineError> {
        let name = name.into();
        if name.is_empty() {
            return Err(EngineError::EmptyOwnerName);
        }
        let id = self.ids.alloc_owner();
        log::debug!("registered owner '{name}' as {id}");
        self.owners
            .insert(id, Owner::new(id, name, self.config.driver_apply_epsilon));
        Ok(id)
    }

    pub fn rename_owner(&mut self, id: OwnerId, name: impl Into<String>) -> Result<(), EngineError> {
        let name = name.into();
        if name.is_empty() {
            return Err(EngineError::EmptyOwnerName);
        }
        self.owner_mut(id)?.name = name;
        Ok(())
    }

    /// Unregister an owner and drop everything cached for it.
    pub fn remove_owner(&mut self, id: OwnerId) -> Result<Owner, EngineError> {
        let owner = self
            .owners
            .shift_remove(&id)
            .ok_or(EngineError::UnknownOwner(id))?;
        self.on_owner_removed(id);
        Ok(owner)
    }

    fn on_owner_removed(&mut self, id: OwnerId) {
        self.changes.invalidate_owner(id);
        self.results.remove_owner(id);
    }

    fn on_entry_removed(&mut self, id: OwnerId, keys: &[ResultKey]) {
        self.results.purge(id, keys);
    }

    pub fn owner(&self, id: OwnerId) -> Result<&Owner, EngineError> {
        self.owners.get(&id).ok_or(EngineError::UnknownOwner(id))
    }

    fn owner_mut(&mut self, id: OwnerId) -> Result<&mut Owner, EngineError> {
        self.owners.get_mut(&id).ok_or(EngineError::UnknownOwner(id))
    }

    /// First owner currently displayed under `name`.
    pub fn owner_by_name(&self, name: &str) -> Option<OwnerId> {
        self.owners.values().find(|o| o.name == name).map(|o| o.id)
    }

    pub fn owners(&self) -> impl Iterator<Item = &Owner> {
        self.owners.values()
    }

    pub fn result(&self, id: OwnerId, key: &ResultKey) -> Option<f64> {
        self.results.get(id, key)
    }

    pub fn results(&self, id: OwnerId) -> Option<&IndexMap<ResultKey, f64>> {
        self.results.values(id)
    }

    pub fn pending_purges(&self, id: OwnerId) -> usize {
        self.results.pending_purges(id)
    }

    // ----- scheduling -----

    pub fn start(&mut self) -> Subscriptions {
        self.scheduler.start()
    }

    pub fn stop(&mut self) -> Subscriptions {
        self.scheduler.stop()
    }

    pub fn set_mode(&mut self, mode: ScheduleMode) -> Subscriptions {
        self.config.mode = mode;
        self.scheduler.set_mode(mode)
    }

    pub fn set_idle_hz(&mut self, hz: f64) -> Subscriptions {
        self.config.idle_hz = hz;
        self.scheduler.set_idle_hz(hz)
    }

    pub fn on_playback_changed(&mut self, playing: bool) -> Subscriptions {
        self.scheduler.on_playback_changed(playing)
    }

    pub fn on_frame(&mut self, now: f64, host: &mut dyn Host) -> Option<PassReport> {
        self.scheduler
            .on_frame(now)
            .then(|| self.compute_pass(host))
    }

    pub fn on_graph_update(&mut self, now: f64, host: &mut dyn Host) -> Option<PassReport> {
        self.scheduler
            .on_graph_update(now)
            .then(|| self.compute_pass(host))
    }

    pub fn on_timer(&mut self, now: f64, host: &mut dyn Host) -> TimerOutcome {
        let tick = self.scheduler.on_timer(now);
        TimerOutcome {
            report: tick.run.then(|| self.compute_pass(host)),
            reschedule: tick.reschedule,
        }
    }

    /// Run one full pass over every owner, regardless of the scheduler.
    pub fn compute_pass(&mut self, host: &mut dyn Host) -> PassReport {
        let started = Instant::now();
        self.pass = self.pass.wrapping_add(1);
        let mut report = PassReport {
            pass: self.pass,
            ..Default::default()
        };
        let mut ctx = pass::PassContext {
            config: &self.config,
            changes: &mut self.changes,
            results: &mut self.results,
        };
        for owner in self.owners.values_mut() {
            match pass::run_owner(owner, &mut ctx, host) {
                Ok(r) => {
                    report
                        .timings_ms
                        .insert(format!("owner:{}", owner.name), r.elapsed_ms);
                    report.owners.push(r);
                }
                Err(err) => {
                    log::error!("pass aborted for '{}': {err}", owner.name);
                    report.failures.push(OwnerFailure {
                        owner: owner.id,
                        name: owner.name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        report
            .timings_ms
            .insert("total_ms".to_string(), pass::elapsed_ms(started));
        self.diagnostics.record(&self.config.diagnostics, &report);
        report
    }

    pub fn invalidate_cache(&mut self, scope: CacheScope) {
        match scope {
            CacheScope::All => {
                self.changes.clear();
                for owner in self.owners.values_mut() {
                    owner.drivers.invalidate();
                }
            }
            CacheScope::Owner(id) => {
                self.changes.invalidate_owner(id);
                if let Some(owner) = self.owners.get_mut(&id) {
                    owner.drivers.invalidate();
                }
            }
            CacheScope::Joint(id, joint) => self.changes.invalidate_joint(id, &joint),
        }
    }

    // ----- joint filter -----

    /// Returns false when the joint is already listed.
    pub fn add_filter_joint(&mut self, id: OwnerId, joint: &str) -> Result<bool, EngineError> {
        if joint.is_empty() {
            return Err(LibraryError::EmptyJoint.into());
        }
        Ok(self.owner_mut(id)?.library.filter.add(joint))
    }

    pub fn remove_filter_joint(&mut self, id: OwnerId, index: usize) -> Result<String, EngineError> {
        Ok(self.owner_mut(id)?.library.filter.remove_at(index)?)
    }

    pub fn move_filter_joint(&mut self, id: OwnerId, from: usize, to: usize) -> Result<(), EngineError> {
        Ok(self.owner_mut(id)?.library.filter.move_joint(from, to)?)
    }

    // ----- authoring -----

    /// Sample `joint` now and keep the value as the channel's rest or pose capture.
    pub fn capture(
        &mut self,
        id: OwnerId,
        host: &dyn Host,
        joint: &str,
        channel: Channel,
        slot: CaptureSlot,
    ) -> Result<Vec3, EngineError> {
        let owner = self.owner_mut(id)?;
        let rig = host
            .rig(&owner.name)
            .ok_or_else(|| EngineError::MissingRig(owner.name.clone()))?;
        let sampler = JointSampler::with_evaluated(rig, host.evaluated_rig(&owner.name));
        let value = match channel {
            Channel::Rotation => sampler.local_rotation_delta_degrees(joint)?,
            Channel::Location => sampler.local_translation(joint)?,
            Channel::Scale => sampler.local_scale(joint)?,
        };
        owner.captures.store(
            channel,
            slot,
            Capture {
                joint: joint.to_string(),
                value,
            },
        );
        Ok(value)
    }

    /// Turn the channel's captures into a saved entry and seed its key at 0.0.
    pub fn save_captured(
        &mut self,
        id: OwnerId,
        channel: Channel,
        name: &str,
    ) -> Result<ResultKey, EngineError> {
        let owner = self.owner_mut(id)?;
        let entry = owner
            .captures
            .build_entry(channel, name)
            .ok_or(EngineError::NothingCaptured(channel))?;
        let key = entry.key(channel.kind());
        let joint = entry.joint.clone();
        owner.library.insert(entry)?;
        owner.captures.clear(channel);
        log::info!("saved {channel} entry '{key}' on '{}'", owner.name);
        self.results.set(id, key.clone(), 0.0);
        self.changes.invalidate_joint(id, &joint);
        Ok(key)
    }

    /// Add a `record_<axis>` entry passing the joint's raw angle through.
    pub fn record_direct_channel(
        &mut self,
        id: OwnerId,
        joint: &str,
        axis: Axis,
        twist_axis: Option<Axis>,
    ) -> Result<ResultKey, EngineError> {
        let entry = SavedPoseEntry::new(joint, format!("record_{}", axis.label()))
            .with_direct(DirectChannel::from_axes(axis, twist_axis));
        let key = entry.key(ResultKind::Rotation);
        self.owner_mut(id)?.library.insert(entry)?;
        self.results.set(id, key.clone(), 0.0);
        self.changes.invalidate_joint(id, joint);
        Ok(key)
    }

    /// Edit an entry in place. Keys the edited entry no longer writes are purged
    /// and both joints are recomputed next pass.
    pub fn update_entry<F>(
        &mut self,
        id: OwnerId,
        joint: &str,
        name: &str,
        edit: F,
    ) -> Result<(), EngineError>
    where
        F: FnOnce(&mut SavedPoseEntry),
    {
        let library = &mut self.owner_mut(id)?.library;
        let mut updated = library
            .find(joint, name)
            .cloned()
            .ok_or_else(|| LibraryError::EntryNotFound {
                joint: joint.to_string(),
                name: name.to_string(),
            })?;
        edit(&mut updated);
        if updated.joint.is_empty() {
            return Err(LibraryError::EmptyJoint.into());
        }
        let keep = updated.output_keys();
        let new_joint = updated.joint.clone();
        let old = library.replace(joint, name, updated)?;
        let stale: Vec<ResultKey> = old
            .all_keys()
            .into_iter()
            .filter(|k| !keep.contains(k))
            .collect();
        self.on_entry_removed(id, &stale);
        self.changes.invalidate_joint(id, &old.joint);
        self.changes.invalidate_joint(id, &new_joint);
        Ok(())
    }

    pub fn remove_entry(&mut self, id: OwnerId, joint: &str, name: &str) -> Result<SavedPoseEntry, EngineError> {
        let removed = self.owner_mut(id)?.library.remove(joint, name)?;
        self.on_entry_removed(id, &removed.all_keys());
        Ok(removed)
    }

    pub fn add_trigger(&mut self, id: OwnerId, trigger: TriggerEntry) -> Result<usize, EngineError> {
        Ok(self.owner_mut(id)?.library.add_trigger(trigger)?)
    }

    pub fn remove_trigger(&mut self, id: OwnerId, index: usize) -> Result<TriggerEntry, EngineError> {
        let removed = self.owner_mut(id)?.library.remove_trigger(index)?;
        self.on_entry_removed(id, &[removed.key()]);
        Ok(removed)
    }

    /// Edit a trigger; a renamed or retargeted trigger drops its old key.
    pub fn update_trigger<F>(&mut self, id: OwnerId, index: usize, edit: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut TriggerEntry),
    {
        let triggers = &mut self.owner_mut(id)?.library.triggers;
        let current = triggers
            .get(index)
            .ok_or(LibraryError::TriggerNotFound(index))?;
        let mut updated = current.clone();
        edit(&mut updated);
        let clash = triggers
            .iter()
            .enumerate()
            .any(|(i, t)| i != index && t.same_identity(&updated));
        if clash {
            return Err(LibraryError::DuplicateTrigger(updated.name).into());
        }
        let old = std::mem::replace(&mut triggers[index], updated);
        let new_key = triggers[index].key();
        if old.key() != new_key {
            self.on_entry_removed(id, &[old.key()]);
        }
        Ok(())
    }

    // ----- configuration documents -----

    pub fn import_config(&mut self, id: OwnerId, path: impl AsRef<Path>) -> Result<MergeReport, EngineError> {
        self.owner(id)?;
        let doc = ConfigDocument::read(path.as_ref())?;
        Ok(self.merge_config(id, &doc))
    }

    pub fn import_config_str(&mut self, id: OwnerId, json: &str) -> Result<MergeReport, EngineError> {
        self.owner(id)?;
        let doc = ConfigDocument::from_json_str(json)?;
        Ok(self.merge_config(id, &doc))
    }

    fn merge_config(&mut self, id: OwnerId, doc: &ConfigDocument) -> MergeReport {
        let report = match self.owners.get_mut(&id) {
            Some(owner) => {
                let report = merge_document(&mut owner.library, doc);
                log::info!(
                    "imported into '{}': {} entr(ies) added, {} skipped, {} trigger(s)",
                    owner.name,
                    report.added,
                    report.skipped,
                    report.triggers_added
                );
                report
            }
            None => MergeReport::default(),
        };
        self.changes.invalidate_owner(id);
        report
    }

    pub fn export_document(&self, id: OwnerId) -> Result<ConfigDocument, EngineError> {
        Ok(export_document(&self.owner(id)?.library))
    }

    pub fn export_config(&self, id: OwnerId, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let doc = self.export_document(id)?;
        doc.write(path.as_ref())?;
        log::info!(
            "exported '{}' to {}",
            self.owner(id)?.name,
            path.as_ref().display()
        );
        Ok(())
    }

    // ----- drivers -----

    pub fn add_shape_driver_file(&mut self, id: OwnerId, path: impl AsRef<Path>) -> Result<bool, EngineError> {
        Ok(self.owner_mut(id)?.drivers.add_shape_file(path.as_ref()))
    }

    pub fn add_pose_driver_file(&mut self, id: OwnerId, path: impl AsRef<Path>) -> Result<bool, EngineError> {
        Ok(self.owner_mut(id)?.drivers.add_pose_file(path.as_ref()))
    }

    pub fn remove_shape_driver_file(&mut self, id: OwnerId, path: impl AsRef<Path>) -> Result<bool, EngineError> {
        Ok(self.owner_mut(id)?.drivers.remove_shape_file(path.as_ref()))
    }

    pub fn remove_pose_driver_file(&mut self, id: OwnerId, path: impl AsRef<Path>) -> Result<bool, EngineError> {
        Ok(self.owner_mut(id)?.drivers.remove_pose_file(path.as_ref()))
    }

    pub fn clear_driver_files(&mut self, id: OwnerId) -> Result<(), EngineError> {
        self.owner_mut(id)?.drivers.clear_files();
        Ok(())
    }

    pub fn reload_drivers(&mut self, id: OwnerId) -> Result<LoadReport, EngineError> {
        Ok(self.owner_mut(id)?.drivers.reload())
    }

    // ----- persistence -----

    pub fn register_persist_proxy(&mut self, id: OwnerId, proxy: impl Into<String>) -> Result<(), EngineError> {
        self.owner_mut(id)?.persist_proxy = Some(proxy.into());
        Ok(())
    }

    pub fn unregister_persist_proxy(&mut self, id: OwnerId) -> Result<Option<String>, EngineError> {
        Ok(self.owner_mut(id)?.persist_proxy.take())
    }
}

impl Default for PsdEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
