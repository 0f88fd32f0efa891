//! One compute pass over one owner.
//!
//!   triggers -> sample filtered joints -> change filter -> entry weights
//!   -> in-memory store -> expression drivers -> persisted container
//!
//! Nothing here returns an error past the owner boundary: sampling failures drop
//! a joint for this pass, persistence failures are downgraded to "no write", and
//! only a missing or non-skeletal rig aborts the owner.

use std::collections::HashMap;
use std::time::Instant;

use indexmap::IndexMap;
use psd_api_core::{ResultKey, WriteBatch, WriteOp};
use psd_driver_core::{PoseReport, ShapeReport};
use psd_weights_core::{
    evaluate_entry, trigger_weight, JointSampler, SamplingError, TriggerEntry,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::change_cache::{ChangeCache, ChangeTolerance};
use crate::config::{EngineConfig, PersistMode};
use crate::host::Host;
use crate::ids::OwnerId;
use crate::owner::Owner;
use crate::result_store::{FlushReport, ResultStore};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PassError {
    #[error("owner '{0}' has no skeleton on the host")]
    MissingRig(String),
    #[error(transparent)]
    Sampling(#[from] SamplingError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerPassReport {
    pub owner: OwnerId,
    pub name: String,
    /// Joints with a usable sample this pass.
    pub sampled: usize,
    /// Sampled joints skipped by the change cache.
    pub skipped_unchanged: usize,
    /// Filtered joints that could not be sampled.
    pub unsampled: usize,
    pub triggers: usize,
    pub entries: usize,
    /// Keys whose in-memory value changed.
    pub writes: usize,
    pub flush: FlushReport,
    pub persist_failed: bool,
    pub shape: ShapeReport,
    pub pose: PoseReport,
    pub elapsed_ms: f64,
    /// `joint/entry` timings, filled only with diagnostics enabled.
    pub entry_ms: Vec<(String, f64)>,
}

impl OwnerPassReport {
    pub fn new(owner: OwnerId, name: &str) -> Self {
        Self {
            owner,
            name: name.to_string(),
            sampled: 0,
            skipped_unchanged: 0,
            unsampled: 0,
            triggers: 0,
            entries: 0,
            writes: 0,
            flush: FlushReport::default(),
            persist_failed: false,
            shape: ShapeReport::default(),
            pose: PoseReport::default(),
            elapsed_ms: 0.0,
            entry_ms: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerFailure {
    pub owner: OwnerId,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
    pub pass: u64,
    pub owners: Vec<OwnerPassReport>,
    pub failures: Vec<OwnerFailure>,
    pub timings_ms: HashMap<String, f64>,
}

impl PassReport {
    pub fn owner(&self, id: OwnerId) -> Option<&OwnerPassReport> {
        self.owners.iter().find(|o| o.owner == id)
    }

    pub fn writes(&self) -> usize {
        self.owners.iter().map(|o| o.writes).sum()
    }

    pub fn entries_evaluated(&self) -> usize {
        self.owners.iter().map(|o| o.entries).sum()
    }
}

/// Engine-wide state a pass borrows alongside one owner.
pub(crate) struct PassContext<'a> {
    pub config: &'a EngineConfig,
    pub changes: &'a mut ChangeCache,
    pub results: &'a mut ResultStore,
}

pub(crate) fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

pub(crate) fn run_owner(
    owner: &mut Owner,
    ctx: &mut PassContext<'_>,
    host: &mut dyn Host,
) -> Result<OwnerPassReport, PassError> {
    let started = Instant::now();
    let mut report = OwnerPassReport::new(owner.id, &owner.name);
    let batch = compute_weights(owner, ctx, &*host, &mut report)?;

    let changed = ctx
        .results
        .apply_batch(owner.id, &batch, ctx.config.cache_write_epsilon);
    report.writes = changed.len();

    let empty = IndexMap::new();
    let values = ctx.results.values(owner.id).unwrap_or(&empty);
    let (shape, pose) = owner.drivers.process(values, &owner.name, host);
    report.shape = shape;
    report.pose = pose;

    persist(owner, ctx, host, &changed, &mut report);
    report.elapsed_ms = elapsed_ms(started);
    Ok(report)
}

/// Triggers first, then every changed joint's entries, into one batch.
fn compute_weights(
    owner: &mut Owner,
    ctx: &mut PassContext<'_>,
    host: &dyn Host,
    report: &mut OwnerPassReport,
) -> Result<WriteBatch, PassError> {
    let rig = host
        .rig(&owner.name)
        .ok_or_else(|| PassError::MissingRig(owner.name.clone()))?;
    if !rig.is_skeletal() {
        return Err(PassError::Sampling(SamplingError::NotSkeletal));
    }
    let sampler = JointSampler::with_evaluated(rig, host.evaluated_rig(&owner.name));
    let tol = ChangeTolerance {
        epsilon: ctx.config.change_epsilon,
        round_digits: ctx.config.round_digits,
    };
    let timed = ctx.config.diagnostics.enabled;
    let mut batch = WriteBatch::new();

    report.triggers = evaluate_triggers(&mut owner.library.triggers, &sampler, &mut batch);

    let exempt = owner.library.trigger_joints();
    for joint in owner.library.effective_joints() {
        let sample = match sampler.sample(&joint) {
            Ok(s) if !s.is_empty() => s,
            Ok(_) => {
                log::debug!("'{}': joint '{joint}' has nothing to sample", owner.name);
                report.unsampled += 1;
                continue;
            }
            Err(err) => {
                log::debug!("'{}': {err}", owner.name);
                report.unsampled += 1;
                continue;
            }
        };
        report.sampled += 1;
        if !exempt.contains(&joint) && ctx.changes.is_unchanged(owner.id, &joint, &sample, &tol) {
            report.skipped_unchanged += 1;
            continue;
        }
        ctx.changes.record(owner.id, &joint, &sample, &tol);
        for entry in owner
            .library
            .entries
            .iter()
            .filter(|e| e.joint == joint && !e.name.is_empty())
        {
            let t = timed.then(Instant::now);
            evaluate_entry(entry, &sample, &mut batch);
            report.entries += 1;
            if let Some(t) = t {
                report
                    .entry_ms
                    .push((format!("{}/{}", entry.joint, entry.name), elapsed_ms(t)));
            }
        }
    }
    Ok(batch)
}

fn evaluate_triggers(
    triggers: &mut [TriggerEntry],
    sampler: &JointSampler<'_>,
    batch: &mut WriteBatch,
) -> usize {
    let mut evaluated = 0;
    for t in triggers.iter_mut() {
        if !t.enabled {
            t.last_weight = 0.0;
            continue;
        }
        match sampler.world_distance(&t.source_joint, &t.target_joint) {
            Ok(distance) => {
                let w = trigger_weight(distance, t.radius, t.falloff);
                t.last_weight = w;
                batch.push(WriteOp::new(t.key(), w));
                evaluated += 1;
            }
            Err(err) => log::debug!("trigger '{}' skipped: {err}", t.name),
        }
    }
    evaluated
}

fn persist(
    owner: &Owner,
    ctx: &mut PassContext<'_>,
    host: &mut dyn Host,
    changed: &[ResultKey],
    report: &mut OwnerPassReport,
) {
    let mode = ctx.config.persist;
    if mode == PersistMode::MemoryOnly {
        ctx.results.discard_pending(owner.id);
        return;
    }
    let Some(store) = host.property_store(&owner.name, owner.persist_proxy.as_deref()) else {
        log::warn!("'{}': no property container, weights not persisted", owner.name);
        report.persist_failed = true;
        return;
    };
    let result = match mode {
        PersistMode::WriteThrough => ctx.results.write_through(
            owner.id,
            changed,
            store,
            ctx.config.direct_write_epsilon,
        ),
        _ => ctx.results.flush(owner.id, store, ctx.config.flush_epsilon),
    };
    match result {
        Ok(flush) => report.flush = flush,
        Err(err) => {
            log::warn!("'{}': persist skipped this pass: {err}", owner.name);
            report.persist_failed = true;
        }
    }
}
