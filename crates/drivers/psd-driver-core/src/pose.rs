//! Pose Driver: expressions over stored weights written to constraint
//! properties, addressed as `joint -> constraint -> property`.
//!
//! Values are not clamped; a failed evaluation still stores 0.0.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use psd_api_core::ResultLookup;
use serde::{Deserialize, Serialize};

use crate::compiled::{CompiledDriver, DriverCache};
use crate::format::{self, DriverLoadError, PoseDriverDef, PoseTarget};
use crate::target::{ConstraintHost, TargetError};
use crate::LoadReport;

pub const DEFAULT_APPLY_EPSILON: f64 = 1e-3;

#[derive(Debug, Clone, PartialEq)]
pub struct PoseDriverEntry {
    pub target: PoseTarget,
    /// Skeleton object the entry applies to.
    pub skeleton: String,
    pub driver: CompiledDriver,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoseReport {
    pub recalculated: usize,
    pub applied: usize,
    /// Properties written through the custom-property fallback.
    pub custom_writes: usize,
    pub failed_writes: usize,
}

#[derive(Debug, Clone)]
pub struct PoseDriver {
    entries: IndexMap<PoseTarget, PoseDriverEntry>,
    cache: DriverCache<PoseTarget>,
    apply_epsilon: f64,
}

impl Default for PoseDriver {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
            cache: DriverCache::new(),
            apply_epsilon: DEFAULT_APPLY_EPSILON,
        }
    }
}

impl PoseDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_apply_epsilon(mut self, eps: f64) -> Self {
        self.apply_epsilon = eps;
        self
    }

    pub fn load_files<P: AsRef<Path>>(paths: &[P]) -> (Self, LoadReport) {
        let mut driver = Self::new();
        let mut report = LoadReport::default();
        for path in paths {
            let path = path.as_ref();
            match format::read_object(path) {
                Ok(doc) => {
                    report.files += 1;
                    driver.merge_document(doc, &mut report);
                }
                Err(err) => {
                    log::warn!("pose driver file skipped: {err}");
                    report.errors.push(err);
                }
            }
        }
        (driver, report)
    }

    pub fn merge_json(&mut self, text: &str, origin: &str) -> LoadReport {
        let mut report = LoadReport::default();
        match format::parse_object(text, &PathBuf::from(origin)) {
            Ok(doc) => {
                report.files += 1;
                self.merge_document(doc, &mut report);
            }
            Err(err) => report.errors.push(err),
        }
        report
    }

    fn merge_document(
        &mut self,
        doc: IndexMap<String, serde_json::Value>,
        report: &mut LoadReport,
    ) {
        for (target, parsed) in format::pose_entries(doc) {
            match parsed.and_then(|def| compile_entry(target, &def)) {
                Ok(entry) => {
                    self.cache.forget(&entry.target);
                    self.entries.insert(entry.target.clone(), entry);
                    report.loaded += 1;
                }
                Err(err) => {
                    log::warn!("pose driver entry skipped: {err}");
                    report.errors.push(err);
                }
            }
        }
    }

    pub fn insert(&mut self, entry: PoseDriverEntry) {
        self.cache.forget(&entry.target);
        self.entries.insert(entry.target.clone(), entry);
    }

    pub fn entries(&self) -> &IndexMap<PoseTarget, PoseDriverEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn value(&self, target: &PoseTarget) -> Option<f64> {
        self.cache.value(target)
    }

    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    fn applies_to<H: ConstraintHost + ?Sized>(entry: &PoseDriverEntry, host: &H) -> bool {
        entry.skeleton == host.skeleton_name() && host.has_joint(&entry.target.joint)
    }

    pub fn process<L, H>(&mut self, lookup: &L, host: &mut H) -> PoseReport
    where
        L: ResultLookup + ?Sized,
        H: ConstraintHost + ?Sized,
    {
        let mut report = PoseReport::default();
        if self.entries.is_empty() {
            return report;
        }
        for (key, entry) in &self.entries {
            if !Self::applies_to(entry, host) {
                continue;
            }
            if self
                .cache
                .refresh(key, &entry.driver, lookup, |v| if v.is_finite() { v } else { 0.0 })
            {
                report.recalculated += 1;
            }
        }
        if self.cache.is_empty() {
            return report;
        }

        for (key, entry) in &self.entries {
            if !Self::applies_to(entry, host) {
                continue;
            }
            let PoseTarget {
                joint,
                constraint,
                property,
            } = &entry.target;
            if !host.has_constraint(joint, constraint) {
                continue;
            }
            let w = self.cache.value(key).unwrap_or(0.0);
            let prev = host.constraint_property(joint, constraint, property);
            if prev.is_some_and(|p| (p - w).abs() <= self.apply_epsilon) {
                continue;
            }
            match host.set_constraint_property(joint, constraint, property, w) {
                Ok(()) => report.applied += 1,
                Err(TargetError::UnknownProperty(_)) => {
                    match host.set_custom_property(joint, constraint, property, w) {
                        Ok(()) => {
                            report.applied += 1;
                            report.custom_writes += 1;
                        }
                        Err(err) => {
                            log::warn!("pose driver write failed for '{key}': {err}");
                            report.failed_writes += 1;
                        }
                    }
                }
                Err(err) => {
                    log::warn!("pose driver write failed for '{key}': {err}");
                    report.failed_writes += 1;
                }
            }
        }
        if report.applied > 0 || report.recalculated > 0 {
            log::debug!(
                "pose drivers recalculated {}, applied {}",
                report.recalculated,
                report.applied
            );
        }
        report
    }
}

fn compile_entry(target: PoseTarget, def: &PoseDriverDef) -> Result<PoseDriverEntry, DriverLoadError> {
    let driver = CompiledDriver::compile(&target.to_string(), &def.expression, &def.variables)?;
    Ok(PoseDriverEntry {
        target,
        skeleton: def.skeleton.clone(),
        driver,
    })
}
