//! Shape Driver: expressions over stored weights written to mesh shape keys.

use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use indexmap::IndexMap;
use psd_api_core::ResultLookup;
use serde::{Deserialize, Serialize};

use crate::compiled::{CompiledDriver, DriverCache};
use crate::format::{self, DriverLoadError, ShapeDriverDef};
use crate::target::{ShapeKeyHost, ShapeKeySlot};
use crate::LoadReport;

pub const DEFAULT_APPLY_EPSILON: f64 = 1e-3;

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeDriverEntry {
    pub mesh: String,
    pub driver: CompiledDriver,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeReport {
    /// Drivers whose inputs changed and were re-evaluated.
    pub recalculated: usize,
    /// Shape key values that changed on the host.
    pub applied: usize,
    pub batch_writes: usize,
    pub fallback_writes: usize,
    pub missing_meshes: usize,
}

/// Per-mesh layout cached between passes.
#[derive(Debug, Clone, Default)]
struct MeshState {
    index: IndexMap<String, usize>,
    sliders: Vec<ShapeKeySlot>,
    /// Values last written in block order.
    buffer: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct ShapeDriver {
    entries: IndexMap<String, ShapeDriverEntry>,
    cache: DriverCache,
    meshes: HashMap<String, MeshState>,
    apply_epsilon: f64,
}

impl Default for ShapeDriver {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
            cache: DriverCache::new(),
            meshes: HashMap::new(),
            apply_epsilon: DEFAULT_APPLY_EPSILON,
        }
    }
}

impl ShapeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_apply_epsilon(mut self, eps: f64) -> Self {
        self.apply_epsilon = eps;
        self
    }

    /// Load files in order; later files replace earlier entries with the same
    /// shape key name. Entries that fail to load are reported and skipped.
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
                    log::warn!("shape driver file skipped: {err}");
                    report.errors.push(err);
                }
            }
        }
        (driver, report)
    }

    /// Merge one document given as JSON text. `origin` names it in errors.
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
        for (target, parsed) in format::shape_entries(doc) {
            match parsed.and_then(|def| compile_entry(&target, &def)) {
                Ok(entry) => {
                    self.cache.forget(&target);
                    self.entries.insert(target, entry);
                    report.loaded += 1;
                }
                Err(err) => {
                    log::warn!("shape driver entry skipped: {err}");
                    report.errors.push(err);
                }
            }
        }
    }

    pub fn insert(&mut self, shape_key: impl Into<String>, entry: ShapeDriverEntry) {
        let shape_key = shape_key.into();
        self.cache.forget(&shape_key);
        self.entries.insert(shape_key, entry);
    }

    pub fn entries(&self) -> &IndexMap<String, ShapeDriverEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Last evaluated value of a shape key driver.
    pub fn value(&self, shape_key: &str) -> Option<f64> {
        self.cache.value(shape_key)
    }

    /// Drop cached inputs, outputs and mesh layouts.
    pub fn invalidate(&mut self) {
        self.cache.clear();
        self.meshes.clear();
    }

    /// Re-evaluate drivers whose inputs changed, then push changed values to
    /// each mesh with one batch write.
    pub fn process<L, H>(&mut self, lookup: &L, host: &mut H) -> ShapeReport
    where
        L: ResultLookup + ?Sized,
        H: ShapeKeyHost + ?Sized,
    {
        let mut report = ShapeReport::default();
        if self.entries.is_empty() {
            return report;
        }
        for (target, entry) in &self.entries {
            if self
                .cache
                .refresh(target, &entry.driver, lookup, |v| v.clamp(0.0, 1.0))
            {
                report.recalculated += 1;
            }
        }
        if self.cache.is_empty() {
            return report;
        }

        let mut by_mesh: IndexMap<String, Vec<String>> = IndexMap::new();
        for (target, entry) in &self.entries {
            if !entry.mesh.is_empty() {
                by_mesh
                    .entry(entry.mesh.clone())
                    .or_default()
                    .push(target.clone());
            }
        }
        for (mesh, targets) in &by_mesh {
            self.apply_mesh(mesh, targets, host, &mut report);
        }
        if report.applied > 0 {
            log::debug!(
                "shape drivers applied {} value(s) across {} batch write(s)",
                report.applied,
                report.batch_writes
            );
        }
        report
    }

    fn apply_mesh<H: ShapeKeyHost + ?Sized>(
        &mut self,
        mesh: &str,
        targets: &[String],
        host: &mut H,
        report: &mut ShapeReport,
    ) {
        let slots = match host.shape_keys(mesh) {
            Ok(slots) if !slots.is_empty() => slots,
            Ok(_) => return,
            Err(err) => {
                log::warn!("shape driver target unavailable: {err}");
                report.missing_meshes += 1;
                return;
            }
        };
        let n = slots.len();
        let state = self.meshes.entry(mesh.to_string()).or_default();
        if state.index.len() != n || state.sliders.len() != n {
            state.index = slots
                .iter()
                .enumerate()
                .map(|(i, s)| (s.name.clone(), i))
                .collect();
            state.sliders = slots.clone();
        }
        if state.buffer.len() != n {
            state.buffer = slots.iter().map(|s| s.value).collect();
        }

        let mut buffer = state.buffer.clone();
        let mut changed = 0;
        for target in targets {
            let (Some(&idx), Some(w)) = (state.index.get(target.as_str()), self.cache.value(target))
            else {
                continue;
            };
            if (buffer[idx] - w).abs() > self.apply_epsilon {
                buffer[idx] = w;
                changed += 1;
            }
        }
        if changed == 0 {
            return;
        }

        match host.write_shape_keys(mesh, &buffer) {
            Ok(()) => {
                state.buffer = buffer;
                report.batch_writes += 1;
                report.applied += changed;
            }
            Err(err) => {
                log::warn!("shape key batch write failed on '{mesh}', writing per key: {err}");
                for target in targets {
                    let (Some(&idx), Some(w)) =
                        (state.index.get(target.as_str()), self.cache.value(target))
                    else {
                        continue;
                    };
                    let v = state.sliders[idx].clamp(w);
                    match host.write_shape_key(mesh, target, v) {
                        Ok(()) => {
                            state.buffer[idx] = v;
                            report.fallback_writes += 1;
                        }
                        Err(err) => log::warn!("shape key write failed: {err}"),
                    }
                }
                report.applied += changed;
            }
        }
    }
}

fn compile_entry(target: &str, def: &ShapeDriverDef) -> Result<ShapeDriverEntry, DriverLoadError> {
    Ok(ShapeDriverEntry {
        mesh: def.mesh.clone(),
        driver: CompiledDriver::compile(target, &def.expression, &def.variables)?,
    })
}
