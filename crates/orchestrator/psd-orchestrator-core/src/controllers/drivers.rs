use std::path::{Path, PathBuf};

use psd_api_core::ResultLookup;
use psd_driver_core::{LoadReport, PoseDriver, PoseReport, ShapeDriver, ShapeReport};

use crate::host::Host;

/// Driver files attached to one owner and the driver sets loaded from them.
///
/// Changing a file list marks the controller stale; the next pass reloads before
/// processing. [`DriverController::reload`] does the same on demand and returns
/// the per-file and per-entry errors.
#[derive(Debug, Clone)]
pub struct DriverController {
    shape_files: Vec<PathBuf>,
    pose_files: Vec<PathBuf>,
    shape: ShapeDriver,
    pose: PoseDriver,
    apply_epsilon: f64,
    stale: bool,
}

impl DriverController {
    pub fn new(apply_epsilon: f64) -> Self {
        Self {
            shape_files: Vec::new(),
            pose_files: Vec::new(),
            shape: ShapeDriver::new().with_apply_epsilon(apply_epsilon),
            pose: PoseDriver::new().with_apply_epsilon(apply_epsilon),
            apply_epsilon,
            stale: false,
        }
    }

    pub fn shape_files(&self) -> &[PathBuf] {
        &self.shape_files
    }

    pub fn pose_files(&self) -> &[PathBuf] {
        &self.pose_files
    }

    pub fn shape(&self) -> &ShapeDriver {
        &self.shape
    }

    pub fn pose(&self) -> &PoseDriver {
        &self.pose
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Append a file; returns false when it is already listed.
    pub fn add_shape_file(&mut self, path: impl Into<PathBuf>) -> bool {
        push_unique(&mut self.shape_files, path.into(), &mut self.stale)
    }

    pub fn add_pose_file(&mut self, path: impl Into<PathBuf>) -> bool {
        push_unique(&mut self.pose_files, path.into(), &mut self.stale)
    }

    pub fn remove_shape_file(&mut self, path: &Path) -> bool {
        remove_path(&mut self.shape_files, path, &mut self.stale)
    }

    pub fn remove_pose_file(&mut self, path: &Path) -> bool {
        remove_path(&mut self.pose_files, path, &mut self.stale)
    }

    pub fn clear_files(&mut self) {
        if !self.shape_files.is_empty() || !self.pose_files.is_empty() {
            self.shape_files.clear();
            self.pose_files.clear();
            self.stale = true;
        }
    }

    pub fn has_files(&self) -> bool {
        !self.shape_files.is_empty() || !self.pose_files.is_empty()
    }

    /// Rebuild both driver sets from the current file lists.
    pub fn reload(&mut self) -> LoadReport {
        let (shape, mut report) = ShapeDriver::load_files(&self.shape_files);
        let (pose, pose_report) = PoseDriver::load_files(&self.pose_files);
        report.merge(pose_report);
        self.shape = shape.with_apply_epsilon(self.apply_epsilon);
        self.pose = pose.with_apply_epsilon(self.apply_epsilon);
        self.stale = false;
        for err in &report.errors {
            log::warn!("driver load: {err}");
        }
        log::info!(
            "loaded {} driver(s) from {} file(s) with {} error(s)",
            report.loaded,
            report.files,
            report.errors.len()
        );
        report
    }

    /// Forget cached inputs so every driver re-evaluates next pass.
    pub fn invalidate(&mut self) {
        self.shape.invalidate();
        self.pose.invalidate();
    }

    /// Run shape drivers against the host's meshes, then pose drivers against
    /// the owner's constraints. Reloads first when the file lists changed.
    pub fn process<L>(
        &mut self,
        lookup: &L,
        owner: &str,
        host: &mut dyn Host,
    ) -> (ShapeReport, PoseReport)
    where
        L: ResultLookup + ?Sized,
    {
        if self.stale {
            self.reload();
        }
        let shape = self.shape.process(lookup, host.shape_keys());
        let pose = match host.constraints(owner) {
            Some(constraints) => self.pose.process(lookup, constraints),
            None => PoseReport::default(),
        };
        (shape, pose)
    }
}

impl Default for DriverController {
    fn default() -> Self {
        Self::new(psd_driver_core::shape::DEFAULT_APPLY_EPSILON)
    }
}

fn push_unique(files: &mut Vec<PathBuf>, path: PathBuf, stale: &mut bool) -> bool {
    if files.contains(&path) {
        return false;
    }
    files.push(path);
    *stale = true;
    true
}

fn remove_path(files: &mut Vec<PathBuf>, path: &Path, stale: &mut bool) -> bool {
    let before = files.len();
    files.retain(|p| p != path);
    let removed = before != files.len();
    *stale |= removed;
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_list_changes_mark_stale() {
        let mut c = DriverController::default();
        assert!(!c.is_stale());
        assert!(c.add_shape_file("a.json"));
        assert!(!c.add_shape_file("a.json"));
        assert!(c.is_stale());
        let report = c.reload();
        assert_eq!(report.files, 0);
        assert_eq!(report.errors.len(), 1);
        assert!(!c.is_stale());
        assert!(!c.remove_pose_file(Path::new("a.json")));
        assert!(!c.is_stale());
        assert!(c.remove_shape_file(Path::new("a.json")));
        assert!(c.is_stale());
        assert!(!c.has_files());
    }
}
