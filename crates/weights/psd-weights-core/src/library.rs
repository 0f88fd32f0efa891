//! Per-owner collection of saved entries, triggers and the joint filter.

use indexmap::IndexSet;
use thiserror::Error;

use crate::entry::{SavedPoseEntry, TriggerEntry};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LibraryError {
    #[error("entry '{name}' already exists on joint '{joint}'")]
    DuplicateEntry { joint: String, name: String },
    #[error("no entry '{name}' on joint '{joint}'")]
    EntryNotFound { joint: String, name: String },
    #[error("trigger '{0}' already exists")]
    DuplicateTrigger(String),
    #[error("no trigger at index {0}")]
    TriggerNotFound(usize),
    #[error("joint filter index {index} out of range (len {len})")]
    FilterIndex { index: usize, len: usize },
    #[error("joint name is empty")]
    EmptyJoint,
}

/// Ordered joint names restricting which joints a pass samples.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoneFilter(Vec<String>);

impl BoneFilter {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_joints<I, S>(joints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut f = Self::new();
        for j in joints {
            f.add(j);
        }
        f
    }

    /// Append a joint; returns false when it is already listed or empty.
    pub fn add(&mut self, joint: impl Into<String>) -> bool {
        let joint = joint.into();
        if joint.is_empty() || self.contains(&joint) {
            return false;
        }
        self.0.push(joint);
        true
    }

    pub fn remove(&mut self, joint: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|j| j != joint);
        before != self.0.len()
    }

    pub fn remove_at(&mut self, index: usize) -> Result<String, LibraryError> {
        if index >= self.0.len() {
            return Err(LibraryError::FilterIndex {
                index,
                len: self.0.len(),
            });
        }
        Ok(self.0.remove(index))
    }

    /// Move the joint at `from` so it ends up at `to`.
    pub fn move_joint(&mut self, from: usize, to: usize) -> Result<(), LibraryError> {
        let len = self.0.len();
        for index in [from, to] {
            if index >= len {
                return Err(LibraryError::FilterIndex { index, len });
            }
        }
        let joint = self.0.remove(from);
        self.0.insert(to, joint);
        Ok(())
    }

    pub fn contains(&self, joint: &str) -> bool {
        self.0.iter().any(|j| j == joint)
    }

    pub fn joints(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseLibrary {
    pub filter: BoneFilter,
    pub entries: Vec<SavedPoseEntry>,
    pub triggers: Vec<TriggerEntry>,
}

impl PoseLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, joint: &str, name: &str) -> Option<&SavedPoseEntry> {
        self.entries.iter().find(|e| e.matches(joint, name))
    }

    pub fn find_mut(&mut self, joint: &str, name: &str) -> Option<&mut SavedPoseEntry> {
        self.entries.iter_mut().find(|e| e.matches(joint, name))
    }

    pub fn contains(&self, joint: &str, name: &str) -> bool {
        self.find(joint, name).is_some()
    }

    /// Insert a new entry, rejecting a duplicate (joint, name).
    pub fn insert(&mut self, entry: SavedPoseEntry) -> Result<(), LibraryError> {
        if entry.joint.is_empty() {
            return Err(LibraryError::EmptyJoint);
        }
        if self.contains(&entry.joint, &entry.name) {
            return Err(LibraryError::DuplicateEntry {
                joint: entry.joint,
                name: entry.name,
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn remove(&mut self, joint: &str, name: &str) -> Result<SavedPoseEntry, LibraryError> {
        match self.entries.iter().position(|e| e.matches(joint, name)) {
            Some(idx) => Ok(self.entries.remove(idx)),
            None => Err(LibraryError::EntryNotFound {
                joint: joint.to_string(),
                name: name.to_string(),
            }),
        }
    }

    /// Replace an entry in place. Renames must not collide with another entry.
    pub fn replace(
        &mut self,
        joint: &str,
        name: &str,
        updated: SavedPoseEntry,
    ) -> Result<SavedPoseEntry, LibraryError> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.matches(joint, name))
            .ok_or_else(|| LibraryError::EntryNotFound {
                joint: joint.to_string(),
                name: name.to_string(),
            })?;
        let renamed = !updated.matches(joint, name);
        if renamed && self.contains(&updated.joint, &updated.name) {
            return Err(LibraryError::DuplicateEntry {
                joint: updated.joint,
                name: updated.name,
            });
        }
        Ok(std::mem::replace(&mut self.entries[idx], updated))
    }

    pub fn add_trigger(&mut self, trigger: TriggerEntry) -> Result<usize, LibraryError> {
        if self.triggers.iter().any(|t| t.same_identity(&trigger)) {
            return Err(LibraryError::DuplicateTrigger(trigger.name));
        }
        self.triggers.push(trigger);
        Ok(self.triggers.len() - 1)
    }

    pub fn remove_trigger(&mut self, index: usize) -> Result<TriggerEntry, LibraryError> {
        if index >= self.triggers.len() {
            return Err(LibraryError::TriggerNotFound(index));
        }
        Ok(self.triggers.remove(index))
    }

    /// Joints a pass should sample: the explicit filter when set, otherwise every
    /// joint referenced by a saved entry.
    pub fn effective_joints(&self) -> IndexSet<String> {
        if !self.filter.is_empty() {
            return self.filter.joints().iter().cloned().collect();
        }
        self.entries
            .iter()
            .filter(|e| !e.joint.is_empty())
            .map(|e| e.joint.clone())
            .collect()
    }

    /// Joints referenced by any enabled trigger.
    pub fn trigger_joints(&self) -> IndexSet<String> {
        let mut out = IndexSet::new();
        for t in self.triggers.iter().filter(|t| t.enabled) {
            if !t.source_joint.is_empty() {
                out.insert(t.source_joint.clone());
            }
            if !t.target_joint.is_empty() {
                out.insert(t.target_joint.clone());
            }
        }
        out
    }
}
