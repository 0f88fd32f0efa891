//! Read-only view of a host skeleton.
//!
//! Matrices are armature space (joint relative to the skeleton object) unless a
//! method says otherwise. Hosts implement [`Rig`]; [`SimpleRig`] is an in-memory
//! skeleton used by tests, benches and headless tools.

use indexmap::IndexMap;
use nalgebra::{Matrix4, Vector3};

use crate::math::{compose_trs, matrix_translation, safe_inverse, to_vector, Vec3};

pub trait Rig {
    /// False when the instance is not a skeleton at all.
    fn is_skeletal(&self) -> bool {
        true
    }

    fn has_joint(&self, joint: &str) -> bool;

    fn parent(&self, joint: &str) -> Option<&str>;

    fn rest_matrix(&self, joint: &str) -> Option<Matrix4<f64>>;

    fn pose_matrix(&self, joint: &str) -> Option<Matrix4<f64>>;

    /// Local translation channel of the posed joint.
    fn pose_location(&self, joint: &str) -> Option<Vec3>;

    /// Local scale channel of the posed joint.
    fn pose_scale(&self, joint: &str) -> Option<Vec3>;

    /// Object-to-world transform of the skeleton.
    fn world_matrix(&self) -> Matrix4<f64>;

    fn joint_names(&self) -> Vec<String>;

    /// Posed head position in armature space.
    fn pose_head(&self, joint: &str) -> Option<Vector3<f64>> {
        self.pose_matrix(joint).map(|m| matrix_translation(&m))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimpleJoint {
    pub parent: Option<String>,
    /// Rest transform relative to the parent's rest (armature space for roots).
    pub rest_local: Matrix4<f64>,
    pub location: Vec3,
    pub rotation_deg: Vec3,
    pub scale: Vec3,
    /// Replaces the computed pose matrix, standing in for constraints.
    pub pose_override: Option<Matrix4<f64>>,
}

impl SimpleJoint {
    fn basis(&self) -> Matrix4<f64> {
        compose_trs(self.location, self.rotation_deg, self.scale)
    }
}

/// Minimal skeleton: joints with parent links, rest offsets and pose channels.
#[derive(Debug, Clone)]
pub struct SimpleRig {
    pub name: String,
    pub world: Matrix4<f64>,
    pub skeletal: bool,
    joints: IndexMap<String, SimpleJoint>,
}

impl Default for SimpleRig {
    fn default() -> Self {
        Self {
            name: String::new(),
            world: Matrix4::identity(),
            skeletal: true,
            joints: IndexMap::new(),
        }
    }
}

impl SimpleRig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a joint whose rest head sits at `offset` from its parent's rest.
    /// Parents must be added before their children.
    pub fn with_joint(mut self, name: &str, parent: Option<&str>, offset: Vec3) -> Self {
        self.add_joint(name, parent, Matrix4::new_translation(&to_vector(offset)));
        self
    }

    pub fn add_joint(&mut self, name: &str, parent: Option<&str>, rest_local: Matrix4<f64>) {
        let parent = parent
            .filter(|p| self.joints.contains_key(*p))
            .map(str::to_string);
        self.joints.insert(
            name.to_string(),
            SimpleJoint {
                parent,
                rest_local,
                location: [0.0; 3],
                rotation_deg: [0.0; 3],
                scale: [1.0; 3],
                pose_override: None,
            },
        );
    }

    pub fn with_world(mut self, world: Matrix4<f64>) -> Self {
        self.world = world;
        self
    }

    pub fn joint_mut(&mut self, name: &str) -> Option<&mut SimpleJoint> {
        self.joints.get_mut(name)
    }

    pub fn set_rotation(&mut self, joint: &str, rotation_deg: Vec3) {
        if let Some(j) = self.joints.get_mut(joint) {
            j.rotation_deg = rotation_deg;
        }
    }

    pub fn set_location(&mut self, joint: &str, location: Vec3) {
        if let Some(j) = self.joints.get_mut(joint) {
            j.location = location;
        }
    }

    pub fn set_scale(&mut self, joint: &str, scale: Vec3) {
        if let Some(j) = self.joints.get_mut(joint) {
            j.scale = scale;
        }
    }

    pub fn set_pose_override(&mut self, joint: &str, pose: Option<Matrix4<f64>>) {
        if let Some(j) = self.joints.get_mut(joint) {
            j.pose_override = pose;
        }
    }

    /// Reset every pose channel to rest.
    pub fn clear_pose(&mut self) {
        for j in self.joints.values_mut() {
            j.location = [0.0; 3];
            j.rotation_deg = [0.0; 3];
            j.scale = [1.0; 3];
            j.pose_override = None;
        }
    }
}

impl Rig for SimpleRig {
    fn is_skeletal(&self) -> bool {
        self.skeletal
    }

    fn has_joint(&self, joint: &str) -> bool {
        self.joints.contains_key(joint)
    }

    fn parent(&self, joint: &str) -> Option<&str> {
        self.joints.get(joint)?.parent.as_deref()
    }

    fn rest_matrix(&self, joint: &str) -> Option<Matrix4<f64>> {
        let j = self.joints.get(joint)?;
        match &j.parent {
            Some(p) => Some(self.rest_matrix(p)? * j.rest_local),
            None => Some(j.rest_local),
        }
    }

    fn pose_matrix(&self, joint: &str) -> Option<Matrix4<f64>> {
        let j = self.joints.get(joint)?;
        if let Some(m) = j.pose_override {
            return Some(m);
        }
        let local = j.rest_local * j.basis();
        match &j.parent {
            Some(p) => Some(self.pose_matrix(p)? * local),
            None => Some(local),
        }
    }

    fn pose_location(&self, joint: &str) -> Option<Vec3> {
        self.joints.get(joint).map(|j| j.location)
    }

    fn pose_scale(&self, joint: &str) -> Option<Vec3> {
        self.joints.get(joint).map(|j| j.scale)
    }

    fn world_matrix(&self) -> Matrix4<f64> {
        self.world
    }

    fn joint_names(&self) -> Vec<String> {
        self.joints.keys().cloned().collect()
    }
}

/// Parent-relative matrix: `inverse(parent) * m`, or `m` for roots.
pub fn parent_relative(parent: Option<Matrix4<f64>>, m: Matrix4<f64>) -> Matrix4<f64> {
    match parent {
        Some(p) => safe_inverse(&p) * m,
        None => m,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_pose_follows_parent_rotation() {
        let mut rig = SimpleRig::new("arm")
            .with_joint("Upper", None, [0.0, 0.0, 0.0])
            .with_joint("Lower", Some("Upper"), [0.0, 1.0, 0.0]);
        rig.set_rotation("Upper", [0.0, 0.0, 90.0]);
        let head = rig.pose_head("Lower").unwrap();
        assert!((head.x + 1.0).abs() < 1e-12);
        assert!(head.y.abs() < 1e-12);
        let rest = rig.rest_matrix("Lower").unwrap();
        assert!((matrix_translation(&rest).y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unknown_parent_becomes_root() {
        let rig = SimpleRig::new("x").with_joint("Orphan", Some("Missing"), [0.0; 3]);
        assert_eq!(rig.parent("Orphan"), None);
        assert!(rig.has_joint("Orphan"));
        assert!(!rig.has_joint("Missing"));
    }
}
