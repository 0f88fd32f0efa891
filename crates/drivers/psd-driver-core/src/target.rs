//! Host-side targets drivers write to, plus in-memory implementations used by
//! tests and headless runs.

use indexmap::IndexMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("object '{0}' not found")]
    MissingObject(String),
    #[error("object '{0}' is not a mesh")]
    NotAMesh(String),
    #[error("mesh '{0}' has no shape keys")]
    NoShapeKeys(String),
    #[error("shape key '{key}' not found on '{mesh}'")]
    MissingShapeKey { mesh: String, key: String },
    #[error("batch write to '{mesh}' rejected: {reason}")]
    BatchRejected { mesh: String, reason: String },
    #[error("joint '{0}' not found")]
    MissingJoint(String),
    #[error("constraint '{constraint}' not found on '{joint}'")]
    MissingConstraint { joint: String, constraint: String },
    #[error("constraint has no property '{0}'")]
    UnknownProperty(String),
}

/// One shape key slot in block order.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeKeySlot {
    pub name: String,
    pub value: f64,
    pub slider_min: f64,
    pub slider_max: f64,
}

impl ShapeKeySlot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: 0.0,
            slider_min: 0.0,
            slider_max: 1.0,
        }
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.slider_min = min;
        self.slider_max = max;
        self
    }

    pub fn clamp(&self, v: f64) -> f64 {
        v.max(self.slider_min).min(self.slider_max)
    }
}

pub trait ShapeKeyHost {
    /// Shape keys of `mesh` in block order.
    fn shape_keys(&self, mesh: &str) -> Result<Vec<ShapeKeySlot>, TargetError>;

    /// Write every key value of `mesh` at once; `values` is in block order.
    fn write_shape_keys(&mut self, mesh: &str, values: &[f64]) -> Result<(), TargetError>;

    fn write_shape_key(&mut self, mesh: &str, key: &str, value: f64) -> Result<(), TargetError>;
}

pub trait ConstraintHost {
    /// Name of the skeleton object the constraints live on.
    fn skeleton_name(&self) -> &str;

    fn has_joint(&self, joint: &str) -> bool;

    fn has_constraint(&self, joint: &str, constraint: &str) -> bool;

    /// Current value, or `None` when the constraint has no such property.
    fn constraint_property(&self, joint: &str, constraint: &str, property: &str) -> Option<f64>;

    fn set_constraint_property(
        &mut self,
        joint: &str,
        constraint: &str,
        property: &str,
        value: f64,
    ) -> Result<(), TargetError>;

    /// Fallback storage for properties the constraint type does not declare.
    fn set_custom_property(
        &mut self,
        joint: &str,
        constraint: &str,
        property: &str,
        value: f64,
    ) -> Result<(), TargetError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryObject {
    pub is_mesh: bool,
    pub keys: Vec<ShapeKeySlot>,
    /// Fail batch writes, forcing the per-key path.
    pub reject_batch: bool,
}

/// Scene objects carrying shape keys.
#[derive(Debug, Clone, Default)]
pub struct MeshTable {
    objects: IndexMap<String, MemoryObject>,
    pub batch_writes: usize,
    pub single_writes: usize,
}

impl MeshTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mesh(mut self, name: &str, keys: Vec<ShapeKeySlot>) -> Self {
        self.objects.insert(
            name.to_string(),
            MemoryObject {
                is_mesh: true,
                keys,
                reject_batch: false,
            },
        );
        self
    }

    /// A non-mesh object with the given name.
    pub fn with_object(mut self, name: &str) -> Self {
        self.objects.insert(name.to_string(), MemoryObject::default());
        self
    }

    pub fn object_mut(&mut self, name: &str) -> Option<&mut MemoryObject> {
        self.objects.get_mut(name)
    }

    pub fn value(&self, mesh: &str, key: &str) -> Option<f64> {
        self.objects
            .get(mesh)?
            .keys
            .iter()
            .find(|k| k.name == key)
            .map(|k| k.value)
    }

    fn mesh(&self, mesh: &str) -> Result<&MemoryObject, TargetError> {
        let obj = self
            .objects
            .get(mesh)
            .ok_or_else(|| TargetError::MissingObject(mesh.to_string()))?;
        if !obj.is_mesh {
            return Err(TargetError::NotAMesh(mesh.to_string()));
        }
        if obj.keys.is_empty() {
            return Err(TargetError::NoShapeKeys(mesh.to_string()));
        }
        Ok(obj)
    }
}

impl ShapeKeyHost for MeshTable {
    fn shape_keys(&self, mesh: &str) -> Result<Vec<ShapeKeySlot>, TargetError> {
        Ok(self.mesh(mesh)?.keys.clone())
    }

    fn write_shape_keys(&mut self, mesh: &str, values: &[f64]) -> Result<(), TargetError> {
        let obj = self.mesh(mesh)?;
        if obj.reject_batch || values.len() != obj.keys.len() {
            return Err(TargetError::BatchRejected {
                mesh: mesh.to_string(),
                reason: format!("{} values for {} keys", values.len(), obj.keys.len()),
            });
        }
        if let Some(obj) = self.objects.get_mut(mesh) {
            for (slot, v) in obj.keys.iter_mut().zip(values) {
                slot.value = *v;
            }
        }
        self.batch_writes += 1;
        Ok(())
    }

    fn write_shape_key(&mut self, mesh: &str, key: &str, value: f64) -> Result<(), TargetError> {
        self.mesh(mesh)?;
        let slot = self
            .objects
            .get_mut(mesh)
            .and_then(|o| o.keys.iter_mut().find(|k| k.name == key))
            .ok_or_else(|| TargetError::MissingShapeKey {
                mesh: mesh.to_string(),
                key: key.to_string(),
            })?;
        slot.value = value;
        self.single_writes += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryConstraint {
    pub properties: IndexMap<String, f64>,
    pub custom: IndexMap<String, f64>,
}

/// Constraints on one skeleton's joints.
#[derive(Debug, Clone, Default)]
pub struct ConstraintTable {
    skeleton: String,
    joints: IndexMap<String, IndexMap<String, MemoryConstraint>>,
    pub writes: usize,
}

impl ConstraintTable {
    pub fn new(skeleton: impl Into<String>) -> Self {
        Self {
            skeleton: skeleton.into(),
            ..Default::default()
        }
    }

    pub fn with_joint(mut self, joint: &str) -> Self {
        self.joints.entry(joint.to_string()).or_default();
        self
    }

    pub fn with_constraint(mut self, joint: &str, constraint: &str, properties: &[(&str, f64)]) -> Self {
        let c = self
            .joints
            .entry(joint.to_string())
            .or_default()
            .entry(constraint.to_string())
            .or_default();
        for (name, value) in properties {
            c.properties.insert(name.to_string(), *value);
        }
        self
    }

    pub fn set_skeleton_name(&mut self, name: impl Into<String>) {
        self.skeleton = name.into();
    }

    pub fn constraint(&self, joint: &str, constraint: &str) -> Option<&MemoryConstraint> {
        self.joints.get(joint)?.get(constraint)
    }

    fn constraint_mut(
        &mut self,
        joint: &str,
        constraint: &str,
    ) -> Result<&mut MemoryConstraint, TargetError> {
        self.joints
            .get_mut(joint)
            .ok_or_else(|| TargetError::MissingJoint(joint.to_string()))?
            .get_mut(constraint)
            .ok_or_else(|| TargetError::MissingConstraint {
                joint: joint.to_string(),
                constraint: constraint.to_string(),
            })
    }
}

impl ConstraintHost for ConstraintTable {
    fn skeleton_name(&self) -> &str {
        &self.skeleton
    }

    fn has_joint(&self, joint: &str) -> bool {
        self.joints.contains_key(joint)
    }

    fn has_constraint(&self, joint: &str, constraint: &str) -> bool {
        self.constraint(joint, constraint).is_some()
    }

    fn constraint_property(&self, joint: &str, constraint: &str, property: &str) -> Option<f64> {
        self.constraint(joint, constraint)?
            .properties
            .get(property)
            .copied()
    }

    fn set_constraint_property(
        &mut self,
        joint: &str,
        constraint: &str,
        property: &str,
        value: f64,
    ) -> Result<(), TargetError> {
        let c = self.constraint_mut(joint, constraint)?;
        let slot = c
            .properties
            .get_mut(property)
            .ok_or_else(|| TargetError::UnknownProperty(property.to_string()))?;
        *slot = value;
        self.writes += 1;
        Ok(())
    }

    fn set_custom_property(
        &mut self,
        joint: &str,
        constraint: &str,
        property: &str,
        value: f64,
    ) -> Result<(), TargetError> {
        let c = self.constraint_mut(joint, constraint)?;
        c.custom.insert(property.to_string(), value);
        self.writes += 1;
        Ok(())
    }
}
