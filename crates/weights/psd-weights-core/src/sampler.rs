//! Per-joint geometric sampling.
//!
//! Rest data always comes from the base rig. Pose data comes from the evaluated
//! rig when one is supplied (e.g. after the host's dependency graph ran), else
//! from the base rig.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::math::{from_vector, matrix_to_euler_deg, matrix_translation, safe_inverse, Vec3};
use crate::rig::{parent_relative, Rig};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SamplingError {
    #[error("instance is not a skeleton")]
    NotSkeletal,
    #[error("joint '{0}' not found")]
    MissingJoint(String),
}

/// One pass's view of a joint. A `None` channel could not be sampled.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JointSample {
    pub rotation: Option<Vec3>,
    pub location: Option<Vec3>,
    pub scale: Option<Vec3>,
}

impl JointSample {
    pub fn is_complete(&self) -> bool {
        self.rotation.is_some() && self.location.is_some() && self.scale.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.rotation.is_none() && self.location.is_none()
    }
}

pub struct JointSampler<'a> {
    rest: &'a dyn Rig,
    pose: &'a dyn Rig,
}

impl<'a> JointSampler<'a> {
    pub fn new(rig: &'a dyn Rig) -> Self {
        Self {
            rest: rig,
            pose: rig,
        }
    }

    pub fn with_evaluated(rig: &'a dyn Rig, evaluated: Option<&'a dyn Rig>) -> Self {
        Self {
            rest: rig,
            pose: evaluated.unwrap_or(rig),
        }
    }

    fn check(&self, joint: &str) -> Result<(), SamplingError> {
        if !self.rest.is_skeletal() || !self.pose.is_skeletal() {
            return Err(SamplingError::NotSkeletal);
        }
        if !self.rest.has_joint(joint) || !self.pose.has_joint(joint) {
            return Err(SamplingError::MissingJoint(joint.to_string()));
        }
        Ok(())
    }

    fn missing(joint: &str) -> SamplingError {
        SamplingError::MissingJoint(joint.to_string())
    }

    /// `inverse(rest_local) * pose_local`, both relative to the joint's parent.
    fn local_delta(&self, joint: &str) -> Result<nalgebra::Matrix4<f64>, SamplingError> {
        self.check(joint)?;
        let rest = self.rest.rest_matrix(joint).ok_or_else(|| Self::missing(joint))?;
        let pose = self.pose.pose_matrix(joint).ok_or_else(|| Self::missing(joint))?;
        let rest_parent = self.rest.parent(joint).and_then(|p| self.rest.rest_matrix(p));
        let pose_parent = self.pose.parent(joint).and_then(|p| self.pose.pose_matrix(p));
        let rest_local = parent_relative(rest_parent, rest);
        let pose_local = parent_relative(pose_parent, pose);
        Ok(safe_inverse(&rest_local) * pose_local)
    }

    /// Local rotation away from rest, as XYZ Euler degrees.
    pub fn local_rotation_delta_degrees(&self, joint: &str) -> Result<Vec3, SamplingError> {
        let delta = self.local_delta(joint)?;
        Ok(matrix_to_euler_deg(&delta))
    }

    /// The joint's own translation channel.
    pub fn local_translation(&self, joint: &str) -> Result<Vec3, SamplingError> {
        self.check(joint)?;
        self.pose.pose_location(joint).ok_or_else(|| Self::missing(joint))
    }

    /// Translation away from rest measured from the final matrices, so motion
    /// driven by constraints is included.
    pub fn effective_local_translation(&self, joint: &str) -> Result<Vec3, SamplingError> {
        let delta = self.local_delta(joint)?;
        Ok(from_vector(&matrix_translation(&delta)))
    }

    pub fn local_scale(&self, joint: &str) -> Result<Vec3, SamplingError> {
        self.check(joint)?;
        self.pose.pose_scale(joint).ok_or_else(|| Self::missing(joint))
    }

    /// World-space posed head of a joint, read from the base rig.
    pub fn world_head(&self, joint: &str) -> Result<Vector3<f64>, SamplingError> {
        if !self.rest.is_skeletal() {
            return Err(SamplingError::NotSkeletal);
        }
        let head = self.rest.pose_head(joint).ok_or_else(|| Self::missing(joint))?;
        Ok(self.rest.world_matrix().transform_point(&head.into()).coords)
    }

    /// World distance between two joints' posed heads.
    pub fn world_distance(&self, a: &str, b: &str) -> Result<f64, SamplingError> {
        Ok((self.world_head(b)? - self.world_head(a)?).norm())
    }

    /// Batch sample. A missing joint is an error; a rotation that cannot be
    /// derived is left as `None`.
    pub fn sample(&self, joint: &str) -> Result<JointSample, SamplingError> {
        self.check(joint)?;
        Ok(JointSample {
            rotation: self.local_rotation_delta_degrees(joint).ok(),
            location: self.pose.pose_location(joint),
            scale: self.pose.pose_scale(joint),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig::SimpleRig;
    use nalgebra::Matrix4;

    fn approx(a: f64, b: f64, eps: f64) {
        assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
    }

    fn arm() -> SimpleRig {
        SimpleRig::new("arm")
            .with_joint("Upper", None, [0.0, 0.0, 1.0])
            .with_joint("Lower", Some("Upper"), [0.0, 1.0, 0.0])
    }

    #[test]
    fn rotation_delta_is_parent_relative() {
        let mut rig = arm();
        rig.set_rotation("Upper", [0.0, 0.0, 45.0]);
        rig.set_rotation("Lower", [30.0, 0.0, 0.0]);
        let s = JointSampler::new(&rig);
        let lower = s.local_rotation_delta_degrees("Lower").unwrap();
        approx(lower[0], 30.0, 1e-9);
        approx(lower[2], 0.0, 1e-9);
        let upper = s.local_rotation_delta_degrees("Upper").unwrap();
        approx(upper[2], 45.0, 1e-9);
    }

    #[test]
    fn evaluated_rig_supplies_pose() {
        let rig = arm();
        let mut eval = arm();
        eval.set_rotation("Lower", [0.0, 20.0, 0.0]);
        let s = JointSampler::with_evaluated(&rig, Some(&eval));
        approx(s.local_rotation_delta_degrees("Lower").unwrap()[1], 20.0, 1e-9);
        let plain = JointSampler::new(&rig);
        approx(plain.local_rotation_delta_degrees("Lower").unwrap()[1], 0.0, 1e-9);
    }

    #[test]
    fn effective_translation_sees_overrides() {
        let mut rig = arm();
        let rest = rig.rest_matrix("Lower").unwrap();
        let moved = rest * Matrix4::new_translation(&Vector3::new(0.25, 0.0, 0.0));
        rig.set_pose_override("Lower", Some(moved));
        let s = JointSampler::new(&rig);
        assert_eq!(s.local_translation("Lower").unwrap(), [0.0; 3]);
        let eff = s.effective_local_translation("Lower").unwrap();
        approx(eff[0], 0.25, 1e-12);
    }

    #[test]
    fn missing_joint_and_non_skeletal() {
        let mut rig = arm();
        let s = JointSampler::new(&rig);
        assert_eq!(
            s.sample("Nope"),
            Err(SamplingError::MissingJoint("Nope".into()))
        );
        rig.skeletal = false;
        let s = JointSampler::new(&rig);
        assert_eq!(s.local_scale("Upper"), Err(SamplingError::NotSkeletal));
    }

    #[test]
    fn world_distance_applies_object_transform() {
        let rig = arm().with_world(Matrix4::new_scaling(2.0));
        let s = JointSampler::new(&rig);
        approx(s.world_distance("Upper", "Lower").unwrap(), 2.0, 1e-12);
    }

    #[test]
    fn sample_collects_channels() {
        let mut rig = arm();
        rig.set_location("Lower", [0.1, 0.0, 0.0]);
        rig.set_scale("Lower", [1.0, 2.0, 1.0]);
        let sample = JointSampler::new(&rig).sample("Lower").unwrap();
        assert!(sample.is_complete());
        assert_eq!(sample.location, Some([0.1, 0.0, 0.0]));
        assert_eq!(sample.scale, Some([1.0, 2.0, 1.0]));
    }
}
