//! Per-owner, per-joint memory of the last sample that produced weights.
//!
//! A joint is skippable when a previous sample exists, the new sample has every
//! channel, and each rounded component is within epsilon of the stored one. The
//! stored sample only moves when a joint is recomputed, so slow drift still
//! accumulates past the tolerance.

use hashbrown::HashMap;
use psd_weights_core::{JointSample, Vec3};

use crate::ids::OwnerId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangeTolerance {
    pub epsilon: f64,
    pub round_digits: u32,
}

impl Default for ChangeTolerance {
    fn default() -> Self {
        Self {
            epsilon: 1e-5,
            round_digits: 6,
        }
    }
}

impl ChangeTolerance {
    fn round(&self, v: f64) -> f64 {
        let scale = 10f64.powi(self.round_digits.min(15) as i32);
        (v * scale).round() / scale
    }

    fn round_vec(&self, v: Option<Vec3>) -> Option<Vec3> {
        v.map(|v| [self.round(v[0]), self.round(v[1]), self.round(v[2])])
    }

    fn rounded(&self, s: &JointSample) -> JointSample {
        JointSample {
            rotation: self.round_vec(s.rotation),
            location: self.round_vec(s.location),
            scale: self.round_vec(s.scale),
        }
    }

    fn close(&self, a: Option<Vec3>, b: Option<Vec3>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => a
                .iter()
                .zip(b.iter())
                .all(|(x, y)| (x - y).abs() <= self.epsilon),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChangeCache {
    owners: HashMap<OwnerId, HashMap<String, JointSample>>,
}

impl ChangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `sample` can be skipped for this pass.
    pub fn is_unchanged(
        &self,
        owner: OwnerId,
        joint: &str,
        sample: &JointSample,
        tol: &ChangeTolerance,
    ) -> bool {
        if !sample.is_complete() {
            return false;
        }
        let Some(prev) = self.owners.get(&owner).and_then(|m| m.get(joint)) else {
            return false;
        };
        let cur = tol.rounded(sample);
        tol.close(prev.rotation, cur.rotation)
            && tol.close(prev.location, cur.location)
            && tol.close(prev.scale, cur.scale)
    }

    pub fn record(&mut self, owner: OwnerId, joint: &str, sample: &JointSample, tol: &ChangeTolerance) {
        self.owners
            .entry(owner)
            .or_default()
            .insert(joint.to_string(), tol.rounded(sample));
    }

    pub fn get(&self, owner: OwnerId, joint: &str) -> Option<&JointSample> {
        self.owners.get(&owner)?.get(joint)
    }

    pub fn invalidate_joint(&mut self, owner: OwnerId, joint: &str) {
        if let Some(m) = self.owners.get_mut(&owner) {
            m.remove(joint);
        }
    }

    pub fn invalidate_owner(&mut self, owner: OwnerId) {
        self.owners.remove(&owner);
    }

    pub fn clear(&mut self) {
        self.owners.clear();
    }

    pub fn joint_count(&self, owner: OwnerId) -> usize {
        self.owners.get(&owner).map_or(0, |m| m.len())
    }
}
