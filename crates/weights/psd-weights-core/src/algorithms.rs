//! Weight policies: pure functions from a sample and an authored reference to a
//! scalar.
//!
//! Every normalized weight is NaN-checked and clamped to [0, 1]. Direct channel
//! recordings are angles in radians and are only NaN-checked.

use psd_api_core::{ResultKind, WriteBatch, WriteOp};

use crate::entry::{
    Axis, DirectChannel, Falloff, LocationChannel, RestPose, RotationChannel, SavedPoseEntry,
    ScaleChannel, SwingComponent,
};
use crate::math::{
    euler_deg_to_dir, euler_deg_to_quat, signed_angle_deg, swing_twist_decompose, to_vector, Vec3,
};
use crate::sampler::JointSample;

/// Thresholds for the rest == pose case of a linear projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    /// `|pose - rest|²` below this counts as a degenerate reference.
    pub degenerate: f64,
    /// Distance from rest that still counts as "at rest" for a degenerate reference.
    pub matched: f64,
}

/// Degrees.
pub const ROTATION_TOLERANCE: Tolerance = Tolerance {
    degenerate: 1e-6,
    matched: 1e-3,
};

/// Scene units (location) or scale factors.
pub const VECTOR_TOLERANCE: Tolerance = Tolerance {
    degenerate: 1e-12,
    matched: 1e-6,
};

const TWIST_TARGET_EPS: f64 = 1e-6;
const TWIST_MATCH_EPS: f64 = 1e-3;
const POINT_MATCH_EPS: f64 = 1e-6;
const MIN_TRIGGER_RADIUS: f64 = 1e-6;

#[inline]
pub fn finite_or_zero(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v
    }
}

#[inline]
pub fn clamp_weight(w: f64) -> f64 {
    finite_or_zero(w).clamp(0.0, 1.0)
}

/// Ramp up over [0, 1], back down over (1, 2], zero outside.
pub fn triangular_envelope(t: f64) -> f64 {
    if t.is_nan() || !(0.0..=2.0).contains(&t) {
        0.0
    } else if t > 1.0 {
        2.0 - t
    } else {
        t
    }
}

/// Envelope of `current / target` for scalar angles.
pub fn triangular_ratio(current: f64, target: f64) -> f64 {
    if target.abs() < TWIST_TARGET_EPS {
        return if current.abs() < TWIST_MATCH_EPS { 1.0 } else { 0.0 };
    }
    triangular_envelope(current / target)
}

/// Project `current - rest` onto `pose - rest` and apply the triangular envelope.
pub fn linear_projection(current: Vec3, reference: &RestPose, tol: Tolerance) -> f64 {
    let rest = to_vector(reference.rest);
    let dir = to_vector(reference.pose) - rest;
    let rel = to_vector(current) - rest;
    let denom = dir.norm_squared();
    if denom < tol.degenerate {
        return if rel.norm() < tol.matched { 1.0 } else { 0.0 };
    }
    let t = finite_or_zero(rel.dot(&dir) / denom);
    clamp_weight(triangular_envelope(t))
}

/// Angular distance between the basis `axis` rotated by the pose and by the
/// current rotation, mapped linearly to 1 at the center and 0 at `angle_deg`.
pub fn cone_falloff(current: Vec3, pose: Vec3, angle_deg: f64, axis: Axis) -> f64 {
    let center = euler_deg_to_dir(pose, axis);
    let dir = euler_deg_to_dir(current, axis);
    let separation = center.dot(&dir).clamp(-1.0, 1.0).acos().to_degrees();
    if separation > angle_deg {
        return 0.0;
    }
    if angle_deg <= 0.0 {
        return 1.0;
    }
    clamp_weight(1.0 - separation / angle_deg)
}

/// Triangular envelope of one Euler component, measured from rest.
pub fn swing_twist_axis_weight(current: Vec3, reference: &RestPose, axis: Axis) -> f64 {
    let i = axis.index();
    let target = reference.pose[i] - reference.rest[i];
    let cur = current[i] - reference.rest[i];
    clamp_weight(triangular_ratio(cur, target))
}

/// Product of independent per-axis linear falloffs around `center`.
pub fn axis_falloff(current: Vec3, center: Vec3, radius: f64) -> f64 {
    let d = to_vector(current) - to_vector(center);
    if radius <= 0.0 {
        return if d.norm() < POINT_MATCH_EPS { 1.0 } else { 0.0 };
    }
    let w = d
        .iter()
        .map(|c| (1.0 - c.abs() / radius).max(0.0))
        .product::<f64>();
    clamp_weight(w)
}

/// Raw angle in radians for a direct channel recording.
pub fn direct_channel(current: Vec3, channel: &DirectChannel) -> f64 {
    let degrees = match *channel {
        DirectChannel::None => return 0.0,
        DirectChannel::EulerPassthrough { axis } => current[axis.index()],
        DirectChannel::SwingPassthrough {
            twist_axis,
            component,
        } => {
            let q = euler_deg_to_quat(current);
            let (swing, _) = swing_twist_decompose(&q, &twist_axis.unit());
            let s = match component {
                SwingComponent::X => swing.i,
                SwingComponent::Z => swing.k,
            };
            (2.0 * s.clamp(-1.0, 1.0).asin()).to_degrees()
        }
        DirectChannel::TwistPassthrough { twist_axis } => {
            let q = euler_deg_to_quat(current);
            let axis = twist_axis.unit();
            let (_, twist) = swing_twist_decompose(&q, &axis);
            signed_angle_deg(&twist, &axis)
        }
    };
    finite_or_zero(degrees.to_radians())
}

/// Proximity weight: 1 when the heads coincide, 0 at `radius` and beyond.
pub fn trigger_weight(distance: f64, radius: f64, falloff: Falloff) -> f64 {
    let r = radius.max(MIN_TRIGGER_RADIUS);
    let w = match falloff {
        Falloff::Smooth => {
            let t = (distance / r).clamp(0.0, 1.0);
            1.0 - (3.0 * t * t - 2.0 * t * t * t)
        }
        Falloff::Linear => 1.0 - distance / r,
    };
    clamp_weight(w)
}

/// Rotation-key value, or `None` when the entry writes no rotation key.
/// A missing sample yields 0.0.
pub fn rotation_output(entry: &SavedPoseEntry, current: Option<Vec3>) -> Option<f64> {
    if entry.direct.is_active() {
        return Some(current.map_or(0.0, |c| direct_channel(c, &entry.direct)));
    }
    let value = match (&entry.rotation, current) {
        (RotationChannel::None, _) => return None,
        (_, None) => 0.0,
        (RotationChannel::LinearProjection(reference), Some(c)) => {
            linear_projection(c, reference, ROTATION_TOLERANCE)
        }
        (
            RotationChannel::ConeFalloff {
                reference,
                angle_deg,
                axis,
            },
            Some(c),
        ) => cone_falloff(c, reference.pose, *angle_deg, *axis),
        (
            RotationChannel::SwingTwist {
                reference,
                twist_axis,
            },
            Some(c),
        ) => swing_twist_axis_weight(c, reference, *twist_axis),
    };
    Some(clamp_weight(value))
}

pub fn location_output(entry: &SavedPoseEntry, current: Option<Vec3>) -> Option<f64> {
    let value = match (&entry.location, current) {
        (LocationChannel::None, _) => return None,
        (_, None) => 0.0,
        (LocationChannel::LinearProjection(reference), Some(c)) => {
            linear_projection(c, reference, VECTOR_TOLERANCE)
        }
        (LocationChannel::AxisFalloff { reference, radius }, Some(c)) => {
            axis_falloff(c, reference.pose, *radius)
        }
    };
    Some(clamp_weight(value))
}

pub fn scale_output(entry: &SavedPoseEntry, current: Option<Vec3>) -> Option<f64> {
    match (&entry.scale, current) {
        (ScaleChannel::None, _) => None,
        (_, None) => Some(0.0),
        (ScaleChannel::LinearProjection(reference), Some(c)) => {
            Some(linear_projection(c, reference, VECTOR_TOLERANCE))
        }
    }
}

/// Evaluate every active channel of `entry` against `sample`, appending one
/// write per output key.
pub fn evaluate_entry(entry: &SavedPoseEntry, sample: &JointSample, out: &mut WriteBatch) {
    if let Some(w) = rotation_output(entry, sample.rotation) {
        out.push(WriteOp::new(entry.key(ResultKind::Rotation), w));
    }
    if let Some(w) = location_output(entry, sample.location) {
        out.push(WriteOp::new(entry.key(ResultKind::Location), w));
    }
    if let Some(w) = scale_output(entry, sample.scale) {
        out.push(WriteOp::new(entry.key(ResultKind::Scale), w));
    }
}
