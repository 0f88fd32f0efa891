//! Saved corrections and proximity triggers.
//!
//! Each weight channel is a sum type: an entry either drives a channel through
//! exactly one policy or leaves it off. Direct channel recording replaces the
//! rotation channel, so an entry never holds both.

use nalgebra::Vector3;
use psd_api_core::{ResultKey, ResultKind};
use serde::{Deserialize, Serialize};

use crate::math::Vec3;

pub const DEFAULT_CONE_ANGLE: f64 = 60.0;
pub const DEFAULT_LOCATION_RADIUS: f64 = 0.1;
pub const DEFAULT_TRIGGER_RADIUS: f64 = 0.1;
pub const NEUTRAL_SCALE: Vec3 = [1.0, 1.0, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    #[default]
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn unit(self) -> Vector3<f64> {
        match self {
            Axis::X => Vector3::x(),
            Axis::Y => Vector3::y(),
            Axis::Z => Vector3::z(),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
        }
    }
}

/// Authored reference pair: the value at rest and the value at the target pose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RestPose {
    pub rest: Vec3,
    pub pose: Vec3,
}

impl RestPose {
    pub fn new(rest: Vec3, pose: Vec3) -> Self {
        Self { rest, pose }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RotationChannel {
    #[default]
    None,
    LinearProjection(RestPose),
    ConeFalloff {
        reference: RestPose,
        angle_deg: f64,
        axis: Axis,
    },
    /// Triangular envelope over one Euler component of the rest/pose difference.
    SwingTwist {
        reference: RestPose,
        twist_axis: Axis,
    },
}

impl RotationChannel {
    pub fn reference(&self) -> Option<&RestPose> {
        match self {
            RotationChannel::None => None,
            RotationChannel::LinearProjection(r) => Some(r),
            RotationChannel::ConeFalloff { reference, .. } => Some(reference),
            RotationChannel::SwingTwist { reference, .. } => Some(reference),
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, RotationChannel::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LocationChannel {
    #[default]
    None,
    LinearProjection(RestPose),
    /// Per-axis linear falloff around the pose location.
    AxisFalloff { reference: RestPose, radius: f64 },
}

impl LocationChannel {
    pub fn reference(&self) -> Option<&RestPose> {
        match self {
            LocationChannel::None => None,
            LocationChannel::LinearProjection(r) => Some(r),
            LocationChannel::AxisFalloff { reference, .. } => Some(reference),
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, LocationChannel::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ScaleChannel {
    #[default]
    None,
    LinearProjection(RestPose),
}

impl ScaleChannel {
    pub fn is_active(&self) -> bool {
        !matches!(self, ScaleChannel::None)
    }
}

/// Swing component reported by a swing passthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwingComponent {
    X,
    Z,
}

/// Raw angle recording, stored in radians and never clamped.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DirectChannel {
    #[default]
    None,
    EulerPassthrough {
        axis: Axis,
    },
    SwingPassthrough {
        twist_axis: Axis,
        component: SwingComponent,
    },
    TwistPassthrough {
        twist_axis: Axis,
    },
}

impl DirectChannel {
    /// Build from the recorded channel axis and an optional swing-twist axis.
    /// With a twist axis, X and Z report swing and Y reports twist.
    pub fn from_axes(channel_axis: Axis, twist_axis: Option<Axis>) -> Self {
        match (twist_axis, channel_axis) {
            (None, axis) => DirectChannel::EulerPassthrough { axis },
            (Some(twist_axis), Axis::X) => DirectChannel::SwingPassthrough {
                twist_axis,
                component: SwingComponent::X,
            },
            (Some(twist_axis), Axis::Y) => DirectChannel::TwistPassthrough { twist_axis },
            (Some(twist_axis), Axis::Z) => DirectChannel::SwingPassthrough {
                twist_axis,
                component: SwingComponent::Z,
            },
        }
    }

    pub fn channel_axis(&self) -> Option<Axis> {
        match self {
            DirectChannel::None => None,
            DirectChannel::EulerPassthrough { axis } => Some(*axis),
            DirectChannel::SwingPassthrough { component, .. } => Some(match component {
                SwingComponent::X => Axis::X,
                SwingComponent::Z => Axis::Z,
            }),
            DirectChannel::TwistPassthrough { .. } => Some(Axis::Y),
        }
    }

    pub fn twist_axis(&self) -> Option<Axis> {
        match self {
            DirectChannel::SwingPassthrough { twist_axis, .. }
            | DirectChannel::TwistPassthrough { twist_axis } => Some(*twist_axis),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, DirectChannel::None)
    }
}

/// One authored correction bound to a joint.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SavedPoseEntry {
    pub name: String,
    pub joint: String,
    pub group_name: String,
    pub rotation: RotationChannel,
    pub location: LocationChannel,
    pub scale: ScaleChannel,
    pub direct: DirectChannel,
    /// Unrecognized document fields, written back on export.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SavedPoseEntry {
    pub fn new(joint: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            joint: joint.into(),
            ..Default::default()
        }
    }

    pub fn with_rotation(mut self, rotation: RotationChannel) -> Self {
        self.rotation = rotation;
        if rotation.is_active() {
            self.direct = DirectChannel::None;
        }
        self
    }

    pub fn with_location(mut self, location: LocationChannel) -> Self {
        self.location = location;
        self
    }

    pub fn with_scale(mut self, scale: ScaleChannel) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_direct(mut self, direct: DirectChannel) -> Self {
        self.direct = direct;
        if direct.is_active() {
            self.rotation = RotationChannel::None;
        }
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group_name = group.into();
        self
    }

    pub fn key(&self, kind: ResultKind) -> ResultKey {
        ResultKey::for_entry(kind, &self.joint, &self.name)
    }

    /// Keys this entry writes during a pass.
    pub fn output_keys(&self) -> Vec<ResultKey> {
        let mut keys = Vec::with_capacity(3);
        if self.direct.is_active() || self.rotation.is_active() {
            keys.push(self.key(ResultKind::Rotation));
        }
        if self.location.is_active() {
            keys.push(self.key(ResultKind::Location));
        }
        if self.scale.is_active() {
            keys.push(self.key(ResultKind::Scale));
        }
        keys
    }

    /// Every key this entry could own, active or not. Used when purging.
    pub fn all_keys(&self) -> [ResultKey; 3] {
        ResultKind::ENTRY_KINDS.map(|kind| self.key(kind))
    }

    pub fn matches(&self, joint: &str, name: &str) -> bool {
        self.joint == joint && self.name == name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Falloff {
    #[default]
    Linear,
    Smooth,
}

/// Proximity weight between two joints' world-space heads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEntry {
    pub name: String,
    #[serde(rename = "bone_name")]
    pub source_joint: String,
    #[serde(rename = "target_bone")]
    pub target_joint: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_trigger_radius")]
    pub radius: f64,
    #[serde(default)]
    pub falloff: Falloff,
    /// Derived each pass; never authoritative.
    #[serde(skip)]
    pub last_weight: f64,
}

fn default_true() -> bool {
    true
}

fn default_trigger_radius() -> f64 {
    DEFAULT_TRIGGER_RADIUS
}

impl TriggerEntry {
    pub fn new(
        name: impl Into<String>,
        source_joint: impl Into<String>,
        target_joint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_joint: source_joint.into(),
            target_joint: target_joint.into(),
            enabled: true,
            radius: DEFAULT_TRIGGER_RADIUS,
            falloff: Falloff::Linear,
            last_weight: 0.0,
        }
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_falloff(mut self, falloff: Falloff) -> Self {
        self.falloff = falloff;
        self
    }

    pub fn key(&self) -> ResultKey {
        ResultKey::for_trigger(&self.target_joint, &self.name)
    }

    pub fn references(&self, joint: &str) -> bool {
        self.source_joint == joint || self.target_joint == joint
    }

    /// Identity used to detect duplicates on merge.
    pub fn same_identity(&self, other: &TriggerEntry) -> bool {
        self.name == other.name
            && self.source_joint == other.source_joint
            && self.target_joint == other.target_joint
    }
}
