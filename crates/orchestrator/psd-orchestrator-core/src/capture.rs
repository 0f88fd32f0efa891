//! Rest/pose snapshots taken while authoring, waiting to become entries.

use std::fmt;

use psd_api_core::ResultKind;
use psd_weights_core::{
    LocationChannel, RestPose, RotationChannel, SavedPoseEntry, ScaleChannel, Vec3,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ENTRY_NAME: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Rotation,
    Location,
    Scale,
}

impl Channel {
    /// Value a rest capture falls back to.
    pub fn neutral(self) -> Vec3 {
        match self {
            Channel::Rotation | Channel::Location => [0.0; 3],
            Channel::Scale => [1.0; 3],
        }
    }

    pub fn kind(self) -> ResultKind {
        match self {
            Channel::Rotation => ResultKind::Rotation,
            Channel::Location => ResultKind::Location,
            Channel::Scale => ResultKind::Scale,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Channel::Rotation => "rotation",
            Channel::Location => "location",
            Channel::Scale => "scale",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSlot {
    Rest,
    Pose,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    pub joint: String,
    pub value: Vec3,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelCapture {
    pub rest: Option<Capture>,
    pub pose: Option<Capture>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureBuffer {
    rotation: ChannelCapture,
    location: ChannelCapture,
    scale: ChannelCapture,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel: Channel) -> &ChannelCapture {
        match channel {
            Channel::Rotation => &self.rotation,
            Channel::Location => &self.location,
            Channel::Scale => &self.scale,
        }
    }

    fn get_mut(&mut self, channel: Channel) -> &mut ChannelCapture {
        match channel {
            Channel::Rotation => &mut self.rotation,
            Channel::Location => &mut self.location,
            Channel::Scale => &mut self.scale,
        }
    }

    pub fn store(&mut self, channel: Channel, slot: CaptureSlot, capture: Capture) {
        let c = self.get_mut(channel);
        match slot {
            CaptureSlot::Rest => c.rest = Some(capture),
            CaptureSlot::Pose => c.pose = Some(capture),
        }
    }

    pub fn clear(&mut self, channel: Channel) {
        *self.get_mut(channel) = ChannelCapture::default();
    }

    /// Build an entry from the channel's captures, or `None` without a pose
    /// capture. A rest captured on another joint is replaced by the neutral value.
    pub fn build_entry(&self, channel: Channel, name: &str) -> Option<SavedPoseEntry> {
        let c = self.get(channel);
        let pose = c.pose.as_ref()?;
        let rest = match &c.rest {
            Some(rest) if rest.joint == pose.joint => rest.value,
            Some(rest) => {
                log::warn!(
                    "{channel} rest was captured on '{}' but pose on '{}'; using neutral rest",
                    rest.joint,
                    pose.joint
                );
                channel.neutral()
            }
            None => channel.neutral(),
        };
        let name = if name.is_empty() { DEFAULT_ENTRY_NAME } else { name };
        let reference = RestPose::new(rest, pose.value);
        let entry = SavedPoseEntry::new(pose.joint.as_str(), name);
        Some(match channel {
            Channel::Rotation => entry.with_rotation(RotationChannel::LinearProjection(reference)),
            Channel::Location => entry.with_location(LocationChannel::LinearProjection(reference)),
            Channel::Scale => entry.with_scale(ScaleChannel::LinearProjection(reference)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cap(joint: &str, value: Vec3) -> Capture {
        Capture {
            joint: joint.into(),
            value,
        }
    }

    #[test]
    fn pose_capture_is_required() {
        let mut buf = CaptureBuffer::new();
        buf.store(Channel::Rotation, CaptureSlot::Rest, cap("Elbow", [0.0; 3]));
        assert!(buf.build_entry(Channel::Rotation, "bend").is_none());
    }

    #[test]
    fn rest_from_other_joint_becomes_neutral() {
        let mut buf = CaptureBuffer::new();
        buf.store(Channel::Scale, CaptureSlot::Rest, cap("Knee", [2.0; 3]));
        buf.store(Channel::Scale, CaptureSlot::Pose, cap("Elbow", [1.5, 1.0, 1.0]));
        let e = buf.build_entry(Channel::Scale, "").unwrap();
        assert_eq!(e.name, DEFAULT_ENTRY_NAME);
        assert_eq!(e.joint, "Elbow");
        assert_eq!(
            e.scale,
            ScaleChannel::LinearProjection(RestPose::new([1.0; 3], [1.5, 1.0, 1.0]))
        );
        assert_eq!(e.rotation, RotationChannel::None);
    }

    #[test]
    fn matching_rest_is_kept_and_clear_is_per_channel() {
        let mut buf = CaptureBuffer::new();
        buf.store(Channel::Location, CaptureSlot::Rest, cap("Hand", [0.1, 0.0, 0.0]));
        buf.store(Channel::Location, CaptureSlot::Pose, cap("Hand", [0.3, 0.0, 0.0]));
        buf.store(Channel::Rotation, CaptureSlot::Pose, cap("Hand", [0.0, 0.0, 30.0]));
        let e = buf.build_entry(Channel::Location, "reach").unwrap();
        assert_eq!(
            e.location,
            LocationChannel::LinearProjection(RestPose::new([0.1, 0.0, 0.0], [0.3, 0.0, 0.0]))
        );
        buf.clear(Channel::Location);
        assert_eq!(buf.get(Channel::Location), &ChannelCapture::default());
        assert!(buf.get(Channel::Rotation).pose.is_some());
    }
}
