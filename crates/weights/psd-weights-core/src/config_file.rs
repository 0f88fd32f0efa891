//! Saved-entry configuration documents (JSON).
//!
//! Layout:
//! ```json
//! {
//!   "bone_pairs": ["Elbow"],
//!   "saved_by_bone": { "Elbow": [ { "name": "bend", "bone_name": "Elbow", ... } ] },
//!   "orphan_saved_poses": [ ... ],
//!   "triggers": [ ... ]
//! }
//! ```
//! Entries whose joint is in `bone_pairs` are grouped under `saved_by_bone`; the
//! rest go to `orphan_saved_poses`. `triggers` is optional. Unknown entry fields
//! are carried through an import/export cycle untouched.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entry::{
    Axis, DirectChannel, LocationChannel, RestPose, RotationChannel, SavedPoseEntry, ScaleChannel,
    TriggerEntry, DEFAULT_CONE_ANGLE, DEFAULT_LOCATION_RADIUS, NEUTRAL_SCALE,
};
use crate::library::PoseLibrary;
use crate::math::Vec3;

const FALLBACK_ENTRY_NAME: &str = "entry";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Twist axis selector shared by the swing-twist entry mode and direct recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TwistMode {
    #[default]
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "SWING_X_TWIST", alias = "record_rot_SWING_X_TWIST")]
    SwingX,
    #[serde(rename = "SWING_Y_TWIST", alias = "record_rot_SWING_Y_TWIST")]
    SwingY,
    #[serde(rename = "SWING_Z_TWIST", alias = "record_rot_SWING_Z_TWIST")]
    SwingZ,
}

impl TwistMode {
    pub fn axis(self) -> Option<Axis> {
        match self {
            TwistMode::None => None,
            TwistMode::SwingX => Some(Axis::X),
            TwistMode::SwingY => Some(Axis::Y),
            TwistMode::SwingZ => Some(Axis::Z),
        }
    }

    pub fn from_axis(axis: Option<Axis>) -> Self {
        match axis {
            None => TwistMode::None,
            Some(Axis::X) => TwistMode::SwingX,
            Some(Axis::Y) => TwistMode::SwingY,
            Some(Axis::Z) => TwistMode::SwingZ,
        }
    }
}

/// The recording mode is written with its `record_rot_` prefix.
mod record_mode {
    use super::TwistMode;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(mode: &TwistMode, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(match mode {
            TwistMode::None => "NONE",
            TwistMode::SwingX => "record_rot_SWING_X_TWIST",
            TwistMode::SwingY => "record_rot_SWING_Y_TWIST",
            TwistMode::SwingZ => "record_rot_SWING_Z_TWIST",
        })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<TwistMode, D::Error> {
        TwistMode::deserialize(d)
    }
}

fn zero3() -> Vec3 {
    [0.0; 3]
}

fn one3() -> Vec3 {
    NEUTRAL_SCALE
}

/// Vector fields of channels that import as inactive. Their values ride in the
/// entry's `extra` map so an export writes them back unchanged.
const INACTIVE_VECTOR_KEYS: [&str; 6] = [
    "rest_rot", "pose_rot", "rest_loc", "pose_loc", "rest_sca", "pose_sca",
];

type ExtraFields = serde_json::Map<String, serde_json::Value>;

fn stash_vector(extra: &mut ExtraFields, key: &str, v: Vec3, default: Vec3) {
    if v != default {
        extra.insert(key.to_string(), serde_json::json!(v));
    }
}

fn take_vector(extra: &mut ExtraFields, key: &str) -> Option<Vec3> {
    extra.remove(key).and_then(|v| serde_json::from_value(v).ok())
}

fn default_cone_angle() -> f64 {
    DEFAULT_CONE_ANGLE
}

fn default_loc_radius() -> f64 {
    DEFAULT_LOCATION_RADIUS
}

fn default_channel_axis() -> Axis {
    Axis::X
}

/// Wire form of one saved entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bone_name: String,
    #[serde(default = "zero3")]
    pub rest_rot: Vec3,
    #[serde(default = "zero3")]
    pub pose_rot: Vec3,
    #[serde(default)]
    pub has_rot: bool,
    #[serde(default)]
    pub rot_channel_mode: TwistMode,
    #[serde(default)]
    pub cone_enabled: bool,
    #[serde(default = "default_cone_angle")]
    pub cone_angle: f64,
    #[serde(default)]
    pub cone_axis: Axis,
    #[serde(default = "zero3")]
    pub rest_loc: Vec3,
    #[serde(default = "zero3")]
    pub pose_loc: Vec3,
    #[serde(default)]
    pub has_loc: bool,
    #[serde(default)]
    pub loc_enabled: bool,
    #[serde(default = "default_loc_radius")]
    pub loc_radius: f64,
    #[serde(default)]
    pub group_name: String,
    #[serde(default = "one3")]
    pub rest_sca: Vec3,
    #[serde(default = "one3")]
    pub pose_sca: Vec3,
    #[serde(default)]
    pub has_sca: bool,
    #[serde(default)]
    pub is_direct_channel: bool,
    #[serde(default = "default_channel_axis")]
    pub channel_axis: Axis,
    #[serde(default, with = "record_mode")]
    pub record_rot_channel_mode: TwistMode,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EntryRecord {
    pub fn from_entry(e: &SavedPoseEntry) -> Self {
        let mut extra = e.extra.clone();
        let mut stashed = INACTIVE_VECTOR_KEYS.map(|key| take_vector(&mut extra, key));
        let mut rec = EntryRecord {
            name: e.name.clone(),
            bone_name: e.joint.clone(),
            rest_rot: zero3(),
            pose_rot: zero3(),
            has_rot: false,
            rot_channel_mode: TwistMode::None,
            cone_enabled: false,
            cone_angle: DEFAULT_CONE_ANGLE,
            cone_axis: Axis::Z,
            rest_loc: zero3(),
            pose_loc: zero3(),
            has_loc: false,
            loc_enabled: false,
            loc_radius: DEFAULT_LOCATION_RADIUS,
            group_name: e.group_name.clone(),
            rest_sca: one3(),
            pose_sca: one3(),
            has_sca: false,
            is_direct_channel: false,
            channel_axis: Axis::X,
            record_rot_channel_mode: TwistMode::None,
            extra,
        };
        if e.rotation.reference().is_some() {
            stashed[0..2].fill(None);
        }
        if e.location.reference().is_some() {
            stashed[2..4].fill(None);
        }
        if matches!(e.scale, ScaleChannel::LinearProjection(_)) {
            stashed[4..6].fill(None);
        }
        let [rest_rot, pose_rot, rest_loc, pose_loc, rest_sca, pose_sca] = stashed;
        rec.rest_rot = rest_rot.unwrap_or(rec.rest_rot);
        rec.pose_rot = pose_rot.unwrap_or(rec.pose_rot);
        rec.rest_loc = rest_loc.unwrap_or(rec.rest_loc);
        rec.pose_loc = pose_loc.unwrap_or(rec.pose_loc);
        rec.rest_sca = rest_sca.unwrap_or(rec.rest_sca);
        rec.pose_sca = pose_sca.unwrap_or(rec.pose_sca);
        if let Some(r) = e.rotation.reference() {
            rec.has_rot = true;
            rec.rest_rot = r.rest;
            rec.pose_rot = r.pose;
        }
        match e.rotation {
            RotationChannel::ConeFalloff {
                angle_deg, axis, ..
            } => {
                rec.cone_enabled = true;
                rec.cone_angle = angle_deg;
                rec.cone_axis = axis;
            }
            RotationChannel::SwingTwist { twist_axis, .. } => {
                rec.rot_channel_mode = TwistMode::from_axis(Some(twist_axis));
            }
            RotationChannel::None | RotationChannel::LinearProjection(_) => {}
        }
        if let Some(r) = e.location.reference() {
            rec.has_loc = true;
            rec.rest_loc = r.rest;
            rec.pose_loc = r.pose;
        }
        if let LocationChannel::AxisFalloff { radius, .. } = e.location {
            rec.loc_enabled = true;
            rec.loc_radius = radius;
        }
        if let ScaleChannel::LinearProjection(r) = e.scale {
            rec.has_sca = true;
            rec.rest_sca = r.rest;
            rec.pose_sca = r.pose;
        }
        if let Some(axis) = e.direct.channel_axis() {
            rec.is_direct_channel = true;
            rec.channel_axis = axis;
            rec.record_rot_channel_mode = TwistMode::from_axis(e.direct.twist_axis());
        }
        rec
    }

    /// Build the typed entry. `fallback_joint` is used when the record carries
    /// no `bone_name` (e.g. the `saved_by_bone` group key).
    pub fn to_entry(&self, fallback_joint: &str) -> SavedPoseEntry {
        let joint = if self.bone_name.is_empty() {
            fallback_joint.to_string()
        } else {
            self.bone_name.clone()
        };
        let name = if self.name.is_empty() {
            FALLBACK_ENTRY_NAME.to_string()
        } else {
            self.name.clone()
        };
        let rot_ref = RestPose::new(self.rest_rot, self.pose_rot);
        let rotation = if !self.has_rot || self.is_direct_channel {
            RotationChannel::None
        } else if self.cone_enabled {
            RotationChannel::ConeFalloff {
                reference: rot_ref,
                angle_deg: self.cone_angle,
                axis: self.cone_axis,
            }
        } else if let Some(twist_axis) = self.rot_channel_mode.axis() {
            RotationChannel::SwingTwist {
                reference: rot_ref,
                twist_axis,
            }
        } else {
            RotationChannel::LinearProjection(rot_ref)
        };
        if self.has_rot && self.is_direct_channel {
            log::debug!("entry '{name}' on '{joint}' records a direct channel; rotation ignored");
        }
        let loc_ref = RestPose::new(self.rest_loc, self.pose_loc);
        let location = match (self.has_loc, self.loc_enabled) {
            (false, _) => LocationChannel::None,
            (true, true) => LocationChannel::AxisFalloff {
                reference: loc_ref,
                radius: self.loc_radius,
            },
            (true, false) => LocationChannel::LinearProjection(loc_ref),
        };
        let scale = if self.has_sca {
            ScaleChannel::LinearProjection(RestPose::new(self.rest_sca, self.pose_sca))
        } else {
            ScaleChannel::None
        };
        let direct = if self.is_direct_channel {
            DirectChannel::from_axes(self.channel_axis, self.record_rot_channel_mode.axis())
        } else {
            DirectChannel::None
        };
        let mut extra = self.extra.clone();
        if rotation == RotationChannel::None {
            stash_vector(&mut extra, "rest_rot", self.rest_rot, zero3());
            stash_vector(&mut extra, "pose_rot", self.pose_rot, zero3());
        }
        if location == LocationChannel::None {
            stash_vector(&mut extra, "rest_loc", self.rest_loc, zero3());
            stash_vector(&mut extra, "pose_loc", self.pose_loc, zero3());
        }
        if scale == ScaleChannel::None {
            stash_vector(&mut extra, "rest_sca", self.rest_sca, one3());
            stash_vector(&mut extra, "pose_sca", self.pose_sca, one3());
        }
        SavedPoseEntry {
            name,
            joint,
            group_name: self.group_name.clone(),
            rotation,
            location,
            scale,
            direct,
            extra,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub bone_pairs: Vec<String>,
    #[serde(default)]
    pub saved_by_bone: IndexMap<String, Vec<EntryRecord>>,
    #[serde(default)]
    pub orphan_saved_poses: Vec<EntryRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<TriggerEntry>,
}

/// Counts produced by [`merge_document`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub filters_added: usize,
    pub added: usize,
    pub skipped: usize,
    pub triggers_added: usize,
    pub triggers_skipped: usize,
}

impl ConfigDocument {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Every entry record with the joint it should attach to, in document order.
    pub fn records(&self) -> impl Iterator<Item = (&str, &EntryRecord)> {
        self.saved_by_bone
            .iter()
            .flat_map(|(joint, recs)| recs.iter().map(move |r| (joint.as_str(), r)))
            .chain(self.orphan_saved_poses.iter().map(|r| ("", r)))
    }
}

/// Snapshot one owner's library as a document.
pub fn export_document(library: &PoseLibrary) -> ConfigDocument {
    let mut doc = ConfigDocument {
        bone_pairs: library.filter.joints().to_vec(),
        triggers: library.triggers.clone(),
        ..Default::default()
    };
    for entry in &library.entries {
        let rec = EntryRecord::from_entry(entry);
        if library.filter.contains(&entry.joint) {
            doc.saved_by_bone
                .entry(entry.joint.clone())
                .or_default()
                .push(rec);
        } else {
            doc.orphan_saved_poses.push(rec);
        }
    }
    doc
}

/// Merge `doc` into `library`: union the joint filter, add entries and triggers,
/// and skip (never overwrite) anything whose identity already exists.
pub fn merge_document(library: &mut PoseLibrary, doc: &ConfigDocument) -> MergeReport {
    let mut report = MergeReport::default();
    for joint in &doc.bone_pairs {
        if library.filter.add(joint.as_str()) {
            report.filters_added += 1;
        }
    }
    for (group_joint, rec) in doc.records() {
        let entry = rec.to_entry(group_joint);
        let (joint, name) = (entry.joint.clone(), entry.name.clone());
        match library.insert(entry) {
            Ok(()) => report.added += 1,
            Err(err) => {
                log::debug!("config import skipped '{name}' on '{joint}': {err}");
                report.skipped += 1;
            }
        }
    }
    for trig in &doc.triggers {
        let mut t = trig.clone();
        t.last_weight = 0.0;
        match library.add_trigger(t) {
            Ok(_) => report.triggers_added += 1,
            Err(_) => report.triggers_skipped += 1,
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_entry_defaults() {
        let json = r#"{
            "bone_pairs": ["Elbow"],
            "saved_by_bone": {
                "Elbow": [ { "name": "bend", "bone_name": "Elbow",
                             "rest_rot": [0,0,0], "pose_rot": [90,0,0], "has_rot": true } ]
            }
        }"#;
        let doc = ConfigDocument::from_json_str(json).unwrap();
        let rec = &doc.saved_by_bone["Elbow"][0];
        assert_eq!(rec.cone_angle, 60.0);
        assert_eq!(rec.cone_axis, Axis::Z);
        assert_eq!(rec.loc_radius, 0.1);
        assert_eq!(rec.rest_sca, [1.0; 3]);
        assert_eq!(rec.channel_axis, Axis::X);
        let e = rec.to_entry("Elbow");
        assert_eq!(
            e.rotation,
            RotationChannel::LinearProjection(RestPose::new([0.0; 3], [90.0, 0.0, 0.0]))
        );
        assert_eq!(e.location, LocationChannel::None);
    }

    #[test]
    fn mode_strings_in_both_spellings() {
        let json = r#"{ "name": "r", "bone_name": "B", "has_rot": true,
                        "rot_channel_mode": "SWING_Y_TWIST",
                        "is_direct_channel": false,
                        "record_rot_channel_mode": "record_rot_SWING_Z_TWIST" }"#;
        let rec: EntryRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.rot_channel_mode, TwistMode::SwingY);
        assert_eq!(rec.record_rot_channel_mode, TwistMode::SwingZ);
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["rot_channel_mode"], "SWING_Y_TWIST");
        assert_eq!(v["record_rot_channel_mode"], "record_rot_SWING_Z_TWIST");
    }

    #[test]
    fn extra_fields_pass_through() {
        let json = r#"{ "name": "r", "bone_name": "B", "note": "keep me", "weight_hint": 3 }"#;
        let rec: EntryRecord = serde_json::from_str(json).unwrap();
        let e = rec.to_entry("");
        assert_eq!(e.extra["note"], "keep me");
        let back = serde_json::to_value(EntryRecord::from_entry(&e)).unwrap();
        assert_eq!(back["note"], "keep me");
        assert_eq!(back["weight_hint"], 3);
    }

    #[test]
    fn inactive_channel_vectors_survive_export() {
        let json = r#"{ "name": "r", "bone_name": "B",
                        "rest_rot": [1, 2, 3], "pose_rot": [0, 90, 0], "has_rot": false,
                        "pose_sca": [2, 1, 1], "has_sca": false,
                        "has_loc": true, "pose_loc": [0, 0.5, 0] }"#;
        let rec: EntryRecord = serde_json::from_str(json).unwrap();
        let e = rec.to_entry("");
        assert_eq!(e.rotation, RotationChannel::None);
        assert_eq!(e.scale, ScaleChannel::None);
        assert!(!e.extra.contains_key("pose_loc"));

        let back = EntryRecord::from_entry(&e);
        assert_eq!(back, rec);
        let v = serde_json::to_string(&back).unwrap();
        assert_eq!(v.matches("\"pose_rot\"").count(), 1);
        assert_eq!(v.matches("\"pose_sca\"").count(), 1);

        // an entry that gains an active channel drops the stashed copy
        let mut active = e.clone();
        active.rotation =
            RotationChannel::LinearProjection(RestPose::new([0.0; 3], [45.0, 0.0, 0.0]));
        let out = EntryRecord::from_entry(&active);
        assert!(out.has_rot);
        assert_eq!(out.pose_rot, [45.0, 0.0, 0.0]);
        assert!(!out.extra.contains_key("pose_rot"));
    }

    #[test]
    fn direct_record_wins_over_rotation() {
        let json = r#"{ "name": "record_Y", "bone_name": "B", "has_rot": true,
                        "is_direct_channel": true, "channel_axis": "Y",
                        "record_rot_channel_mode": "record_rot_SWING_X_TWIST" }"#;
        let rec: EntryRecord = serde_json::from_str(json).unwrap();
        let e = rec.to_entry("");
        assert_eq!(e.rotation, RotationChannel::None);
        assert_eq!(
            e.direct,
            DirectChannel::TwistPassthrough { twist_axis: Axis::X }
        );
    }

    #[test]
    fn group_key_fills_missing_joint_and_name() {
        let json = r#"{ "saved_by_bone": { "Knee": [ { "has_sca": true } ] } }"#;
        let doc = ConfigDocument::from_json_str(json).unwrap();
        let mut lib = PoseLibrary::new();
        let report = merge_document(&mut lib, &doc);
        assert_eq!(report.added, 1);
        assert!(lib.contains("Knee", "entry"));
    }

    #[test]
    fn merge_skips_duplicates_including_within_file() {
        let mut lib = PoseLibrary::new();
        lib.filter.add("Elbow");
        lib.insert(SavedPoseEntry::new("Elbow", "bend")).unwrap();
        let json = r#"{
            "bone_pairs": ["Elbow", "Knee"],
            "saved_by_bone": { "Elbow": [ { "name": "bend", "bone_name": "Elbow" },
                                          { "name": "twist", "bone_name": "Elbow" } ] },
            "orphan_saved_poses": [ { "name": "twist", "bone_name": "Elbow" },
                                    { "name": "lift", "bone_name": "Hip" } ]
        }"#;
        let doc = ConfigDocument::from_json_str(json).unwrap();
        let report = merge_document(&mut lib, &doc);
        assert_eq!(report.filters_added, 1);
        assert_eq!(report.added, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(lib.entries.len(), 3);
        assert_eq!(lib.filter.joints(), &["Elbow".to_string(), "Knee".to_string()]);
    }

    #[test]
    fn export_groups_by_filter() {
        let mut lib = PoseLibrary::new();
        lib.filter.add("Elbow");
        lib.insert(SavedPoseEntry::new("Elbow", "a")).unwrap();
        lib.insert(SavedPoseEntry::new("Hip", "b")).unwrap();
        let doc = export_document(&lib);
        assert_eq!(doc.saved_by_bone["Elbow"].len(), 1);
        assert_eq!(doc.orphan_saved_poses.len(), 1);
        assert_eq!(doc.orphan_saved_poses[0].bone_name, "Hip");
        let v = serde_json::to_value(&doc).unwrap();
        assert!(v.get("triggers").is_none());
    }
}
