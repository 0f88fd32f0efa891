//! ResultKey composition and parsing.
//!
//! Grammar:
//!   <prefix><joint>_<entry>          rotation / location / scale weights
//!   psd_loc_<target>_<trigger>_w     proximity trigger weights
//!
//! Segments are sanitized: trimmed, whitespace runs collapsed to `_`, and every
//! character outside `[0-9A-Za-z_-]` replaced by `_`.
//!   ("upper arm", "bend 90")   -> rotation "psd_rot_upper_arm_bend_90.3f0a..."
//!   ("Spine", "twist")         -> rotation "psd_rot_Spine_twist"
//!
//! Keys whose plain form could be produced by a different triple carry a
//! `.` + 8 hex digit suffix derived from the raw names. Sanitized segments never
//! contain `.`, so suffixed keys cannot meet a plain key. A plain key is emitted
//! when every segment survives sanitization unchanged, the joint segment has no
//! `_`, and (for location weights) the entry segment does not end in `_w`.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const ROTATION_PREFIX: &str = "psd_rot_";
pub const LOCATION_PREFIX: &str = "psd_loc_";
pub const SCALE_PREFIX: &str = "psd_sca_";
pub const TRIGGER_SUFFIX: &str = "_w";

const DIGEST_HEX_LEN: usize = 8;

/// Which quantity a stored weight was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Rotation,
    Location,
    Scale,
    Trigger,
}

impl ResultKind {
    pub fn prefix(self) -> &'static str {
        match self {
            ResultKind::Rotation => ROTATION_PREFIX,
            ResultKind::Location | ResultKind::Trigger => LOCATION_PREFIX,
            ResultKind::Scale => SCALE_PREFIX,
        }
    }

    /// Kinds produced by saved entries, in the order keys are purged.
    pub const ENTRY_KINDS: [ResultKind; 3] =
        [ResultKind::Rotation, ResultKind::Location, ResultKind::Scale];

    fn tag(self) -> u8 {
        match self {
            ResultKind::Rotation => 0,
            ResultKind::Location => 1,
            ResultKind::Scale => 2,
            ResultKind::Trigger => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("result key is empty")]
    Empty,
    #[error("result key contains whitespace: {0:?}")]
    Whitespace(String),
}

/// Sanitize one name segment for use inside a key.
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_space = false;
    for ch in name.trim().chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    out
}

/// Stable string identifier of one computed weight.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResultKey(String);

impl ResultKey {
    /// Key of a saved entry's weight for one channel.
    pub fn for_entry(kind: ResultKind, joint: &str, entry: &str) -> Self {
        let joint_seg = sanitize(joint);
        let entry_seg = sanitize(entry);
        let mut key = format!("{}{}_{}", kind.prefix(), joint_seg, entry_seg);
        let ambiguous = joint_seg != joint
            || entry_seg != entry
            || joint_seg.contains('_')
            || (kind == ResultKind::Location && entry_seg.ends_with(TRIGGER_SUFFIX));
        if ambiguous {
            push_digest(&mut key, kind, joint, entry);
        }
        ResultKey(key)
    }

    /// Key of a proximity trigger's weight, named after its target joint.
    pub fn for_trigger(target_joint: &str, trigger: &str) -> Self {
        let joint_seg = sanitize(target_joint);
        let name_seg = sanitize(trigger);
        let mut key = format!(
            "{}{}_{}{}",
            LOCATION_PREFIX, joint_seg, name_seg, TRIGGER_SUFFIX
        );
        if joint_seg != target_joint || name_seg != trigger || joint_seg.contains('_') {
            push_digest(&mut key, ResultKind::Trigger, target_joint, trigger);
        }
        ResultKey(key)
    }

    /// Accept an already composed key, e.g. one referenced by a driver file.
    pub fn parse(s: &str) -> Result<Self, KeyError> {
        if s.is_empty() {
            return Err(KeyError::Empty);
        }
        if s.chars().any(char::is_whitespace) {
            return Err(KeyError::Whitespace(s.to_string()));
        }
        Ok(ResultKey(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the key carries a disambiguation suffix.
    pub fn is_disambiguated(&self) -> bool {
        self.0.contains('.')
    }
}

fn push_digest(key: &mut String, kind: ResultKind, joint: &str, entry: &str) {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[kind.tag()]);
    hasher.update(&(joint.len() as u64).to_le_bytes());
    hasher.update(joint.as_bytes());
    hasher.update(&(entry.len() as u64).to_le_bytes());
    hasher.update(entry.as_bytes());
    let hex = hasher.finalize().to_hex();
    key.push('.');
    key.push_str(&hex.as_str()[..DIGEST_HEX_LEN]);
}

impl fmt::Display for ResultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResultKey {
    type Err = KeyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResultKey::parse(s)
    }
}

impl AsRef<str> for ResultKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Serialized as the bare key string.
impl Serialize for ResultKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ResultKey {
    fn deserialize<D>(deserializer: D) -> Result<ResultKey, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ResultKey::parse(&s).map_err(de::Error::custom)
    }
}
