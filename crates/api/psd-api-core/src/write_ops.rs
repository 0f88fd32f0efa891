//! Weight writes produced by one compute pass.
//!
//! WriteOp serializes to JSON as:
//!   { "key": "psd_rot_Spine_twist", "value": 0.5 }
//!
//! WriteBatch is a simple Vec<WriteOp> with helpers.

use crate::result_key::ResultKey;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteOp {
    pub key: ResultKey,
    pub value: f64,
}

impl WriteOp {
    pub fn new(key: ResultKey, value: f64) -> Self {
        Self { key, value }
    }
}

/// A batch of weight writes. The engine emits one WriteBatch per owner per pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteBatch(pub Vec<WriteOp>);

impl WriteBatch {
    pub fn new() -> Self {
        WriteBatch(Vec::new())
    }

    pub fn push(&mut self, op: WriteOp) {
        self.0.push(op);
    }

    pub fn extend(&mut self, other: impl IntoIterator<Item = WriteOp>) {
        self.0.extend(other);
    }

    pub fn into_vec(self) -> Vec<WriteOp> {
        self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &WriteOp> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge another batch in-place (append). Later ops win when applied.
    pub fn append(&mut self, mut other: WriteBatch) {
        self.0.append(&mut other.0)
    }

    /// Value of the last op targeting `key`, if any.
    pub fn get(&self, key: &ResultKey) -> Option<f64> {
        self.0.iter().rev().find(|op| &op.key == key).map(|op| op.value)
    }
}

impl FromIterator<WriteOp> for WriteBatch {
    fn from_iter<I: IntoIterator<Item = WriteOp>>(iter: I) -> Self {
        WriteBatch(iter.into_iter().collect())
    }
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ key: {}, value: {} }}", self.key, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result_key::ResultKind;

    #[test]
    fn writeop_json_shape() {
        let op = WriteOp::new(
            ResultKey::for_entry(ResultKind::Rotation, "Spine", "twist"),
            0.5,
        );
        let v = serde_json::to_value(&op).unwrap();
        assert_eq!(v["key"], "psd_rot_Spine_twist");
        assert_eq!(v["value"], 0.5);
    }

    #[test]
    fn later_ops_win_in_get() {
        let key = ResultKey::for_trigger("Hand", "touch");
        let mut b = WriteBatch::new();
        b.push(WriteOp::new(key.clone(), 0.25));
        let mut other = WriteBatch::new();
        other.push(WriteOp::new(key.clone(), 0.75));
        b.append(other);
        assert_eq!(b.len(), 2);
        assert_eq!(b.get(&key), Some(0.75));
        assert_eq!(
            b.get(&ResultKey::for_trigger("Hand", "other")),
            None
        );
        assert_eq!(format!("{}", b.0[0]), "{ key: psd_loc_Hand_touch_w, value: 0.25 }");
    }
}
