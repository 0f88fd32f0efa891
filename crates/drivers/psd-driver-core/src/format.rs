//! Driver definition documents.
//!
//! Shape drivers are keyed by the shape key they write:
//!
//! ```json
//! { "Smile": { "Mesh_name": "Body", "expression": "max(a, b)",
//!              "variables": [ { "name": "a", "data_path": "[\"psd_rot_Jaw_open\"]" } ] } }
//! ```
//!
//! Pose drivers nest `joint -> constraint -> property` and name the skeleton they
//! belong to in `Armature_name`. A `data_path` is a JSON list whose first element
//! is the result key to read.
//!
//! Files are read entry by entry: one malformed entry is reported and skipped
//! while its siblings still load.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use psd_api_core::ResultKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::expr::ExprError;

#[derive(Debug, Error)]
pub enum DriverLoadError {
    #[error("failed to read driver file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse driver file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("driver '{target}' is malformed: {source}")]
    Entry {
        target: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("driver '{target}' variable '{variable}' has an unusable data_path {data_path:?}")]
    DataPath {
        target: String,
        variable: String,
        data_path: String,
    },
    #[error("driver '{target}' failed to compile: {source}")]
    Expression {
        target: String,
        #[source]
        source: ExprError,
    },
}

/// One named input of an expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableBinding {
    pub name: String,
    pub data_path: String,
}

impl VariableBinding {
    pub fn new(name: impl Into<String>, key: &ResultKey) -> Self {
        Self {
            name: name.into(),
            data_path: encode_data_path(key),
        }
    }

    pub fn result_key(&self) -> Option<ResultKey> {
        parse_data_path(&self.data_path)
    }
}

/// `["psd_rot_Jaw_open"]` -> `psd_rot_Jaw_open`. Anything else is `None`.
pub fn parse_data_path(data_path: &str) -> Option<ResultKey> {
    let list: Vec<Value> = serde_json::from_str(data_path).ok()?;
    match list.first()? {
        Value::String(s) => ResultKey::parse(s).ok(),
        _ => None,
    }
}

pub fn encode_data_path(key: &ResultKey) -> String {
    Value::Array(vec![Value::String(key.as_str().to_string())]).to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeDriverDef {
    #[serde(rename = "Mesh_name")]
    pub mesh: String,
    pub expression: String,
    #[serde(default)]
    pub variables: Vec<VariableBinding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseDriverDef {
    #[serde(rename = "Armature_name")]
    pub skeleton: String,
    pub expression: String,
    #[serde(default)]
    pub variables: Vec<VariableBinding>,
}

/// Address of one constraint property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoseTarget {
    pub joint: String,
    pub constraint: String,
    pub property: String,
}

impl PoseTarget {
    pub fn new(
        joint: impl Into<String>,
        constraint: impl Into<String>,
        property: impl Into<String>,
    ) -> Self {
        Self {
            joint: joint.into(),
            constraint: constraint.into(),
            property: property.into(),
        }
    }

}

/// `joint.constraint.property`, for messages only: names may contain dots.
impl fmt::Display for PoseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.joint, self.constraint, self.property)
    }
}

pub(crate) fn read_object(path: &Path) -> Result<IndexMap<String, Value>, DriverLoadError> {
    let text = fs::read_to_string(path).map_err(|source| DriverLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_object(&text, path)
}

pub(crate) fn parse_object(
    text: &str,
    origin: &Path,
) -> Result<IndexMap<String, Value>, DriverLoadError> {
    serde_json::from_str(text).map_err(|source| DriverLoadError::Json {
        path: origin.to_path_buf(),
        source,
    })
}

/// Split a shape driver document into per-entry results.
pub fn shape_entries(
    doc: IndexMap<String, Value>,
) -> Vec<(String, Result<ShapeDriverDef, DriverLoadError>)> {
    doc.into_iter()
        .map(|(target, raw)| {
            let parsed = serde_json::from_value(raw).map_err(|source| DriverLoadError::Entry {
                target: target.clone(),
                source,
            });
            (target, parsed)
        })
        .collect()
}

/// Flatten a pose driver document into per-property results. A joint or
/// constraint level that is not an object is reported under its partial path.
pub fn pose_entries(
    doc: IndexMap<String, Value>,
) -> Vec<(PoseTarget, Result<PoseDriverDef, DriverLoadError>)> {
    let mut out = Vec::new();
    for (joint, constraints) in doc {
        let constraints: IndexMap<String, IndexMap<String, Value>> =
            match serde_json::from_value(constraints) {
                Ok(c) => c,
                Err(source) => {
                    out.push((
                        PoseTarget::new(joint.clone(), "", ""),
                        Err(DriverLoadError::Entry {
                            target: joint,
                            source,
                        }),
                    ));
                    continue;
                }
            };
        for (constraint, properties) in constraints {
            for (property, raw) in properties {
                let target = PoseTarget::new(joint.clone(), constraint.clone(), property);
                let parsed =
                    serde_json::from_value(raw).map_err(|source| DriverLoadError::Entry {
                        target: target.to_string(),
                        source,
                    });
                out.push((target, parsed));
            }
        }
    }
    out
}
