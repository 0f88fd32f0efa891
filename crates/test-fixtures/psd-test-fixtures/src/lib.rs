//! Shared JSON fixtures for tests and benches, resolved through
//! `fixtures/manifest.json` at the workspace root.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    configs: HashMap<String, String>,
    #[serde(rename = "shape-drivers")]
    shape_drivers: HashMap<String, String>,
    #[serde(rename = "pose-drivers")]
    pose_drivers: HashMap<String, String>,
    engines: HashMap<String, String>,
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn resolve_path(rel: &str) -> PathBuf {
    fixtures_root().join(rel)
}

fn read_to_string(rel: &str) -> Result<String> {
    let path = resolve_path(rel);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))
}

fn load_json<T: DeserializeOwned>(rel: &str) -> Result<T> {
    let text = read_to_string(rel)?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse JSON fixture {rel}"))
}

fn lookup<'a>(map: &'a HashMap<String, String>, kind: &str, name: &str) -> Result<&'a str> {
    map.get(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

macro_rules! fixture_group {
    ($module:ident, $field:ident, $kind:literal) => {
        pub mod $module {
            use super::*;

            pub fn keys() -> Vec<String> {
                let mut keys: Vec<String> = MANIFEST.$field.keys().cloned().collect();
                keys.sort();
                keys
            }

            pub fn json(name: &str) -> Result<String> {
                read_to_string(lookup(&MANIFEST.$field, $kind, name)?)
            }

            pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
                load_json(lookup(&MANIFEST.$field, $kind, name)?)
            }

            pub fn path(name: &str) -> Result<PathBuf> {
                Ok(resolve_path(lookup(&MANIFEST.$field, $kind, name)?))
            }
        }
    };
}

fixture_group!(configs, configs, "config");
fixture_group!(shape_drivers, shape_drivers, "shape driver");
fixture_group!(pose_drivers, pose_drivers, "pose driver");
fixture_group!(engines, engines, "engine config");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_manifest_entry_resolves() {
        for name in configs::keys() {
            assert!(configs::path(&name).unwrap().exists(), "config {name}");
            let _: serde_json::Value = configs::load(&name).unwrap();
        }
        for name in shape_drivers::keys() {
            let _: serde_json::Value = shape_drivers::load(&name).unwrap();
        }
        for name in pose_drivers::keys() {
            let _: serde_json::Value = pose_drivers::load(&name).unwrap();
        }
        for name in engines::keys() {
            let _: serde_json::Value = engines::load(&name).unwrap();
        }
    }

    #[test]
    fn unknown_fixture_is_an_error() {
        let err = configs::json("nope").unwrap_err();
        assert!(err.to_string().contains("unknown config fixture 'nope'"));
    }
}
