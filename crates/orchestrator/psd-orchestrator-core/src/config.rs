//! Engine configuration.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::diagnostics::DiagnosticsCfg;
use crate::scheduler::ScheduleMode;

pub const MIN_IDLE_HZ: f64 = 1.0;
pub const MAX_IDLE_HZ: f64 = 240.0;

/// Where computed weights go after the in-memory store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistMode {
    /// Never touch the host's property containers.
    MemoryOnly,
    /// One bulk flush per owner at the end of each pass.
    #[default]
    FlushAfterPass,
    /// Each changed key is written as soon as it is stored.
    WriteThrough,
}

/// Runtime configuration for [`crate::PsdEngine`]. Every field has a default so
/// partial JSON documents load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mode: ScheduleMode,
    /// Idle recompute frequency. Clamped to [1, 240] when used.
    pub idle_hz: f64,
    pub persist: PersistMode,
    /// Minimum change before the in-memory store takes a new value.
    pub cache_write_epsilon: f64,
    /// Minimum change before a bulk flush rewrites a persisted key.
    pub flush_epsilon: f64,
    /// Minimum change before a write-through rewrites a persisted key.
    pub direct_write_epsilon: f64,
    /// Per-component tolerance of the change-detection cache.
    pub change_epsilon: f64,
    /// Decimal digits samples are rounded to before comparison.
    pub round_digits: u32,
    /// Minimum change before a driver output is pushed to its target.
    pub driver_apply_epsilon: f64,
    pub diagnostics: DiagnosticsCfg,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: ScheduleMode::Auto,
            idle_hz: 10.0,
            persist: PersistMode::FlushAfterPass,
            cache_write_epsilon: 1e-3,
            flush_epsilon: 1e-3,
            direct_write_epsilon: 1e-6,
            change_epsilon: 1e-5,
            round_digits: 6,
            driver_apply_epsilon: 1e-3,
            diagnostics: DiagnosticsCfg::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config {}", path.display()))?;
        Self::from_json_str(&text)
            .with_context(|| format!("failed to parse engine config {}", path.display()))
    }

    pub fn clamped_idle_hz(&self) -> f64 {
        clamp_hz(self.idle_hz)
    }
}

/// Clamp a frequency to the supported idle range; non-finite input falls back
/// to the minimum.
pub fn clamp_hz(hz: f64) -> f64 {
    if hz.is_finite() {
        hz.clamp(MIN_IDLE_HZ, MAX_IDLE_HZ)
    } else {
        MIN_IDLE_HZ
    }
}
