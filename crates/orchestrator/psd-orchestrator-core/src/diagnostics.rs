//! Bounded history of pass reports, with optional per-entry timing.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::pass::PassReport;

/// Controls per-entry timing capture and how many pass reports are retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsCfg {
    pub enabled: bool,
    pub history_len: usize,
}

impl Default for DiagnosticsCfg {
    fn default() -> Self {
        DiagnosticsCfg {
            enabled: false,
            history_len: 10,
        }
    }
}

/// Bounded history of recent pass reports. Only filled while enabled.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    history: VecDeque<PassReport>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, cfg: &DiagnosticsCfg, report: &PassReport) {
        if !cfg.enabled || cfg.history_len == 0 {
            return;
        }
        while self.history.len() >= cfg.history_len {
            self.history.pop_front();
        }
        self.history.push_back(report.clone());
    }

    /// Oldest first.
    pub fn history(&self) -> impl Iterator<Item = &PassReport> {
        self.history.iter()
    }

    pub fn last(&self) -> Option<&PassReport> {
        self.history.back()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Mean total pass time over the retained history, in milliseconds.
    pub fn mean_total_ms(&self) -> Option<f64> {
        let totals: Vec<f64> = self
            .history
            .iter()
            .filter_map(|r| r.timings_ms.get("total_ms").copied())
            .collect();
        if totals.is_empty() {
            return None;
        }
        Some(totals.iter().sum::<f64>() / totals.len() as f64)
    }
}
