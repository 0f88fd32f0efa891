//! Compiled drivers and their input-tuple cache.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;

use hashbrown::HashMap;
use indexmap::IndexMap;
use psd_api_core::{ResultKey, ResultLookup};

use crate::expr::{EvalError, Expr};
use crate::format::{DriverLoadError, VariableBinding};

/// Input values in dependency order. `None` marks a key with no stored value.
pub type InputTuple = Vec<Option<f64>>;

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledDriver {
    expr: Expr,
    /// Result key feeding each expression variable slot.
    slots: Vec<ResultKey>,
    /// Sorted, deduplicated slot keys.
    dependencies: Vec<ResultKey>,
}

impl CompiledDriver {
    /// Resolve bindings and compile `expression`. A later binding with the same
    /// name replaces an earlier one.
    pub fn compile(
        target: &str,
        expression: &str,
        variables: &[VariableBinding],
    ) -> Result<Self, DriverLoadError> {
        let mut names: Vec<String> = Vec::with_capacity(variables.len());
        let mut slots: Vec<ResultKey> = Vec::with_capacity(variables.len());
        for var in variables {
            let key = var.result_key().ok_or_else(|| DriverLoadError::DataPath {
                target: target.to_string(),
                variable: var.name.clone(),
                data_path: var.data_path.clone(),
            })?;
            match names.iter().position(|n| *n == var.name) {
                Some(i) => slots[i] = key,
                None => {
                    names.push(var.name.clone());
                    slots.push(key);
                }
            }
        }
        let expr =
            Expr::compile(expression, &names).map_err(|source| DriverLoadError::Expression {
                target: target.to_string(),
                source,
            })?;
        let mut dependencies = slots.clone();
        dependencies.sort();
        dependencies.dedup();
        Ok(Self {
            expr,
            slots,
            dependencies,
        })
    }

    pub fn expression(&self) -> &Expr {
        &self.expr
    }

    pub fn dependencies(&self) -> &[ResultKey] {
        &self.dependencies
    }

    pub fn inputs<L: ResultLookup + ?Sized>(&self, lookup: &L) -> InputTuple {
        self.dependencies.iter().map(|k| lookup.result(k)).collect()
    }

    /// Evaluate against `lookup`. Any unresolved input forces 0.0; a numeric
    /// failure is returned so the caller can report it.
    pub fn evaluate<L: ResultLookup + ?Sized>(&self, lookup: &L) -> Result<f64, EvalError> {
        let mut values = Vec::with_capacity(self.slots.len());
        for key in &self.slots {
            match lookup.result(key) {
                Some(v) => values.push(v),
                None => return Ok(0.0),
            }
        }
        self.expr.eval(&values)
    }
}

/// Last inputs and outputs per driver target, keyed by the target itself.
#[derive(Debug, Clone)]
pub struct DriverCache<K = String> {
    inputs: HashMap<K, InputTuple>,
    values: IndexMap<K, f64>,
}

impl<K> Default for DriverCache<K> {
    fn default() -> Self {
        Self {
            inputs: HashMap::new(),
            values: IndexMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone + fmt::Display> DriverCache<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute `target` when its inputs differ from the last evaluation.
    /// Returns true when it was recomputed. `finish` maps the raw result to the
    /// stored value; failures store 0.0.
    pub fn refresh<L, F>(
        &mut self,
        target: &K,
        driver: &CompiledDriver,
        lookup: &L,
        finish: F,
    ) -> bool
    where
        L: ResultLookup + ?Sized,
        F: Fn(f64) -> f64,
    {
        let current = driver.inputs(lookup);
        if self.inputs.get(target) == Some(&current) {
            return false;
        }
        let value = match driver.evaluate(lookup) {
            Ok(v) => finish(v),
            Err(err) => {
                log::warn!("driver '{target}' evaluation failed: {err}");
                0.0
            }
        };
        self.values.insert(target.clone(), value);
        self.inputs.insert(target.clone(), current);
        true
    }

    pub fn value<Q>(&self, target: &Q) -> Option<f64>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.values.get(target).copied()
    }

    pub fn values(&self) -> &IndexMap<K, f64> {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn forget<Q>(&mut self, target: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inputs.remove(target);
        self.values.shift_remove(target);
    }

    pub fn clear(&mut self) {
        self.inputs.clear();
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> ResultKey {
        ResultKey::parse(s).unwrap()
    }

    fn store(pairs: &[(&str, f64)]) -> HashMap<ResultKey, f64> {
        pairs.iter().map(|(k, v)| (key(k), *v)).collect()
    }

    #[test]
    fn dependencies_are_sorted_and_unique() {
        let d = CompiledDriver::compile(
            "t",
            "a + b + c",
            &[
                VariableBinding::new("a", &key("psd_rot_B_x")),
                VariableBinding::new("b", &key("psd_rot_A_x")),
                VariableBinding::new("c", &key("psd_rot_B_x")),
            ],
        )
        .unwrap();
        let deps: Vec<_> = d.dependencies().iter().map(|k| k.as_str()).collect();
        assert_eq!(deps, vec!["psd_rot_A_x", "psd_rot_B_x"]);
        let s = store(&[("psd_rot_A_x", 0.25), ("psd_rot_B_x", 0.5)]);
        assert_eq!(d.evaluate(&s).unwrap(), 1.25);
    }

    #[test]
    fn duplicate_name_last_binding_wins() {
        let d = CompiledDriver::compile(
            "t",
            "a",
            &[
                VariableBinding::new("a", &key("psd_rot_A_x")),
                VariableBinding::new("a", &key("psd_rot_B_x")),
            ],
        )
        .unwrap();
        let s = store(&[("psd_rot_A_x", 0.25), ("psd_rot_B_x", 0.5)]);
        assert_eq!(d.evaluate(&s).unwrap(), 0.5);
    }

    #[test]
    fn malformed_path_rejects_entry() {
        let bad = VariableBinding {
            name: "a".into(),
            data_path: "psd_rot_A_x".into(),
        };
        let err = CompiledDriver::compile("t", "a", &[bad]).unwrap_err();
        assert!(matches!(err, DriverLoadError::DataPath { .. }));
    }

    #[test]
    fn missing_input_forces_zero() {
        let d = CompiledDriver::compile(
            "t",
            "1 - a",
            &[VariableBinding::new("a", &key("psd_rot_A_x"))],
        )
        .unwrap();
        assert_eq!(d.evaluate(&store(&[])).unwrap(), 0.0);
        assert_eq!(d.inputs(&store(&[])), vec![None]);
    }

    #[test]
    fn cache_skips_unchanged_inputs() {
        let d = CompiledDriver::compile(
            "t",
            "a * 2",
            &[VariableBinding::new("a", &key("psd_rot_A_x"))],
        )
        .unwrap();
        let mut cache = DriverCache::<String>::new();
        let mut s = store(&[("psd_rot_A_x", 0.25)]);
        assert!(cache.refresh(&"t".to_string(), &d, &s, |v| v));
        assert!(!cache.refresh(&"t".to_string(), &d, &s, |v| v));
        assert_eq!(cache.value("t"), Some(0.5));
        s.insert(key("psd_rot_A_x"), 0.75);
        assert!(cache.refresh(&"t".to_string(), &d, &s, |v| v.clamp(0.0, 1.0)));
        assert_eq!(cache.value("t"), Some(1.0));
        cache.forget("t");
        assert!(cache.value("t").is_none());
    }

    #[test]
    fn evaluation_error_stores_zero() {
        let d = CompiledDriver::compile(
            "t",
            "1 / a",
            &[VariableBinding::new("a", &key("psd_rot_A_x"))],
        )
        .unwrap();
        let mut cache = DriverCache::<String>::new();
        assert!(cache.refresh(&"t".to_string(), &d, &store(&[("psd_rot_A_x", 0.0)]), |v| v));
        assert_eq!(cache.value("t"), Some(0.0));
    }
}
