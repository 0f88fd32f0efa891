//! Read access to stored weights.

use crate::result_key::ResultKey;

/// Anything that can answer "what is the current value under this key".
pub trait ResultLookup {
    fn result(&self, key: &ResultKey) -> Option<f64>;

    /// Value under `key`, or 0.0 when absent.
    fn result_or_zero(&self, key: &ResultKey) -> f64 {
        self.result(key).unwrap_or(0.0)
    }
}

impl<S: std::hash::BuildHasher> ResultLookup for hashbrown::HashMap<ResultKey, f64, S> {
    fn result(&self, key: &ResultKey) -> Option<f64> {
        self.get(key).copied()
    }
}

impl<S: std::hash::BuildHasher> ResultLookup for indexmap::IndexMap<ResultKey, f64, S> {
    fn result(&self, key: &ResultKey) -> Option<f64> {
        self.get(key).copied()
    }
}

impl<T: ResultLookup + ?Sized> ResultLookup for &T {
    fn result(&self, key: &ResultKey) -> Option<f64> {
        (**self).result(key)
    }
}
