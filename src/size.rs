//! Size Estimation Module
//!
//! Measures how many bytes a value accounts for against the cache capacity.
//! A value is measured once, when its leaf is created or replaced.

use serde::Serialize;

use crate::error::Result;

// == Size Estimator ==
/// Approximates the byte size of a stored value.
pub trait SizeEstimator<V> {
    /// Returns the approximate size of `value` in bytes.
    fn estimate(&self, value: &V) -> Result<usize>;
}

/// Plain functions and closures are infallible estimators.
impl<V, F> SizeEstimator<V> for F
where
    F: Fn(&V) -> usize,
{
    fn estimate(&self, value: &V) -> Result<usize> {
        Ok(self(value))
    }
}

// == JSON Size ==
/// Default estimator: the length of the value's compact JSON encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSize;

impl<V: Serialize> SizeEstimator<V> for JsonSize {
    fn estimate(&self, value: &V) -> Result<usize> {
        Ok(serde_json::to_vec(value)?.len())
    }
}
