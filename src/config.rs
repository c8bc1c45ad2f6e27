//! Configuration Module
//!
//! Cache construction options: a plain [`CacheConfig`] that can be loaded
//! from environment variables or deserialized from an application config
//! file, and the [`CacheBuilder`] that turns it into a cache.

use std::env;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::{CompoundCache, Evicted, Key, PrunePolicy, PrunedCallback};
use crate::capacity::Capacity;
use crate::clock::{Clock, SystemClock};
use crate::error::{CacheError, Result};
use crate::size::SizeEstimator;

/// Cache configuration parameters.
///
/// Missing fields take their defaults, so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Byte budget as an integer or an expression like `"64MiB"`
    pub capacity: Option<Capacity>,
    /// Prune automatically after writes
    pub auto_prune: bool,
    /// Minimum milliseconds between automatic prune runs
    pub auto_prune_interval_ms: Option<u64>,
    /// Key depth treated as one eviction unit
    pub prune_depth: Option<usize>,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `COMPOUND_CACHE_CAPACITY` - Byte budget, e.g. `2MB` (default: unbounded)
    /// - `COMPOUND_CACHE_AUTO_PRUNE` - `true`/`false` (default: true)
    /// - `COMPOUND_CACHE_AUTO_PRUNE_INTERVAL_MS` - Debounce in ms (default: none)
    /// - `COMPOUND_CACHE_PRUNE_DEPTH` - Eviction depth (default: leaf level)
    ///
    /// The capacity is kept as written and validated by [`CacheBuilder::build`].
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            capacity: env::var("COMPOUND_CACHE_CAPACITY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(Capacity::Expr),
            auto_prune: env::var("COMPOUND_CACHE_AUTO_PRUNE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.auto_prune),
            auto_prune_interval_ms: env::var("COMPOUND_CACHE_AUTO_PRUNE_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok()),
            prune_depth: env::var("COMPOUND_CACHE_PRUNE_DEPTH")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    // == Resolve ==
    /// Validates the config and converts it into a prune policy.
    pub fn resolve(&self) -> Result<PrunePolicy> {
        let capacity = match &self.capacity {
            Some(capacity) => {
                let bytes = capacity.to_bytes()?;
                let bytes = usize::try_from(bytes)
                    .map_err(|_| CacheError::InvalidCapacity(capacity.to_string()))?;
                Some(bytes)
            }
            None => None,
        };

        if self.prune_depth == Some(0) {
            return Err(CacheError::InvalidConfig(
                "prune_depth must be at least 1".to_string(),
            ));
        }

        Ok(PrunePolicy {
            capacity,
            auto_prune: self.auto_prune,
            auto_prune_interval: self.auto_prune_interval_ms.map(Duration::from_millis),
            prune_depth: self.prune_depth,
        })
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: None,
            auto_prune: true,
            auto_prune_interval_ms: None,
            prune_depth: None,
        }
    }
}

// == Cache Builder ==
/// Step-by-step construction of a [`CompoundCache`].
///
/// ```
/// use compound_cache::{key, CompoundCache};
///
/// let mut cache = CompoundCache::builder()
///     .capacity("2kB")
///     .prune_depth(1)
///     .values([(key!["tenant", 1], "a".to_string())])
///     .build()
///     .unwrap();
///
/// assert_eq!(cache.capacity(), Some(2000));
/// assert_eq!(cache.get(&key!["tenant", 1]), Some(&"a".to_string()));
/// ```
pub struct CacheBuilder<V> {
    config: CacheConfig,
    values: Vec<(Key, V)>,
    pruned: Option<PrunedCallback<V>>,
    estimator: Box<dyn SizeEstimator<V>>,
    clock: Box<dyn Clock>,
}

impl<V> CacheBuilder<V> {
    pub(crate) fn new(estimator: Box<dyn SizeEstimator<V>>) -> Self {
        Self {
            config: CacheConfig::default(),
            values: Vec::new(),
            pruned: None,
            estimator,
            clock: Box::new(SystemClock),
        }
    }

    /// Replaces all policy options at once.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn capacity(mut self, capacity: impl Into<Capacity>) -> Self {
        self.config.capacity = Some(capacity.into());
        self
    }

    pub fn auto_prune(mut self, enabled: bool) -> Self {
        self.config.auto_prune = enabled;
        self
    }

    pub fn auto_prune_interval(mut self, interval: Duration) -> Self {
        self.config.auto_prune_interval_ms = Some(interval.as_millis() as u64);
        self
    }

    pub fn prune_depth(mut self, depth: usize) -> Self {
        self.config.prune_depth = Some(depth);
        self
    }

    /// Entries stored at construction, replacing in order.
    pub fn values<I, K>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
    {
        self.values
            .extend(values.into_iter().map(|(key, value)| (key.into(), value)));
        self
    }

    /// Called once per prune run with everything it evicted.
    pub fn pruned(mut self, callback: impl FnMut(Vec<Evicted<V>>) + 'static) -> Self {
        self.pruned = Some(Box::new(callback));
        self
    }

    pub fn estimator(mut self, estimator: impl SizeEstimator<V> + 'static) -> Self {
        self.estimator = Box::new(estimator);
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    // == Build ==
    /// Validates the options and creates the cache, storing any initial
    /// values.
    ///
    /// # Errors
    /// - `InvalidCapacity` for a capacity expression that does not parse
    /// - `InvalidConfig` for `prune_depth(0)`
    /// - Any error from storing the initial values
    pub fn build(self) -> Result<CompoundCache<V>> {
        let policy = self.config.resolve()?;
        let mut cache = CompoundCache::from_parts(policy, self.pruned, self.estimator, self.clock);
        if !self.values.is_empty() {
            cache.insert_many(self.values, true)?;
        }
        Ok(cache)
    }
}
