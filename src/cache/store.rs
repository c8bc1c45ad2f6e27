//! Cache Store Module
//!
//! The trie engine: owns the root branch and implements lookups, writes,
//! deletes and iteration over compound keys.

use std::fmt;

use serde::Serialize;
use tracing::trace;

use crate::cache::iter::{Entries, Keys, Nodes, Values};
use crate::cache::key::{display_key, KeyPart};
use crate::cache::node::{Branch, Node, PathConflict};
use crate::cache::partial::PartialView;
use crate::cache::prune::{PrunePolicy, PrunedCallback};
use crate::cache::CacheStats;
use crate::clock::{Clock, SystemClock, Timestamp};
use crate::config::CacheBuilder;
use crate::error::{CacheError, Result};
use crate::size::{JsonSize, SizeEstimator};

// == Compound Cache ==
/// In-process cache keyed by compound keys, with aggregate size accounting
/// and LRU pruning against a byte capacity.
///
/// Keys are slices of [`KeyPart`]; use the [`key!`](crate::key) macro to
/// build them. Every branch of the trie knows the total size and number of
/// the values below it, so sizes and counts of whole prefixes are O(depth).
pub struct CompoundCache<V> {
    pub(crate) root: Branch<V>,
    pub(crate) policy: PrunePolicy,
    /// Start of the most recent prune run
    pub(crate) last_prune: Option<Timestamp>,
    pub(crate) pruned: Option<PrunedCallback<V>>,
    pub(crate) estimator: Box<dyn SizeEstimator<V>>,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) stats: CacheStats,
}

impl<V: Serialize> CompoundCache<V> {
    // == Constructor ==
    /// Creates an unbounded cache measuring values by their JSON size.
    pub fn new() -> Self {
        Self::with_estimator(JsonSize)
    }

    /// Starts a builder measuring values by their JSON size.
    pub fn builder() -> CacheBuilder<V> {
        CacheBuilder::new(Box::new(JsonSize))
    }
}

impl<V: Serialize> Default for CompoundCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> CompoundCache<V> {
    /// Creates an unbounded cache with a custom size estimator.
    pub fn with_estimator(estimator: impl SizeEstimator<V> + 'static) -> Self {
        Self::from_parts(
            PrunePolicy::default(),
            None,
            Box::new(estimator),
            Box::new(SystemClock),
        )
    }

    /// Starts a builder with a custom size estimator.
    pub fn builder_with_estimator(estimator: impl SizeEstimator<V> + 'static) -> CacheBuilder<V> {
        CacheBuilder::new(Box::new(estimator))
    }

    pub(crate) fn from_parts(
        policy: PrunePolicy,
        pruned: Option<PrunedCallback<V>>,
        estimator: Box<dyn SizeEstimator<V>>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let root = Branch::new(clock.now());
        Self {
            root,
            policy,
            last_prune: None,
            pruned,
            estimator,
            clock,
            stats: CacheStats::new(),
        }
    }

    // == Get ==
    /// Returns the value at `key`, stamping it and every ancestor as
    /// accessed now.
    pub fn get(&mut self, key: &[KeyPart]) -> Option<&V> {
        self.get_with(key, true)
    }

    /// Returns the value at `key`, refreshing access times only if `touch`.
    ///
    /// Touching reads count towards the hit/miss statistics.
    pub fn get_with(&mut self, key: &[KeyPart], touch: bool) -> Option<&V> {
        if !touch {
            return self.peek(key);
        }
        if key.is_empty() {
            return None;
        }
        let now = self.clock.now();
        match self.root.find_touch(key, now) {
            Some(Node::Leaf(leaf)) => {
                self.stats.record_hit();
                Some(leaf.value())
            }
            _ => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Peek ==
    /// Returns the value at `key` without touching access times.
    pub fn peek(&self, key: &[KeyPart]) -> Option<&V> {
        match self.root.find(key)? {
            Node::Leaf(leaf) => Some(leaf.value()),
            Node::Branch(_) => None,
        }
    }

    // == Size Of ==
    /// Size of the value at `key`, or total size below a prefix.
    pub fn size_of(&self, key: &[KeyPart]) -> Option<usize> {
        self.root.find(key).map(Node::size)
    }

    // == Access Time ==
    /// Last access time of the value or branch at `key`.
    pub fn atime(&self, key: &[KeyPart]) -> Option<Timestamp> {
        self.root.find(key).map(Node::atime)
    }

    /// Number of values stored.
    pub fn count(&self) -> usize {
        self.root.count()
    }

    /// Total size of all values, in bytes.
    pub fn size(&self) -> usize {
        self.root.size()
    }

    pub fn is_empty(&self) -> bool {
        self.root.count() == 0
    }

    /// Configured byte budget.
    pub fn capacity(&self) -> Option<usize> {
        self.policy.capacity
    }

    pub fn policy(&self) -> &PrunePolicy {
        &self.policy
    }

    // == Insert ==
    /// Stores `value` at `key`, replacing any existing value.
    ///
    /// Shorthand for [`insert_one`](Self::insert_one) with `replace = true`.
    pub fn insert(&mut self, key: &[KeyPart], value: V) -> Result<Option<usize>> {
        self.insert_one(key, value, true)
    }

    /// Stores `value` at `key`, creating intermediate branches as needed.
    ///
    /// Returns the measured size of the new value, or `None` when nothing
    /// was written: the key is empty, or a value exists and `replace` is
    /// false. The capacity check runs afterwards if bytes changed.
    ///
    /// # Errors
    /// - `KeyConflict` if the path runs through a stored value or ends on
    ///   a branch
    /// - `SizeEstimate` if the estimator cannot measure `value`
    pub fn insert_one(
        &mut self,
        key: &[KeyPart],
        value: V,
        replace: bool,
    ) -> Result<Option<usize>> {
        let written = self.insert_entry(key, value, replace)?;
        if written.is_some() {
            self.auto_prune();
        }
        Ok(written)
    }

    /// Stores every entry, running the capacity check once at the end.
    ///
    /// Returns the total size written. The first error stops the batch;
    /// entries before it stay stored.
    pub fn insert_many<I, K>(&mut self, entries: I, replace: bool) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<[KeyPart]>,
    {
        let mut total = 0;
        let mut written_any = false;
        let mut outcome = Ok(());

        for (key, value) in entries {
            match self.insert_entry(key.as_ref(), value, replace) {
                Ok(Some(size)) => {
                    total += size;
                    written_any = true;
                }
                Ok(None) => {}
                Err(err) => {
                    outcome = Err(err);
                    break;
                }
            }
        }

        if written_any {
            self.auto_prune();
        }
        outcome.map(|()| total)
    }

    /// Writes one entry without the capacity check.
    fn insert_entry(&mut self, key: &[KeyPart], value: V, replace: bool) -> Result<Option<usize>> {
        let Some((head, rest)) = key.split_first() else {
            return Ok(None);
        };
        if !replace && self.root.has_leaf(key) {
            return Ok(None);
        }

        let size = self.estimator.estimate(&value)?;
        let now = self.clock.now();
        self.root
            .insert(head, rest, value, size, now)
            .map_err(|PathConflict| {
                let key = display_key(key);
                trace!(key = %key, "Insert rejected: path conflict");
                CacheError::KeyConflict(key)
            })?;
        Ok(Some(size))
    }

    // == Ensure ==
    /// Returns the value at `key`, storing `value` there first if there is
    /// none. Lookup does not touch access times.
    pub fn ensure(&mut self, key: &[KeyPart], value: V) -> Result<V>
    where
        V: Clone,
    {
        if let Some(existing) = self.peek(key) {
            return Ok(existing.clone());
        }
        self.insert_one(key, value.clone(), false)?;
        Ok(value)
    }

    // == Delete ==
    /// Removes the value or whole branch at `key`.
    ///
    /// Returns the number of bytes removed, or `None` if nothing was there.
    /// Branches above the removed node stay, even when left empty.
    pub fn delete_one(&mut self, key: &[KeyPart]) -> Option<usize> {
        self.root.remove(key).map(|node| node.size())
    }

    /// Removes every key, returning the total bytes removed.
    pub fn delete_many<I, K>(&mut self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[KeyPart]>,
    {
        keys.into_iter()
            .filter_map(|key| self.delete_one(key.as_ref()))
            .sum()
    }

    // == Clear ==
    /// Drops everything, including empty branches.
    pub fn clear(&mut self) {
        self.root = Branch::new(self.clock.now());
    }

    // == Partial ==
    /// Returns a view scoped to the branch at `prefix`.
    ///
    /// `None` if the prefix is empty, unknown, or names a value.
    pub fn partial(&mut self, prefix: &[KeyPart]) -> Option<PartialView<'_, V>> {
        if !matches!(self.root.find(prefix), Some(Node::Branch(_))) {
            return None;
        }
        Some(PartialView::new(self, prefix.to_vec()))
    }

    // == Iteration ==
    /// Depth-first iterator over `(key, value, size)`.
    pub fn entries(&self) -> Entries<'_, V> {
        Entries::new(Some(&self.root))
    }

    pub fn keys(&self) -> Keys<'_, V> {
        Keys::new(Some(&self.root))
    }

    pub fn values(&self) -> Values<'_, V> {
        Values::new(Some(&self.root))
    }

    /// Depth-first iterator over `(key, leaf)`, exposing sizes and access
    /// times.
    pub fn nodes(&self) -> Nodes<'_, V> {
        Nodes::new(Some(&self.root))
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_totals(self.root.count(), self.root.size());
        stats
    }
}

impl<'a, V> IntoIterator for &'a CompoundCache<V> {
    type Item = (crate::cache::Key, &'a V, usize);
    type IntoIter = Entries<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries()
    }
}

impl<V> fmt::Debug for CompoundCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompoundCache")
            .field("count", &self.root.count())
            .field("size", &self.root.size())
            .field("policy", &self.policy)
            .field("last_prune", &self.last_prune)
            .finish_non_exhaustive()
    }
}
