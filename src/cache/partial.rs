//! Partial View Module
//!
//! A handle scoped to one branch of the trie, addressed by a key prefix.
//! Keys passed to a view are relative to that prefix.
//!
//! Reads that do not touch access times start at the view's branch. Writes
//! and touching reads go through the owning cache with the prefix put back
//! in front, so totals and timestamps above the view stay correct.
//!
//! The view borrows the cache mutably, so nothing else can change the trie
//! while it is alive. The view itself can remove its own branch (an insert
//! through the view may trigger a prune that evicts it). After that, reads
//! behave as for a missing prefix and the next write re-creates it.

use crate::cache::iter::{Entries, Keys, Nodes, Values};
use crate::cache::key::{Key, KeyPart};
use crate::cache::node::{Branch, Node};
use crate::cache::store::CompoundCache;
use crate::clock::Timestamp;
use crate::error::Result;

// == Partial View ==
pub struct PartialView<'a, V> {
    cache: &'a mut CompoundCache<V>,
    prefix: Key,
}

impl<'a, V> PartialView<'a, V> {
    pub(crate) fn new(cache: &'a mut CompoundCache<V>, prefix: Key) -> Self {
        Self { cache, prefix }
    }

    /// Prefix this view is scoped to.
    pub fn prefix(&self) -> &[KeyPart] {
        &self.prefix
    }

    fn full_key(&self, key: &[KeyPart]) -> Key {
        let mut full = Vec::with_capacity(self.prefix.len() + key.len());
        full.extend_from_slice(&self.prefix);
        full.extend_from_slice(key);
        full
    }

    fn branch(&self) -> Option<&Branch<V>> {
        self.cache.root.find_branch(&self.prefix)
    }

    // == Reads ==
    /// Value at `key` below the prefix, touching the path from the root.
    pub fn get(&mut self, key: &[KeyPart]) -> Option<&V> {
        self.get_with(key, true)
    }

    pub fn get_with(&mut self, key: &[KeyPart], touch: bool) -> Option<&V> {
        if key.is_empty() {
            return None;
        }
        if !touch {
            return self.peek(key);
        }
        let full = self.full_key(key);
        self.cache.get(&full)
    }

    pub fn peek(&self, key: &[KeyPart]) -> Option<&V> {
        match self.branch()?.find(key)? {
            Node::Leaf(leaf) => Some(leaf.value()),
            Node::Branch(_) => None,
        }
    }

    pub fn size_of(&self, key: &[KeyPart]) -> Option<usize> {
        self.branch()?.find(key).map(Node::size)
    }

    pub fn atime(&self, key: &[KeyPart]) -> Option<Timestamp> {
        self.branch()?.find(key).map(Node::atime)
    }

    /// Number of values below the prefix.
    pub fn count(&self) -> usize {
        self.branch().map_or(0, Branch::count)
    }

    /// Total size of the values below the prefix.
    pub fn size(&self) -> usize {
        self.branch().map_or(0, Branch::size)
    }

    // == Writes ==
    pub fn insert(&mut self, key: &[KeyPart], value: V) -> Result<Option<usize>> {
        self.insert_one(key, value, true)
    }

    pub fn insert_one(
        &mut self,
        key: &[KeyPart],
        value: V,
        replace: bool,
    ) -> Result<Option<usize>> {
        if key.is_empty() {
            return Ok(None);
        }
        let full = self.full_key(key);
        self.cache.insert_one(&full, value, replace)
    }

    pub fn insert_many<I, K>(&mut self, entries: I, replace: bool) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<[KeyPart]>,
    {
        let full: Vec<(Key, V)> = entries
            .into_iter()
            .filter(|(key, _)| !key.as_ref().is_empty())
            .map(|(key, value)| (self.full_key(key.as_ref()), value))
            .collect();
        self.cache.insert_many(full, replace)
    }

    pub fn ensure(&mut self, key: &[KeyPart], value: V) -> Result<V>
    where
        V: Clone,
    {
        if key.is_empty() {
            return Ok(value);
        }
        let full = self.full_key(key);
        self.cache.ensure(&full, value)
    }

    pub fn delete_one(&mut self, key: &[KeyPart]) -> Option<usize> {
        if key.is_empty() {
            return None;
        }
        let full = self.full_key(key);
        self.cache.delete_one(&full)
    }

    pub fn delete_many<I, K>(&mut self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[KeyPart]>,
    {
        keys.into_iter()
            .filter_map(|key| self.delete_one(key.as_ref()))
            .sum()
    }

    // == Narrow ==
    /// A view scoped further down, at `prefix` relative to this one.
    pub fn partial(&mut self, prefix: &[KeyPart]) -> Option<PartialView<'_, V>> {
        if !matches!(self.branch()?.find(prefix), Some(Node::Branch(_))) {
            return None;
        }
        let full = self.full_key(prefix);
        Some(PartialView::new(&mut *self.cache, full))
    }

    // == Iteration ==
    /// Depth-first iterator over `(relative key, value, size)`.
    pub fn entries(&self) -> Entries<'_, V> {
        Entries::new(self.branch())
    }

    pub fn keys(&self) -> Keys<'_, V> {
        Keys::new(self.branch())
    }

    pub fn values(&self) -> Values<'_, V> {
        Values::new(self.branch())
    }

    pub fn nodes(&self) -> Nodes<'_, V> {
        Nodes::new(self.branch())
    }
}
