//! Prune Module
//!
//! Capacity-driven eviction. A prune run flattens the trie into eviction
//! units, orders them least recently touched first, and removes them until
//! the cache fits its capacity again.

use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::cache::key::{display_key, Key};
use crate::cache::node::{Branch, Node};
use crate::cache::store::CompoundCache;
use crate::clock::Timestamp;

/// Receives everything removed by one prune run.
pub type PrunedCallback<V> = Box<dyn FnMut(Vec<Evicted<V>>)>;

// == Prune Policy ==
/// Resolved eviction settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrunePolicy {
    /// Byte budget; `None` disables pruning
    pub capacity: Option<usize>,
    /// Prune automatically after writes
    pub auto_prune: bool,
    /// Minimum time between automatic prune runs
    pub auto_prune_interval: Option<Duration>,
    /// Key depth treated as one eviction unit; `None` evicts single leaves
    pub prune_depth: Option<usize>,
}

impl Default for PrunePolicy {
    fn default() -> Self {
        Self {
            capacity: None,
            auto_prune: true,
            auto_prune_interval: None,
            prune_depth: None,
        }
    }
}

// == Evicted ==
/// One unit removed by a prune run.
#[derive(Debug, Clone, PartialEq)]
pub enum Evicted<V> {
    /// A single value
    Leaf { key: Key, value: V, size: usize },
    /// A whole branch cut at the prune depth, with the leaves it held.
    /// Entry keys are relative to `prefix`.
    Subtree {
        prefix: Key,
        entries: Vec<(Key, V, usize)>,
        size: usize,
    },
}

impl<V> Evicted<V> {
    fn from_node(key: Key, node: Node<V>) -> Self {
        match node {
            Node::Leaf(leaf) => {
                let size = leaf.size();
                Evicted::Leaf {
                    key,
                    value: leaf.into_value(),
                    size,
                }
            }
            Node::Branch(branch) => {
                let size = branch.size();
                Evicted::Subtree {
                    prefix: key,
                    entries: branch.into_entries(),
                    size,
                }
            }
        }
    }

    /// Full key of a leaf, or the prefix of a subtree.
    pub fn key(&self) -> &Key {
        match self {
            Evicted::Leaf { key, .. } => key,
            Evicted::Subtree { prefix, .. } => prefix,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Evicted::Leaf { size, .. } | Evicted::Subtree { size, .. } => *size,
        }
    }
}

// == Prune Unit ==
#[derive(Debug, Clone)]
struct PruneUnit {
    key: Key,
    atime: Timestamp,
    size: usize,
}

/// Depth-first walk collecting eviction units. A node is a unit when it is
/// a leaf or sits at `prune_depth`. Empty branches hold nothing to free and
/// are never units.
fn collect_units<V>(
    branch: &Branch<V>,
    prune_depth: Option<usize>,
    path: &mut Key,
    units: &mut Vec<PruneUnit>,
) {
    for (part, node) in branch.children() {
        path.push(part.clone());
        match node {
            Node::Branch(child) if child.count() == 0 => {}
            Node::Branch(child) if prune_depth.map_or(true, |depth| path.len() < depth) => {
                collect_units(child, prune_depth, path, units);
            }
            _ => units.push(PruneUnit {
                key: path.clone(),
                atime: node.atime(),
                size: node.size(),
            }),
        }
        path.pop();
    }
}

impl<V> CompoundCache<V> {
    // == Should Auto Prune ==
    /// Whether a write made now should be followed by a prune run.
    pub fn should_auto_prune(&self) -> bool {
        self.should_auto_prune_at(self.clock.now())
    }

    fn should_auto_prune_at(&self, now: Timestamp) -> bool {
        if !self.policy.auto_prune {
            return false;
        }
        let Some(capacity) = self.policy.capacity else {
            return false;
        };
        if self.root.size() <= capacity {
            return false;
        }
        match (self.policy.auto_prune_interval, self.last_prune) {
            (Some(interval), Some(last)) => {
                now.saturating_sub(last) >= interval.as_millis() as u64
            }
            _ => true,
        }
    }

    /// Runs after writes that changed stored bytes.
    pub(crate) fn auto_prune(&mut self) {
        if self.should_auto_prune_at(self.clock.now()) {
            self.prune();
        } else if self.over_capacity() {
            debug!(size = self.root.size(), "Auto prune deferred");
        }
    }

    fn over_capacity(&self) -> bool {
        self.policy
            .capacity
            .is_some_and(|capacity| self.root.size() > capacity)
    }

    // == Prune ==
    /// Evicts least recently touched units until the cache fits its
    /// capacity. Returns the number of units evicted.
    ///
    /// The run is recorded as the last prune even when there is nothing to
    /// do. The `pruned` callback, if any, is called once with every evicted
    /// unit, and only when at least one was evicted.
    pub fn prune(&mut self) -> usize {
        self.last_prune = Some(self.clock.now());

        let capacity = match self.policy.capacity {
            Some(capacity) if self.root.size() > capacity => capacity,
            _ => {
                debug!(size = self.root.size(), "Prune: within capacity");
                self.stats.record_prune(0);
                return 0;
            }
        };

        let mut units = Vec::new();
        collect_units(&self.root, self.policy.prune_depth, &mut Vec::new(), &mut units);
        // Stable: equal timestamps keep traversal order
        units.sort_by_key(|unit| unit.atime);

        let size_before = self.root.size();
        let notify = self.pruned.is_some();
        let mut evicted = Vec::new();
        let mut count = 0;

        for unit in units {
            if self.root.size() <= capacity {
                break;
            }
            let Some(node) = self.root.remove(&unit.key) else {
                continue;
            };
            if unit.size > capacity {
                warn!(
                    key = %display_key(&unit.key),
                    size = unit.size,
                    capacity,
                    "Evicted a unit larger than the whole capacity"
                );
            }
            trace!(key = %display_key(&unit.key), size = unit.size, atime = unit.atime, "Evicted");
            count += 1;
            if notify {
                evicted.push(Evicted::from_node(unit.key, node));
            }
        }

        self.stats.record_prune(count);
        info!(
            evicted = count,
            freed = size_before - self.root.size(),
            size = self.root.size(),
            capacity,
            "Prune complete"
        );

        if count > 0 {
            if let Some(callback) = self.pruned.as_mut() {
                callback(evicted);
            }
        }
        count
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::cache::KeyPart;
    use crate::clock::ManualClock;
    use crate::key;

    fn fixed_size(_: &u32) -> usize {
        30
    }

    /// The five-write scenario: 150 bytes against a 100 byte budget.
    fn scenario(prune_depth: Option<usize>) -> (CompoundCache<u32>, ManualClock) {
        let clock = ManualClock::new(0);
        let mut builder = CompoundCache::builder_with_estimator(fixed_size)
            .capacity(100)
            .auto_prune(false)
            .clock(clock.clone());
        if let Some(depth) = prune_depth {
            builder = builder.prune_depth(depth);
        }
        let mut cache = builder.build().unwrap();

        let writes = [key![1, 1], key![2, 1], key![2, 2], key![1, 2], key![1, 3]];
        for (t, k) in writes.iter().enumerate() {
            clock.set(t as u64);
            cache.insert(k, t as u32).unwrap();
        }
        clock.set(10);
        (cache, clock)
    }

    #[test]
    fn test_collect_units_leaf_level() {
        let (cache, _) = scenario(None);
        let mut units = Vec::new();
        collect_units(&cache.root, None, &mut Vec::new(), &mut units);

        let keys: Vec<Key> = units.iter().map(|u| u.key.clone()).collect();
        assert_eq!(keys, vec![key![1, 1], key![1, 2], key![1, 3], key![2, 1], key![2, 2]]);
        assert!(units.iter().all(|u| u.size == 30));
    }

    #[test]
    fn test_collect_units_at_depth() {
        let (cache, _) = scenario(Some(1));
        let mut units = Vec::new();
        collect_units(&cache.root, Some(1), &mut Vec::new(), &mut units);

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].key, key![1]);
        assert_eq!(units[0].size, 90);
        assert_eq!(units[0].atime, 4);
        assert_eq!(units[1].key, key![2]);
        assert_eq!(units[1].size, 60);
        assert_eq!(units[1].atime, 2);
    }

    #[test]
    fn test_prune_leaf_level() {
        let (mut cache, _) = scenario(None);
        assert_eq!(cache.size(), 150);

        assert_eq!(cache.prune(), 2);

        assert_eq!(cache.size(), 90);
        assert!(cache.peek(&key![1, 1]).is_none());
        assert!(cache.peek(&key![2, 1]).is_none());
        let keys: Vec<Key> = cache.keys().collect();
        assert_eq!(keys, vec![key![1, 2], key![1, 3], key![2, 2]]);
    }

    #[test]
    fn test_prune_depth_one() {
        let (mut cache, _) = scenario(Some(1));

        assert_eq!(cache.prune(), 1);

        assert_eq!(cache.size(), 90);
        let keys: Vec<Key> = cache.keys().collect();
        assert_eq!(keys, vec![key![1, 1], key![1, 2], key![1, 3]]);
        assert!(cache.size_of(&key![2]).is_none());
    }

    #[test]
    fn test_empty_branch_is_not_a_unit() {
        let batches: Rc<RefCell<Vec<Vec<Evicted<u32>>>>> = Rc::default();
        let sink = Rc::clone(&batches);

        let (mut cache, clock) = scenario(Some(1));
        cache.pruned = Some(Box::new(move |batch: Vec<Evicted<u32>>| {
            sink.borrow_mut().push(batch)
        }));
        cache.delete_many([key![2, 1], key![2, 2]]);
        assert_eq!(cache.size_of(&key![2]), Some(0));

        clock.set(20);
        cache.insert(&key![3, 1], 5).unwrap();
        cache.insert(&key![3, 2], 6).unwrap();
        assert_eq!(cache.size(), 150);

        // subtree 2 is older than 1 but empty: 1 is the only unit freed
        assert_eq!(cache.prune(), 1);
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.size(), 60);
        assert_eq!(cache.size_of(&key![2]), Some(0));

        let batches = batches.borrow();
        assert_eq!(batches.len(), 1);
        assert!(matches!(
            &batches[0][..],
            [Evicted::Subtree { prefix, size: 90, .. }] if *prefix == key![1]
        ));
    }

    #[test]
    fn test_collect_units_skips_empty_branches() {
        let (mut cache, _) = scenario(None);
        cache.delete_many([key![2, 1], key![2, 2]]);

        for depth in [None, Some(1)] {
            let mut units = Vec::new();
            collect_units(&cache.root, depth, &mut Vec::new(), &mut units);
            assert!(units.iter().all(|u| u.key[0] == KeyPart::Int(1)));
        }
    }

    #[test]
    fn test_prune_within_capacity_is_noop() {
        let (mut cache, clock) = scenario(None);
        cache.delete_many([key![1, 1], key![2, 1]]);
        assert_eq!(cache.size(), 90);

        clock.set(50);
        assert_eq!(cache.prune(), 0);
        assert_eq!(cache.count(), 3);
        assert_eq!(cache.last_prune, Some(50));
    }

    #[test]
    fn test_reaccessed_entry_evicted_last() {
        let (mut cache, clock) = scenario(None);
        clock.set(20);
        cache.get(&key![1, 1]).unwrap();

        cache.prune();

        assert!(cache.peek(&key![1, 1]).is_some());
        assert!(cache.peek(&key![2, 1]).is_none());
        assert!(cache.peek(&key![2, 2]).is_none());
        assert_eq!(cache.size(), 90);
    }

    #[test]
    fn test_callback_receives_subtree_entries() {
        let seen: Rc<RefCell<Vec<Evicted<u32>>>> = Rc::default();
        let sink = Rc::clone(&seen);

        let (mut cache, _) = scenario(Some(1));
        cache.pruned = Some(Box::new(move |batch: Vec<Evicted<u32>>| {
            sink.borrow_mut().extend(batch)
        }));
        cache.prune();

        let seen = seen.borrow();
        assert_eq!(
            *seen,
            vec![Evicted::Subtree {
                prefix: key![2],
                entries: vec![(key![1], 1, 30), (key![2], 2, 30)],
                size: 60,
            }]
        );
    }

    #[test]
    fn test_callback_skipped_when_nothing_evicted() {
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);

        let (mut cache, _) = scenario(None);
        cache.pruned = Some(Box::new(move |_: Vec<Evicted<u32>>| *counter.borrow_mut() += 1));
        cache.policy.capacity = Some(1_000);
        cache.prune();

        assert_eq!(*calls.borrow(), 0);
    }

    #[test]
    fn test_should_auto_prune_interval() {
        let (mut cache, clock) = scenario(None);
        assert!(!cache.should_auto_prune(), "auto prune disabled");

        cache.policy.auto_prune = true;
        cache.policy.auto_prune_interval = Some(Duration::from_millis(100));
        assert!(cache.should_auto_prune(), "never pruned before");

        cache.last_prune = Some(10);
        clock.set(109);
        assert!(!cache.should_auto_prune());
        clock.set(110);
        assert!(cache.should_auto_prune());

        cache.policy.capacity = None;
        assert!(!cache.should_auto_prune());
    }
}
