//! Node Module
//!
//! Trie nodes and the traversal primitives shared by the cache and its
//! partial views.
//!
//! A [`Branch`] keeps running totals of the bytes and leaves beneath it.
//! Every structural change goes through [`Branch::insert`] or
//! [`Branch::remove`], which apply the change on the way back up so each
//! ancestor's totals stay equal to the sum over its children.

use std::collections::{btree_map, BTreeMap, HashMap};

use crate::cache::key::{Key, KeyPart};
use crate::clock::Timestamp;

// == Node ==
#[derive(Debug, Clone)]
pub(crate) enum Node<V> {
    Branch(Branch<V>),
    Leaf(Leaf<V>),
}

impl<V> Node<V> {
    /// Aggregate size for a branch, own size for a leaf.
    pub(crate) fn size(&self) -> usize {
        match self {
            Node::Branch(branch) => branch.size,
            Node::Leaf(leaf) => leaf.size,
        }
    }

    /// Number of leaves at or below this node.
    pub(crate) fn count(&self) -> usize {
        match self {
            Node::Branch(branch) => branch.count,
            Node::Leaf(_) => 1,
        }
    }

    pub(crate) fn atime(&self) -> Timestamp {
        match self {
            Node::Branch(branch) => branch.atime,
            Node::Leaf(leaf) => leaf.atime,
        }
    }

    fn touch(&mut self, now: Timestamp) {
        match self {
            Node::Branch(branch) => branch.atime = now,
            Node::Leaf(leaf) => leaf.atime = now,
        }
    }
}

// == Leaf ==
/// A stored value together with its size and last access time.
#[derive(Debug, Clone)]
pub struct Leaf<V> {
    value: V,
    atime: Timestamp,
    size: usize,
}

impl<V> Leaf<V> {
    pub(crate) fn new(value: V, size: usize, now: Timestamp) -> Self {
        Self {
            value,
            atime: now,
            size,
        }
    }

    /// The stored value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Estimated size in bytes, measured when the value was stored.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Last time this leaf was written or read with touch.
    pub fn atime(&self) -> Timestamp {
        self.atime
    }

    pub(crate) fn into_value(self) -> V {
        self.value
    }
}

// == Delta ==
/// Change in aggregate size and leaf count caused by one mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Delta {
    pub size: isize,
    pub count: isize,
}

impl Delta {
    fn grown(old_size: Option<usize>, new_size: usize) -> Self {
        match old_size {
            Some(old) => Self {
                size: new_size as isize - old as isize,
                count: 0,
            },
            None => Self {
                size: new_size as isize,
                count: 1,
            },
        }
    }

    fn removed<V>(node: &Node<V>) -> Self {
        Self {
            size: -(node.size() as isize),
            count: -(node.count() as isize),
        }
    }
}

/// Insert path runs through a leaf or ends on a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PathConflict;

// == Children ==
/// Child nodes of a branch: hashed lookup by key part, iteration in
/// insertion order.
///
/// Each child gets a sequence number when it is added. `slots` holds the
/// children ordered by that number and `index` maps a key part back to it.
/// Lookup, insert and removal are O(log width).
#[derive(Debug, Clone)]
pub(crate) struct Children<V> {
    slots: BTreeMap<u64, (KeyPart, Node<V>)>,
    index: HashMap<KeyPart, u64>,
    next_seq: u64,
}

/// Insertion-ordered iterator over a branch's children.
pub(crate) type ChildIter<'a, V> = btree_map::Values<'a, u64, (KeyPart, Node<V>)>;

impl<V> Children<V> {
    fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
            index: HashMap::new(),
            next_seq: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn iter(&self) -> ChildIter<'_, V> {
        self.slots.values()
    }

    fn get(&self, part: &KeyPart) -> Option<&Node<V>> {
        let seq = self.index.get(part)?;
        self.slots.get(seq).map(|(_, node)| node)
    }

    fn get_mut(&mut self, part: &KeyPart) -> Option<&mut Node<V>> {
        let seq = self.index.get(part)?;
        self.slots.get_mut(seq).map(|(_, node)| node)
    }

    /// Appends a child that is not present yet.
    fn push(&mut self, part: KeyPart, node: Node<V>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(part.clone(), seq);
        self.slots.insert(seq, (part, node));
    }

    fn remove(&mut self, part: &KeyPart) -> Option<Node<V>> {
        let seq = self.index.remove(part)?;
        self.slots.remove(&seq).map(|(_, node)| node)
    }

    fn into_values(self) -> btree_map::IntoValues<u64, (KeyPart, Node<V>)> {
        self.slots.into_values()
    }
}

impl<'a, V> IntoIterator for &'a Children<V> {
    type Item = &'a (KeyPart, Node<V>);
    type IntoIter = ChildIter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// == Branch ==
#[derive(Debug, Clone)]
pub(crate) struct Branch<V> {
    /// Iterated in insertion order
    children: Children<V>,
    atime: Timestamp,
    size: usize,
    count: usize,
}

impl<V> Branch<V> {
    // == Constructor ==
    pub(crate) fn new(now: Timestamp) -> Self {
        Self {
            children: Children::new(),
            atime: now,
            size: 0,
            count: 0,
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn count(&self) -> usize {
        self.count
    }

    pub(crate) fn atime(&self) -> Timestamp {
        self.atime
    }

    pub(crate) fn children(&self) -> &Children<V> {
        &self.children
    }

    fn child(&self, part: &KeyPart) -> Option<&Node<V>> {
        self.children.get(part)
    }

    fn child_mut(&mut self, part: &KeyPart) -> Option<&mut Node<V>> {
        self.children.get_mut(part)
    }

    // == Apply Delta ==
    /// Folds a child's change into this branch's totals.
    ///
    /// # Panics
    /// If either total would go negative, which means the bookkeeping is
    /// already broken.
    fn apply(&mut self, delta: Delta) {
        self.size = self.size.checked_add_signed(delta.size).unwrap_or_else(|| {
            panic!("aggregate size underflow: {} {:+}", self.size, delta.size)
        });
        self.count = self.count.checked_add_signed(delta.count).unwrap_or_else(|| {
            panic!("aggregate count underflow: {} {:+}", self.count, delta.count)
        });
    }

    // == Find ==
    /// Descends along `path` without touching anything.
    ///
    /// An empty path, a missing step, or a step through a leaf yields `None`.
    pub(crate) fn find(&self, path: &[KeyPart]) -> Option<&Node<V>> {
        let (head, rest) = path.split_first()?;
        let child = self.child(head)?;
        if rest.is_empty() {
            return Some(child);
        }
        match child {
            Node::Branch(branch) => branch.find(rest),
            Node::Leaf(_) => None,
        }
    }

    /// Like [`Branch::find`] but for a path that must end on a branch.
    pub(crate) fn find_branch(&self, path: &[KeyPart]) -> Option<&Branch<V>> {
        if path.is_empty() {
            return Some(self);
        }
        match self.find(path)? {
            Node::Branch(branch) => Some(branch),
            Node::Leaf(_) => None,
        }
    }

    // == Find With Touch ==
    /// Descends along `path`, stamping this branch and every node visited
    /// with `now`, including the one returned.
    pub(crate) fn find_touch(
        &mut self,
        path: &[KeyPart],
        now: Timestamp,
    ) -> Option<&mut Node<V>> {
        let (head, rest) = path.split_first()?;
        self.atime = now;
        let child = self.child_mut(head)?;
        if rest.is_empty() {
            child.touch(now);
            return Some(child);
        }
        match child {
            Node::Branch(branch) => branch.find_touch(rest, now),
            Node::Leaf(_) => None,
        }
    }

    // == Leaf Exists ==
    pub(crate) fn has_leaf(&self, path: &[KeyPart]) -> bool {
        matches!(self.find(path), Some(Node::Leaf(_)))
    }

    // == Insert ==
    /// Stores `value` at `head`/`rest` below this branch, creating
    /// intermediate branches as needed and replacing an existing leaf.
    ///
    /// Every branch on the way down is stamped with `now`. Returns the
    /// change applied to this branch's totals.
    pub(crate) fn insert(
        &mut self,
        head: &KeyPart,
        rest: &[KeyPart],
        value: V,
        size: usize,
        now: Timestamp,
    ) -> Result<Delta, PathConflict> {
        self.atime = now;

        let delta = match rest.split_first() {
            None => {
                let leaf = Leaf::new(value, size, now);
                match self.child_mut(head) {
                    Some(Node::Leaf(existing)) => {
                        let old = existing.size;
                        *existing = leaf;
                        Delta::grown(Some(old), size)
                    }
                    Some(Node::Branch(_)) => return Err(PathConflict),
                    None => {
                        self.children.push(head.clone(), Node::Leaf(leaf));
                        Delta::grown(None, size)
                    }
                }
            }
            Some((next, rest)) => {
                if self.children.get(head).is_none() {
                    self.children
                        .push(head.clone(), Node::Branch(Branch::new(now)));
                }
                match self.children.get_mut(head) {
                    Some(Node::Branch(branch)) => branch.insert(next, rest, value, size, now)?,
                    _ => return Err(PathConflict),
                }
            }
        };

        self.apply(delta);
        Ok(delta)
    }

    // == Remove ==
    /// Detaches the node at `path` and subtracts it from every branch on
    /// the way back up. Access times are left alone.
    pub(crate) fn remove(&mut self, path: &[KeyPart]) -> Option<Node<V>> {
        let (head, rest) = path.split_first()?;

        let removed = if rest.is_empty() {
            self.children.remove(head)?
        } else {
            match self.children.get_mut(head)? {
                Node::Branch(branch) => branch.remove(rest)?,
                Node::Leaf(_) => return None,
            }
        };

        self.apply(Delta::removed(&removed));
        Some(removed)
    }
}

// == Into Entries ==
impl<V> Branch<V> {
    /// Consumes the branch, yielding every leaf below it depth-first as
    /// `(relative key, value, size)`.
    pub(crate) fn into_entries(self) -> Vec<(Key, V, usize)> {
        let mut entries = Vec::with_capacity(self.count);
        drain_children(self.children, &mut Vec::new(), &mut entries);
        entries
    }
}

fn drain_children<V>(
    children: Children<V>,
    path: &mut Key,
    entries: &mut Vec<(Key, V, usize)>,
) {
    for (part, node) in children.into_values() {
        path.push(part);
        match node {
            Node::Leaf(leaf) => {
                let size = leaf.size;
                entries.push((path.clone(), leaf.into_value(), size));
            }
            Node::Branch(branch) => drain_children(branch.children, path, entries),
        }
        path.pop();
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::key;

    fn leaf_value<V>(node: Option<&Node<V>>) -> Option<&V> {
        match node {
            Some(Node::Leaf(leaf)) => Some(leaf.value()),
            _ => None,
        }
    }

    fn insert(
        root: &mut Branch<&'static str>,
        path: &[KeyPart],
        value: &'static str,
        size: usize,
        now: Timestamp,
    ) -> Result<Delta, PathConflict> {
        root.insert(&path[0], &path[1..], value, size, now)
    }

    #[test]
    fn test_insert_creates_intermediate_branches() {
        let mut root = Branch::new(0);
        let delta = insert(&mut root, &key!["a", 1, "x"], "v", 10, 5).unwrap();

        assert_eq!(delta, Delta { size: 10, count: 1 });
        assert_eq!(root.size(), 10);
        assert_eq!(root.count(), 1);

        let mid = root.find(&key!["a", 1]).unwrap();
        assert!(matches!(mid, Node::Branch(_)));
        assert_eq!(mid.size(), 10);
        assert_eq!(mid.count(), 1);
        assert_eq!(mid.atime(), 5);
        assert_eq!(leaf_value(root.find(&key!["a", 1, "x"])), Some(&"v"));
    }

    #[test]
    fn test_replace_propagates_size_difference() {
        let mut root = Branch::new(0);
        insert(&mut root, &key!["a", "b"], "small", 10, 1).unwrap();
        insert(&mut root, &key!["a", "c"], "other", 5, 2).unwrap();

        let delta = insert(&mut root, &key!["a", "b"], "large", 25, 3).unwrap();
        assert_eq!(delta, Delta { size: 15, count: 0 });
        assert_eq!(root.size(), 30);
        assert_eq!(root.count(), 2);
        assert_eq!(root.find(&key!["a"]).unwrap().size(), 30);
    }

    #[test]
    fn test_insert_conflicts() {
        let mut root = Branch::new(0);
        insert(&mut root, &key!["a", "b"], "v", 1, 1).unwrap();

        // through a leaf
        assert_eq!(insert(&mut root, &key!["a", "b", "c"], "v", 1, 2), Err(PathConflict));
        // onto a branch
        assert_eq!(insert(&mut root, &key!["a"], "v", 1, 2), Err(PathConflict));

        assert_eq!(root.size(), 1);
        assert_eq!(root.count(), 1);
    }

    #[test]
    fn test_find_stops_at_leaf() {
        let mut root = Branch::new(0);
        insert(&mut root, &key!["a"], "v", 1, 1).unwrap();

        assert!(root.find(&key!["a", "b"]).is_none());
        assert!(root.find(&key![]).is_none());
        assert!(root.find_branch(&key!["a"]).is_none());
        assert!(root.find_branch(&key![]).is_some());
    }

    #[test]
    fn test_find_touch_stamps_path_only() {
        let mut root = Branch::new(0);
        insert(&mut root, &key![1, 1], "a", 1, 1).unwrap();
        insert(&mut root, &key![2, 1], "b", 1, 2).unwrap();

        root.find_touch(&key![1, 1], 10).unwrap();

        assert_eq!(root.atime(), 10);
        assert_eq!(root.find(&key![1]).unwrap().atime(), 10);
        assert_eq!(root.find(&key![1, 1]).unwrap().atime(), 10);
        assert_eq!(root.find(&key![2]).unwrap().atime(), 2);
        assert_eq!(root.find(&key![2, 1]).unwrap().atime(), 2);
    }

    #[test]
    fn test_remove_subtree_updates_ancestors() {
        let mut root = Branch::new(0);
        insert(&mut root, &key!["t", "a", 1], "x", 4, 1).unwrap();
        insert(&mut root, &key!["t", "a", 2], "y", 6, 1).unwrap();
        insert(&mut root, &key!["t", "b"], "z", 7, 1).unwrap();

        let removed = root.remove(&key!["t", "a"]).unwrap();
        assert_eq!(removed.size(), 10);
        assert_eq!(removed.count(), 2);

        assert_eq!(root.size(), 7);
        assert_eq!(root.count(), 1);
        assert_eq!(root.find(&key!["t"]).unwrap().size(), 7);
        assert!(root.remove(&key!["t", "a"]).is_none());
        assert!(root.remove(&key!["t", "b", "deeper"]).is_none());
    }

    #[test]
    fn test_remove_keeps_emptied_branch() {
        let mut root = Branch::new(0);
        insert(&mut root, &key!["t", "a"], "x", 4, 1).unwrap();
        root.remove(&key!["t", "a"]).unwrap();

        let t = root.find(&key!["t"]).unwrap();
        assert!(matches!(t, Node::Branch(_)));
        assert_eq!(t.size(), 0);
        assert_eq!(t.count(), 0);
    }

    #[test]
    fn test_children_keep_insertion_order() {
        let mut root = Branch::new(0);
        for part in ["c", "a", "b"] {
            insert(&mut root, &key![part], "v", 1, 1).unwrap();
        }
        let order: Vec<String> = root.children().iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_removed_child_rejoins_at_the_end() {
        let mut root = Branch::new(0);
        for part in ["a", "b", "c"] {
            insert(&mut root, &key![part], "v", 1, 1).unwrap();
        }
        root.remove(&key!["a"]).unwrap();
        insert(&mut root, &key!["a"], "v", 1, 2).unwrap();

        let order: Vec<String> = root.children().iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
        assert_eq!(root.children().len(), 3);
    }

    #[test]
    fn test_wide_branch_lookup_and_removal() {
        const WIDTH: i64 = 20_000;
        let mut root = Branch::new(0);
        for i in 0..WIDTH {
            root.insert(&key!["tenant"][0], &key![i], "v", 1, 1).unwrap();
        }

        let tenant = root.find_branch(&key!["tenant"]).unwrap();
        assert_eq!(tenant.count(), WIDTH as usize);
        assert_eq!(tenant.children().len(), WIDTH as usize);
        assert!(root.has_leaf(&key!["tenant", WIDTH - 1]));
        assert!(!root.has_leaf(&key!["tenant", WIDTH]));

        for i in (0..WIDTH).step_by(2) {
            assert!(root.remove(&key!["tenant", i]).is_some());
        }
        assert_eq!(root.count(), (WIDTH / 2) as usize);

        let tenant = root.find_branch(&key!["tenant"]).unwrap();
        let first: Vec<KeyPart> = tenant
            .children()
            .iter()
            .take(3)
            .map(|(k, _)| k.clone())
            .collect();
        assert_eq!(first, key![1, 3, 5]);
    }

    #[test]
    fn test_into_entries_relative_keys() {
        let mut root = Branch::new(0);
        insert(&mut root, &key!["t", "a", 1], "x", 4, 1).unwrap();
        insert(&mut root, &key!["t", "b"], "y", 6, 1).unwrap();

        let Some(Node::Branch(t)) = root.remove(&key!["t"]) else {
            panic!("expected a branch");
        };
        assert_eq!(
            t.into_entries(),
            vec![(key!["a", 1], "x", 4), (key!["b"], "y", 6)]
        );
    }
}
