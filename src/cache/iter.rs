//! Iteration Module
//!
//! Lazy depth-first walks over the leaves below a branch.

use crate::cache::key::Key;
use crate::cache::node::{Branch, ChildIter, Leaf, Node};

// == Nodes ==
/// Depth-first, left-to-right iterator over `(relative key, leaf)` pairs.
///
/// Children are visited in the order they were first inserted.
pub struct Nodes<'a, V> {
    /// One child iterator per open branch, innermost last
    stack: Vec<ChildIter<'a, V>>,
    /// Key parts of the open branches below the start
    path: Key,
}

impl<'a, V> Nodes<'a, V> {
    pub(crate) fn new(start: Option<&'a Branch<V>>) -> Self {
        Self {
            stack: start.map(|branch| branch.children().iter()).into_iter().collect(),
            path: Vec::new(),
        }
    }
}

impl<'a, V> Iterator for Nodes<'a, V> {
    type Item = (Key, &'a Leaf<V>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let children = self.stack.last_mut()?;
            match children.next() {
                Some((part, Node::Leaf(leaf))) => {
                    let mut key = self.path.clone();
                    key.push(part.clone());
                    return Some((key, leaf));
                }
                Some((part, Node::Branch(branch))) => {
                    self.path.push(part.clone());
                    self.stack.push(branch.children().iter());
                }
                None => {
                    self.stack.pop();
                    self.path.pop();
                }
            }
        }
    }
}

// == Entries ==
/// Iterator over `(relative key, value, size)` triples.
pub struct Entries<'a, V> {
    inner: Nodes<'a, V>,
}

impl<'a, V> Entries<'a, V> {
    pub(crate) fn new(start: Option<&'a Branch<V>>) -> Self {
        Self {
            inner: Nodes::new(start),
        }
    }
}

impl<'a, V> Iterator for Entries<'a, V> {
    type Item = (Key, &'a V, usize);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(key, leaf)| (key, leaf.value(), leaf.size()))
    }
}

// == Keys ==
pub struct Keys<'a, V> {
    inner: Nodes<'a, V>,
}

impl<'a, V> Keys<'a, V> {
    pub(crate) fn new(start: Option<&'a Branch<V>>) -> Self {
        Self {
            inner: Nodes::new(start),
        }
    }
}

impl<'a, V> Iterator for Keys<'a, V> {
    type Item = Key;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, _)| key)
    }
}

// == Values ==
pub struct Values<'a, V> {
    inner: Nodes<'a, V>,
}

impl<'a, V> Values<'a, V> {
    pub(crate) fn new(start: Option<&'a Branch<V>>) -> Self {
        Self {
            inner: Nodes::new(start),
        }
    }
}

impl<'a, V> Iterator for Values<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, leaf)| leaf.value())
    }
}
