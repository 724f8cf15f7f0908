//! Union-Find (disjoint set) over arbitrary hashable keys.
//!
//! Used by the identity merger to turn pairwise similarity edges into
//! connected components.

use std::collections::HashMap;
use std::hash::Hash;

/// Disjoint-set forest with path compression.
#[derive(Debug, Clone)]
pub struct UnionFind<T> {
    parent: HashMap<T, T>,
}

impl<T> Default for UnionFind<T> {
    fn default() -> Self {
        Self {
            parent: HashMap::new(),
        }
    }
}

impl<T: Hash + Eq + Clone> UnionFind<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `item` as its own singleton set. No-op if already present.
    pub fn make_set(&mut self, item: T) {
        self.parent.entry(item.clone()).or_insert(item);
    }

    pub fn contains(&self, item: &T) -> bool {
        self.parent.contains_key(item)
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Find the root of `item`, compressing the path on the way.
    ///
    /// Unknown items are treated as their own root.
    pub fn find(&mut self, item: &T) -> T {
        let mut root = item.clone();
        while let Some(next) = self.parent.get(&root) {
            if *next == root {
                break;
            }
            root = next.clone();
        }

        let mut current = item.clone();
        while current != root {
            match self.parent.insert(current.clone(), root.clone()) {
                Some(next) => current = next,
                None => break,
            }
        }

        root
    }

    /// Merge the sets containing `a` and `b`.
    pub fn union(&mut self, a: &T, b: &T) {
        self.make_set(a.clone());
        self.make_set(b.clone());
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            self.parent.insert(root_b, root_a);
        }
    }

    pub fn connected(&mut self, a: &T, b: &T) -> bool {
        self.find(a) == self.find(b)
    }

    /// All sets keyed by their current root.
    pub fn groups(&mut self) -> HashMap<T, Vec<T>> {
        let items: Vec<T> = self.parent.keys().cloned().collect();
        let mut groups: HashMap<T, Vec<T>> = HashMap::new();
        for item in items {
            let root = self.find(&item);
            groups.entry(root).or_default().push(item);
        }
        groups
    }
}
