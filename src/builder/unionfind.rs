//! Disjoint-set union-find over source variable names (§4.1 step 1, §9
//! "Equality-class columns during building").
//!
//! Kept local to the builder; the finalizer recomputes ids on the stable
//! DFG (§9), so nothing here survives past one clause's construction.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct UnionFind {
    parent: HashMap<String, String>,
    rank: HashMap<String, u32>,
}

impl UnionFind {
    pub fn new() -> Self {
        UnionFind::default()
    }

    fn ensure(&mut self, key: &str) {
        if !self.parent.contains_key(key) {
            self.parent.insert(key.to_string(), key.to_string());
            self.rank.insert(key.to_string(), 0);
        }
    }

    pub fn find(&mut self, key: &str) -> String {
        self.ensure(key);
        let parent = self.parent.get(key).unwrap().clone();
        if parent == key {
            return parent;
        }
        let root = self.find(&parent);
        self.parent.insert(key.to_string(), root.clone());
        root
    }

    pub fn union(&mut self, a: &str, b: &str) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        let rank_a = *self.rank.get(&ra).unwrap_or(&0);
        let rank_b = *self.rank.get(&rb).unwrap_or(&0);
        if rank_a < rank_b {
            self.parent.insert(ra, rb);
        } else if rank_a > rank_b {
            self.parent.insert(rb, ra);
        } else {
            self.parent.insert(rb.clone(), ra.clone());
            self.rank.insert(ra, rank_a + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_find_merges_classes() {
        let mut uf = UnionFind::new();
        assert_ne!(uf.find("x"), uf.find("y"));
        uf.union("x", "y");
        assert_eq!(uf.find("x"), uf.find("y"));
        uf.union("y", "z");
        assert_eq!(uf.find("x"), uf.find("z"));
    }
}
