use std::collections::BTreeMap;

use lavender_common::Md5;

use crate::error::{RewriteError, RewriteResult};

/// Maps md5 keys onto a fixed set of named nodes.
///
/// Every node occupies `replicas` positions on a ring of `i32` values; a key
/// belongs to the node at the first position greater or equal to it, wrapping
/// around to the smallest position. With a few hundred replicas per node,
/// adding or removing one node remaps close to `1/N` of all keys.
#[derive(Debug, Clone)]
pub struct ConsistentHash {
    replicas: usize,
    ring: BTreeMap<i32, String>,
}

impl ConsistentHash {
    pub fn new<I, S>(replicas: usize, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut hash = Self {
            replicas,
            ring: BTreeMap::new(),
        };
        for node in nodes {
            hash.add_node(node.as_ref());
        }
        hash
    }

    fn position(node: &str, replica: usize) -> i32 {
        Md5::digest(format!("{node}-{replica}").as_bytes()).ring_key()
    }

    /// Positions colliding with an existing one take it over.
    pub fn add_node(&mut self, node: &str) {
        for replica in 0..self.replicas {
            self.ring.insert(Self::position(node, replica), node.to_string());
        }
    }

    pub fn remove_node(&mut self, node: &str) {
        for replica in 0..self.replicas {
            let position = Self::position(node, replica);
            if self.ring.get(&position).is_some_and(|owner| owner == node) {
                self.ring.remove(&position);
            }
        }
    }

    pub fn node_for_hash(&self, md5: &Md5) -> RewriteResult<&str> {
        let key = md5.ring_key();
        self.ring
            .range(key..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, node)| node.as_str())
            .ok_or(RewriteError::EmptyRing)
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Number of occupied ring positions.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}
