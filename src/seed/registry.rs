//! Seed-side peer registry
//!
//! Nodes are kept in registration order. A registering node is handed one
//! other node chosen round-robin over that order; the registry never hands a
//! node itself.

use crate::{NodeDescriptor, TrackedNode};
use chrono::Utc;
use parking_lot::RwLock;
use rand::seq::IndexedRandom;

/// What a registering node is told to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    /// No other node is known yet
    FirstNode,
    /// Connect to this peer address
    PeerAssigned(String),
}

#[derive(Default)]
struct RegistryInner {
    nodes: Vec<TrackedNode>,
    cursor: usize,
}

impl RegistryInner {
    fn position(&self, key: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.descriptor.key() == key)
    }
}

#[derive(Default)]
pub struct PeerRegistry {
    inner: RwLock<RegistryInner>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track (or refresh) `descriptor` and pick a peer for it
    pub fn register(&self, descriptor: NodeDescriptor) -> Assignment {
        let mut inner = self.inner.write();
        let key = descriptor.key();
        let now = Utc::now();

        let own_index = match inner.position(&key) {
            Some(index) => {
                let node = &mut inner.nodes[index];
                node.descriptor = descriptor;
                node.last_seen = now;
                index
            }
            None => {
                inner.nodes.push(TrackedNode {
                    descriptor,
                    registered_at: now,
                    last_seen: now,
                });
                inner.nodes.len() - 1
            }
        };

        let total = inner.nodes.len();
        if total < 2 {
            return Assignment::FirstNode;
        }

        let mut pick = inner.cursor % total;
        if pick == own_index {
            pick = (pick + 1) % total;
        }
        inner.cursor = pick + 1;

        Assignment::PeerAssigned(inner.nodes[pick].descriptor.peer_address())
    }

    /// Remove every node whose key is listed, under one write lock
    pub fn remove_many(&self, keys: &[String]) -> usize {
        if keys.is_empty() {
            return 0;
        }
        let mut inner = self.inner.write();
        let before = inner.nodes.len();
        inner.nodes.retain(|node| !keys.contains(&node.descriptor.key()));
        before - inner.nodes.len()
    }

    /// Refresh `last_seen` for nodes that answered a probe
    pub fn touch_many(&self, keys: &[String]) {
        let now = Utc::now();
        let mut inner = self.inner.write();
        for node in inner.nodes.iter_mut() {
            if keys.contains(&node.descriptor.key()) {
                node.last_seen = now;
            }
        }
    }

    /// Descriptors in registration order
    pub fn snapshot(&self) -> Vec<NodeDescriptor> {
        self.inner
            .read()
            .nodes
            .iter()
            .map(|node| node.descriptor.clone())
            .collect()
    }

    pub fn tracked(&self) -> Vec<TrackedNode> {
        self.inner.read().nodes.clone()
    }

    /// A uniformly random tracked node
    pub fn random(&self) -> Option<NodeDescriptor> {
        self.inner
            .read()
            .nodes
            .choose(&mut rand::rng())
            .map(|node| node.descriptor.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().position(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
