//! Per-topic peer sets

use beenet_core::Bid;
use rand::seq::SliceRandom;
use std::collections::HashSet;

/// Full-mesh neighbors for one topic, plus fanout peers used only while
/// the local node is unsubscribed.
#[derive(Debug, Default)]
pub struct TopicMesh {
    pub peers: HashSet<Bid>,
    pub fanout: HashSet<Bid>,
}

impl TopicMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mesh peer; returns false when already present.
    pub fn add_peer(&mut self, peer: Bid) -> bool {
        self.fanout.remove(&peer);
        self.peers.insert(peer)
    }

    /// Remove a mesh peer; returns whether it was present.
    pub fn remove_peer(&mut self, peer: &Bid) -> bool {
        self.peers.remove(peer)
    }

    /// Track a fanout candidate without grafting it.
    pub fn add_fanout(&mut self, peer: Bid) {
        if !self.peers.contains(&peer) {
            self.fanout.insert(peer);
        }
    }

    /// Up to `count` mesh peers chosen uniformly at random, excluding one.
    pub fn select_peers(&self, exclude: Option<&Bid>, count: usize) -> Vec<Bid> {
        let candidates: Vec<Bid> = self
            .peers
            .iter()
            .filter(|p| Some(*p) != exclude)
            .copied()
            .collect();
        candidates
            .choose_multiple(&mut rand::thread_rng(), count)
            .copied()
            .collect()
    }

    /// Fanout candidates not yet in the mesh.
    pub fn fanout_candidates(&self, count: usize) -> Vec<Bid> {
        let candidates: Vec<Bid> = self.fanout.iter().copied().collect();
        candidates
            .choose_multiple(&mut rand::thread_rng(), count)
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
