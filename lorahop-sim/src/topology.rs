//! Radio reachability between simulated nodes.
//!
//! A link means the two nodes hear each other's broadcasts. Links are
//! symmetric; loss and extra delay apply in both directions.

use hashbrown::HashMap;
use lorahop::{Duration, NodeId};

/// Properties of a radio link between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    /// Frame loss probability (0.0 to 1.0).
    pub loss_rate: f64,
    /// Delay added on top of the frame's time on air.
    pub delay: Duration,
    /// Whether the link is currently active.
    pub active: bool,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            delay: Duration::ZERO,
            active: true,
        }
    }
}

impl Link {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the loss rate, clamped to `[0, 1]`.
    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Which nodes can hear which.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    links: HashMap<(NodeId, NodeId), Link>,
}

impl Topology {
    /// Create an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every node hears every other node (line of sight).
    pub fn fully_connected(nodes: &[NodeId]) -> Self {
        let mut topo = Self::new();
        for (i, &a) in nodes.iter().enumerate() {
            for &b in nodes.iter().skip(i + 1) {
                topo.add_link(a, b, Link::default());
            }
        }
        topo
    }

    /// Each node hears only its predecessor and successor in `nodes`.
    pub fn chain(nodes: &[NodeId]) -> Self {
        let mut topo = Self::new();
        for pair in nodes.windows(2) {
            topo.add_link(pair[0], pair[1], Link::default());
        }
        topo
    }

    /// Add or replace the link between two nodes.
    pub fn add_link(&mut self, a: NodeId, b: NodeId, link: Link) {
        self.links.insert(Self::canonical_pair(a, b), link);
    }

    pub fn remove_link(&mut self, a: NodeId, b: NodeId) -> Option<Link> {
        self.links.remove(&Self::canonical_pair(a, b))
    }

    pub fn get_link(&self, a: NodeId, b: NodeId) -> Option<&Link> {
        self.links.get(&Self::canonical_pair(a, b))
    }

    pub fn get_link_mut(&mut self, a: NodeId, b: NodeId) -> Option<&mut Link> {
        self.links.get_mut(&Self::canonical_pair(a, b))
    }

    /// Check if two nodes are connected (link exists and is active).
    pub fn is_connected(&self, a: NodeId, b: NodeId) -> bool {
        a != b && self.get_link(a, b).is_some_and(|link| link.active)
    }

    /// Nodes that hear `node` over an active link, in ascending id order.
    pub fn neighbors(&self, node: NodeId) -> Vec<NodeId> {
        let mut result: Vec<NodeId> = self
            .links
            .iter()
            .filter(|(_, link)| link.active)
            .filter_map(|(&(a, b), _)| match (a == node, b == node) {
                (true, false) => Some(b),
                (false, true) => Some(a),
                _ => None,
            })
            .collect();
        result.sort_unstable();
        result
    }

    /// Set global loss rate for all links.
    pub fn set_global_loss_rate(&mut self, rate: f64) {
        let rate = rate.clamp(0.0, 1.0);
        for link in self.links.values_mut() {
            link.loss_rate = rate;
        }
    }

    /// Set the extra delay for all links.
    pub fn set_global_delay(&mut self, delay: Duration) {
        for link in self.links.values_mut() {
            link.delay = delay;
        }
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Canonical pair ordering for consistent link storage.
    fn canonical_pair(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
        if a < b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fully_connected() {
        let topo = Topology::fully_connected(&[0, 1, 2, 3]);

        assert_eq!(topo.link_count(), 6);
        assert!(topo.is_connected(0, 3));
        assert!(topo.is_connected(3, 0));
        assert!(topo.is_connected(1, 2));
    }

    #[test]
    fn test_chain() {
        let topo = Topology::chain(&[0, 1, 2, 3]);

        assert!(topo.is_connected(0, 1));
        assert!(topo.is_connected(1, 2));
        assert!(topo.is_connected(2, 3));

        // Non-adjacent nodes should not be connected
        assert!(!topo.is_connected(0, 2));
        assert!(!topo.is_connected(0, 3));
        assert!(!topo.is_connected(1, 3));
    }

    #[test]
    fn test_no_self_link() {
        let mut topo = Topology::new();
        topo.add_link(5, 5, Link::default());
        assert!(!topo.is_connected(5, 5));
        assert!(topo.neighbors(5).is_empty());
    }

    #[test]
    fn test_neighbors_sorted_and_active_only() {
        let mut topo = Topology::fully_connected(&[4, 0, 9, 2]);
        topo.get_link_mut(9, 0).unwrap().active = false;

        assert_eq!(topo.neighbors(0), vec![2, 4]);
        assert_eq!(topo.neighbors(9), vec![2, 4]);
    }

    #[test]
    fn test_link_lookup_symmetric() {
        let mut topo = Topology::new();
        topo.add_link(3, 1, Link::new().with_loss_rate(0.25));

        assert_eq!(topo.get_link(1, 3).map(|l| l.loss_rate), Some(0.25));
        assert!(topo.remove_link(1, 3).is_some());
        assert!(!topo.is_connected(3, 1));
    }

    #[test]
    fn test_global_settings() {
        let mut topo = Topology::chain(&[0, 1, 2]);
        topo.set_global_loss_rate(1.5);
        topo.set_global_delay(Duration::from_millis(3));

        let link = topo.get_link(1, 2).unwrap();
        assert_eq!(link.loss_rate, 1.0);
        assert_eq!(link.delay, Duration::from_millis(3));
    }

    #[test]
    fn test_link_builder_clamps() {
        assert_eq!(Link::new().with_loss_rate(-0.5).loss_rate, 0.0);
        assert!(!Link::new().with_active(false).active);
    }
}
