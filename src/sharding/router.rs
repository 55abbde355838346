//! Key → node routing over the range manager's view.

use crate::sharding::{Range, RangeManager};
use eyre::Result;
use std::sync::Arc;

pub struct Router {
    manager: Arc<RangeManager>,
}

impl Router {
    pub fn new(manager: Arc<RangeManager>) -> Self {
        Self { manager }
    }

    /// Node owning `key`.
    pub fn node_for_key(&self, key: &str) -> Result<String> {
        self.range_for_key(key).map(|r| r.node_id)
    }

    /// Range owning `key`.
    pub fn range_for_key(&self, key: &str) -> Result<Range> {
        self.manager
            .find_range(key)
            .ok_or_else(|| eyre::eyre!("no range owns key '{}'", key))
    }

    /// Ranges overlapping the query interval `[start, end)`, in range
    /// order. Empty bounds mean the infinities.
    pub fn ranges_for_span(&self, start: &str, end: &str) -> Vec<Range> {
        self.manager
            .ranges()
            .into_iter()
            .filter(|r| r.overlaps(start, end))
            .collect()
    }

    /// Nodes a span query must visit, deduplicated, in range order.
    pub fn route_range(&self, start: &str, end: &str) -> Vec<String> {
        let mut nodes: Vec<String> = Vec::new();
        for range in self.ranges_for_span(start, end) {
            if !nodes.contains(&range.node_id) {
                nodes.push(range.node_id);
            }
        }
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_node_manager() -> Arc<RangeManager> {
        let manager = Arc::new(RangeManager::new("node1"));
        let root = manager.find_range("").unwrap();
        let (_, right) = manager.split(root.id, "g", "node2").unwrap();
        manager.split(right.id, "p", "node3").unwrap();
        manager
    }

    #[test]
    fn keys_route_to_their_owning_node() {
        let router = Router::new(three_node_manager());
        assert_eq!(router.node_for_key("alice").unwrap(), "node1");
        assert_eq!(router.node_for_key("mike").unwrap(), "node2");
        assert_eq!(router.node_for_key("zoe").unwrap(), "node3");
    }

    #[test]
    fn span_routing_deduplicates_nodes() {
        let manager = three_node_manager();
        // Give node1 a second range so deduplication matters.
        let last = manager.find_range("zz").unwrap();
        manager.split(last.id, "t", "node1").unwrap();

        let router = Router::new(manager);
        let nodes = router.route_range("a", "");
        assert_eq!(nodes, ["node1", "node2", "node3"]);
    }

    #[test]
    fn span_routing_respects_the_interval() {
        let router = Router::new(three_node_manager());
        assert_eq!(router.route_range("a", "b"), ["node1"]);
        assert_eq!(router.route_range("a", "p"), ["node1", "node2"]);
        assert_eq!(router.route_range("q", ""), ["node3"]);
        // The query end is exclusive: ["g", ...) starts exactly at "g".
        assert_eq!(router.route_range("", "g"), ["node1"]);
    }

    #[test]
    fn full_span_covers_every_range() {
        let router = Router::new(three_node_manager());
        assert_eq!(router.ranges_for_span("", "").len(), 3);
    }
}
