//! Link reconciliation and node visibility.

use crate::model_db::{Link, ModelDb};
use dependinator_core::{LinkId, NodeId, ParsedLink};
use std::collections::BTreeSet;
use tracing::{debug, warn};

impl ModelDb {
    /// Create or refresh the link described by `parsed`, tagged with the current stamp.
    pub fn add_or_update_link(&mut self, parsed: &ParsedLink) -> Option<LinkId> {
        let stamp = self.stamp();
        self.upsert_link(parsed, stamp)
    }

    /// Create or refresh the link described by `parsed`, tagged with `stamp`.
    ///
    /// Missing endpoints are created as placeholders. Both endpoints count as
    /// seen at `stamp`, so a referenced placeholder survives the sweep. A new
    /// link between two visible nodes is routed right away. Self links are
    /// ignored.
    pub fn upsert_link(&mut self, parsed: &ParsedLink, stamp: u64) -> Option<LinkId> {
        if parsed.source == parsed.target {
            warn!(node = %parsed.source, "Ignoring link from a node to itself");
            return None;
        }

        let id = LinkId::from_names(&parsed.source, &parsed.target);
        if let Some(link) = self.try_link_mut(&id) {
            link.stamp = link.stamp.max(stamp);
            let (source, target) = (link.source.clone(), link.target.clone());
            self.mark_seen(&source, stamp);
            self.mark_seen(&target, stamp);
            return Some(id);
        }

        let source = self.get_or_create_node_at(&parsed.source, stamp);
        let target = self.get_or_create_node_at(&parsed.target, stamp);
        self.mark_seen(&source, stamp);
        self.mark_seen(&target, stamp);

        self.add_link(Link {
            id: id.clone(),
            source: source.clone(),
            target: target.clone(),
            stamp,
            lines: Vec::new(),
        });
        self.node_mut(&source).source_links.push(id.clone());
        self.node_mut(&target).target_links.push(id.clone());

        if self.is_link_visible(&id) {
            self.route_link(&id);
        }
        Some(id)
    }

    /// Neither endpoint is hidden, directly or through an ancestor.
    pub fn is_link_visible(&self, id: &LinkId) -> bool {
        let link = self.link(id);
        !self.is_effectively_hidden(&link.source) && !self.is_effectively_hidden(&link.target)
    }

    /// Links with at least one endpoint in the subtree of `id`, in id order.
    pub fn links_touching_subtree(&self, id: &NodeId) -> Vec<LinkId> {
        let mut links = BTreeSet::new();
        for node_id in self.subtree(id) {
            let node = &self[&node_id];
            links.extend(node.source_links.iter().cloned());
            links.extend(node.target_links.iter().cloned());
        }
        links.into_iter().collect()
    }

    /// Hide a node. Links touching its subtree stop contributing to lines but
    /// are kept. Returns false when the node already was hidden.
    pub fn hide_node(&mut self, id: &NodeId) -> bool {
        if self[id].is_root() || self[id].is_hidden {
            return false;
        }
        self.node_mut(id).is_hidden = true;
        self.touch();

        let links = self.links_touching_subtree(id);
        for link_id in &links {
            if self.link(link_id).is_routed() {
                self.unroute_link(link_id, true);
            }
        }
        debug!(node = %self[id].name, links = links.len(), "Hid node");
        true
    }

    /// Show a hidden node again and re-route the links that became visible.
    /// Returns false when the node was not hidden.
    pub fn show_node(&mut self, id: &NodeId) -> bool {
        if !self[id].is_hidden {
            return false;
        }
        self.node_mut(id).is_hidden = false;
        self.touch();

        let links = self.links_touching_subtree(id);
        for link_id in &links {
            if !self.link(link_id).is_routed() && self.is_link_visible(link_id) {
                self.route_link(link_id);
            }
        }
        debug!(node = %self[id].name, links = links.len(), "Showed node");
        true
    }

    /// Remove a link from its endpoints and the store, releasing its lines.
    pub(crate) fn remove_link(&mut self, id: &LinkId) {
        if self.try_link(id).is_none() {
            return;
        }
        self.unroute_link(id, false);
        if let Some(link) = self.take_link(id) {
            self.node_mut(&link.source).source_links.retain(|l| l != id);
            self.node_mut(&link.target).target_links.retain(|l| l != id);
        }
    }

    /// Remove the given links, releasing their lines first.
    pub fn remove_obsolete_links(&mut self, links: &[LinkId]) -> usize {
        let mut removed = 0;
        for id in links {
            if self.try_link(id).is_some() {
                self.remove_link(id);
                removed += 1;
            }
        }
        removed
    }

    /// Links not seen at `stamp`, in id order.
    pub fn obsolete_links(&self, stamp: u64) -> Vec<LinkId> {
        let mut links: Vec<_> = self
            .links()
            .filter(|link| link.stamp != stamp)
            .map(|link| link.id.clone())
            .collect();
        links.sort();
        links
    }

    /// Sweep links and nodes not seen at `stamp`, then re-derive all lines.
    /// Parked routing points of hops whose nodes are gone are dropped too.
    /// Returns `(removed_nodes, removed_links)`.
    pub fn remove_obsolete_nodes_and_links(&mut self, stamp: u64) -> (usize, usize) {
        let link_count = self.link_count();
        let obsolete = self.obsolete_links(stamp);
        self.remove_obsolete_links(&obsolete);
        let removed_nodes = self.remove_obsolete_nodes(stamp);
        let removed_links = link_count - self.link_count();

        let root = self.root_id().clone();
        self.update_lines(&root);
        let pruned = self.prune_parked_points();
        if pruned > 0 {
            debug!(stamp, pruned, "Dropped routing points of removed nodes");
        }
        (removed_nodes, removed_links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dependinator_core::{NodeKind, ParsedNode};

    #[test]
    fn test_link_creates_missing_endpoints() {
        let mut db = ModelDb::default();
        let id = db.add_or_update_link(&ParsedLink::new("A.X", "B.Y")).unwrap();

        let link = db.link(&id).clone();
        let source = db.node_by_name("A.X").unwrap();
        let target = db.node_by_name("B.Y").unwrap();
        assert_eq!(link.source, source.id);
        assert_eq!(link.target, target.id);
        assert_eq!(source.kind, NodeKind::Unresolved);
        assert_eq!(db.node_by_name("A").unwrap().kind, NodeKind::Parent);
        assert_eq!(source.source_links, vec![id.clone()]);
        assert_eq!(target.target_links, vec![id]);
    }

    #[test]
    fn test_duplicate_link_is_idempotent() {
        let mut db = ModelDb::default();
        let parsed = ParsedLink::new("A.B.C", "A.B.D");
        let first = db.add_or_update_link(&parsed).unwrap();
        let second = db.add_or_update_link(&parsed).unwrap();

        assert_eq!(first, second);
        assert_eq!(db.link_count(), 1);
        let line = db.line_between("A.B.C", "A.B.D").unwrap();
        assert_eq!(line.link_count, 1);
    }

    #[test]
    fn test_duplicate_link_refreshes_stamp() {
        let mut db = ModelDb::default();
        let parsed = ParsedLink::new("A", "B");
        let id = db.add_or_update_link(&parsed).unwrap();
        let stamp = db.begin_refresh();
        db.upsert_link(&parsed, stamp);
        assert_eq!(db.link(&id).stamp, stamp);
    }

    #[test]
    fn test_self_link_is_ignored() {
        let mut db = ModelDb::default();
        assert!(db.add_or_update_link(&ParsedLink::new("A", "A")).is_none());
        assert_eq!(db.link_count(), 0);
        assert_eq!(db.node_count(), 1);
    }

    #[test]
    fn test_link_to_hidden_node_is_not_routed() {
        let mut db = ModelDb::default();
        let a = db.add_or_update_node(&ParsedNode::new("N.A", NodeKind::Type));
        db.hide_node(&a);
        let id = db.add_or_update_link(&ParsedLink::new("N.A", "N.B")).unwrap();
        assert!(!db.link(&id).is_routed());
        assert_eq!(db.line_count(), 0);

        db.show_node(&a);
        assert!(db.link(&id).is_routed());
        assert_eq!(db.line_count(), 1);
    }

    #[test]
    fn test_hide_and_show_are_noops_when_repeated() {
        let mut db = ModelDb::default();
        let a = db.add_or_update_node(&ParsedNode::new("A", NodeKind::Type));
        assert!(db.hide_node(&a));
        assert!(!db.hide_node(&a));
        assert!(db.show_node(&a));
        assert!(!db.show_node(&a));
        let root = db.root_id().clone();
        assert!(!db.hide_node(&root));
    }

    #[test]
    fn test_obsolete_links_are_removed_from_endpoints() {
        let mut db = ModelDb::default();
        let first = db.begin_refresh();
        db.upsert_link(&ParsedLink::new("A", "B"), first);
        let kept = db.upsert_link(&ParsedLink::new("A", "C"), first).unwrap();

        let second = db.begin_refresh();
        db.upsert_link(&ParsedLink::new("A", "C"), second);
        let obsolete = db.obsolete_links(second);
        assert_eq!(db.remove_obsolete_links(&obsolete), 1);

        let a = db.node_by_name("A").unwrap();
        assert_eq!(a.source_links, vec![kept]);
        assert!(db.line_between("A", "B").is_none());
        assert!(db.node_by_name("B").unwrap().target_links.is_empty());
    }

    #[test]
    fn test_referenced_placeholder_survives_sweep() {
        let mut db = ModelDb::default();
        let parsed = ParsedLink::new("N.A", "Ext.Lib");
        let first = db.begin_refresh();
        db.upsert_node(&ParsedNode::new("N.A", NodeKind::Type), first);
        db.upsert_link(&parsed, first);

        let second = db.begin_refresh();
        db.upsert_node(&ParsedNode::new("N.A", NodeKind::Type), second);
        db.upsert_link(&parsed, second);
        assert_eq!(db.remove_obsolete_nodes_and_links(second), (0, 0));
        assert_eq!(db.node_by_name("Ext.Lib").unwrap().kind, NodeKind::Unresolved);
        assert!(db.line_between("N", "Ext").is_some());

        let third = db.begin_refresh();
        db.upsert_node(&ParsedNode::new("N.A", NodeKind::Type), third);
        assert_eq!(db.remove_obsolete_nodes_and_links(third), (2, 1));
        assert!(db.node_by_name("Ext").is_none());
        assert_eq!(db.line_count(), 0);
    }

    #[test]
    fn test_sweep_drops_parked_points_of_removed_nodes() {
        let mut db = ModelDb::default();
        let first = db.begin_refresh();
        let a = db.upsert_node(&ParsedNode::new("N.A", NodeKind::Type), first);
        db.upsert_node(&ParsedNode::new("N.B", NodeKind::Type), first);
        db.upsert_link(&ParsedLink::new("N.A", "N.B"), first);
        let line = dependinator_core::LineId::from_names("N.A", "N.B");
        db.set_line_points(&line, vec![dependinator_core::Point::new(1.0, 1.0)]);
        db.hide_node(&a);
        assert!(db.pending_line_points.contains_key(&line));

        let second = db.begin_refresh();
        db.upsert_node(&ParsedNode::new("N.B", NodeKind::Type), second);
        db.remove_obsolete_nodes_and_links(second);
        assert!(db.node_by_name("N.A").is_none());
        assert!(db.pending_line_points.is_empty());
    }
}
