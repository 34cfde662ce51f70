//! Routing of links into lines.
//!
//! A link between two nodes is drawn as a chain of hops, each hop connecting
//! two nodes that are drawn inside the same container (the hop owner). Hops
//! climb from the source up to the first level it shares with the target,
//! cross over, and descend to the target. Every hop is a [`Line`] shared by
//! all links passing through it; a line lives while at least one visible link
//! uses it.

use crate::model_db::{Line, ModelDb, ParkedPoints};
use dependinator_core::{LineId, LinkId, NodeId, Point};
use tracing::{debug, trace};

impl ModelDb {
    /// The hops a link from `source` to `target` is drawn with, in order.
    /// A link from a node to itself has no hops.
    pub fn link_segments(&self, source: &NodeId, target: &NodeId) -> Vec<(NodeId, NodeId)> {
        if source == target {
            return Vec::new();
        }

        let source_path = self.ancestor_path(source);
        let target_path = self.ancestor_path(target);
        let shared = source_path
            .iter()
            .zip(target_path.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let path: Vec<NodeId> = if shared == source_path.len() {
            // The source contains the target, or is the root
            std::iter::once(source.clone())
                .chain(target_path[shared..].iter().cloned())
                .collect()
        } else if shared == target_path.len() {
            // The target contains the source
            source_path[shared..]
                .iter()
                .rev()
                .cloned()
                .chain(std::iter::once(target.clone()))
                .collect()
        } else {
            source_path[shared..]
                .iter()
                .rev()
                .chain(target_path[shared..].iter())
                .cloned()
                .collect()
        };

        path.windows(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect()
    }

    /// The container a hop from `source` to `target` is drawn in.
    pub fn hop_owner(&self, source: &NodeId, target: &NodeId) -> NodeId {
        if self[target].parent.as_ref() == Some(source) {
            return source.clone();
        }
        match &self[source].parent {
            Some(parent) => parent.clone(),
            None => source.clone(),
        }
    }

    /// Add the link's hops to the line store, creating lines on first use.
    pub(crate) fn route_link(&mut self, id: &LinkId) {
        let link = self.link(id);
        debug_assert!(!link.is_routed(), "link {id} is already routed");
        let segments = self.link_segments(&link.source, &link.target);

        let mut lines = Vec::with_capacity(segments.len());
        for (source, target) in segments {
            lines.push(self.acquire_line(&source, &target));
        }
        trace!(link = %id, hops = lines.len(), "Routed link");
        self.link_mut(id).lines = lines;
    }

    fn acquire_line(&mut self, source: &NodeId, target: &NodeId) -> LineId {
        let id = LineId::from_names(&self[source].name, &self[target].name);
        if let Some(line) = self.try_line(&id) {
            let count = line.link_count + 1;
            self.line_mut(&id).link_count = count;
            return id;
        }

        let owner = self.hop_owner(source, target);
        let points = self
            .pending_line_points
            .remove(&id)
            .map(|parked| parked.points)
            .unwrap_or_default();
        self.add_line(Line {
            id: id.clone(),
            source: source.clone(),
            target: target.clone(),
            owner,
            link_count: 1,
            points,
        });
        self.node_mut(source).source_lines.push(id.clone());
        self.node_mut(target).target_lines.push(id.clone());
        id
    }

    /// Release the link's hops. Lines no other link uses are removed; with
    /// `keep_points` their routing points are remembered for when the same
    /// hop is derived again.
    pub(crate) fn unroute_link(&mut self, id: &LinkId, keep_points: bool) {
        let lines = std::mem::take(&mut self.link_mut(id).lines);
        for line_id in lines {
            let Some(line) = self.try_line(&line_id) else {
                continue;
            };
            if line.link_count > 1 {
                let count = line.link_count - 1;
                self.line_mut(&line_id).link_count = count;
                continue;
            }
            if let Some(line) = self.remove_line(&line_id)
                && keep_points
            {
                self.park_points(line);
            }
        }
    }

    /// Keep the routing points of a released line until its hop is derived again.
    fn park_points(&mut self, line: Line) {
        if line.points.is_empty() {
            return;
        }
        let (Some(source), Some(target)) = (self.try_node(&line.source), self.try_node(&line.target))
        else {
            return;
        };
        let parked = ParkedPoints {
            source: source.name.clone(),
            target: target.name.clone(),
            points: line.points,
        };
        self.pending_line_points.insert(line.id, parked);
    }

    /// Forget parked points whose end nodes no longer exist. Returns how many
    /// were dropped.
    pub(crate) fn prune_parked_points(&mut self) -> usize {
        let stale: Vec<LineId> = self
            .pending_line_points
            .iter()
            .filter(|(_, parked)| {
                self.node_by_name(&parked.source).is_none() || self.node_by_name(&parked.target).is_none()
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            self.pending_line_points.remove(id);
        }
        stale.len()
    }

    /// Remove a line and detach it from its end nodes.
    pub(crate) fn remove_line(&mut self, id: &LineId) -> Option<Line> {
        let line = self.take_line(id)?;
        if self.contains_node(&line.source) {
            self.node_mut(&line.source).source_lines.retain(|l| l != id);
        }
        if self.contains_node(&line.target) {
            self.node_mut(&line.target).target_lines.retain(|l| l != id);
        }
        Some(line)
    }

    /// Re-derive the lines of every link touching the subtree of `id`.
    ///
    /// For the root this rebuilds all line reference counts from scratch and
    /// drops lines no visible link uses any longer.
    pub fn update_lines(&mut self, id: &NodeId) {
        if id == self.root_id() {
            self.rebuild_lines();
            return;
        }

        let links = self.links_touching_subtree(id);
        for link_id in &links {
            if self.link(link_id).is_routed() {
                self.unroute_link(link_id, true);
            }
        }
        for link_id in &links {
            if self.is_link_visible(link_id) {
                self.route_link(link_id);
            }
        }
        self.touch();
    }

    fn rebuild_lines(&mut self) {
        for line in self.lines_mut() {
            line.link_count = 0;
        }
        let mut links: Vec<LinkId> = self.links().map(|link| link.id.clone()).collect();
        links.sort();
        for link_id in &links {
            self.link_mut(link_id).lines.clear();
        }

        for link_id in &links {
            if self.is_link_visible(link_id) {
                self.route_link(link_id);
            }
        }

        let mut unused: Vec<LineId> = self
            .lines()
            .filter(|line| line.link_count == 0)
            .map(|line| line.id.clone())
            .collect();
        unused.sort();
        for line_id in &unused {
            if let Some(line) = self.remove_line(line_id) {
                self.park_points(line);
            }
        }
        debug!(
            links = links.len(),
            lines = self.line_count(),
            removed_lines = unused.len(),
            "Rebuilt lines"
        );
        self.touch();
    }

    /// Set the manually placed interior points of a line. Returns false
    /// when no such line exists.
    pub fn set_line_points(&mut self, id: &LineId, points: Vec<Point>) -> bool {
        let Some(line) = self.try_line(id) else {
            return false;
        };
        if line.points == points {
            return true;
        }
        self.line_mut(id).points = points;
        self.touch();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dependinator_core::{NodeKind, ParsedLink, ParsedNode};

    fn hop_names(db: &ModelDb, source: &str, target: &str) -> Vec<(String, String)> {
        let source = db.node_by_name(source).unwrap().id.clone();
        let target = db.node_by_name(target).unwrap().id.clone();
        db.link_segments(&source, &target)
            .into_iter()
            .map(|(a, b)| (db[&a].name.clone(), db[&b].name.clone()))
            .collect()
    }

    fn pair(a: &str, b: &str) -> (String, String) {
        (a.to_string(), b.to_string())
    }

    fn model_with(names: &[&str]) -> ModelDb {
        let mut db = ModelDb::default();
        for name in names {
            db.add_or_update_node(&ParsedNode::new(*name, NodeKind::Type));
        }
        db
    }

    #[test]
    fn test_siblings_have_one_hop() {
        let db = model_with(&["A.B.C", "A.B.D"]);
        assert_eq!(hop_names(&db, "A.B.C", "A.B.D"), vec![pair("A.B.C", "A.B.D")]);
    }

    #[test]
    fn test_parent_and_child_have_one_hop() {
        let db = model_with(&["A.B"]);
        assert_eq!(hop_names(&db, "A", "A.B"), vec![pair("A", "A.B")]);
        assert_eq!(hop_names(&db, "A.B", "A"), vec![pair("A.B", "A")]);
    }

    #[test]
    fn test_descendant_hops_pass_each_level() {
        let db = model_with(&["A.B.C"]);
        assert_eq!(
            hop_names(&db, "A", "A.B.C"),
            vec![pair("A", "A.B"), pair("A.B", "A.B.C")]
        );
        assert_eq!(
            hop_names(&db, "A.B.C", "A"),
            vec![pair("A.B.C", "A.B"), pair("A.B", "A")]
        );
    }

    #[test]
    fn test_cousins_climb_cross_and_descend() {
        let db = model_with(&["A.X", "B.Y"]);
        assert_eq!(
            hop_names(&db, "A.X", "B.Y"),
            vec![pair("A.X", "A"), pair("A", "B"), pair("B", "B.Y")]
        );
    }

    #[test]
    fn test_self_link_has_no_hops() {
        let db = model_with(&["A"]);
        assert!(hop_names(&db, "A", "A").is_empty());
    }

    #[test]
    fn test_hop_owners() {
        let db = model_with(&["A.X", "B.Y"]);
        let id = |name: &str| db.node_by_name(name).unwrap().id.clone();
        assert_eq!(db.hop_owner(&id("A.X"), &id("A")), id("A"));
        assert_eq!(db.hop_owner(&id("A"), &id("B")), *db.root_id());
        assert_eq!(db.hop_owner(&id("B"), &id("B.Y")), id("B"));
    }

    #[test]
    fn test_lines_are_shared_and_counted() {
        let mut db = ModelDb::default();
        db.add_or_update_link(&ParsedLink::new("A.X", "B.Y"));
        db.add_or_update_link(&ParsedLink::new("A.Z", "B.Y"));

        assert_eq!(db.line_between("A", "B").unwrap().link_count, 2);
        assert_eq!(db.line_between("B", "B.Y").unwrap().link_count, 2);
        assert_eq!(db.line_between("A.X", "A").unwrap().link_count, 1);
        assert_eq!(db.line_count(), 4);

        let a = db.node_by_name("A").unwrap();
        assert_eq!(a.source_lines, vec![LineId::from_names("A", "B")]);
    }

    #[test]
    fn test_hiding_and_showing_restores_lines_and_points() {
        let mut db = ModelDb::default();
        let link = db.add_or_update_link(&ParsedLink::new("N.A", "N.B")).unwrap();
        let line = LineId::from_names("N.A", "N.B");
        let points = vec![Point::new(10.0, 20.0)];
        assert!(db.set_line_points(&line, points.clone()));

        let a = db.node_by_name("N.A").unwrap().id.clone();
        db.hide_node(&a);
        assert!(db.try_line(&line).is_none());
        assert!(db.node_by_name("N.B").unwrap().target_lines.is_empty());

        db.show_node(&a);
        assert!(db.link(&link).is_routed());
        assert_eq!(db.line(&line).points, points);
    }

    #[test]
    fn test_hiding_container_hides_descendant_links() {
        let mut db = ModelDb::default();
        db.add_or_update_link(&ParsedLink::new("A.X", "B.Y"));
        let a = db.node_by_name("A").unwrap().id.clone();
        db.hide_node(&a);
        assert_eq!(db.line_count(), 0);
        assert_eq!(db.link_count(), 1);
    }

    #[test]
    fn test_update_lines_from_root_is_stable() {
        let mut db = ModelDb::default();
        db.add_or_update_link(&ParsedLink::new("A.X", "B.Y"));
        db.add_or_update_link(&ParsedLink::new("A.X", "A.Z"));
        let mut before: Vec<_> = db.lines().cloned().collect();
        before.sort_by(|a, b| a.id.cmp(&b.id));

        let root = db.root_id().clone();
        db.update_lines(&root);
        let mut after: Vec<_> = db.lines().cloned().collect();
        after.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(before, after);
    }

    #[test]
    fn test_moving_node_reroutes_its_links() {
        let mut db = ModelDb::default();
        db.add_or_update_link(&ParsedLink::new("N.A", "N.B"));
        db.add_or_update_node(&ParsedNode::new("N.A", NodeKind::Type).with_parent("M"));

        assert!(db.line_between("N.A", "N.B").is_none());
        assert!(db.line_between("N.A", "M").is_some());
        assert!(db.line_between("M", "N").is_some());
        assert!(db.line_between("N", "N.B").is_some());
    }

    #[test]
    fn test_set_points_on_missing_line() {
        let mut db = ModelDb::default();
        assert!(!db.set_line_points(&LineId::from_names("A", "B"), vec![]));
    }
}
