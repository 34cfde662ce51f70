//! Node lifecycle: creation with parent chains, in-place updates, default
//! layout slots, user edits and the obsolescence sweep.

use crate::model_db::{ModelDb, Node, effective_zoom};
use dependinator_core::{NodeId, NodeKind, ParsedNode, Point, ROOT_NAME, Rect, parent_name_of};
use std::collections::HashSet;
use tracing::{debug, warn};

/// The kind a node ends up with when `incoming` is reported for a node of
/// kind `existing`. Synthesized kinds never replace a parsed one.
fn merge_kind(existing: NodeKind, incoming: NodeKind) -> NodeKind {
    match (existing, incoming) {
        (NodeKind::Root, _) => NodeKind::Root,
        (_, NodeKind::Parent) if existing == NodeKind::Unresolved => NodeKind::Parent,
        (_, incoming) if incoming.is_synthetic() => existing,
        (_, incoming) => incoming,
    }
}

impl ModelDb {
    /// Create or update the node described by `parsed`, tagged with the current stamp.
    pub fn add_or_update_node(&mut self, parsed: &ParsedNode) -> NodeId {
        let stamp = self.stamp();
        self.upsert_node(parsed, stamp)
    }

    /// Create or update the node described by `parsed`, tagged with `stamp`.
    pub fn upsert_node(&mut self, parsed: &ParsedNode, stamp: u64) -> NodeId {
        if parsed.name == ROOT_NAME {
            return self.root_id().clone();
        }

        let id = NodeId::from_name(&parsed.name);
        if self.contains_node(&id) {
            self.update_node(&id, parsed, stamp);
            return id;
        }

        let parent_name = parsed.resolved_parent_name();
        assert!(
            parent_name != parsed.name,
            "model invariant violated: node {} is its own parent",
            parsed.name
        );
        let parent_id = self.get_or_create_parent_node_at(parent_name, stamp);
        assert!(
            !self.contains_node(&id),
            "model invariant violated: node {} is an ancestor of its own parent {parent_name}, a containment cycle",
            parsed.name
        );

        let mut node = Node::new(&parsed.name, parsed.kind, Some(parent_id.clone()), stamp);
        node.description = parsed.description.clone();
        node.boundary = match parsed.boundary() {
            Some(boundary) => boundary,
            None => self.next_child_slot(&parent_id),
        };
        node.container_zoom = parsed.zoom.unwrap_or(self.layout.container_zoom);
        node.color = parsed.color.clone();
        node.background = parsed.background.clone();
        self.attach_new_node(node);
        id
    }

    /// Merge a repeated record into an existing node. Fields the record
    /// leaves unset keep their stored values; an empty description never
    /// clears a stored one.
    fn update_node(&mut self, id: &NodeId, parsed: &ParsedNode, stamp: u64) {
        let parent_name = parsed.resolved_parent_name();
        let current_parent_name = self[id]
            .parent
            .as_ref()
            .map(|parent| self[parent].name.clone())
            .unwrap_or_default();

        let mut changed = false;
        if current_parent_name != parent_name {
            debug!(
                node = %parsed.name,
                from = %current_parent_name,
                to = %parent_name,
                "Moving node to new parent"
            );
            let new_parent = self.get_or_create_parent_node_at(parent_name, stamp);
            self.reparent(id, &new_parent, parsed.boundary().is_none());
            changed = true;
        }

        let node = self.node_mut(id);
        node.stamp = node.stamp.max(stamp);

        let kind = merge_kind(node.kind, parsed.kind);
        if kind != node.kind {
            if !node.kind.is_synthetic() {
                warn!(node = %node.name, from = %node.kind, to = %kind, "Node changed kind");
            }
            node.kind = kind;
            changed = true;
        }
        if !parsed.description.is_empty() && parsed.description != node.description {
            node.description = parsed.description.clone();
            changed = true;
        }
        if let Some(boundary) = parsed.boundary()
            && boundary != node.boundary
        {
            node.boundary = boundary;
            changed = true;
        }
        if let Some(zoom) = parsed.zoom
            && zoom != node.container_zoom
        {
            node.container_zoom = zoom;
            changed = true;
        }
        if parsed.color.is_some() && parsed.color != node.color {
            node.color = parsed.color.clone();
            changed = true;
        }
        if parsed.background.is_some() && parsed.background != node.background {
            node.background = parsed.background.clone();
            changed = true;
        }

        if changed {
            self.touch();
        }
    }

    /// Tag `id` as referenced at `stamp` without touching anything else.
    pub(crate) fn mark_seen(&mut self, id: &NodeId, stamp: u64) {
        let node = self.node_mut(id);
        node.stamp = node.stamp.max(stamp);
    }

    /// Existing node for `name`, or a placeholder created together with its
    /// missing ancestors.
    pub fn get_or_create_node(&mut self, name: &str) -> NodeId {
        let stamp = self.stamp();
        self.get_or_create_node_at(name, stamp)
    }

    pub(crate) fn get_or_create_node_at(&mut self, name: &str, stamp: u64) -> NodeId {
        if name == ROOT_NAME {
            return self.root_id().clone();
        }
        let id = NodeId::from_name(name);
        if self.contains_node(&id) {
            return id;
        }

        let parent_id = self.get_or_create_parent_node_at(parent_name_of(name).0, stamp);
        self.create_child(name, NodeKind::Unresolved, &parent_id, stamp)
    }

    /// Existing node for `name`, or a synthesized parent container. A
    /// placeholder that turns out to have children becomes a parent container.
    pub fn get_or_create_parent_node(&mut self, name: &str) -> NodeId {
        let stamp = self.stamp();
        self.get_or_create_parent_node_at(name, stamp)
    }

    pub(crate) fn get_or_create_parent_node_at(&mut self, name: &str, stamp: u64) -> NodeId {
        if name == ROOT_NAME {
            return self.root_id().clone();
        }
        let id = NodeId::from_name(name);
        if self.contains_node(&id) {
            if self[&id].kind == NodeKind::Unresolved {
                self.node_mut(&id).kind = NodeKind::Parent;
                self.touch();
            }
            return id;
        }

        let parent_id = self.get_or_create_parent_node_at(parent_name_of(name).0, stamp);
        self.create_child(name, NodeKind::Parent, &parent_id, stamp)
    }

    fn create_child(&mut self, name: &str, kind: NodeKind, parent_id: &NodeId, stamp: u64) -> NodeId {
        let mut node = Node::new(name, kind, Some(parent_id.clone()), stamp);
        node.boundary = self.next_child_slot(parent_id);
        node.container_zoom = self.layout.container_zoom;
        let id = node.id.clone();
        self.attach_new_node(node);
        id
    }

    fn attach_new_node(&mut self, node: Node) {
        let id = node.id.clone();
        let parent_id = node.parent.clone();
        if self.add_node(node)
            && let Some(parent_id) = parent_id
        {
            self.node_mut(&parent_id).children.push(id);
        }
    }

    /// Default boundary for the next child of `parent_id`: children are tiled
    /// left to right, top to bottom, in as many columns as fit the parent.
    pub fn next_child_slot(&self, parent_id: &NodeId) -> Rect {
        let parent = &self[parent_id];
        let layout = &self.layout;
        let cell_width = layout.node_width + layout.margin;
        let cell_height = layout.node_height + layout.margin;

        let usable_width = parent.boundary.width / effective_zoom(parent.container_zoom);
        let columns = if cell_width > 0.0 {
            ((usable_width / cell_width).floor() as usize).max(1)
        } else {
            1
        };

        let index = parent.children.len();
        let column = (index % columns) as f64;
        let row = (index / columns) as f64;
        Rect::new(
            layout.margin + column * cell_width,
            layout.margin + row * cell_height,
            layout.node_width,
            layout.node_height,
        )
    }

    pub(crate) fn reparent(&mut self, id: &NodeId, new_parent: &NodeId, assign_slot: bool) {
        assert!(
            !self.is_ancestor_or_self(id, new_parent),
            "model invariant violated: moving {} below {} creates a containment cycle",
            self[id].name,
            self[new_parent].name
        );

        let old_parent = self[id].parent.clone();
        if let Some(old_parent) = &old_parent {
            self.node_mut(old_parent).children.retain(|child| child != id);
        }
        let slot = assign_slot.then(|| self.next_child_slot(new_parent));
        self.node_mut(new_parent).children.push(id.clone());
        let node = self.node_mut(id);
        node.parent = Some(new_parent.clone());
        if let Some(slot) = slot {
            node.boundary = slot;
        }
        self.touch();

        // Hop chains of every link in the moved subtree depend on the hierarchy.
        self.update_lines(id);
        if let Some(old_parent) = old_parent {
            self.release_synthetic_chain(old_parent);
        }
    }

    /// Remove synthesized containers a move left empty, walking up from `id`.
    /// An emptied container that is still a link endpoint becomes a plain
    /// placeholder, as if the moved child had never been seen under it.
    fn release_synthetic_chain(&mut self, id: NodeId) {
        let mut current = id;
        loop {
            let node = &self[&current];
            if node.is_root() || !node.kind.is_synthetic() || !node.children.is_empty() {
                return;
            }
            if !node.source_links.is_empty() || !node.target_links.is_empty() {
                if node.kind == NodeKind::Parent {
                    self.node_mut(&current).kind = NodeKind::Unresolved;
                    self.touch();
                }
                return;
            }
            let parent = node.parent.clone();
            debug!(node = %node.name, "Removing emptied synthetic container");
            self.remove_node(&current);
            match parent {
                Some(parent) => current = parent,
                None => return,
            }
        }
    }

    // User edits

    pub fn set_node_boundary(&mut self, id: &NodeId, boundary: Rect) {
        let node = self.node_mut(id);
        if node.boundary == boundary {
            return;
        }
        node.boundary = boundary;
        node.is_modified = true;
        self.touch();
    }

    pub fn move_node(&mut self, id: &NodeId, offset: Point) {
        let boundary = self[id].boundary.translate(offset.x, offset.y);
        self.set_node_boundary(id, boundary);
    }

    pub fn set_container_zoom(&mut self, id: &NodeId, zoom: f64) {
        let zoom = effective_zoom(zoom);
        let node = self.node_mut(id);
        if node.container_zoom == zoom {
            return;
        }
        node.container_zoom = zoom;
        node.is_modified = true;
        self.touch();
    }

    pub fn set_node_color(&mut self, id: &NodeId, color: Option<String>, background: Option<String>) {
        let node = self.node_mut(id);
        if node.color == color && node.background == background {
            return;
        }
        node.color = color;
        node.background = background;
        node.is_modified = true;
        self.touch();
    }

    pub fn set_node_selected(&mut self, id: &NodeId, selected: bool) {
        let node = self.node_mut(id);
        if node.is_selected != selected {
            node.is_selected = selected;
            self.touch();
        }
    }

    // Removal

    /// Remove `id` and its whole subtree, deepest nodes first, with every
    /// link touching them. Returns the number of removed nodes.
    pub(crate) fn remove_subtree(&mut self, id: &NodeId) -> usize {
        let subtree = self.subtree(id);
        for node_id in subtree.iter().rev() {
            self.remove_node(node_id);
        }
        subtree.len()
    }

    /// Remove a childless node together with its links and detach it from its parent.
    pub(crate) fn remove_node(&mut self, id: &NodeId) {
        let node = &self[id];
        assert!(!node.is_root(), "model invariant violated: the root cannot be removed");
        assert!(
            node.children.is_empty(),
            "model invariant violated: removing node {} that still has children",
            node.name
        );

        let links: Vec<_> = node
            .source_links
            .iter()
            .chain(node.target_links.iter())
            .cloned()
            .collect();
        for link_id in links {
            self.remove_link(&link_id);
        }

        let node = &self[id];
        let lines: Vec<_> = node
            .source_lines
            .iter()
            .chain(node.target_lines.iter())
            .cloned()
            .collect();
        for line_id in lines {
            warn!(line = %line_id, node = %self[id].name, "Removing line left on removed node");
            self.remove_line(&line_id);
        }

        if let Some(node) = self.take_node(id)
            && let Some(parent) = node.parent
        {
            self.node_mut(&parent).children.retain(|child| child != id);
        }
    }

    /// Two-phase sweep of nodes not seen at `stamp`.
    ///
    /// Phase one removes stale nodes that are not namespace-like and have no
    /// descendant seen at `stamp`. Phase two removes stale namespace-like
    /// nodes, deepest first, once they have no children left.
    pub fn remove_obsolete_nodes(&mut self, stamp: u64) -> usize {
        let root = self.root_id().clone();

        let mut live: HashSet<NodeId> = HashSet::new();
        for node in self.nodes().filter(|node| node.stamp == stamp) {
            let mut current = Some(&node.id);
            while let Some(node_id) = current {
                if !live.insert(node_id.clone()) {
                    break;
                }
                current = self[node_id].parent.as_ref();
            }
        }

        let mut stale: Vec<(usize, NodeId)> = self
            .nodes()
            .filter(|node| node.id != root && node.stamp != stamp)
            .map(|node| (self.depth(&node.id), node.id.clone()))
            .collect();
        // Deepest first; ties by id keep the sweep deterministic.
        stale.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let mut removed = 0;
        for (_, id) in &stale {
            let Some(node) = self.try_node(id) else {
                continue;
            };
            if node.kind.is_namespace_like() || live.contains(id) {
                continue;
            }
            removed += self.remove_subtree(id);
        }

        for (_, id) in &stale {
            let Some(node) = self.try_node(id) else {
                continue;
            };
            if node.kind.is_namespace_like() && node.children.is_empty() {
                self.remove_node(id);
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(stamp, removed, "Removed obsolete nodes");
        }
        removed
    }
}
