//! The authoritative store of nodes, links and lines.
//!
//! Entities live in maps keyed by their name-derived identifiers; every
//! reference between them (parent, children, link endpoints, line owners) is
//! an identifier looked up through the store. All mutation happens while the
//! caller holds the lock of a [`SharedModel`].

use crate::settings::LayoutSettings;
use dependinator_core::{LineId, LinkId, NodeId, NodeKind, Point, ROOT_NAME, Rect};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Index;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
    pub description: String,

    // Layout, in the parent's child coordinates
    pub boundary: Rect,
    /// Scale applied to children relative to this node.
    pub container_zoom: f64,
    pub color: Option<String>,
    pub background: Option<String>,

    pub is_selected: bool,
    pub is_hidden: bool,
    pub is_modified: bool,
    pub stamp: u64,

    pub children: Vec<NodeId>,
    pub source_links: Vec<LinkId>,
    pub target_links: Vec<LinkId>,
    pub source_lines: Vec<LineId>,
    pub target_lines: Vec<LineId>,
}

impl Node {
    pub(crate) fn new(name: &str, kind: NodeKind, parent: Option<NodeId>, stamp: u64) -> Self {
        Self {
            id: NodeId::from_name(name),
            name: name.to_string(),
            parent,
            kind,
            description: String::new(),
            boundary: Rect::EMPTY,
            container_zoom: 1.0,
            color: None,
            background: None,
            is_selected: false,
            is_hidden: false,
            is_modified: false,
            stamp,
            children: Vec::new(),
            source_links: Vec::new(),
            target_links: Vec::new(),
            source_lines: Vec::new(),
            target_lines: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn short_name(&self) -> &str {
        dependinator_core::parent_name_of(&self.name).1
    }

    /// The area available to children, in child coordinates.
    pub fn child_area(&self) -> Rect {
        let zoom = effective_zoom(self.container_zoom);
        Rect::new(0.0, 0.0, self.boundary.width / zoom, self.boundary.height / zoom)
    }
}

pub(crate) fn effective_zoom(zoom: f64) -> f64 {
    if zoom.is_finite() && zoom > 0.0 { zoom } else { 1.0 }
}

/// One directed reference between two nodes, as reported by a parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub source: NodeId,
    pub target: NodeId,
    pub stamp: u64,
    /// Lines this link currently routes through, empty while hidden.
    pub lines: Vec<LineId>,
}

impl Link {
    pub fn is_routed(&self) -> bool {
        !self.lines.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineStroke {
    Solid,
    /// At least one end is a placeholder no parsed record described.
    Dashed,
}

/// A rendered edge between two nodes that share an owning container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub id: LineId,
    pub source: NodeId,
    pub target: NodeId,
    pub owner: NodeId,
    pub link_count: usize,
    /// Manually placed interior points, in the owner's child coordinates.
    pub points: Vec<Point>,
}

impl Line {
    pub fn stroke_width(&self) -> f64 {
        1.0 + (self.link_count.max(1) as f64).log2().min(4.0)
    }
}

/// Routing points of an underived line, kept with the names of its ends so
/// they are saved with the model.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParkedPoints {
    pub source: String,
    pub target: String,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStats {
    pub node_count: usize,
    pub link_count: usize,
    pub line_count: usize,
    pub stamp: u64,
    pub generation: u64,
}

#[derive(Debug, Clone)]
pub struct ModelDb {
    nodes: HashMap<NodeId, Node>,
    links: HashMap<LinkId, Link>,
    lines: HashMap<LineId, Line>,
    root_id: NodeId,
    stamp: u64,
    generation: u64,
    pub(crate) layout: LayoutSettings,
    /// Routing points of lines whose hop is not derived right now.
    pub(crate) pending_line_points: HashMap<LineId, ParkedPoints>,
}

impl Default for ModelDb {
    fn default() -> Self {
        Self::new(LayoutSettings::default())
    }
}

impl ModelDb {
    pub fn new(layout: LayoutSettings) -> Self {
        let mut db = Self {
            nodes: HashMap::new(),
            links: HashMap::new(),
            lines: HashMap::new(),
            root_id: NodeId::root(),
            stamp: 0,
            generation: 0,
            layout,
            pending_line_points: HashMap::new(),
        };
        db.insert_root();
        db
    }

    fn insert_root(&mut self) {
        let mut root = Node::new(ROOT_NAME, NodeKind::Root, None, self.stamp);
        root.boundary = Rect::new(0.0, 0.0, self.layout.root_width, self.layout.root_height);
        self.root_id = root.id.clone();
        self.nodes.insert(root.id.clone(), root);
    }

    /// Reset to just the root node. Stamp and generation keep increasing.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.links.clear();
        self.lines.clear();
        self.pending_line_points.clear();
        self.insert_root();
        self.touch();
    }

    pub fn root_id(&self) -> &NodeId {
        &self.root_id
    }

    pub fn root(&self) -> &Node {
        &self[&self.root_id]
    }

    /// The stamp of the most recently started refresh.
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    /// Start a new refresh operation and return its stamp.
    pub fn begin_refresh(&mut self) -> u64 {
        self.stamp += 1;
        self.stamp
    }

    /// Counter bumped by every mutation; a changed value means the model is dirty.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn touch(&mut self) {
        self.generation += 1;
    }

    pub fn stats(&self) -> ModelStats {
        ModelStats {
            node_count: self.nodes.len(),
            link_count: self.links.len(),
            line_count: self.lines.len(),
            stamp: self.stamp,
            generation: self.generation,
        }
    }

    // Nodes

    pub fn try_node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.get(&NodeId::from_name(name))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn node_mut(&mut self, id: &NodeId) -> &mut Node {
        match self.nodes.get_mut(id) {
            Some(node) => node,
            None => panic!("model invariant violated: node {id} is not in the model"),
        }
    }

    /// Insert a node; a node with the same id already present wins.
    pub(crate) fn add_node(&mut self, node: Node) -> bool {
        if self.nodes.contains_key(&node.id) {
            return false;
        }
        self.nodes.insert(node.id.clone(), node);
        self.touch();
        true
    }

    pub(crate) fn take_node(&mut self, id: &NodeId) -> Option<Node> {
        let node = self.nodes.remove(id);
        if node.is_some() {
            self.touch();
        }
        node
    }

    // Links

    pub fn link(&self, id: &LinkId) -> &Link {
        match self.links.get(id) {
            Some(link) => link,
            None => panic!("model invariant violated: link {id} is not in the model"),
        }
    }

    pub fn try_link(&self, id: &LinkId) -> Option<&Link> {
        self.links.get(id)
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub(crate) fn link_mut(&mut self, id: &LinkId) -> &mut Link {
        match self.links.get_mut(id) {
            Some(link) => link,
            None => panic!("model invariant violated: link {id} is not in the model"),
        }
    }

    pub(crate) fn try_link_mut(&mut self, id: &LinkId) -> Option<&mut Link> {
        self.links.get_mut(id)
    }

    pub(crate) fn add_link(&mut self, link: Link) -> bool {
        if self.links.contains_key(&link.id) {
            return false;
        }
        self.links.insert(link.id.clone(), link);
        self.touch();
        true
    }

    pub(crate) fn take_link(&mut self, id: &LinkId) -> Option<Link> {
        let link = self.links.remove(id);
        if link.is_some() {
            self.touch();
        }
        link
    }

    // Lines

    pub fn line(&self, id: &LineId) -> &Line {
        match self.lines.get(id) {
            Some(line) => line,
            None => panic!("model invariant violated: line {id} is not in the model"),
        }
    }

    pub fn try_line(&self, id: &LineId) -> Option<&Line> {
        self.lines.get(id)
    }

    pub fn line_between(&self, source_name: &str, target_name: &str) -> Option<&Line> {
        self.lines.get(&LineId::from_names(source_name, target_name))
    }

    pub fn lines(&self) -> impl Iterator<Item = &Line> {
        self.lines.values()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub(crate) fn line_mut(&mut self, id: &LineId) -> &mut Line {
        match self.lines.get_mut(id) {
            Some(line) => line,
            None => panic!("model invariant violated: line {id} is not in the model"),
        }
    }

    pub(crate) fn lines_mut(&mut self) -> impl Iterator<Item = &mut Line> {
        self.lines.values_mut()
    }

    pub(crate) fn add_line(&mut self, line: Line) -> bool {
        if self.lines.contains_key(&line.id) {
            return false;
        }
        self.lines.insert(line.id.clone(), line);
        self.touch();
        true
    }

    pub(crate) fn take_line(&mut self, id: &LineId) -> Option<Line> {
        let line = self.lines.remove(id);
        if line.is_some() {
            self.touch();
        }
        line
    }

    pub fn line_stroke(&self, line: &Line) -> LineStroke {
        let placeholder = |id: &NodeId| {
            self.try_node(id)
                .is_some_and(|node| node.kind == NodeKind::Unresolved)
        };
        if placeholder(&line.source) || placeholder(&line.target) {
            LineStroke::Dashed
        } else {
            LineStroke::Solid
        }
    }

    // Hierarchy helpers

    /// Ancestors of `id` from the topmost node below the root down to `id`
    /// itself. The root is never part of the path.
    pub fn ancestor_path(&self, id: &NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &self[node_id];
            if node.is_root() {
                break;
            }
            path.push(node_id.clone());
            assert!(
                path.len() <= self.nodes.len(),
                "model invariant violated: containment cycle at node {}",
                node.name
            );
            current = node.parent.as_ref();
        }
        path.reverse();
        path
    }

    pub fn depth(&self, id: &NodeId) -> usize {
        self.ancestor_path(id).len()
    }

    /// Whether `ancestor` is `id` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: &NodeId, id: &NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            if node_id == ancestor {
                return true;
            }
            current = self[node_id].parent.as_ref();
        }
        false
    }

    /// `id` and all of its descendants, parents before children.
    pub fn subtree(&self, id: &NodeId) -> Vec<NodeId> {
        let mut result = vec![id.clone()];
        let mut index = 0;
        while index < result.len() {
            let children = self[&result[index]].children.clone();
            result.extend(children);
            index += 1;
        }
        result
    }

    /// Hidden itself or below a hidden ancestor.
    pub fn is_effectively_hidden(&self, id: &NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &self[node_id];
            if node.is_hidden {
                return true;
            }
            current = node.parent.as_ref();
        }
        false
    }
}

/// Looking up a missing node through indexing is a broken invariant.
impl Index<&NodeId> for ModelDb {
    type Output = Node;
    fn index(&self, id: &NodeId) -> &Self::Output {
        match self.nodes.get(id) {
            Some(node) => node,
            None => panic!("model invariant violated: node {id} is not in the model"),
        }
    }
}

/// The model store behind its single writer lock.
///
/// Cloning shares the same store. The lock is released when the guard or
/// closure scope ends, including on panic.
#[derive(Debug, Clone, Default)]
pub struct SharedModel {
    db: Arc<Mutex<ModelDb>>,
}

impl SharedModel {
    pub fn new(db: ModelDb) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, ModelDb> {
        self.db.lock()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut ModelDb) -> R) -> R {
        let mut guard = self.db.lock();
        f(&mut guard)
    }

    pub fn read<R>(&self, f: impl FnOnce(&ModelDb) -> R) -> R {
        let guard = self.db.lock();
        f(&guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_model_has_only_root() {
        let db = ModelDb::default();
        assert_eq!(db.node_count(), 1);
        assert!(db.root().is_root());
        assert_eq!(db.root().kind, NodeKind::Root);
        assert!(db.ancestor_path(db.root_id()).is_empty());
    }

    #[test]
    fn test_add_node_is_noop_for_existing_id() {
        let mut db = ModelDb::default();
        let root = db.root_id().clone();
        let first = Node::new("A", NodeKind::Type, Some(root.clone()), 0);
        let mut second = Node::new("A", NodeKind::Member, Some(root), 0);
        second.description = "other".to_string();

        assert!(db.add_node(first));
        let generation = db.generation();
        assert!(!db.add_node(second));
        assert_eq!(db.generation(), generation);
        assert_eq!(db[&NodeId::from_name("A")].kind, NodeKind::Type);
    }

    #[test]
    fn test_try_node_never_panics_on_miss() {
        let db = ModelDb::default();
        assert!(db.try_node(&NodeId::from_name("missing")).is_none());
    }

    #[test]
    #[should_panic(expected = "model invariant violated")]
    fn test_index_panics_on_missing_node() {
        let db = ModelDb::default();
        let _ = &db[&NodeId::from_name("missing")];
    }

    #[test]
    fn test_clear_keeps_stamp_and_bumps_generation() {
        let mut db = ModelDb::default();
        let stamp = db.begin_refresh();
        let root = db.root_id().clone();
        db.add_node(Node::new("A", NodeKind::Type, Some(root), stamp));
        let generation = db.generation();

        db.clear();
        assert_eq!(db.node_count(), 1);
        assert_eq!(db.stamp(), stamp);
        assert!(db.generation() > generation);
    }

    #[test]
    fn test_shared_model_clones_share_store() {
        let model = SharedModel::new(ModelDb::default());
        let other = model.clone();
        model.with(|db| {
            db.begin_refresh();
        });
        assert_eq!(other.read(|db| db.stamp()), 1);
    }
}
