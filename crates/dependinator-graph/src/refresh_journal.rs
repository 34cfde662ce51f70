//! Record of what a running refresh changed, so a failed refresh can be
//! taken back without touching edits made while it ran.

use crate::model_db::ModelDb;
use dependinator_core::{LinkId, NodeId, NodeKind, ParsedItem, ROOT_NAME, Rect, parent_name_of};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// The parser-controlled fields of a node.
#[derive(Debug, Clone, PartialEq)]
struct NodeState {
    parent_name: String,
    kind: NodeKind,
    description: String,
    boundary: Rect,
    container_zoom: f64,
    color: Option<String>,
    background: Option<String>,
}

impl NodeState {
    fn capture(db: &ModelDb, id: &NodeId) -> Option<Self> {
        let node = db.try_node(id)?;
        let parent_name = node
            .parent
            .as_ref()
            .map(|parent| db[parent].name.clone())
            .unwrap_or_default();
        Some(Self {
            parent_name,
            kind: node.kind,
            description: node.description.clone(),
            boundary: node.boundary,
            container_zoom: node.container_zoom,
            color: node.color.clone(),
            background: node.background.clone(),
        })
    }
}

#[derive(Debug)]
struct Touched {
    before: NodeState,
    after: Option<NodeState>,
}

#[derive(Debug, Default)]
pub(crate) struct RefreshJournal {
    created_nodes: HashSet<NodeId>,
    created_links: Vec<LinkId>,
    touched_nodes: HashMap<NodeId, Touched>,
}

impl RefreshJournal {
    pub(crate) fn is_empty(&self) -> bool {
        self.created_nodes.is_empty() && self.created_links.is_empty() && self.touched_nodes.is_empty()
    }
}

/// `name` followed by its implied ancestors, without the root.
fn name_chain(name: &str, chain: &mut Vec<String>) {
    let mut current = name;
    while current != ROOT_NAME {
        chain.push(current.to_string());
        current = parent_name_of(current).0;
    }
}

impl ModelDb {
    /// Nodes an item may create or change: the named nodes, their implied
    /// and explicit parent chains, and the current ancestors of a node that
    /// may move.
    fn nodes_affected_by(&self, item: &ParsedItem) -> Vec<NodeId> {
        let mut names = Vec::new();
        match item {
            ParsedItem::Node(node) => {
                names.push(node.name.clone());
                name_chain(node.resolved_parent_name(), &mut names);
                if let Some(existing) = self.node_by_name(&node.name) {
                    let ancestors = self.ancestor_path(&existing.id);
                    names.extend(ancestors.iter().map(|id| self[id].name.clone()));
                }
            }
            ParsedItem::Link(link) => {
                name_chain(&link.source, &mut names);
                name_chain(&link.target, &mut names);
            }
        }
        let mut seen = HashSet::new();
        names
            .iter()
            .filter(|name| name.as_str() != ROOT_NAME)
            .map(|name| NodeId::from_name(name))
            .filter(|id| seen.insert(id.clone()))
            .collect()
    }

    /// Apply one parser record and note in `journal` what it created or changed.
    pub(crate) fn apply_journaled(
        &mut self,
        item: &ParsedItem,
        stamp: u64,
        journal: &mut RefreshJournal,
    ) {
        let affected: Vec<(NodeId, Option<NodeState>)> = self
            .nodes_affected_by(item)
            .into_iter()
            .map(|id| {
                let state = NodeState::capture(self, &id);
                (id, state)
            })
            .collect();
        let new_link = match item {
            ParsedItem::Link(link) => {
                let id = LinkId::from_names(&link.source, &link.target);
                self.try_link(&id).is_none().then_some(id)
            }
            ParsedItem::Node(_) => None,
        };

        self.apply_parsed_item(item, stamp);

        for (id, before) in affected {
            match before {
                Some(_) if journal.created_nodes.contains(&id) => {}
                Some(before) => {
                    let after = NodeState::capture(self, &id);
                    match journal.touched_nodes.entry(id) {
                        Entry::Occupied(mut entry) => entry.get_mut().after = after,
                        Entry::Vacant(entry) => {
                            entry.insert(Touched { before, after });
                        }
                    }
                }
                None if self.contains_node(&id) => {
                    journal.created_nodes.insert(id);
                }
                None => {}
            }
        }
        if let Some(id) = new_link
            && self.try_link(&id).is_some()
        {
            journal.created_links.push(id);
        }
    }

    /// Take back what a refresh recorded in `journal`. A field is restored
    /// only while it still holds the value the refresh left there, so edits
    /// made in the meantime survive. Created nodes that gained children from
    /// elsewhere are kept.
    pub(crate) fn undo_refresh(&mut self, journal: RefreshJournal) {
        let RefreshJournal {
            created_nodes,
            created_links,
            touched_nodes,
        } = journal;

        let removed_links = self.remove_obsolete_links(&created_links);

        let mut touched: Vec<_> = touched_nodes
            .into_iter()
            .filter(|(id, _)| !created_nodes.contains(id))
            .collect();
        touched.sort_by(|(a, _), (b, _)| a.cmp(b));
        let mut restored = 0;
        for (id, Touched { before, after }) in touched {
            let (Some(current), Some(after)) = (NodeState::capture(self, &id), after) else {
                continue;
            };
            self.restore_node_state(&id, &before, &current, &after);
            restored += 1;
        }

        let mut created: Vec<_> = created_nodes
            .into_iter()
            .filter(|id| self.contains_node(id))
            .map(|id| (self.depth(&id), id))
            .collect();
        created.sort_by(|a, b| b.cmp(a));
        let mut removed_nodes = 0;
        for (_, id) in created {
            if self.try_node(&id).is_some_and(|node| node.children.is_empty()) {
                self.remove_node(&id);
                removed_nodes += 1;
            }
        }

        let root = self.root_id().clone();
        self.update_lines(&root);
        self.touch();
        debug!(removed_nodes, removed_links, restored, "Took back failed refresh");
    }

    fn restore_node_state(
        &mut self,
        id: &NodeId,
        before: &NodeState,
        current: &NodeState,
        after: &NodeState,
    ) {
        if current.parent_name == after.parent_name && before.parent_name != after.parent_name {
            let stamp = self.stamp();
            let parent = self.get_or_create_parent_node_at(&before.parent_name, stamp);
            if !self.is_ancestor_or_self(id, &parent) {
                self.reparent(id, &parent, false);
            }
        }

        let node = self.node_mut(id);
        if current.kind == after.kind {
            node.kind = before.kind;
        }
        if current.description == after.description {
            node.description = before.description.clone();
        }
        if current.boundary == after.boundary {
            node.boundary = before.boundary;
        }
        if current.container_zoom == after.container_zoom {
            node.container_zoom = before.container_zoom;
        }
        if current.color == after.color {
            node.color = before.color.clone();
        }
        if current.background == after.background {
            node.background = before.background.clone();
        }
    }
}
