//! Copying the model out as persistable items, and loading it back.
//!
//! Saving must not hold the model lock for long: the writer copies the model
//! in small batches, releasing the lock in between, and starts over when the
//! model changed while it was copying.

use crate::model_db::{ModelDb, ParkedPoints, SharedModel};
use crate::settings::SnapshotSettings;
use dependinator_core::{
    LineId, LineItem, LinkId, LinkItem, ModelItem, NodeId, NodeItem, ParsedLink, ROOT_NAME,
};
use std::thread;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("model kept changing during {attempts} snapshot attempts")]
    Busy { attempts: u32 },
}

enum EntityKey {
    Node(NodeId),
    Link(LinkId),
    Line(LineId),
    ParkedLine(LineId),
}

impl ModelDb {
    fn snapshot_keys(&self) -> Vec<EntityKey> {
        let mut nodes: Vec<(usize, &str, NodeId)> = self
            .nodes()
            .filter(|node| !node.is_root())
            .map(|node| (self.depth(&node.id), node.name.as_str(), node.id.clone()))
            .collect();
        nodes.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

        let mut links: Vec<LinkId> = self.links().map(|link| link.id.clone()).collect();
        links.sort();
        let mut lines: Vec<LineId> = self.lines().map(|line| line.id.clone()).collect();
        lines.sort();
        // Bends of lines hidden right now are saved too.
        let mut parked: Vec<LineId> = self
            .pending_line_points
            .keys()
            .filter(|id| self.try_line(id).is_none())
            .cloned()
            .collect();
        parked.sort();

        nodes
            .into_iter()
            .map(|(_, _, id)| EntityKey::Node(id))
            .chain(links.into_iter().map(EntityKey::Link))
            .chain(lines.into_iter().map(EntityKey::Line))
            .chain(parked.into_iter().map(EntityKey::ParkedLine))
            .collect()
    }

    fn snapshot_item(&self, key: &EntityKey) -> Option<ModelItem> {
        match key {
            EntityKey::Node(id) => {
                let node = self.try_node(id)?;
                let parent_name = node
                    .parent
                    .as_ref()
                    .map(|parent| self[parent].name.clone())
                    .unwrap_or_default();
                Some(ModelItem::Node(NodeItem {
                    name: node.name.clone(),
                    parent_name,
                    kind: node.kind,
                    description: node.description.clone(),
                    boundary: node.boundary,
                    zoom: node.container_zoom,
                    color: node.color.clone(),
                    background: node.background.clone(),
                    is_modified: node.is_modified,
                    is_hidden: node.is_hidden,
                }))
            }
            EntityKey::Link(id) => {
                let link = self.try_link(id)?;
                Some(ModelItem::Link(LinkItem {
                    source: self[&link.source].name.clone(),
                    target: self[&link.target].name.clone(),
                }))
            }
            EntityKey::Line(id) => {
                let line = self.try_line(id)?;
                Some(ModelItem::Line(LineItem {
                    source: self[&line.source].name.clone(),
                    target: self[&line.target].name.clone(),
                    points: line.points.clone(),
                }))
            }
            EntityKey::ParkedLine(id) => {
                let parked = self.pending_line_points.get(id)?;
                Some(ModelItem::Line(LineItem {
                    source: parked.source.clone(),
                    target: parked.target.clone(),
                    points: parked.points.clone(),
                }))
            }
        }
    }

    /// The whole model as persistable items: nodes parents first, then links,
    /// then lines.
    pub fn to_items(&self) -> Vec<ModelItem> {
        self.snapshot_keys()
            .iter()
            .filter_map(|key| self.snapshot_item(key))
            .collect()
    }

    /// Replace the content with persisted items.
    ///
    /// Items are applied nodes first, then links, then lines, whatever order
    /// they come in. Points of lines that are not derived (yet) are kept until
    /// the router creates them.
    pub fn load_items(&mut self, items: &[ModelItem]) {
        self.clear();
        let stamp = self.begin_refresh();

        let mut ordered: Vec<&ModelItem> = items.iter().collect();
        ordered.sort_by_key(|item| item.load_rank());

        for item in ordered {
            match item {
                ModelItem::Node(item) => {
                    if item.name == ROOT_NAME {
                        continue;
                    }
                    let id = self.upsert_node(&item.to_parsed(), stamp);
                    let node = self.node_mut(&id);
                    node.is_modified = item.is_modified;
                    node.is_hidden = item.is_hidden;
                }
                ModelItem::Link(item) => {
                    self.upsert_link(&ParsedLink::new(&item.source, &item.target), stamp);
                }
                ModelItem::Line(item) => {
                    let id = LineId::from_names(&item.source, &item.target);
                    if !self.set_line_points(&id, item.points.clone()) && !item.points.is_empty() {
                        let parked = ParkedPoints {
                            source: item.source.clone(),
                            target: item.target.clone(),
                            points: item.points.clone(),
                        };
                        self.pending_line_points.insert(id, parked);
                    }
                }
            }
        }
        debug!(
            items = items.len(),
            nodes = self.node_count(),
            links = self.link_count(),
            lines = self.line_count(),
            "Loaded model items"
        );
    }
}

/// Copies a shared model into items without blocking writers for long.
pub struct SnapshotWriter {
    model: SharedModel,
    settings: SnapshotSettings,
}

impl SnapshotWriter {
    pub fn new(model: SharedModel, settings: SnapshotSettings) -> Self {
        Self { model, settings }
    }

    /// Take a consistent snapshot, retrying when the model changes mid-copy.
    pub fn snapshot(&self) -> Result<Vec<ModelItem>, SnapshotError> {
        self.snapshot_with(thread::yield_now)
    }

    pub(crate) fn snapshot_with(
        &self,
        mut between_batches: impl FnMut(),
    ) -> Result<Vec<ModelItem>, SnapshotError> {
        let attempts = self.settings.max_attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(items) = self.try_snapshot(&mut between_batches) {
                debug!(attempt, items = items.len(), "Took model snapshot");
                return Ok(items);
            }
            debug!(attempt, "Model changed during snapshot, retrying");
            if attempt < attempts {
                thread::sleep(self.settings.retry_delay());
            }
        }
        warn!(attempts, "Giving up model snapshot, model is busy");
        Err(SnapshotError::Busy { attempts })
    }

    fn try_snapshot(&self, between_batches: &mut impl FnMut()) -> Option<Vec<ModelItem>> {
        let (generation, keys) = self.model.read(|db| (db.generation(), db.snapshot_keys()));
        let mut items = Vec::with_capacity(keys.len());

        for batch in keys.chunks(self.settings.batch_size.max(1)) {
            between_batches();
            let copied = self.model.read(|db| {
                if db.generation() != generation {
                    return None;
                }
                Some(
                    batch
                        .iter()
                        .filter_map(|key| db.snapshot_item(key))
                        .collect::<Vec<_>>(),
                )
            })?;
            items.extend(copied);
        }
        Some(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dependinator_core::{NodeKind, ParsedNode, Point, Rect};

    fn sample_model() -> ModelDb {
        let mut db = ModelDb::default();
        db.add_or_update_node(&ParsedNode::new("N.A", NodeKind::Type).with_description("a"));
        db.add_or_update_link(&ParsedLink::new("N.A", "N.B"));
        db.add_or_update_link(&ParsedLink::new("N.A", "M.C"));
        let a = db.node_by_name("N.A").unwrap().id.clone();
        db.set_node_boundary(&a, Rect::new(1.0, 2.0, 30.0, 40.0));
        db.set_line_points(&LineId::from_names("N.A", "N.B"), vec![Point::new(5.0, 6.0)]);
        db
    }

    #[test]
    fn test_items_are_ordered_nodes_links_lines() {
        let items = sample_model().to_items();
        let ranks: Vec<_> = items.iter().map(ModelItem::load_rank).collect();
        let mut sorted = ranks.clone();
        sorted.sort();
        assert_eq!(ranks, sorted);

        let node_names: Vec<_> = items
            .iter()
            .filter_map(|item| match item {
                ModelItem::Node(node) => Some(node.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(node_names, vec!["M", "N", "M.C", "N.A", "N.B"]);
    }

    #[test]
    fn test_load_restores_model() {
        let original = sample_model();
        let mut loaded = ModelDb::default();
        loaded.load_items(&original.to_items());

        assert_eq!(loaded.node_count(), original.node_count());
        assert_eq!(loaded.link_count(), original.link_count());
        assert_eq!(loaded.line_count(), original.line_count());

        let a = loaded.node_by_name("N.A").unwrap();
        assert_eq!(a.boundary, Rect::new(1.0, 2.0, 30.0, 40.0));
        assert!(a.is_modified);
        assert_eq!(a.description, "a");
        assert_eq!(
            loaded.line_between("N.A", "N.B").unwrap().points,
            vec![Point::new(5.0, 6.0)]
        );
    }

    #[test]
    fn test_load_keeps_hidden_nodes_unrouted() {
        let mut original = sample_model();
        let b = original.node_by_name("N.B").unwrap().id.clone();
        original.hide_node(&b);

        let mut loaded = ModelDb::default();
        loaded.load_items(&original.to_items());
        assert!(loaded.node_by_name("N.B").unwrap().is_hidden);
        assert!(loaded.line_between("N.A", "N.B").is_none());
        assert_eq!(loaded.link_count(), 2);
    }

    #[test]
    fn test_hidden_line_points_survive_save_and_load() {
        let mut original = sample_model();
        let a = original.node_by_name("N.A").unwrap().id.clone();
        original.hide_node(&a);
        assert!(original.line_between("N.A", "N.B").is_none());

        let items = original.to_items();
        assert!(items.iter().any(|item| matches!(
            item,
            ModelItem::Line(line) if line.source == "N.A" && line.points == vec![Point::new(5.0, 6.0)]
        )));

        let mut loaded = ModelDb::default();
        loaded.load_items(&items);
        assert_eq!(loaded.to_items(), items);
        assert!(loaded.show_node(&a));
        assert_eq!(
            loaded.line_between("N.A", "N.B").unwrap().points,
            vec![Point::new(5.0, 6.0)]
        );
    }

    #[test]
    fn test_load_accepts_any_item_order() {
        let mut items = sample_model().to_items();
        items.reverse();
        let mut loaded = ModelDb::default();
        loaded.load_items(&items);
        assert_eq!(loaded.link_count(), 2);
        assert_eq!(
            loaded.line_between("N.A", "N.B").unwrap().points,
            vec![Point::new(5.0, 6.0)]
        );
    }

    #[test]
    fn test_snapshot_writer_copies_model() {
        let model = SharedModel::new(sample_model());
        let writer = SnapshotWriter::new(
            model.clone(),
            SnapshotSettings {
                batch_size: 2,
                ..SnapshotSettings::default()
            },
        );
        let items = writer.snapshot().unwrap();
        assert_eq!(items, model.read(|db| db.to_items()));
    }

    #[test]
    fn test_snapshot_retries_after_concurrent_change() {
        let model = SharedModel::new(sample_model());
        let writer = SnapshotWriter::new(
            model.clone(),
            SnapshotSettings {
                batch_size: 1,
                max_attempts: 3,
                retry_delay_ms: 0,
            },
        );

        let mut calls = 0;
        let items = writer
            .snapshot_with(|| {
                calls += 1;
                // Mutate once, in the middle of the first attempt.
                if calls == 3 {
                    model.with(|db| {
                        db.add_or_update_node(&ParsedNode::new("Late", NodeKind::Type));
                    });
                }
            })
            .unwrap();
        assert!(items.iter().any(|item| matches!(item, ModelItem::Node(node) if node.name == "Late")));
    }

    #[test]
    fn test_snapshot_gives_up_when_always_busy() {
        let model = SharedModel::new(sample_model());
        let writer = SnapshotWriter::new(
            model.clone(),
            SnapshotSettings {
                batch_size: 1,
                max_attempts: 2,
                retry_delay_ms: 0,
            },
        );
        let result = writer.snapshot_with(|| {
            model.with(|db| {
                let root = db.root_id().clone();
                let selected = db.root().is_selected;
                db.set_node_selected(&root, !selected);
            });
        });
        assert_eq!(result, Err(SnapshotError::Busy { attempts: 2 }));
    }
}
