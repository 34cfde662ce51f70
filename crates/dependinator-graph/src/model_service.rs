//! The model as seen by a host: every operation takes the model lock, and
//! changes are announced on the event bus.

use crate::line_geometry::LineGeometry;
use crate::model_db::{ModelDb, ModelStats, Node, SharedModel};
use crate::refresh::{ItemSender, RefreshError, RefreshOutcome, Refresher, parser_channel};
use crate::settings::ModelSettings;
use crate::snapshot::SnapshotWriter;
use anyhow::{Context, Result};
use dependinator_core::{
    ItemStore, LineId, LinkId, NodeId, ParsedLink, ParsedNode, Point, Rect,
};
use dependinator_events::telemetry::{
    OP_LOAD_MODEL, OP_SAVE_SNAPSHOT, new_correlation_id, operation_failure, operation_start,
    operation_success,
};
use dependinator_events::{Event, EventBus};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{info, warn};

pub struct ModelService {
    model: SharedModel,
    events: EventBus,
    settings: ModelSettings,
}

impl ModelService {
    pub fn new(settings: ModelSettings, events: EventBus) -> Self {
        let model = SharedModel::new(ModelDb::new(settings.layout));
        Self {
            model,
            events,
            settings,
        }
    }

    pub fn model(&self) -> &SharedModel {
        &self.model
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    /// Run `f` under the model lock and announce the change if it mutated anything.
    fn mutate<R>(&self, f: impl FnOnce(&mut ModelDb) -> R) -> R {
        let (result, before, after) = self.model.with(|db| {
            let before = db.generation();
            let result = f(db);
            (result, before, db.generation())
        });
        if after != before {
            self.events.publish(Event::ModelChanged { generation: after });
        }
        result
    }

    // Reads

    pub fn root(&self) -> Node {
        self.model.read(|db| db.root().clone())
    }

    pub fn try_node(&self, id: &NodeId) -> Option<Node> {
        self.model.read(|db| db.try_node(id).cloned())
    }

    pub fn stats(&self) -> ModelStats {
        self.model.read(|db| db.stats())
    }

    pub fn line_geometry(&self, id: &LineId) -> Option<LineGeometry> {
        self.model
            .read(|db| db.try_line(id).map(|line| LineGeometry::endpoints(db, line)))
    }

    // Graph updates

    pub fn get_or_create_node(&self, name: &str) -> NodeId {
        self.mutate(|db| db.get_or_create_node(name))
    }

    pub fn add_or_update_node(&self, parsed: &ParsedNode) -> NodeId {
        self.mutate(|db| db.add_or_update_node(parsed))
    }

    pub fn add_or_update_link(&self, parsed: &ParsedLink) -> Option<LinkId> {
        self.mutate(|db| db.add_or_update_link(parsed))
    }

    pub fn hide_node(&self, id: &NodeId) -> bool {
        let hidden = self.mutate(|db| db.hide_node(id));
        if hidden {
            self.events.publish(Event::NodeHidden { id: id.clone() });
        }
        hidden
    }

    pub fn show_node(&self, id: &NodeId) -> bool {
        let shown = self.mutate(|db| db.show_node(id));
        if shown {
            self.events.publish(Event::NodeShown { id: id.clone() });
        }
        shown
    }

    // User edits

    pub fn move_node(&self, id: &NodeId, offset: Point) {
        self.mutate(|db| db.move_node(id, offset));
    }

    pub fn set_node_boundary(&self, id: &NodeId, boundary: Rect) {
        self.mutate(|db| db.set_node_boundary(id, boundary));
    }

    pub fn set_container_zoom(&self, id: &NodeId, zoom: f64) {
        self.mutate(|db| db.set_container_zoom(id, zoom));
    }

    pub fn set_node_color(&self, id: &NodeId, color: Option<String>, background: Option<String>) {
        self.mutate(|db| db.set_node_color(id, color, background));
    }

    pub fn set_node_selected(&self, id: &NodeId, selected: bool) {
        self.mutate(|db| db.set_node_selected(id, selected));
    }

    pub fn set_line_points(&self, id: &LineId, points: Vec<Point>) -> bool {
        self.mutate(|db| db.set_line_points(id, points))
    }

    pub fn clear(&self) {
        self.mutate(|db| db.clear());
        self.events.publish(Event::ModelCleared);
    }

    // Refresh

    /// Start a refresh consuming on its own thread. The parser feeds the
    /// returned sender and finishes with [`ItemSender::complete`].
    pub fn start_refresh(
        &self,
    ) -> (ItemSender, JoinHandle<Result<RefreshOutcome, RefreshError>>) {
        let (sender, rx) = parser_channel(&self.settings.refresh);
        let refresher = Refresher::new(self.model.clone(), self.events.clone(), &self.settings.refresh);
        (sender, refresher.spawn(rx))
    }

    // Persistence

    /// Save a consistent snapshot of the model. Returns the number of saved items.
    pub fn save<S: ItemStore>(&self, store: &mut S) -> Result<usize> {
        let correlation_id = new_correlation_id();
        let started = Instant::now();
        operation_start(OP_SAVE_SNAPSHOT, &correlation_id, None);

        let result = SnapshotWriter::new(self.model.clone(), self.settings.snapshot)
            .snapshot()
            .context("Failed to take model snapshot")
            .and_then(|items| {
                store
                    .save_items(&items)
                    .context("Failed to store model snapshot")?;
                Ok(items.len())
            });

        match &result {
            Ok(item_count) => {
                operation_success(
                    OP_SAVE_SNAPSHOT,
                    &correlation_id,
                    None,
                    Some(started.elapsed().as_millis()),
                );
                self.events.publish(Event::SnapshotSaved {
                    item_count: *item_count,
                });
            }
            Err(err) => {
                operation_failure(OP_SAVE_SNAPSHOT, &correlation_id, None, Some(format!("{err:#}")));
                self.events.publish(Event::SnapshotSaveFailed {
                    error: format!("{err:#}"),
                });
            }
        }
        result
    }

    /// Replace the model with the stored one. Returns the number of loaded items.
    pub fn load<S: ItemStore>(&self, store: &S) -> Result<usize> {
        let correlation_id = new_correlation_id();
        let started = Instant::now();
        operation_start(OP_LOAD_MODEL, &correlation_id, None);

        let items = match store.load_items().context("Failed to read stored model") {
            Ok(items) => items,
            Err(err) => {
                operation_failure(OP_LOAD_MODEL, &correlation_id, None, Some(format!("{err:#}")));
                return Err(err);
            }
        };

        self.mutate(|db| db.load_items(&items));
        operation_success(
            OP_LOAD_MODEL,
            &correlation_id,
            None,
            Some(started.elapsed().as_millis()),
        );
        self.events.publish(Event::ModelLoaded {
            item_count: items.len(),
        });
        Ok(items.len())
    }

    /// Load the stored model, falling back to an empty one with a single
    /// user warning when it cannot be read.
    pub fn load_or_default<S: ItemStore>(&self, store: &S) -> usize {
        match self.load(store) {
            Ok(count) => {
                info!(items = count, "Loaded stored model");
                count
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "Falling back to an empty model");
                self.clear();
                self.events.publish(Event::ShowWarning {
                    message: format!("Could not load the saved model, starting empty: {err:#}"),
                });
                0
            }
        }
    }
}
