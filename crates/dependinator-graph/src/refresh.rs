//! Applying a parser stream to the model.
//!
//! A parser thread pushes [`ParsedItem`]s through an [`ItemSender`] into a
//! bounded channel. A [`Refresher`] consumes the channel, applies every batch
//! under one model lock acquisition, and sweeps whatever the refresh did not
//! see once the parser reports completion.

use crate::model_db::{ModelDb, SharedModel};
use crate::refresh_journal::RefreshJournal;
use crate::settings::RefreshSettings;
use crossbeam_channel::{Receiver, Sender, bounded};
use dependinator_core::ParsedItem;
use dependinator_events::telemetry::{
    OP_REFRESH_MODEL, debug_context, new_correlation_id, operation_failure, operation_start,
    operation_success,
};
use dependinator_events::{Event, EventBus};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

const REFRESH_TARGET: &str = "dependinator::refresh";

#[derive(Debug, Clone, PartialEq)]
pub enum ParserMessage {
    Items(Vec<ParsedItem>),
    /// The parser saw everything; the refresh may sweep.
    Completed,
    Failed(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("parser failed: {0}")]
    ParserFailed(String),
    #[error("parser stream ended without completion")]
    Disconnected,
}

/// What a finished refresh did to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub stamp: u64,
    pub applied_items: usize,
    pub removed_nodes: usize,
    pub removed_links: usize,
    /// A newer refresh started before this one completed, so no sweep ran.
    pub superseded: bool,
}

/// Producer side of the parser queue. Items are buffered and sent in batches.
///
/// Dropping the sender without calling [`ItemSender::complete`] ends the
/// stream as a failure.
pub struct ItemSender {
    tx: Sender<ParserMessage>,
    buffer: Vec<ParsedItem>,
    batch_size: usize,
}

impl ItemSender {
    pub fn send(&mut self, item: impl Into<ParsedItem>) -> Result<(), RefreshError> {
        self.buffer.push(item.into());
        if self.buffer.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), RefreshError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        self.tx
            .send(ParserMessage::Items(batch))
            .map_err(|_| RefreshError::Disconnected)
    }

    pub fn complete(mut self) -> Result<(), RefreshError> {
        self.flush()?;
        self.tx
            .send(ParserMessage::Completed)
            .map_err(|_| RefreshError::Disconnected)
    }

    /// Report a parser failure. Buffered items are discarded.
    pub fn fail(self, reason: impl Into<String>) -> Result<(), RefreshError> {
        self.tx
            .send(ParserMessage::Failed(reason.into()))
            .map_err(|_| RefreshError::Disconnected)
    }
}

/// Create the bounded parser queue. The producer blocks once
/// `queue_capacity` batches are waiting.
pub fn parser_channel(settings: &RefreshSettings) -> (ItemSender, Receiver<ParserMessage>) {
    let (tx, rx) = bounded(settings.queue_capacity.max(1));
    let batch_size = settings.batch_size.max(1);
    let sender = ItemSender {
        tx,
        buffer: Vec::with_capacity(batch_size),
        batch_size,
    };
    (sender, rx)
}

impl ModelDb {
    /// Apply one parser record tagged with `stamp`.
    pub fn apply_parsed_item(&mut self, item: &ParsedItem, stamp: u64) {
        match item {
            ParsedItem::Node(node) => {
                self.upsert_node(node, stamp);
            }
            ParsedItem::Link(link) => {
                self.upsert_link(link, stamp);
            }
        }
    }
}

/// Consumer side of a refresh.
pub struct Refresher {
    model: SharedModel,
    events: EventBus,
    batch_size: usize,
}

impl Refresher {
    pub fn new(model: SharedModel, events: EventBus, settings: &RefreshSettings) -> Self {
        Self {
            model,
            events,
            batch_size: settings.batch_size.max(1),
        }
    }

    /// Run the refresh on a dedicated consumer thread.
    pub fn spawn(
        self,
        rx: Receiver<ParserMessage>,
    ) -> JoinHandle<Result<RefreshOutcome, RefreshError>> {
        thread::spawn(move || self.run(rx))
    }

    /// Consume the parser stream until it completes or fails.
    ///
    /// On failure everything the refresh created or changed is taken back,
    /// unless a newer refresh has started in the meantime. Edits made while
    /// the refresh ran are kept.
    pub fn run(&self, rx: Receiver<ParserMessage>) -> Result<RefreshOutcome, RefreshError> {
        let correlation_id = new_correlation_id();
        let started = Instant::now();
        let stamp = self.model.with(|db| db.begin_refresh());
        let mut journal = RefreshJournal::default();
        operation_start(OP_REFRESH_MODEL, &correlation_id, Some(stamp));
        self.events.publish(Event::RefreshStarted {
            stamp,
            correlation_id: correlation_id.clone(),
        });

        let mut applied_items = 0;
        loop {
            match rx.recv() {
                Ok(ParserMessage::Items(items)) => {
                    for chunk in items.chunks(self.batch_size) {
                        let generation = self.model.with(|db| {
                            for item in chunk {
                                db.apply_journaled(item, stamp, &mut journal);
                            }
                            db.generation()
                        });
                        applied_items += chunk.len();
                        self.events.publish(Event::RefreshProgress {
                            stamp,
                            applied_items,
                        });
                        self.events.publish(Event::ModelChanged { generation });
                    }
                }
                Ok(ParserMessage::Completed) => break,
                Ok(ParserMessage::Failed(reason)) => {
                    return Err(self.fail(
                        stamp,
                        journal,
                        &correlation_id,
                        RefreshError::ParserFailed(reason),
                    ));
                }
                Err(_) => {
                    return Err(self.fail(
                        stamp,
                        journal,
                        &correlation_id,
                        RefreshError::Disconnected,
                    ));
                }
            }
        }
        drop(journal);

        let swept = self.model.with(|db| {
            (db.stamp() == stamp).then(|| (db.remove_obsolete_nodes_and_links(stamp), db.generation()))
        });
        let duration_ms = started.elapsed().as_millis();

        let Some(((removed_nodes, removed_links), generation)) = swept else {
            info!(
                target: REFRESH_TARGET,
                stamp,
                applied_items,
                "Refresh superseded by a newer one, skipping sweep"
            );
            debug_context(OP_REFRESH_MODEL, &correlation_id, "superseded");
            self.events.publish(Event::RefreshSuperseded { stamp });
            return Ok(RefreshOutcome {
                stamp,
                applied_items,
                removed_nodes: 0,
                removed_links: 0,
                superseded: true,
            });
        };

        info!(
            target: REFRESH_TARGET,
            stamp,
            applied_items,
            removed_nodes,
            removed_links,
            duration_ms = duration_ms as u64,
            "Refresh completed"
        );
        operation_success(OP_REFRESH_MODEL, &correlation_id, Some(stamp), Some(duration_ms));
        self.events.publish(Event::ModelChanged { generation });
        self.events.publish(Event::RefreshCompleted {
            stamp,
            removed_nodes,
            removed_links,
            duration_ms: duration_ms.min(u64::MAX as u128) as u64,
        });

        Ok(RefreshOutcome {
            stamp,
            applied_items,
            removed_nodes,
            removed_links,
            superseded: false,
        })
    }

    fn fail(
        &self,
        stamp: u64,
        journal: RefreshJournal,
        correlation_id: &str,
        error: RefreshError,
    ) -> RefreshError {
        let restored = self.model.with(|db| {
            if db.stamp() != stamp {
                return None;
            }
            if !journal.is_empty() {
                db.undo_refresh(journal);
            }
            Some(db.generation())
        });
        match restored {
            Some(generation) => {
                warn!(target: REFRESH_TARGET, stamp, %error, "Refresh failed, changes taken back");
                self.events.publish(Event::ModelChanged { generation });
            }
            None => {
                warn!(target: REFRESH_TARGET, stamp, %error, "Superseded refresh failed");
            }
        }
        operation_failure(
            OP_REFRESH_MODEL,
            correlation_id,
            Some(stamp),
            Some(error.to_string()),
        );
        self.events.publish(Event::RefreshFailed {
            stamp,
            error: error.to_string(),
        });
        error
    }
}
