use crossbeam_channel::{unbounded, Receiver, Sender};
use dependinator_core::NodeId;
use serde::{Deserialize, Serialize};

pub mod telemetry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Refresh
    RefreshStarted {
        stamp: u64,
        correlation_id: String,
    },
    RefreshProgress {
        stamp: u64,
        applied_items: usize,
    },
    RefreshCompleted {
        stamp: u64,
        removed_nodes: usize,
        removed_links: usize,
        duration_ms: u64,
    },
    /// The refresh was superseded by a newer one before it could sweep.
    RefreshSuperseded {
        stamp: u64,
    },
    RefreshFailed {
        stamp: u64,
        error: String,
    },

    // Model
    /// Any mutation that changes what a renderer would draw.
    ModelChanged {
        generation: u64,
    },
    NodeHidden {
        id: NodeId,
    },
    NodeShown {
        id: NodeId,
    },
    ModelCleared,

    // Persistence
    SnapshotSaved {
        item_count: usize,
    },
    SnapshotSaveFailed {
        error: String,
    },
    ModelLoaded {
        item_count: usize,
    },

    // Notifications
    ShowWarning {
        message: String,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: Sender<Event>,
    rx: Receiver<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> Sender<Event> {
        self.tx.clone()
    }

    pub fn receiver(&self) -> Receiver<Event> {
        self.rx.clone()
    }

    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    /// Drain all pending events without blocking.
    pub fn drain(&self) -> Vec<Event> {
        self.rx.try_iter().collect()
    }

    /// Hand every pending event to `listener`, oldest first.
    pub fn dispatch_to<L: EventListener>(&self, listener: &mut L) {
        while let Ok(event) = self.rx.try_recv() {
            listener.handle_event(&event);
        }
    }
}

/// A host component reacting to model events.
pub trait EventListener {
    fn handle_event(&mut self, event: &Event);
}
