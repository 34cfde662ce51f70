//! The live dependency model: a containment tree of nodes, the links between
//! them, and the lines those links are drawn with.

pub mod line_geometry;
mod line_service;
mod link_service;
pub mod model_db;
pub mod model_service;
mod node_service;
pub mod refresh;
mod refresh_journal;
pub mod settings;
pub mod snapshot;
pub mod tile_cache;

pub use line_geometry::{LineGeometry, calculate_anchor};
pub use model_db::{Line, LineStroke, Link, ModelDb, ModelStats, Node, SharedModel};
pub use model_service::ModelService;
pub use refresh::{
    ItemSender, ParserMessage, RefreshError, RefreshOutcome, Refresher, parser_channel,
};
pub use settings::{
    LayoutSettings, ModelSettings, RefreshSettings, SnapshotSettings, TileSettings,
};
pub use snapshot::{SnapshotError, SnapshotWriter};
pub use tile_cache::{TileCache, TileKey, TileRenderer};
