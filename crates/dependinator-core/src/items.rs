//! Persisted model records.
//!
//! A saved model is a flat list of items. Nodes and lines are re-attached on
//! load through the same name-derived identities used by live parsing.

use crate::{NodeKind, ParsedNode, Point, Rect};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeItem {
    pub name: String,
    pub parent_name: String,
    pub kind: NodeKind,
    pub description: String,
    pub boundary: Rect,
    pub zoom: f64,
    pub color: Option<String>,
    pub background: Option<String>,
    /// Set once a user edited the layout of the node.
    pub is_modified: bool,
    pub is_hidden: bool,
}

impl NodeItem {
    pub fn to_parsed(&self) -> ParsedNode {
        ParsedNode {
            name: self.name.clone(),
            parent_name: Some(self.parent_name.clone()),
            kind: self.kind,
            description: self.description.clone(),
            x: Some(self.boundary.x),
            y: Some(self.boundary.y),
            width: Some(self.boundary.width),
            height: Some(self.boundary.height),
            zoom: Some(self.zoom),
            color: self.color.clone(),
            background: self.background.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkItem {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub source: String,
    pub target: String,
    /// Manually placed interior routing points, in the owner's coordinates.
    #[serde(default)]
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelItem {
    Node(NodeItem),
    Link(LinkItem),
    Line(LineItem),
}

impl ModelItem {
    /// Load order: nodes before links, links before lines.
    pub fn load_rank(&self) -> u8 {
        match self {
            ModelItem::Node(_) => 0,
            ModelItem::Link(_) => 1,
            ModelItem::Line(_) => 2,
        }
    }
}

/// Persistent home of a saved model.
pub trait ItemStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Replace the stored model with `items`.
    fn save_items(&mut self, items: &[ModelItem]) -> Result<(), Self::Error>;

    fn load_items(&self) -> Result<Vec<ModelItem>, Self::Error>;
}
