//! Records emitted by an assembly parser.

use crate::{NodeKind, Rect};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParsedNode {
    pub name: String,
    /// Explicit parent. When absent the parent is derived from `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    #[serde(default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
}

impl ParsedNode {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Default::default()
        }
    }

    pub fn with_parent(mut self, parent_name: impl Into<String>) -> Self {
        self.parent_name = Some(parent_name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_boundary(mut self, boundary: Rect) -> Self {
        self.x = Some(boundary.x);
        self.y = Some(boundary.y);
        self.width = Some(boundary.width);
        self.height = Some(boundary.height);
        self
    }

    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = Some(zoom);
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// The parent name, explicit or derived from the node name.
    pub fn resolved_parent_name(&self) -> &str {
        match self.parent_name.as_deref() {
            Some(parent) => parent,
            None => crate::parent_name_of(&self.name).0,
        }
    }

    /// The explicit boundary, present only when all four coordinates are.
    pub fn boundary(&self) -> Option<Rect> {
        match (self.x, self.y, self.width, self.height) {
            (Some(x), Some(y), Some(width), Some(height)) => Some(Rect::new(x, y, width, height)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParsedLink {
    pub source: String,
    pub target: String,
}

impl ParsedLink {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParsedItem {
    Node(ParsedNode),
    Link(ParsedLink),
}

impl From<ParsedNode> for ParsedItem {
    fn from(node: ParsedNode) -> Self {
        ParsedItem::Node(node)
    }
}

impl From<ParsedLink> for ParsedItem {
    fn from(link: ParsedLink) -> Self {
        ParsedItem::Link(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_is_derived_when_absent() {
        let node = ParsedNode::new("A.B.C", NodeKind::Member);
        assert_eq!(node.resolved_parent_name(), "A.B");
        let node = node.with_parent("Assembly1");
        assert_eq!(node.resolved_parent_name(), "Assembly1");
    }

    #[test]
    fn test_partial_boundary_is_ignored() {
        let mut node = ParsedNode::new("A", NodeKind::Type);
        node.x = Some(1.0);
        node.y = Some(2.0);
        assert_eq!(node.boundary(), None);
        node.width = Some(3.0);
        node.height = Some(4.0);
        assert_eq!(node.boundary(), Some(Rect::new(1.0, 2.0, 3.0, 4.0)));
    }

    #[test]
    fn test_parsed_item_json_lines_format() {
        let line = r#"{"type":"node","name":"A.B","kind":"type","description":"B"}"#;
        let item: ParsedItem = serde_json::from_str(line).unwrap();
        assert_eq!(
            item,
            ParsedItem::Node(ParsedNode::new("A.B", NodeKind::Type).with_description("B"))
        );

        let line = r#"{"type":"link","source":"A.B","target":"A.C"}"#;
        let item: ParsedItem = serde_json::from_str(line).unwrap();
        assert_eq!(item, ParsedItem::Link(ParsedLink::new("A.B", "A.C")));
    }
}
