use crate::EnumConversionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Root,
    /// Synthesized container for a parent name that no record described yet.
    Parent,
    Solution,
    SolutionFolder,
    Assembly,
    Group,
    Namespace,
    Type,
    Member,
    Private,
    /// Placeholder for a link endpoint that no record described yet.
    #[default]
    Unresolved,
}

impl NodeKind {
    pub const ALL: [NodeKind; 11] = [
        NodeKind::Root,
        NodeKind::Parent,
        NodeKind::Solution,
        NodeKind::SolutionFolder,
        NodeKind::Assembly,
        NodeKind::Group,
        NodeKind::Namespace,
        NodeKind::Type,
        NodeKind::Member,
        NodeKind::Private,
        NodeKind::Unresolved,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Parent => "parent",
            NodeKind::Solution => "solution",
            NodeKind::SolutionFolder => "solution_folder",
            NodeKind::Assembly => "assembly",
            NodeKind::Group => "group",
            NodeKind::Namespace => "namespace",
            NodeKind::Type => "type",
            NodeKind::Member => "member",
            NodeKind::Private => "private",
            NodeKind::Unresolved => "unresolved",
        }
    }

    /// Structural containers that the obsolescence sweep removes only once
    /// they are stale and empty.
    pub fn is_namespace_like(self) -> bool {
        matches!(self, NodeKind::Namespace | NodeKind::Parent)
    }

    /// Whether the node is rendered as a container of child nodes rather than a leaf.
    pub fn is_container(self) -> bool {
        match self {
            NodeKind::Root
            | NodeKind::Parent
            | NodeKind::Solution
            | NodeKind::SolutionFolder
            | NodeKind::Assembly
            | NodeKind::Group
            | NodeKind::Namespace
            | NodeKind::Type => true,
            NodeKind::Member | NodeKind::Private | NodeKind::Unresolved => false,
        }
    }

    /// Synthesized kinds are replaced by whatever kind a parsed record reports.
    pub fn is_synthetic(self) -> bool {
        matches!(self, NodeKind::Parent | NodeKind::Unresolved)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = EnumConversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| EnumConversionError::InvalidNodeKind(value.to_string()))
    }
}
