use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

pub mod geometry;
pub mod items;
pub mod name;
pub mod node_kind;
pub mod parsed;

pub use geometry::{Point, Rect};
pub use items::{ItemStore, LineItem, LinkItem, ModelItem, NodeItem};
pub use name::{ROOT_NAME, ancestor_names, parent_name_of};
pub use node_kind::NodeKind;
pub use parsed::{ParsedItem, ParsedLink, ParsedNode};

/// Number of hex characters kept from the SHA-256 digest of an identity key.
const ID_LENGTH: usize = 24;

fn digest_id(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..ID_LENGTH].to_string()
}

/// Identifier of a node, derived from its fully qualified name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn from_name(full_name: &str) -> Self {
        Self(digest_id(full_name))
    }

    pub fn root() -> Self {
        Self::from_name(ROOT_NAME)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a link, derived from the `source->target` name pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(String);

impl LinkId {
    pub fn from_names(source_name: &str, target_name: &str) -> Self {
        Self(digest_id(&format!("{source_name}->{target_name}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a line, derived from the `source=>target` name pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(String);

impl LineId {
    pub fn from_names(source_name: &str, target_name: &str) -> Self {
        Self(digest_id(&format!("{source_name}=>{target_name}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for enum conversion failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnumConversionError {
    #[error("Invalid NodeKind value: {0}")]
    InvalidNodeKind(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_stable_and_fixed_length() {
        let a = NodeId::from_name("System.Collections.List");
        let b = NodeId::from_name("System.Collections.List");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), ID_LENGTH);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_distinct_keys_get_distinct_ids() {
        assert_ne!(NodeId::from_name("A.B"), NodeId::from_name("A.C"));
        assert_ne!(LinkId::from_names("A", "B"), LinkId::from_names("B", "A"));
        // Link and line keys for the same pair must not collide.
        assert_ne!(
            LinkId::from_names("A", "B").as_str(),
            LineId::from_names("A", "B").as_str()
        );
    }

    #[test]
    fn test_root_id_is_id_of_empty_name() {
        assert_eq!(NodeId::root(), NodeId::from_name(""));
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = NodeId::from_name("A");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_str()));
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
