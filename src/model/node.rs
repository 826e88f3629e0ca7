//! Node in the persona graph.

use std::fmt;

use serde::{Deserialize, Serialize};
use super::{PropertyMap, Value};

/// Dense node identifier, an index into the owning graph's node table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The type tag a schema assigns to the nodes one column produces.
///
/// Labels are matched case-insensitively; unknown labels are kept verbatim
/// (lower-cased) in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    User,
    Product,
    Content,
    Tag,
    Genre,
    /// Created implicitly as an edge endpoint from a column no schema entry types.
    Untyped,
    Other(String),
}

impl NodeKind {
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        match label.as_str() {
            "user" => NodeKind::User,
            "product" => NodeKind::Product,
            "content" => NodeKind::Content,
            "tag" => NodeKind::Tag,
            "genre" => NodeKind::Genre,
            "untyped" => NodeKind::Untyped,
            _ => NodeKind::Other(label),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            NodeKind::User => "user",
            NodeKind::Product => "product",
            NodeKind::Content => "content",
            NodeKind::Tag => "tag",
            NodeKind::Genre => "genre",
            NodeKind::Untyped => "untyped",
            NodeKind::Other(label) => label,
        }
    }
}

impl From<String> for NodeKind {
    fn from(label: String) -> Self { NodeKind::from_label(&label) }
}

impl From<&str> for NodeKind {
    fn from(label: &str) -> Self { NodeKind::from_label(label) }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self { kind.label().to_owned() }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A node: its textual key (the cell value it was created from), its kind
/// and its attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub key: String,
    pub kind: NodeKind,
    pub properties: PropertyMap,
}

impl Node {
    pub fn new(id: NodeId, key: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id,
            key: key.into(),
            kind,
            properties: PropertyMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Attribute lookup. An explicit `Null` reads as absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key).filter(|v| !v.is_null())
    }
}
