//! Relationship (edge) in the persona graph.

use serde::{Deserialize, Serialize};
use super::NodeId;

/// Dense relationship identifier, an index into the owning graph's edge table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelId(pub u32);

impl std::fmt::Display for RelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A directed, labelled edge. Parallel edges with the same label are
/// distinct relationships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelId,
    pub src: NodeId,
    pub dst: NodeId,
    pub rel_type: String,
}

impl Relationship {
    pub fn new(id: RelId, src: NodeId, dst: NodeId, rel_type: impl Into<String>) -> Self {
        Self {
            id,
            src,
            dst,
            rel_type: rel_type.into(),
        }
    }

    pub fn is_one_of<S: AsRef<str>>(&self, relations: &[S]) -> bool {
        relations.iter().any(|r| r.as_ref() == self.rel_type)
    }
}
