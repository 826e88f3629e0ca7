//! Immutable persona graph.
//!
//! Nodes and relationships live in dense tables indexed by [`NodeId`] and
//! [`RelId`]; key, kind and adjacency indexes are maintained while the
//! builder runs and frozen afterwards. Nothing here mutates after
//! [`crate::GraphBuilder::build`] returns, so a `&Graph` can be shared
//! across any number of concurrent queries.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::model::*;

/// Identity of one build. Every build gets a fresh id, even from identical
/// sources, so an index can tell which graph it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphId(pub u64);

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(1);

/// Ids are dense `u32` indexes; a table holds at most `u32::MAX + 1` entries.
fn dense_id(len: usize) -> Option<u32> {
    u32::try_from(len).ok()
}

/// entity -[interaction]-> item -[labeling]-> label
#[derive(Debug, Clone, PartialEq)]
pub struct InterestPath<'g> {
    pub entity: &'g Node,
    pub interaction: &'g Relationship,
    pub item: &'g Node,
    pub labeling: &'g Relationship,
    pub label: &'g Node,
}

pub struct Graph {
    id: GraphId,
    nodes: Vec<Node>,
    relationships: Vec<Relationship>,
    /// node key → node id
    keys: HashMap<String, NodeId>,
    /// node id → outgoing relationship ids, in insertion order
    outgoing: Vec<Vec<RelId>>,
    /// kind → node ids, in insertion order
    kind_index: HashMap<NodeKind, Vec<NodeId>>,
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("id", &self.id)
            .field("nodes", &self.nodes.len())
            .field("relationships", &self.relationships.len())
            .finish()
    }
}

impl Graph {
    pub(crate) fn empty() -> Self {
        Self {
            id: GraphId(NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed)),
            nodes: Vec::new(),
            relationships: Vec::new(),
            keys: HashMap::new(),
            outgoing: Vec::new(),
            kind_index: HashMap::new(),
        }
    }

    // ========================================================================
    // Construction (builder only)
    // ========================================================================

    /// Insert a node unless the key exists. Returns the id and whether it was
    /// created, or `None` once the id space is exhausted.
    pub(crate) fn ensure_node(&mut self, key: &str, kind: &NodeKind) -> Option<(NodeId, bool)> {
        if let Some(&id) = self.keys.get(key) {
            return Some((id, false));
        }
        let id = NodeId(dense_id(self.nodes.len())?);
        self.nodes.push(Node::new(id, key, kind.clone()));
        self.outgoing.push(Vec::new());
        self.keys.insert(key.to_owned(), id);
        self.kind_index.entry(kind.clone()).or_default().push(id);
        Some((id, true))
    }

    pub(crate) fn set_property(&mut self, id: NodeId, key: &str, value: Value) {
        if let Some(node) = self.nodes.get_mut(id.0 as usize) {
            node.properties.insert(key.to_owned(), value);
        }
    }

    /// `None` if `src` is unknown or the id space is exhausted.
    pub(crate) fn add_relationship(&mut self, src: NodeId, dst: NodeId, rel_type: &str) -> Option<RelId> {
        let id = RelId(dense_id(self.relationships.len())?);
        self.outgoing.get_mut(src.0 as usize)?.push(id);
        self.relationships.push(Relationship::new(id, src, dst, rel_type));
        Some(id)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn node(&self, key: &str) -> Option<&Node> {
        self.keys.get(key).and_then(|id| self.node_by_id(*id))
    }

    pub fn node_by_id(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize)
    }

    pub fn relationship(&self, id: RelId) -> Option<&Relationship> {
        self.relationships.get(id.0 as usize)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    /// Attribute of the node with `key`. Missing node, missing attribute
    /// and null all read as `None`.
    pub fn attribute(&self, key: &str, attribute: &str) -> Option<&Value> {
        self.node(key)?.get(attribute)
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Outgoing relationships of `node`, optionally restricted to one label.
    pub fn outgoing<'g>(
        &'g self,
        node: NodeId,
        rel_type: Option<&'g str>,
    ) -> impl Iterator<Item = &'g Relationship> + use<'g> {
        self.outgoing
            .get(node.0 as usize)
            .into_iter()
            .flatten()
            .filter_map(|rid| self.relationship(*rid))
            .filter(move |rel| rel_type.is_none_or(|t| rel.rel_type == t))
    }

    /// Outgoing relationships of `node` whose label is one of `relations`.
    pub fn outgoing_any<'g, 'r, S: AsRef<str>>(
        &'g self,
        node: NodeId,
        relations: &'r [S],
    ) -> impl Iterator<Item = &'g Relationship> + use<'g, 'r, S> {
        self.outgoing(node, None).filter(move |rel| rel.is_one_of(relations))
    }

    /// Every two-hop interest path leaving the entity with `key`.
    pub fn interest_paths<S: AsRef<str>>(
        &self,
        key: &str,
        interaction: &[S],
        labeling: &[S],
    ) -> Vec<InterestPath<'_>> {
        let Some(entity) = self.node(key) else {
            return Vec::new();
        };
        let mut paths = Vec::new();
        for first in self.outgoing_any(entity.id, interaction) {
            let Some(item) = self.node_by_id(first.dst) else { continue };
            for second in self.outgoing_any(item.id, labeling) {
                if let Some(label) = self.node_by_id(second.dst) {
                    paths.push(InterestPath { entity, interaction: first, item, labeling: second, label });
                }
            }
        }
        paths
    }

    // ========================================================================
    // Scan
    // ========================================================================

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter()
    }

    /// Nodes of one kind, in creation order.
    pub fn nodes_of_kind<'g>(&'g self, kind: &NodeKind) -> impl Iterator<Item = &'g Node> + use<'g> {
        self.kind_index
            .get(kind)
            .into_iter()
            .flatten()
            .filter_map(|id| self.node_by_id(*id))
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn kinds(&self) -> Vec<&NodeKind> {
        let mut kinds: Vec<&NodeKind> = self.kind_index.keys().collect();
        kinds.sort_by(|a, b| a.label().cmp(b.label()));
        kinds
    }

    pub fn relationship_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.relationships.iter().map(|r| r.rel_type.as_str()).collect();
        types.sort_unstable();
        types.dedup();
        types
    }
}
