//! Graph schema: which columns become nodes, which column pairs become edges.
//!
//! ```json
//! {
//!   "nodes": { "user_id": "user", "product_id": "product", "tag": "tag" },
//!   "edges": [
//!     { "from": "user_id", "to": "product_id", "relation": "purchased", "via": "orders" },
//!     { "from": "product_id", "to": "tag", "relation": "tagged_as", "via": "products" }
//!   ]
//! }
//! ```
//!
//! Node columns keep document order; it decides the type of a key that
//! appears under two columns of the same row.

use std::path::Path;
use std::str::FromStr;

use serde_json::Value as Json;

use crate::model::NodeKind;
use crate::{Error, Result};

/// A column whose cell values become nodes of `kind`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeColumn {
    pub column: String,
    pub kind: NodeKind,
}

/// `from` → `to` edges labelled `relation`, read from rows of source `via`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRule {
    pub from: String,
    pub to: String,
    pub relation: String,
    pub via: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GraphSchema {
    pub nodes: Vec<NodeColumn>,
    pub edges: Vec<EdgeRule>,
}

impl GraphSchema {
    /// Validate and convert a schema document.
    pub fn from_json(doc: &Json) -> Result<Self> {
        let root = doc
            .as_object()
            .ok_or_else(|| Error::schema("schema must be a JSON object", doc))?;

        let nodes_doc = root
            .get("nodes")
            .ok_or_else(|| Error::schema("missing `nodes`", doc))?;
        let nodes = nodes_doc
            .as_object()
            .ok_or_else(|| Error::schema("`nodes` must map column names to node types", nodes_doc))?
            .iter()
            .map(|(column, label)| {
                let label = label
                    .as_str()
                    .ok_or_else(|| Error::schema(format!("node type for `{column}` must be a string"), nodes_doc))?;
                Ok(NodeColumn { column: column.clone(), kind: NodeKind::from_label(label) })
            })
            .collect::<Result<Vec<_>>>()?;

        let edges_doc = root
            .get("edges")
            .ok_or_else(|| Error::schema("missing `edges`", doc))?;
        let edges = edges_doc
            .as_array()
            .ok_or_else(|| Error::schema("`edges` must be a list of edge rules", edges_doc))?
            .iter()
            .map(EdgeRule::from_json)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { nodes, edges })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        std::fs::read_to_string(path)?.parse()
    }

    pub fn node_kind(&self, column: &str) -> Option<&NodeKind> {
        self.nodes.iter().find(|n| n.column == column).map(|n| &n.kind)
    }

    /// Source names referenced by edge rules, first mention first.
    pub fn edge_sources(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for edge in &self.edges {
            if !names.contains(&edge.via.as_str()) {
                names.push(&edge.via);
            }
        }
        names
    }
}

impl FromStr for GraphSchema {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        Self::from_json(&serde_json::from_str(text)?)
    }
}

impl EdgeRule {
    fn from_json(doc: &Json) -> Result<Self> {
        let field = |key: &str| -> Result<String> {
            match doc.get(key) {
                Some(Json::String(s)) => Ok(s.clone()),
                Some(_) => Err(Error::schema(format!("edge rule `{key}` must be a string"), doc)),
                None => Err(Error::schema(format!("edge rule missing `{key}`"), doc)),
            }
        };
        if !doc.is_object() {
            return Err(Error::schema("edge rule must be an object", doc));
        }
        Ok(Self {
            from: field("from")?,
            to: field("to")?,
            relation: field("relation")?,
            via: field("via")?,
        })
    }
}
