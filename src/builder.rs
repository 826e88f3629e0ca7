//! GraphBuilder: schema + tabular sources → [`Graph`].
//!
//! Three passes, in order:
//!
//! 1. **Nodes**: every non-null cell under a schema column becomes a node
//!    of that column's kind. The first source (then the first column) to
//!    mention a key fixes its kind.
//! 2. **Enrichment**: rows of the primary source copy demographic columns
//!    onto the entity nodes they name.
//! 3. **Edges**: each edge rule walks its `via` source. A rule whose source
//!    was not supplied is skipped; this is how partially available data
//!    sets are handled, not an error.
//!
//! Every call starts from an empty graph.

use tracing::{debug, info, warn};

use crate::config::{AttributeKind, AttributeSpec, EntityConfig};
use crate::graph::Graph;
use crate::model::{NodeKind, Value};
use crate::schema::{EdgeRule, GraphSchema};
use crate::source::{Record, Sources, Table};

pub struct GraphBuilder<'a> {
    schema: &'a GraphSchema,
    entity: &'a EntityConfig,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(schema: &'a GraphSchema, entity: &'a EntityConfig) -> Self {
        Self { schema, entity }
    }

    pub fn build(&self, sources: &Sources) -> Graph {
        let mut graph = Graph::empty();

        for table in sources.iter() {
            self.add_nodes(&mut graph, table);
        }

        match sources.get(&self.entity.primary_source) {
            Some(primary) => self.enrich(&mut graph, primary),
            None => debug!(source = %self.entity.primary_source, "primary source absent, no enrichment"),
        }

        for rule in &self.schema.edges {
            match sources.get(&rule.via) {
                Some(table) => self.add_edges(&mut graph, rule, table),
                None => debug!(
                    relation = %rule.relation,
                    via = %rule.via,
                    "edge source not supplied, skipping rule"
                ),
            }
        }

        info!(
            graph = %graph.id(),
            nodes = graph.node_count(),
            relationships = graph.relationship_count(),
            "graph built"
        );
        graph
    }

    fn add_nodes(&self, graph: &mut Graph, table: &Table) {
        let columns: Vec<_> = self
            .schema
            .nodes
            .iter()
            .filter(|n| table.has_column(&n.column))
            .collect();
        if columns.is_empty() {
            return;
        }

        for row in &table.rows {
            for node_column in &columns {
                let Some(key) = cell_key(row, &node_column.column) else { continue };
                let Some((id, created)) = graph.ensure_node(&key, &node_column.kind) else {
                    warn!(source = %table.name, "node id space exhausted, dropping remaining rows");
                    return;
                };
                if !created {
                    if let Some(existing) = graph.node_by_id(id) {
                        if existing.kind != node_column.kind {
                            debug!(
                                key = %key,
                                kept = %existing.kind,
                                ignored = %node_column.kind,
                                "node key reused under another type"
                            );
                        }
                    }
                }
            }
        }
    }

    fn enrich(&self, graph: &mut Graph, primary: &Table) {
        if !primary.has_column(&self.entity.id_column) {
            warn!(
                source = %primary.name,
                column = %self.entity.id_column,
                "primary source has no id column, skipping enrichment"
            );
            return;
        }

        for row in &primary.rows {
            let Some(key) = cell_key(row, &self.entity.id_column) else { continue };
            let Some(id) = graph.node(&key).map(|n| n.id) else { continue };
            for spec in &self.entity.attributes {
                graph.set_property(id, &spec.name, attribute_value(row, spec));
            }
        }
    }

    fn add_edges(&self, graph: &mut Graph, rule: &EdgeRule, table: &Table) {
        let src_kind = self.endpoint_kind(&rule.from);
        let dst_kind = self.endpoint_kind(&rule.to);
        let mut emitted = 0usize;

        for row in &table.rows {
            let (Some(src), Some(dst)) = (cell_key(row, &rule.from), cell_key(row, &rule.to)) else {
                continue;
            };
            let added = match (graph.ensure_node(&src, &src_kind), graph.ensure_node(&dst, &dst_kind)) {
                (Some((src, _)), Some((dst, _))) => graph.add_relationship(src, dst, &rule.relation),
                _ => None,
            };
            if added.is_none() {
                warn!(relation = %rule.relation, via = %rule.via, "id space exhausted, dropping remaining rows");
                break;
            }
            emitted += 1;
        }

        debug!(relation = %rule.relation, via = %rule.via, edges = emitted, "edge rule applied");
    }

    fn endpoint_kind(&self, column: &str) -> NodeKind {
        self.schema.node_kind(column).cloned().unwrap_or(NodeKind::Untyped)
    }
}

/// Key of a present, non-null cell.
fn cell_key(row: &Record, column: &str) -> Option<String> {
    row.get(column).and_then(Value::to_key)
}

fn attribute_value(row: &Record, spec: &AttributeSpec) -> Value {
    let Some(cell) = row.get(&spec.name).filter(|v| !v.is_null()) else {
        return Value::Null;
    };
    match spec.kind {
        AttributeKind::Integer => cell.coerce_int().map(Value::Int).unwrap_or(Value::Null),
        AttributeKind::String => match cell {
            Value::String(s) => Value::String(s.clone()),
            other => other.to_key().map(Value::String).unwrap_or(Value::Null),
        },
    }
}
