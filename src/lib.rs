//! # persona-graph: Audience Matching over a Typed Property Graph
//!
//! Turns flat tabular records (people, items, interactions) into a typed,
//! directed multigraph and answers persona queries against it: "which
//! entities satisfy this boolean rule over attributes and interests?"
//!
//! ## Design Principles
//!
//! 1. **Build once, read many**: a [`Snapshot`] (graph + semantic index) is
//!    immutable after construction and shared behind an `Arc`
//! 2. **Explicit handles**: [`KnowledgeBase`] owns the current snapshot and
//!    swaps it wholesale on rebuild; there is no process-wide cache
//! 3. **Embedding is a seam**: [`Embedder`] is the only I/O boundary on the
//!    query path
//! 4. **Rules are validated at parse time**: a [`Rule`] that parses always
//!    evaluates
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use persona_graph::{EngineConfig, GraphSchema, HashingEmbedder, KnowledgeBase, Rule, Sources};
//!
//! # async fn example() -> persona_graph::Result<()> {
//! let schema: GraphSchema = std::fs::read_to_string("graph_schema.json")?.parse()?;
//! let sources = persona_graph::load_sources([
//!     ("users", "data/users.csv"),
//!     ("orders", "data/orders.csv"),
//!     ("products", "data/products.csv"),
//! ])?;
//!
//! let kb = KnowledgeBase::new(EngineConfig::default(), Arc::new(HashingEmbedder::default()))?;
//! kb.rebuild(&schema, &sources).await?;
//!
//! let rule: Rule = r#"{"conditions": {"and": [
//!     {"field": "age", "operator": ">", "value": 20},
//!     {"field": "tag", "in": ["crypto"]}
//! ]}}"#.parse()?;
//!
//! let audience = kb.query(&rule).await?;
//! println!("{} matched", audience.matches.len());
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod config;
pub mod schema;
pub mod source;
pub mod graph;
pub mod builder;
pub mod semantic;
pub mod rule;
pub mod eval;

// ============================================================================
// Re-exports
// ============================================================================

pub use model::{Node, NodeId, NodeKind, PropertyMap, RelId, Relationship, Value};
pub use config::{AttributeKind, AttributeSpec, EngineConfig, EntityConfig, MatcherConfig, RelationConfig, RuleConfig};
pub use schema::{EdgeRule, GraphSchema, NodeColumn};
pub use source::{Record, Sources, Table, load_sources};
pub use graph::{Graph, GraphId, InterestPath};
pub use builder::GraphBuilder;
pub use semantic::{Embedder, HashingEmbedder, ScoredTerm, SemanticIndex, normalize_term};
#[cfg(feature = "http")]
pub use semantic::HttpEmbedder;
pub use rule::{CompareOp, Condition, Expr, Predicate, Rule, RuleExtractor, RuleSet, clean_model_response};
pub use eval::{Evaluation, ExpansionFailure, RuleEvaluator};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

// ============================================================================
// Snapshot: one graph + its semantic index
// ============================================================================

/// A graph and the semantic index built from it. Immutable; rebuilt together.
#[derive(Debug)]
pub struct Snapshot {
    graph: Graph,
    index: SemanticIndex,
    built_at: DateTime<Utc>,
}

impl Snapshot {
    /// Build the graph from `sources`, then the vocabulary index over it.
    pub async fn build(
        config: &EngineConfig,
        schema: &GraphSchema,
        sources: &Sources,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let graph = GraphBuilder::new(schema, &config.entity).build(sources);
        let index = SemanticIndex::build(&graph, config.relations.labeling.as_slice(), embedder).await?;
        Ok(Self { graph, index, built_at: Utc::now() })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn index(&self) -> &SemanticIndex {
        &self.index
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Evaluate one rule against this snapshot.
    pub async fn query(&self, evaluator: &RuleEvaluator, rule: &Rule) -> Result<Evaluation> {
        evaluator.evaluate(&self.graph, &rule.conditions, &self.index).await
    }
}

// ============================================================================
// KnowledgeBase: the caller-owned handle
// ============================================================================

/// Owns configuration, the embedding backend and the current snapshot.
///
/// Readers take an `Arc<Snapshot>` and never block a rebuild; a rebuild
/// publishes its snapshot only once it is complete. When rebuilds overlap,
/// the one started last wins regardless of finishing order.
pub struct KnowledgeBase {
    config: EngineConfig,
    embedder: Arc<dyn Embedder>,
    evaluator: RuleEvaluator,
    /// Last rebuild generation handed out.
    generation: AtomicU64,
    current: RwLock<Option<Published>>,
}

struct Published {
    generation: u64,
    snapshot: Arc<Snapshot>,
}

impl KnowledgeBase {
    pub fn new(config: EngineConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate()?;
        let evaluator = RuleEvaluator::new(&config);
        Ok(Self {
            config,
            embedder,
            evaluator,
            generation: AtomicU64::new(0),
            current: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &RuleEvaluator {
        &self.evaluator
    }

    /// Rebuild graph and index from scratch and publish them.
    ///
    /// On error the previously published snapshot stays current. A build
    /// overtaken by a later rebuild is returned but not published.
    pub async fn rebuild(&self, schema: &GraphSchema, sources: &Sources) -> Result<Arc<Snapshot>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(
            Snapshot::build(&self.config, schema, sources, Arc::clone(&self.embedder)).await?,
        );

        let mut current = self.current.write();
        if current.as_ref().is_some_and(|p| p.generation > generation) {
            debug!(generation, graph = %snapshot.graph.id(), "rebuild superseded, not publishing");
            return Ok(snapshot);
        }
        info!(
            generation,
            graph = %snapshot.graph.id(),
            nodes = snapshot.graph.node_count(),
            relationships = snapshot.graph.relationship_count(),
            vocabulary = snapshot.index.len(),
            "published snapshot"
        );
        *current = Some(Published { generation, snapshot: Arc::clone(&snapshot) });
        Ok(snapshot)
    }

    /// The currently published snapshot, if any.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.current.read().as_ref().map(|p| Arc::clone(&p.snapshot))
    }

    /// Evaluate a rule against the current snapshot.
    pub async fn query(&self, rule: &Rule) -> Result<Evaluation> {
        let snapshot = self.snapshot().ok_or(Error::NotBuilt)?;
        snapshot.query(&self.evaluator, rule).await
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Schema error: {message} in {fragment}")]
    Schema { message: String, fragment: String },

    #[error("Data source '{source_name}' unreadable: {message}")]
    DataSource { source_name: String, message: String },

    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    #[error("Rule format error: {message} in {fragment}")]
    RuleFormat { message: String, fragment: String },

    #[error("Could not extract rules from model response: {message}")]
    Extraction { message: String, raw: String },

    #[error("Semantic index was built for graph {index}, not graph {graph}")]
    StaleIndex { graph: GraphId, index: GraphId },

    #[error("No snapshot has been built yet")]
    NotBuilt,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    pub(crate) fn schema(message: impl Into<String>, fragment: &serde_json::Value) -> Self {
        Error::Schema { message: message.into(), fragment: fragment.to_string() }
    }

    pub(crate) fn rule_format(message: impl Into<String>, fragment: &serde_json::Value) -> Self {
        Error::RuleFormat { message: message.into(), fragment: fragment.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
