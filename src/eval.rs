//! Rule evaluation.
//!
//! A rule is evaluated in two phases. First every relationship-field operand
//! in the tree is expanded through the semantic index, once per distinct
//! operand; this is the only async work. The tree is then compiled into a
//! plan that holds the expanded candidate sets, and the plan is run against
//! each entity of the target kind without touching the embedder again.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::graph::Graph;
use crate::model::{Node, NodeKind};
use crate::rule::{Condition, Expr, Predicate};
use crate::semantic::{SemanticIndex, normalize_term};
use crate::{Error, Result};

// ============================================================================
// Results
// ============================================================================

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Keys of the matching entities. Unordered.
    pub matches: HashSet<String>,
    /// Operands whose expansion failed. Their conditions matched nothing.
    pub expansion_errors: Vec<ExpansionFailure>,
}

/// An operand the embedding service could not expand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionFailure {
    pub term: String,
    pub message: String,
}

impl Evaluation {
    pub fn is_match(&self, key: &str) -> bool {
        self.matches.contains(key)
    }

    /// Matched keys in ascending order.
    pub fn sorted(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.matches.iter().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn is_complete(&self) -> bool {
        self.expansion_errors.is_empty()
    }

    /// Fail if any expansion failed, otherwise hand back the matches.
    pub fn into_strict(self) -> Result<HashSet<String>> {
        match self.expansion_errors.first() {
            None => Ok(self.matches),
            Some(first) => Err(Error::EmbeddingService(format!(
                "{} expansion(s) failed, first '{}': {}",
                self.expansion_errors.len(),
                first.term,
                first.message
            ))),
        }
    }
}

// ============================================================================
// Evaluator
// ============================================================================

/// Evaluates rule trees against a graph and its semantic index.
///
/// Holds configuration only; a single evaluator can serve any number of
/// concurrent queries.
#[derive(Debug, Clone)]
pub struct RuleEvaluator {
    target: NodeKind,
    relationship_fields: Vec<String>,
    interaction: Vec<String>,
    labeling: Vec<String>,
    top_k: usize,
    threshold: f32,
}

impl Default for RuleEvaluator {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl RuleEvaluator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            target: config.entity.target_type.clone(),
            relationship_fields: config.rules.relationship_fields.clone(),
            interaction: config.relations.interaction.to_vec(),
            labeling: config.relations.labeling.to_vec(),
            top_k: config.matcher.top_k,
            threshold: config.matcher.threshold,
        }
    }

    pub fn with_target(mut self, target: impl Into<NodeKind>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_relationship_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.relationship_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_expansion(mut self, top_k: usize, threshold: f32) -> Self {
        self.top_k = top_k;
        self.threshold = threshold;
        self
    }

    pub fn target(&self) -> &NodeKind {
        &self.target
    }

    /// Whether `field` is resolved by traversal rather than attribute lookup.
    pub fn is_relationship_field(&self, field: &str) -> bool {
        self.relationship_fields.iter().any(|f| f == field)
    }

    /// Keys of every target entity satisfying `rule`.
    ///
    /// `index` must have been built from `graph`. Embedding failures do not
    /// abort the pass; they are listed in [`Evaluation::expansion_errors`].
    pub async fn evaluate(&self, graph: &Graph, rule: &Expr, index: &SemanticIndex) -> Result<Evaluation> {
        if index.graph_id() != graph.id() {
            return Err(Error::StaleIndex { graph: graph.id(), index: index.graph_id() });
        }
        reject_empty_combinators(rule)?;

        let mut expansions = Expansions::default();
        for condition in rule.conditions() {
            if !self.is_relationship_field(&condition.field) {
                continue;
            }
            if let Predicate::Compare { op, .. } = &condition.predicate {
                debug!(field = %condition.field, op = op.symbol(), "comparison on relationship field never matches");
                continue;
            }
            for operand in condition.operands() {
                if let Some(term) = operand.to_key() {
                    expansions.resolve(&term, index, self.top_k, self.threshold).await?;
                }
            }
        }

        let plan = self.compile(rule, &expansions);
        let mut matches = HashSet::new();
        let mut scanned = 0usize;
        for entity in graph.nodes_of_kind(&self.target) {
            scanned += 1;
            if self.holds(&plan, graph, entity) {
                matches.insert(entity.key.clone());
            }
        }

        debug!(
            graph = %graph.id(),
            rule = %rule,
            scanned,
            matched = matches.len(),
            expanded = expansions.memo.len(),
            "rule evaluated"
        );
        Ok(Evaluation { matches, expansion_errors: expansions.failures })
    }

    fn compile<'r>(&self, expr: &'r Expr, expansions: &Expansions) -> Plan<'r> {
        match expr {
            Expr::And(children) | Expr::Or(children) if children.len() == 1 => {
                self.compile(&children[0], expansions)
            }
            Expr::And(children) => Plan::All(children.iter().map(|c| self.compile(c, expansions)).collect()),
            Expr::Or(children) => Plan::Any(children.iter().map(|c| self.compile(c, expansions)).collect()),
            Expr::Leaf(condition) if self.is_relationship_field(&condition.field) => {
                Plan::Interest(expansions.candidates(condition))
            }
            Expr::Leaf(condition) => Plan::Attribute(condition),
        }
    }

    fn holds(&self, plan: &Plan<'_>, graph: &Graph, entity: &Node) -> bool {
        match plan {
            Plan::All(children) => children.iter().all(|c| self.holds(c, graph, entity)),
            Plan::Any(children) => children.iter().any(|c| self.holds(c, graph, entity)),
            Plan::Attribute(condition) => attribute_holds(entity, condition),
            Plan::Interest(candidates) => self.interest_holds(graph, entity, candidates),
        }
    }

    /// entity -[interaction]-> item -[labeling]-> label, label ∈ candidates.
    fn interest_holds(&self, graph: &Graph, entity: &Node, candidates: &hashbrown::HashSet<String>) -> bool {
        if candidates.is_empty() {
            return false;
        }
        graph
            .outgoing_any(entity.id, self.interaction.as_slice())
            .filter_map(|rel| graph.node_by_id(rel.dst))
            .any(|item| {
                graph
                    .outgoing_any(item.id, self.labeling.as_slice())
                    .filter_map(|rel| graph.node_by_id(rel.dst))
                    .any(|label| candidates.contains(&normalize_term(&label.key)))
            })
    }
}

/// An empty `and`/`or` has no defined truth value.
fn reject_empty_combinators(expr: &Expr) -> Result<()> {
    let (children, name) = match expr {
        Expr::Leaf(_) => return Ok(()),
        Expr::And(children) => (children, "and"),
        Expr::Or(children) => (children, "or"),
    };
    if children.is_empty() {
        return Err(Error::RuleFormat {
            message: format!("empty `{name}` combinator"),
            fragment: expr.to_string(),
        });
    }
    children.iter().try_for_each(reject_empty_combinators)
}

/// Direct attribute check. Absent attributes and failed coercions are `false`.
fn attribute_holds(entity: &Node, condition: &Condition) -> bool {
    let Some(stored) = entity.get(&condition.field) else {
        return false;
    };
    match &condition.predicate {
        Predicate::Compare { op, value } => match (stored.coerce_int(), value.coerce_int()) {
            (Some(lhs), Some(rhs)) => op.apply(lhs, rhs),
            _ => false,
        },
        Predicate::In(values) => values.iter().any(|v| stored.loose_eq(v)),
        Predicate::Equals(value) => stored.loose_eq(value),
    }
}

// ============================================================================
// Plan
// ============================================================================

enum Plan<'r> {
    All(Vec<Plan<'r>>),
    Any(Vec<Plan<'r>>),
    Attribute(&'r Condition),
    Interest(hashbrown::HashSet<String>),
}

/// Expansion results of one evaluation pass, keyed by normalized operand.
#[derive(Default)]
struct Expansions {
    memo: hashbrown::HashMap<String, Vec<String>>,
    failures: Vec<ExpansionFailure>,
}

impl Expansions {
    async fn resolve(&mut self, term: &str, index: &SemanticIndex, top_k: usize, threshold: f32) -> Result<()> {
        let term = normalize_term(term);
        if self.memo.contains_key(&term) {
            return Ok(());
        }
        let expanded = match index.expand(&term, top_k, threshold).await {
            Ok(expanded) => expanded,
            Err(Error::EmbeddingService(message)) => {
                warn!(term = %term, error = %message, "expansion failed, condition will not match");
                self.failures.push(ExpansionFailure { term: term.clone(), message });
                Vec::new()
            }
            Err(other) => return Err(other),
        };
        self.memo.insert(term, expanded);
        Ok(())
    }

    /// Union of the expansions of every operand of `condition`.
    fn candidates(&self, condition: &Condition) -> hashbrown::HashSet<String> {
        if matches!(condition.predicate, Predicate::Compare { .. }) {
            return hashbrown::HashSet::new();
        }
        condition
            .operands()
            .iter()
            .filter_map(|v| v.to_key())
            .filter_map(|term| self.memo.get(&normalize_term(&term)))
            .flatten()
            .cloned()
            .collect()
    }
}
