//! Vocabulary index: the graph's labelling terms and their embeddings.

use std::fmt;
use std::sync::Arc;

use hashbrown::HashSet;
use tracing::{debug, info};

use crate::graph::{Graph, GraphId};
use crate::{Error, Result};
use super::embedder::{Embedder, cosine_similarity};

/// Case-fold a vocabulary term. The one place terms are normalized: index
/// build applies it to edge targets, traversal applies it to terminal keys.
pub fn normalize_term(term: &str) -> String {
    term.trim().to_lowercase()
}

/// A vocabulary term with its similarity to a query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredTerm {
    pub term: String,
    pub score: f32,
}

/// Embedded vocabulary of one graph.
///
/// Built once per graph; every `expand` afterwards only embeds the query.
pub struct SemanticIndex {
    graph: GraphId,
    embedder: Arc<dyn Embedder>,
    model: String,
    terms: Vec<String>,
    embeddings: Vec<Vec<f32>>,
}

impl fmt::Debug for SemanticIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemanticIndex")
            .field("graph", &self.graph)
            .field("model", &self.model)
            .field("terms", &self.terms.len())
            .finish()
    }
}

impl SemanticIndex {
    /// Collect the targets of every `labeling` edge, normalize, dedupe
    /// (first occurrence keeps its position) and embed them in one batch.
    pub async fn build<S: AsRef<str>>(
        graph: &Graph,
        labeling: &[S],
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut terms = Vec::new();
        for rel in graph.relationships().filter(|r| r.is_one_of(labeling)) {
            let Some(target) = graph.node_by_id(rel.dst) else { continue };
            let term = normalize_term(&target.key);
            if !term.is_empty() && seen.insert(term.clone()) {
                terms.push(term);
            }
        }

        let embeddings = if terms.is_empty() {
            Vec::new()
        } else {
            embedder.embed(&terms).await?
        };
        if embeddings.len() != terms.len() {
            return Err(Error::EmbeddingService(format!(
                "expected {} vocabulary embeddings, got {}",
                terms.len(),
                embeddings.len()
            )));
        }
        if let Some(first) = embeddings.first() {
            if embeddings.iter().any(|e| e.len() != first.len()) {
                return Err(Error::EmbeddingService("vocabulary embeddings differ in dimension".into()));
            }
        }

        let model = embedder.model().to_owned();
        info!(graph = %graph.id(), model = %model, terms = terms.len(), "semantic index built");
        Ok(Self { graph: graph.id(), embedder, model, terms, embeddings })
    }

    pub fn graph_id(&self) -> GraphId {
        self.graph
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Vocabulary in enumeration order.
    pub fn vocabulary(&self) -> &[String] {
        &self.terms
    }

    pub fn contains(&self, term: &str) -> bool {
        let term = normalize_term(term);
        self.terms.iter().any(|t| *t == term)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Nearest vocabulary terms to `term`, best first.
    pub async fn expand(&self, term: &str, top_k: usize, threshold: f32) -> Result<Vec<String>> {
        Ok(self
            .expand_scored(term, top_k, threshold)
            .await?
            .into_iter()
            .map(|s| s.term)
            .collect())
    }

    /// Like [`SemanticIndex::expand`], keeping the scores.
    pub async fn expand_scored(&self, term: &str, top_k: usize, threshold: f32) -> Result<Vec<ScoredTerm>> {
        if self.terms.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let query = self
            .embedder
            .embed(&[term.to_owned()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::EmbeddingService(format!("no embedding returned for '{term}'")))?;

        let ranked = self.rank(&query, top_k, threshold)?;
        debug!(
            term = %term,
            threshold,
            matches = ?ranked.iter().map(|s| s.term.as_str()).collect::<Vec<_>>(),
            "expanded term"
        );
        Ok(ranked)
    }

    /// Score a query vector against the vocabulary: keep scores at or above
    /// `threshold`, order by descending score with ties in vocabulary order,
    /// take `top_k`.
    pub fn rank(&self, query: &[f32], top_k: usize, threshold: f32) -> Result<Vec<ScoredTerm>> {
        if let Some(dims) = self.embeddings.first().map(Vec::len) {
            if query.len() != dims {
                return Err(Error::EmbeddingService(format!(
                    "query embedding has {} dimensions, vocabulary has {dims}",
                    query.len()
                )));
            }
        }

        let mut hits: Vec<(usize, f32)> = self
            .embeddings
            .iter()
            .map(|e| cosine_similarity(query, e))
            .enumerate()
            .filter(|(_, score)| *score >= threshold)
            .collect();
        // Stable: equal scores keep vocabulary order.
        hits.sort_by(|a, b| b.1.total_cmp(&a.1));
        hits.truncate(top_k);

        Ok(hits
            .into_iter()
            .map(|(i, score)| ScoredTerm { term: self.terms[i].clone(), score })
            .collect())
    }
}
