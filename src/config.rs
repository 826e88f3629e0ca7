//! Engine configuration.
//!
//! Every section has defaults matching the retail/streaming dataset layout
//! (users, products, orders, streaming), so `EngineConfig::default()` works
//! out of the box and a JSON file only needs the keys it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};

use crate::model::NodeKind;
use crate::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub relations: RelationConfig,
    pub entity: EntityConfig,
    pub rules: RuleConfig,
    pub matcher: MatcherConfig,
}

/// Which relation labels form the two hops of an interest traversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationConfig {
    /// First hop: entity → item (e.g. `purchased`, `watched`).
    pub interaction: SmallVec<[String; 2]>,
    /// Second hop: item → vocabulary term (e.g. `tagged_as`, `about`).
    pub labeling: SmallVec<[String; 2]>,
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            interaction: smallvec!["purchased".to_owned(), "watched".to_owned()],
            labeling: smallvec!["tagged_as".to_owned(), "about".to_owned()],
        }
    }
}

/// The primary entity: which nodes are matched and where their attributes come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    pub target_type: NodeKind,
    pub primary_source: String,
    pub id_column: String,
    pub attributes: Vec<AttributeSpec>,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            target_type: NodeKind::User,
            primary_source: "users".to_owned(),
            id_column: "user_id".to_owned(),
            attributes: vec![
                AttributeSpec::new("age", AttributeKind::Integer),
                AttributeSpec::new("gender", AttributeKind::String),
                AttributeSpec::new("location", AttributeKind::String),
            ],
        }
    }
}

/// One demographic column copied onto entity nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub name: String,
    pub kind: AttributeKind,
}

impl AttributeSpec {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self { name: name.into(), kind }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    /// Parsed to an integer; unparsable cells become null.
    Integer,
    /// Passed through as text.
    String,
}

/// Rule fields resolved by graph traversal instead of attribute lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub relationship_fields: Vec<String>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self { relationship_fields: vec!["tag".to_owned(), "genre".to_owned()] }
    }
}

/// Semantic expansion parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Model name sent to remote embedding services.
    pub model: String,
    pub top_k: usize,
    pub threshold: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_owned(),
            top_k: 5,
            threshold: 0.4,
        }
    }
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.relations.interaction.is_empty() {
            return Err(Error::Config("relations.interaction must name at least one relation".into()));
        }
        if self.relations.labeling.is_empty() {
            return Err(Error::Config("relations.labeling must name at least one relation".into()));
        }
        if self.matcher.top_k == 0 {
            return Err(Error::Config("matcher.top_k must be at least 1".into()));
        }
        if !(-1.0..=1.0).contains(&self.matcher.threshold) {
            return Err(Error::Config(format!(
                "matcher.threshold must lie in [-1, 1], got {}",
                self.matcher.threshold
            )));
        }
        if self.entity.id_column.is_empty() {
            return Err(Error::Config("entity.id_column must not be empty".into()));
        }
        Ok(())
    }

    pub fn is_relationship_field(&self, field: &str) -> bool {
        self.rules.relationship_fields.iter().any(|f| f == field)
    }
}
