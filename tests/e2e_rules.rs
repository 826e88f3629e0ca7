//! End-to-end tests for rule evaluation through the `KnowledgeBase` handle.
//!
//! Each test exercises: rule document -> parse -> rebuild -> evaluate.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::FixedEmbedder;
use persona_graph::{
    Embedder, EngineConfig, Error, Expr, KnowledgeBase, Rule, RuleEvaluator, RuleSet, SemanticIndex, Snapshot,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::Notify;

async fn kb_with(embedder: FixedEmbedder) -> KnowledgeBase {
    let kb = KnowledgeBase::new(EngineConfig::default(), Arc::new(embedder)).unwrap();
    kb.rebuild(&common::schema(), &common::sources()).await.unwrap();
    kb
}

async fn kb() -> KnowledgeBase {
    kb_with(FixedEmbedder::new()).await
}

async fn matches(kb: &KnowledgeBase, rule: serde_json::Value) -> Vec<String> {
    let rule = Rule::from_json(&rule).unwrap();
    let eval = kb.query(&rule).await.unwrap();
    assert!(eval.is_complete());
    eval.sorted().into_iter().map(str::to_owned).collect()
}

// ============================================================================
// 1. Adult crypto buyers
// ============================================================================

#[tokio::test]
async fn test_age_and_interest() {
    let kb = kb().await;
    let found = matches(&kb, json!({"conditions": {"and": [
        {"field": "age", "operator": ">", "value": 20},
        {"field": "tag", "in": ["crypto"]}
    ]}}))
    .await;
    assert_eq!(found, ["u1"]);
}

// ============================================================================
// 2. Attribute semantics
// ============================================================================

#[tokio::test]
async fn test_missing_attribute_never_matches() {
    let kb = kb().await;
    assert!(matches(&kb, json!({"conditions": {"field": "income", "operator": ">", "value": 0}})).await.is_empty());
    // u4 has no location: excluded, not an error.
    assert_eq!(
        matches(&kb, json!({"conditions": {"field": "location", "in": ["Florida", "Texas"]}})).await,
        ["u1", "u3", "u5"]
    );
}

#[tokio::test]
async fn test_comparison_coerces_both_sides() {
    let kb = kb().await;
    assert_eq!(
        matches(&kb, json!({"conditions": {"field": "age", "operator": ">=", "value": "34"}})).await,
        ["u3", "u4"]
    );
    assert!(matches(&kb, json!({"conditions": {"field": "age", "operator": "<", "value": "young"}})).await.is_empty());
    assert!(matches(&kb, json!({"conditions": {"field": "gender", "operator": ">", "value": 1}})).await.is_empty());
    assert_eq!(
        matches(&kb, json!({"conditions": {"field": "age", "operator": "=", "value": 22.0}})).await,
        ["u5"]
    );
}

// ============================================================================
// 3. Interests through expansion
// ============================================================================

#[tokio::test]
async fn test_interest_expansion_reaches_related_labels() {
    let kb = kb().await;
    // bitcoin → crypto (purchases) and finance (watched content).
    assert_eq!(
        matches(&kb, json!({"conditions": {"field": "tag", "in": ["bitcoin"]}})).await,
        ["u1", "u2", "u4"]
    );
    assert_eq!(matches(&kb, json!({"conditions": {"field": "genre", "in": ["stocks"]}})).await, ["u4"]);
    assert_eq!(matches(&kb, json!({"conditions": {"field": "genre", "equals": "fitness"}})).await, ["u3"]);
    assert!(matches(&kb, json!({"conditions": {"field": "tag", "in": ["gardening"]}})).await.is_empty());
}

#[tokio::test]
async fn test_or_and_nesting() {
    let kb = kb().await;
    assert_eq!(
        matches(&kb, json!({"conditions": {"or": [
            {"field": "tag", "in": ["crypto"]},
            {"field": "gender", "equals": "F"}
        ]}}))
        .await,
        ["u1", "u2", "u3", "u5"]
    );
    assert_eq!(
        matches(&kb, json!({"conditions": {"and": [
            {"field": "gender", "equals": "F"},
            {"or": [
                {"field": "tag", "in": ["crypto"]},
                {"field": "genre", "in": ["sports"]}
            ]}
        ]}}))
        .await,
        ["u1", "u3"]
    );
}

#[tokio::test]
async fn test_single_child_combinator_is_transparent() {
    let kb = kb().await;
    let leaf = json!({"field": "tag", "in": ["bitcoin"]});
    let direct = matches(&kb, json!({"conditions": leaf})).await;
    assert_eq!(matches(&kb, json!({"conditions": {"and": [leaf]}})).await, direct);
    assert_eq!(matches(&kb, json!({"conditions": {"or": [{"and": [leaf]}]}})).await, direct);
}

// ============================================================================
// 4. Other rule sources
// ============================================================================

#[tokio::test]
async fn test_legacy_persona() {
    let kb = kb().await;
    let rule = Rule::from_persona(&json!({"persona": {
        "age": {"operator": ">", "value": 20},
        "gender": "F",
        "tag": ["crypto", "yoga"]
    }}))
    .unwrap();
    assert_eq!(kb.query(&rule).await.unwrap().sorted(), ["u1", "u3"]);
}

#[tokio::test]
async fn test_rule_set_from_model_response() {
    let kb = kb().await;
    let raw = "Here are the segments:\n```json\n{\"rules\": [\n  {\"name\": \"Young\", \"conditions\": {\"field\": \"age\", \"operator\": \"<\", \"value\": 21}},\n  {\"name\": \"Finance fans\", \"conditions\": {\"field\": \"genre\", \"in\": [\u{201C}stocks\u{201D}]}},\n]}\n```";
    let set = RuleSet::from_model_response(raw).unwrap();
    assert_eq!(set.len(), 2);

    let mut results = Vec::new();
    for rule in &set {
        results.push((rule.name.clone().unwrap(), kb.query(rule).await.unwrap().sorted().join(",")));
    }
    assert_eq!(
        results,
        [("Young".to_owned(), "u2".to_owned()), ("Finance fans".to_owned(), "u4".to_owned())]
    );
}

#[tokio::test]
async fn test_bad_rule_rejected_before_evaluation() {
    let err = Rule::from_json(&json!({"conditions": {"and": [], "or": []}})).unwrap_err();
    assert!(matches!(err, Error::RuleFormat { .. }));
}

// ============================================================================
// 5. Embedding failures are surfaced, not swallowed
// ============================================================================

#[tokio::test]
async fn test_failed_expansion_reported() {
    let kb = kb_with(FixedEmbedder::new().failing_on("bitcoin")).await;
    let rule = Rule::from_json(&json!({"conditions": {"or": [
        {"field": "tag", "in": ["bitcoin"]},
        {"field": "age", "operator": ">", "value": 30}
    ]}}))
    .unwrap();

    let eval = kb.query(&rule).await.unwrap();
    assert_eq!(eval.sorted(), ["u3", "u4"]);
    assert_eq!(eval.expansion_errors.len(), 1);
    assert_eq!(eval.expansion_errors[0].term, "bitcoin");
    assert!(matches!(eval.into_strict(), Err(Error::EmbeddingService(_))));
}

// ============================================================================
// 6. Handle lifecycle
// ============================================================================

#[tokio::test]
async fn test_query_before_build() {
    let kb = KnowledgeBase::new(EngineConfig::default(), Arc::new(FixedEmbedder::new())).unwrap();
    let rule = Rule::new(Expr::from(persona_graph::Condition::equals("gender", "F")));
    assert!(kb.snapshot().is_none());
    assert!(matches!(kb.query(&rule).await, Err(Error::NotBuilt)));
}

#[tokio::test]
async fn test_rebuild_replaces_snapshot() {
    let kb = kb().await;
    let before = kb.snapshot().unwrap();

    let mut sources = common::sources();
    sources.insert(
        persona_graph::Table::new("orders").with_row([("user_id", "u5"), ("product_id", "p1")]),
    );
    kb.rebuild(&common::schema(), &sources).await.unwrap();
    let after = kb.snapshot().unwrap();

    assert_ne!(before.graph().id(), after.graph().id());
    assert_eq!(after.index().graph_id(), after.graph().id());
    assert_eq!(
        matches(&kb, json!({"conditions": {"field": "tag", "in": ["crypto"]}})).await,
        ["u5"]
    );
    // Readers holding the old snapshot still see the old graph.
    let rule = Rule::from_json(&json!({"conditions": {"field": "tag", "in": ["crypto"]}})).unwrap();
    assert_eq!(before.query(kb.evaluator(), &rule).await.unwrap().sorted(), ["u1", "u2"]);
}

#[tokio::test]
async fn test_failed_rebuild_keeps_previous_snapshot() {
    let kb = kb_with(FixedEmbedder::new().failing_on("gardening")).await;
    let before = kb.snapshot().unwrap();

    let mut sources = common::sources();
    sources.insert(
        persona_graph::Table::new("products")
            .with_row([("product_id", "p1"), ("tag", "Crypto")])
            .with_row([("product_id", "p2"), ("tag", "Gardening")]),
    );
    let err = kb.rebuild(&common::schema(), &sources).await.unwrap_err();
    assert!(matches!(err, Error::EmbeddingService(_)));

    let current = kb.snapshot().unwrap();
    assert!(Arc::ptr_eq(&before, &current));
    assert_eq!(current.index().vocabulary(), ["crypto", "yoga", "finance", "sports"]);
}

/// Holds its first embedding call until the gate opens.
struct GatedEmbedder {
    inner: FixedEmbedder,
    gate: Arc<Notify>,
    first: AtomicBool,
}

#[async_trait]
impl Embedder for GatedEmbedder {
    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn embed(&self, texts: &[String]) -> persona_graph::Result<Vec<Vec<f32>>> {
        if self.first.swap(false, Ordering::SeqCst) {
            self.gate.notified().await;
        }
        self.inner.embed(texts).await
    }
}

#[tokio::test]
async fn test_overlapping_rebuilds_keep_the_later_one() {
    let gate = Arc::new(Notify::new());
    let embedder = GatedEmbedder { inner: FixedEmbedder::new(), gate: Arc::clone(&gate), first: AtomicBool::new(true) };
    let kb = KnowledgeBase::new(EngineConfig::default(), Arc::new(embedder)).unwrap();

    let schema = common::schema();
    let older = common::sources();
    let mut newer = common::sources();
    newer.insert(persona_graph::Table::new("orders").with_row([("user_id", "u5"), ("product_id", "p1")]));

    // The first rebuild starts first but finishes last.
    let (slow, fast) = tokio::join!(kb.rebuild(&schema, &older), async {
        let snapshot = kb.rebuild(&schema, &newer).await.unwrap();
        gate.notify_one();
        snapshot
    });
    let slow = slow.unwrap();

    let current = kb.snapshot().unwrap();
    assert!(Arc::ptr_eq(&current, &fast));
    assert!(!Arc::ptr_eq(&current, &slow));
    assert_eq!(
        matches(&kb, json!({"conditions": {"field": "tag", "in": ["crypto"]}})).await,
        ["u5"]
    );
}

#[tokio::test]
async fn test_index_from_other_build_is_stale() {
    let kb = kb().await;
    let snapshot = kb.snapshot().unwrap();
    let other = Snapshot::build(kb.config(), &common::schema(), &common::sources(), Arc::new(FixedEmbedder::new()))
        .await
        .unwrap();
    let stale: &SemanticIndex = other.index();

    let rule = Rule::from_json(&json!({"conditions": {"field": "gender", "equals": "F"}})).unwrap();
    let err = RuleEvaluator::default()
        .evaluate(snapshot.graph(), &rule.conditions, stale)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StaleIndex { .. }));
}

#[test]
fn test_config_validation() {
    let mut config = EngineConfig::default();
    config.matcher.top_k = 0;
    assert!(matches!(
        KnowledgeBase::new(config, Arc::new(FixedEmbedder::new())),
        Err(Error::Config(_))
    ));
}
