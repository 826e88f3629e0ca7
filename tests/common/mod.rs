//! Shared fixtures for the integration tests: a small retail/streaming data
//! set and embedding backends with hand-picked vectors.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use persona_graph::{Embedder, Error, GraphSchema, Result, Sources, Table, Value};

pub const SCHEMA: &str = r#"{
    "nodes": {
        "user_id": "user",
        "product_id": "product",
        "content_id": "content",
        "tag": "tag",
        "genre": "genre"
    },
    "edges": [
        {"from": "user_id", "to": "product_id", "relation": "purchased", "via": "orders"},
        {"from": "user_id", "to": "content_id", "relation": "watched", "via": "streaming"},
        {"from": "product_id", "to": "tag", "relation": "tagged_as", "via": "products"},
        {"from": "content_id", "to": "genre", "relation": "about", "via": "content"},
        {"from": "user_id", "to": "product_id", "relation": "reviewed", "via": "reviews"}
    ]
}"#;

pub fn schema() -> GraphSchema {
    SCHEMA.parse().unwrap()
}

fn user(id: &str, age: impl Into<Value>, gender: &str, location: Option<&str>) -> [(&'static str, Value); 4] {
    [
        ("user_id", Value::from(id)),
        ("age", age.into()),
        ("gender", Value::from(gender)),
        ("location", Value::from(location)),
    ]
}

/// u1: 25, bought a crypto product twice
/// u2: 17, bought the same crypto product
/// u3: "34" as text, bought yoga, watched sports
/// u4: 40, no location, watched finance
/// u5: 22, no interactions
pub fn sources() -> Sources {
    let users = Table::new("users")
        .with_row(user("u1", 25, "F", Some("Florida")))
        .with_row(user("u2", 17, "M", Some("Georgia")))
        .with_row(user("u3", "34", "F", Some("Texas")))
        .with_row(user("u4", 40, "M", None))
        .with_row(user("u5", 22, "F", Some("Florida")));
    let orders = Table::new("orders")
        .with_row([("user_id", "u1"), ("product_id", "p1")])
        .with_row([("user_id", "u2"), ("product_id", "p1")])
        .with_row([("user_id", "u3"), ("product_id", "p2")])
        .with_row([("user_id", "u1"), ("product_id", "p1")]);
    let streaming = Table::new("streaming")
        .with_row([("user_id", "u4"), ("content_id", "c1")])
        .with_row([("user_id", "u3"), ("content_id", "c2")]);
    let products = Table::new("products")
        .with_row([("product_id", "p1"), ("tag", "Crypto")])
        .with_row([("product_id", "p2"), ("tag", "Yoga")]);
    let content = Table::new("content")
        .with_row([("content_id", "c1"), ("genre", "Finance")])
        .with_row([("content_id", "c2"), ("genre", "Sports")]);

    Sources::new()
        .with(users)
        .with(orders)
        .with(streaming)
        .with(products)
        .with(content)
}

/// Embeds known terms to fixed vectors; anything else maps to the zero vector.
pub struct FixedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    fail_on: Vec<String>,
    pub calls: AtomicUsize,
}

impl FixedEmbedder {
    pub fn new() -> Self {
        let vectors = [
            ("crypto", [1.0, 0.0, 0.0, 0.0]),
            ("yoga", [0.0, 1.0, 0.0, 0.0]),
            ("finance", [0.3, 0.0, 0.95, 0.0]),
            ("sports", [0.0, 0.3, 0.0, 0.95]),
            ("stocks", [0.2, 0.0, 0.98, 0.0]),
            ("bitcoin", [0.95, 0.0, 0.3, 0.0]),
            ("fitness", [0.0, 0.8, 0.0, 0.6]),
        ]
        .into_iter()
        .map(|(term, v)| {
            let norm = v.iter().map(|x: &f32| x * x).sum::<f32>().sqrt();
            (term.to_owned(), v.iter().map(|x| x / norm).collect())
        })
        .collect();
        Self { vectors, fail_on: Vec::new(), calls: AtomicUsize::new(0) }
    }

    /// Fail any batch containing `term`.
    pub fn failing_on(mut self, term: &str) -> Self {
        self.fail_on.push(term.to_owned());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    fn model(&self) -> &str {
        "fixed-4"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(bad) = texts.iter().find(|t| self.fail_on.iter().any(|f| f == t.trim())) {
            return Err(Error::EmbeddingService(format!("model unavailable for '{bad}'")));
        }
        Ok(texts
            .iter()
            .map(|t| {
                self.vectors
                    .get(&t.trim().to_lowercase())
                    .cloned()
                    .unwrap_or_else(|| vec![0.0; 4])
            })
            .collect())
    }
}
