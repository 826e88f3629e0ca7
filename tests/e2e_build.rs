//! End-to-end tests for graph construction: schema + sources → graph.

mod common;

use std::collections::BTreeMap;

use persona_graph::{
    EntityConfig, Error, Graph, GraphBuilder, GraphSchema, NodeKind, Sources, Table, Value, load_sources,
};
use pretty_assertions::assert_eq;

fn build(sources: &Sources) -> Graph {
    GraphBuilder::new(&common::schema(), &EntityConfig::default()).build(sources)
}

// ============================================================================
// 1. Nodes get their schema types
// ============================================================================

#[test]
fn test_nodes_are_typed_by_column() {
    let graph = build(&common::sources());

    let keys = |kind: NodeKind| -> Vec<String> {
        graph.nodes_of_kind(&kind).map(|n| n.key.clone()).collect()
    };
    assert_eq!(keys(NodeKind::User), ["u1", "u2", "u3", "u4", "u5"]);
    assert_eq!(keys(NodeKind::Product), ["p1", "p2"]);
    assert_eq!(keys(NodeKind::Content), ["c1", "c2"]);
    assert_eq!(keys(NodeKind::Tag), ["Crypto", "Yoga"]);
    assert_eq!(keys(NodeKind::Genre), ["Finance", "Sports"]);
    assert_eq!(graph.node_count(), 13);
}

// ============================================================================
// 2. Enrichment copies demographics onto users
// ============================================================================

#[test]
fn test_enrichment_attributes() {
    let graph = build(&common::sources());

    assert_eq!(graph.attribute("u1", "age"), Some(&Value::Int(25)));
    assert_eq!(graph.attribute("u1", "gender"), Some(&Value::from("F")));
    assert_eq!(graph.attribute("u1", "location"), Some(&Value::from("Florida")));
    // Text ages are parsed.
    assert_eq!(graph.attribute("u3", "age"), Some(&Value::Int(34)));
    // Null cells read as absent.
    assert_eq!(graph.attribute("u4", "location"), None);
    // Only the primary entity is enriched.
    assert_eq!(graph.attribute("p1", "age"), None);
}

// ============================================================================
// 3. Multigraph: repeated interactions are parallel edges
// ============================================================================

#[test]
fn test_repeated_interactions_are_parallel_edges() {
    let graph = build(&common::sources());
    let u1 = graph.node("u1").unwrap().id;

    let purchases: Vec<_> = graph.outgoing(u1, Some("purchased")).collect();
    assert_eq!(purchases.len(), 2);
    assert!(purchases.iter().all(|r| graph.node_by_id(r.dst).unwrap().key == "p1"));

    let paths = graph.interest_paths("u1", &["purchased", "watched"], &["tagged_as", "about"]);
    assert_eq!(paths.len(), 2);
    assert!(paths.iter().all(|p| p.label.key == "Crypto"));
}

// ============================================================================
// 4. Missing edge source is tolerated
// ============================================================================

#[test]
fn test_absent_edge_source_skips_relation() {
    let graph = build(&common::sources());

    assert!(!graph.relationship_types().contains(&"reviewed"));
    assert_eq!(graph.relationship_types(), ["about", "purchased", "tagged_as", "watched"]);
    assert_eq!(graph.relationship_count(), 10);
}

#[test]
fn test_edge_endpoints_without_rows_are_created() {
    let schema: GraphSchema = r#"{
        "nodes": {"user_id": "user"},
        "edges": [{"from": "user_id", "to": "sku", "relation": "purchased", "via": "orders"}]
    }"#
    .parse()
    .unwrap();
    let orders = Table::new("orders")
        .with_row([("user_id", Value::from("u9")), ("sku", Value::from(1001))])
        .with_row([("user_id", Value::from("u9")), ("sku", Value::Null)]);
    let graph = GraphBuilder::new(&schema, &EntityConfig::default()).build(&Sources::new().with(orders));

    assert_eq!(graph.node("u9").map(|n| &n.kind), Some(&NodeKind::User));
    assert_eq!(graph.node("1001").map(|n| &n.kind), Some(&NodeKind::Untyped));
    assert_eq!(graph.relationship_count(), 1);
}

// ============================================================================
// 5. Rebuilds are isomorphic
// ============================================================================

type Shape = (BTreeMap<String, (String, Vec<(String, String)>)>, Vec<(String, String, String)>);

fn shape(graph: &Graph) -> Shape {
    let nodes = graph
        .nodes()
        .map(|n| {
            let mut props: Vec<(String, String)> =
                n.properties.iter().map(|(k, v)| (k.clone(), v.to_string())).collect();
            props.sort();
            (n.key.clone(), (n.kind.to_string(), props))
        })
        .collect();
    let mut edges: Vec<_> = graph
        .relationships()
        .map(|r| {
            (
                graph.node_by_id(r.src).unwrap().key.clone(),
                graph.node_by_id(r.dst).unwrap().key.clone(),
                r.rel_type.clone(),
            )
        })
        .collect();
    edges.sort();
    (nodes, edges)
}

#[test]
fn test_rebuild_is_isomorphic() {
    let sources = common::sources();
    let first = build(&sources);
    let second = build(&sources);

    assert_ne!(first.id(), second.id());
    assert_eq!(shape(&first), shape(&second));
}

// ============================================================================
// 6. CSV sources
// ============================================================================

#[test]
fn test_build_from_csv_files() {
    let dir = tempfile::tempdir().unwrap();
    let write = |name: &str, body: &str| {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    };
    let users = write("users.csv", "user_id,age,gender,location\nu1,25,F,Florida\nu2,,M,\n");
    let orders = write("orders.csv", "user_id,product_id\nu1,p1\nu2,p1\n");
    let products = write("products.csv", "product_id,tag\np1,Crypto\n");
    let missing = dir.path().join("streaming.csv");

    let sources = load_sources([
        ("users", users),
        ("orders", orders),
        ("products", products),
        ("streaming", missing),
    ])
    .unwrap();
    assert_eq!(sources.len(), 3);
    assert!(!sources.contains("streaming"));

    let graph = build(&sources);
    assert_eq!(graph.attribute("u1", "age"), Some(&Value::Int(25)));
    assert_eq!(graph.attribute("u2", "age"), None);
    assert_eq!(graph.attribute("u2", "location"), None);
    assert_eq!(graph.interest_paths("u2", &["purchased"], &["tagged_as"]).len(), 1);
}

#[test]
fn test_all_sources_unreadable_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_sources([("users", dir.path().join("nope.csv"))]).unwrap_err();
    match err {
        Error::DataSource { source_name, .. } => assert_eq!(source_name, "users"),
        other => panic!("unexpected {other:?}"),
    }
}

// ============================================================================
// 7. Malformed schemas
// ============================================================================

#[test]
fn test_malformed_schema_reports_fragment() {
    let err = r#"{"nodes": {"user_id": "user"}, "edges": [{"from": "user_id", "to": "product_id", "relation": "purchased"}]}"#
        .parse::<GraphSchema>()
        .unwrap_err();
    match err {
        Error::Schema { fragment, .. } => assert!(fragment.contains("purchased")),
        other => panic!("unexpected {other:?}"),
    }

    assert!(matches!(r#"{"nodes": {}}"#.parse::<GraphSchema>(), Err(Error::Schema { .. })));
    assert!(matches!(r#"{"nodes": [], "edges": []}"#.parse::<GraphSchema>(), Err(Error::Schema { .. })));
}
