//! Catalog build tests: overlay application and its effect on resolution.

use async_trait::async_trait;
use std::collections::BTreeSet;

use caliper::capabilities::{CapabilityError, TextEmbedder};
use caliper::schema_catalog::{
    CatalogOverlay, ColumnMeta, ForeignKeyMeta, SchemaCatalog, SchemaMetadata, TableMeta,
};

struct UniformEmbedder;

#[async_trait]
impl TextEmbedder for UniformEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, CapabilityError> {
        Ok(vec![1.0, 0.0])
    }
}

fn table(name: &str, columns: &[&str]) -> TableMeta {
    TableMeta {
        name: name.to_string(),
        columns: columns
            .iter()
            .map(|c| ColumnMeta {
                name: c.to_string(),
                sql_type: "int".to_string(),
                nullable: true,
                binary_id: false,
            })
            .collect(),
        context: vec![],
    }
}

fn metadata() -> SchemaMetadata {
    SchemaMetadata {
        tables: vec![
            table("patient", &["patient_id", "coordinator_id"]),
            table("user", &["user_id", "team_id"]),
            table("team", &["team_id"]),
            table("map_patient_metrics", &["patient_id", "metric_value"]),
        ],
        foreign_keys: vec![
            ForeignKeyMeta {
                table: "patient".to_string(),
                column: "coordinator_id".to_string(),
                referenced_table: "user".to_string(),
                referenced_column: "user_id".to_string(),
                weight: 1,
            },
            ForeignKeyMeta {
                table: "user".to_string(),
                column: "team_id".to_string(),
                referenced_table: "team".to_string(),
                referenced_column: "team_id".to_string(),
                weight: 1,
            },
        ],
    }
}

fn required(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[tokio::test]
async fn manual_edge_connects_undeclared_relationship() {
    // map_patient_metrics has no declared foreign key; the overlay supplies
    // the logical join.
    let yaml = r#"
manual_edges:
  - table: map_patient_metrics
    column: patient_id
    referenced_table: patient
    referenced_column: patient_id
"#;
    let overlay: CatalogOverlay = serde_yaml::from_str(yaml).unwrap();
    let catalog = SchemaCatalog::build(metadata(), &overlay, &UniformEmbedder)
        .await
        .unwrap();

    let plan = catalog
        .graph
        .resolve_join_path(&required(&["patient", "map_patient_metrics"]))
        .unwrap();
    assert_eq!(plan.edges.len(), 1);
    assert_eq!(plan.edges[0].join_condition().matches("patient_id").count(), 2);
}

#[tokio::test]
async fn without_manual_edge_the_mapping_table_is_unreachable() {
    let overlay = CatalogOverlay::default();
    let catalog = SchemaCatalog::build(metadata(), &overlay, &UniformEmbedder)
        .await
        .unwrap();
    let err = catalog
        .graph
        .resolve_join_path(&required(&["patient", "user", "map_patient_metrics"]))
        .unwrap_err();
    assert!(err.to_string().contains("map_patient_metrics"));
}

#[tokio::test]
async fn context_lines_land_on_the_named_table() {
    let yaml = r#"
contexts:
  patient:
    - "MAIN PATIENT TABLE - PRIMARY ENTITY"
"#;
    let overlay: CatalogOverlay = serde_yaml::from_str(yaml).unwrap();
    let catalog = SchemaCatalog::build(metadata(), &overlay, &UniformEmbedder)
        .await
        .unwrap();
    let patient = catalog.metadata.table("patient").unwrap();
    assert_eq!(patient.context, vec!["MAIN PATIENT TABLE - PRIMARY ENTITY"]);
    assert!(patient.embedding_text().contains("PRIMARY ENTITY"));
}

#[tokio::test]
async fn weight_override_steers_resolution_away_from_penalized_edge() {
    // patient-user penalized to 10; add a cheap alternative via a manual
    // edge chain so resolution prefers it.
    let yaml = r#"
manual_edges:
  - table: map_patient_metrics
    column: patient_id
    referenced_table: patient
    referenced_column: patient_id
  - table: map_patient_metrics
    column: metric_value
    referenced_table: user
    referenced_column: user_id
weight_overrides:
  - table: patient
    referenced_table: user
    weight: 10
"#;
    let overlay: CatalogOverlay = serde_yaml::from_str(yaml).unwrap();
    let catalog = SchemaCatalog::build(metadata(), &overlay, &UniformEmbedder)
        .await
        .unwrap();
    let plan = catalog
        .graph
        .resolve_join_path(&required(&["patient", "user"]))
        .unwrap();
    assert!(
        plan.tables.contains("map_patient_metrics"),
        "penalized direct edge should lose to the 2-hop route, got {:?}",
        plan.tables
    );
}
