#![allow(clippy::unwrap_used, clippy::expect_used)]

use colvec_core::*;
use serde_json::json;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// 1. Config: full TOML document with every field
// ---------------------------------------------------------------------------

#[test]
fn config_full_toml_document() {
    let config = PipelineConfig::from_toml_str(
        r#"
        table_name = "colbert_example"
        dimension = 128
        doc_pool_factor = 3
        query_pool_distance = 0.05
        default_concurrency_limit = 4
        n_ann_tokens = 200
        n_maxsim_candidates = 15
        call_timeout_ms = 2500

        [embedder]
        model_name = "colbert-ir/colbertv2.0"
        device = "cuda"
        "#,
    )
    .unwrap();

    assert_eq!(config.dimension, 128);
    assert_eq!(config.effective_doc_pool_factor(), Some(3));
    assert_eq!(config.n_ann_tokens, 200);
    assert_eq!(config.n_maxsim_candidates, 15);
    assert_eq!(config.call_timeout().unwrap().as_millis(), 2500);
    assert_eq!(config.embedder.device, "cuda");

    // Serializing and re-parsing yields the same config.
    let rendered = toml::to_string(&config).unwrap();
    let reparsed = PipelineConfig::from_toml_str(&rendered).unwrap();
    assert_eq!(reparsed, config);
}

// ---------------------------------------------------------------------------
// 2. Config: builder and validation agree
// ---------------------------------------------------------------------------

#[test]
fn config_builder_matches_validation() {
    let config = PipelineConfig::new("docs", 96)
        .with_embedder("answerdotai/answerai-colbert-small-v1", "cpu")
        .with_doc_pool_factor(Some(2))
        .with_query_pool_distance(0.03)
        .with_concurrency_limit(5)
        .with_search_defaults(200, 20);
    config.validate().unwrap();

    let err = config.clone().with_concurrency_limit(0).validate().unwrap_err();
    assert!(err.to_string().contains("default_concurrency_limit"));
}

// ---------------------------------------------------------------------------
// 3. Filters over realistic document metadata
// ---------------------------------------------------------------------------

#[test]
fn filter_selects_education_documents() {
    let docs: Vec<Metadata> = [
        json!({"source": "docs", "topic": "database", "category": "technical"}),
        json!({"source": "wiki", "topic": "programming", "category": "education"}),
        json!({"source": "course", "topic": "ai", "category": "education"}),
    ]
    .into_iter()
    .map(|v| serde_json::from_value(v).unwrap())
    .collect();

    let education = FilterCondition::eq("category", "education");
    let selected: Vec<usize> = docs
        .iter()
        .enumerate()
        .filter(|(_, m)| education.matches(m))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(selected, vec![1, 2]);

    let not_wiki = education.and(FilterCondition::field("source", FilterOp::Ne, "wiki"));
    let selected: Vec<usize> = docs
        .iter()
        .enumerate()
        .filter(|(_, m)| not_wiki.matches(m))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(selected, vec![2]);
}

#[test]
fn filter_roundtrips_through_json() {
    let cond = FilterCondition::Any(vec![
        FilterCondition::contains("source", "doc"),
        FilterCondition::field("year", FilterOp::Gte, 2020).negate(),
    ]);
    let json = serde_json::to_string(&cond).unwrap();
    let back: FilterCondition = serde_json::from_str(&json).unwrap();
    assert_eq!(back, cond);
}

// ---------------------------------------------------------------------------
// 4. Document records
// ---------------------------------------------------------------------------

#[test]
fn document_view_hides_tokens() {
    let mut metadata = Metadata::new();
    metadata.insert("topic".into(), json!("search"));
    let record = DocumentRecord::new(
        Uuid::new_v4(),
        "vector search",
        metadata.clone(),
        vec![vec![0.0; 4]; 2],
    );
    let doc: Document = record.clone().into();

    assert_eq!(doc.id, record.id);
    assert_eq!(doc.metadata, metadata);
    assert_eq!(doc.token_count, 2);
    assert_eq!(doc.created_at, record.created_at);
}

#[test]
fn error_display_carries_context() {
    let err = ColvecError::ArityMismatch { contents: 3, metadata: 2 };
    assert_eq!(err.to_string(), "Arity mismatch: 3 contents but 2 metadata entries");

    let err = ColvecError::NotInitialized("search".into());
    assert!(err.to_string().contains("before search"));
}
