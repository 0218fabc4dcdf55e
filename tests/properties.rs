use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use proptest::prelude::*;

use nori_rag::analyzer::QuestionAnalyzer;
use nori_rag::dataset_store::DatasetStore;
use nori_rag::error::ServiceError;
use nori_rag::llm::EmbeddingService;
use nori_rag::models::{Dataset, Metadata, QuestionCategory, SearchResult};
use nori_rag::retriever::{aggregate, cosine_similarity, Retriever};

struct FixedEmbedder(Vec<f64>);

#[async_trait]
impl EmbeddingService for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f64>, ServiceError> {
        Ok(self.0.clone())
    }
}

const WORDS: [&str; 8] = ["무릎", "허리", "스쿼트", "런지", "어깨", "강화", "운동", "통증"];

fn texts() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        prop::collection::vec(prop::sample::select(WORDS.to_vec()), 1..5).prop_map(|w| w.join(" ")),
        1..20,
    )
}

fn result(similarity: f64, index: usize) -> SearchResult {
    SearchResult {
        content: format!("r{index}"),
        similarity,
        metadata: Metadata::new(),
        source_index: index,
        dataset_name: None,
    }
}

fn retriever_with(dataset: Dataset, embedder: Vec<f64>) -> Retriever {
    let store = DatasetStore::new();
    store.insert(dataset);
    Retriever::new(
        Arc::new(store),
        Arc::new(FixedEmbedder(embedder)),
        Duration::from_secs(1),
    )
}

fn is_sorted_desc(results: &[SearchResult]) -> bool {
    results.windows(2).all(|w| w[0].similarity >= w[1].similarity)
}

proptest! {
    #[test]
    fn keyword_search_is_bounded_sorted_and_positive(
        records in texts(),
        query in prop::collection::vec(prop::sample::select(WORDS.to_vec()), 1..4),
        top_k in 0usize..10,
    ) {
        let n = records.len();
        let dataset = Dataset::new("kw", records, vec![Metadata::new(); n], vec![], None);
        let retriever = retriever_with(dataset, vec![]);
        let results = tokio_test::block_on(retriever.search(&query.join(" "), "kw", top_k));

        prop_assert!(results.len() <= top_k);
        prop_assert!(is_sorted_desc(&results));
        prop_assert!(results.iter().all(|r| r.similarity > 0.0 && r.similarity <= 1.0));
    }

    #[test]
    fn embedding_search_returns_min_of_k_and_rows(
        rows in prop::collection::vec(prop::collection::vec(-1.0f64..1.0, 3), 1..15),
        query in prop::collection::vec(-1.0f64..1.0, 3),
        top_k in 1usize..20,
    ) {
        let n = rows.len();
        let dataset = Dataset::new(
            "emb",
            (0..n).map(|i| format!("t{i}")).collect(),
            vec![Metadata::new(); n],
            vec![],
            Some(rows),
        );
        let retriever = retriever_with(dataset, query);
        let results = tokio_test::block_on(retriever.search("q", "emb", top_k));

        prop_assert_eq!(results.len(), top_k.min(n));
        prop_assert!(is_sorted_desc(&results));
        prop_assert!(results.iter().all(|r| (-1.0 - 1e-9..=1.0 + 1e-9).contains(&r.similarity)));
    }

    #[test]
    fn aggregation_keeps_min_of_k_and_total(
        scores in prop::collection::vec(0.0f64..1.0, 0..30),
        top_k in 0usize..25,
    ) {
        let total = scores.len();
        let results = scores.iter().enumerate().map(|(i, s)| result(*s, i)).collect();
        let agg = aggregate(results, top_k);

        prop_assert_eq!(agg.results.len(), top_k.min(total));
        prop_assert!(is_sorted_desc(&agg.results));
        if agg.results.is_empty() {
            prop_assert_eq!(agg.confidence, 0.0);
        } else {
            let mean = agg.results.iter().map(|r| r.similarity).sum::<f64>()
                / agg.results.len() as f64;
            prop_assert!((agg.confidence - mean).abs() < 1e-9);
        }
    }

    #[test]
    fn cosine_is_symmetric_and_bounded(
        a in prop::collection::vec(-10.0f64..10.0, 4),
        b in prop::collection::vec(-10.0f64..10.0, 4),
    ) {
        let ab = cosine_similarity(&a, &b);
        prop_assert!((ab - cosine_similarity(&b, &a)).abs() < 1e-12);
        prop_assert!((-1.0 - 1e-9..=1.0 + 1e-9).contains(&ab));
    }

    #[test]
    fn classification_is_total_and_deterministic(question in "\\PC{0,40}") {
        let analyzer = QuestionAnalyzer::new();
        let first = analyzer.classify(&question);
        prop_assert!(QuestionCategory::ALL.contains(&first));
        prop_assert_eq!(first, analyzer.classify(&question));
    }
}

#[test]
fn equal_scores_keep_insertion_order() {
    let results = vec![result(0.5, 0), result(0.9, 1), result(0.5, 2)];
    let agg = aggregate(results, 3);
    let order: Vec<usize> = agg.results.iter().map(|r| r.source_index).collect();
    assert_eq!(order, vec![1, 0, 2]);
}
