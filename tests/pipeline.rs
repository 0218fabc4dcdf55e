use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ndarray::array;
use ndarray_npy::write_npy;
use tempfile::TempDir;

use nori_rag::app_state::Status;
use nori_rag::config::DatasetSpec;
use nori_rag::dataset_store::DatasetStore;
use nori_rag::embedding_cache::EmbeddingCache;
use nori_rag::error::{PipelineError, ServiceError};
use nori_rag::ingest::{Ingestor, UPLOAD_DATASET_NAME};
use nori_rag::llm::{EmbeddingService, GenerationService};
use nori_rag::models::{Dataset, Metadata, QuestionCategory, SearchMode};
use nori_rag::prompt::{PromptTemplate, LOW_CONFIDENCE_MARKER, NO_RESULTS_MARKER};
use nori_rag::rag::RagPipeline;
use nori_rag::retriever::Retriever;

struct FixedEmbedder(Vec<f64>);

#[async_trait]
impl EmbeddingService for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f64>, ServiceError> {
        Ok(self.0.clone())
    }
}

struct DownEmbedder;

#[async_trait]
impl EmbeddingService for DownEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f64>, ServiceError> {
        Err(ServiceError::Unavailable("connection refused".into()))
    }
}

/// Devuelve una respuesta fija y guarda los prompts recibidos.
#[derive(Default)]
struct RecordingGenerator {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl GenerationService for RecordingGenerator {
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("스쿼트를 3세트 해보세요.".to_string())
    }
}

struct DownGenerator;

#[async_trait]
impl GenerationService for DownGenerator {
    async fn complete(&self, _prompt: &str) -> Result<String, ServiceError> {
        Err(ServiceError::Unavailable("model not found".into()))
    }
}

struct SlowGenerator;

#[async_trait]
impl GenerationService for SlowGenerator {
    async fn complete(&self, _prompt: &str) -> Result<String, ServiceError> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok("late".into())
    }
}

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn exercise_dataset(name: &str, texts: &[&str], embeddings: Option<Vec<Vec<f64>>>) -> Dataset {
    let metadata = texts
        .iter()
        .map(|t| {
            let mut row = Metadata::new();
            row.insert("운동명".to_string(), t.to_string());
            row
        })
        .collect();
    Dataset::new(
        name,
        texts.iter().map(|t| t.to_string()).collect(),
        metadata,
        vec!["운동명".to_string()],
        embeddings,
    )
}

fn pipeline(
    store: Arc<DatasetStore>,
    embedder: Arc<dyn EmbeddingService>,
    generator: Arc<dyn GenerationService>,
    timeout: Duration,
) -> RagPipeline {
    let retriever = Retriever::new(store, embedder, timeout);
    RagPipeline::new(retriever, generator, 0.3, timeout)
}

#[test]
fn inconsistent_embeddings_are_reported_but_loaded() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "text.csv", "text\n스쿼트\n런지\n플랭크\n");
    write_file(
        dir.path(),
        "meta.csv",
        "운동명,운동 부위\n스쿼트,하체\n런지,하체\n플랭크,복부\n",
    );
    write_npy(dir.path().join("emb.npy"), &array![[1.0_f64, 0.0], [0.0, 1.0]]).unwrap();

    let store = DatasetStore::new();
    let spec = DatasetSpec::parse("테스트=text.csv;meta.csv;emb.npy").unwrap();
    let loaded = store.load_all(&[spec], dir.path());
    assert_eq!(loaded, vec![("테스트".to_string(), true)]);

    let report = store.consistency_report("테스트").unwrap();
    assert!(!report.is_consistent());
    assert!(report.mismatches().iter().any(|m| m.contains("3 != 2")));
    assert!(!store.validate_consistency("테스트"));

    let info = store.info("테스트").unwrap();
    assert_eq!(info.embedding_shape, Some((2, 2)));
    assert_eq!(info.mode, SearchMode::Embedding);
}

#[test]
fn missing_text_source_is_fatal_for_that_dataset_only() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "text.csv", "text\n스쿼트\n");
    write_file(dir.path(), "meta.csv", "운동명\n스쿼트\n");

    let store = DatasetStore::new();
    let specs = [
        DatasetSpec::parse("ok=text.csv;meta.csv;missing.npy").unwrap(),
        DatasetSpec::parse("broken=nope.csv;meta.csv;missing.npy").unwrap(),
    ];
    let loaded = store.load_all(&specs, dir.path());
    assert_eq!(loaded[0], ("ok".to_string(), true));
    assert_eq!(loaded[1], ("broken".to_string(), false));
    assert_eq!(store.list_names(), vec!["ok".to_string()]);
    // Sin embeddings, el dataset queda en modo de palabras clave.
    assert_eq!(store.get("ok").unwrap().mode(), SearchMode::Keyword);
}

#[tokio::test]
async fn embedding_outage_switches_dataset_to_keywords_and_still_answers() {
    let store = Arc::new(DatasetStore::new());
    store.insert(exercise_dataset(
        "실제 데이터",
        &["무릎 강화 스쿼트", "어깨 스트레칭", "무릎 보호 런지"],
        Some(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]]),
    ));
    let generator = Arc::new(RecordingGenerator::default());
    let rag = pipeline(
        store.clone(),
        Arc::new(DownEmbedder),
        generator.clone(),
        Duration::from_secs(1),
    );

    let answer = rag.ask("무릎 운동", &[], 5).await.unwrap();
    assert_eq!(store.get("실제 데이터").unwrap().mode(), SearchMode::Keyword);
    assert_eq!(answer.sources.len(), 2);
    assert!(answer.sources.iter().all(|r| r.similarity > 0.0));
    assert!(answer
        .sources
        .iter()
        .all(|r| r.dataset_name.as_deref() == Some("실제 데이터")));
    assert_eq!(answer.template, PromptTemplate::Confident);
    assert_eq!(generator.prompts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn no_results_use_the_no_results_prompt() {
    let store = Arc::new(DatasetStore::new());
    store.insert(exercise_dataset("a", &["어깨 스트레칭"], None));
    let generator = Arc::new(RecordingGenerator::default());
    let rag = pipeline(
        store,
        Arc::new(DownEmbedder),
        generator.clone(),
        Duration::from_secs(1),
    );

    let answer = rag.ask("허리", &[], 5).await.unwrap();
    assert!(answer.sources.is_empty());
    assert_eq!(answer.confidence, 0.0);
    assert_eq!(answer.template, PromptTemplate::NoResults);
    let prompts = generator.prompts.lock().unwrap();
    assert!(prompts[0].contains(NO_RESULTS_MARKER));

    let stats = rag.stats();
    assert_eq!(stats.total_searches, 1);
    assert!(stats.datasets_used.is_empty());
}

#[tokio::test]
async fn weak_matches_use_the_low_confidence_prompt() {
    let store = Arc::new(DatasetStore::new());
    store.insert(exercise_dataset(
        "a",
        &["스쿼트", "런지"],
        Some(vec![vec![1.0, 0.0], vec![0.0, 1.0]]),
    ));
    let generator = Arc::new(RecordingGenerator::default());
    // Coseno ~0.196 con la primera fila y negativo con la segunda.
    let rag = pipeline(
        store,
        Arc::new(FixedEmbedder(vec![0.2, -1.0])),
        generator.clone(),
        Duration::from_secs(1),
    );

    let answer = rag.ask("하체 운동", &[], 1).await.unwrap();
    assert_eq!(answer.sources.len(), 1);
    assert!(answer.confidence < 0.3);
    assert_eq!(answer.template, PromptTemplate::LowConfidence);
    assert!(generator.prompts.lock().unwrap()[0].contains(LOW_CONFIDENCE_MARKER));
}

#[tokio::test]
async fn cross_dataset_results_are_merged_and_truncated() {
    let store = Arc::new(DatasetStore::new());
    store.insert(exercise_dataset(
        "a",
        &["a0", "a1"],
        Some(vec![vec![1.0, 0.0], vec![0.6, 0.8]]),
    ));
    store.insert(exercise_dataset(
        "b",
        &["b0", "b1"],
        Some(vec![vec![0.8, 0.6], vec![0.0, 1.0]]),
    ));
    let rag = pipeline(
        store,
        Arc::new(FixedEmbedder(vec![1.0, 0.0])),
        Arc::new(RecordingGenerator::default()),
        Duration::from_secs(1),
    );

    let answer = rag.ask("질문", &["a".into(), "b".into()], 3).await.unwrap();
    let order: Vec<&str> = answer.sources.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(order, vec!["a0", "b0", "a1"]);
    assert!((answer.confidence - (1.0 + 0.8 + 0.6) / 3.0).abs() < 1e-9);
    assert_eq!(answer.datasets, vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn default_selection_takes_the_first_three_datasets() {
    let store = Arc::new(DatasetStore::new());
    for name in ["d1", "d2", "d3", "d4"] {
        store.insert(exercise_dataset(name, &["x"], None));
    }
    let rag = pipeline(
        store,
        Arc::new(DownEmbedder),
        Arc::new(RecordingGenerator::default()),
        Duration::from_secs(1),
    );
    assert_eq!(rag.resolve_selection(&[]), vec!["d1", "d2", "d3"]);
    assert_eq!(rag.resolve_selection(&["d4".to_string()]), vec!["d4"]);
}

#[tokio::test]
async fn generation_failures_reach_the_caller() {
    let store = Arc::new(DatasetStore::new());
    let rag = pipeline(
        store.clone(),
        Arc::new(DownEmbedder),
        Arc::new(DownGenerator),
        Duration::from_secs(1),
    );
    let err = rag.ask("무릎이 아파요", &[], 5).await.unwrap_err();
    assert!(matches!(err, PipelineError::Generation(ref m) if m.contains("model not found")));
    assert_eq!(rag.stats().total_searches, 0);

    let rag = pipeline(
        store,
        Arc::new(DownEmbedder),
        Arc::new(SlowGenerator),
        Duration::from_millis(20),
    );
    let err = rag.ask("무릎이 아파요", &[], 5).await.unwrap_err();
    assert!(matches!(err, PipelineError::GenerationTimeout(_)));
}

#[tokio::test]
async fn answer_carries_question_analysis() {
    let rag = pipeline(
        Arc::new(DatasetStore::new()),
        Arc::new(DownEmbedder),
        Arc::new(RecordingGenerator::default()),
        Duration::from_secs(1),
    );
    let answer = rag.ask("무릎이 아파요", &[], 5).await.unwrap();
    assert_eq!(answer.analysis.category, QuestionCategory::PainAndHealth);
    assert!(!answer.answer.is_empty());
}

#[test]
fn uploaded_files_become_a_searchable_dataset() {
    let dir = TempDir::new().unwrap();
    let docs = dir.path().join("docs");
    fs::create_dir(&docs).unwrap();
    write_file(&docs, "스쿼트.txt", "스쿼트는 하체 강화에 좋은 운동입니다.");
    write_file(&docs, "image.png", "not text");

    let store = DatasetStore::new();
    let cache = EmbeddingCache::new(dir.path().join("cache"));
    let embedder = FixedEmbedder(vec![1.0, 0.0]);
    let status = Arc::new(Mutex::new(Status::default()));

    let ingestor = Ingestor {
        store: &store,
        embedder: &embedder,
        cache: &cache,
        embedding_model: "bge-m3",
        timeout: Duration::from_secs(1),
    };
    let summary = tokio_test::block_on(ingestor.ingest_path(&docs, status.clone())).unwrap();
    assert_eq!(summary.files_scanned, 2);
    assert_eq!(summary.files_ingested, 1);
    assert_eq!(summary.files_skipped, 1);
    assert_eq!(summary.cache_hits, 0);
    assert!(!summary.keyword_only);

    let dataset = store.get(UPLOAD_DATASET_NAME).unwrap();
    assert_eq!(dataset.len(), 1);
    assert_eq!(dataset.mode(), SearchMode::Embedding);
    assert_eq!(dataset.metadata_records[0]["운동명"], "스쿼트.txt");

    // La segunda ingesta del mismo fichero sale de la caché.
    let again = tokio_test::block_on(ingestor.ingest_path(&docs, status)).unwrap();
    assert_eq!(again.cache_hits, 1);
}

#[test]
fn upload_without_embeddings_is_keyword_only() {
    let dir = TempDir::new().unwrap();
    let file = write_file(dir.path(), "notes.md", "런지 10회\n\n플랭크 30초");

    let store = DatasetStore::new();
    let cache = EmbeddingCache::new(dir.path().join("cache"));
    let ingestor = Ingestor {
        store: &store,
        embedder: &DownEmbedder,
        cache: &cache,
        embedding_model: "bge-m3",
        timeout: Duration::from_secs(1),
    };
    let summary = tokio_test::block_on(
        ingestor.ingest_path(&file, Arc::new(Mutex::new(Status::default()))),
    )
    .unwrap();
    assert!(summary.keyword_only);
    assert_eq!(
        store.get(UPLOAD_DATASET_NAME).unwrap().mode(),
        SearchMode::Keyword
    );
}
