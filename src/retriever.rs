//! Búsqueda híbrida sobre los datasets registrados.
//!
//! Flujo por dataset:
//!   1. Si el dataset tiene embeddings, similitud coseno contra todas las filas.
//!   2. Si el servicio de embeddings falla, el dataset pasa para siempre a
//!      búsqueda por palabras clave y se continúa con el paso 3.
//!   3. Palabras clave: proporción de términos de la consulta contenidos en
//!      el texto; los registros con 0 se descartan.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::dataset_store::DatasetStore;
use crate::llm::{with_timeout, EmbeddingService};
use crate::models::{Dataset, SearchMode, SearchResult};

pub struct Retriever {
    store: Arc<DatasetStore>,
    embedder: Arc<dyn EmbeddingService>,
    timeout: Duration,
}

/// Resultado de una búsqueda sobre varios datasets.
#[derive(Debug, Clone, Default)]
pub struct AggregatedResults {
    pub results: Vec<SearchResult>,
    /// Similitud media de los resultados conservados (0 si no hay ninguno).
    pub confidence: f64,
}

impl AggregatedResults {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl Retriever {
    pub fn new(
        store: Arc<DatasetStore>,
        embedder: Arc<dyn EmbeddingService>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            embedder,
            timeout,
        }
    }

    pub fn store(&self) -> &Arc<DatasetStore> {
        &self.store
    }

    /// Devuelve como mucho `top_k` resultados ordenados por similitud
    /// descendente. Un dataset inexistente produce una lista vacía.
    pub async fn search(&self, query: &str, dataset_name: &str, top_k: usize) -> Vec<SearchResult> {
        let Some(dataset) = self.store.get(dataset_name) else {
            debug!("Dataset '{}' no registrado", dataset_name);
            return Vec::new();
        };
        if top_k == 0 {
            return Vec::new();
        }

        if dataset.mode() == SearchMode::Embedding {
            if let Some(vectors) = dataset.embeddings.as_deref() {
                let width = vectors.first().map(Vec::len);
                let failure = match with_timeout(self.timeout, self.embedder.embed(query)).await {
                    Ok(query_vec) if width.map_or(true, |w| w == query_vec.len()) => {
                        return embedding_search(&dataset, vectors, &query_vec, top_k);
                    }
                    Ok(query_vec) => format!(
                        "dimensión de la consulta distinta a la del dataset: {} != {}",
                        query_vec.len(),
                        width.unwrap_or_default()
                    ),
                    Err(e) => e.to_string(),
                };
                if dataset.fallback_to_keyword() {
                    warn!(
                        "Búsqueda por embeddings fallida en '{}', se usará texto: {}",
                        dataset_name, failure
                    );
                }
            }
        }

        keyword_search(&dataset, query, top_k)
    }

    /// Busca en cada dataset por separado (en paralelo), etiqueta cada
    /// resultado con su dataset, ordena el conjunto y conserva `top_k`.
    pub async fn search_many(
        &self,
        query: &str,
        dataset_names: &[String],
        top_k: usize,
    ) -> AggregatedResults {
        let searches = dataset_names.iter().map(|name| async move {
            let mut results = self.search(query, name, top_k).await;
            for r in &mut results {
                r.dataset_name = Some(name.clone());
            }
            results
        });
        let per_dataset = join_all(searches).await;
        aggregate(per_dataset.into_iter().flatten().collect(), top_k)
    }
}

/// Ordena (estable) por similitud descendente, trunca a `top_k` y calcula
/// la confianza media. Mezcla puntuaciones coseno y de palabras clave tal cual.
pub fn aggregate(mut results: Vec<SearchResult>, top_k: usize) -> AggregatedResults {
    sort_by_similarity(&mut results);
    results.truncate(top_k);
    let confidence = mean_similarity(&results);
    AggregatedResults {
        results,
        confidence,
    }
}

pub fn mean_similarity(results: &[SearchResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    results.iter().map(|r| r.similarity).sum::<f64>() / results.len() as f64
}

fn sort_by_similarity(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
}

/// Similitud coseno; 0 si alguno de los vectores tiene norma 0 o las
/// dimensiones no coinciden.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

fn embedding_search(
    dataset: &Dataset,
    vectors: &[Vec<f64>],
    query_vec: &[f64],
    top_k: usize,
) -> Vec<SearchResult> {
    // Sólo se puntúan filas que existan en las tres tablas.
    let rows = vectors.len().min(dataset.text_records.len());
    let mut scored: Vec<(usize, f64)> = (0..rows)
        .map(|idx| (idx, cosine_similarity(query_vec, &vectors[idx])))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_k);
    scored
        .into_iter()
        .map(|(idx, similarity)| to_result(dataset, idx, similarity))
        .collect()
}

fn keyword_search(dataset: &Dataset, query: &str, top_k: usize) -> Vec<SearchResult> {
    let query_lower = query.to_lowercase();
    let terms: Vec<&str> = query_lower.split_whitespace().collect();
    if terms.is_empty() {
        return Vec::new();
    }

    let mut results: Vec<SearchResult> = dataset
        .text_records
        .iter()
        .enumerate()
        .filter_map(|(idx, text)| {
            let text_lower = text.to_lowercase();
            let hits = terms.iter().filter(|t| text_lower.contains(*t)).count();
            (hits > 0).then(|| to_result(dataset, idx, hits as f64 / terms.len() as f64))
        })
        .collect();
    sort_by_similarity(&mut results);
    results.truncate(top_k);
    results
}

fn to_result(dataset: &Dataset, idx: usize, similarity: f64) -> SearchResult {
    SearchResult {
        content: dataset.text_records[idx].clone(),
        similarity,
        metadata: dataset.metadata_records.get(idx).cloned().unwrap_or_default(),
        source_index: idx,
        dataset_name: None,
    }
}
