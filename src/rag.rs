//! Orquestación de una consulta RAG.
//!
//! Flujo:
//!   1. Análisis de la pregunta (categoría, parte del cuerpo, objetivo).
//!   2. Búsqueda en los datasets seleccionados y agregación.
//!   3. Construcción del prompt según la confianza obtenida.
//!   4. Llamada al servicio de generación (los errores llegan al usuario).
//!   5. Actualización de las estadísticas de uso.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    analyzer::QuestionAnalyzer,
    error::PipelineError,
    llm::{with_timeout, GenerationService},
    models::{PromptRequest, QuestionAnalysis, SearchResult},
    prompt::{format_context, PromptBuilder, PromptTemplate},
    retriever::Retriever,
};

/// Número de datasets que se consultan cuando no se selecciona ninguno.
pub const DEFAULT_DATASET_SELECTION: usize = 3;

#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageStats {
    pub total_searches: u64,
    pub avg_response_time_secs: f64,
    pub datasets_used: BTreeSet<String>,
    pub last_query_at: Option<DateTime<Utc>>,
}

impl UsageStats {
    fn record(&mut self, elapsed: Duration, datasets: &[String]) {
        self.total_searches += 1;
        let n = self.total_searches as f64;
        self.avg_response_time_secs =
            (self.avg_response_time_secs * (n - 1.0) + elapsed.as_secs_f64()) / n;
        self.datasets_used.extend(datasets.iter().cloned());
        self.last_query_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub id: Uuid,
    pub answer: String,
    pub analysis: QuestionAnalysis,
    pub sources: Vec<SearchResult>,
    pub confidence: f64,
    pub template: PromptTemplate,
    pub datasets: Vec<String>,
}

pub struct RagPipeline {
    analyzer: QuestionAnalyzer,
    retriever: Retriever,
    builder: PromptBuilder,
    generator: Arc<dyn GenerationService>,
    confidence_threshold: f64,
    timeout: Duration,
    stats: Mutex<UsageStats>,
}

impl RagPipeline {
    pub fn new(
        retriever: Retriever,
        generator: Arc<dyn GenerationService>,
        confidence_threshold: f64,
        timeout: Duration,
    ) -> Self {
        Self {
            analyzer: QuestionAnalyzer::new(),
            retriever,
            builder: PromptBuilder::new(),
            generator,
            confidence_threshold,
            timeout,
            stats: Mutex::new(UsageStats::default()),
        }
    }

    pub fn analyzer(&self) -> &QuestionAnalyzer {
        &self.analyzer
    }

    pub fn stats(&self) -> UsageStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Datasets a consultar: la selección indicada o, si está vacía, los
    /// primeros registrados.
    pub fn resolve_selection(&self, selected: &[String]) -> Vec<String> {
        if selected.is_empty() {
            self.retriever
                .store()
                .list_names()
                .into_iter()
                .take(DEFAULT_DATASET_SELECTION)
                .collect()
        } else {
            selected.to_vec()
        }
    }

    pub async fn ask(
        &self,
        question: &str,
        selected: &[String],
        top_k: usize,
    ) -> Result<RagAnswer, PipelineError> {
        let started = Instant::now();
        let datasets = self.resolve_selection(selected);

        // 1) Análisis
        let analysis = self.analyzer.analyze(question);

        // 2) Búsqueda y agregación
        let aggregated = self.retriever.search_many(question, &datasets, top_k).await;
        let found = !aggregated.is_empty();

        // 3) Prompt
        let request = PromptRequest {
            context: format_context(&aggregated.results),
            question: question.to_string(),
            dataset_names: datasets.clone(),
            confidence_threshold: self.confidence_threshold,
            confidence: found.then_some(aggregated.confidence),
        };
        let template = self.builder.select(&request);
        let prompt = self.builder.build(&request, &analysis);
        info!(
            "Pregunta clasificada como '{}' ({} resultados, confianza {:.3}, plantilla {:?})",
            analysis.category,
            aggregated.results.len(),
            aggregated.confidence,
            template
        );

        // 4) Generación
        let answer = with_timeout(self.timeout, self.generator.complete(&prompt))
            .await
            .map_err(|e| {
                error!("Error del servicio de generación: {}", e);
                PipelineError::from(e)
            })?;

        // 5) Estadísticas
        let used: &[String] = if found { &datasets } else { &[] };
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(started.elapsed(), used);

        Ok(RagAnswer {
            id: Uuid::new_v4(),
            answer,
            analysis,
            sources: aggregated.results,
            confidence: aggregated.confidence,
            template,
            datasets,
        })
    }
}
