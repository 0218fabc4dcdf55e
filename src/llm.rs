//! Servicios externos de embeddings y generación.
//!
//! El núcleo sólo conoce los traits `EmbeddingService` y `GenerationService`;
//! `LlmManager` los implementa sobre Rig (Ollama u OpenAI).

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rig::completion::Prompt;
use rig::embeddings::EmbeddingModel; // <- para .embed_texts
use tracing::debug;

use crate::config::{AppConfig, LlmProvider};
use crate::error::ServiceError;

/// `embed(text) -> vector` de dimensión fija.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f64>, ServiceError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, ServiceError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// `complete(prompt) -> texto`, una única llamada bloqueante.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError>;
}

/// Ejecuta una llamada externa con límite de tiempo; el timeout se trata
/// igual que un error explícito del servicio.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::Timeout(limit)),
    }
}

/// Gestor de LLMs y embeddings.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub embedding_model: String,
    pub chat_model: String,
    pub dimensions: usize,
    pub temperature: f64,
    pub max_tokens: u64,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            provider: cfg.llm_provider.clone(),
            embedding_model: cfg.llm_embedding_model.clone(),
            chat_model: cfg.llm_chat_model.clone(),
            dimensions: cfg.llm_embedding_dimensions,
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
        }
    }

    // ---------------------------------------------------------------------
    // EMBEDDINGS
    // ---------------------------------------------------------------------

    async fn embed_texts(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f64>>> {
        use rig::client::EmbeddingsClient as _;
        use rig::client::ProviderClient as _;

        let expected = texts.len();
        let embeddings = match self.provider {
            LlmProvider::Ollama => {
                use rig::providers::ollama;
                let client = ollama::Client::from_env();
                client
                    .embedding_model(&self.embedding_model)
                    .embed_texts(texts)
                    .await?
            }
            LlmProvider::OpenAI => {
                use rig::providers::openai;
                let client = openai::Client::from_env();
                client
                    .embedding_model(&self.embedding_model)
                    .embed_texts(texts)
                    .await?
            }
        };

        if embeddings.len() != expected {
            anyhow::bail!(
                "Número de embeddings ({}) distinto al número de textos ({})",
                embeddings.len(),
                expected
            );
        }
        let vectors: Vec<Vec<f64>> = embeddings.into_iter().map(|e| e.vec).collect();
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimensions) {
            anyhow::bail!(
                "Dimensión de embedding inesperada: {} (se esperaba {})",
                bad.len(),
                self.dimensions
            );
        }
        Ok(vectors)
    }

    // ---------------------------------------------------------------------
    // CHAT / COMPLETION
    // ---------------------------------------------------------------------

    async fn prompt_model(&self, prompt: &str) -> anyhow::Result<String> {
        use rig::client::CompletionClient as _;
        use rig::client::ProviderClient as _;

        debug!("Enviando prompt de {} caracteres a {}", prompt.len(), self.chat_model);
        let answer = match self.provider {
            LlmProvider::Ollama => {
                use rig::providers::ollama;
                let client = ollama::Client::from_env();
                let agent = client
                    .agent(&self.chat_model)
                    .temperature(self.temperature)
                    .max_tokens(self.max_tokens)
                    .build();
                agent.prompt(prompt).await?
            }
            LlmProvider::OpenAI => {
                use rig::providers::openai;
                let client = openai::Client::from_env();
                let agent = client
                    .agent(&self.chat_model)
                    .temperature(self.temperature)
                    .max_tokens(self.max_tokens)
                    .build();
                agent.prompt(prompt).await?
            }
        };
        Ok(answer)
    }
}

#[async_trait]
impl EmbeddingService for LlmManager {
    async fn embed(&self, text: &str) -> Result<Vec<f64>, ServiceError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ServiceError::Unavailable("respuesta de embeddings vacía".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, ServiceError> {
        self.embed_texts(texts.to_vec())
            .await
            .map_err(|e| ServiceError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl GenerationService for LlmManager {
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError> {
        self.prompt_model(prompt)
            .await
            .map_err(|e| ServiceError::Unavailable(e.to_string()))
    }
}
