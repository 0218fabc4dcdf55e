use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use crate::{
    config::AppConfig, dataset_store::DatasetStore, embedding_cache::EmbeddingCache,
    llm::EmbeddingService, rag::RagPipeline,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<DatasetStore>,
    pub pipeline: Arc<RagPipeline>,
    pub embedder: Arc<dyn EmbeddingService>,
    pub embedding_cache: EmbeddingCache,
    pub status: Arc<Mutex<Status>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
}
