use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::spawn;
use tracing::{error, info};

use crate::{
    app_state::{AppState, Status},
    config::MAX_TOP_K,
    ingest::Ingestor,
    models::{DatasetInfo, DatasetSample},
    rag::{RagAnswer, UsageStats},
};

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct ChatPayload {
    question: String,
    #[serde(default)]
    datasets: Vec<String>,
    top_k: Option<usize>,
}

#[derive(Deserialize)]
pub struct UploadPayload {
    path: String,
}

#[derive(Deserialize)]
pub struct SampleQuery {
    n: Option<usize>,
}

#[derive(Serialize)]
pub struct DatasetEntry {
    #[serde(flatten)]
    info: DatasetInfo,
    consistent: bool,
}

#[derive(Serialize)]
pub struct ReloadResponse {
    loaded: Vec<(String, bool)>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/datasets", get(list_datasets_handler))
        .route("/api/datasets/:name/sample", get(sample_handler))
        .route("/api/datasets/reload", post(reload_handler))
        .route("/api/upload", post(upload_handler))
        .route("/api/status", get(status_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatPayload>,
) -> Result<Json<RagAnswer>, ApiError> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "La pregunta está vacía."));
    }
    let top_k = payload
        .top_k
        .unwrap_or(state.config.top_k)
        .clamp(1, MAX_TOP_K);

    match state.pipeline.ask(question, &payload.datasets, top_k).await {
        Ok(answer) => Ok(Json(answer)),
        Err(e) => Err(api_error(
            StatusCode::BAD_GATEWAY,
            format!("Error al generar la respuesta: {}", e),
        )),
    }
}

#[axum::debug_handler]
async fn list_datasets_handler(State(state): State<AppState>) -> Json<Vec<DatasetEntry>> {
    let entries = state
        .store
        .list_names()
        .iter()
        .filter_map(|name| {
            let info = state.store.info(name)?;
            let consistent = state
                .store
                .consistency_report(name)
                .is_some_and(|r| r.is_consistent());
            Some(DatasetEntry { info, consistent })
        })
        .collect();
    Json(entries)
}

#[axum::debug_handler]
async fn sample_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<SampleQuery>,
) -> Result<Json<DatasetSample>, ApiError> {
    state
        .store
        .sample(&name, query.n.unwrap_or(5))
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Dataset '{}' no encontrado.", name)))
}

#[axum::debug_handler]
async fn reload_handler(State(state): State<AppState>) -> Json<ReloadResponse> {
    let store = state.store.clone();
    let specs = state.config.datasets.clone();
    let data_dir = state.config.data_dir.clone();
    let loaded = tokio::task::spawn_blocking(move || store.load_all(&specs, &data_dir))
        .await
        .unwrap_or_else(|e| {
            error!("La recarga de datasets falló: {}", e);
            Vec::new()
        });
    Json(ReloadResponse { loaded })
}

#[axum::debug_handler]
async fn upload_handler(
    State(state): State<AppState>,
    Json(payload): Json<UploadPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let path = PathBuf::from(&payload.path);
    if !path.exists() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "La ruta proporcionada no existe.",
        ));
    }
    if !try_begin_ingestion(&state.status) {
        return Err(api_error(StatusCode::CONFLICT, "Ya hay una ingesta en curso."));
    }

    spawn(async move {
        let ingestor = Ingestor {
            store: &state.store,
            embedder: state.embedder.as_ref(),
            cache: &state.embedding_cache,
            embedding_model: &state.config.llm_embedding_model,
            timeout: state.config.request_timeout,
        };
        let result = ingestor.ingest_path(&path, state.status.clone()).await;

        let mut status = state.status.lock().unwrap_or_else(PoisonError::into_inner);
        status.is_busy = false;
        status.progress = 0.0;
        match result {
            Ok(summary) => {
                status.message = format!("¡Ingesta completada! {}", summary);
            }
            Err(err) => {
                status.message = format!("Error en la ingesta: {}", err);
                error!("Error de ingesta: {}", err);
            }
        }
    });

    Ok(StatusCode::ACCEPTED)
}

/// Marca el estado como ocupado bajo el mismo bloqueo en que se comprueba.
/// Devuelve `false` si ya había una ingesta en curso.
fn try_begin_ingestion(status: &Mutex<Status>) -> bool {
    let mut status = status.lock().unwrap_or_else(PoisonError::into_inner);
    if status.is_busy {
        return false;
    }
    status.is_busy = true;
    status.message = "Iniciando ingesta...".to_string();
    status.progress = 0.0;
    true
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(
        state
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone(),
    )
}

#[axum::debug_handler]
async fn stats_handler(State(state): State<AppState>) -> Json<UsageStats> {
    Json(state.pipeline.stats())
}

// --- Handler de Apagado ---

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = state
        .shutdown_sender
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
    {
        let _ = sender.send(());
    }
    StatusCode::OK
}
