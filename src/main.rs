use std::sync::{Arc, Mutex};

use anyhow::Context;
use axum::Router;
use nori_rag::{
    api,
    app_state::{AppState, Status},
    config::AppConfig,
    dataset_store::DatasetStore,
    embedding_cache::EmbeddingCache,
    llm::LlmManager,
    rag::RagPipeline,
    retriever::Retriever,
};
use tokio::sync::oneshot;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Cargar configuración
    let cfg = AppConfig::from_env().context("Error al cargar la configuración")?;
    info!(
        "Proveedor {:?} (chat: {}, embeddings: {}, Ollama en {})",
        cfg.llm_provider, cfg.llm_chat_model, cfg.llm_embedding_model, cfg.ollama_base_url
    );

    // 3. Cargar datasets
    let store = Arc::new(DatasetStore::new());
    let loaded = store.load_all(&cfg.datasets, &cfg.data_dir);
    let ok = loaded.iter().filter(|(_, ok)| *ok).count();
    if ok == 0 {
        warn!("No se cargó ningún dataset; las respuestas no tendrán contexto.");
    } else {
        info!("{}/{} datasets cargados.", ok, loaded.len());
    }

    // 4. Inicializar gestor de LLMs y el pipeline
    let llm_manager = Arc::new(LlmManager::from_config(&cfg));
    let retriever = Retriever::new(store.clone(), llm_manager.clone(), cfg.request_timeout);
    let pipeline = Arc::new(RagPipeline::new(
        retriever,
        llm_manager.clone(),
        cfg.confidence_threshold,
        cfg.request_timeout,
    ));

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState {
        config: cfg.clone(),
        store,
        pipeline,
        embedder: llm_manager,
        embedding_cache: EmbeddingCache::new(cfg.embedding_cache_dir.clone()),
        status: Arc::new(Mutex::new(Status {
            is_busy: false,
            message: "Servidor listo.".to_string(),
            progress: 0.0,
        })),
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    // 6. Router de la API y ficheros estáticos
    let app = Router::new()
        .merge(api::create_router(app_state))
        .fallback_service(ServeDir::new("frontend"))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 7. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {}", cfg.server_addr))?;
    let server_url = format!("http://{}", cfg.server_addr);
    info!("🚀 Servidor escuchando en {}", &server_url);

    if cfg.open_browser && webbrowser::open(&server_url).is_err() {
        info!("No se pudo abrir el navegador. Por favor, accede a {} manualmente.", server_url);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await
        .context("Error en el servidor HTTP")?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
