//! Carga y gestión de configuración de la aplicación (datasets + LLM + búsqueda).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use url::Url;

/// Máximo de resultados que se pueden pedir en una búsqueda.
pub const MAX_TOP_K: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Fuentes de un dataset: tabla de textos, tabla de metadatos y matriz de embeddings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetSpec {
    pub name: String,
    pub text_csv: PathBuf,
    pub metadata_csv: PathBuf,
    pub embeddings_npy: PathBuf,
}

impl DatasetSpec {
    /// Parsea `nombre=texto.csv;metadatos.csv;embeddings.npy`.
    pub fn parse(entry: &str) -> Result<Self> {
        let (name, files) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("Dataset mal definido (falta '='): {entry}"))?;
        let parts: Vec<&str> = files.split(';').map(str::trim).collect();
        let [text, metadata, embeddings] = parts.as_slice() else {
            bail!("Dataset '{name}' debe tener tres ficheros separados por ';'");
        };
        Ok(Self {
            name: name.trim().to_string(),
            text_csv: PathBuf::from(*text),
            metadata_csv: PathBuf::from(*metadata),
            embeddings_npy: PathBuf::from(*embeddings),
        })
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub open_browser: bool,

    pub llm_provider: LlmProvider,
    pub llm_embedding_model: String,
    pub llm_chat_model: String,
    pub llm_embedding_dimensions: usize,
    pub ollama_base_url: Url,
    pub temperature: f64,
    pub max_tokens: u64,

    pub data_dir: PathBuf,
    pub datasets: Vec<DatasetSpec>,
    pub embedding_cache_dir: PathBuf,

    pub top_k: usize,
    pub confidence_threshold: f64,
    pub request_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:3322".to_string(),
            open_browser: true,
            llm_provider: LlmProvider::Ollama,
            llm_embedding_model: "bge-m3".to_string(),
            llm_chat_model: "eeve-korean-10-8b".to_string(),
            llm_embedding_dimensions: 1024,
            ollama_base_url: Url::parse("http://localhost:11434").expect("URL por defecto válida"),
            temperature: 0.7,
            max_tokens: 2048,
            data_dir: PathBuf::from("./data"),
            datasets: vec![DatasetSpec {
                name: "실제 데이터".to_string(),
                text_csv: PathBuf::from("text_ex.csv"),
                metadata_csv: PathBuf::from("full_data_ex.csv"),
                embeddings_npy: PathBuf::from("embeddings_ex.npy"),
            }],
            embedding_cache_dir: default_cache_dir(),
            top_k: 5,
            confidence_threshold: 0.3,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let llm_provider = match env::var("LLM_PROVIDER") {
            Ok(s) => LlmProvider::from_str(&s)?,
            Err(_) => defaults.llm_provider.clone(),
        };

        let ollama_base_url = match env::var("OLLAMA_API_BASE_URL") {
            Ok(s) => Url::parse(&s).with_context(|| format!("OLLAMA_API_BASE_URL inválida: {s}"))?,
            Err(_) => defaults.ollama_base_url.clone(),
        };

        let datasets = match env::var("DATASETS") {
            Ok(s) => s
                .split(',')
                .filter(|e| !e.trim().is_empty())
                .map(DatasetSpec::parse)
                .collect::<Result<Vec<_>>>()?,
            Err(_) => defaults.datasets.clone(),
        };

        let cfg = Self {
            server_addr: env::var("SERVER_ADDR").unwrap_or(defaults.server_addr),
            open_browser: parse_var("OPEN_BROWSER", defaults.open_browser)?,
            llm_provider,
            llm_embedding_model: env::var("LLM_EMBEDDING_MODEL")
                .unwrap_or(defaults.llm_embedding_model),
            llm_chat_model: env::var("LLM_CHAT_MODEL").unwrap_or(defaults.llm_chat_model),
            llm_embedding_dimensions: parse_var(
                "LLM_EMBEDDING_DIMENSIONS",
                defaults.llm_embedding_dimensions,
            )?,
            ollama_base_url,
            temperature: parse_var("MODEL_TEMPERATURE", defaults.temperature)?,
            max_tokens: parse_var("MODEL_MAX_TOKENS", defaults.max_tokens)?,
            data_dir: env::var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            datasets,
            embedding_cache_dir: env::var("EMBEDDING_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.embedding_cache_dir),
            top_k: parse_var("SEARCH_TOP_K", defaults.top_k)?,
            confidence_threshold: parse_var("SEARCH_THRESHOLD", defaults.confidence_threshold)?,
            request_timeout: Duration::from_secs(parse_var(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Comprueba los rangos de los valores numéricos.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            bail!("MODEL_TEMPERATURE debe estar entre 0 y 2 (valor: {})", self.temperature);
        }
        if self.top_k == 0 || self.top_k > MAX_TOP_K {
            bail!("SEARCH_TOP_K debe estar entre 1 y {MAX_TOP_K} (valor: {})", self.top_k);
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            bail!(
                "SEARCH_THRESHOLD debe estar entre 0 y 1 (valor: {})",
                self.confidence_threshold
            );
        }
        if self.llm_embedding_dimensions == 0 {
            bail!("LLM_EMBEDDING_DIMENSIONS debe ser mayor que 0");
        }
        if self.request_timeout.is_zero() {
            bail!("REQUEST_TIMEOUT_SECS debe ser mayor que 0");
        }
        Ok(())
    }
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Valor inválido para {key}: '{raw}' ({e})")),
        Err(_) => Ok(default),
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("nori-rag")
        .join("embeddings")
}
