//! Errores tipados del dominio. El resto de la aplicación usa `anyhow`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Fallo al leer las fuentes de un dataset. Es fatal para ese dataset.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no se pudo leer {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV mal formado en {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("falta la columna '{column}' en {path}")]
    MissingColumn { path: PathBuf, column: String },
    #[error("matriz de embeddings inválida en {path}: {reason}")]
    Embeddings { path: PathBuf, reason: String },
}

/// Fallo de un servicio externo (embeddings o generación).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("servicio no disponible: {0}")]
    Unavailable(String),
    #[error("el servicio no respondió en {0:?}")]
    Timeout(Duration),
}

/// Errores que el orquestador devuelve al usuario.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("error del servicio de generación: {0}")]
    Generation(String),
    #[error("el servicio de generación no respondió en {0:?}")]
    GenerationTimeout(Duration),
}

impl From<ServiceError> for PipelineError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(msg) => Self::Generation(msg),
            ServiceError::Timeout(d) => Self::GenerationTimeout(d),
        }
    }
}
