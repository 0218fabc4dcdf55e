//! Caché en disco de embeddings de ficheros subidos.
//!
//! La clave identifica el fichero de origen (nombre, tamaño y fecha de
//! modificación); una entrada sólo se reutiliza si el modelo y los trozos
//! de texto coinciden exactamente.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEmbeddings {
    pub model: String,
    pub chunks: Vec<String>,
    pub vectors: Vec<Vec<f64>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingCache {
    dir: PathBuf,
}

impl EmbeddingCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Clave derivada de la identidad del fichero de origen.
    pub fn key_for(path: &Path) -> Result<String> {
        let metadata = fs::metadata(path)
            .with_context(|| format!("No se pudo leer los metadatos de {}", path.display()))?;
        let modified: DateTime<Utc> = metadata
            .modified()
            .ok()
            .map(DateTime::<Utc>::from)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let stem: String = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        Ok(format!("{}-{}-{}", stem, metadata.len(), modified.timestamp()))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Devuelve los vectores cacheados si corresponden a `model` y `chunks`.
    pub fn get(&self, key: &str, model: &str, chunks: &[String]) -> Option<Vec<Vec<f64>>> {
        let raw = fs::read_to_string(self.entry_path(key)).ok()?;
        let entry: CachedEmbeddings = match serde_json::from_str(&raw) {
            Ok(e) => e,
            Err(e) => {
                warn!("Entrada de caché corrupta '{}': {}", key, e);
                return None;
            }
        };
        if entry.model != model || entry.chunks != chunks || entry.vectors.len() != chunks.len() {
            debug!("Entrada de caché '{}' obsoleta", key);
            return None;
        }
        Some(entry.vectors)
    }

    pub fn put(&self, key: &str, model: &str, chunks: &[String], vectors: &[Vec<f64>]) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("No se pudo crear {}", self.dir.display()))?;
        let entry = CachedEmbeddings {
            model: model.to_string(),
            chunks: chunks.to_vec(),
            vectors: vectors.to_vec(),
            created_at: Utc::now(),
        };
        let path = self.entry_path(key);
        fs::write(&path, serde_json::to_vec(&entry)?)
            .with_context(|| format!("No se pudo escribir {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn round_trip_requires_matching_model_and_chunks() {
        let dir = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(dir.path().join("cache"));
        let chunks = vec!["a".to_string(), "b".to_string()];
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        cache.put("k", "bge-m3", &chunks, &vectors).unwrap();

        assert_eq!(cache.get("k", "bge-m3", &chunks), Some(vectors));
        assert_eq!(cache.get("k", "other-model", &chunks), None);
        assert_eq!(cache.get("k", "bge-m3", &chunks[..1]), None);
        assert_eq!(cache.get("missing", "bge-m3", &chunks), None);
    }

    #[test]
    fn key_changes_with_file_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("운동 노트.txt");
        fs::write(&path, "a").unwrap();
        let k1 = EmbeddingCache::key_for(&path).unwrap();
        fs::write(&path, "abc").unwrap();
        let k2 = EmbeddingCache::key_for(&path).unwrap();
        assert_ne!(k1, k2);
        assert!(!k1.contains(' '));
    }
}
