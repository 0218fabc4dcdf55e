//! Ingesta de ficheros subidos: extracción de texto, troceado, embeddings
//! (con caché en disco) y registro como dataset `업로드된 파일`.

use std::{
    fs,
    path::Path,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use anyhow::{anyhow, Result};
use mime_guess::MimeGuess;
use serde::Serialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::{
    app_state::Status,
    dataset_store::DatasetStore,
    embedding_cache::EmbeddingCache,
    llm::{with_timeout, EmbeddingService},
    models::{Dataset, Metadata},
};

pub const UPLOAD_DATASET_NAME: &str = "업로드된 파일";
pub const CHUNK_SIZE: usize = 500;
pub const CHUNK_OVERLAP: usize = 50;

const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Resumen de los resultados de una operación de ingesta.
#[derive(Debug, Default, Serialize)]
pub struct IngestionSummary {
    pub files_scanned: u32,
    pub files_ingested: u32,
    pub files_skipped: u32,
    pub chunks_created: usize,
    pub cache_hits: u32,
    pub keyword_only: bool,
}

impl std::fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: {} ficheros escaneados, {} ingeridos, {} omitidos. {} chunks ({} desde caché){}.",
            self.files_scanned,
            self.files_ingested,
            self.files_skipped,
            self.chunks_created,
            self.cache_hits,
            if self.keyword_only { ", sólo búsqueda por texto" } else { "" }
        )
    }
}

/// Dependencias de la ingesta.
pub struct Ingestor<'a> {
    pub store: &'a DatasetStore,
    pub embedder: &'a dyn EmbeddingService,
    pub cache: &'a EmbeddingCache,
    pub embedding_model: &'a str,
    pub timeout: Duration,
}

impl Ingestor<'_> {
    /// Recorre un fichero o directorio y registra todos los trozos de texto
    /// como un único dataset. Si algún fichero no obtiene embeddings, el
    /// dataset entero queda en modo de palabras clave.
    pub async fn ingest_path(
        &self,
        root: &Path,
        status_arc: Arc<Mutex<Status>>,
    ) -> Result<IngestionSummary> {
        if !root.exists() {
            return Err(anyhow!("La ruta no existe: {}", root.display()));
        }

        let mut summary = IngestionSummary::default();
        let file_entries: Vec<_> = WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .collect();
        let total_files = file_entries.len().max(1) as f32;

        let mut texts = Vec::new();
        let mut metadata = Vec::new();
        let mut vectors: Option<Vec<Vec<f64>>> = Some(Vec::new());

        for (index, entry) in file_entries.iter().enumerate() {
            summary.files_scanned += 1;
            let path = entry.path();
            let filename = path.file_name().unwrap_or_default().to_string_lossy().to_string();

            {
                let mut status = status_arc.lock().unwrap_or_else(PoisonError::into_inner);
                status.message = format!(
                    "[{}/{}] Procesando: {}...",
                    index + 1,
                    file_entries.len(),
                    filename
                );
                status.progress = (index + 1) as f32 / total_files;
            }

            let Some(text) = extract_text(path) else {
                summary.files_skipped += 1;
                continue;
            };
            let chunks = split_into_chunks(&text, CHUNK_SIZE, CHUNK_OVERLAP);
            if chunks.is_empty() {
                warn!("Fichero vacío o sin texto útil: {}", path.display());
                summary.files_skipped += 1;
                continue;
            }

            match self.embed_file(path, &chunks, &mut summary).await {
                Some(file_vectors) => {
                    if let Some(all) = vectors.as_mut() {
                        all.extend(file_vectors);
                    }
                }
                None => vectors = None,
            }

            let mime_type = MimeGuess::from_path(path)
                .first()
                .map(|m| m.to_string())
                .unwrap_or_default();
            for (i, chunk) in chunks.iter().enumerate() {
                let mut row = Metadata::new();
                row.insert("source".to_string(), path.to_string_lossy().to_string());
                row.insert("운동명".to_string(), filename.clone());
                row.insert("설명".to_string(), chunk.clone());
                row.insert("chunk".to_string(), i.to_string());
                row.insert("mime_type".to_string(), mime_type.clone());
                metadata.push(row);
            }
            summary.files_ingested += 1;
            summary.chunks_created += chunks.len();
            texts.extend(chunks);
        }

        if texts.is_empty() {
            return Err(anyhow!(
                "No se encontró texto utilizable en {}",
                root.display()
            ));
        }

        summary.keyword_only = vectors.is_none();
        let columns = ["source", "운동명", "설명", "chunk", "mime_type"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        self.store.insert(Dataset::new(
            UPLOAD_DATASET_NAME,
            texts,
            metadata,
            columns,
            vectors,
        ));
        info!("Ingesta de {} completada. {}", root.display(), summary);
        Ok(summary)
    }

    /// Embeddings de los trozos de un fichero, usando la caché si es posible.
    async fn embed_file(
        &self,
        path: &Path,
        chunks: &[String],
        summary: &mut IngestionSummary,
    ) -> Option<Vec<Vec<f64>>> {
        let key = EmbeddingCache::key_for(path).ok();
        if let Some(key) = &key {
            if let Some(cached) = self.cache.get(key, self.embedding_model, chunks) {
                summary.cache_hits += 1;
                return Some(cached);
            }
        }

        match with_timeout(self.timeout, self.embedder.embed_batch(chunks)).await {
            Ok(file_vectors) if file_vectors.len() == chunks.len() => {
                if let Some(key) = &key {
                    if let Err(e) = self.cache.put(key, self.embedding_model, chunks, &file_vectors) {
                        warn!("No se pudo guardar la caché de {}: {}", path.display(), e);
                    }
                }
                Some(file_vectors)
            }
            Ok(file_vectors) => {
                warn!(
                    "Número de embeddings ({}) distinto al de chunks ({}) en {}",
                    file_vectors.len(),
                    chunks.len(),
                    path.display()
                );
                None
            }
            Err(e) => {
                warn!("Embeddings no disponibles para {}: {}", path.display(), e);
                None
            }
        }
    }
}

fn extract_text(path: &Path) -> Option<String> {
    let extension = path
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "pdf" => match pdf_extract::extract_text(path) {
            Ok(content) => Some(content),
            Err(e) => {
                warn!("No se pudo extraer texto del PDF {}: {}. Saltando fichero.", path.display(), e);
                None
            }
        },
        "txt" | "md" | "csv" => match fs::read_to_string(path) {
            Ok(content) => Some(content),
            Err(_) => {
                warn!("Saltando fichero no-texto o no-UTF8: {}", path.display());
                None
            }
        },
        _ => {
            info!("Saltando fichero con extensión no soportada ('.{}'): {}", extension, path.display());
            None
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn tail_chars(s: &str, n: usize) -> String {
    let len = char_len(s);
    s.chars().skip(len.saturating_sub(n)).collect()
}

/// Trocea el texto en fragmentos de como mucho `max_chars` caracteres,
/// cortando por párrafo, línea y espacio (en ese orden) y repitiendo los
/// últimos `overlap` caracteres del fragmento anterior cuando caben.
pub fn split_into_chunks(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    if max_chars == 0 {
        return Vec::new();
    }
    let mut pieces = Vec::new();
    split_recursive(text, max_chars, &SEPARATORS, &mut pieces);

    let mut chunks = Vec::new();
    let mut current = String::new();
    for piece in pieces {
        if !current.is_empty() && char_len(&current) + 1 + char_len(&piece) > max_chars {
            let tail = tail_chars(&current, overlap);
            chunks.push(std::mem::take(&mut current));
            if !tail.is_empty() && char_len(&tail) + 1 + char_len(&piece) <= max_chars {
                current = tail;
            }
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&piece);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_recursive(text: &str, max_chars: usize, separators: &[&str], out: &mut Vec<String>) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    if char_len(text) <= max_chars {
        out.push(text.to_string());
        return;
    }
    match separators.split_first() {
        Some((sep, rest)) => {
            for part in text.split(sep) {
                split_recursive(part, max_chars, rest, out);
            }
        }
        None => {
            let chars: Vec<char> = text.chars().collect();
            for piece in chars.chunks(max_chars) {
                out.push(piece.iter().collect());
            }
        }
    }
}
