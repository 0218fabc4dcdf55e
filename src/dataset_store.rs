//! Registro de datasets con nombre: carga desde CSV/NPY, validación de
//! consistencia e inspección.
//!
//! Cada dataset se guarda como `Arc<Dataset>` y una recarga sustituye la
//! referencia completa, de modo que una búsqueda en curso ve siempre la
//! versión anterior o la nueva, nunca una mezcla.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use ndarray::Array2;
use ndarray_npy::read_npy;
use tracing::{error, info, warn};

use crate::config::DatasetSpec;
use crate::error::LoadError;
use crate::models::{
    ConsistencyReport, Dataset, DatasetInfo, DatasetSample, Metadata, SampleRecord,
};

/// Columna de la tabla de textos que contiene el texto de cada registro.
pub const TEXT_COLUMN: &str = "text";

#[derive(Debug, Default)]
pub struct DatasetStore {
    datasets: RwLock<Vec<(String, Arc<Dataset>)>>,
}

impl DatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Carga un dataset desde sus tres fuentes y lo registra con `name`.
    ///
    /// Un fallo en textos o metadatos es fatal (devuelve `false` y no se
    /// registra nada); un fallo en embeddings sólo deja el dataset en modo
    /// de palabras clave.
    pub fn load(
        &self,
        name: &str,
        text_source: &Path,
        metadata_source: &Path,
        embeddings_source: &Path,
    ) -> bool {
        match read_dataset(name, text_source, metadata_source, embeddings_source) {
            Ok(dataset) => {
                info!(
                    "Dataset '{}' cargado: {} filas, embeddings: {}",
                    name,
                    dataset.len(),
                    dataset.embeddings.is_some()
                );
                self.insert(dataset);
                true
            }
            Err(e) => {
                error!("Error cargando el dataset '{}': {}", name, e);
                false
            }
        }
    }

    /// Carga todos los datasets configurados y valida los que se cargaron.
    pub fn load_all(&self, specs: &[DatasetSpec], data_dir: &Path) -> Vec<(String, bool)> {
        specs
            .iter()
            .map(|spec| {
                let ok = self.load(
                    &spec.name,
                    &resolve(data_dir, &spec.text_csv),
                    &resolve(data_dir, &spec.metadata_csv),
                    &resolve(data_dir, &spec.embeddings_npy),
                );
                if ok {
                    self.validate_consistency(&spec.name);
                }
                (spec.name.clone(), ok)
            })
            .collect()
    }

    /// Registra (o sustituye) un dataset ya construido, conservando la
    /// posición original si el nombre ya existía.
    pub fn insert(&self, dataset: Dataset) {
        let name = dataset.name.clone();
        let dataset = Arc::new(dataset);
        let mut guard = self.datasets.write().unwrap_or_else(PoisonError::into_inner);
        match guard.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = dataset,
            None => guard.push((name, dataset)),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Dataset>> {
        self.datasets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ds)| Arc::clone(ds))
    }

    /// Nombres registrados, en orden de inserción.
    pub fn list_names(&self) -> Vec<String> {
        self.datasets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn consistency_report(&self, name: &str) -> Option<ConsistencyReport> {
        self.get(name).map(|ds| ConsistencyReport {
            text_rows: ds.text_records.len(),
            metadata_rows: ds.metadata_records.len(),
            embedding_rows: ds.embeddings.as_ref().map(Vec::len),
        })
    }

    /// Comprueba los invariantes de número de filas. Sólo informa: el
    /// dataset sigue registrado aunque la comprobación falle.
    pub fn validate_consistency(&self, name: &str) -> bool {
        let Some(report) = self.consistency_report(name) else {
            warn!("Dataset '{}' no registrado; no se puede validar", name);
            return false;
        };
        let mismatches = report.mismatches();
        if mismatches.is_empty() {
            info!("Consistencia de datos verificada: {}", name);
            return true;
        }
        for m in &mismatches {
            error!("Dataset '{}' inconsistente: {}", name, m);
        }
        false
    }

    pub fn info(&self, name: &str) -> Option<DatasetInfo> {
        self.get(name).map(|ds| DatasetInfo {
            name: ds.name.clone(),
            text_rows: ds.text_records.len(),
            metadata_rows: ds.metadata_records.len(),
            metadata_columns: ds.metadata_columns.clone(),
            has_embeddings: ds.embeddings.is_some(),
            embedding_shape: ds
                .embeddings
                .as_ref()
                .map(|e| (e.len(), e.first().map_or(0, Vec::len))),
            mode: ds.mode(),
        })
    }

    /// Devuelve `min(n, filas)` registros distintos elegidos al azar.
    pub fn sample(&self, name: &str, n: usize) -> Option<DatasetSample> {
        let ds = self.get(name)?;
        let total = ds.text_records.len();
        let mut rng = rand::thread_rng();
        let samples = rand::seq::index::sample(&mut rng, total, n.min(total))
            .into_iter()
            .map(|index| SampleRecord {
                index,
                text: ds.text_records[index].clone(),
                metadata: ds.metadata_records.get(index).cloned().unwrap_or_default(),
            })
            .collect();
        Some(DatasetSample {
            dataset_name: ds.name.clone(),
            samples,
            total_rows: total,
        })
    }
}

fn resolve(data_dir: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        data_dir.join(file)
    }
}

fn read_dataset(
    name: &str,
    text_source: &Path,
    metadata_source: &Path,
    embeddings_source: &Path,
) -> Result<Dataset, LoadError> {
    let text_records = load_text_table(text_source)?;
    let (metadata_columns, metadata_records) = load_metadata_table(metadata_source)?;

    let embeddings = match load_embeddings(embeddings_source) {
        Ok(e) => Some(e),
        Err(e) => {
            warn!(
                "No se pudieron cargar los embeddings de '{}' ({}); se usará búsqueda por texto",
                name, e
            );
            None
        }
    };

    Ok(Dataset::new(
        name,
        text_records,
        metadata_records,
        metadata_columns,
        embeddings,
    ))
}

fn open_csv(path: &Path) -> Result<csv::Reader<File>, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(csv::Reader::from_reader(file))
}

/// Lee la columna `text` de una tabla CSV, en orden de filas.
pub fn load_text_table(path: &Path) -> Result<Vec<String>, LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = open_csv(path)?;
    let column = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .position(|h| h.trim() == TEXT_COLUMN)
        .ok_or_else(|| LoadError::MissingColumn {
            path: path.to_path_buf(),
            column: TEXT_COLUMN.to_string(),
        })?;

    let mut texts = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        texts.push(record.get(column).unwrap_or_default().to_string());
    }
    Ok(texts)
}

/// Lee una tabla CSV completa como una lista de mapas columna → valor.
pub fn load_metadata_table(path: &Path) -> Result<(Vec<String>, Vec<Metadata>), LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = open_csv(path)?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let row: Metadata = headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        rows.push(row);
    }
    Ok((headers, rows))
}

/// Lee una matriz 2-D de `.npy` (f64 o f32) como filas de f64.
pub fn load_embeddings(path: &Path) -> Result<Vec<Vec<f64>>, LoadError> {
    let as_f64: Result<Array2<f64>, _> = read_npy(path);
    let rows = match as_f64 {
        Ok(matrix) => matrix.outer_iter().map(|row| row.to_vec()).collect(),
        Err(first) => {
            let matrix: Array2<f32> = read_npy(path).map_err(|_| LoadError::Embeddings {
                path: path.to_path_buf(),
                reason: first.to_string(),
            })?;
            matrix
                .outer_iter()
                .map(|row| row.iter().map(|&v| f64::from(v)).collect())
                .collect()
        }
    };
    Ok(rows)
}
