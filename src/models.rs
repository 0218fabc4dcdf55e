//! Modelos de dominio: datasets de ejercicios, resultados de búsqueda y
//! análisis de preguntas.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Atributos arbitrarios de un registro (운동명, 목적, 운동 부위, 도구...).
pub type Metadata = BTreeMap<String, String>;

/// Modo de búsqueda de un dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Embedding,
    Keyword,
}

impl SearchMode {
    fn as_u8(self) -> u8 {
        match self {
            Self::Embedding => 0,
            Self::Keyword => 1,
        }
    }

    fn from_u8(v: u8) -> Self {
        if v == 0 {
            Self::Embedding
        } else {
            Self::Keyword
        }
    }
}

/// Colección nombrada de registros paralelos.
///
/// Inmutable tras la carga salvo el modo de búsqueda, que sólo puede pasar
/// de `Embedding` a `Keyword` (una vez, de forma atómica).
#[derive(Debug)]
pub struct Dataset {
    pub name: String,
    pub text_records: Vec<String>,
    pub metadata_records: Vec<Metadata>,
    pub metadata_columns: Vec<String>,
    pub embeddings: Option<Vec<Vec<f64>>>,
    mode: AtomicU8,
}

impl Dataset {
    pub fn new(
        name: impl Into<String>,
        text_records: Vec<String>,
        metadata_records: Vec<Metadata>,
        metadata_columns: Vec<String>,
        embeddings: Option<Vec<Vec<f64>>>,
    ) -> Self {
        let mode = if embeddings.is_some() {
            SearchMode::Embedding
        } else {
            SearchMode::Keyword
        };
        Self {
            name: name.into(),
            text_records,
            metadata_records,
            metadata_columns,
            embeddings,
            mode: AtomicU8::new(mode.as_u8()),
        }
    }

    pub fn mode(&self) -> SearchMode {
        SearchMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    /// Cambia el dataset a búsqueda por palabras clave de forma permanente.
    /// Devuelve `true` sólo para la llamada que realizó el cambio.
    pub fn fallback_to_keyword(&self) -> bool {
        self.mode
            .compare_exchange(
                SearchMode::Embedding.as_u8(),
                SearchMode::Keyword.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn len(&self) -> usize {
        self.text_records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text_records.is_empty()
    }
}

/// Resultado efímero de una búsqueda.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub content: String,
    /// Similitud coseno en modo embedding; proporción de palabras en modo keyword.
    pub similarity: f64,
    pub metadata: Metadata,
    pub source_index: usize,
    /// Lo rellena quien agrega resultados de varios datasets.
    pub dataset_name: Option<String>,
}

/// Informe de las comprobaciones de número de filas de un dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub text_rows: usize,
    pub metadata_rows: usize,
    pub embedding_rows: Option<usize>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.text_rows == self.metadata_rows
            && self.embedding_rows.map_or(true, |n| n == self.text_rows)
    }

    /// Descripción de cada discrepancia, con el formato `a != b`.
    pub fn mismatches(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.text_rows != self.metadata_rows {
            out.push(format!(
                "text/metadata 행 수 불일치: {} != {}",
                self.text_rows, self.metadata_rows
            ));
        }
        if let Some(n) = self.embedding_rows {
            if n != self.text_rows {
                out.push(format!("text/embeddings 행 수 불일치: {} != {}", self.text_rows, n));
            }
        }
        out
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetInfo {
    pub name: String,
    pub text_rows: usize,
    pub metadata_rows: usize,
    pub metadata_columns: Vec<String>,
    pub has_embeddings: bool,
    pub embedding_shape: Option<(usize, usize)>,
    pub mode: SearchMode,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleRecord {
    pub index: usize,
    pub text: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSample {
    pub dataset_name: String,
    pub samples: Vec<SampleRecord>,
    pub total_rows: usize,
}

// --- Análisis de preguntas ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BodyPart {
    Upper,
    Lower,
    Abdomen,
    WholeBody,
}

impl BodyPart {
    pub fn label(self) -> &'static str {
        match self {
            Self::Upper => "상체",
            Self::Lower => "하체",
            Self::Abdomen => "복부",
            Self::WholeBody => "전신",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Goal {
    Strength,
    Flexibility,
    PainRelief,
    Balance,
    Endurance,
    Function,
}

impl Goal {
    pub fn label(self) -> &'static str {
        match self {
            Self::Strength => "강화",
            Self::Flexibility => "유연성",
            Self::PainRelief => "통증 완화",
            Self::Balance => "균형",
            Self::Endurance => "지구력",
            Self::Function => "기능 향상",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum QuestionCategory {
    RoutineRecommendation,
    HowTo,
    PainAndHealth,
    Equipment,
    EffectAndDuration,
    Safety,
    GeneralInfo,
    Other,
}

impl QuestionCategory {
    pub const ALL: [QuestionCategory; 8] = [
        Self::RoutineRecommendation,
        Self::HowTo,
        Self::PainAndHealth,
        Self::Equipment,
        Self::EffectAndDuration,
        Self::Safety,
        Self::GeneralInfo,
        Self::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::RoutineRecommendation => "운동 루틴 추천",
            Self::HowTo => "방법/절차 문의",
            Self::PainAndHealth => "부위별 통증/건강 관련",
            Self::Equipment => "장비/운동기구 문의",
            Self::EffectAndDuration => "운동 효과/지속 관련",
            Self::Safety => "운동 안전/주의사항",
            Self::GeneralInfo => "일반 정보",
            Self::Other => "기타 일반 문의",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    pub fn label(self) -> &'static str {
        match self {
            Self::Simple => "단순",
            Self::Moderate => "보통",
            Self::Complex => "복잡",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn label(self) -> &'static str {
        match self {
            Self::Positive => "긍정적",
            Self::Negative => "부정적",
            Self::Neutral => "중립적",
        }
    }
}

macro_rules! display_label {
    ($($t:ty),*) => {
        $(impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        })*
    };
}

display_label!(BodyPart, Goal, QuestionCategory, Complexity, Sentiment);

/// Resultado del análisis de una pregunta.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionAnalysis {
    pub body_part: BodyPart,
    pub goal: Goal,
    pub category: QuestionCategory,
    pub complexity: Complexity,
    pub keywords: Vec<String>,
    pub sentiment: Sentiment,
    pub word_count: usize,
}

/// Entrada del constructor de prompts.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub context: String,
    pub question: String,
    pub dataset_names: Vec<String>,
    pub confidence_threshold: f64,
    /// Similitud media de los resultados conservados; `None` si no hubo resultados.
    pub confidence: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_flips_exactly_once() {
        let ds = Dataset::new("d", vec![], vec![], vec![], Some(vec![]));
        assert_eq!(ds.mode(), SearchMode::Embedding);
        assert!(ds.fallback_to_keyword());
        assert!(!ds.fallback_to_keyword());
        assert_eq!(ds.mode(), SearchMode::Keyword);
    }

    #[test]
    fn dataset_without_embeddings_starts_in_keyword_mode() {
        let ds = Dataset::new("d", vec![], vec![], vec![], None);
        assert_eq!(ds.mode(), SearchMode::Keyword);
        assert!(!ds.fallback_to_keyword());
    }

    #[test]
    fn consistency_report_lists_mismatches() {
        let report = ConsistencyReport {
            text_rows: 3,
            metadata_rows: 3,
            embedding_rows: Some(2),
        };
        assert!(!report.is_consistent());
        let msgs = report.mismatches();
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].contains("3 != 2"));
    }
}
