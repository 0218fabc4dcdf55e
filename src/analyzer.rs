//! Clasificador de preguntas basado en reglas.
//!
//! Todas las tablas son listas ordenadas y se evalúan secuencialmente: la
//! primera coincidencia en el orden declarado gana.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{BodyPart, Complexity, Goal, QuestionAnalysis, QuestionCategory, Sentiment};

const BODY_PARTS: &[(BodyPart, &[&str])] = &[
    (BodyPart::Upper, &["상체", "팔", "어깨", "가슴", "등", "팔꿈치", "손목"]),
    (BodyPart::Lower, &["하체", "다리", "허벅지", "종아리", "발목", "무릎", "발"]),
    (BodyPart::Abdomen, &["복부", "배", "코어", "복근", "허리"]),
    (BodyPart::WholeBody, &["전신", "몸", "전체", "신체"]),
];

const GOALS: &[(Goal, &[&str])] = &[
    (Goal::Strength, &["강화", "근력", "힘", "튼튼"]),
    (Goal::Flexibility, &["유연성", "스트레칭", "늘리기", "풀기"]),
    (Goal::PainRelief, &["통증", "아픔", "완화", "치료", "관절"]),
    (Goal::Balance, &["균형", "안정성", "자세"]),
    (Goal::Endurance, &["지구력", "체력", "스태미나"]),
];

const CATEGORY_PATTERNS: &[(QuestionCategory, &[&str])] = &[
    (
        QuestionCategory::RoutineRecommendation,
        &[
            r"(무엇|뭐|어떤).*(운동|루틴)",
            r"(운동|자세|동작).*(추천|알려줘|뭐해|좋아)",
            r"(상체|하체|복부|허리|어깨|팔|다리|무릎|목|코어).*운동",
        ],
    ),
    (
        QuestionCategory::HowTo,
        &[
            r"(어떻게|하는 ?법|방법|순서|단계|프로세스)",
            r"(운동|자세|스트레칭).*자세히",
            r"바르게.*(운동|자세)",
        ],
    ),
    (
        QuestionCategory::PainAndHealth,
        &[
            r"(아프|아파|통증|불편|결림|쑤심|삐끗|부상)",
            r"(무릎|허리|어깨|목|팔꿈치|발목|척추|손목).*문제",
        ],
    ),
    (
        QuestionCategory::Equipment,
        &[
            r"(덤벨|밴드|짐볼|매트|바벨|벤치|기구|장비).*운동",
            r"운동.*(도구|기구|장비).*어떤.*좋아",
        ],
    ),
    (
        QuestionCategory::EffectAndDuration,
        &[
            r"(효과|지속|얼마나|기간|며칠|몇 주|시간).*운동",
            r"(운동|스트레칭).*언제까지.*해야",
        ],
    ),
    (
        QuestionCategory::Safety,
        &[
            r"(하면 안되는|주의할 점|잘못된 자세|위험|조심)",
            r"(운동|자세).*하면.*안돼",
        ],
    ),
    (
        QuestionCategory::GeneralInfo,
        &[
            r"(정의|이론|원리|과학적 근거)",
            r"(운동|헬스|스트레칭|자세).*이란",
        ],
    ),
];

static COMPILED_PATTERNS: LazyLock<Vec<(QuestionCategory, Vec<Regex>)>> = LazyLock::new(|| {
    CATEGORY_PATTERNS
        .iter()
        .map(|(category, patterns)| {
            let compiled = patterns
                .iter()
                .map(|p| Regex::new(p).expect("regex de categoría válida"))
                .collect();
            (*category, compiled)
        })
        .collect()
});

const STOP_WORDS: &[&str] = &[
    "이", "가", "을", "를", "의", "에", "에서", "로", "으로", "와", "과", "도", "만", "은", "는",
    "그", "저", "어떤", "무엇", "어떻게", "왜", "언제", "어디서",
];

const POSITIVE_WORDS: &[&str] = &["좋아", "추천", "도움", "효과", "강화", "개선"];
const NEGATIVE_WORDS: &[&str] = &["아프", "통증", "문제", "부상", "위험", "조심"];

/// Analizador de preguntas sin estado. Nunca falla: una entrada vacía
/// produce los valores por defecto.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuestionAnalyzer;

impl QuestionAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, question: &str) -> QuestionAnalysis {
        let lower = question.to_lowercase();
        QuestionAnalysis {
            body_part: first_keyword_hit(BODY_PARTS, &lower).unwrap_or(BodyPart::WholeBody),
            goal: first_keyword_hit(GOALS, &lower).unwrap_or(Goal::Function),
            category: self.classify(question),
            complexity: complexity(question),
            keywords: extract_keywords(question),
            sentiment: sentiment(&lower),
            word_count: question.split_whitespace().count(),
        }
    }

    pub fn body_part_and_goal(&self, question: &str) -> (BodyPart, Goal) {
        let lower = question.to_lowercase();
        (
            first_keyword_hit(BODY_PARTS, &lower).unwrap_or(BodyPart::WholeBody),
            first_keyword_hit(GOALS, &lower).unwrap_or(Goal::Function),
        )
    }

    /// Categoría de la pregunta; `Other` sólo se alcanza por defecto.
    pub fn classify(&self, question: &str) -> QuestionCategory {
        let lower = question.to_lowercase();
        COMPILED_PATTERNS
            .iter()
            .find(|(_, regexes)| regexes.iter().any(|re| re.is_match(&lower)))
            .map(|(category, _)| *category)
            .unwrap_or(QuestionCategory::Other)
    }
}

fn first_keyword_hit<T: Copy>(table: &[(T, &[&str])], lower: &str) -> Option<T> {
    table
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(label, _)| *label)
}

fn complexity(question: &str) -> Complexity {
    match question.split_whitespace().count() {
        0..=5 => Complexity::Simple,
        6..=15 => Complexity::Moderate,
        _ => Complexity::Complex,
    }
}

fn extract_keywords(question: &str) -> Vec<String> {
    question
        .to_lowercase()
        .split_whitespace()
        .filter(|w| !STOP_WORDS.contains(w) && w.chars().count() > 1)
        .map(str::to_string)
        .collect()
}

fn sentiment(lower: &str) -> Sentiment {
    let count = |words: &[&str]| words.iter().filter(|w| lower.contains(*w)).count();
    let positive = count(POSITIVE_WORDS);
    let negative = count(NEGATIVE_WORDS);
    match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => Sentiment::Positive,
        std::cmp::Ordering::Less => Sentiment::Negative,
        std::cmp::Ordering::Equal => Sentiment::Neutral,
    }
}
