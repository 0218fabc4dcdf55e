//! Construcción del prompt de generación.
//!
//! Se elige una de tres plantillas por llamada, sin estado:
//!   - sin resultados: plantilla genérica sin contexto,
//!   - confianza baja: contexto marcado como "sólo referencia",
//!   - confianza suficiente: plantilla RAG estructurada de 노리.

use serde::Serialize;

use crate::models::{BodyPart, Goal, PromptRequest, QuestionAnalysis, QuestionCategory, SearchResult};

/// Aparece sólo en la plantilla sin resultados.
pub const NO_RESULTS_MARKER: &str = "검색된 참고 자료가 없습니다.";
/// Aparece sólo en la plantilla de confianza baja.
pub const LOW_CONFIDENCE_MARKER: &str = "신뢰도가 낮아 참고용으로만 활용";

pub const GREETING_LINE: &str = "🤖 **AI 운동자세 어시스턴트: 노리입니다!**";
pub const CLOSING_LINE: &str =
    "지금의 작은 실천이 내일의 건강을 만듭니다. 🌱 노리와 함께 천천히, 하지만 꾸준히 해봐요! 화이팅입니다! 💪🌟";

const BASE_SYSTEM_PROMPT: &str = "당신은 운동 프로그램 전문 AI 어시스턴트입니다.
사용자의 질문에 대해 정확하고 유용한 운동 정보를 제공하는 것이 목표입니다.";

const CONTEXT_FIELDS: [&str; 8] = [
    "운동명",
    "목적",
    "설명",
    "체력 요소",
    "운동 부위",
    "도구",
    "제작연도",
    "영상 링크",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptTemplate {
    NoResults,
    LowConfidence,
    Confident,
}

/// Texto de instrucciones por categoría de pregunta.
pub fn category_instruction(category: QuestionCategory) -> &'static str {
    match category {
        QuestionCategory::RoutineRecommendation => {
            "당신은 'AI 운동자세 어시스턴트: 노리'라는 건강한 AI 코치입니다. 질문자가 원하는 신체 부위 또는 목표에 따라 4개의 운동을 표로 정리하고, 각 운동별로 **별도 단락**으로 구분하여 설명하세요(운동명 (도구) 형식으로 제목 작성, 그 아래에 글머리표(•)를 사용한 단계별 설명을 각각 **새 줄**로 구분). 중장년층도 이해하기 쉬운 표현을 사용하고, 맨몸 위주로 안전하고 따라하기 쉬운 운동을 제공하세요."
        }
        QuestionCategory::HowTo => "운동 동작을 단계별로 구분하여 안전하고 자세히 설명하세요.",
        QuestionCategory::PainAndHealth => {
            "의학적 조언은 피하고, 일반적인 주의사항과 완화 운동만 추천하세요."
        }
        QuestionCategory::Equipment => "도구별로 적절한 사용법과 안전한 운동 루틴을 설명하세요.",
        QuestionCategory::EffectAndDuration => {
            "운동 효과가 나타나는 일반적인 기간, 빈도, 지속 방법 등을 과학적 근거에 기반해 설명하세요."
        }
        QuestionCategory::Safety => {
            "자주 발생하는 실수와 그로 인한 부상 위험을 설명하고, 안전하게 운동하는 팁을 제시하세요."
        }
        QuestionCategory::GeneralInfo => "운동과 관련된 이론, 원리, 정의 등을 쉽게 설명하세요.",
        QuestionCategory::Other => "질문 내용을 바탕으로 가장 적절한 형식으로 답변을 구성하세요.",
    }
}

/// Instrucciones adicionales según el dataset del que vienen los datos.
pub fn dataset_instruction(dataset_name: &str) -> Option<&'static str> {
    match dataset_name {
        "실제 데이터" => {
            Some("운동 프로그램 데이터를 바탕으로 구체적이고 실용적인 운동 정보를 제공하세요.")
        }
        crate::ingest::UPLOAD_DATASET_NAME => {
            Some("업로드된 문서의 내용을 근거로 답변하고, 문서에 없는 내용은 추측하지 마세요.")
        }
        _ => None,
    }
}

pub fn confidence_instruction(threshold: f64) -> &'static str {
    if threshold >= 0.8 {
        "매우 높은 신뢰도의 정보만 사용하여 확신있게 답변하세요."
    } else if threshold >= 0.6 {
        "적절한 신뢰도의 정보를 바탕으로 답변하되, 불확실한 부분은 명시하세요."
    } else {
        "낮은 신뢰도의 정보도 참고하되, 반드시 신뢰도 수준을 표시하세요."
    }
}

/// Convierte los resultados agregados en el bloque de contexto del prompt.
pub fn format_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, result)| {
            let mut block = format!(
                "=== 운동 데이터 {} (유사도: {:.3}) ===\n",
                i + 1,
                result.similarity
            );
            for field in CONTEXT_FIELDS {
                let value = result.metadata.get(field).map_or("N/A", String::as_str);
                block.push_str(&format!("{field}: {value}\n"));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Esqueleto literal de una respuesta de rutina de 노리.
pub fn routine_template(body_part: BodyPart, goal: Goal) -> String {
    format!(
        r#"{GREETING_LINE}

**{body_part} 건강과 {goal}을 위한 운동 루틴을 알려드릴게요! 💪✨**

---

### 🏋️‍♀️ **운동 루틴 (총 4가지)**

| 운동 이름            | 세트 수 | 반복 횟수         |
| ------------------ | ------ | -------------- |
| [운동 1 이름]        | 3세트   | 10~15회         |
| [운동 2 이름]        | 3세트   | 양쪽 각 12~15회   |
| [운동 3 이름]        | 3세트   | 15~20회         |
| [운동 4 이름]        | 3세트   | 15초 유지 × 3    |

---

### 📌 **운동 자세 설명**

#### 🟡 [운동 1 이름]
• 단계별 동작 설명
• 주의 사항
• 적절한 호흡 및 속도

#### 🟢 [운동 2 이름]
• 단계별 동작 설명
• 주의 사항
• 운동 효과 설명

#### 🔵 [운동 3 이름]
• 단계별 동작 설명
• 주의 사항
• 운동 중 흔한 실수

#### 🟣 [운동 4 이름]
• 단계별 동작 설명
• 주의 사항
• 어떤 사람에게 특히 추천되는지

---

### ⏱️ **운동 가이드라인**

• 각 운동 후 **1분 휴식**
• 세트 사이에는 **조금 더 긴 휴식**
• **통증이 느껴지면 즉시 중지하고 무리하지 않기**
• 운동 전에는 가볍게 스트레칭 또는 의사 상담 권장
• 가능한 한 **매일 규칙적인 루틴으로 반복**하기

---

**{CLOSING_LINE}**
"#
    )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn select(&self, request: &PromptRequest) -> PromptTemplate {
        match request.confidence {
            _ if request.context.trim().is_empty() => PromptTemplate::NoResults,
            None => PromptTemplate::NoResults,
            Some(c) if c < request.confidence_threshold => PromptTemplate::LowConfidence,
            Some(_) => PromptTemplate::Confident,
        }
    }

    /// Texto literal que se envía al servicio de generación.
    pub fn build(&self, request: &PromptRequest, analysis: &QuestionAnalysis) -> String {
        match self.select(request) {
            PromptTemplate::NoResults => no_results_prompt(&request.question),
            PromptTemplate::LowConfidence => {
                low_confidence_prompt(&request.context, &request.question)
            }
            PromptTemplate::Confident => structured_prompt(request, analysis),
        }
    }
}

fn no_results_prompt(question: &str) -> String {
    format!(
        "당신은 운동 전문 AI 어시스턴트입니다.
사용자의 질문에 정확하고 도움이 되는 답변을 제공하세요.
{NO_RESULTS_MARKER}

운동 관련 질문인 경우:
- 4개 운동 프로그램 형태로 답변
- 목적에 맞는 구체적인 운동 추천
- 각 운동별 상세 설명 제공

일반 질문인 경우:
- 친근하고 자연스럽게 대화

사용자 질문: {question}

답변:"
    )
}

fn low_confidence_prompt(context: &str, question: &str) -> String {
    format!(
        "당신은 운동 전문 AI 어시스턴트입니다.
사용자의 질문에 정확하고 도움이 되는 답변을 제공하세요.

다음은 관련될 수 있는 참고 정보입니다 ({LOW_CONFIDENCE_MARKER}):
{context}

사용자 질문: {question}

답변 (운동 관련 질문인 경우 4개 운동 프로그램 형태로, 일반 질문인 경우 자연스럽게 대화):"
    )
}

fn structured_prompt(request: &PromptRequest, analysis: &QuestionAnalysis) -> String {
    let body_part = analysis.body_part;
    let goal = analysis.goal;
    let category = analysis.category;

    let data_types = if request.dataset_names.is_empty() {
        "일반".to_string()
    } else {
        request.dataset_names.join(", ")
    };
    let specific: Vec<String> = request
        .dataset_names
        .iter()
        .filter_map(|name| dataset_instruction(name))
        .map(|inst| format!("• {inst}"))
        .collect();

    let example = if category == QuestionCategory::RoutineRecommendation {
        format!("\n**답변 예시 형식:**\n{}\n", routine_template(body_part, goal))
    } else {
        String::new()
    };

    format!(
        r#"{BASE_SYSTEM_PROMPT}

**현재 상황:**
- 검색된 데이터 유형: {data_types}
- 질문 유형: {category}
- 추출된 신체 부위: {body_part}
- 추출된 목표: {goal}

**특별 지시사항:**
{specific}

**답변 구조 (운동 추천 시):**
1. **인사말**: "{GREETING_LINE}"
2. **목표 제시**: "{body_part} 건강과 {goal}을 위한 운동 루틴을 알려드릴게요! 💪✨"
3. **운동 루틴 테이블**: 4개 운동을 표 형태로 정리 (운동 이름, 세트 수, 반복 횟수)
4. **운동 자세 설명**: 각 운동별로 **별도 단락**으로 구분하여 설명 (운동명 (도구) 형식으로 제목 작성, 그 아래에 글머리표(•)를 사용한 단계별 설명을 각각 **새 줄**로 구분)
5. **운동 가이드라인**: 휴식, 주의사항, 안전 수칙
6. **격려 메시지**: "{CLOSING_LINE}"

**운동 다양성 지침:**
- 정확히 4개의 운동만 추천
- 다양한 운동 도구 활용 (맨몸, 덤벨, 밴드, 짐볼, 바벨 등)
- 다양한 운동 방법 포함 (근력, 지구력, 유연성, 균형)
- 상체/하체/코어 균형 고려
- 초급/중급/고급 난이도 혼합
- 실내/실외 운동 옵션 제공

**답변 가이드라인:**
1. **정확성**: 제공된 문서의 정보만을 사용하여 답변
2. **투명성**: 정보의 출처와 신뢰도를 명확히 표시
3. **완전성**: 질문의 모든 측면을 다루되, 없는 정보는 명시
4. **안전성**: 특히 운동/건강 관련 조언 시 안전 주의사항 포함
5. **실용성**: 구체적이고 실행 가능한 정보 제공

**신뢰도 처리:**
{confidence}

**질문 유형별 대응:**
{type_instruction}
{example}
**참고 문서:**
{context}

**사용자 질문:**
{question}

**답변:**"#,
        specific = specific.join("\n"),
        confidence = confidence_instruction(request.confidence_threshold),
        type_instruction = category_instruction(category),
        context = request.context,
        question = request.question,
    )
}
