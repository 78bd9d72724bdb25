//! Prompt builder for the two generation modes.
//!
//! [`PromptBuilder::build`] produces one flat instruction string: the
//! mode-specific chain-of-thought template, the JSON output contract, and
//! finally the user's text.  The user text is always the suffix of the
//! prompt so the model reads the instructions first.

use crate::llm::types::GenerationMode;

// ---------------------------------------------------------------------------
// System instructions
// ---------------------------------------------------------------------------

/// Safety order: slang standardization → mandatory safety clause →
/// zh/vi/en translation with pronunciation.
const SYSTEM_INSTRUCTION_SAFETY: &str = "\
당신은 30년 경력의 베테랑 건설 안전 관리자입니다.
사용자가 입력한 한국어 지시(현장 은어 포함)를 받으면, 즉시 번역하지 말고 [생각의 사슬]을 거쳐 JSON으로 출력하세요.

[Step 1: 은어 표준화]
- '반생이'->'결속선', '공구리'->'콘크리트', '하이바'->'안전모' 등 현장 용어를 표준어로 순화하세요.

[Step 2: 안전 의식 주입 (핵심)]
- 단순 지시라도 반드시 문장 끝에 상황에 맞는 안전 수칙을 한 문장 덧붙이세요.
- 예: '빨리 해' -> '신속하게 작업하되, 이동 시 낙하물에 주의하세요.'

[Step 3: 다국어 출력]
- 정제된 내용을 중국어(zh-CN), 베트남어(vi-VN), 영어(en-US)로 번역하세요.
- 각 언어별로 발음(pronunciation)을 한글로 함께 제공하세요.

[JSON 출력 형식]
{
  \"title\": \"작업 지시 (Safety Order)\",
  \"safety_icon\": \"⚠️\",
  \"refined_text\": \"표준어로 순화된 한국어 문장\",
  \"translations\": [
    { \"lang\": \"zh-CN\", \"lang_name\": \"중국어\", \"text\": \"...\", \"pronunciation\": \"...\" },
    { \"lang\": \"vi-VN\", \"lang_name\": \"베트남어\", \"text\": \"...\", \"pronunciation\": \"...\" },
    { \"lang\": \"en-US\", \"lang_name\": \"영어\", \"text\": \"...\", \"pronunciation\": \"...\" }
  ]
}";

/// Dream: symbol extraction → numerology mapping → interpretation.
const SYSTEM_INSTRUCTION_DREAM: &str = "\
당신은 40년 경력의 꿈해몽 전문가이자 숫자 풀이의 대가입니다.
사용자가 들려준 꿈 이야기를 받으면, 바로 답하지 말고 [생각의 사슬]을 거쳐 JSON으로 출력하세요.

[Step 1: 상징 추출]
- 꿈에 등장한 핵심 상징(동물, 사람, 물건, 장소, 색깔, 행동)을 3~5개의 키워드로 뽑으세요.

[Step 2: 숫자 매핑]
- 전통 꿈해몽과 수비학을 근거로 각 키워드를 1~45 사이의 숫자로 연결하세요.
- 최종적으로 서로 다른 행운의 번호 6개를 오름차순으로 고르세요.

[Step 3: 해몽]
- 키워드의 의미를 엮어 희망적이고 신비로운 어조로 3~4문장의 해몽을 작성하세요.
- 꿈의 분위기를 그림으로 표현할 수 있는 영어 이미지 프롬프트를 한 문장 작성하세요.

[JSON 출력 형식]
{
  \"title\": \"꿈의 핵심을 담은 짧은 제목\",
  \"interpretation\": \"해몽 내용\",
  \"lucky_numbers\": [3, 11, 19, 27, 34, 42],
  \"image_prompt\": \"A mystical ... (English)\"
}";

/// Output contract appended to every instruction.
const OUTPUT_CONSTRAINT: &str = "\
IMPORTANT: Output ONLY valid raw JSON. No markdown code blocks, no explanation.";

/// Label that introduces the user's text.
const USER_INPUT_LABEL: &str = "사용자 입력: ";

// ---------------------------------------------------------------------------
// PromptBuilder
// ---------------------------------------------------------------------------

/// Builds the single composite prompt sent as the only content part of a
/// generation turn.
///
/// # Example
/// ```rust
/// use global_foreman::llm::{GenerationMode, PromptBuilder};
///
/// let prompt = PromptBuilder::new().build(GenerationMode::SafetyOrder, "반생이 챙겨");
/// assert!(prompt.ends_with("반생이 챙겨"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build the prompt for `mode`.
    ///
    /// Structure (in order):
    /// 1. Mode-specific system instruction
    /// 2. Raw-JSON output constraint
    /// 3. `사용자 입력: ` + the literal user text
    ///
    /// Pure and total; callers are expected to pass non-blank text.
    pub fn build(&self, mode: GenerationMode, user_text: &str) -> String {
        let instruction = self.system_instruction(mode);

        let mut prompt = String::with_capacity(
            instruction.len() + OUTPUT_CONSTRAINT.len() + user_text.len() + 64,
        );
        prompt.push_str(instruction);
        prompt.push('\n');
        prompt.push_str(OUTPUT_CONSTRAINT);
        prompt.push_str("\n\n");
        prompt.push_str(USER_INPUT_LABEL);
        prompt.push_str(user_text);
        prompt
    }

    fn system_instruction(&self, mode: GenerationMode) -> &'static str {
        match mode {
            GenerationMode::SafetyOrder => SYSTEM_INSTRUCTION_SAFETY,
            GenerationMode::DreamInterpretation => SYSTEM_INSTRUCTION_DREAM,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MODES: [GenerationMode; 2] = [
        GenerationMode::SafetyOrder,
        GenerationMode::DreamInterpretation,
    ];

    #[test]
    fn user_text_is_suffix_for_both_modes() {
        let builder = PromptBuilder::new();
        for mode in MODES {
            for text in ["야! 반생이 챙겨서 비계 위로 올라가!", "돼지가 집으로 들어오는 꿈", "a"] {
                let prompt = builder.build(mode, text);
                assert!(!prompt.is_empty());
                assert!(
                    prompt.ends_with(text),
                    "prompt for {mode:?} must end with the user text"
                );
            }
        }
    }

    #[test]
    fn every_prompt_demands_raw_json() {
        let builder = PromptBuilder::new();
        for mode in MODES {
            let prompt = builder.build(mode, "테스트");
            assert!(prompt.contains("ONLY valid raw JSON"));
            assert!(prompt.contains("No markdown code blocks"));
        }
    }

    #[test]
    fn safety_prompt_has_reasoning_steps_and_schema() {
        let prompt = PromptBuilder::new().build(GenerationMode::SafetyOrder, "공구리 쳐");

        assert!(prompt.contains("은어 표준화"), "slang standardization step");
        assert!(prompt.contains("안전 수칙"), "mandatory safety clause step");
        for tag in ["zh-CN", "vi-VN", "en-US"] {
            assert!(prompt.contains(tag), "target language {tag}");
        }
        for key in ["safety_icon", "refined_text", "translations", "pronunciation"] {
            assert!(prompt.contains(key), "schema key {key}");
        }
    }

    #[test]
    fn dream_prompt_has_reasoning_steps_and_schema() {
        let prompt = PromptBuilder::new().build(GenerationMode::DreamInterpretation, "용꿈");

        assert!(prompt.contains("상징 추출"));
        assert!(prompt.contains("1~45"));
        for key in ["interpretation", "lucky_numbers", "image_prompt"] {
            assert!(prompt.contains(key), "schema key {key}");
        }
        assert!(!prompt.contains("refined_text"));
    }

    #[test]
    fn build_is_deterministic() {
        let builder = PromptBuilder::new();
        assert_eq!(
            builder.build(GenerationMode::SafetyOrder, "하이바 써"),
            builder.build(GenerationMode::SafetyOrder, "하이바 써")
        );
    }

    #[test]
    fn user_text_follows_input_label() {
        let prompt = PromptBuilder::new().build(GenerationMode::SafetyOrder, "빨리 해");
        assert!(prompt.ends_with("\n\n사용자 입력: 빨리 해"));
    }
}
