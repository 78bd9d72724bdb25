//! Request and result types shared by the prompt builder, the normalizer and
//! the pipeline.
//!
//! Both app variants (the construction-site safety translator and the lotto
//! dream interpreter) go through the same pipeline; [`GenerationMode`] picks
//! the variant and [`GenerationResult`] carries the mode-specific payload.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// GenerationMode
// ---------------------------------------------------------------------------

/// Which app variant a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenerationMode {
    /// Korean site order → standardized, safety-augmented, multilingual.
    SafetyOrder,
    /// Korean dream description → interpretation + lucky numbers.
    DreamInterpretation,
}

impl Default for GenerationMode {
    fn default() -> Self {
        Self::SafetyOrder
    }
}

impl GenerationMode {
    /// Short Korean label used in status lines and failure messages.
    pub fn label(&self) -> &'static str {
        match self {
            GenerationMode::SafetyOrder => "통역",
            GenerationMode::DreamInterpretation => "해몽",
        }
    }

    /// Parse a mode name as typed on the command line.
    ///
    /// ```
    /// use global_foreman::llm::GenerationMode;
    ///
    /// assert_eq!(GenerationMode::from_name("dream"), Some(GenerationMode::DreamInterpretation));
    /// assert_eq!(GenerationMode::from_name("Safety"), Some(GenerationMode::SafetyOrder));
    /// assert_eq!(GenerationMode::from_name("poker"), None);
    /// ```
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "safety" | "safety-order" | "order" => Some(Self::SafetyOrder),
            "dream" | "dream-interpretation" | "lotto" => Some(Self::DreamInterpretation),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// GenerationRequest
// ---------------------------------------------------------------------------

/// A validated request: the text is trimmed and never blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub mode: GenerationMode,
    pub user_text: String,
}

impl GenerationRequest {
    /// Returns `None` for blank input; blank input is a no-op, not an error.
    pub fn new(mode: GenerationMode, user_text: &str) -> Option<Self> {
        let trimmed = user_text.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            mode,
            user_text: trimmed.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// One translated line of a safety order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationEntry {
    /// BCP-47 tag, e.g. `vi-VN`.
    pub lang: String,
    pub lang_name: String,
    pub text: String,
    pub pronunciation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyOrderResult {
    pub title: String,
    pub safety_icon: String,
    pub refined_text: String,
    pub translations: Vec<TranslationEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DreamResult {
    pub title: String,
    pub interpretation: String,
    /// Expected six numbers in 1..=45; neither count, range nor uniqueness
    /// is enforced here.
    pub lucky_numbers: Vec<i64>,
    pub image_prompt: String,
}

/// Title shown when the model left the dream title empty.
pub const DEFAULT_DREAM_TITLE: &str = "운명의 계시";

impl DreamResult {
    /// The title to display, falling back to [`DEFAULT_DREAM_TITLE`].
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            DEFAULT_DREAM_TITLE
        } else {
            &self.title
        }
    }

    /// Plain-text body used by the share action.
    pub fn share_text(&self) -> String {
        let numbers: Vec<String> = self.lucky_numbers.iter().map(|n| n.to_string()).collect();
        format!(
            "{}\n\n{}\n\n행운의 번호: {}",
            self.display_title(),
            self.interpretation,
            numbers.join(", ")
        )
    }
}

/// Mode-polymorphic result. Serialises to the same JSON shape the model is
/// asked to produce, so a serialised result normalises back to itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum GenerationResult {
    SafetyOrder(SafetyOrderResult),
    DreamInterpretation(DreamResult),
}

impl GenerationResult {
    pub fn mode(&self) -> GenerationMode {
        match self {
            GenerationResult::SafetyOrder(_) => GenerationMode::SafetyOrder,
            GenerationResult::DreamInterpretation(_) => GenerationMode::DreamInterpretation,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            GenerationResult::SafetyOrder(r) => &r.title,
            GenerationResult::DreamInterpretation(r) => r.display_title(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_request_is_none() {
        assert!(GenerationRequest::new(GenerationMode::SafetyOrder, "   \n").is_none());
        assert!(GenerationRequest::new(GenerationMode::SafetyOrder, "").is_none());
    }

    #[test]
    fn request_text_is_trimmed() {
        let req = GenerationRequest::new(GenerationMode::DreamInterpretation, "  돼지 꿈  ").unwrap();
        assert_eq!(req.user_text, "돼지 꿈");
        assert_eq!(req.mode, GenerationMode::DreamInterpretation);
    }

    #[test]
    fn dream_title_falls_back_when_empty() {
        let r = DreamResult {
            title: " ".into(),
            interpretation: "재물운".into(),
            lucky_numbers: vec![1, 2, 3],
            image_prompt: String::new(),
        };
        assert_eq!(r.display_title(), DEFAULT_DREAM_TITLE);
    }

    #[test]
    fn share_text_lists_numbers() {
        let r = DreamResult {
            title: "황금 돼지".into(),
            interpretation: "큰 재물이 들어옵니다".into(),
            lucky_numbers: vec![3, 17, 45],
            image_prompt: String::new(),
        };
        assert_eq!(
            r.share_text(),
            "황금 돼지\n\n큰 재물이 들어옵니다\n\n행운의 번호: 3, 17, 45"
        );
    }

    #[test]
    fn safety_result_serialises_with_snake_case_keys() {
        let r = GenerationResult::SafetyOrder(SafetyOrderResult {
            title: "작업 지시".into(),
            safety_icon: "⚠️".into(),
            refined_text: "결속선을 챙기세요".into(),
            translations: vec![],
        });
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["refined_text"], "결속선을 챙기세요");
        assert_eq!(json["safety_icon"], "⚠️");
        assert!(json["translations"].as_array().unwrap().is_empty());
    }

    #[test]
    fn mode_names_parse() {
        assert_eq!(GenerationMode::from_name("lotto"), Some(GenerationMode::DreamInterpretation));
        assert_eq!(GenerationMode::from_name(" order "), Some(GenerationMode::SafetyOrder));
        assert_eq!(GenerationMode::default(), GenerationMode::SafetyOrder);
    }
}
