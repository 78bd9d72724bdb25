//! Response normalizer: raw model text → [`GenerationResult`].
//!
//! Model output is unreliable, so the normalizer keeps every part it can use
//! and fails only when the payload is unusable as a whole:
//!
//! 1. strip code-fence markers (```` ``` ```` plus optional language tag)
//!    wherever they occur, then trim;
//! 2. parse JSON, retrying once on the outermost `{ … }` slice when prose
//!    surrounds the object; otherwise [`NormalizeError::MalformedJson`];
//! 3. reject non-object top-level values with
//!    [`NormalizeError::InvalidShape`];
//! 4. coerce each field according to its [`FieldPolicy`];
//! 5. build the typed result for the requested mode.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::llm::types::{
    DreamResult, GenerationMode, GenerationResult, SafetyOrderResult, TranslationEntry,
};

// ---------------------------------------------------------------------------
// NormalizeError
// ---------------------------------------------------------------------------

/// Payloads that cannot be turned into a result at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// Not JSON, even after fence stripping and brace-slice repair.
    /// `raw` holds the cleaned text for diagnostics.
    #[error("AI 응답을 처리하는 중 오류가 발생했습니다. (JSON 파싱 실패)")]
    MalformedJson { raw: String },

    /// Valid JSON whose top-level value is not an object.
    #[error("JSON 형식이 올바르지 않습니다. (최상위 값: {found})")]
    InvalidShape { found: &'static str },
}

// ---------------------------------------------------------------------------
// Field coercion policy
// ---------------------------------------------------------------------------

/// How a field is coerced when absent or of the wrong type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    /// Strings pass through, numbers are stringified, anything else becomes `""`.
    Text,
    /// Arrays pass through (items filtered individually), anything else
    /// becomes an empty sequence.
    Sequence,
}

/// One row of the coercion table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    /// Key the prompt asks for.
    pub key: &'static str,
    /// Accepted alternative spelling.
    pub alias: &'static str,
    pub policy: FieldPolicy,
}

const fn text(key: &'static str, alias: &'static str) -> FieldRule {
    FieldRule {
        key,
        alias,
        policy: FieldPolicy::Text,
    }
}

const fn sequence(key: &'static str, alias: &'static str) -> FieldRule {
    FieldRule {
        key,
        alias,
        policy: FieldPolicy::Sequence,
    }
}

const TITLE: FieldRule = text("title", "title");
const SAFETY_ICON: FieldRule = text("safety_icon", "safetyIcon");
const REFINED_TEXT: FieldRule = text("refined_text", "refinedText");
const TRANSLATIONS: FieldRule = sequence("translations", "translations");
const INTERPRETATION: FieldRule = text("interpretation", "interpretation");
const LUCKY_NUMBERS: FieldRule = sequence("lucky_numbers", "luckyNumbers");
const IMAGE_PROMPT: FieldRule = text("image_prompt", "imagePrompt");

const LANG: FieldRule = text("lang", "lang");
const LANG_NAME: FieldRule = text("lang_name", "langName");
const ENTRY_TEXT: FieldRule = text("text", "text");
const PRONUNCIATION: FieldRule = text("pronunciation", "pronunciation");

const SAFETY_FIELDS: &[FieldRule] = &[TITLE, SAFETY_ICON, REFINED_TEXT, TRANSLATIONS];
const DREAM_FIELDS: &[FieldRule] = &[TITLE, INTERPRETATION, LUCKY_NUMBERS, IMAGE_PROMPT];
const ENTRY_FIELDS: &[FieldRule] = &[LANG, LANG_NAME, ENTRY_TEXT, PRONUNCIATION];

/// The top-level coercion table for `mode`.
pub fn field_policy(mode: GenerationMode) -> &'static [FieldRule] {
    match mode {
        GenerationMode::SafetyOrder => SAFETY_FIELDS,
        GenerationMode::DreamInterpretation => DREAM_FIELDS,
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Normalize raw model text for `mode`.
///
/// ```
/// use global_foreman::llm::{normalize, GenerationMode, GenerationResult};
///
/// let raw = "```json\n{\"title\":\"x\",\"translations\":\"not-an-array\"}\n```";
/// match normalize(raw, GenerationMode::SafetyOrder).unwrap() {
///     GenerationResult::SafetyOrder(r) => assert!(r.translations.is_empty()),
///     _ => unreachable!(),
/// }
/// ```
pub fn normalize(raw: &str, mode: GenerationMode) -> Result<GenerationResult, NormalizeError> {
    let cleaned = strip_code_fences(raw);
    let value = parse_payload(&cleaned)?;

    let obj = match value {
        Value::Object(obj) => obj,
        other => {
            let found = json_kind(&other);
            log::warn!("normalize: top-level value is {found}, expected object");
            return Err(NormalizeError::InvalidShape { found });
        }
    };

    let fields = Fields::coerce(&obj, field_policy(mode));
    Ok(match mode {
        GenerationMode::SafetyOrder => GenerationResult::SafetyOrder(build_safety(&fields)),
        GenerationMode::DreamInterpretation => {
            GenerationResult::DreamInterpretation(build_dream(&fields))
        }
    })
}

/// Remove every code-fence marker (three backticks plus any directly
/// following alphanumeric language tag) and trim the result.
///
/// ```
/// use global_foreman::llm::normalize::strip_code_fences;
///
/// assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
/// assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
/// ```
pub fn strip_code_fences(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(idx) = rest.find("```") {
        out.push_str(&rest[..idx]);
        rest = &rest[idx + 3..];
        let tag_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        rest = &rest[tag_len..];
    }
    out.push_str(rest);

    out.trim().to_string()
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn parse_payload(cleaned: &str) -> Result<Value, NormalizeError> {
    match serde_json::from_str::<Value>(cleaned) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            if let Some(slice) = outer_object_slice(cleaned) {
                if let Ok(value) = serde_json::from_str::<Value>(slice) {
                    log::warn!("normalize: recovered JSON object from surrounding text");
                    return Ok(value);
                }
            }
            log::warn!("normalize: JSON parse error: {first_err}; payload: {cleaned}");
            Err(NormalizeError::MalformedJson {
                raw: cleaned.to_string(),
            })
        }
    }
}

/// The text from the first `{` through the last `}`, if both exist.
fn outer_object_slice(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Field coercion
// ---------------------------------------------------------------------------

fn lookup<'a>(obj: &'a Map<String, Value>, rule: FieldRule) -> Option<&'a Value> {
    obj.get(rule.key).or_else(|| obj.get(rule.alias))
}

/// One field after its policy has been applied.
#[derive(Debug, Clone, PartialEq)]
enum Coerced<'a> {
    Text(String),
    Sequence(&'a [Value]),
}

fn coerce<'a>(obj: &'a Map<String, Value>, rule: FieldRule) -> Coerced<'a> {
    let found = lookup(obj, rule);
    match rule.policy {
        FieldPolicy::Text => Coerced::Text(match found {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            None | Some(Value::Null) => String::new(),
            Some(other) => {
                log::warn!(
                    "normalize: `{}` is {}, using empty text",
                    rule.key,
                    json_kind(other)
                );
                String::new()
            }
        }),
        FieldPolicy::Sequence => Coerced::Sequence(match found {
            Some(Value::Array(items)) => items.as_slice(),
            None | Some(Value::Null) => &[],
            Some(other) => {
                log::warn!(
                    "normalize: `{}` is {}, not an array; coercing to empty",
                    rule.key,
                    json_kind(other)
                );
                &[]
            }
        }),
    }
}

/// An object coerced through a rule table.  Fields the table does not list
/// as the requested kind read as empty.
struct Fields<'a> {
    values: Vec<(&'static str, Coerced<'a>)>,
}

impl<'a> Fields<'a> {
    fn coerce(obj: &'a Map<String, Value>, rules: &[FieldRule]) -> Self {
        Self {
            values: rules.iter().map(|&r| (r.key, coerce(obj, r))).collect(),
        }
    }

    fn get(&self, rule: FieldRule) -> Option<&Coerced<'a>> {
        self.values
            .iter()
            .find(|(key, _)| *key == rule.key)
            .map(|(_, value)| value)
    }

    fn text(&self, rule: FieldRule) -> String {
        match self.get(rule) {
            Some(Coerced::Text(s)) => s.clone(),
            _ => String::new(),
        }
    }

    fn sequence(&self, rule: FieldRule) -> &'a [Value] {
        match self.get(rule) {
            Some(Coerced::Sequence(items)) => *items,
            _ => &[],
        }
    }
}

fn translation_entry(item: &Value) -> Option<TranslationEntry> {
    let Value::Object(obj) = item else {
        log::warn!("normalize: dropping non-object translation ({})", json_kind(item));
        return None;
    };
    let fields = Fields::coerce(obj, ENTRY_FIELDS);
    Some(TranslationEntry {
        lang: fields.text(LANG),
        lang_name: fields.text(LANG_NAME),
        text: fields.text(ENTRY_TEXT),
        pronunciation: fields.text(PRONUNCIATION),
    })
}

fn lucky_number(item: &Value) -> Option<i64> {
    match item {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn build_safety(fields: &Fields<'_>) -> SafetyOrderResult {
    SafetyOrderResult {
        title: fields.text(TITLE),
        safety_icon: fields.text(SAFETY_ICON),
        refined_text: fields.text(REFINED_TEXT),
        translations: fields
            .sequence(TRANSLATIONS)
            .iter()
            .filter_map(translation_entry)
            .collect(),
    }
}

fn build_dream(fields: &Fields<'_>) -> DreamResult {
    let raw_numbers = fields.sequence(LUCKY_NUMBERS);
    let lucky_numbers: Vec<i64> = raw_numbers.iter().filter_map(lucky_number).collect();
    if lucky_numbers.len() != raw_numbers.len() {
        log::warn!(
            "normalize: dropped {} non-numeric lucky number(s)",
            raw_numbers.len() - lucky_numbers.len()
        );
    }

    DreamResult {
        title: fields.text(TITLE),
        interpretation: fields.text(INTERPRETATION),
        lucky_numbers,
        image_prompt: fields.text(IMAGE_PROMPT),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
