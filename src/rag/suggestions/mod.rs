
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::generation::{GenerationError, GenerationProvider, GenerationRequest};
use crate::localization::{Language, normalize_whitespace};

pub const SUGGESTIONS_COUNT: usize = 3;
const MAX_SUGGESTION_LENGTH: usize = 150;
const SUGGESTION_TEMPERATURE: f32 = 0.7;
const FALLBACK_TOPIC_LENGTH: usize = 48;

#[derive(Debug, Deserialize)]
struct SuggestionsDocument {
    suggestions: Vec<String>,
}

/// Cleans one model-produced suggestion into a display-ready follow-up
/// question: bullets and numbering stripped, quotes removed, trailing
/// sentence punctuation replaced by a single `?`, capped at 150 chars with
/// the `?` preserved. Returns an empty string for unusable input.
#[inline]
pub fn normalize_suggestion(value: &str) -> String {
    let cleaned = normalize_whitespace(value);
    let cleaned = cleaned
        .trim_start_matches(|c: char| {
            c.is_ascii_digit() || c.is_whitespace() || matches!(c, '-' | '*' | '•' | '.' | ')')
        })
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '“' | '”' | '‘' | '’'))
        .trim();
    if cleaned.is_empty() {
        return String::new();
    }

    let stripped = cleaned.trim_end_matches(|c: char| matches!(c, '.' | '!' | '?' | '。' | '？' | '！'));
    let base = if stripped.trim().is_empty() {
        return String::new();
    } else {
        stripped.trim_end()
    };

    let mut suggestion: String = base.to_string();
    if suggestion.chars().count() > MAX_SUGGESTION_LENGTH - 1 {
        suggestion = suggestion
            .chars()
            .take(MAX_SUGGESTION_LENGTH - 1)
            .collect::<String>()
            .trim_end()
            .to_string();
    }
    suggestion.push('?');
    suggestion
}

fn fallback_topic(query: &str, language: Language) -> String {
    let topic: String = normalize_whitespace(query)
        .trim_end_matches(|c: char| matches!(c, '?' | '!' | '.' | '。' | '？' | '！'))
        .chars()
        .take(FALLBACK_TOPIC_LENGTH)
        .collect();
    let topic = topic.trim().to_string();
    if topic.is_empty() {
        match language {
            Language::Vi => "nội dung này".to_string(),
            Language::En => "this topic".to_string(),
        }
    } else {
        topic
    }
}

/// Deterministic suggestions derived from the query alone, used whenever
/// the model path fails or comes up short.
#[inline]
pub fn build_fallback_suggestions(query: &str, language: Language) -> Vec<String> {
    let topic = fallback_topic(query, language);
    let templates = match language {
        Language::Vi => [
            format!("Có thể tìm hiểu thêm điều gì về {topic}?"),
            format!("Quy định nào liên quan đến {topic}?"),
            format!("Cần liên hệ ai khi có thắc mắc về {topic}?"),
        ],
        Language::En => [
            format!("What else should I know about {topic}?"),
            format!("Which policies relate to {topic}?"),
            format!("Who should I contact about {topic}?"),
        ],
    };
    templates
        .iter()
        .map(|template| normalize_suggestion(template))
        .collect()
}

/// Normalizes, dedups (case-insensitive, first wins) and pads candidates
/// with fallbacks until exactly three remain.
#[inline]
pub fn finalize_suggestions(
    candidates: &[String],
    query: &str,
    language: Language,
) -> Vec<String> {
    let mut seen = Vec::new();
    let mut suggestions = Vec::new();
    for candidate in candidates {
        let normalized = normalize_suggestion(candidate);
        if normalized.is_empty() {
            continue;
        }
        let key = normalized.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        suggestions.push(normalized);
        if suggestions.len() == SUGGESTIONS_COUNT {
            return suggestions;
        }
    }

    for fallback in build_fallback_suggestions(query, language) {
        if suggestions.len() == SUGGESTIONS_COUNT {
            break;
        }
        let key = fallback.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        suggestions.push(fallback);
    }
    suggestions.truncate(SUGGESTIONS_COUNT);
    suggestions
}

fn suggestion_system_prompt(language: Language) -> &'static str {
    match language {
        Language::Vi => {
            "Bạn tạo câu hỏi gợi ý tiếp theo cho người đọc cẩm nang nội bộ. \
             Trả về đúng một đối tượng JSON dạng {\"suggestions\": [\"...\", \"...\", \"...\"]} \
             với đúng 3 câu hỏi ngắn gọn bằng tiếng Việt, mỗi câu kết thúc bằng dấu hỏi."
        }
        Language::En => {
            "You produce follow-up question suggestions for a reader of an internal handbook. \
             Return exactly one JSON object of the form {\"suggestions\": [\"...\", \"...\", \"...\"]} \
             with exactly 3 short questions in English, each ending with a question mark."
        }
    }
}

fn parse_suggestions(value: Value) -> Result<Vec<String>, GenerationError> {
    let document: SuggestionsDocument = serde_json::from_value(value)
        .map_err(|e| GenerationError::Schema(e.to_string()))?;
    if document.suggestions.len() != SUGGESTIONS_COUNT {
        return Err(GenerationError::Schema(format!(
            "expected {SUGGESTIONS_COUNT} suggestions, got {}",
            document.suggestions.len()
        )));
    }
    if document
        .suggestions
        .iter()
        .any(|suggestion| suggestion.trim().is_empty())
    {
        return Err(GenerationError::Schema("blank suggestion".to_string()));
    }
    Ok(document.suggestions)
}

fn try_generate(
    provider: &dyn GenerationProvider,
    query: &str,
    answer: &str,
    language: Language,
) -> Result<Vec<String>, GenerationError> {
    let prompt = format!("User query: {query}\n\nAssistant answer: {answer}");
    let request = GenerationRequest {
        system: suggestion_system_prompt(language),
        prompt: &prompt,
        temperature: SUGGESTION_TEMPERATURE,
    };
    parse_suggestions(provider.generate_json(&request)?)
}

/// Produces exactly three follow-up questions for the given exchange.
/// Never fails: any model or schema error falls back to the deterministic
/// templates.
#[inline]
pub fn generate_suggestions(
    provider: &dyn GenerationProvider,
    query: &str,
    answer: &str,
    language: Language,
) -> Vec<String> {
    match try_generate(provider, query, answer, language) {
        Ok(candidates) => finalize_suggestions(&candidates, query, language),
        Err(error) => {
            warn!("suggestion generation failed, using fallbacks: {error}");
            build_fallback_suggestions(query, language)
        }
    }
}
