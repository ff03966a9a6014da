pub mod suggestions;
#[cfg(test)]
mod tests;

use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::generation::{GenerationError, GenerationProvider, GenerationRequest};
use crate::localization::{Language, empty_answer, normalize_whitespace};
use crate::retrieval::{MAX_TOP_K, RetrievalScope, RetrievedChunk, Retriever};
use crate::vector::DocumentType;

pub const DEFAULT_TOP_K: usize = 6;
const CITATION_COUNT: usize = 4;
const MAX_CONTEXT_CHARS_PER_CHUNK: usize = 700;
const MAX_RESPONSE_CHARS_PER_CHUNK: usize = 320;
const MAX_QUERY_LENGTH: usize = 2000;
const MAX_ANSWER_LENGTH: usize = 1500;
const ANSWER_TEMPERATURE: f32 = 0.1;

/// The full answer payload: the generated answer, the chunks it cited, all
/// retrieved chunks (compacted for transfer), and follow-up suggestions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagResponse {
    pub answer: String,
    pub language: Language,
    pub citations: Vec<RetrievedChunk>,
    pub results: Vec<RetrievedChunk>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AnswerDocument {
    answer: String,
    #[serde(default)]
    citations: Vec<i64>,
}

fn truncate_with_ellipsis(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        let truncated: String = value.chars().take(max).collect();
        format!("{truncated}...")
    }
}

/// Shrinks a chunk for the response body: normalized text capped at 320
/// chars.
fn compact_chunk(chunk: &RetrievedChunk) -> RetrievedChunk {
    RetrievedChunk {
        text: truncate_with_ellipsis(
            &normalize_whitespace(&chunk.text),
            MAX_RESPONSE_CHARS_PER_CHUNK,
        ),
        ..chunk.clone()
    }
}

/// Numbered context block handed to the model. Citation numbers are the
/// 1-based positions in this block; the contract with `validate_citations`
/// is that both sides use array position, never record ids.
fn build_context_block(chunks: &[RetrievedChunk]) -> String {
    let mut block = String::new();
    for (index, chunk) in chunks.iter().enumerate() {
        if index > 0 {
            block.push_str("\n\n---\n\n");
        }
        let _ = write!(
            block,
            "**Citation #{}** | type={} | book={} | section={}\n{}",
            index + 1,
            chunk.doc_type.as_str(),
            chunk.book_title,
            chunk.section_title,
            truncate_with_ellipsis(&normalize_whitespace(&chunk.text), MAX_CONTEXT_CHARS_PER_CHUNK)
        );
    }
    block
}

/// Keeps only citation indices that address a real context position;
/// hallucinated indices are dropped silently. At most four survive.
fn validate_citations(chunks: &[RetrievedChunk], cited: &[i64]) -> Vec<RetrievedChunk> {
    chunks
        .iter()
        .enumerate()
        .filter(|(index, _)| cited.contains(&(*index as i64 + 1)))
        .map(|(_, chunk)| compact_chunk(chunk))
        .take(CITATION_COUNT)
        .collect()
}

fn parse_answer(value: serde_json::Value) -> Result<AnswerDocument, GenerationError> {
    let document: AnswerDocument =
        serde_json::from_value(value).map_err(|e| GenerationError::Schema(e.to_string()))?;
    let answer_length = document.answer.trim().chars().count();
    if answer_length == 0 || answer_length > MAX_ANSWER_LENGTH {
        return Err(GenerationError::Schema(format!(
            "answer length {answer_length} out of range 1..={MAX_ANSWER_LENGTH}"
        )));
    }
    if document.citations.len() > CITATION_COUNT {
        return Err(GenerationError::Schema(format!(
            "too many citations: {}",
            document.citations.len()
        )));
    }
    if document.citations.iter().any(|&index| index < 1) {
        return Err(GenerationError::Schema("citation index below 1".to_string()));
    }
    Ok(document)
}

fn answer_system_prompt(language: Language) -> &'static str {
    match language {
        Language::Vi => {
            "Bạn là trợ lý trả lời câu hỏi dựa trên cẩm nang nội bộ. Chỉ dùng thông tin trong \
             phần Context; nếu không đủ thông tin, hãy nói rõ là chưa tìm thấy. Trả về đúng một \
             đối tượng JSON dạng {\"answer\": \"...\", \"citations\": [1, 2]} trong đó citations \
             là số thứ tự của các Citation đã dùng, tối đa 4. Trả lời ngắn gọn bằng tiếng Việt."
        }
        Language::En => {
            "You are an assistant answering questions from an internal handbook. Use only the \
             information in the Context; if it is insufficient, say you could not find an \
             answer. Return exactly one JSON object of the form \
             {\"answer\": \"...\", \"citations\": [1, 2]} where citations are the numbers of the \
             Citations you used, at most 4. Answer concisely in English."
        }
    }
}

#[derive(Clone)]
pub struct RagEngine {
    retriever: Retriever,
    provider: Arc<dyn GenerationProvider>,
}

impl RagEngine {
    #[inline]
    pub fn new(retriever: Retriever, provider: Arc<dyn GenerationProvider>) -> Self {
        Self {
            retriever,
            provider,
        }
    }

    fn empty_response(language: Language, results: Vec<RetrievedChunk>) -> RagResponse {
        RagResponse {
            answer: empty_answer(language).to_string(),
            language,
            citations: Vec::new(),
            results,
            suggestions: Vec::new(),
        }
    }

    /// Answers `query` from retrieved handbook content.
    ///
    /// Degrades instead of failing: retrieval errors, zero hits, or a
    /// generation/schema failure all yield the canned per-language answer,
    /// with whatever `results` were retrieved still attached. Suggestions
    /// are only generated on the success path.
    #[inline]
    pub fn generate_rag_response(
        &self,
        query: &str,
        language: Language,
        top_k: Option<usize>,
        scope: &RetrievalScope,
    ) -> RagResponse {
        let safe_query: String = query.trim().chars().take(MAX_QUERY_LENGTH).collect();
        if safe_query.is_empty() {
            return Self::empty_response(language, Vec::new());
        }
        let safe_top_k = top_k.unwrap_or(DEFAULT_TOP_K).clamp(1, MAX_TOP_K);

        let chunks = match self.retriever.retrieve_hybrid(
            &safe_query,
            language,
            Some(safe_top_k),
            scope,
            &[DocumentType::Qa, DocumentType::Section],
        ) {
            Ok(chunks) => chunks,
            Err(err) => {
                error!("retrieval failed for {safe_query:?} ({language}): {err:#}");
                return Self::empty_response(language, Vec::new());
            }
        };
        // Retrieval already respects top_k; the context must never exceed
        // it even if that changes.
        let context_chunks: Vec<RetrievedChunk> =
            chunks.into_iter().take(safe_top_k).collect();
        let results: Vec<RetrievedChunk> = context_chunks.iter().map(compact_chunk).collect();
        if context_chunks.is_empty() {
            return Self::empty_response(language, results);
        }

        let prompt = format!(
            "User query: {safe_query}\n\nContext:\n{}",
            build_context_block(&context_chunks)
        );
        let request = GenerationRequest {
            system: answer_system_prompt(language),
            prompt: &prompt,
            temperature: ANSWER_TEMPERATURE,
        };

        match self
            .provider
            .generate_json(&request)
            .and_then(parse_answer)
        {
            Ok(document) => {
                let citations = validate_citations(&context_chunks, &document.citations);
                let suggestions = suggestions::generate_suggestions(
                    self.provider.as_ref(),
                    &safe_query,
                    &document.answer,
                    language,
                );
                RagResponse {
                    answer: document.answer,
                    language,
                    citations,
                    results,
                    suggestions,
                }
            }
            Err(err) => {
                error!("answer generation failed for {safe_query:?} ({language}): {err}");
                Self::empty_response(language, results)
            }
        }
    }
}
