
use std::sync::Arc;

use anyhow::{Result, bail};
use itertools::Itertools;
use serde::Serialize;
use tracing::debug;

use crate::localization::Language;
use crate::store::SearchResult;
use crate::vector::client::{
    FusionAlgorithm, QueryMatch, QueryMode, QueryRequest, VectorStoreClient,
};
use crate::vector::DocumentType;

pub const DEFAULT_TOP_K: usize = 12;
pub const MAX_TOP_K: usize = 40;
/// Search overfetches candidates before dedup so that duplicate languages
/// and discarded chunks still leave enough hits.
const SEARCH_CANDIDATE_MULTIPLIER: usize = 4;

/// Optional narrowing of a retrieval to one book and/or one section.
#[derive(Debug, Clone, Default)]
pub struct RetrievalScope {
    pub book_slug: Option<String>,
    pub section_id: Option<i64>,
}

/// One retrieved document with everything the UI or the answer engine
/// needs, projected out of match metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedChunk {
    pub id: String,
    pub score: f64,
    pub doc_type: DocumentType,
    pub lang: Language,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    pub qa_id: Option<i64>,
    pub section_id: i64,
    pub section_slug: String,
    pub section_title: String,
    pub book_id: i64,
    pub book_slug: String,
    pub book_title: String,
}

#[derive(Clone)]
pub struct Retriever {
    vector: Arc<VectorStoreClient>,
    namespace: String,
}

impl Retriever {
    #[inline]
    pub fn new(vector: Arc<VectorStoreClient>, namespace: impl Into<String>) -> Self {
        Self {
            vector,
            namespace: namespace.into(),
        }
    }

    /// Runs one hybrid (dense + lexical, DBSF-fused) query against the
    /// index. Returns an empty list when the index is unconfigured or the
    /// query is blank; matches without metadata are dropped.
    #[inline]
    pub fn retrieve_hybrid(
        &self,
        query: &str,
        language: Language,
        top_k: Option<usize>,
        scope: &RetrievalScope,
        document_types: &[DocumentType],
    ) -> Result<Vec<RetrievedChunk>> {
        if !self.vector.is_configured() {
            return Ok(Vec::new());
        }
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let safe_top_k = top_k.unwrap_or(DEFAULT_TOP_K).clamp(1, MAX_TOP_K);
        let filter = build_hybrid_filter(language, document_types, scope)?;
        let request = QueryRequest {
            data: trimmed.to_string(),
            top_k: safe_top_k,
            include_metadata: true,
            include_data: true,
            filter: Some(filter),
            query_mode: QueryMode::Hybrid,
            fusion_algorithm: FusionAlgorithm::Dbsf,
        };

        let matches = self.vector.query(&self.namespace, &request)?;
        let chunks: Vec<RetrievedChunk> = matches.into_iter().filter_map(to_chunk).collect();
        debug!(
            "hybrid retrieval for {trimmed:?} ({language}) returned {} chunks",
            chunks.len()
        );
        Ok(chunks)
    }

    /// Q&A search: overfetches hybrid candidates, then projects them down
    /// to unique, displayable results (first occurrence of each Q&A wins).
    #[inline]
    pub fn search_with_hybrid(
        &self,
        query: &str,
        language: Language,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let candidates = (limit * SEARCH_CANDIDATE_MULTIPLIER).min(MAX_TOP_K);
        let chunks = self.retrieve_hybrid(
            query,
            language,
            Some(candidates),
            &RetrievalScope::default(),
            &[DocumentType::Qa],
        )?;

        Ok(chunks
            .into_iter()
            .filter_map(to_search_result)
            .unique_by(|result| result.qa_id)
            .take(limit)
            .collect())
    }
}

/// Builds the metadata filter string. Always narrows to published records
/// in the requested language; the optional slug is allowlist-validated
/// before being quoted.
fn build_hybrid_filter(
    language: Language,
    document_types: &[DocumentType],
    scope: &RetrievalScope,
) -> Result<String> {
    let mut clauses = vec![
        "published = true".to_string(),
        format!("lang = {}", quote(language.as_str())),
    ];

    match document_types {
        [] => {}
        [single] => clauses.push(format!("docType = {}", quote(single.as_str()))),
        many => {
            let group = many
                .iter()
                .map(|doc_type| format!("docType = {}", quote(doc_type.as_str())))
                .join(" OR ");
            clauses.push(format!("({group})"));
        }
    }

    if let Some(book_slug) = scope.book_slug.as_deref() {
        validate_slug(book_slug)?;
        clauses.push(format!("bookSlug = {}", quote(book_slug)));
    }
    if let Some(section_id) = scope.section_id {
        clauses.push(format!("sectionId = {section_id}"));
    }

    Ok(clauses.join(" AND "))
}

fn validate_slug(slug: &str) -> Result<()> {
    let valid = !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/'));
    if !valid {
        bail!(
            "invalid book slug {slug:?}: only alphanumerics, '-', '_' and '/' are allowed"
        );
    }
    Ok(())
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Recovers the question from the data blob when metadata lacks it.
fn parse_question_from_data(data: &str) -> Option<String> {
    data.lines()
        .find_map(|row| row.strip_prefix("question:"))
        .map(str::trim)
        .filter(|question| !question.is_empty())
        .map(String::from)
}

fn to_chunk(query_match: QueryMatch) -> Option<RetrievedChunk> {
    let metadata = query_match.metadata?;
    let text = query_match.data.unwrap_or_default().trim().to_string();
    let question = metadata
        .question
        .as_deref()
        .map(str::trim)
        .filter(|question| !question.is_empty())
        .map(String::from)
        .or_else(|| parse_question_from_data(&text));

    // A qa chunk with no data at all still gets its question as text, so
    // downstream consumers always have something to show.
    let text = if text.is_empty() && metadata.doc_type == DocumentType::Qa {
        question
            .as_deref()
            .map(|question| format!("question: {question}"))
            .unwrap_or_default()
    } else {
        text
    };

    Some(RetrievedChunk {
        id: query_match.id,
        score: query_match.score,
        doc_type: metadata.doc_type,
        lang: metadata.lang,
        text,
        question,
        qa_id: metadata.qa_id,
        section_id: metadata.section_id,
        section_slug: metadata.section_slug,
        section_title: metadata.section_title.unwrap_or_default(),
        book_id: metadata.book_id,
        book_slug: metadata.book_slug,
        book_title: metadata.book_title.unwrap_or_default(),
    })
}

/// Chunks missing any display field cannot be rendered as search hits and
/// are discarded.
fn to_search_result(chunk: RetrievedChunk) -> Option<SearchResult> {
    if chunk.doc_type != DocumentType::Qa {
        return None;
    }
    let qa_id = chunk.qa_id?;
    let question = chunk.question.filter(|question| !question.is_empty())?;
    if chunk.section_title.is_empty()
        || chunk.book_title.is_empty()
        || chunk.section_slug.is_empty()
        || chunk.book_slug.is_empty()
    {
        return None;
    }
    Some(SearchResult {
        qa_id,
        question,
        section_id: chunk.section_id,
        section_title: chunk.section_title,
        section_slug: chunk.section_slug,
        book_id: chunk.book_id,
        book_title: chunk.book_title,
        book_slug: chunk.book_slug,
    })
}
