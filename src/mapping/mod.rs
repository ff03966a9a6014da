
use std::collections::HashSet;

use crate::localization::{Language, normalize_whitespace, pick_localized};
use crate::richtext::extract_plain_text;
use crate::store::{Book, Qa, Section, Status};
use crate::vector::{DocumentType, RECORD_VERSION, VectorMetadata, VectorRecord};

/// Caps keep the embedded text inside the backend's per-record limit.
pub const MAX_DATA_LENGTH: usize = 8000;
const MAX_ANSWER_LENGTH: usize = 4000;
const MAX_SUMMARY_LENGTH: usize = 1000;

fn truncate_chars(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        value.chars().take(max).collect()
    }
}

/// Trims and collapses whitespace in each term, then dedups
/// case-insensitively while preserving first-seen casing and order.
#[inline]
pub fn normalize_terms(terms: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut normalized = Vec::new();
    for term in terms {
        let cleaned = normalize_whitespace(term);
        if cleaned.is_empty() {
            continue;
        }
        if seen.insert(cleaned.to_lowercase()) {
            normalized.push(cleaned);
        }
    }
    normalized
}

fn record_id(doc_type: DocumentType, entity_id: i64, language: Language) -> String {
    format!("{}:{}:{}", doc_type.as_str(), entity_id, language.as_str())
}

/// The two deterministic record ids for a Q&A, one per language. These ids
/// are the idempotency key: re-upserting overwrites in place, and deletes
/// can always be addressed without a lookup.
#[inline]
pub fn build_qa_record_ids(qa_id: i64) -> Vec<String> {
    Language::ALL
        .iter()
        .map(|&language| record_id(DocumentType::Qa, qa_id, language))
        .collect()
}

#[inline]
pub fn build_section_record_ids(section_id: i64) -> Vec<String> {
    Language::ALL
        .iter()
        .map(|&language| record_id(DocumentType::Section, section_id, language))
        .collect()
}

fn push_terms(rows: &mut Vec<String>, tags: &[String], keywords: &[String]) {
    if !tags.is_empty() {
        rows.push(format!("tags: {}", tags.join(", ")));
    }
    if !keywords.is_empty() {
        rows.push(format!("keywords: {}", keywords.join(", ")));
        // Space-joined duplicate row biases the lexical half of hybrid
        // scoring toward exact keyword hits.
        rows.push(format!("keyword_terms: {}", keywords.join(" ")));
    }
}

fn build_section_data(
    section: &Section,
    book: &Book,
    language: Language,
    tags: &[String],
    keywords: &[String],
) -> String {
    let title = pick_localized(language, &section.title_vi, &section.title_en);
    let summary = truncate_chars(
        &pick_localized(language, &section.summary_vi, &section.summary_en),
        MAX_SUMMARY_LENGTH,
    );
    let book_title = pick_localized(language, &book.title_vi, &book.title_en);

    let mut rows = vec![
        "type: section".to_string(),
        format!("language: {language}"),
        format!("book: {book_title}"),
        format!("section: {title}"),
    ];
    if !summary.is_empty() {
        rows.push(format!("summary: {summary}"));
    }
    push_terms(&mut rows, tags, keywords);
    truncate_chars(&rows.join("\n"), MAX_DATA_LENGTH)
}

fn build_qa_data(
    qa: &Qa,
    section: &Section,
    book: &Book,
    language: Language,
    tags: &[String],
    keywords: &[String],
) -> String {
    let question = pick_localized(language, &qa.question_vi, &qa.question_en);
    // Answers are not cross-language: an untranslated answer yields a
    // record without an answer row rather than one in the wrong language.
    let answer_source = match language {
        Language::Vi => &qa.answer_vi,
        Language::En => &qa.answer_en,
    };
    let answer = truncate_chars(&extract_plain_text(answer_source), MAX_ANSWER_LENGTH);
    let section_title = pick_localized(language, &section.title_vi, &section.title_en);
    let book_title = pick_localized(language, &book.title_vi, &book.title_en);

    let mut rows = vec![
        "type: qa".to_string(),
        format!("language: {language}"),
        format!("book: {book_title}"),
        format!("section: {section_title}"),
    ];
    if !question.is_empty() {
        rows.push(format!("question: {question}"));
    }
    if !answer.is_empty() {
        rows.push(format!("answer: {answer}"));
    }
    push_terms(&mut rows, tags, keywords);
    truncate_chars(&rows.join("\n"), MAX_DATA_LENGTH)
}

/// Builds the two per-language records for a section. Pure: callers resolve
/// the published book beforehand.
#[inline]
pub fn build_section_vector_records(section: &Section, book: &Book) -> Vec<VectorRecord> {
    let tags = normalize_terms(&section.tags);
    let keywords = normalize_terms(&section.keywords);

    Language::ALL
        .iter()
        .map(|&language| {
            let title = pick_localized(language, &section.title_vi, &section.title_en);
            let book_title = pick_localized(language, &book.title_vi, &book.title_en);
            VectorRecord {
                id: record_id(DocumentType::Section, section.id, language),
                data: build_section_data(section, book, language, &tags, &keywords),
                metadata: VectorMetadata {
                    doc_type: DocumentType::Section,
                    lang: language,
                    doc_id: section.id,
                    qa_id: None,
                    section_id: section.id,
                    book_id: book.id,
                    book_slug: book.slug.clone(),
                    book_title: Some(book_title),
                    section_slug: section.slug.clone(),
                    section_title: Some(title.clone()),
                    published: section.status == Status::Published,
                    tags: tags.clone(),
                    keywords: keywords.clone(),
                    updated_at: section.updated_at.to_rfc3339(),
                    question: None,
                    title: Some(title),
                    record_version: RECORD_VERSION.to_string(),
                },
            }
        })
        .collect()
}

/// Builds the two per-language records for a Q&A with book and section
/// titles denormalized into metadata for display.
#[inline]
pub fn build_qa_vector_records(qa: &Qa, section: &Section, book: &Book) -> Vec<VectorRecord> {
    let tags = normalize_terms(&qa.tags);
    let keywords = normalize_terms(&qa.keywords);

    Language::ALL
        .iter()
        .map(|&language| {
            let question = pick_localized(language, &qa.question_vi, &qa.question_en);
            let section_title = pick_localized(language, &section.title_vi, &section.title_en);
            let book_title = pick_localized(language, &book.title_vi, &book.title_en);
            VectorRecord {
                id: record_id(DocumentType::Qa, qa.id, language),
                data: build_qa_data(qa, section, book, language, &tags, &keywords),
                metadata: VectorMetadata {
                    doc_type: DocumentType::Qa,
                    lang: language,
                    doc_id: qa.id,
                    qa_id: Some(qa.id),
                    section_id: section.id,
                    book_id: book.id,
                    book_slug: book.slug.clone(),
                    book_title: Some(book_title),
                    section_slug: section.slug.clone(),
                    section_title: Some(section_title),
                    published: qa.status == Status::Published,
                    tags: tags.clone(),
                    keywords: keywords.clone(),
                    updated_at: qa.updated_at.to_rfc3339(),
                    question: if question.is_empty() {
                        None
                    } else {
                        Some(question)
                    },
                    title: None,
                    record_version: RECORD_VERSION.to_string(),
                },
            }
        })
        .collect()
}
