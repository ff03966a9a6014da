pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::localization::Language;

/// Publication state shared by books, sections and Q&As. Only published
/// content is ever visible to retrieval or sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Draft,
    Published,
}

impl Status {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Draft => "draft",
            Status::Published => "published",
        }
    }

    #[inline]
    pub fn parse(value: &str) -> Self {
        if value == "published" {
            Status::Published
        } else {
            Status::Draft
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: i64,
    pub slug: String,
    pub title_vi: String,
    pub title_en: String,
    pub status: Status,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub id: i64,
    pub sort_order: i64,
    pub slug: String,
    pub title_vi: String,
    pub title_en: String,
    pub summary_vi: String,
    pub summary_en: String,
    /// Relation to the owning book; may dangle or be unset, which the sync
    /// engine treats as a broken chain.
    pub book_id: Option<i64>,
    pub status: Status,
    pub tags: Vec<String>,
    pub keywords: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLink {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Qa {
    pub id: i64,
    pub sort_order: i64,
    pub question_vi: String,
    pub question_en: String,
    /// Structured rich-text documents, flattened at mapping time.
    pub answer_vi: Value,
    pub answer_en: Value,
    pub section_id: Option<i64>,
    pub sources: Vec<SourceLink>,
    pub tags: Vec<String>,
    pub keywords: Vec<String>,
    pub status: Status,
    pub updated_at: DateTime<Utc>,
}

/// One page of a listing; `has_next_page` drives the scan loops.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub docs: Vec<T>,
    pub has_next_page: bool,
}

/// Collections addressable by the admin sync surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncCollection {
    Qas,
    Sections,
}

impl SyncCollection {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncCollection::Qas => "qas",
            SyncCollection::Sections => "sections",
        }
    }
}

/// Typed filter for bulk id selection on the sync endpoint. All clauses are
/// conjoined; an empty selector matches everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncSelector {
    pub status: Option<Status>,
    pub book_id: Option<i64>,
    pub section_id: Option<i64>,
}

/// A search hit projected down to the fields the search UI renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub qa_id: i64,
    pub question: String,
    pub section_id: i64,
    pub section_title: String,
    pub section_slug: String,
    pub book_id: i64,
    pub book_title: String,
    pub book_slug: String,
}

/// Read surface over the relational handbook content. The "published"
/// getters return `None` for drafts and dangling ids alike.
#[async_trait]
pub trait HandbookStore: Send + Sync {
    async fn get_published_book(&self, id: i64) -> Result<Option<Book>>;

    async fn get_published_section(&self, id: i64) -> Result<Option<Section>>;

    async fn get_published_qa(&self, id: i64) -> Result<Option<Qa>>;

    /// Pages are 1-based, ordered by id.
    async fn list_published_books(&self, page: u32, limit: u32) -> Result<Page<Book>>;

    async fn list_published_sections(&self, page: u32, limit: u32) -> Result<Page<Section>>;

    async fn list_published_qas(&self, page: u32, limit: u32) -> Result<Page<Qa>>;

    async fn list_published_qas_by_section(
        &self,
        section_id: i64,
        page: u32,
        limit: u32,
    ) -> Result<Page<Qa>>;

    /// Ids of a collection matching `selector`, for bulk sync selection.
    /// Includes drafts unless the selector narrows the status.
    async fn list_ids(
        &self,
        collection: SyncCollection,
        selector: SyncSelector,
        page: u32,
        limit: u32,
    ) -> Result<Page<i64>>;

    /// Substring search over published Q&As joined to their published
    /// section and book, used when hybrid search is unavailable.
    async fn search_qas_lexical(
        &self,
        query: &str,
        language: Language,
        limit: u32,
    ) -> Result<Vec<SearchResult>>;
}
