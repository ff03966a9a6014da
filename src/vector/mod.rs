pub mod client;

use serde::{Deserialize, Serialize};

use crate::localization::Language;

/// Bumped whenever the record layout changes incompatibly, so stale records
/// can be identified inside the index.
pub const RECORD_VERSION: &str = "v1";

/// Document families stored in the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Qa,
    Section,
}

impl DocumentType {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Qa => "qa",
            DocumentType::Section => "section",
        }
    }
}

/// Filterable metadata attached to every vector record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorMetadata {
    pub doc_type: DocumentType,
    pub lang: Language,
    pub doc_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qa_id: Option<i64>,
    pub section_id: i64,
    pub book_id: i64,
    pub book_slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book_title: Option<String>,
    pub section_slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
    pub published: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub record_version: String,
}

/// One upsertable unit: the backend embeds `data` server-side, so records
/// carry text rather than vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub data: String,
    pub metadata: VectorMetadata,
}

/// Counters reported by a full reindex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub books_scanned: usize,
    pub sections_scanned: usize,
    pub qas_scanned: usize,
    pub sections_upserted: usize,
    pub qas_upserted: usize,
    pub vectors_upserted: usize,
    pub skipped: usize,
    pub reset_performed: bool,
}
