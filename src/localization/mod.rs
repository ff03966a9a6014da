
use std::fmt;

use serde::{Deserialize, Serialize};

/// Content languages of the handbook. Vietnamese is the primary language,
/// English the secondary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Vi,
    En,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Vi, Language::En];

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Vi => "vi",
            Language::En => "en",
        }
    }

    #[inline]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "vi" => Some(Language::Vi),
            "en" => Some(Language::En),
            _ => None,
        }
    }

    /// Coarse Accept-Language resolution: the header is only scanned for a
    /// known language tag, quality values are ignored.
    #[inline]
    pub fn from_accept_language(header: &str) -> Option<Self> {
        let normalized = header.to_lowercase();
        if normalized.contains("vi") {
            Some(Language::Vi)
        } else if normalized.contains("en") {
            Some(Language::En)
        } else {
            None
        }
    }
}

impl Default for Language {
    #[inline]
    fn default() -> Self {
        Language::En
    }
}

impl fmt::Display for Language {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collapses all runs of whitespace to single spaces and trims the ends.
#[inline]
pub fn normalize_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Picks the field variant for `language`, falling back to the other
/// language when the preferred variant is blank. The result is
/// whitespace-normalized.
#[inline]
pub fn pick_localized(language: Language, vietnamese: &str, english: &str) -> String {
    let (primary, fallback) = match language {
        Language::Vi => (vietnamese, english),
        Language::En => (english, vietnamese),
    };
    let picked = if primary.trim().is_empty() {
        fallback
    } else {
        primary
    };
    normalize_whitespace(picked)
}

/// Canned answer used when retrieval produced nothing usable or the query
/// was empty.
#[inline]
pub fn empty_answer(language: Language) -> &'static str {
    match language {
        Language::Vi => "Tôi chưa tìm thấy thông tin phù hợp trong tài liệu hiện có.",
        Language::En => "I could not find relevant information in the current handbook content.",
    }
}

/// Canned answer used by the RAG endpoint for queries below the minimum
/// length.
#[inline]
pub fn short_query_answer(language: Language) -> &'static str {
    match language {
        Language::Vi => "Vui lòng nhập câu hỏi dài hơn để tìm kiếm trong cẩm nang.",
        Language::En => "Please enter a longer query to search the handbook.",
    }
}
