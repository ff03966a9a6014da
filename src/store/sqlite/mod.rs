
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, Pool, QueryBuilder, Sqlite};
use tracing::{debug, info};

use super::{
    Book, HandbookStore, Page, Qa, SearchResult, Section, SourceLink, Status, SyncCollection,
    SyncSelector,
};
use crate::localization::{Language, pick_localized};

pub type DbPool = Pool<Sqlite>;

const MAX_CONNECTIONS: u32 = 10;

/// SQLite-backed content store. JSON-ish columns (tags, keywords, sources,
/// rich-text answers) are stored as TEXT and parsed at the boundary;
/// unparseable values decay to empty rather than failing the read.
#[derive(Debug, Clone)]
pub struct SqliteHandbookStore {
    pool: DbPool,
}

impl SqliteHandbookStore {
    /// Opens (creating if missing) the database at `database_path` and runs
    /// pending migrations.
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let database_path = database_path.as_ref();
        if let Some(parent) = database_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .with_context(|| {
                format!("Failed to open database at {}", database_path.display())
            })?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("opened handbook database at {}", database_path.display());
        Ok(store)
    }

    /// In-memory database for tests and dry runs. Uses a single connection
    /// because every new in-memory connection would be a fresh database.
    #[inline]
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("Failed to parse in-memory connection string")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("src/store/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        debug!("database migrations up to date");
        Ok(())
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[derive(FromRow)]
struct BookRow {
    id: i64,
    slug: String,
    title_vi: String,
    title_en: String,
    status: String,
    updated_at: DateTime<Utc>,
}

impl BookRow {
    fn into_book(self) -> Book {
        Book {
            id: self.id,
            slug: self.slug,
            title_vi: self.title_vi,
            title_en: self.title_en,
            status: Status::parse(&self.status),
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct SectionRow {
    id: i64,
    sort_order: i64,
    slug: String,
    title_vi: String,
    title_en: String,
    summary_vi: String,
    summary_en: String,
    book_id: Option<i64>,
    status: String,
    tags: String,
    keywords: String,
    updated_at: DateTime<Utc>,
}

impl SectionRow {
    fn into_section(self) -> Section {
        Section {
            id: self.id,
            sort_order: self.sort_order,
            slug: self.slug,
            title_vi: self.title_vi,
            title_en: self.title_en,
            summary_vi: self.summary_vi,
            summary_en: self.summary_en,
            book_id: self.book_id,
            status: Status::parse(&self.status),
            tags: parse_string_list(&self.tags),
            keywords: parse_string_list(&self.keywords),
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct QaRow {
    id: i64,
    sort_order: i64,
    question_vi: String,
    question_en: String,
    answer_vi: String,
    answer_en: String,
    section_id: Option<i64>,
    sources: String,
    tags: String,
    keywords: String,
    status: String,
    updated_at: DateTime<Utc>,
}

impl QaRow {
    fn into_qa(self) -> Qa {
        Qa {
            id: self.id,
            sort_order: self.sort_order,
            question_vi: self.question_vi,
            question_en: self.question_en,
            answer_vi: parse_json_value(&self.answer_vi),
            answer_en: parse_json_value(&self.answer_en),
            section_id: self.section_id,
            sources: serde_json::from_str::<Vec<SourceLink>>(&self.sources).unwrap_or_default(),
            tags: parse_string_list(&self.tags),
            keywords: parse_string_list(&self.keywords),
            status: Status::parse(&self.status),
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct SearchRow {
    qa_id: i64,
    question_vi: String,
    question_en: String,
    section_id: i64,
    section_title_vi: String,
    section_title_en: String,
    section_slug: String,
    book_id: i64,
    book_title_vi: String,
    book_title_en: String,
    book_slug: String,
}

fn parse_string_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn parse_json_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or(Value::Null)
}

/// Escapes LIKE wildcards so user input matches literally (paired with
/// `ESCAPE '\'` in the query).
fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn page_window(page: u32, limit: u32) -> (i64, i64) {
    let offset = i64::from(page.saturating_sub(1)) * i64::from(limit);
    (i64::from(limit) + 1, offset)
}

const BOOK_COLUMNS: &str = "id, slug, title_vi, title_en, status, updated_at";
const SECTION_COLUMNS: &str = "id, sort_order, slug, title_vi, title_en, summary_vi, summary_en, \
     book_id, status, tags, keywords, updated_at";
const QA_COLUMNS: &str = "id, sort_order, question_vi, question_en, answer_vi, answer_en, \
     section_id, sources, tags, keywords, status, updated_at";

#[async_trait]
impl HandbookStore for SqliteHandbookStore {
    async fn get_published_book(&self, id: i64) -> Result<Option<Book>> {
        let sql = format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ? AND status = 'published'");
        let row = sqlx::query_as::<_, BookRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch book")?;
        Ok(row.map(BookRow::into_book))
    }

    async fn get_published_section(&self, id: i64) -> Result<Option<Section>> {
        let sql =
            format!("SELECT {SECTION_COLUMNS} FROM sections WHERE id = ? AND status = 'published'");
        let row = sqlx::query_as::<_, SectionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch section")?;
        Ok(row.map(SectionRow::into_section))
    }

    async fn get_published_qa(&self, id: i64) -> Result<Option<Qa>> {
        let sql = format!("SELECT {QA_COLUMNS} FROM qas WHERE id = ? AND status = 'published'");
        let row = sqlx::query_as::<_, QaRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch Q&A")?;
        Ok(row.map(QaRow::into_qa))
    }

    async fn list_published_books(&self, page: u32, limit: u32) -> Result<Page<Book>> {
        let (fetch, offset) = page_window(page, limit);
        let sql = format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE status = 'published' \
             ORDER BY id LIMIT ? OFFSET ?"
        );
        let mut rows = sqlx::query_as::<_, BookRow>(&sql)
            .bind(fetch)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list books")?;
        let has_next_page = rows.len() > limit as usize;
        rows.truncate(limit as usize);
        Ok(Page {
            docs: rows.into_iter().map(BookRow::into_book).collect(),
            has_next_page,
        })
    }

    async fn list_published_sections(&self, page: u32, limit: u32) -> Result<Page<Section>> {
        let (fetch, offset) = page_window(page, limit);
        let sql = format!(
            "SELECT {SECTION_COLUMNS} FROM sections WHERE status = 'published' \
             ORDER BY id LIMIT ? OFFSET ?"
        );
        let mut rows = sqlx::query_as::<_, SectionRow>(&sql)
            .bind(fetch)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list sections")?;
        let has_next_page = rows.len() > limit as usize;
        rows.truncate(limit as usize);
        Ok(Page {
            docs: rows.into_iter().map(SectionRow::into_section).collect(),
            has_next_page,
        })
    }

    async fn list_published_qas(&self, page: u32, limit: u32) -> Result<Page<Qa>> {
        let (fetch, offset) = page_window(page, limit);
        let sql = format!(
            "SELECT {QA_COLUMNS} FROM qas WHERE status = 'published' \
             ORDER BY id LIMIT ? OFFSET ?"
        );
        let mut rows = sqlx::query_as::<_, QaRow>(&sql)
            .bind(fetch)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list Q&As")?;
        let has_next_page = rows.len() > limit as usize;
        rows.truncate(limit as usize);
        Ok(Page {
            docs: rows.into_iter().map(QaRow::into_qa).collect(),
            has_next_page,
        })
    }

    async fn list_published_qas_by_section(
        &self,
        section_id: i64,
        page: u32,
        limit: u32,
    ) -> Result<Page<Qa>> {
        let (fetch, offset) = page_window(page, limit);
        let sql = format!(
            "SELECT {QA_COLUMNS} FROM qas WHERE section_id = ? AND status = 'published' \
             ORDER BY sort_order, id LIMIT ? OFFSET ?"
        );
        let mut rows = sqlx::query_as::<_, QaRow>(&sql)
            .bind(section_id)
            .bind(fetch)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list Q&As for section")?;
        let has_next_page = rows.len() > limit as usize;
        rows.truncate(limit as usize);
        Ok(Page {
            docs: rows.into_iter().map(QaRow::into_qa).collect(),
            has_next_page,
        })
    }

    async fn list_ids(
        &self,
        collection: SyncCollection,
        selector: SyncSelector,
        page: u32,
        limit: u32,
    ) -> Result<Page<i64>> {
        let (fetch, offset) = page_window(page, limit);
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT id FROM ");
        builder.push(collection.as_str());
        builder.push(" WHERE 1 = 1");
        if let Some(status) = selector.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        match collection {
            SyncCollection::Qas => {
                if let Some(section_id) = selector.section_id {
                    builder.push(" AND section_id = ").push_bind(section_id);
                }
                if let Some(book_id) = selector.book_id {
                    builder
                        .push(" AND section_id IN (SELECT id FROM sections WHERE book_id = ")
                        .push_bind(book_id)
                        .push(")");
                }
            }
            SyncCollection::Sections => {
                if let Some(section_id) = selector.section_id {
                    builder.push(" AND id = ").push_bind(section_id);
                }
                if let Some(book_id) = selector.book_id {
                    builder.push(" AND book_id = ").push_bind(book_id);
                }
            }
        }
        builder.push(" ORDER BY id LIMIT ").push_bind(fetch);
        builder.push(" OFFSET ").push_bind(offset);

        let mut ids: Vec<i64> = builder
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list ids")?;
        let has_next_page = ids.len() > limit as usize;
        ids.truncate(limit as usize);
        Ok(Page {
            docs: ids,
            has_next_page,
        })
    }

    async fn search_qas_lexical(
        &self,
        query: &str,
        language: Language,
        limit: u32,
    ) -> Result<Vec<SearchResult>> {
        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));
        let sql = "SELECT q.id AS qa_id, q.question_vi, q.question_en, \
                   s.id AS section_id, s.title_vi AS section_title_vi, \
                   s.title_en AS section_title_en, s.slug AS section_slug, \
                   b.id AS book_id, b.title_vi AS book_title_vi, \
                   b.title_en AS book_title_en, b.slug AS book_slug \
                   FROM qas q \
                   JOIN sections s ON s.id = q.section_id \
                   JOIN books b ON b.id = s.book_id \
                   WHERE q.status = 'published' AND s.status = 'published' \
                   AND b.status = 'published' \
                   AND (LOWER(q.question_vi) LIKE ? ESCAPE '\\' \
                        OR LOWER(q.question_en) LIKE ? ESCAPE '\\') \
                   ORDER BY s.sort_order, s.id, q.sort_order, q.id LIMIT ?";
        let rows = sqlx::query_as::<_, SearchRow>(sql)
            .bind(&pattern)
            .bind(&pattern)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .context("Failed to run lexical search")?;

        Ok(rows
            .into_iter()
            .map(|row| SearchResult {
                qa_id: row.qa_id,
                question: pick_localized(language, &row.question_vi, &row.question_en),
                section_id: row.section_id,
                section_title: pick_localized(
                    language,
                    &row.section_title_vi,
                    &row.section_title_en,
                ),
                section_slug: row.section_slug,
                book_id: row.book_id,
                book_title: pick_localized(language, &row.book_title_vi, &row.book_title_en),
                book_slug: row.book_slug,
            })
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::Utc;
    use serde_json::{Value, json};

    use super::DbPool;
    use crate::store::Status;

    pub struct BookFixture {
        pub id: i64,
        pub slug: String,
        pub title_vi: String,
        pub title_en: String,
        pub status: Status,
    }

    impl Default for BookFixture {
        fn default() -> Self {
            Self {
                id: 1,
                slug: "employee-handbook".to_string(),
                title_vi: "Sổ tay nhân viên".to_string(),
                title_en: "Employee handbook".to_string(),
                status: Status::Published,
            }
        }
    }

    pub struct SectionFixture {
        pub id: i64,
        pub sort_order: i64,
        pub slug: String,
        pub title_vi: String,
        pub title_en: String,
        pub summary_vi: String,
        pub summary_en: String,
        pub book_id: Option<i64>,
        pub status: Status,
        pub tags: Vec<String>,
        pub keywords: Vec<String>,
    }

    impl Default for SectionFixture {
        fn default() -> Self {
            Self {
                id: 10,
                sort_order: 0,
                slug: "leave-policy".to_string(),
                title_vi: "Chính sách nghỉ phép".to_string(),
                title_en: "Leave policy".to_string(),
                summary_vi: String::new(),
                summary_en: String::new(),
                book_id: Some(1),
                status: Status::Published,
                tags: Vec::new(),
                keywords: Vec::new(),
            }
        }
    }

    pub struct QaFixture {
        pub id: i64,
        pub sort_order: i64,
        pub question_vi: String,
        pub question_en: String,
        pub answer_vi: Value,
        pub answer_en: Value,
        pub section_id: Option<i64>,
        pub status: Status,
        pub tags: Vec<String>,
        pub keywords: Vec<String>,
    }

    impl Default for QaFixture {
        fn default() -> Self {
            Self {
                id: 100,
                sort_order: 0,
                question_vi: "Nghỉ phép năm bao nhiêu ngày?".to_string(),
                question_en: "How many annual leave days?".to_string(),
                answer_vi: rich_text("12 ngày làm việc mỗi năm."),
                answer_en: rich_text("12 working days per year."),
                section_id: Some(10),
                status: Status::Published,
                tags: Vec::new(),
                keywords: Vec::new(),
            }
        }
    }

    /// Minimal rich-text document wrapping a single text node.
    pub fn rich_text(text: &str) -> Value {
        json!({ "root": { "children": [{ "children": [{ "text": text }] }] } })
    }

    pub async fn insert_book(pool: &DbPool, fixture: BookFixture) {
        sqlx::query(
            "INSERT INTO books (id, slug, title_vi, title_en, status, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(fixture.id)
        .bind(&fixture.slug)
        .bind(&fixture.title_vi)
        .bind(&fixture.title_en)
        .bind(fixture.status.as_str())
        .bind(Utc::now())
        .execute(pool)
        .await
        .expect("Failed to insert book fixture");
    }

    pub async fn insert_section(pool: &DbPool, fixture: SectionFixture) {
        sqlx::query(
            "INSERT INTO sections (id, sort_order, slug, title_vi, title_en, summary_vi, \
             summary_en, book_id, status, tags, keywords, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(fixture.id)
        .bind(fixture.sort_order)
        .bind(&fixture.slug)
        .bind(&fixture.title_vi)
        .bind(&fixture.title_en)
        .bind(&fixture.summary_vi)
        .bind(&fixture.summary_en)
        .bind(fixture.book_id)
        .bind(fixture.status.as_str())
        .bind(serde_json::to_string(&fixture.tags).expect("tags serialize"))
        .bind(serde_json::to_string(&fixture.keywords).expect("keywords serialize"))
        .bind(Utc::now())
        .execute(pool)
        .await
        .expect("Failed to insert section fixture");
    }

    pub async fn insert_qa(pool: &DbPool, fixture: QaFixture) {
        sqlx::query(
            "INSERT INTO qas (id, sort_order, question_vi, question_en, answer_vi, answer_en, \
             section_id, sources, tags, keywords, status, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, '[]', ?, ?, ?, ?)",
        )
        .bind(fixture.id)
        .bind(fixture.sort_order)
        .bind(&fixture.question_vi)
        .bind(&fixture.question_en)
        .bind(serde_json::to_string(&fixture.answer_vi).expect("answer serialize"))
        .bind(serde_json::to_string(&fixture.answer_en).expect("answer serialize"))
        .bind(fixture.section_id)
        .bind(serde_json::to_string(&fixture.tags).expect("tags serialize"))
        .bind(serde_json::to_string(&fixture.keywords).expect("keywords serialize"))
        .bind(fixture.status.as_str())
        .bind(Utc::now())
        .execute(pool)
        .await
        .expect("Failed to insert qa fixture");
    }
}
