pub mod hooks;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::mapping::{
    build_qa_record_ids, build_qa_vector_records, build_section_record_ids,
    build_section_vector_records,
};
use crate::store::{Book, HandbookStore, Qa, Section, SyncCollection, SyncSelector};
use crate::vector::client::VectorStoreClient;
use crate::vector::{SyncStats, VectorRecord};

/// Backend request-size limit governs the batch sizes.
pub const VECTOR_UPSERT_BATCH_SIZE: usize = 64;
pub const VECTOR_DELETE_BATCH_SIZE: usize = 64;
/// Page size for full-table scans during reindex and bulk selection.
pub const FETCH_PAGE_SIZE: u32 = 100;

/// Keeps the vector index in step with the relational content.
///
/// Every entity sync resolves the full published join chain
/// (Qa -> Section -> Book); any broken link means the entity must not be
/// findable, so its vectors are purged instead of upserted.
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn HandbookStore>,
    vector: Arc<VectorStoreClient>,
    namespace: String,
}

impl SyncEngine {
    #[inline]
    pub fn new(
        store: Arc<dyn HandbookStore>,
        vector: Arc<VectorStoreClient>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            vector,
            namespace: namespace.into(),
        }
    }

    fn upsert_records(&self, records: &[VectorRecord]) -> Result<usize> {
        let mut upserted = 0;
        for batch in records.chunks(VECTOR_UPSERT_BATCH_SIZE) {
            self.vector
                .upsert(&self.namespace, batch)
                .context("Vector upsert batch failed")?;
            upserted += batch.len();
        }
        Ok(upserted)
    }

    fn delete_record_ids(&self, ids: &[String]) -> Result<usize> {
        let mut deleted = 0;
        for batch in ids.chunks(VECTOR_DELETE_BATCH_SIZE) {
            deleted += self
                .vector
                .delete(&self.namespace, batch)
                .context("Vector delete batch failed")?;
        }
        Ok(deleted)
    }

    async fn collect_published_qas_for_section(&self, section_id: i64) -> Result<Vec<Qa>> {
        let mut qas = Vec::new();
        let mut page = 1;
        loop {
            let result = self
                .store
                .list_published_qas_by_section(section_id, page, FETCH_PAGE_SIZE)
                .await?;
            let has_next_page = result.has_next_page;
            qas.extend(result.docs);
            if !has_next_page {
                break;
            }
            page += 1;
        }
        Ok(qas)
    }

    /// Resolves the published chain for a Q&A and upserts its two records.
    /// A broken chain (draft/missing Q&A, section or book, or an unset
    /// relation) purges the Q&A's vectors instead. Returns the number of
    /// records upserted.
    #[inline]
    pub async fn sync_qa_by_id(&self, qa_id: i64) -> Result<usize> {
        if !self.vector.is_configured() {
            return Ok(0);
        }

        let Some(qa) = self.store.get_published_qa(qa_id).await? else {
            debug!("qa {qa_id} is not published, purging vectors");
            self.delete_record_ids(&build_qa_record_ids(qa_id))?;
            return Ok(0);
        };
        let Some(section_id) = qa.section_id else {
            debug!("qa {qa_id} has no section, purging vectors");
            self.delete_record_ids(&build_qa_record_ids(qa_id))?;
            return Ok(0);
        };
        let Some(section) = self.store.get_published_section(section_id).await? else {
            debug!("section {section_id} of qa {qa_id} is not published, purging vectors");
            self.delete_record_ids(&build_qa_record_ids(qa_id))?;
            return Ok(0);
        };
        let Some(book_id) = section.book_id else {
            debug!("section {section_id} has no book, purging vectors of qa {qa_id}");
            self.delete_record_ids(&build_qa_record_ids(qa_id))?;
            return Ok(0);
        };
        let Some(book) = self.store.get_published_book(book_id).await? else {
            debug!("book {book_id} of qa {qa_id} is not published, purging vectors");
            self.delete_record_ids(&build_qa_record_ids(qa_id))?;
            return Ok(0);
        };

        let records = build_qa_vector_records(&qa, &section, &book);
        let upserted = self.upsert_records(&records)?;
        debug!("synced qa {qa_id}: {upserted} records upserted");
        Ok(upserted)
    }

    /// Unconditionally removes both language records of a Q&A.
    #[inline]
    pub async fn delete_qa_vectors_by_id(&self, qa_id: i64) -> Result<usize> {
        if !self.vector.is_configured() {
            return Ok(0);
        }
        self.delete_record_ids(&build_qa_record_ids(qa_id))
    }

    async fn purge_section_and_qas(&self, section_id: i64) -> Result<usize> {
        let mut ids = build_section_record_ids(section_id);
        let qas = self.collect_published_qas_for_section(section_id).await?;
        for qa in &qas {
            ids.extend(build_qa_record_ids(qa.id));
        }
        self.delete_record_ids(&ids)
    }

    /// Syncs a section plus every published Q&A under it, so denormalized
    /// book/section titles propagate when a section changes. A broken
    /// Section -> Book chain cascade-purges the section's and its Q&As'
    /// vectors. Returns the number of records upserted.
    #[inline]
    pub async fn sync_section_and_qas_by_section_id(&self, section_id: i64) -> Result<usize> {
        if !self.vector.is_configured() {
            return Ok(0);
        }

        let Some(section) = self.store.get_published_section(section_id).await? else {
            debug!("section {section_id} is not published, purging vectors and cascading");
            self.purge_section_and_qas(section_id).await?;
            return Ok(0);
        };
        let Some(book_id) = section.book_id else {
            debug!("section {section_id} has no book, purging vectors and cascading");
            self.purge_section_and_qas(section_id).await?;
            return Ok(0);
        };
        let Some(book) = self.store.get_published_book(book_id).await? else {
            debug!("book {book_id} of section {section_id} is not published, purging");
            self.purge_section_and_qas(section_id).await?;
            return Ok(0);
        };

        let mut records = build_section_vector_records(&section, &book);
        for qa in self.collect_published_qas_for_section(section_id).await? {
            records.extend(build_qa_vector_records(&qa, &section, &book));
        }
        let upserted = self.upsert_records(&records)?;
        info!("synced section {section_id}: {upserted} records upserted");
        Ok(upserted)
    }

    /// Removes a section's records and the records of every published Q&A
    /// still attached to it.
    #[inline]
    pub async fn delete_section_and_qa_vectors_by_section_id(
        &self,
        section_id: i64,
    ) -> Result<usize> {
        if !self.vector.is_configured() {
            return Ok(0);
        }
        self.purge_section_and_qas(section_id).await
    }

    /// Rebuilds the whole namespace from the database: scans every
    /// published book, section and Q&A, skips entities whose parents don't
    /// resolve, and issues one batched upsert pass per document family.
    #[inline]
    pub async fn reindex_from_database(&self, reset: bool) -> Result<SyncStats> {
        if !self.vector.is_configured() {
            bail!("vector store is not configured");
        }

        let mut stats = SyncStats::default();

        if reset {
            self.vector
                .reset(&self.namespace)
                .context("Namespace reset failed")?;
            stats.reset_performed = true;
            info!("vector namespace '{}' reset", self.namespace);
        }

        let mut books: HashMap<i64, Book> = HashMap::new();
        let mut page = 1;
        loop {
            let result = self.store.list_published_books(page, FETCH_PAGE_SIZE).await?;
            let has_next_page = result.has_next_page;
            stats.books_scanned += result.docs.len();
            for book in result.docs {
                books.insert(book.id, book);
            }
            if !has_next_page {
                break;
            }
            page += 1;
        }

        let mut sections: HashMap<i64, Section> = HashMap::new();
        let mut section_records: Vec<VectorRecord> = Vec::new();
        let mut page = 1;
        loop {
            let result = self
                .store
                .list_published_sections(page, FETCH_PAGE_SIZE)
                .await?;
            let has_next_page = result.has_next_page;
            stats.sections_scanned += result.docs.len();
            for section in result.docs {
                let book = section.book_id.and_then(|book_id| books.get(&book_id));
                let Some(book) = book else {
                    warn!("section {} skipped: book does not resolve", section.id);
                    stats.skipped += 1;
                    continue;
                };
                section_records.extend(build_section_vector_records(&section, book));
                stats.sections_upserted += 1;
                sections.insert(section.id, section);
            }
            if !has_next_page {
                break;
            }
            page += 1;
        }

        let mut qa_records: Vec<VectorRecord> = Vec::new();
        let mut page = 1;
        loop {
            let result = self.store.list_published_qas(page, FETCH_PAGE_SIZE).await?;
            let has_next_page = result.has_next_page;
            stats.qas_scanned += result.docs.len();
            for qa in result.docs {
                let section = qa.section_id.and_then(|section_id| sections.get(&section_id));
                let book = section
                    .and_then(|section| section.book_id)
                    .and_then(|book_id| books.get(&book_id));
                let (Some(section), Some(book)) = (section, book) else {
                    warn!("qa {} skipped: section or book does not resolve", qa.id);
                    stats.skipped += 1;
                    continue;
                };
                qa_records.extend(build_qa_vector_records(&qa, section, book));
                stats.qas_upserted += 1;
            }
            if !has_next_page {
                break;
            }
            page += 1;
        }

        stats.vectors_upserted += self.upsert_records(&section_records)?;
        stats.vectors_upserted += self.upsert_records(&qa_records)?;

        info!(
            "reindex complete: {} sections, {} qas, {} vectors upserted, {} skipped",
            stats.sections_upserted, stats.qas_upserted, stats.vectors_upserted, stats.skipped
        );
        Ok(stats)
    }

    /// Collects every id of `collection` matching `selector`, paging
    /// through the store. Used by the bulk-sync API surface.
    #[inline]
    pub async fn collect_ids(
        &self,
        collection: SyncCollection,
        selector: SyncSelector,
    ) -> Result<Vec<i64>> {
        let mut ids = Vec::new();
        let mut page = 1;
        loop {
            let result = self
                .store
                .list_ids(collection, selector, page, FETCH_PAGE_SIZE)
                .await?;
            let has_next_page = result.has_next_page;
            ids.extend(result.docs);
            if !has_next_page {
                break;
            }
            page += 1;
        }
        Ok(ids)
    }

    /// Dispatches a single-id sync for the addressed collection.
    #[inline]
    pub async fn sync_collection_id(
        &self,
        collection: SyncCollection,
        id: i64,
    ) -> Result<usize> {
        match collection {
            SyncCollection::Qas => self.sync_qa_by_id(id).await,
            SyncCollection::Sections => self.sync_section_and_qas_by_section_id(id).await,
        }
    }
}
