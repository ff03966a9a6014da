//! Boundary adapters between content writes and vector sync.
//!
//! Content saves must never fail because the vector index was unreachable,
//! so these wrappers log sync errors and discard them. Callers that need
//! the error (the admin API, the CLI) use the `SyncEngine` methods
//! directly.

use tracing::error;

use super::SyncEngine;

#[inline]
pub async fn notify_qa_changed(engine: &SyncEngine, qa_id: i64) {
    if let Err(err) = engine.sync_qa_by_id(qa_id).await {
        error!("vector sync after qa {qa_id} change failed: {err:#}");
    }
}

#[inline]
pub async fn notify_qa_deleted(engine: &SyncEngine, qa_id: i64) {
    if let Err(err) = engine.delete_qa_vectors_by_id(qa_id).await {
        error!("vector cleanup after qa {qa_id} delete failed: {err:#}");
    }
}

#[inline]
pub async fn notify_section_changed(engine: &SyncEngine, section_id: i64) {
    if let Err(err) = engine.sync_section_and_qas_by_section_id(section_id).await {
        error!("vector sync after section {section_id} change failed: {err:#}");
    }
}

#[inline]
pub async fn notify_section_deleted(engine: &SyncEngine, section_id: i64) {
    if let Err(err) = engine
        .delete_section_and_qa_vectors_by_section_id(section_id)
        .await
    {
        error!("vector cleanup after section {section_id} delete failed: {err:#}");
    }
}
