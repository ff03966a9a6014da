
use std::sync::Arc;

use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::error;

use crate::config::Config;
use crate::generation::GenerationProvider;
use crate::ingestion::SyncEngine;
use crate::localization::{Language, short_query_answer};
use crate::rag::RagEngine;
use crate::retrieval::{RetrievalScope, Retriever};
use crate::store::{HandbookStore, SyncCollection, SyncSelector};
use crate::vector::client::VectorStoreClient;

/// Queries below this many characters are not worth a vector round trip.
pub const MIN_QUERY_LENGTH: usize = 2;
const RAG_DEFAULT_TOP_K: usize = 6;
const RAG_MAX_TOP_K: usize = 12;
const SEARCH_DEFAULT_LIMIT: usize = 8;
const SEARCH_MAX_LIMIT: usize = 20;

#[derive(Clone)]
pub struct AppState {
    pub vector: Arc<VectorStoreClient>,
    pub store: Arc<dyn HandbookStore>,
    pub sync: SyncEngine,
    pub retriever: Retriever,
    pub rag: RagEngine,
    pub namespace: String,
    admin_token: Option<String>,
    cron_secret: Option<String>,
}

impl AppState {
    /// Wires the engines around one shared vector client and store.
    #[inline]
    pub fn new(
        config: &Config,
        store: Arc<dyn HandbookStore>,
        provider: Arc<dyn GenerationProvider>,
    ) -> Self {
        let vector = Arc::new(VectorStoreClient::new(&config.vector));
        let namespace = config.vector.namespace.clone();
        let sync = SyncEngine::new(Arc::clone(&store), Arc::clone(&vector), namespace.clone());
        let retriever = Retriever::new(Arc::clone(&vector), namespace.clone());
        let rag = RagEngine::new(retriever.clone(), provider);
        Self {
            vector,
            store,
            sync,
            retriever,
            rag,
            namespace,
            admin_token: config.server.admin_token.clone(),
            cron_secret: config.server.cron_secret.clone(),
        }
    }
}

#[inline]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/handbook/vector/reindex", post(reindex_handler))
        .route("/handbook/vector/sync", post(sync_handler))
        .route("/handbook/rag", post(rag_handler))
        .route("/handbook/search", get(search_handler))
        .with_state(state)
}

fn is_admin(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(expected) = state.admin_token.as_deref().filter(|token| !token.is_empty()) else {
        return false;
    };
    headers
        .get("x-admin-token")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|token| token == expected)
}

fn is_cron(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(secret) = state.cron_secret.as_deref().filter(|secret| !secret.is_empty()) else {
        return false;
    };
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Bearer {secret}"))
}

fn resolve_language(explicit: Option<&str>, headers: &HeaderMap) -> Language {
    explicit
        .and_then(Language::parse)
        .or_else(|| {
            headers
                .get("accept-language")
                .and_then(|value| value.to_str().ok())
                .and_then(Language::from_accept_language)
        })
        .unwrap_or_default()
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[derive(Debug, Default, Deserialize)]
struct ReindexParams {
    #[serde(default)]
    reset: Option<String>,
}

async fn reindex_handler(
    State(state): State<AppState>,
    Query(params): Query<ReindexParams>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !state.vector.is_configured() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Vector store is not configured." })),
        );
    }
    if !(is_cron(&state, &headers) || is_admin(&state, &headers)) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Action forbidden." })),
        );
    }

    let reset = params.reset.as_deref().is_some_and(is_truthy);
    match state.sync.reindex_from_database(reset).await {
        Ok(stats) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "namespace": state.namespace,
                "stats": stats,
            })),
        ),
        Err(err) => {
            error!("reindex failed: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": "Failed to reindex handbook vectors.",
                })),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncBody {
    collection: SyncCollection,
    #[serde(default)]
    ids: Vec<Value>,
    #[serde(default)]
    select_all_matching_filters: bool,
    #[serde(default, rename = "where")]
    selector: SyncSelector,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncItemResult {
    id: i64,
    success: bool,
    vectors_upserted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Ids arrive as arbitrary JSON; only positive integers survive, deduped
/// in order.
fn sanitize_ids(raw: &[Value]) -> Vec<i64> {
    let mut ids = Vec::new();
    for value in raw {
        let Some(id) = value.as_i64() else { continue };
        if id > 0 && !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

async fn sync_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SyncBody>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    if !state.vector.is_configured() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Vector store is not configured." })),
        );
    }
    if !is_admin(&state, &headers) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Action forbidden." })),
        );
    }
    let Ok(Json(body)) = body else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid JSON body." })),
        );
    };

    let mut ids = sanitize_ids(&body.ids);
    if body.select_all_matching_filters {
        match state.sync.collect_ids(body.collection, body.selector).await {
            Ok(selected) => {
                for id in selected {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
            }
            Err(err) => {
                error!("bulk id selection failed: {err:#}");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Failed to select matching documents." })),
                );
            }
        }
    }
    if ids.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "ids must contain at least one positive integer." })),
        );
    }

    let mut results = Vec::with_capacity(ids.len());
    let mut success_count = 0;
    let mut failure_count = 0;
    let mut vectors_upserted = 0;
    for &id in &ids {
        match state.sync.sync_collection_id(body.collection, id).await {
            Ok(upserted) => {
                success_count += 1;
                vectors_upserted += upserted;
                results.push(SyncItemResult {
                    id,
                    success: true,
                    vectors_upserted: upserted,
                    error: None,
                });
            }
            Err(err) => {
                error!("sync of {} {id} failed: {err:#}", body.collection.as_str());
                failure_count += 1;
                results.push(SyncItemResult {
                    id,
                    success: false,
                    vectors_upserted: 0,
                    error: Some(err.to_string()),
                });
            }
        }
    }

    (
        StatusCode::OK,
        Json(json!({
            "success": failure_count == 0,
            "collection": body.collection,
            "ids": ids,
            "successCount": success_count,
            "failureCount": failure_count,
            "vectorsUpserted": vectors_upserted,
            "results": results,
        })),
    )
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RagBody {
    #[serde(default)]
    query: String,
    #[serde(default)]
    lang: Option<String>,
    #[serde(default)]
    book_slug: Option<String>,
    #[serde(default)]
    section_id: Option<i64>,
    #[serde(default)]
    top_k: Option<i64>,
}

async fn rag_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<RagBody>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let Ok(Json(body)) = body else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid JSON body." })),
        );
    };
    let language = resolve_language(body.lang.as_deref(), &headers);

    let query = body.query.trim();
    if query.chars().count() < MIN_QUERY_LENGTH {
        return (
            StatusCode::OK,
            Json(json!({
                "answer": short_query_answer(language),
                "language": language,
                "citations": [],
                "results": [],
                "suggestions": [],
            })),
        );
    }

    let top_k = body
        .top_k
        .and_then(|value| usize::try_from(value).ok())
        .unwrap_or(RAG_DEFAULT_TOP_K)
        .clamp(1, RAG_MAX_TOP_K);
    let scope = RetrievalScope {
        book_slug: body.book_slug,
        section_id: body.section_id,
    };

    let response = state
        .rag
        .generate_rag_response(query, language, Some(top_k), &scope);
    match serde_json::to_value(&response) {
        Ok(value) => (StatusCode::OK, Json(value)),
        Err(err) => {
            error!("failed to serialize RAG response: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal error." })),
            )
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    lang: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    let query = params.q.unwrap_or_default();
    let query = query.trim();
    let language = resolve_language(params.lang.as_deref(), &headers);
    let limit = params
        .limit
        .and_then(|value| usize::try_from(value).ok())
        .unwrap_or(SEARCH_DEFAULT_LIMIT)
        .clamp(1, SEARCH_MAX_LIMIT);

    if query.chars().count() < MIN_QUERY_LENGTH {
        return (
            StatusCode::OK,
            Json(json!({ "results": [], "total": 0 })),
        );
    }

    let mut results = match state.retriever.search_with_hybrid(query, language, limit) {
        Ok(results) => results,
        Err(err) => {
            error!("hybrid search failed for {query:?}: {err:#}");
            Vec::new()
        }
    };
    // Hybrid coming back empty (error, cold index, unconfigured store)
    // falls through to the relational search.
    if results.is_empty() {
        results = match state
            .store
            .search_qas_lexical(query, language, limit as u32)
            .await
        {
            Ok(results) => results,
            Err(err) => {
                error!("lexical search failed for {query:?}: {err:#}");
                Vec::new()
            }
        };
    }

    (
        StatusCode::OK,
        Json(json!({ "total": results.len(), "results": results })),
    )
}
