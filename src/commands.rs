use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::api::{AppState, router};
use crate::config::{Config, get_config_dir};
use crate::generation::OllamaGenerator;
use crate::localization::Language;
use crate::retrieval::RetrievalScope;
use crate::store::SyncCollection;
use crate::store::sqlite::SqliteHandbookStore;

async fn load_state() -> Result<AppState> {
    let config_dir = get_config_dir()?;
    let config = Config::load_with_env(&config_dir).context("Failed to load configuration")?;
    let store = SqliteHandbookStore::new(config.database_path())
        .await
        .context("Failed to open handbook database")?;
    let provider = Arc::new(OllamaGenerator::new(&config.generation)?);
    Ok(AppState::new(&config, Arc::new(store), provider))
}

fn mask(secret: Option<&str>) -> &'static str {
    match secret {
        Some(value) if !value.is_empty() => "set",
        _ => "not set",
    }
}

/// Write a default config file unless one already exists.
#[inline]
pub fn init_config() -> Result<()> {
    let config_dir = get_config_dir()?;
    let config = Config::load(&config_dir).context("Failed to load configuration")?;
    let config_path = config.config_file_path();
    if config_path.exists() {
        println!("Config file already exists: {}", config_path.display());
        return Ok(());
    }
    config.save()?;
    println!("Wrote default config to {}", config_path.display());
    Ok(())
}

/// Print the effective configuration with secrets masked.
#[inline]
pub fn show_config() -> Result<()> {
    let config_dir = get_config_dir()?;
    let config = Config::load_with_env(&config_dir).context("Failed to load configuration")?;

    println!("Configuration ({})", config.config_file_path().display());
    println!();
    println!("[vector]");
    match &config.vector.rest_url {
        Some(url) => println!("  rest_url = {url}"),
        None => println!("  rest_url = not set"),
    }
    println!("  rest_token = {}", mask(config.vector.rest_token.as_deref()));
    println!("  namespace = {}", config.vector.namespace);
    println!();
    println!("[generation]");
    println!("  protocol = {}", config.generation.protocol);
    println!("  host = {}", config.generation.host);
    println!("  port = {}", config.generation.port);
    println!("  model = {}", config.generation.model);
    println!();
    println!("[server]");
    println!("  bind = {}", config.server.bind);
    println!("  admin_token = {}", mask(config.server.admin_token.as_deref()));
    println!("  cron_secret = {}", mask(config.server.cron_secret.as_deref()));
    println!();
    println!("Database: {}", config.database_path().display());

    Ok(())
}

/// Rebuild the whole vector namespace from the database.
#[inline]
pub async fn run_reindex(reset: bool) -> Result<()> {
    let state = load_state().await?;
    info!("Starting full reindex (reset: {reset})");

    let stats = state
        .sync
        .reindex_from_database(reset)
        .await
        .context("Reindex failed")?;

    println!("Reindex of namespace '{}' complete.", state.namespace);
    println!("  Books scanned: {}", stats.books_scanned);
    println!("  Sections scanned: {}", stats.sections_scanned);
    println!("  Q&As scanned: {}", stats.qas_scanned);
    println!("  Sections upserted: {}", stats.sections_upserted);
    println!("  Q&As upserted: {}", stats.qas_upserted);
    println!("  Vectors upserted: {}", stats.vectors_upserted);
    if stats.skipped > 0 {
        println!("  Skipped (unresolvable parents): {}", stats.skipped);
    }
    if stats.reset_performed {
        println!("  Namespace was reset before indexing.");
    }

    Ok(())
}

/// Sync individual documents by id, continuing past per-id failures.
#[inline]
pub async fn run_sync(collection: SyncCollection, ids: Vec<i64>) -> Result<()> {
    let state = load_state().await?;
    if !state.vector.is_configured() {
        anyhow::bail!("vector store is not configured");
    }

    let mut failures = 0;
    for id in ids {
        match state.sync.sync_collection_id(collection, id).await {
            Ok(upserted) => {
                println!("{} {id}: {upserted} vectors upserted", collection.as_str());
            }
            Err(err) => {
                failures += 1;
                println!("{} {id}: failed ({err:#})", collection.as_str());
            }
        }
    }
    if failures > 0 {
        anyhow::bail!("{failures} document(s) failed to sync");
    }

    Ok(())
}

/// Hybrid search from the terminal, with the same lexical fallback the HTTP
/// surface uses.
#[inline]
pub async fn run_search(query: String, lang: Option<String>, limit: usize) -> Result<()> {
    let state = load_state().await?;
    let language = lang
        .as_deref()
        .and_then(Language::parse)
        .unwrap_or_default();

    let mut results = state
        .retriever
        .search_with_hybrid(&query, language, limit)
        .unwrap_or_else(|err| {
            warn!("hybrid search failed: {err:#}");
            Vec::new()
        });
    if results.is_empty() {
        results = state
            .store
            .search_qas_lexical(&query, language, limit as u32)
            .await
            .context("Lexical search failed")?;
    }

    if results.is_empty() {
        println!("No results for {query:?} ({language}).");
        return Ok(());
    }
    println!("{} result(s) for {query:?} ({language}):", results.len());
    for result in &results {
        println!();
        println!("  [{}] {}", result.qa_id, result.question);
        println!("      {} / {}", result.book_title, result.section_title);
    }

    Ok(())
}

/// One-shot question answering against the indexed handbook.
#[inline]
pub async fn run_ask(query: String, lang: Option<String>) -> Result<()> {
    let state = load_state().await?;
    let language = lang
        .as_deref()
        .and_then(Language::parse)
        .unwrap_or_default();

    let response =
        state
            .rag
            .generate_rag_response(&query, language, None, &RetrievalScope::default());

    println!("{}", response.answer);
    if !response.citations.is_empty() {
        println!();
        println!("Sources:");
        for citation in &response.citations {
            println!(
                "  - {} / {}",
                citation.book_title, citation.section_title
            );
        }
    }
    if !response.suggestions.is_empty() {
        println!();
        println!("You could also ask:");
        for suggestion in &response.suggestions {
            println!("  - {suggestion}");
        }
    }

    Ok(())
}

/// Run the HTTP API until interrupted.
#[inline]
pub async fn serve(bind: Option<String>) -> Result<()> {
    let config_dir = get_config_dir()?;
    let config = Config::load_with_env(&config_dir).context("Failed to load configuration")?;
    let store = SqliteHandbookStore::new(config.database_path())
        .await
        .context("Failed to open handbook database")?;
    let provider = Arc::new(OllamaGenerator::new(&config.generation)?);
    let state = AppState::new(&config, Arc::new(store), provider);

    if !state.vector.is_configured() {
        warn!("vector store is not configured; search and RAG will degrade to lexical results");
    }

    let addr = bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {addr}");
    println!("Handbook API listening on {addr}");
    println!("Press Ctrl+C to stop the server");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received interrupt signal, shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}
