use thiserror::Error;

pub type Result<T> = std::result::Result<T, HandbookError>;

#[derive(Error, Debug)]
pub enum HandbookError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Vector store error: {0}")]
    VectorStore(#[from] vector::client::VectorStoreError),

    #[error("Generation error: {0}")]
    Generation(#[from] generation::GenerationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod api;
pub mod commands;
pub mod config;
pub mod generation;
pub mod ingestion;
pub mod localization;
pub mod mapping;
pub mod rag;
pub mod retrieval;
pub mod richtext;
pub mod store;
pub mod vector;
