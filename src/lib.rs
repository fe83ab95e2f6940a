use thiserror::Error;

pub type Result<T> = std::result::Result<T, QaError>;

#[derive(Error, Debug)]
pub enum QaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Vector store error: {0}")]
    VectorStore(#[from] database::VectorStoreError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod agent;
pub mod arxiv;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod extractor;
pub mod indexer;
