// SPDX-License-Identifier: MIT

//! Storage-layer error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("scan {0} not found")]
    ScanNotFound(String),
    #[error("job {0} not found")]
    JobNotFound(String),
    #[error("workspace mismatch: items span workspaces {0} and {1}")]
    WorkspaceMismatch(String, String),
}

pub type StorageResult<T> = Result<T, StorageError>;
