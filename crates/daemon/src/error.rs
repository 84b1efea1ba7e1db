// SPDX-License-Identifier: MIT

//! Manager-level error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Storage(#[from] sv_storage::StorageError),
    #[error(transparent)]
    Execute(#[from] sv_core::ExecuteError),
    #[error("scan {0} not found")]
    ScanNotFound(String),
    #[error("items span workspaces {0} and {1}")]
    WorkspaceMismatch(String, String),
    #[error("cannot {action} scan {scan_id} in status {status}")]
    InvalidTransition {
        action: &'static str,
        scan_id: String,
        status: &'static str,
    },
}

pub type ManagerResult<T> = Result<T, ManagerError>;
