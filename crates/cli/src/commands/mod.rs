// SPDX-License-Identifier: MIT

//! CLI command implementations.

pub mod get;
pub mod scan;

/// Resolve the store backend: `--database-url`, else `DATABASE_URL`, else empty (in-memory).
pub(crate) fn resolve_database_url(explicit: Option<String>) -> String {
    explicit.unwrap_or_else(|| std::env::var("DATABASE_URL").unwrap_or_default())
}
