// SPDX-License-Identifier: MIT

//! Tenancy root. Every scan, job, and history item belongs to exactly one
//! workspace.

crate::define_id! {
    /// Unique identifier for a workspace (tenancy root).
    pub struct WorkspaceId("wsp-");
}
