// SPDX-License-Identifier: MIT

//! The Control Registry — an in-memory mirror of per-scan pause/cancel state,
//! consulted by workers on every claim so a pause or cancellation takes
//! effect without a per-job database round trip (`spec.md` §4.B).

use crate::scan::ScanId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The control state a worker consults before and during job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    Running,
    Paused,
    Cancelled,
}

crate::simple_display! {
    ControlState {
        Running => "running",
        Paused => "paused",
        Cancelled => "cancelled",
    }
}

/// Per-scan control handle. Cheap to clone; the token and state live behind
/// an `Arc` so every clone observes cancellation at the same instant.
#[derive(Clone)]
pub struct ScanControl {
    state: Arc<RwLock<ControlState>>,
    token: CancellationToken,
}

impl ScanControl {
    fn new(state: ControlState) -> Self {
        let token = CancellationToken::new();
        if state == ControlState::Cancelled {
            token.cancel();
        }
        Self {
            state: Arc::new(RwLock::new(state)),
            token,
        }
    }

    pub fn state(&self) -> ControlState {
        *self.state.read()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == ControlState::Cancelled
    }

    pub fn is_paused(&self) -> bool {
        self.state() == ControlState::Paused
    }

    /// A token that resolves the instant this scan is cancelled, for use in
    /// `tokio::select!` against an in-flight job execution future.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    fn set(&self, state: ControlState) {
        *self.state.write() = state;
        if state == ControlState::Cancelled {
            self.token.cancel();
        }
    }
}

/// In-memory registry of [`ScanControl`] handles, keyed by scan. Mirrors the
/// `scans.status` column; refreshed on an interval by the scan manager
/// (`spec.md` §4.B) rather than read fresh from the database on every claim.
#[derive(Clone, Default)]
pub struct ControlRegistry {
    scans: Arc<RwLock<HashMap<ScanId, ScanControl>>>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch or lazily create a control handle, defaulting to `Running` so a
    /// scan not yet mirrored from the database behaves as runnable.
    pub fn get_or_insert(&self, scan_id: ScanId) -> ScanControl {
        if let Some(existing) = self.scans.read().get(&scan_id) {
            return existing.clone();
        }
        let mut scans = self.scans.write();
        scans
            .entry(scan_id)
            .or_insert_with(|| ScanControl::new(ControlState::Running))
            .clone()
    }

    pub fn get(&self, scan_id: ScanId) -> Option<ScanControl> {
        self.scans.read().get(&scan_id).cloned()
    }

    pub fn set_state(&self, scan_id: ScanId, state: ControlState) {
        self.get_or_insert(scan_id).set(state);
    }

    pub fn pause(&self, scan_id: ScanId) {
        self.set_state(scan_id, ControlState::Paused);
    }

    pub fn resume(&self, scan_id: ScanId) {
        self.set_state(scan_id, ControlState::Running);
    }

    pub fn cancel(&self, scan_id: ScanId) {
        self.set_state(scan_id, ControlState::Cancelled);
    }

    /// Drop a scan's control handle. Called by the manager a grace period
    /// after cancellation so workers finishing an in-flight job still observe
    /// `Cancelled` rather than the lazily-recreated `Running` default.
    pub fn unregister(&self, scan_id: ScanId) {
        self.scans.write().remove(&scan_id);
    }

    /// Reconcile the registry against a freshly-read set of
    /// `(scan_id, is_terminal)` pairs from storage, removing entries for
    /// scans that have gone terminal and disappeared from the active set.
    pub fn retain_active(&self, active: impl Fn(ScanId) -> bool) {
        self.scans.write().retain(|id, _| active(*id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_scan_defaults_to_running() {
        let registry = ControlRegistry::new();
        let scan_id = ScanId::new();
        let control = registry.get_or_insert(scan_id);
        assert_eq!(control.state(), ControlState::Running);
    }

    #[test]
    fn cancel_propagates_to_cloned_handles() {
        let registry = ControlRegistry::new();
        let scan_id = ScanId::new();
        let control = registry.get_or_insert(scan_id);
        let token = control.cancellation_token();
        registry.cancel(scan_id);
        assert!(control.is_cancelled());
        assert!(token.is_cancelled());
    }

    #[test]
    fn pause_then_resume() {
        let registry = ControlRegistry::new();
        let scan_id = ScanId::new();
        registry.pause(scan_id);
        assert!(registry.get(scan_id).unwrap().is_paused());
        registry.resume(scan_id);
        assert_eq!(registry.get(scan_id).unwrap().state(), ControlState::Running);
    }

    #[test]
    fn unregister_drops_handle() {
        let registry = ControlRegistry::new();
        let scan_id = ScanId::new();
        registry.get_or_insert(scan_id);
        registry.unregister(scan_id);
        assert!(registry.get(scan_id).is_none());
    }
}
