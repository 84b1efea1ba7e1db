// SPDX-License-Identifier: MIT

//! sv-manager: the scan manager composition root — lifecycle and scheduling
//! API, recovery loop wiring, and the `svd` binary's startup sequence.

pub mod error;
pub mod manager;
pub mod recovery;

pub use error::{ManagerError, ManagerResult};
pub use manager::{ActiveScanTarget, ScanManager, WebsocketTarget};
pub use recovery::RecoveryLoop;
