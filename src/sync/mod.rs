//! Ledger-to-mirror synchronization.
//!
//! This module contains the engine that keeps the mirror store consistent
//! with the ledger. It is composed of several submodules, each responsible
//! for one part of the process:
//!
//! - `factory`: the single long-lived subscription that discovers new series contracts.
//! - `series`: the manager owning one event subscription per discovered series.
//! - `bootstrap`: the startup pass that re-attaches listeners for every series already mirrored.
//! - `process`: the composition root that wires the three together and keeps them alive.
//!
//! All writes are idempotent upserts keyed by chain-assigned identifiers, so
//! duplicate and out-of-order delivery is safe, and one failing event never
//! terminates its subscription.

pub mod bootstrap;
pub mod factory;
pub mod process;
pub mod series;

pub use process::IndexerProcess;

use crate::ledger::LedgerError;
use crate::store::StoreError;

/// Error types for subscription management and event application
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
