//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use keygate_core::RelyingParty;

use crate::storage::StorageBackend;

/// Application state containing shared resources.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Ceremony engine bound to the configured relying party
    pub relying_party: RelyingParty,
    /// Storage backing the engine, kept for health checks
    pub storage: StorageBackend,
}

impl AppState {
    pub fn new(relying_party: RelyingParty, storage: StorageBackend) -> Self {
        Self {
            relying_party,
            storage,
        }
    }
}
