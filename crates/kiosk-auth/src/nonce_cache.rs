//! Process-wide cache of the last accepted Digest challenge.
//!
//! One [`NonceCache`] exists per proxy process and is shared by every
//! request through an `Arc`. Each operation takes the inner lock once, so
//! readers never observe a half-written entry. The lock is never held
//! across an upstream call.
//!
//! Two requests can check out counters concurrently and reach the upstream
//! in the opposite order. That is accepted: the upstream answers the loser
//! with a fresh 401 and its orchestrator falls back to a full handshake.

use parking_lot::Mutex;

use crate::challenge::{Algorithm, Challenge};
use crate::digest::{INITIAL_NC, format_nc};

/// Cached handshake state for the current upstream nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceCacheEntry {
    pub nonce: String,
    pub realm: String,
    pub qop: String,
    pub algorithm: Algorithm,
    pub opaque: Option<String>,
    /// Last nonce count used with `nonce`.
    pub nc: u32,
}

impl NonceCacheEntry {
    /// Entry for a freshly accepted challenge, counter at 1.
    pub fn from_challenge(challenge: &Challenge) -> Self {
        Self {
            nonce: challenge.nonce.clone(),
            realm: challenge.realm.clone(),
            qop: challenge.qop.clone(),
            algorithm: challenge.algorithm,
            opaque: challenge.opaque.clone(),
            nc: INITIAL_NC,
        }
    }

    /// Counter in wire format.
    pub fn nc_hex(&self) -> String {
        format_nc(self.nc)
    }

    fn is_complete(&self) -> bool {
        !self.nonce.is_empty() && !self.realm.is_empty() && !self.qop.is_empty() && self.nc > 0
    }
}

/// Shared nonce cache.
#[derive(Debug, Default)]
pub struct NonceCache {
    entry: Mutex<Option<NonceCacheEntry>>,
}

impl NonceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current entry.
    pub fn read(&self) -> Option<NonceCacheEntry> {
        self.entry.lock().clone()
    }

    /// Replace the cached entry.
    ///
    /// An incomplete entry (empty nonce, realm or qop, or a zero counter)
    /// clears the cache instead, so the cache is never half-populated.
    pub fn store(&self, entry: NonceCacheEntry) {
        let mut slot = self.entry.lock();
        if entry.is_complete() {
            *slot = Some(entry);
        } else {
            tracing::warn!("Refusing to cache incomplete digest state, clearing");
            *slot = None;
        }
    }

    /// Advance the counter and return it in wire format.
    ///
    /// Returns `None` when nothing is cached.
    pub fn bump_counter(&self) -> Option<String> {
        self.checkout().map(|entry| entry.nc_hex())
    }

    /// Advance the counter and return a snapshot carrying the new value.
    ///
    /// Read and increment happen under one lock acquisition, so no two
    /// callers ever receive the same `nc` for the same nonce.
    pub fn checkout(&self) -> Option<NonceCacheEntry> {
        let mut slot = self.entry.lock();
        let entry = slot.as_mut()?;
        match entry.nc.checked_add(1) {
            Some(next) => {
                entry.nc = next;
                Some(entry.clone())
            }
            None => {
                // Counter space for this nonce is exhausted; force a new handshake.
                *slot = None;
                None
            }
        }
    }

    /// Drop the cached entry.
    pub fn clear(&self) {
        *self.entry.lock() = None;
    }

    /// Drop the cached entry only if it still holds `nonce`.
    ///
    /// Returns whether anything was cleared. A request that failed with an
    /// old nonce must not wipe a handshake another request just stored.
    pub fn invalidate(&self, nonce: &str) -> bool {
        let mut slot = self.entry.lock();
        if slot.as_ref().is_some_and(|e| e.nonce == nonce) {
            *slot = None;
            true
        } else {
            false
        }
    }

    /// Whether a handshake is currently cached.
    pub fn is_populated(&self) -> bool {
        self.entry.lock().is_some()
    }
}
