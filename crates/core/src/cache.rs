//! Process-lifetime credential cache
//!
//! Maps a [`Scope`] to the credential issued for it. Lookups never perform
//! network I/O; filling a miss is the caller's job (see
//! [`CredentialProvider`](crate::CredentialProvider)). Nothing here is ever
//! persisted to disk.

use std::collections::HashMap;
use std::sync::RwLock;

use jiff::Timestamp;

use crate::credential::Credential;
use crate::scope::Scope;

#[derive(Debug, Clone)]
struct Entry {
    credential: Credential,
    fetched_at: Timestamp,
}

/// Thread-safe map of scope to credential with expiry-aware lookups
#[derive(Debug, Default)]
pub struct CredentialCache {
    entries: RwLock<HashMap<Scope, Entry>>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a credential that is still usable now.
    ///
    /// Expired entries are evicted and reported as absent.
    pub fn get(&self, scope: &Scope) -> Option<Credential> {
        self.get_at(scope, Timestamp::now())
    }

    /// Like [`get`](Self::get) with an explicit clock
    pub fn get_at(&self, scope: &Scope, now: Timestamp) -> Option<Credential> {
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(scope) {
                None => return None,
                Some(entry) if !entry.credential.is_expired_at(now) => {
                    return Some(entry.credential.clone());
                }
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        // Another writer may have refreshed the entry in between.
        match entries.get(scope) {
            Some(entry) if !entry.credential.is_expired_at(now) => Some(entry.credential.clone()),
            Some(entry) => {
                tracing::debug!(
                    %scope,
                    fetched_at = %entry.fetched_at,
                    expires_at = %entry.credential.expires_at,
                    "Evicting expired credential"
                );
                entries.remove(scope);
                None
            }
            None => None,
        }
    }

    /// Store a credential, replacing any previous one for the scope
    pub fn put(&self, scope: Scope, credential: Credential) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            scope,
            Entry {
                credential,
                fetched_at: Timestamp::now(),
            },
        );
    }

    /// When the cached credential for a scope was fetched
    pub fn fetched_at(&self, scope: &Scope) -> Option<Timestamp> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(scope).map(|e| e.fetched_at)
    }

    pub fn invalidate(&self, scope: &Scope) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(scope);
    }

    pub fn invalidate_all(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
