//! Expiring session-state cache
//!
//! Process-local map from session id to evidence state with a sliding
//! TTL: every checkout refreshes the entry. Each state sits behind its
//! own lock so evidence steps are serialized per session while distinct
//! sessions proceed in parallel. Expired entries are purged
//! opportunistically on access.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::state::SessionEvidenceState;

struct CacheEntry {
    state: Arc<Mutex<SessionEvidenceState>>,
    last_access: Instant,
}

pub struct SessionCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl SessionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the state for a session id, creating a fresh one when the
    /// id is unknown or its entry has expired. Refreshes the TTL.
    pub fn checkout(&self, session_id: &str) -> Arc<Mutex<SessionEvidenceState>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        entries.retain(|_, entry| now.duration_since(entry.last_access) <= self.ttl);

        let entry = entries
            .entry(session_id.to_string())
            .or_insert_with(|| CacheEntry {
                state: Arc::new(Mutex::new(SessionEvidenceState::new(session_id))),
                last_access: now,
            });
        entry.last_access = now;
        entry.state.clone()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.last_access) <= self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
