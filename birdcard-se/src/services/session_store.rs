//! Playback session bindings
//!
//! A session pins one item for the length of a multi-track playback, even
//! if the shared target moves on meanwhile. Sessions expire a fixed TTL
//! after creation. Expiry is checked lazily on every read and eagerly by the
//! background sweeper.

use birdcard_common::{Clock, DayKey, Item, Location, LocationBucket};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// Prefix of generated session ids
pub const SESSION_ID_PREFIX: &str = "sess:";

/// New opaque session id
pub fn new_session_id() -> String {
    format!("{SESSION_ID_PREFIX}{}", Uuid::new_v4())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub session_id: String,
    pub item: Item,
    pub target_id: String,
    pub day_key: DayKey,
    pub bucket: LocationBucket,
    pub bound_location: Option<Location>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// What a session is bound to
#[derive(Debug, Clone)]
pub struct SessionBinding {
    pub item: Item,
    pub target_id: String,
    pub day_key: DayKey,
    pub bucket: LocationBucket,
    pub bound_location: Option<Location>,
}

/// Result of a session lookup
#[derive(Debug, Clone, PartialEq)]
pub enum SessionLookup {
    Found(Session),
    Absent,
    /// Was present but past its TTL; already removed
    Expired(Session),
}

pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn resolve(&self, session_id: &str) -> SessionLookup {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        match sessions.get(session_id) {
            None => SessionLookup::Absent,
            Some(session) if session.is_expired(now) => {
                let expired = session.clone();
                sessions.remove(session_id);
                debug!(session_id, "Session expired on lookup");
                SessionLookup::Expired(expired)
            }
            Some(session) => SessionLookup::Found(session.clone()),
        }
    }

    /// Bind `session_id` unless a live binding already exists
    ///
    /// Returns the stored session and whether this call created it. When two
    /// callers race to bind the same id, the first one wins and the second
    /// gets the first one's binding.
    pub fn bind(&self, session_id: &str, binding: SessionBinding) -> (Session, bool) {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = sessions.get(session_id) {
            if !existing.is_expired(now) {
                return (existing.clone(), false);
            }
        }

        let session = Session {
            session_id: session_id.to_string(),
            item: binding.item,
            target_id: binding.target_id,
            day_key: binding.day_key,
            bucket: binding.bucket,
            bound_location: binding.bound_location,
            created_at: now,
            expires_at: now + self.ttl,
        };
        sessions.insert(session_id.to_string(), session.clone());
        (session, true)
    }

    /// Remove and return every expired session
    pub fn sweep_expired(&self) -> Vec<Session> {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let expired_ids: Vec<String> = sessions
            .values()
            .filter(|s| s.is_expired(now))
            .map(|s| s.session_id.clone())
            .collect();
        expired_ids
            .iter()
            .filter_map(|id| sessions.remove(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
