//! # Session Bookkeeping
//!
//! The per-session profile and the process-wide registry of live voice
//! sessions. The registry exists for observability and capacity control; the
//! connection actor in `websocket.rs` owns the actual lifecycle.
//!
//! ## Thread Safety:
//! The registry is the only state shared across sessions. It wraps a
//! `HashMap` in an `RwLock` so concurrent cleanup paths (disconnect racing a
//! pipeline error) can register/unregister without corruption, and removal
//! is idempotent by construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

fn default_proficiency() -> String {
    "beginner".to_string()
}

/// Immutable tutoring context for one voice session.
///
/// Supplied once as query parameters when the client opens the streaming
/// connection, then owned by the session actor for its whole lifetime. The
/// pipeline reads it every turn to build the system instruction; nothing
/// mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// Language the child is learning (e.g., "Spanish", "French")
    pub target_language: String,

    /// Current conversation topic (e.g., "Animals", "Colors")
    pub topic: String,

    /// Age of the child; must be at least 1
    pub user_age: u32,

    /// Current learning level, defaults to "beginner"
    #[serde(default = "default_proficiency")]
    pub proficiency_level: String,
}

impl UserProfile {
    /// Check the profile for values the tutoring prompt cannot work with.
    ///
    /// ## Returns:
    /// - **Ok(())**: Profile is usable
    /// - **Err(message)**: Human-readable reason suitable for a 400 response
    pub fn validate(&self) -> Result<(), String> {
        if self.user_age == 0 {
            return Err("user_age must be a positive integer".to_string());
        }
        if self.target_language.trim().is_empty() {
            return Err("target_language must not be empty".to_string());
        }
        if self.topic.trim().is_empty() {
            return Err("topic must not be empty".to_string());
        }
        Ok(())
    }
}

/// Registry record for one live session.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    /// Profile the session was opened with
    pub profile: UserProfile,

    /// When the connection was accepted
    pub connected_at: DateTime<Utc>,
}

impl SessionEntry {
    pub fn new(profile: UserProfile) -> Self {
        Self {
            profile,
            connected_at: Utc::now(),
        }
    }
}

/// Process-wide table of active voice sessions.
///
/// A session appears here exactly while it is in its active lifetime: the
/// connection actor registers itself on accept and unregisters once during
/// cleanup. Unregistering an id that was already removed is a no-op, which
/// keeps racing cleanup paths (disconnect + error) harmless.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    max_concurrent_sessions: AtomicUsize,
}

impl SessionRegistry {
    pub fn new(max_concurrent_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_concurrent_sessions: AtomicUsize::new(max_concurrent_sessions),
        }
    }

    /// Change the capacity limit.
    ///
    /// Runtime config updates write the new cap through here. It applies to
    /// subsequent registrations only; live sessions are never evicted, so
    /// lowering the cap below the current count just blocks new connections
    /// until sessions drain.
    pub fn set_capacity(&self, max_concurrent_sessions: usize) {
        self.max_concurrent_sessions
            .store(max_concurrent_sessions, Ordering::Relaxed);
    }

    /// Current capacity limit.
    pub fn capacity(&self) -> usize {
        self.max_concurrent_sessions.load(Ordering::Relaxed)
    }

    /// Register a newly accepted session.
    ///
    /// ## Returns:
    /// - **Ok(())**: Session recorded
    /// - **Err(message)**: Capacity reached or duplicate id; the caller is
    ///   expected to refuse the connection
    pub fn register(&self, session_id: &str, entry: SessionEntry) -> Result<(), String> {
        let mut sessions = self.sessions.write().unwrap();

        let capacity = self.capacity();
        if sessions.len() >= capacity {
            return Err(format!(
                "Maximum concurrent sessions ({}) reached",
                capacity
            ));
        }

        if sessions.contains_key(session_id) {
            return Err(format!("Session ID '{}' already registered", session_id));
        }

        sessions.insert(session_id.to_string(), entry);
        Ok(())
    }

    /// Remove a session from the registry.
    ///
    /// Idempotent: returns `true` if the session was present, `false` if it
    /// had already been removed.
    pub fn unregister(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap();
        sessions.remove(session_id).is_some()
    }

    /// Number of currently active sessions.
    pub fn count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// Look up the registry record for a session.
    pub fn get(&self, session_id: &str) -> Option<SessionEntry> {
        self.sessions.read().unwrap().get(session_id).cloned()
    }

    /// Ids of all active sessions, for the health endpoint.
    pub fn active_session_ids(&self) -> Vec<String> {
        self.sessions.read().unwrap().keys().cloned().collect()
    }
}
