//! Session Registry
//!
//! Tracks session lifecycle metadata keyed by session id. Each mutation runs
//! under the map's per-entry lock, so a reader sees either the state before a
//! transition or the state after it, never a mix.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{
    generate_session_id, validate_session_id, OriginalLocation, SessionKind, SessionStatus,
};
use crate::clock::{millis, Clock};
use crate::types::{RelayError, Result};

/// A registered signing session
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique session id
    pub id: String,

    /// Original document name, used to derive the signed file name
    pub file_name: String,

    /// Retention pool
    pub kind: SessionKind,

    /// Current lifecycle status (never `NotFound`)
    pub status: SessionStatus,

    /// Creation time in ms, set once
    pub created_at_ms: u64,

    /// Unsigned document location
    pub original: OriginalLocation,

    /// Whether the document store holds a signed result for this session
    pub has_signed_data: bool,

    /// Failure reported by the signer
    pub error: Option<String>,

    /// First successful download, starts the grace window
    pub downloaded_at_ms: Option<u64>,

    /// Held across a document write and the transition that records it
    pub write_lock: Arc<Mutex<()>>,
}

/// Parameters for registering a session
#[derive(Debug, Clone)]
pub struct NewSession {
    /// Caller-supplied id; a fresh one is generated when absent
    pub id: Option<String>,
    pub file_name: String,
    pub kind: SessionKind,
    pub original: OriginalLocation,
}

/// State change applied to an existing session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Unsigned bytes were (re)stored
    Uploaded { size: usize },
    /// The signer delivered a signed document
    Completed,
    /// The signer reported a failure
    Failed(String),
}

/// Read-only snapshot of a session, safe to expose to the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub status: SessionStatus,
    pub has_signed_data: bool,
    pub error: Option<String>,
    #[serde(skip)]
    pub file_name: String,
    #[serde(skip)]
    pub kind: SessionKind,
    #[serde(skip)]
    pub has_original: bool,
}

impl SessionView {
    /// Synthetic view for unknown ids
    pub fn not_found() -> Self {
        Self {
            status: SessionStatus::NotFound,
            has_signed_data: false,
            error: None,
            file_name: String::new(),
            kind: SessionKind::Standard,
            has_original: false,
        }
    }
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            status: session.status,
            has_signed_data: session.has_signed_data,
            error: session.error.clone(),
            file_name: session.file_name.clone(),
            kind: session.kind,
            has_original: session.original.is_stored(),
        }
    }
}

/// Registry statistics
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total_sessions: usize,
    pub pending_sessions: usize,
    pub completed_sessions: usize,
    pub failed_sessions: usize,
}

/// Concurrent session registry
pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            clock,
        }
    }

    /// Allocate a fresh pending session with no document yet
    pub fn create(&self, file_name: &str) -> String {
        let id = generate_session_id();
        self.insert(
            id.clone(),
            file_name.to_string(),
            SessionKind::Standard,
            OriginalLocation::Awaiting,
        );
        id
    }

    /// Register a session, replacing any existing session with the same id
    pub fn register(&self, new: NewSession) -> Result<String> {
        let id = match new.id {
            Some(id) => {
                validate_session_id(&id)?;
                id
            }
            None => generate_session_id(),
        };
        self.insert(id.clone(), new.file_name, new.kind, new.original);
        Ok(id)
    }

    fn insert(&self, id: String, file_name: String, kind: SessionKind, original: OriginalLocation) {
        let session = Session {
            id: id.clone(),
            file_name,
            kind,
            status: SessionStatus::Pending,
            created_at_ms: self.clock.now_ms(),
            original,
            has_signed_data: false,
            error: None,
            downloaded_at_ms: None,
            write_lock: Arc::new(Mutex::new(())),
        };
        if self.sessions.insert(id.clone(), session).is_some() {
            info!(session_id = %id, "Replaced existing session");
        } else {
            debug!(session_id = %id, "Registered session");
        }
    }

    /// Apply a state change. Out-of-order changes are not rejected: the last
    /// write for a phase wins.
    pub fn transition(&self, id: &str, transition: Transition) -> Result<SessionView> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| RelayError::SessionNotFound(id.to_string()))?;

        match transition {
            Transition::Uploaded { size } => {
                session.original = OriginalLocation::Stored { size };
                if matches!(session.status, SessionStatus::Pending | SessionStatus::Uploaded) {
                    session.status = SessionStatus::Uploaded;
                }
            }
            Transition::Completed => {
                session.status = SessionStatus::Completed;
                session.has_signed_data = true;
                session.error = None;
            }
            Transition::Failed(message) => {
                session.status = SessionStatus::Error;
                session.has_signed_data = false;
                session.error = Some(message);
                session.downloaded_at_ms = None;
            }
        }

        debug!(session_id = %id, status = %session.status, "Session transitioned");
        Ok(SessionView::from(&*session))
    }

    /// Snapshot of a session
    pub fn get(&self, id: &str) -> Option<SessionView> {
        self.sessions.get(id).map(|s| SessionView::from(s.value()))
    }

    /// Snapshot of a session, or the synthetic `not_found` view
    pub fn view(&self, id: &str) -> SessionView {
        self.get(id).unwrap_or_else(SessionView::not_found)
    }

    /// Per-session lock serializing document writes with their transitions.
    /// Replacing or removing the session drops it.
    pub fn write_lock(&self, id: &str) -> Result<Arc<Mutex<()>>> {
        self.sessions
            .get(id)
            .map(|s| Arc::clone(&s.write_lock))
            .ok_or_else(|| RelayError::SessionNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Record the first successful download. Returns the download time.
    pub fn mark_downloaded(&self, id: &str) -> Result<u64> {
        let now = self.clock.now_ms();
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| RelayError::SessionNotFound(id.to_string()))?;
        Ok(*session.downloaded_at_ms.get_or_insert(now))
    }

    /// Ids of sessions older than `ttl`, regardless of status. Does not mutate.
    pub fn expire(&self, now_ms: u64, ttl: Duration) -> Vec<String> {
        self.collect_ids(|s| age(now_ms, s.created_at_ms) > millis(ttl))
    }

    /// Ids of sessions of one kind older than `ttl`
    pub fn expire_kind(&self, now_ms: u64, ttl: Duration, kind: SessionKind) -> Vec<String> {
        self.collect_ids(|s| s.kind == kind && age(now_ms, s.created_at_ms) > millis(ttl))
    }

    /// Ids of failed sessions older than `ttl`
    pub fn expire_failed(&self, now_ms: u64, ttl: Duration) -> Vec<String> {
        self.collect_ids(|s| {
            s.status == SessionStatus::Error && age(now_ms, s.created_at_ms) > millis(ttl)
        })
    }

    /// Ids of downloaded sessions whose grace window has elapsed
    pub fn consumed(&self, now_ms: u64, grace: Duration) -> Vec<String> {
        self.collect_ids(|s| {
            s.downloaded_at_ms
                .is_some_and(|at| age(now_ms, at) >= millis(grace))
        })
    }

    fn collect_ids(&self, pred: impl Fn(&Session) -> bool) -> Vec<String> {
        self.sessions
            .iter()
            .filter(|entry| pred(entry.value()))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Remove a session. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            debug!(session_id = %id, "Removed session");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total_sessions: 0,
            pending_sessions: 0,
            completed_sessions: 0,
            failed_sessions: 0,
        };
        for entry in self.sessions.iter() {
            stats.total_sessions += 1;
            match entry.status {
                SessionStatus::Pending | SessionStatus::Uploaded => stats.pending_sessions += 1,
                SessionStatus::Signed | SessionStatus::Completed => stats.completed_sessions += 1,
                SessionStatus::Error => stats.failed_sessions += 1,
                SessionStatus::NotFound => {}
            }
        }
        stats
    }
}

fn age(now_ms: u64, since_ms: u64) -> u64 {
    now_ms.saturating_sub(since_ms)
}
