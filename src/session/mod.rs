//! Signing sessions
//!
//! A session is one document's trip from the browser to the signer and back.
//! The [`SessionRegistry`] owns lifecycle metadata only; document bytes live in
//! the [`crate::store::DocumentStore`] under the same id.
//!
//! ```text
//! pending ──upload──▶ uploaded ──signer ok──▶ completed ──download──▶ (grace) ──▶ deleted
//!    │                   │
//!    └──signer error─────┴──────────────────▶ error ──────────────────▶ (sweep) ──▶ deleted
//! ```

pub mod registry;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use registry::{NewSession, Session, SessionRegistry, SessionView, Transition};

use crate::types::{RelayError, Result};

/// Maximum length of a caller-supplied session id
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Uploaded,
    Signed,
    Completed,
    Error,
    /// Reported for unknown ids, never stored
    NotFound,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploaded => "uploaded",
            Self::Signed => "signed",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::NotFound => "not_found",
        }
    }

    /// Whether a signed document can be handed out
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Signed | Self::Completed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which pool a session belongs to. Pre-staged sessions carry large binaries
/// parked ahead of a signing run and expire on their own, shorter schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    #[default]
    Standard,
    Prestaged,
}

/// Where the unsigned document is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginalLocation {
    /// Registered without bytes, waiting for an upload
    Awaiting,
    /// Held by the document store under the session id
    Stored { size: usize },
}

impl OriginalLocation {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }
}

/// Generate a fresh session id
pub fn generate_session_id() -> String {
    format!("sess_{}", uuid::Uuid::new_v4().simple())
}

/// Check a caller-supplied session id.
///
/// Ids may name files when documents are file-backed, so only
/// `[A-Za-z0-9_.-]` is accepted and a leading dot is rejected.
pub fn validate_session_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(RelayError::BadRequest("Session id is empty".to_string()));
    }
    if id.len() > MAX_SESSION_ID_LEN {
        return Err(RelayError::BadRequest(format!(
            "Session id longer than {} characters",
            MAX_SESSION_ID_LEN
        )));
    }
    if id.starts_with('.') {
        return Err(RelayError::BadRequest("Session id must not start with '.'".to_string()));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(RelayError::BadRequest(format!("Invalid session id: {}", id)));
    }
    Ok(())
}
