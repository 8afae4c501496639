//! Signing relay service
//!
//! Every HTTP convention ends up in one of the operations here. The service
//! owns the ordering between the registry and the document store: bytes are
//! written before the registry records them, so a status of `completed` always
//! has a signed document behind it.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, warn};

use super::params::{Operation, SignerRequest};
use super::submission::{classify, encode_document, Classification, Submission};
use crate::session::{
    generate_session_id, validate_session_id, NewSession, OriginalLocation, SessionKind,
    SessionRegistry, SessionView, Transition,
};
use crate::store::{DocumentStore, OriginalDocument};
use crate::types::{RelayError, Result};

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Inserted before `.pdf` in the download file name
    pub signed_suffix: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            signed_suffix: "_firmado".to_string(),
        }
    }
}

/// Request to register a session
#[derive(Debug, Clone)]
pub struct CreateSession {
    /// Caller-chosen id; generated when absent
    pub id: Option<String>,
    pub file_name: String,
    /// Unsigned document; `None` defers the upload
    pub document: Option<Bytes>,
    pub kind: SessionKind,
}

/// Signed document ready for the browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDocument {
    /// Download name, derived from the original name
    pub file_name: String,
    pub bytes: Bytes,
}

/// Why a submission changed nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    Empty,
    Undecodable(String),
}

/// Result of applying a submission. Every outcome is acknowledged to the signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Completed { size: usize },
    SignerError(String),
    Ignored(IgnoreReason),
}

/// Reply to a multiplexed signer request
#[derive(Debug, Clone)]
pub enum SignerReply {
    Original(OriginalDocument),
    Acknowledged(SubmissionOutcome),
    SignedBase64(String),
    Status(SessionView),
    Download(SignedDocument),
}

/// The signing session relay
pub struct SigningRelay {
    registry: Arc<SessionRegistry>,
    store: Arc<dyn DocumentStore>,
    config: RelayConfig,
}

impl SigningRelay {
    pub fn new(registry: Arc<SessionRegistry>, store: Arc<dyn DocumentStore>, config: RelayConfig) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Number of live sessions
    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }

    /// Register a session, storing the document first when one is supplied.
    /// Re-registering an existing id replaces it and discards its documents.
    pub async fn create_session(&self, request: CreateSession) -> Result<String> {
        let file_name = request.file_name.trim().to_string();
        if file_name.is_empty() {
            return Err(RelayError::BadRequest("fileName is required".to_string()));
        }

        let id = match request.id {
            Some(id) => {
                validate_session_id(&id)?;
                id
            }
            None => generate_session_id(),
        };

        // A submission still running against the replaced session finishes first
        let previous = self.registry.write_lock(&id).ok();
        let _guard = match &previous {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        if previous.is_some() {
            self.store.remove(&id).await?;
        }

        let original = match request.document {
            Some(bytes) => {
                let size = bytes.len();
                self.store.put(&id, bytes, &file_name).await?;
                OriginalLocation::Stored { size }
            }
            None => OriginalLocation::Awaiting,
        };

        let id = self.registry.register(NewSession {
            id: Some(id),
            file_name: file_name.clone(),
            kind: request.kind,
            original,
        })?;

        info!(
            session_id = %id,
            file_name = %file_name,
            kind = ?request.kind,
            deferred = !original.is_stored(),
            "Session created"
        );
        Ok(id)
    }

    /// Store unsigned bytes for an existing session
    pub async fn upload_original(&self, id: &str, bytes: Bytes) -> Result<SessionView> {
        let lock = self.registry.write_lock(id)?;
        let _guard = lock.lock().await;
        let view = self
            .registry
            .get(id)
            .ok_or_else(|| RelayError::SessionNotFound(id.to_string()))?;

        let size = bytes.len();
        self.store.put(id, bytes, &view.file_name).await?;
        let view = self.registry.transition(id, Transition::Uploaded { size })?;

        info!(session_id = %id, size, "Original uploaded");
        Ok(view)
    }

    /// Unsigned document for the signer
    pub async fn fetch_original(&self, id: &str) -> Result<OriginalDocument> {
        if !self.registry.contains(id) {
            return Err(RelayError::SessionNotFound(id.to_string()));
        }
        let original = self
            .store
            .get_original(id)
            .await?
            .ok_or_else(|| RelayError::SessionNotFound(id.to_string()))?;

        info!(session_id = %id, size = original.bytes.len(), "Original served to signer");
        Ok(original)
    }

    /// Apply a signer submission. The store write and the transition that
    /// records it run under the session's write lock, so concurrent
    /// submissions apply one after the other.
    pub async fn submit(&self, id: &str, submission: &Submission) -> Result<SubmissionOutcome> {
        let lock = self.registry.write_lock(id)?;
        let _guard = lock.lock().await;

        let convention = submission.convention();
        let outcome = match classify(submission.payload().as_deref()) {
            Classification::Empty => {
                warn!(session_id = %id, convention, "Empty submission ignored");
                SubmissionOutcome::Ignored(IgnoreReason::Empty)
            }
            Classification::Undecodable(reason) => {
                warn!(session_id = %id, convention, reason = %reason, "Undecodable submission ignored");
                SubmissionOutcome::Ignored(IgnoreReason::Undecodable(reason))
            }
            Classification::SignerError(message) => {
                self.store.remove_signed(id).await?;
                self.registry
                    .transition(id, Transition::Failed(message.clone()))?;
                warn!(session_id = %id, convention, error = %message, "Signer reported an error");
                SubmissionOutcome::SignerError(message)
            }
            Classification::Signed(bytes) => {
                let size = bytes.len();
                self.store.put_signed(id, bytes).await?;
                if let Err(e) = self.registry.transition(id, Transition::Completed) {
                    // Swept while the write was in flight
                    self.store.remove(id).await?;
                    return Err(e);
                }
                info!(session_id = %id, convention, size, "Signed document received");
                SubmissionOutcome::Completed { size }
            }
        };

        Ok(outcome)
    }

    /// Status as seen by the browser; unknown ids report `not_found`
    pub fn status(&self, id: &str) -> SessionView {
        self.registry.view(id)
    }

    /// Signed document as base64, for signers that read their result back
    pub async fn retrieve_signed(&self, id: &str) -> Result<String> {
        let bytes = self.signed_bytes(id).await?;
        Ok(encode_document(&bytes))
    }

    /// Signed document for the browser. Starts the grace window; the session
    /// stays readable until the retention sweeper reaps it.
    pub async fn download(&self, id: &str) -> Result<SignedDocument> {
        let (view, bytes) = self.signed_with_view(id, true).await?;

        let file_name = signed_file_name(&view.file_name, &self.config.signed_suffix);
        info!(session_id = %id, file_name = %file_name, size = bytes.len(), "Signed document downloaded");
        Ok(SignedDocument { file_name, bytes })
    }

    async fn signed_bytes(&self, id: &str) -> Result<Bytes> {
        self.signed_with_view(id, false).await.map(|(_, bytes)| bytes)
    }

    async fn signed_with_view(&self, id: &str, mark_downloaded: bool) -> Result<(SessionView, Bytes)> {
        let lock = self.registry.write_lock(id)?;
        let _guard = lock.lock().await;
        let view = self
            .registry
            .get(id)
            .ok_or_else(|| RelayError::SessionNotFound(id.to_string()))?;

        if !(view.status.is_complete() && view.has_signed_data) {
            return Err(RelayError::NotReady {
                id: id.to_string(),
                status: view.status,
            });
        }

        let bytes = self
            .store
            .get_signed(id)
            .await?
            .ok_or_else(|| RelayError::NotReady {
                id: id.to_string(),
                status: view.status,
            })?;
        if mark_downloaded {
            self.registry.mark_downloaded(id)?;
        }
        Ok((view, bytes))
    }

    /// Dispatch a multiplexed request
    pub async fn handle(&self, request: SignerRequest) -> Result<SignerReply> {
        let id = request.id.as_str();
        match request.operation {
            Operation::Get => self.fetch_original(id).await.map(SignerReply::Original),
            Operation::Put => {
                let submission = request
                    .submission
                    .unwrap_or_else(|| Submission::RawBase64(String::new()));
                self.submit(id, &submission).await.map(SignerReply::Acknowledged)
            }
            Operation::Retrieve => self.retrieve_signed(id).await.map(SignerReply::SignedBase64),
            Operation::Status => Ok(SignerReply::Status(self.status(id))),
            Operation::Download => self.download(id).await.map(SignerReply::Download),
        }
    }
}

/// Download name for a signed document: `invoice.pdf` becomes
/// `invoice<suffix>.pdf`. Names without a `.pdf` extension get one appended.
pub fn signed_file_name(file_name: &str, suffix: &str) -> String {
    let stem = file_name
        .len()
        .checked_sub(4)
        .filter(|&i| file_name.is_char_boundary(i) && file_name[i..].eq_ignore_ascii_case(".pdf"))
        .map_or(file_name, |i| &file_name[..i]);
    format!("{}{}.pdf", stem, suffix)
}
