//! Per-session endpoints
//!
//! - `POST /sessions`, `POST /prestage` - register a session
//! - `PUT /sessions/{id}/upload` - deferred upload of the unsigned PDF
//! - `GET /sessions/{id}/original` - signer fetches the unsigned PDF
//! - `POST /sessions/{id}/signed` - signer posts the result (raw, form or JSON)
//! - `GET /sessions/{id}/signed?op=put&dat=...` - signer posts the result in the query
//! - `GET /sessions/{id}/retrieve` - signer reads its result back as base64
//! - `GET /sessions/{id}/status` - browser polls
//! - `GET /sessions/{id}/download` - browser downloads the signed PDF

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{error_response, json_response, ok_response, pdf_response, text_response};
use crate::protocol::{decode_document, CreateSession, Submission};
use crate::server::AppState;
use crate::session::SessionKind;
use crate::types::RelayError;

/// Create request body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub file_name: String,
    /// Base64 document; omitted for a deferred upload
    #[serde(default, alias = "documentBytes", alias = "pdfBase64")]
    pub data: Option<String>,
}

/// URLs handed back to the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUrls {
    pub id: String,
    /// Where the signer fetches the unsigned document
    pub retrieval_url: String,
    /// Where the signer posts its result
    pub submit_url: String,
    pub upload_url: String,
    pub status_url: String,
    pub download_url: String,
}

impl SessionUrls {
    pub fn new(base_url: &str, id: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        let session = format!("{}/sessions/{}", base, urlencoding::encode(id));
        Self {
            id: id.to_string(),
            retrieval_url: format!("{}/original", session),
            submit_url: format!("{}/signed", session),
            upload_url: format!("{}/upload", session),
            status_url: format!("{}/status", session),
            download_url: format!("{}/download", session),
        }
    }
}

/// Handle `POST /sessions` and `POST /prestage`
pub async fn handle_create(
    state: &AppState,
    base_url: &str,
    body: Bytes,
    kind: SessionKind,
) -> Response<Full<Bytes>> {
    let request: CreateRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return error_response(e.into()),
    };

    let document = match request.data.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(encoded) => match decode_document(encoded) {
            Ok(bytes) => Some(Bytes::from(bytes)),
            Err(e) => {
                return error_response(RelayError::BadRequest(format!(
                    "data is not valid base64: {}",
                    e
                )))
            }
        },
        None => None,
    };

    if kind == SessionKind::Prestaged && document.is_none() {
        return error_response(RelayError::BadRequest(
            "data is required for a pre-staged session".to_string(),
        ));
    }

    let created = state
        .relay
        .create_session(CreateSession {
            id: request.id,
            file_name: request.file_name,
            document,
            kind,
        })
        .await;

    match created {
        Ok(id) => json_response(StatusCode::CREATED, &SessionUrls::new(base_url, &id)),
        Err(e) => error_response(e),
    }
}

/// Handle `PUT /sessions/{id}/upload`
pub async fn handle_upload(state: &AppState, id: &str, body: Bytes) -> Response<Full<Bytes>> {
    if body.is_empty() {
        return error_response(RelayError::BadRequest("Empty document".to_string()));
    }
    match state.relay.upload_original(id, body).await {
        Ok(_) => ok_response(),
        Err(e) => error_response(e),
    }
}

/// Handle `GET /sessions/{id}/original`
pub async fn handle_original(state: &AppState, id: &str) -> Response<Full<Bytes>> {
    match state.relay.fetch_original(id).await {
        Ok(original) => pdf_response(&original.file_name, original.bytes),
        Err(e) => error_response(e),
    }
}

/// Handle `POST /sessions/{id}/signed`
pub async fn handle_submit(
    state: &AppState,
    id: &str,
    content_type: Option<&str>,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let submission = Submission::from_body(content_type, &body);
    submit(state, id, &submission).await
}

/// Handle `GET /sessions/{id}/signed?op=put&dat=...`
pub async fn handle_submit_query(
    state: &AppState,
    id: &str,
    query: Option<&str>,
) -> Response<Full<Bytes>> {
    let submission = Submission::Query(query.unwrap_or_default().to_string());
    submit(state, id, &submission).await
}

async fn submit(state: &AppState, id: &str, submission: &Submission) -> Response<Full<Bytes>> {
    match state.relay.submit(id, submission).await {
        Ok(outcome) => {
            debug!(
                session_id = %id,
                convention = submission.convention(),
                ?outcome,
                "Submission acknowledged"
            );
            ok_response()
        }
        Err(e) => error_response(e),
    }
}

/// Handle `GET /sessions/{id}/retrieve`
pub async fn handle_retrieve(state: &AppState, id: &str) -> Response<Full<Bytes>> {
    match state.relay.retrieve_signed(id).await {
        Ok(encoded) => text_response(StatusCode::OK, encoded),
        Err(e) => error_response(e),
    }
}

/// Handle `GET /sessions/{id}/status`. Unknown ids are a normal answer.
pub fn handle_status(state: &AppState, id: &str) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &state.relay.status(id))
}

/// Handle `GET /sessions/{id}/download`
pub async fn handle_download(state: &AppState, id: &str) -> Response<Full<Bytes>> {
    match state.relay.download(id).await {
        Ok(doc) => {
            state.sweeper.schedule_grace_reap();
            pdf_response(&doc.file_name, doc.bytes)
        }
        Err(e) => error_response(e),
    }
}
