//! Multiplexed signer endpoint
//!
//! `GET|POST /servlet?op=<operation>&id=<id>` carries every operation for
//! signer versions that only know a single storage URL.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use tracing::debug;

use super::{error_response, json_response, ok_response, pdf_response, text_response};
use crate::protocol::{SignerReply, SignerRequest};
use crate::server::AppState;

/// Handle `/servlet`
pub async fn handle_servlet(
    state: &AppState,
    query: Option<&str>,
    content_type: Option<&str>,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let request = match SignerRequest::from_parts(query, content_type, &body) {
        Ok(r) => r,
        Err(e) => return error_response(e),
    };
    debug!(session_id = %request.id, operation = ?request.operation, "Servlet request");
    let id = request.id.clone();
    let convention = request.submission.as_ref().map_or("none", |s| s.convention());

    match state.relay.handle(request).await {
        Ok(SignerReply::Original(doc)) => pdf_response(&doc.file_name, doc.bytes),
        Ok(SignerReply::Acknowledged(outcome)) => {
            debug!(session_id = %id, convention, ?outcome, "Submission acknowledged");
            ok_response()
        }
        Ok(SignerReply::SignedBase64(encoded)) => text_response(StatusCode::OK, encoded),
        Ok(SignerReply::Status(view)) => json_response(StatusCode::OK, &view),
        Ok(SignerReply::Download(doc)) => {
            state.sweeper.schedule_grace_reap();
            pdf_response(&doc.file_name, doc.bytes)
        }
        Err(e) => error_response(e),
    }
}
