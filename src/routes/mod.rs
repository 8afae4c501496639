//! HTTP routes for the signer relay

pub mod health;
pub mod sessions;
pub mod signer;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::HeaderMap;
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::{error, warn};

use crate::types::{RelayError, Result};

pub use health::{health_check, root_banner};
pub use sessions::{
    handle_create, handle_download, handle_original, handle_retrieve, handle_status,
    handle_submit, handle_submit_query, handle_upload, SessionUrls,
};
pub use signer::handle_servlet;

/// Read a request body, failing with `PayloadTooLarge` past `limit` bytes
pub async fn read_body<B>(headers: &HeaderMap, body: B, limit: usize) -> Result<Bytes>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    if let Some(size) = content_length(headers) {
        if size > limit {
            return Err(RelayError::PayloadTooLarge { size, limit });
        }
    }

    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(RelayError::PayloadTooLarge {
            size: limit.saturating_add(1),
            limit,
        }),
        Err(e) => Err(RelayError::BadRequest(format!("Failed to read request body: {}", e))),
    }
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(hyper::header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Content type header as a string
pub fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}

/// JSON response with the given status
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_string(value)
        .unwrap_or_else(|_| r#"{"error":"internal","message":"Serialization failed"}"#.to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Plain text response
pub fn text_response(status: StatusCode, text: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain; charset=utf-8")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(text.into()))
        .unwrap()
}

/// Acknowledgement sent to the signer for every accepted submission
pub fn ok_response() -> Response<Full<Bytes>> {
    text_response(StatusCode::OK, "OK")
}

/// PDF attachment
pub fn pdf_response(file_name: &str, bytes: Bytes) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/pdf")
        .header("Content-Disposition", content_disposition(file_name))
        .header("Content-Length", bytes.len())
        .header("Cache-Control", "no-cache")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(bytes))
        .unwrap()
}

/// `attachment` disposition with an ASCII fallback name and the exact UTF-8 name
pub fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            ' '..='~' if c != '"' && c != '\\' => c,
            _ => '_',
        })
        .collect();

    if fallback == file_name {
        format!("attachment; filename=\"{}\"", fallback)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            urlencoding::encode(file_name)
        )
    }
}

/// Map a relay error to a JSON error response
pub fn error_response(err: RelayError) -> Response<Full<Bytes>> {
    let status = err.status_code();
    if status.is_server_error() {
        error!(error = %err, "Request failed");
    } else {
        warn!(error = %err, "Request rejected");
    }

    let body = serde_json::json!({
        "error": err.code(),
        "message": err.to_string(),
    });
    json_response(status, &body)
}

/// CORS preflight response
pub fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "Content-Type, ngrok-skip-browser-warning")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Not found response
pub fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path,
    });
    json_response(StatusCode::NOT_FOUND, &body)
}
