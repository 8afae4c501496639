//! Signed-result submissions
//!
//! The signer posts its result in one of several wire shapes. Each shape is a
//! [`Submission`] variant; [`Submission::payload`] reduces every variant to the
//! same payload string and [`classify`] turns that string into a state change.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;

use super::params::{parse_pairs, Params};

/// Prefix the signer puts in front of failure codes (e.g. `SAF_03_ERROR_CANCEL`)
pub const ERROR_PREFIX: &str = "SAF_";

/// Standard or URL-safe alphabet after normalization, padding optional
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Structured submission body
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StructuredBody {
    #[serde(default)]
    pub dat: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
}

/// One of the wire conventions for posting back a signed result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Body is the base64 document itself
    RawBase64(String),
    /// Body is `op=put&dat=<payload>` form data
    FormEncoded(String),
    /// JSON body with `dat` or `data`
    Structured(StructuredBody),
    /// `op=put&dat=<payload>` delivered in the query string of a GET
    Query(String),
}

impl Submission {
    /// Normalize a request body into a submission.
    ///
    /// JSON is recognised by a leading `{`, or by content type when the body
    /// parses. Form data is recognised by its keys (`dat`, `op`, `operation`,
    /// `id`), never by content type alone: signers post raw base64 with a form
    /// content type. Everything else is a raw payload.
    pub fn from_body(content_type: Option<&str>, body: &[u8]) -> Self {
        let text = String::from_utf8_lossy(body);
        let trimmed = text.trim();
        let content_type = content_type.unwrap_or_default().to_ascii_lowercase();

        if trimmed.starts_with('{') {
            return Self::Structured(serde_json::from_str(trimmed).unwrap_or_default());
        }
        if content_type.contains("application/json") {
            if let Ok(body) = serde_json::from_str(trimmed) {
                return Self::Structured(body);
            }
        }

        if has_form_keys(trimmed) {
            return Self::FormEncoded(trimmed.to_string());
        }

        Self::RawBase64(trimmed.to_string())
    }

    /// Convention name for logs
    pub fn convention(&self) -> &'static str {
        match self {
            Self::RawBase64(_) => "raw",
            Self::FormEncoded(_) => "form",
            Self::Structured(_) => "structured",
            Self::Query(_) => "query",
        }
    }

    /// The payload string, or `None` if the submission carries nothing
    pub fn payload(&self) -> Option<String> {
        let payload = match self {
            Self::RawBase64(body) => Some(body.clone()),
            Self::FormEncoded(encoded) | Self::Query(encoded) => {
                let params = Params::from_pairs(parse_pairs(encoded));
                match params.operation() {
                    Some(op) if !op.eq_ignore_ascii_case("put") => None,
                    _ => params.get("dat").map(str::to_string),
                }
            }
            Self::Structured(body) => body.dat.clone().or_else(|| body.data.clone()),
        };
        payload.filter(|p| !p.trim().is_empty())
    }
}

fn has_form_keys(body: &str) -> bool {
    parse_pairs(body)
        .iter()
        .any(|(key, _)| matches!(key.as_str(), "dat" | "op" | "operation" | "id"))
}

/// What a payload means for the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Nothing to apply
    Empty,
    /// The signer reported a failure, stored verbatim after percent-decoding
    SignerError(String),
    /// Decoded signed document
    Signed(Bytes),
    /// Not an error code and not decodable as a document
    Undecodable(String),
}

/// Classify a submission payload.
///
/// Precedence: empty, then the error prefix, then base64 decoding. No other
/// heuristics are applied.
pub fn classify(payload: Option<&str>) -> Classification {
    let Some(payload) = payload.map(str::trim).filter(|p| !p.is_empty()) else {
        return Classification::Empty;
    };

    if payload.starts_with(ERROR_PREFIX) {
        let message = urlencoding::decode(payload)
            .map(|m| m.into_owned())
            .unwrap_or_else(|_| payload.to_string());
        return Classification::SignerError(message);
    }

    match decode_document(payload) {
        Ok(bytes) if !bytes.is_empty() => Classification::Signed(Bytes::from(bytes)),
        Ok(_) => Classification::Undecodable("payload decodes to zero bytes".to_string()),
        Err(e) => Classification::Undecodable(e.to_string()),
    }
}

/// Decode a base64 document.
///
/// Accepts the standard and URL-safe alphabets, skips ASCII whitespace and
/// does not require padding.
pub fn decode_document(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let normalized: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    LENIENT.decode(normalized)
}

/// Encode a document for the signer
pub fn encode_document(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
