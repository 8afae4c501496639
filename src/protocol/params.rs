//! Request parameters for the multiplexed signer endpoint
//!
//! Query strings and bodies arrive in whatever shape the signer version
//! prefers. They are normalized here into one [`SignerRequest`] before any
//! session logic runs.

use std::str::FromStr;

use super::submission::Submission;
use crate::types::{RelayError, Result};

/// Operations understood by the multiplexed endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Signer fetches the unsigned document
    Get,
    /// Signer posts the signed result
    Put,
    /// Signer reads back the signed result as base64
    Retrieve,
    /// Browser polls the session status
    Status,
    /// Browser downloads the signed document
    Download,
}

impl FromStr for Operation {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Self::Get),
            "put" => Ok(Self::Put),
            "retrieve" => Ok(Self::Retrieve),
            "status" => Ok(Self::Status),
            "download" => Ok(Self::Download),
            other => Err(RelayError::BadRequest(format!("Invalid operation: {}", other))),
        }
    }
}

/// Decoded key/value pairs, first occurrence wins
#[derive(Debug, Clone, Default)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `op` or `operation`
    pub fn operation(&self) -> Option<&str> {
        self.get("op").or_else(|| self.get("operation"))
    }

    fn from_json(body: &[u8]) -> Self {
        let Ok(serde_json::Value::Object(map)) = serde_json::from_slice(body) else {
            return Self::default();
        };
        Self(
            map.into_iter()
                .filter_map(|(k, v)| match v {
                    serde_json::Value::String(s) => Some((k, s)),
                    serde_json::Value::Number(n) => Some((k, n.to_string())),
                    _ => None,
                })
                .collect(),
        )
    }
}

/// Split `a=1&b=2` into decoded pairs.
///
/// Values are percent-decoded but `+` is kept literal: it belongs to the base64
/// alphabet and the signer does not encode it.
pub fn parse_pairs(encoded: &str) -> Vec<(String, String)> {
    encoded
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(key), percent_decode(value))
        })
        .collect()
}

fn percent_decode(s: &str) -> String {
    urlencoding::decode(s)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

/// Canonical `{id, operation, payload}` request for the multiplexed endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerRequest {
    pub id: String,
    pub operation: Operation,
    /// Present for `put`
    pub submission: Option<Submission>,
}

impl SignerRequest {
    /// Normalize query string and body. Query parameters take precedence over
    /// body parameters.
    pub fn from_parts(query: Option<&str>, content_type: Option<&str>, body: &[u8]) -> Result<Self> {
        let query_params = Params::from_pairs(parse_pairs(query.unwrap_or_default()));
        let body_submission = (!body.is_empty()).then(|| Submission::from_body(content_type, body));
        let body_params = match &body_submission {
            Some(Submission::FormEncoded(encoded)) => Params::from_pairs(parse_pairs(encoded)),
            Some(Submission::Structured(_)) => Params::from_json(body),
            _ => Params::default(),
        };

        let op = query_params
            .operation()
            .or_else(|| body_params.operation())
            .ok_or_else(|| RelayError::BadRequest("Operation required".to_string()))?;
        let operation: Operation = op.parse()?;

        let id = query_params
            .get("id")
            .or_else(|| body_params.get("id"))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RelayError::BadRequest("ID required".to_string()))?
            .to_string();

        let submission = match operation {
            Operation::Put if query_params.get("dat").is_some() => {
                Some(Submission::Query(query.unwrap_or_default().to_string()))
            }
            Operation::Put => Some(
                body_submission.unwrap_or_else(|| Submission::Query(query.unwrap_or_default().to_string())),
            ),
            _ => None,
        };

        Ok(Self {
            id,
            operation,
            submission,
        })
    }
}
