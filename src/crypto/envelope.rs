//! Envelope wire type and plaintext record parsing/validation.
//!
//! Plaintext format: `{unix_timestamp}|{fingerprint}|{nonce}|{json_body}`.
//! The split is on every `|`, so a body containing `|` does not parse.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::types::{FIELD_SEPARATOR, RECORD_FIELD_COUNT};
use crate::error::EnvelopeError;

/// Wire input posted by the client alongside login, registration and
/// application submissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64 of the obfuscated plaintext record.
    #[serde(rename = "encrypted")]
    pub ciphertext: String,
    /// Device fingerprint, supplied out-of-band and also embedded.
    pub fingerprint: String,
    /// Client-chosen nonce, supplied out-of-band and also embedded.
    pub nonce: i64,
}

/// Decoded, validated plaintext.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaintextRecord {
    pub timestamp: i64,
    pub fingerprint: String,
    pub nonce: i64,
    pub body: Map<String, Value>,
}

impl PlaintextRecord {
    pub fn new(
        timestamp: i64,
        fingerprint: impl Into<String>,
        nonce: i64,
        body: Map<String, Value>,
    ) -> Self {
        Self {
            timestamp,
            fingerprint: fingerprint.into(),
            nonce,
            body,
        }
    }

    /// Pipe-joined form fed to the byte transform.
    pub fn to_wire_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PlaintextRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = serde_json::to_string(&self.body).map_err(|_| fmt::Error)?;
        write!(
            f,
            "{}{sep}{}{sep}{}{sep}{}",
            self.timestamp,
            self.fingerprint,
            self.nonce,
            body,
            sep = FIELD_SEPARATOR
        )
    }
}

/// Borrowed view of the four plaintext fields, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFields<'a> {
    pub timestamp: &'a str,
    pub fingerprint: &'a str,
    pub nonce: &'a str,
    pub body: &'a str,
}

/// Split decoded text into exactly four fields.
pub fn split_fields(text: &str) -> Result<RawFields<'_>, EnvelopeError> {
    let parts: Vec<&str> = text.split(FIELD_SEPARATOR).collect();
    match parts.as_slice() {
        &[timestamp, fingerprint, nonce, body] => Ok(RawFields {
            timestamp,
            fingerprint,
            nonce,
            body,
        }),
        _ => Err(EnvelopeError::Malformed(format!(
            "expected {} fields, got {}",
            RECORD_FIELD_COUNT,
            parts.len()
        ))),
    }
}

/// Validation inputs: the out-of-band identity and the server's view of time.
#[derive(Debug, Clone, Copy)]
pub struct Expectation<'a> {
    pub fingerprint: &'a str,
    pub nonce: i64,
    pub now: i64,
    pub freshness_window_secs: i64,
}

/// Check the fields in order: freshness, fingerprint, nonce, body. The first
/// failing check decides the error.
pub fn validate(
    fields: RawFields<'_>,
    expect: &Expectation<'_>,
) -> Result<PlaintextRecord, EnvelopeError> {
    let timestamp: i64 = fields
        .timestamp
        .parse()
        .map_err(|_| EnvelopeError::Malformed("timestamp is not an integer".to_string()))?;
    let age_secs = expect.now.saturating_sub(timestamp);
    if age_secs > expect.freshness_window_secs {
        return Err(EnvelopeError::Expired { age_secs });
    }

    if fields.fingerprint != expect.fingerprint {
        return Err(EnvelopeError::IdentityMismatch("fingerprint"));
    }

    let nonce: i64 = fields
        .nonce
        .parse()
        .map_err(|_| EnvelopeError::Malformed("nonce is not an integer".to_string()))?;
    if nonce != expect.nonce {
        return Err(EnvelopeError::IdentityMismatch("nonce"));
    }

    let body = match serde_json::from_str::<Value>(fields.body) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            return Err(EnvelopeError::Malformed(
                "body is not a JSON object".to_string(),
            ))
        }
        Err(e) => return Err(EnvelopeError::Malformed(format!("body: {}", e))),
    };

    Ok(PlaintextRecord {
        timestamp,
        fingerprint: fields.fingerprint.to_string(),
        nonce,
        body,
    })
}
