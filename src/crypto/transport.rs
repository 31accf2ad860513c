//! Seal/open pipeline for protected client submissions.
//!
//! Seal (client): record → pipe-joined text → obfuscate(derived key) → base64
//! Open (server): base64 → deobfuscate(derived key) → UTF-8 → split → validate
//!
//! The server tries the key derived from the current base key first and, on
//! any failure, the key derived from the previous base key. Callers only learn
//! that validation failed, never which check tripped.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use super::base64::{base64_decode, base64_encode};
use super::cipher::{deobfuscate, obfuscate};
use super::envelope::{split_fields, validate, Envelope, Expectation, PlaintextRecord};
use super::key_manager::{derive_key, DerivedKey, KeyManager, KeySlot};
use crate::clock::{system_clock, Clock};
use crate::config::GuardConfig;
use crate::error::{ConfigError, EnvelopeError, SecurityError};

/// Seal a record under an already derived key. Returns the base64 ciphertext.
pub fn seal(record: &PlaintextRecord, key: &DerivedKey) -> String {
    let mut bytes = record.to_wire_string().into_bytes();
    obfuscate(&mut bytes, key);
    base64_encode(&bytes)
}

/// Client-side helper: derive the request key from a fetched base key and
/// seal `body` into a ready-to-post [`Envelope`].
pub fn seal_envelope(
    base_key: &str,
    body: Map<String, Value>,
    fingerprint: &str,
    nonce: i64,
    timestamp: i64,
) -> Envelope {
    let key = derive_key(base_key, fingerprint, nonce);
    let record = PlaintextRecord::new(timestamp, fingerprint, nonce, body);
    Envelope {
        ciphertext: seal(&record, &key),
        fingerprint: fingerprint.to_string(),
        nonce,
    }
}

/// One decode attempt under a single key, with the detailed reason on failure.
pub fn open_with_key(
    ciphertext: &str,
    key: &DerivedKey,
    expect: &Expectation<'_>,
) -> Result<PlaintextRecord, EnvelopeError> {
    let mut bytes = base64_decode(ciphertext)
        .map_err(|e| EnvelopeError::Malformed(format!("base64: {}", e)))?;
    deobfuscate(&mut bytes, key);
    let text = String::from_utf8(bytes)
        .map_err(|_| EnvelopeError::Malformed("plaintext is not UTF-8".to_string()))?;
    let fields = split_fields(&text)?;
    validate(fields, expect)
}

/// Server-side entry point used by the login, registration and application
/// submission handlers.
pub struct SecureTransport {
    keys: Arc<KeyManager>,
    clock: Arc<dyn Clock>,
    freshness_window: Duration,
}

impl SecureTransport {
    /// System clock and the default 600 second freshness window.
    pub fn new(keys: Arc<KeyManager>) -> Self {
        Self::from_parts(keys, system_clock(), GuardConfig::default().freshness_window())
    }

    /// Build with the configured freshness window. Rejects a zero window,
    /// which would turn away every envelope.
    pub fn with_config(
        keys: Arc<KeyManager>,
        clock: Arc<dyn Clock>,
        config: &GuardConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_parts(keys, clock, config.freshness_window()))
    }

    fn from_parts(
        keys: Arc<KeyManager>,
        clock: Arc<dyn Clock>,
        freshness_window: Duration,
    ) -> Self {
        Self {
            keys,
            clock,
            freshness_window,
        }
    }

    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// Value returned by the key-fetch endpoint.
    pub fn current_key(&self) -> String {
        self.keys.current_key()
    }

    /// Decode an envelope and return its JSON body.
    pub fn open(&self, envelope: &Envelope) -> Result<Map<String, Value>, SecurityError> {
        self.decode(&envelope.ciphertext, &envelope.fingerprint, envelope.nonce)
    }

    /// Decode loose envelope parts and return the JSON body.
    pub fn decode(
        &self,
        ciphertext: &str,
        fingerprint: &str,
        nonce: i64,
    ) -> Result<Map<String, Value>, SecurityError> {
        self.open_record(ciphertext, fingerprint, nonce)
            .map(|record| record.body)
    }

    /// Decode and return the full validated record.
    pub fn open_record(
        &self,
        ciphertext: &str,
        fingerprint: &str,
        nonce: i64,
    ) -> Result<PlaintextRecord, SecurityError> {
        let expect = Expectation {
            fingerprint,
            nonce,
            now: self.clock.unix_now(),
            freshness_window_secs: i64::try_from(self.freshness_window.as_secs())
                .unwrap_or(i64::MAX),
        };

        let candidates = self.keys.derivation_candidates(fingerprint, nonce);
        let attempts = candidates.len();
        for (slot, key) in &candidates {
            match open_with_key(ciphertext, key, &expect) {
                Ok(record) => {
                    if *slot == KeySlot::Previous {
                        tracing::debug!(fingerprint, "Envelope accepted under previous base key");
                    }
                    return Ok(record);
                }
                Err(e) => {
                    tracing::debug!(
                        slot = slot.as_str(),
                        reason = e.kind(),
                        fingerprint,
                        "Envelope rejected"
                    );
                }
            }
        }

        tracing::warn!(
            fingerprint,
            nonce,
            attempts,
            "Envelope failed validation with all available keys"
        );
        Err(SecurityError::ValidationFailed)
    }
}
