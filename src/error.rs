use thiserror::Error;

use crate::review::LockInfo;

/// Failure to produce key material. Fatal at startup.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Random number generation failed: {0}")]
    RngFailed(String),
}

/// Why a single decode attempt rejected an envelope.
///
/// Internal taxonomy: logged server-side, never returned to the client.
/// Callers of [`crate::SecureTransport::open`] only ever see
/// [`SecurityError::ValidationFailed`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    #[error("Envelope expired: {age_secs}s old")]
    Expired { age_secs: i64 },

    #[error("Identity mismatch: {0}")]
    IdentityMismatch(&'static str),
}

impl EnvelopeError {
    /// Stable label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::Expired { .. } => "expired",
            Self::IdentityMismatch(_) => "identity_mismatch",
        }
    }
}

/// The only error surfaced by the decode entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SecurityError {
    #[error("Security validation failed")]
    ValidationFailed,
}

/// Another admin holds a live lock on the application.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Application {} is being reviewed by {}", .holder.application_id, .holder.holder_name)]
pub struct LockConflict {
    pub holder: LockInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("Background task {0} needs a non-zero interval")]
    ZeroInterval(&'static str),
}
