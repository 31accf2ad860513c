//! Base key lifecycle: generation, rotation with one generation of grace, and
//! per-request key derivation.
//!
//! Exactly one generation is current and at most one is previous. Rotation
//! promotes a fresh key to current, demotes the old current to previous and
//! drops whatever was previous before. Nothing is persisted, so a restart
//! starts a new chain at generation 1.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::base64::{base64_encode, shape_key};
use super::types::BASE_KEY_ENTROPY_BYTES;
use crate::clock::{system_clock, Clock};
use crate::error::{ConfigError, KeyError};
use crate::task::BackgroundTask;

/// Source of the random bytes behind each base key.
pub trait EntropySource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> Result<(), KeyError>;
}

/// OS cryptographic RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> Result<(), KeyError> {
        getrandom::getrandom(buf).map_err(|e| KeyError::RngFailed(e.to_string()))
    }
}

/// Per-request key string derived from a base key, a fingerprint and a nonce.
///
/// Never stored; recomputed for every decode attempt. Always non-empty.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey(String);

impl DerivedKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(..)")
    }
}

/// Derive the request key: `base_key + fingerprint + nonce` as decimal, run
/// through the 7-round shaping pass.
///
/// The first shaping round keeps 32 base64 characters, which cover only the
/// first 24 bytes of the seed, and repeated base64 converges on a common
/// prefix. With a full-length base key the fingerprint and nonce therefore
/// never reach the output, and the result depends on a handful of leading
/// base key characters only.
pub fn derive_key(base_key: &str, fingerprint: &str, nonce: i64) -> DerivedKey {
    let seed = format!("{}{}{}", base_key, fingerprint, nonce);
    DerivedKey(shape_key(seed.as_bytes()))
}

/// Draw 32 random bytes, base64 them, then apply the shaping pass.
pub fn generate_base_key(entropy: &dyn EntropySource) -> Result<String, KeyError> {
    let mut raw = [0u8; BASE_KEY_ENTROPY_BYTES];
    entropy.fill(&mut raw)?;
    let mut encoded = base64_encode(&raw);
    raw.zeroize();
    let key = shape_key(encoded.as_bytes());
    encoded.zeroize();
    Ok(key)
}

/// Which base key generation a derived key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySlot {
    Current,
    Previous,
}

impl KeySlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Previous => "previous",
        }
    }
}

/// Public metadata of one base key generation (no key material).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GenerationInfo {
    pub generation: u64,
    pub created_at: DateTime<Utc>,
}

/// Metadata of the retained generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyGenerations {
    pub current: GenerationInfo,
    pub previous: Option<GenerationInfo>,
}

struct BaseKey {
    secret: String,
    generation: u64,
    created_at: DateTime<Utc>,
}

impl BaseKey {
    fn info(&self) -> GenerationInfo {
        GenerationInfo {
            generation: self.generation,
            created_at: self.created_at,
        }
    }
}

impl Drop for BaseKey {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

struct KeyRing {
    current: BaseKey,
    previous: Option<BaseKey>,
}

/// Owner of the process-wide base key pair.
///
/// Reads and derivations share the read side of one lock. Rotation generates
/// the new key before taking the write side, so the exclusive section is a
/// pointer swap. Concurrent rotations are serialized.
pub struct KeyManager {
    ring: RwLock<KeyRing>,
    rotation: Mutex<()>,
    entropy: Arc<dyn EntropySource>,
    clock: Arc<dyn Clock>,
}

impl KeyManager {
    /// Create a manager with the OS RNG and system clock.
    ///
    /// Fails only if the OS RNG fails; the host should abort startup.
    pub fn new() -> Result<Self, KeyError> {
        Self::with_sources(Arc::new(OsEntropy), system_clock())
    }

    pub fn with_sources(
        entropy: Arc<dyn EntropySource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, KeyError> {
        let secret = generate_base_key(entropy.as_ref())?;
        let current = BaseKey {
            secret,
            generation: 1,
            created_at: clock.now(),
        };
        tracing::info!(generation = 1, "Initial base key generated");
        Ok(Self {
            ring: RwLock::new(KeyRing {
                current,
                previous: None,
            }),
            rotation: Mutex::new(()),
            entropy,
            clock,
        })
    }

    /// Current base key, as served to clients by the key-fetch endpoint.
    pub fn current_key(&self) -> String {
        self.ring.read().current.secret.clone()
    }

    /// Previous base key; `None` before the first rotation.
    pub fn previous_key(&self) -> Option<String> {
        self.ring
            .read()
            .previous
            .as_ref()
            .map(|key| key.secret.clone())
    }

    pub fn current_generation(&self) -> u64 {
        self.ring.read().current.generation
    }

    pub fn generations(&self) -> KeyGenerations {
        let ring = self.ring.read();
        KeyGenerations {
            current: ring.current.info(),
            previous: ring.previous.as_ref().map(BaseKey::info),
        }
    }

    /// Derive the request key from the current base key.
    pub fn derive_key(&self, fingerprint: &str, nonce: i64) -> DerivedKey {
        derive_key(&self.ring.read().current.secret, fingerprint, nonce)
    }

    /// Derive the request key from the previous base key, if one is retained.
    pub fn derive_previous_key(&self, fingerprint: &str, nonce: i64) -> Option<DerivedKey> {
        self.ring
            .read()
            .previous
            .as_ref()
            .map(|key| derive_key(&key.secret, fingerprint, nonce))
    }

    /// Derive from current, then previous, under one read lock so both keys
    /// come from the same pair even if a rotation is pending.
    pub fn derivation_candidates(
        &self,
        fingerprint: &str,
        nonce: i64,
    ) -> Vec<(KeySlot, DerivedKey)> {
        let ring = self.ring.read();
        let mut candidates = Vec::with_capacity(2);
        candidates.push((
            KeySlot::Current,
            derive_key(&ring.current.secret, fingerprint, nonce),
        ));
        if let Some(previous) = &ring.previous {
            candidates.push((
                KeySlot::Previous,
                derive_key(&previous.secret, fingerprint, nonce),
            ));
        }
        candidates
    }

    /// Promote a new key to current and demote the old current to previous.
    /// The generation that was previous before the call is discarded.
    ///
    /// Returns the new current generation. On RNG failure the pair is left
    /// untouched.
    pub fn rotate(&self) -> Result<u64, KeyError> {
        let _serial = self.rotation.lock();

        let secret = generate_base_key(self.entropy.as_ref())?;
        let created_at = self.clock.now();

        let (generation, discarded) = {
            let mut ring = self.ring.write();
            let generation = ring.current.generation + 1;
            let retired = std::mem::replace(
                &mut ring.current,
                BaseKey {
                    secret,
                    generation,
                    created_at,
                },
            );
            (generation, ring.previous.replace(retired))
        };

        tracing::info!(
            generation,
            discarded_generation = discarded.as_ref().map(|key| key.generation),
            "Base key rotated"
        );
        Ok(generation)
    }

    /// Rotate every `interval` on the current tokio runtime until the returned
    /// handle is stopped or dropped.
    #[must_use = "dropping the handle stops the job"]
    pub fn spawn_rotation(
        self: &Arc<Self>,
        interval: Duration,
    ) -> Result<BackgroundTask, ConfigError> {
        let keys = Arc::clone(self);
        let task = BackgroundTask::every("key-rotation", interval, move || {
            if let Err(e) = keys.rotate() {
                tracing::error!(error = %e, "Key rotation failed, keeping current key pair");
            }
        })?;
        tracing::info!(interval_secs = interval.as_secs(), "Automatic key rotation enabled");
        Ok(task)
    }
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyManager")
            .field("generations", &self.generations())
            .finish_non_exhaustive()
    }
}
