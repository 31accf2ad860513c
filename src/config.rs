//! Tunables for key rotation, envelope freshness and review locks.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default key rotation interval in seconds (24 hours).
pub const DEFAULT_KEY_ROTATION_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Default envelope freshness window in seconds (10 minutes).
pub const DEFAULT_FRESHNESS_WINDOW_SECS: u64 = 600;

/// Default review lock lifetime in seconds (5 minutes).
pub const DEFAULT_LOCK_TTL_SECS: u64 = 5 * 60;

/// Default interval between expired-lock sweeps in seconds.
pub const DEFAULT_LOCK_SWEEP_INTERVAL_SECS: u64 = 60;

/// Configuration for the guard components.
///
/// Every field has a default, so an empty document deserializes to the fixed
/// policy: rotate daily, accept envelopes up to 600s old, hold review locks
/// for five minutes and sweep once a minute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub key_rotation_interval_secs: u64,
    pub freshness_window_secs: u64,
    pub lock_ttl_secs: u64,
    pub lock_sweep_interval_secs: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            key_rotation_interval_secs: DEFAULT_KEY_ROTATION_INTERVAL_SECS,
            freshness_window_secs: DEFAULT_FRESHNESS_WINDOW_SECS,
            lock_ttl_secs: DEFAULT_LOCK_TTL_SECS,
            lock_sweep_interval_secs: DEFAULT_LOCK_SWEEP_INTERVAL_SECS,
        }
    }
}

impl GuardConfig {
    /// Reject zero durations. A zero rotation or sweep interval would spin,
    /// a zero TTL or window would reject everything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("key_rotation_interval_secs", self.key_rotation_interval_secs),
            ("freshness_window_secs", self.freshness_window_secs),
            ("lock_ttl_secs", self.lock_ttl_secs),
            ("lock_sweep_interval_secs", self.lock_sweep_interval_secs),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(ConfigError::ZeroDuration(name));
            }
        }
        Ok(())
    }

    pub fn key_rotation_interval(&self) -> Duration {
        Duration::from_secs(self.key_rotation_interval_secs)
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.freshness_window_secs)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn lock_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.lock_sweep_interval_secs)
    }
}
