//! Request guard for an invite-code portal.
//!
//! - [`KeyManager`]: rotating base keys with one generation of grace
//! - [`SecureTransport`]: decode and validate obfuscated client envelopes
//! - [`ReviewLockManager`]: TTL-bounded exclusive locks on application reviews
//!
//! The crate installs no tracing subscriber and spawns nothing on its own;
//! background rotation and lock sweeping start only when the host asks.

pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod review;
pub mod task;

pub use clock::{system_clock, Clock, ManualClock, SystemClock};
pub use config::GuardConfig;
pub use crypto::{DerivedKey, Envelope, KeyManager, PlaintextRecord, SecureTransport};
pub use error::{ConfigError, EnvelopeError, KeyError, LockConflict, SecurityError};
pub use review::{ApplicationLock, LockGrant, LockInfo, ReviewLockManager};
pub use task::BackgroundTask;
