//! Exclusive, TTL-bounded review locks for application records.

mod lock;

pub use lock::{ApplicationLock, LockGrant, LockInfo, ReviewLockManager};
