use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::clock::{system_clock, Clock};
use crate::config::GuardConfig;
use crate::error::{ConfigError, LockConflict};
use crate::task::BackgroundTask;

/// One admin's exclusive claim on an application under review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    pub application_id: i64,
    pub holder_id: i64,
    pub holder_name: String,
    pub acquired_at: DateTime<Utc>,
}

/// Stored lock entry. Same shape as the info handed to callers.
pub type ApplicationLock = LockInfo;

/// How a successful [`ReviewLockManager::acquire`] came about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockGrant {
    /// No live lock existed.
    Acquired,
    /// The requester already held the lock; its timestamp was renewed.
    Refreshed,
    /// Another admin's lock had expired and was overwritten.
    TakenOver { previous: LockInfo },
}

/// In-memory per-application review locks with a fixed TTL.
///
/// One mutex guards the whole map and is never held across I/O. Locks live
/// only in this process: a restart drops them all, and two service instances
/// do not see each other's locks.
pub struct ReviewLockManager {
    locks: Mutex<HashMap<i64, LockInfo>>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl ReviewLockManager {
    /// Five minute TTL on the system clock.
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::from_parts(clock, GuardConfig::default().lock_ttl())
    }

    /// Build with the configured TTL. Rejects a zero TTL, which would let any
    /// admin take over a lock the moment it is stored.
    pub fn with_config(clock: Arc<dyn Clock>, config: &GuardConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_parts(clock, config.lock_ttl()))
    }

    fn from_parts(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            clock,
        }
    }

    fn is_expired(&self, lock: &LockInfo, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(lock.acquired_at) >= self.ttl
    }

    /// Claim `application_id` for `admin_id`.
    ///
    /// Re-entrant for the current holder, who gets a fresh timestamp. A live
    /// lock held by someone else is reported back without touching it; an
    /// expired one is overwritten.
    pub fn acquire(
        &self,
        application_id: i64,
        admin_id: i64,
        admin_name: &str,
    ) -> Result<LockGrant, LockConflict> {
        let now = self.clock.now();
        let mut locks = self.locks.lock();

        if let Some(lock) = locks.get_mut(&application_id) {
            if lock.holder_id == admin_id {
                lock.acquired_at = now;
                tracing::debug!(application_id, admin_id, "Review lock refreshed");
                return Ok(LockGrant::Refreshed);
            }
            if !self.is_expired(lock, now) {
                tracing::debug!(
                    application_id,
                    admin_id,
                    holder_id = lock.holder_id,
                    "Review lock held by another admin"
                );
                return Err(LockConflict {
                    holder: lock.clone(),
                });
            }
        }

        let previous = locks.insert(
            application_id,
            LockInfo {
                application_id,
                holder_id: admin_id,
                holder_name: admin_name.to_string(),
                acquired_at: now,
            },
        );

        match previous {
            Some(previous) => {
                tracing::info!(
                    application_id,
                    admin_id,
                    previous_holder_id = previous.holder_id,
                    "Expired review lock taken over"
                );
                Ok(LockGrant::TakenOver { previous })
            }
            None => {
                tracing::debug!(application_id, admin_id, "Review lock acquired");
                Ok(LockGrant::Acquired)
            }
        }
    }

    /// Keep-alive from an open review screen. Same rules as [`acquire`]:
    /// renews the holder's lock, or claims an unlocked or expired record.
    ///
    /// [`acquire`]: ReviewLockManager::acquire
    pub fn refresh(
        &self,
        application_id: i64,
        admin_id: i64,
        admin_name: &str,
    ) -> Result<LockGrant, LockConflict> {
        self.acquire(application_id, admin_id, admin_name)
    }

    /// Drop the lock if `admin_id` holds it. Anyone else is ignored.
    pub fn release(&self, application_id: i64, admin_id: i64) {
        let mut locks = self.locks.lock();
        match locks.get(&application_id) {
            Some(lock) if lock.holder_id == admin_id => {
                locks.remove(&application_id);
                tracing::debug!(application_id, admin_id, "Review lock released");
            }
            Some(lock) => {
                tracing::debug!(
                    application_id,
                    admin_id,
                    holder_id = lock.holder_id,
                    "Ignoring release from non-holder"
                );
            }
            None => {}
        }
    }

    /// `(true, Some(holder))` when another admin holds a live lock,
    /// `(false, None)` when unlocked, expired, or held by `requester_id`.
    pub fn query(&self, application_id: i64, requester_id: i64) -> (bool, Option<LockInfo>) {
        match self.get(application_id) {
            Some(lock) if lock.holder_id != requester_id => (true, Some(lock)),
            _ => (false, None),
        }
    }

    /// Current live lock, whoever holds it.
    pub fn get(&self, application_id: i64) -> Option<LockInfo> {
        let now = self.clock.now();
        self.locks
            .lock()
            .get(&application_id)
            .filter(|lock| !self.is_expired(lock, now))
            .cloned()
    }

    /// Fail with the holder's details if someone other than `requester_id`
    /// holds a live lock.
    pub fn ensure_available(
        &self,
        application_id: i64,
        requester_id: i64,
    ) -> Result<(), LockConflict> {
        match self.query(application_id, requester_id) {
            (true, Some(holder)) => Err(LockConflict { holder }),
            _ => Ok(()),
        }
    }

    /// Remove every expired entry. Returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut locks = self.locks.lock();
        let before = locks.len();
        locks.retain(|_, lock| !self.is_expired(lock, now));
        let removed = before - locks.len();
        tracing::debug!(removed, remaining = locks.len(), "Swept expired review locks");
        removed
    }

    /// Sweep every `interval` on the current tokio runtime.
    #[must_use = "dropping the handle stops the job"]
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
    ) -> Result<BackgroundTask, ConfigError> {
        let locks = Arc::clone(self);
        BackgroundTask::every("review-lock-sweep", interval, move || {
            locks.sweep_expired();
        })
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

impl Default for ReviewLockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const ALICE: i64 = 10;
    const BOB: i64 = 20;

    fn manager() -> (ReviewLockManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        (ReviewLockManager::with_clock(clock.clone()), clock)
    }

    #[test]
    fn first_acquire_creates_entry() {
        let (locks, _) = manager();
        assert_eq!(locks.acquire(1, ALICE, "alice"), Ok(LockGrant::Acquired));
        let lock = locks.get(1).unwrap();
        assert_eq!(lock.holder_id, ALICE);
        assert_eq!(lock.holder_name, "alice");
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn conflict_reports_holder_without_mutation() {
        let (locks, clock) = manager();
        locks.acquire(1, ALICE, "alice").unwrap();
        let before = locks.get(1).unwrap();

        clock.advance(Duration::from_secs(30));
        let conflict = locks.acquire(1, BOB, "bob").unwrap_err();
        assert_eq!(conflict.holder, before);
        assert_eq!(conflict.to_string(), "Application 1 is being reviewed by alice");
        assert_eq!(locks.get(1), Some(before));
    }

    #[test]
    fn holder_reacquire_renews_timestamp() {
        let (locks, clock) = manager();
        locks.acquire(1, ALICE, "alice").unwrap();
        clock.advance(Duration::from_secs(240));
        assert_eq!(locks.refresh(1, ALICE, "alice"), Ok(LockGrant::Refreshed));

        // 240 + 240 seconds since the first acquire, but only 240 since refresh.
        clock.advance(Duration::from_secs(240));
        assert!(locks.acquire(1, BOB, "bob").is_err());
    }

    #[test]
    fn lock_expires_exactly_at_ttl() {
        let (locks, clock) = manager();
        locks.acquire(1, ALICE, "alice").unwrap();

        clock.advance(Duration::from_secs(299));
        assert!(locks.get(1).is_some());

        clock.advance(Duration::from_secs(1));
        assert!(locks.get(1).is_none());
        match locks.acquire(1, BOB, "bob") {
            Ok(LockGrant::TakenOver { previous }) => assert_eq!(previous.holder_id, ALICE),
            other => panic!("unexpected grant: {:?}", other),
        }
        assert_eq!(locks.get(1).unwrap().holder_id, BOB);
    }

    #[test]
    fn only_holder_can_release() {
        let (locks, _) = manager();
        locks.acquire(1, ALICE, "alice").unwrap();
        locks.release(1, BOB);
        assert_eq!(locks.get(1).unwrap().holder_id, ALICE);
        locks.release(1, ALICE);
        assert!(locks.is_empty());
        locks.release(1, ALICE);
    }

    #[test]
    fn query_hides_own_and_expired_locks() {
        let (locks, clock) = manager();
        assert_eq!(locks.query(1, ALICE), (false, None));

        locks.acquire(1, ALICE, "alice").unwrap();
        assert_eq!(locks.query(1, ALICE), (false, None));
        let (locked, holder) = locks.query(1, BOB);
        assert!(locked);
        assert_eq!(holder.unwrap().holder_name, "alice");

        clock.advance(Duration::from_secs(300));
        assert_eq!(locks.query(1, BOB), (false, None));
    }

    #[test]
    fn ensure_available_matches_query() {
        let (locks, _) = manager();
        assert!(locks.ensure_available(1, BOB).is_ok());
        locks.acquire(1, ALICE, "alice").unwrap();
        assert!(locks.ensure_available(1, ALICE).is_ok());
        assert_eq!(locks.ensure_available(1, BOB).unwrap_err().holder.holder_id, ALICE);
    }

    #[test]
    fn locks_are_per_application() {
        let (locks, _) = manager();
        locks.acquire(1, ALICE, "alice").unwrap();
        assert_eq!(locks.acquire(2, BOB, "bob"), Ok(LockGrant::Acquired));
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn sweep_removes_only_expired() {
        let (locks, clock) = manager();
        locks.acquire(1, ALICE, "alice").unwrap();
        clock.advance(Duration::from_secs(200));
        locks.acquire(2, BOB, "bob").unwrap();
        clock.advance(Duration::from_secs(100));

        assert_eq!(locks.sweep_expired(), 1);
        assert!(locks.get(1).is_none());
        assert!(locks.get(2).is_some());
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn custom_ttl_from_config() {
        let clock = Arc::new(ManualClock::starting_now());
        let config = GuardConfig {
            lock_ttl_secs: 10,
            ..GuardConfig::default()
        };
        let locks = ReviewLockManager::with_config(clock.clone(), &config).unwrap();
        locks.acquire(1, ALICE, "alice").unwrap();
        clock.advance(Duration::from_secs(10));
        assert!(locks.acquire(1, BOB, "bob").is_ok());
    }

    #[test]
    fn lock_info_serializes_camel_case() {
        let (locks, _) = manager();
        locks.acquire(7, ALICE, "alice").unwrap();
        let value = serde_json::to_value(locks.get(7).unwrap()).unwrap();
        assert_eq!(value["applicationId"], 7);
        assert_eq!(value["holderName"], "alice");
        assert!(value.get("acquiredAt").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_task_clears_abandoned_locks() {
        let clock = Arc::new(ManualClock::starting_now());
        let locks = Arc::new(ReviewLockManager::with_clock(clock.clone()));
        locks.acquire(1, ALICE, "alice").unwrap();
        let sweeper = locks.spawn_sweeper(Duration::from_secs(60)).unwrap();

        clock.advance(Duration::from_secs(301));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(locks.is_empty());
        assert_eq!(sweeper.name(), "review-lock-sweep");
    }

    #[test]
    fn zero_ttl_config_is_rejected() {
        let config = GuardConfig {
            lock_ttl_secs: 0,
            ..GuardConfig::default()
        };
        let result = ReviewLockManager::with_config(Arc::new(ManualClock::starting_now()), &config);
        assert!(matches!(result, Err(ConfigError::ZeroDuration("lock_ttl_secs"))));
    }

    #[test]
    fn reacquire_keeps_stored_holder_name() {
        let (locks, _) = manager();
        locks.acquire(1, ALICE, "alice").unwrap();
        assert_eq!(locks.acquire(1, ALICE, "Alice L."), Ok(LockGrant::Refreshed));
        assert_eq!(locks.get(1).unwrap().holder_name, "alice");
    }

    #[tokio::test]
    async fn zero_sweep_interval_is_rejected() {
        let (locks, _) = manager();
        let result = Arc::new(locks).spawn_sweeper(Duration::ZERO);
        assert_eq!(result.unwrap_err(), ConfigError::ZeroInterval("review-lock-sweep"));
    }
}
