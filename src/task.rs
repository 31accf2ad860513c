//! Periodic background jobs (key rotation, lock sweeping).

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::ConfigError;

/// Handle to a periodic job running on the tokio runtime.
///
/// The job stops when [`BackgroundTask::stop`] is called or the handle is
/// dropped. Jobs do all their work synchronously between ticks, so aborting
/// at the tick await never interrupts a half-finished mutation.
#[derive(Debug)]
#[must_use = "dropping the handle stops the job"]
pub struct BackgroundTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Run `job` every `period`, starting one period from now.
    ///
    /// Must be called from within a tokio runtime. A zero period is rejected.
    pub fn every<F>(name: &'static str, period: Duration, mut job: F) -> Result<Self, ConfigError>
    where
        F: FnMut() + Send + 'static,
    {
        if period.is_zero() {
            return Err(ConfigError::ZeroInterval(name));
        }
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                job();
            }
        });
        tracing::debug!(task = name, period_secs = period.as_secs(), "Background task started");
        Ok(Self { name, handle })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(&self) {
        if !self.handle.is_finished() {
            self.handle.abort();
            tracing::debug!(task = self.name, "Background task stopped");
        }
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn runs_once_per_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let task = BackgroundTask::every("counter", Duration::from_secs(60), move || {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(task.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_the_job() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let task = BackgroundTask::every("counter", Duration::from_secs(10), move || {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        task.stop();
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!task.is_running());
        assert_eq!(task.name(), "counter");
    }

    #[tokio::test]
    async fn zero_period_is_rejected() {
        let result = BackgroundTask::every("spin", Duration::ZERO, || {});
        assert_eq!(result.unwrap_err(), ConfigError::ZeroInterval("spin"));
    }
}
