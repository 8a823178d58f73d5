//! Virtual clock for deterministic runs.

use async_trait::async_trait;
use hydro_env::SimClock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Clock whose time only moves when someone sleeps on it or advances it.
///
/// Sleeping returns immediately after adding the requested duration, so an
/// hour-long run at a 5 s interval completes in microseconds. Clones share
/// the same time.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    /// Current virtual time (nanoseconds since creation)
    virtual_time_ns: Arc<AtomicU64>,

    /// Wall-clock time corresponding to virtual zero
    epoch: SystemTime,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self {
            virtual_time_ns: Arc::new(AtomicU64::new(0)),
            epoch: UNIX_EPOCH + Duration::from_secs(1_704_067_200), // 2024-01-01 00:00:00 UTC
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Advances virtual time by the given duration.
    pub fn advance(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.virtual_time_ns.fetch_add(nanos, Ordering::SeqCst);
    }

    pub fn time_ns(&self) -> u64 {
        self.virtual_time_ns.load(Ordering::SeqCst)
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SimClock for VirtualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    fn system_time(&self) -> SystemTime {
        self.epoch + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        // Let spawned tasks observe the new time before the caller resumes
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sleep_advances_time() {
        let clock = VirtualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);

        clock.sleep(Duration::from_secs(3600)).await;
        assert_eq!(clock.now(), Duration::from_secs(3600));

        clock.advance(Duration::from_millis(500));
        assert_eq!(clock.now(), Duration::from_millis(3_600_500));
    }

    #[test]
    fn test_clones_share_time() {
        let a = VirtualClock::new();
        let b = a.clone();
        a.advance(Duration::from_secs(5));
        assert_eq!(b.now(), Duration::from_secs(5));
        assert_eq!(b.unix_secs(), 1_704_067_205);
    }
}
