//! Clock abstraction driving the simulator's real-time pacing.

use async_trait::async_trait;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of "real" time for the tick loop.
///
/// # Implementations
///
/// - **Production**: [`TokioClock`](crate::TokioClock) - wraps `std::time::Instant`
///   and `tokio::time::sleep`
/// - **Tests**: `VirtualClock` (in `hydro_sim`) - sleeping advances a virtual
///   counter instantly, so long runs finish without waiting
///
/// The engine measures run duration, status cadence and sleep remainders
/// exclusively through this trait.
#[async_trait]
pub trait SimClock: Send + Sync + 'static {
    /// Returns the monotonic time elapsed since the clock was created.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time, used for message timestamps.
    fn system_time(&self) -> SystemTime;

    /// Suspends the caller for the given duration.
    async fn sleep(&self, duration: Duration);

    /// Returns the wall-clock time as whole seconds since the Unix epoch.
    fn unix_secs(&self) -> u64 {
        self.system_time()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}
