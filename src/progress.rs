//! Progress telemetry for long-running queries.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::protocol::QueryStats;

/// Consumer-supplied observer for query progress.
///
/// Registered per query with
/// [`QueryBuilder::progress_callback`](crate::QueryBuilder::progress_callback)
/// and [`QueryBuilder::progress_period`](crate::QueryBuilder::progress_period);
/// both must be set together.
pub trait ProgressUpdater: Send + Sync {
    /// Called immediately when the query starts, when the query state
    /// changes, and at most once per configured period while pages arrive.
    fn update(&self, info: QueryProgressInfo);
}

/// Snapshot passed to a [`ProgressUpdater`].
#[derive(Debug, Clone)]
pub struct QueryProgressInfo {
    pub query_id: String,
    pub stats: QueryStats,
}

/// Connection-level observer slot with callback bookkeeping.
#[derive(Default)]
pub(crate) struct ProgressTracker {
    pub updater: Option<Arc<dyn ProgressUpdater>>,
    pub period: Duration,
    last_callback_time: Option<Instant>,
    last_query_state: String,
}

impl ProgressTracker {
    /// Records that an event fired for `state` at `now`.
    pub fn mark(&mut self, now: Instant, state: &str) {
        self.last_callback_time = Some(now);
        self.last_query_state = state.to_string();
    }

    /// Decides whether an event should fire for `state`, updating the
    /// bookkeeping when it should. Events are suppressed while the period
    /// has not elapsed and the query state is unchanged.
    pub fn should_fire(&mut self, now: Instant, state: &str) -> bool {
        if self.updater.is_none() {
            return false;
        }
        if let Some(last) = self.last_callback_time {
            if now.duration_since(last) < self.period && self.last_query_state == state {
                return false;
            }
        }
        self.mark(now, state);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopUpdater;

    impl ProgressUpdater for NoopUpdater {
        fn update(&self, _info: QueryProgressInfo) {}
    }

    fn tracker(period: Duration) -> ProgressTracker {
        ProgressTracker {
            updater: Some(Arc::new(NoopUpdater)),
            period,
            ..Default::default()
        }
    }

    #[test]
    fn test_fires_without_prior_callback() {
        let mut tracker = tracker(Duration::from_secs(1));
        assert!(tracker.should_fire(Instant::now(), "RUNNING"));
    }

    #[test]
    fn test_suppressed_within_period_for_same_state() {
        let mut tracker = tracker(Duration::from_secs(60));
        let start = Instant::now();
        assert!(tracker.should_fire(start, "RUNNING"));
        assert!(!tracker.should_fire(start + Duration::from_millis(10), "RUNNING"));
    }

    #[test]
    fn test_state_change_fires_within_period() {
        let mut tracker = tracker(Duration::from_secs(60));
        let start = Instant::now();
        assert!(tracker.should_fire(start, "QUEUED"));
        assert!(tracker.should_fire(start + Duration::from_millis(10), "RUNNING"));
    }

    #[test]
    fn test_elapsed_period_fires_for_same_state() {
        let mut tracker = tracker(Duration::from_millis(5));
        let start = Instant::now();
        assert!(tracker.should_fire(start, "RUNNING"));
        assert!(tracker.should_fire(start + Duration::from_millis(10), "RUNNING"));
    }

    #[test]
    fn test_never_fires_without_updater() {
        let mut tracker = ProgressTracker::default();
        assert!(!tracker.should_fire(Instant::now(), "RUNNING"));
    }
}
