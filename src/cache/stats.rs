use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Counters of the cache lookups and background refreshes, guarded by a single mutex
#[derive(Default)]
pub struct CacheMetrics(Mutex<MetricsSnapshot>);

/// Point-in-time view of the [`CacheMetrics`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub stale_hits: u64,
    /// Refreshes queued for the background workers
    pub refreshes_queued: u64,
    /// Refreshes dropped because the queue was full
    pub refreshes_dropped: u64,
    pub refresh_attempts: u64,
    pub refresh_successes: u64,
    pub refresh_failures: u64,
    pub last_refresh: Option<DateTime<Utc>>,
    pub total_refresh_time: Duration,
}

impl CacheMetrics {
    pub fn record_hit(&self) {
        self.0.lock().hits += 1;
    }

    pub fn record_miss(&self) {
        self.0.lock().misses += 1;
    }

    pub fn record_stale_hit(&self) {
        self.0.lock().stale_hits += 1;
    }

    pub fn record_queued(&self) {
        self.0.lock().refreshes_queued += 1;
    }

    pub fn record_dropped(&self) {
        self.0.lock().refreshes_dropped += 1;
    }

    /// Records a successful refresh that took `elapsed`, finished at `at`
    pub fn record_refresh_success(&self, elapsed: Duration, at: DateTime<Utc>) {
        let mut m = self.0.lock();
        m.refresh_attempts += 1;
        m.refresh_successes += 1;
        m.total_refresh_time += elapsed;
        m.last_refresh = Some(at);
    }

    pub fn record_refresh_failure(&self) {
        let mut m = self.0.lock();
        m.refresh_attempts += 1;
        m.refresh_failures += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.0.lock().clone()
    }
}

impl MetricsSnapshot {
    /// Total number of lookups
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses + self.stale_hits
    }

    /// Ratio of the lookups served from the cache, stale or not, in `[0, 1]`
    pub fn hit_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            total => (self.hits + self.stale_hits) as f64 / total as f64,
        }
    }

    /// Average duration of the successful refreshes
    pub fn average_refresh_time(&self) -> Option<Duration> {
        u32::try_from(self.refresh_successes)
            .ok()
            .filter(|n| *n > 0)
            .map(|n| self.total_refresh_time / n)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_hit_rate_bounds() {
        let metrics = CacheMetrics::default();
        assert_eq!(metrics.snapshot().hit_rate(), 0.0);

        metrics.record_miss();
        assert_eq!(metrics.snapshot().hit_rate(), 0.0);
        metrics.record_hit();
        metrics.record_stale_hit();
        metrics.record_hit();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.lookups(), 4);
        assert_eq!(snapshot.hit_rate(), 0.75);
        assert!((0.0..=1.0).contains(&snapshot.hit_rate()));
    }

    #[test]
    fn test_refresh_timings() {
        let metrics = CacheMetrics::default();
        assert_eq!(metrics.snapshot().average_refresh_time(), None);

        let now = Utc::now();
        metrics.record_refresh_success(Duration::from_millis(100), now);
        metrics.record_refresh_success(Duration::from_millis(300), now);
        metrics.record_refresh_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.refresh_attempts, 3);
        assert_eq!(snapshot.refresh_failures, 1);
        assert_eq!(snapshot.last_refresh, Some(now));
        assert_eq!(snapshot.average_refresh_time(), Some(Duration::from_millis(200)));
    }
}
