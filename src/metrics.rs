//! Lightweight metric primitives, explicitly passed around through an [`Observability`] bundle

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;

/// Default upper bounds of histogram buckets, in seconds
pub const DEFAULT_BUCKETS: [f64; 14] = [
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

/// A histogram with cumulative buckets.
///
/// Each observation increments every bucket whose upper bound is greater than or equal to the value, the implicit
/// `+Inf` bucket always counts every observation.
pub struct Histogram {
    bounds: Vec<f64>,
    state: Mutex<HistogramState>,
}

struct HistogramState {
    buckets: Vec<u64>,
    count: u64,
    sum: f64,
}

/// Point-in-time view of a [`Histogram`]
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    /// Upper bound and cumulative count of each bucket
    pub buckets: Vec<(f64, u64)>,
    /// Count of the `+Inf` bucket
    pub inf: u64,
    pub count: u64,
    pub sum: f64,
}

impl Histogram {
    /// Builds a new histogram with the given bucket upper bounds
    pub fn new(bounds: impl IntoIterator<Item = f64>) -> Self {
        let mut bounds = bounds.into_iter().filter(|b| b.is_finite()).collect::<Vec<_>>();
        bounds.sort_by(f64::total_cmp);
        bounds.dedup();
        Self {
            state: Mutex::new(HistogramState {
                buckets: vec![0; bounds.len()],
                count: 0,
                sum: 0.0,
            }),
            bounds,
        }
    }

    /// Records a value
    pub fn observe(&self, value: f64) {
        let mut state = self.state.lock();
        for (bound, bucket) in self.bounds.iter().zip(state.buckets.iter_mut()) {
            if value <= *bound {
                *bucket += 1;
            }
        }
        state.count += 1;
        state.sum += value;
    }

    /// Records a duration, in seconds
    pub fn observe_duration(&self, elapsed: Duration) {
        self.observe(elapsed.as_secs_f64());
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let state = self.state.lock();
        HistogramSnapshot {
            buckets: self.bounds.iter().copied().zip(state.buckets.iter().copied()).collect(),
            inf: state.count,
            count: state.count,
            sum: state.sum,
        }
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKETS)
    }
}

impl HistogramSnapshot {
    /// Mean of the observed values
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// A monotonic counter
#[derive(Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Named collection of metrics
#[derive(Default)]
pub struct Registry {
    histograms: Mutex<BTreeMap<&'static str, Arc<Histogram>>>,
    counters: Mutex<BTreeMap<&'static str, Arc<Counter>>>,
}

impl Registry {
    /// Retrieves the histogram with the given name, registering it with the default buckets if missing
    pub fn histogram(&self, name: &'static str) -> Arc<Histogram> {
        self.histograms.lock().entry(name).or_default().clone()
    }

    /// Retrieves the counter with the given name, registering it if missing
    pub fn counter(&self, name: &'static str) -> Arc<Counter> {
        self.counters.lock().entry(name).or_default().clone()
    }
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, histogram) in self.histograms.lock().iter() {
            let snapshot = histogram.snapshot();
            writeln!(
                f,
                "{name}: count={} mean={:.3}s",
                snapshot.count,
                snapshot.mean().unwrap_or_default()
            )?;
        }
        for (name, counter) in self.counters.lock().iter() {
            writeln!(f, "{name}: {}", counter.get())?;
        }
        Ok(())
    }
}

/// Bundle of the metrics recorded by the loader, threaded through constructors
#[derive(Clone)]
pub struct Observability {
    pub registry: Arc<Registry>,
    /// Latency of every provider call
    pub provider_latency: Arc<Histogram>,
    /// Latency of a whole enrichment fan-out
    pub enrich_latency: Arc<Histogram>,
    /// Duration of each background refresh
    pub refresh_duration: Arc<Histogram>,
    /// Records replaced by a placeholder because their details couldn't be retrieved
    pub placeholders: Arc<Counter>,
}

impl Observability {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            provider_latency: registry.histogram("provider_call_seconds"),
            enrich_latency: registry.histogram("enrich_seconds"),
            refresh_duration: registry.histogram("refresh_seconds"),
            placeholders: registry.counter("enrich_placeholders_total"),
            registry,
        }
    }
}

impl Default for Observability {
    fn default() -> Self {
        Self::new(Arc::new(Registry::default()))
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_observation_on_bucket_bound() {
        let histogram = Histogram::new([0.1, 0.5, 1.0]);
        histogram.observe(0.5);
        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.buckets, vec![(0.1, 0), (0.5, 1), (1.0, 1)]);
        assert_eq!(snapshot.inf, 1);
    }

    #[test]
    fn test_overflow_only_counts_on_inf() {
        let histogram = Histogram::default();
        histogram.observe(42.0);
        let snapshot = histogram.snapshot();
        assert!(snapshot.buckets.iter().all(|(_, c)| *c == 0));
        assert_eq!(snapshot.buckets.len(), DEFAULT_BUCKETS.len());
        assert_eq!(snapshot.inf, 1);
        assert_eq!(snapshot.mean(), Some(42.0));
    }

    #[test]
    fn test_concurrent_observations() {
        let histogram = Arc::new(Histogram::default());
        let values = (1..=10).map(|i| i as f64 * 0.25).collect::<Vec<_>>();

        thread::scope(|s| {
            for value in &values {
                let histogram = histogram.clone();
                s.spawn(move || histogram.observe(*value));
            }
        });

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.count, 10);
        assert_eq!(snapshot.sum, values.iter().sum::<f64>());
    }

    #[test]
    fn test_registry_reuses_metrics() {
        let registry = Registry::default();
        registry.counter("hits").inc();
        registry.counter("hits").inc();
        assert_eq!(registry.counter("hits").get(), 2);

        let obs = Observability::new(Arc::new(registry));
        obs.provider_latency.observe_duration(Duration::from_millis(20));
        assert_eq!(obs.registry.histogram("provider_call_seconds").snapshot().count, 1);
        assert!(obs.registry.to_string().contains("provider_call_seconds: count=1"));
    }
}
