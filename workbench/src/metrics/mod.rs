//! Request, error and latency aggregates for the `/metrics` endpoint.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::cache::{CacheStats, ResponseCache};
use crate::models::ChatTimings;

pub const DEFAULT_SAMPLE_CAPACITY: usize = 20;

/// Mean over every recorded sample; percentiles over the retained window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FieldSummary {
    pub average_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TimingSummary {
    pub retrieve_ms: FieldSummary,
    pub web_ms: FieldSummary,
    pub generate_ms: FieldSummary,
    pub total_ms: FieldSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MetricsSnapshot {
    pub requests_by_path: BTreeMap<String, u64>,
    pub errors_by_path: BTreeMap<String, u64>,
    pub timings: TimingSummary,
    pub cache: CacheStats,
    /// Samples currently held in the window.
    pub sample_count: usize,
    /// Samples recorded since startup.
    pub total_samples: u64,
    pub samples: Vec<ChatTimings>,
}

#[derive(Default)]
struct Registry {
    requests_by_path: BTreeMap<String, u64>,
    errors_by_path: BTreeMap<String, u64>,
    samples: VecDeque<ChatTimings>,
    sums: ChatTimings,
    total_samples: u64,
}

#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Mutex<Registry>>,
    capacity: usize,
    cache: ResponseCache,
}

impl MetricsRegistry {
    pub fn new(capacity: usize, cache: ResponseCache) -> Self {
        let capacity = capacity.max(1);
        Self {
            registry: Arc::new(Mutex::new(Registry {
                samples: VecDeque::with_capacity(capacity),
                ..Registry::default()
            })),
            capacity,
            cache,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_request(&self, path: &str) {
        *self
            .lock()
            .requests_by_path
            .entry(path.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_error(&self, path: &str) {
        *self
            .lock()
            .errors_by_path
            .entry(path.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_timing(&self, sample: &ChatTimings) {
        let mut registry = self.lock();
        if registry.samples.len() == self.capacity {
            registry.samples.pop_front();
        }
        registry.samples.push_back(*sample);

        registry.sums.retrieve_ms += sample.retrieve_ms;
        registry.sums.web_ms += sample.web_ms;
        registry.sums.generate_ms += sample.generate_ms;
        registry.sums.total_ms += sample.total_ms;
        registry.total_samples += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let registry = self.lock();
        let samples: Vec<ChatTimings> = registry.samples.iter().copied().collect();
        let count = registry.total_samples;

        let timings = TimingSummary {
            retrieve_ms: summarize(&samples, registry.sums.retrieve_ms, count, |t| t.retrieve_ms),
            web_ms: summarize(&samples, registry.sums.web_ms, count, |t| t.web_ms),
            generate_ms: summarize(&samples, registry.sums.generate_ms, count, |t| t.generate_ms),
            total_ms: summarize(&samples, registry.sums.total_ms, count, |t| t.total_ms),
        };

        MetricsSnapshot {
            requests_by_path: registry.requests_by_path.clone(),
            errors_by_path: registry.errors_by_path.clone(),
            timings,
            cache: self.cache.stats(),
            sample_count: samples.len(),
            total_samples: count,
            samples,
        }
    }
}

fn summarize(
    samples: &[ChatTimings],
    sum: f64,
    count: u64,
    pick: impl Fn(&ChatTimings) -> f64,
) -> FieldSummary {
    let mut window: Vec<f64> = samples.iter().map(pick).collect();
    window.sort_by(f64::total_cmp);
    FieldSummary {
        average_ms: if count == 0 { 0.0 } else { sum / count as f64 },
        p50_ms: percentile(&window, 0.50),
        p95_ms: percentile(&window, 0.95),
    }
}

/// Nearest-rank percentile of an ascending slice: index `ceil(p * n) - 1`,
/// clamped to the slice bounds. Empty input yields 0.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    let rank = (p * n as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(n - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn timing(generate_ms: f64) -> ChatTimings {
        ChatTimings {
            retrieve_ms: 10.0,
            web_ms: 0.0,
            generate_ms,
            total_ms: generate_ms + 10.0,
        }
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let values: Vec<f64> = (1..=20).map(f64::from).collect();
        assert_eq!(percentile(&values, 0.50), 10.0);
        assert_eq!(percentile(&values, 0.95), 19.0);
        assert_eq!(percentile(&[7.0], 0.95), 7.0);
        assert_eq!(percentile(&[1.0, 2.0, 3.0], 0.0), 1.0);
        assert_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn test_counts_requests_and_errors_by_path() {
        let metrics = MetricsRegistry::new(20, ResponseCache::disabled());
        metrics.record_request("/chat");
        metrics.record_request("/chat");
        metrics.record_request("/search");
        metrics.record_error("/chat");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_by_path.get("/chat"), Some(&2));
        assert_eq!(snapshot.requests_by_path.get("/search"), Some(&1));
        assert_eq!(snapshot.errors_by_path.get("/chat"), Some(&1));
        assert_eq!(snapshot.errors_by_path.get("/search"), None);
    }

    #[test]
    fn test_ring_buffer_keeps_most_recent() {
        let metrics = MetricsRegistry::new(3, ResponseCache::disabled());
        for ms in [1.0, 2.0, 3.0, 4.0, 5.0] {
            metrics.record_timing(&timing(ms));
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sample_count, 3);
        assert_eq!(snapshot.total_samples, 5);
        let kept: Vec<f64> = snapshot.samples.iter().map(|t| t.generate_ms).collect();
        assert_eq!(kept, vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_average_covers_all_samples_percentiles_cover_window() {
        let metrics = MetricsRegistry::new(2, ResponseCache::disabled());
        for ms in [100.0, 200.0, 300.0, 400.0] {
            metrics.record_timing(&timing(ms));
        }

        let generate = metrics.snapshot().timings.generate_ms;
        assert!((generate.average_ms - 250.0).abs() < 1e-9);
        assert_eq!(generate.p50_ms, 300.0);
        assert_eq!(generate.p95_ms, 400.0);
    }

    #[test]
    fn test_empty_snapshot_is_zeroed() {
        let metrics = MetricsRegistry::new(20, ResponseCache::disabled());
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sample_count, 0);
        assert_eq!(snapshot.timings, TimingSummary::default());
        assert!(snapshot.samples.is_empty());
    }

    #[test]
    fn test_snapshot_reports_cache_counters() {
        let cache = ResponseCache::new(&crate::config::CacheConfig::default());
        let metrics = MetricsRegistry::new(20, cache.clone());
        let key = crate::cache::CacheKey::for_search("dev", "q", 5, None);
        assert!(cache.search().get(&key).is_none());

        assert_eq!(metrics.snapshot().cache.search_misses, 1);
    }

    #[test]
    fn test_concurrent_recording() {
        let metrics = MetricsRegistry::new(20, ResponseCache::disabled());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        metrics.record_request("/chat");
                        metrics.record_timing(&timing(f64::from(i)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_by_path.get("/chat"), Some(&400));
        assert_eq!(snapshot.total_samples, 400);
        assert_eq!(snapshot.sample_count, 20);
    }
}
