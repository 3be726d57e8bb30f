use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics tracking
pub struct Metrics {
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub transforms: AtomicU64,
    pub errors: AtomicU64,
    pub uploads: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            transforms: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            uploads: AtomicU64::new(0),
        }
    }

    /// Cache hit rate in percent, 0 before the first lookup.
    pub fn hit_rate_percent(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let total = hits + self.cache_misses.load(Ordering::Relaxed);
        if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Prometheus text exposition of all counters.
    pub fn render_prometheus(&self) -> String {
        let counters = [
            (
                "albumkit_cache_hits_total",
                "Total number of derived-image cache hits",
                &self.cache_hits,
            ),
            (
                "albumkit_cache_misses_total",
                "Total number of derived-image cache misses",
                &self.cache_misses,
            ),
            (
                "albumkit_transforms_total",
                "Total number of image transformations",
                &self.transforms,
            ),
            (
                "albumkit_errors_total",
                "Total number of server errors",
                &self.errors,
            ),
            (
                "albumkit_uploads_total",
                "Total number of accepted uploads",
                &self.uploads,
            ),
        ];
        let mut out = String::new();
        for (name, help, counter) in counters {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {}\n",
                counter.load(Ordering::Relaxed)
            ));
        }
        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static::lazy_static! {
    pub static ref METRICS: Metrics = Metrics::new();
}
