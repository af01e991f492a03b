//! Engine counters
//!
//! Every foreground operation records its outcome here. Operations slower
//! than the frame budget are counted as overruns and logged at `debug`.
//!
//! # Memory Ordering
//!
//! All counters use Relaxed ordering. They are observational and do not
//! synchronize other memory; approximate totals are acceptable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Live counters owned by the coordinator.
#[derive(Debug)]
pub struct EngineMetrics {
    frame_budget: Duration,
    render_hits: AtomicU64,
    render_misses: AtomicU64,
    render_placeholders: AtomicU64,
    stats_hits: AtomicU64,
    stats_misses: AtomicU64,
    searches: AtomicU64,
    search_micros: AtomicU64,
    wal_appends: AtomicU64,
    frame_overruns: AtomicU64,
    pressure_events: AtomicU64,
    background_failures: AtomicU64,
}

/// Foreground operation kinds timed against the frame budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `get_rendered_output` / `render_record`
    Render,
    /// `get_text_stats`
    Stats,
    /// `search`
    Search,
    /// `log_update`
    LogUpdate,
    /// Columnar fetch and scans
    RowAccess,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Operation::Render => "render",
            Operation::Stats => "stats",
            Operation::Search => "search",
            Operation::LogUpdate => "log_update",
            Operation::RowAccess => "row_access",
        }
    }
}

impl EngineMetrics {
    /// Counters for an engine with the given frame budget
    pub fn new(frame_budget: Duration) -> Self {
        EngineMetrics {
            frame_budget,
            render_hits: AtomicU64::new(0),
            render_misses: AtomicU64::new(0),
            render_placeholders: AtomicU64::new(0),
            stats_hits: AtomicU64::new(0),
            stats_misses: AtomicU64::new(0),
            searches: AtomicU64::new(0),
            search_micros: AtomicU64::new(0),
            wal_appends: AtomicU64::new(0),
            frame_overruns: AtomicU64::new(0),
            pressure_events: AtomicU64::new(0),
            background_failures: AtomicU64::new(0),
        }
    }

    /// Frame budget foreground work is measured against
    pub fn frame_budget(&self) -> Duration {
        self.frame_budget
    }

    /// Count an overrun if `started` is further back than the frame budget.
    pub fn finish(&self, op: Operation, started: Instant) -> Duration {
        let elapsed = started.elapsed();
        if elapsed > self.frame_budget {
            self.frame_overruns.fetch_add(1, Ordering::Relaxed);
            debug!(
                target: "framestore::engine",
                op = op.as_str(),
                elapsed_us = elapsed.as_micros() as u64,
                budget_us = self.frame_budget.as_micros() as u64,
                "Frame budget exceeded"
            );
        }
        elapsed
    }

    pub(crate) fn record_render_hit(&self) {
        self.render_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_render_miss(&self) {
        self.render_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_placeholder(&self) {
        self.render_placeholders.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stats(&self, hit: bool) {
        if hit {
            self.stats_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_search(&self, elapsed: Duration) {
        self.searches.fetch_add(1, Ordering::Relaxed);
        self.search_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_wal_append(&self) {
        self.wal_appends.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pressure(&self) {
        self.pressure_events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_background_failure(&self) {
        self.background_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            render_hits: self.render_hits.load(Ordering::Relaxed),
            render_misses: self.render_misses.load(Ordering::Relaxed),
            render_placeholders: self.render_placeholders.load(Ordering::Relaxed),
            stats_hits: self.stats_hits.load(Ordering::Relaxed),
            stats_misses: self.stats_misses.load(Ordering::Relaxed),
            searches: self.searches.load(Ordering::Relaxed),
            search_micros_total: self.search_micros.load(Ordering::Relaxed),
            wal_appends: self.wal_appends.load(Ordering::Relaxed),
            frame_overruns: self.frame_overruns.load(Ordering::Relaxed),
            pressure_events: self.pressure_events.load(Ordering::Relaxed),
            background_failures: self.background_failures.load(Ordering::Relaxed),
        }
    }
}

/// Copy of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Renders served from cache
    pub render_hits: u64,
    /// Renders computed inline
    pub render_misses: u64,
    /// Placeholders returned while a render ran in the background
    pub render_placeholders: u64,
    /// Statistics served from cache
    pub stats_hits: u64,
    /// Statistics computed
    pub stats_misses: u64,
    /// Searches run
    pub searches: u64,
    /// Sum of search latencies in microseconds
    pub search_micros_total: u64,
    /// Updates appended to the log
    pub wal_appends: u64,
    /// Foreground operations slower than the frame budget
    pub frame_overruns: u64,
    /// Memory-pressure rounds handled
    pub pressure_events: u64,
    /// Background tasks that failed or were rejected
    pub background_failures: u64,
}

impl MetricsSnapshot {
    /// Cache hit rate across render lookups (0 when none)
    pub fn render_hit_rate(&self) -> f64 {
        let total = self.render_hits + self.render_misses + self.render_placeholders;
        if total > 0 {
            self.render_hits as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Mean search latency (zero when no searches ran)
    pub fn average_search_latency(&self) -> Duration {
        if self.searches > 0 {
            Duration::from_micros(self.search_micros_total / self.searches)
        } else {
            Duration::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrun_counted_only_past_budget() {
        let metrics = EngineMetrics::new(Duration::from_secs(60));
        metrics.finish(Operation::Render, Instant::now());
        assert_eq!(metrics.snapshot().frame_overruns, 0);

        let tight = EngineMetrics::new(Duration::ZERO);
        let started = Instant::now();
        std::thread::sleep(Duration::from_millis(2));
        tight.finish(Operation::Search, started);
        assert_eq!(tight.snapshot().frame_overruns, 1);
    }

    #[test]
    fn test_rates() {
        let metrics = EngineMetrics::new(Duration::from_millis(16));
        assert_eq!(metrics.snapshot().render_hit_rate(), 0.0);
        metrics.record_render_hit();
        metrics.record_render_hit();
        metrics.record_render_hit();
        metrics.record_placeholder();
        assert_eq!(metrics.snapshot().render_hit_rate(), 0.75);

        metrics.record_search(Duration::from_micros(100));
        metrics.record_search(Duration::from_micros(300));
        assert_eq!(
            metrics.snapshot().average_search_latency(),
            Duration::from_micros(200)
        );
    }
}
