use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Process-wide migration counters
#[derive(Debug, Default)]
pub struct MigrationMetrics {
    pub records_fetched: AtomicU64,
    pub records_classified: AtomicU64,
    pub classification_fallbacks: AtomicU64,
    pub field_fallbacks: AtomicU64,
    pub writes_succeeded: AtomicU64,
    pub writes_rejected: AtomicU64,
    pub events_delivered: AtomicU64,
    pub events_dropped: AtomicU64,
}

impl MigrationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_fetched(&self, count: usize) {
        self.records_fetched.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_classified(&self) {
        self.records_classified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classification_fallback(&self) {
        self.classification_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_field_fallback(&self) {
        self.field_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self, success: bool) {
        if success {
            self.writes_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.writes_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_delivery(&self, delivered: usize, dropped: usize) {
        self.events_delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        self.events_dropped.fetch_add(dropped as u64, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> MigrationStats {
        MigrationStats {
            records_fetched: self.records_fetched.load(Ordering::Relaxed),
            records_classified: self.records_classified.load(Ordering::Relaxed),
            classification_fallbacks: self.classification_fallbacks.load(Ordering::Relaxed),
            field_fallbacks: self.field_fallbacks.load(Ordering::Relaxed),
            writes_succeeded: self.writes_succeeded.load(Ordering::Relaxed),
            writes_rejected: self.writes_rejected.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Migration metrics: fetched={}, classified={}, unclassified={}, field_fallbacks={}, written={}, rejected={}, events_delivered={}, events_dropped={}",
            stats.records_fetched,
            stats.records_classified,
            stats.classification_fallbacks,
            stats.field_fallbacks,
            stats.writes_succeeded,
            stats.writes_rejected,
            stats.events_delivered,
            stats.events_dropped
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStats {
    pub records_fetched: u64,
    pub records_classified: u64,
    pub classification_fallbacks: u64,
    pub field_fallbacks: u64,
    pub writes_succeeded: u64,
    pub writes_rejected: u64,
    pub events_delivered: u64,
    pub events_dropped: u64,
}

static MIGRATION_METRICS: std::sync::LazyLock<MigrationMetrics> =
    std::sync::LazyLock::new(MigrationMetrics::new);

pub fn migration_metrics() -> &'static MigrationMetrics {
    &MIGRATION_METRICS
}

/// Time a pipeline stage and log its duration when finished
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
