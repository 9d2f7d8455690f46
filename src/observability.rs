use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{info, warn};

/// Live-sync counters, one set per coordinator.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    pub events_received: AtomicU64,
    pub refetches: AtomicU64,
    pub refetch_errors: AtomicU64,
    pub polls: AtomicU64,
    pub fallbacks: AtomicU64,
    pub alerts_emitted: AtomicU64,
    pub gate_rejections: AtomicU64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refetch(&self) {
        self.refetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refetch_error(&self) {
        self.refetch_errors.fetch_add(1, Ordering::Relaxed);
        warn!("Refetch failed, keeping last good view");
    }

    pub fn record_poll(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert(&self) {
        self.alerts_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gate_rejection(&self) {
        self.gate_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> SyncStats {
        SyncStats {
            events_received: self.events_received.load(Ordering::Relaxed),
            refetches: self.refetches.load(Ordering::Relaxed),
            refetch_errors: self.refetch_errors.load(Ordering::Relaxed),
            polls: self.polls.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            alerts_emitted: self.alerts_emitted.load(Ordering::Relaxed),
            gate_rejections: self.gate_rejections.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Sync metrics: events={}, refetches={}, refetch_errors={}, polls={}, fallbacks={}, alerts={}, gate_rejections={}",
            stats.events_received,
            stats.refetches,
            stats.refetch_errors,
            stats.polls,
            stats.fallbacks,
            stats.alerts_emitted,
            stats.gate_rejections
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncStats {
    pub events_received: u64,
    pub refetches: u64,
    pub refetch_errors: u64,
    pub polls: u64,
    pub fallbacks: u64,
    pub alerts_emitted: u64,
    pub gate_rejections: u64,
}

/// Time an operation and log its duration when finished
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = SyncMetrics::new();
        metrics.record_event();
        metrics.record_event();
        metrics.record_refetch();
        metrics.record_fallback();

        let stats = metrics.get_stats();
        assert_eq!(stats.events_received, 2);
        assert_eq!(stats.refetches, 1);
        assert_eq!(stats.fallbacks, 1);
        assert_eq!(stats.polls, 0);
    }
}
