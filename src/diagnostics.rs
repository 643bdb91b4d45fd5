//! Runtime diagnostics counters.
//!
//! The core keeps no persisted state (`spec.md` §6); what it does keep is a
//! small set of in-memory counters a host application can snapshot and
//! expose however it likes (a sysfs file, a log line, a metrics endpoint —
//! none of which are this crate's concern).

/// A point-in-time snapshot of stack-wide counters. Cheap to copy; intended
/// to be read by a host application on demand, not streamed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StackMetrics {
    /// Sync attempts started (successful or not) across all FIFOs.
    pub sync_attempts: u32,
    /// Times a FIFO moved from `SYNCED` to any other state.
    pub resyncs: u32,
    /// `CANCEL` commands emitted.
    pub cancels: u32,
    /// `CANCEL_ALL` commands emitted.
    pub cancel_alls: u32,
    /// Watchdog timeouts observed (two ticks with no status reply).
    pub watchdog_trips: u32,
    /// Rx pool exhaustion events (LLD told "no buffer").
    pub rx_pool_exhaustions: u32,
    /// Segmentation errors, counted by `spec.md` §4.J error code (index 0 unused).
    pub segmentation_errors_by_code: [u32; 8],
}

impl StackMetrics {
    /// A zeroed snapshot.
    pub const fn new() -> Self {
        Self {
            sync_attempts: 0,
            resyncs: 0,
            cancels: 0,
            cancel_alls: 0,
            watchdog_trips: 0,
            rx_pool_exhaustions: 0,
            segmentation_errors_by_code: [0; 8],
        }
    }
}

/// Accumulates [`StackMetrics`] as the stack runs. Each component holds a
/// reference to the counters it is responsible for incrementing.
#[derive(Debug, Default)]
pub struct DiagnosticsCollector {
    metrics: StackMetrics,
}

impl DiagnosticsCollector {
    /// A fresh collector with all counters at zero.
    pub const fn new() -> Self {
        Self {
            metrics: StackMetrics::new(),
        }
    }

    pub fn record_sync_attempt(&mut self) {
        self.metrics.sync_attempts += 1;
    }

    pub fn record_resync(&mut self) {
        self.metrics.resyncs += 1;
    }

    pub fn record_cancel(&mut self) {
        self.metrics.cancels += 1;
    }

    pub fn record_cancel_all(&mut self) {
        self.metrics.cancel_alls += 1;
    }

    pub fn record_watchdog_trip(&mut self) {
        self.metrics.watchdog_trips += 1;
    }

    pub fn record_rx_pool_exhaustion(&mut self) {
        self.metrics.rx_pool_exhaustions += 1;
    }

    pub fn record_segmentation_error(&mut self, code: crate::error::SegmentationError) {
        let idx = code.code() as usize;
        if idx < self.metrics.segmentation_errors_by_code.len() {
            self.metrics.segmentation_errors_by_code[idx] += 1;
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> StackMetrics {
        self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SegmentationError;

    #[test]
    fn counters_start_at_zero() {
        let c = DiagnosticsCollector::new();
        assert_eq!(c.snapshot(), StackMetrics::new());
    }

    #[test]
    fn segmentation_errors_bucket_by_code() {
        let mut c = DiagnosticsCollector::new();
        c.record_segmentation_error(SegmentationError::DuplicateSignature);
        c.record_segmentation_error(SegmentationError::DuplicateSignature);
        c.record_segmentation_error(SegmentationError::Timeout);
        let snap = c.snapshot();
        assert_eq!(snap.segmentation_errors_by_code[SegmentationError::DuplicateSignature.code() as usize], 2);
        assert_eq!(snap.segmentation_errors_by_code[SegmentationError::Timeout.code() as usize], 1);
    }
}
