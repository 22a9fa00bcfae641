use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// In-process counters for one or more series. Attach via
/// [`SeriesConfig::metrics`](crate::config::SeriesConfig); all recording is
/// relaxed and never on an error path.
pub struct SeriesMetrics {
    inserts: AtomicU64,
    updates: AtomicU64,
    removes: AtomicU64,
    appends: AtomicU64,
    order_bumps: AtomicU64,
    materializations: AtomicU64,
}

impl SeriesMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inserts: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            removes: AtomicU64::new(0),
            appends: AtomicU64::new(0),
            order_bumps: AtomicU64::new(0),
            materializations: AtomicU64::new(0),
        })
    }

    pub(crate) fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_remove(&self, count: u64) {
        self.removes.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_append(&self, count: u64) {
        self.appends.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_order_bump(&self) {
        self.order_bumps.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_materialization(&self) {
        self.materializations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SeriesMetricsSnapshot {
        SeriesMetricsSnapshot {
            inserts: self.inserts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            appends: self.appends.load(Ordering::Relaxed),
            order_bumps: self.order_bumps.load(Ordering::Relaxed),
            materializations: self.materializations.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeriesMetricsSnapshot {
    pub inserts: u64,
    pub updates: u64,
    pub removes: u64,
    pub appends: u64,
    pub order_bumps: u64,
    pub materializations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_counts() {
        let metrics = SeriesMetrics::new();
        metrics.record_insert();
        metrics.record_insert();
        metrics.record_remove(3);
        metrics.record_order_bump();

        let snap = metrics.snapshot();
        assert_eq!(snap.inserts, 2);
        assert_eq!(snap.removes, 3);
        assert_eq!(snap.order_bumps, 1);
        assert_eq!(snap.materializations, 0);
    }
}
