use std::sync::Arc;

use crate::{pool::BufferPool, series_metrics::SeriesMetrics};

pub const DEFAULT_INITIAL_CAPACITY: u32 = 16;

/// Construction-time knobs for a series. Pools may be shared across many
/// series; metrics are optional and shared the same way.
#[derive(Clone)]
pub struct SeriesConfig<K, V> {
    pub initial_capacity: u32,
    /// Single-writer bookkeeping flag: cleared on seal, re-asserted when a
    /// cursor is created from a thread other than the constructor's.
    pub synchronized: bool,
    pub key_pool: Arc<BufferPool<K>>,
    pub value_pool: Arc<BufferPool<V>>,
    pub metrics: Option<Arc<SeriesMetrics>>,
}

impl<K, V> SeriesConfig<K, V> {
    pub fn with_capacity(initial_capacity: u32) -> Self {
        Self {
            initial_capacity,
            ..Self::default()
        }
    }

    pub fn with_pools(key_pool: Arc<BufferPool<K>>, value_pool: Arc<BufferPool<V>>) -> Self {
        Self {
            key_pool,
            value_pool,
            ..Self::default()
        }
    }
}

impl<K, V> Default for SeriesConfig<K, V> {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            synchronized: true,
            key_pool: BufferPool::shared(),
            value_pool: BufferPool::shared(),
            metrics: None,
        }
    }
}
