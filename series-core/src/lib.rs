//! Mutable sorted keyed series with concurrent cursors.
//!
//! [`SortedSeries`] maps strictly increasing keys to values and lets one
//! writer mutate while readers and cursors proceed against immutable
//! published epochs, validated by a versioned lock. Arithmetically regular
//! key runs are stored as a `(first, step)` descriptor instead of a dense
//! array.
//!
//! The crate exposes:
//! - [`SortedSeries`]: the ordered mapping with insert/remove/lookup,
//!   range removal, and policy-driven append.
//! - [`SeriesCursor`]: bidirectional positional iteration that survives
//!   concurrent tail appends and fails fast on structural change.
//! - [`UpdateNotifier`]: the edge-triggered signal streaming consumers use
//!   to await new data.
//! - [`KeyComparer`]: the ordering seam, with optional key arithmetic.

pub mod comparer;
pub mod config;
pub mod cursor;
pub mod error;
pub mod keystore;
pub mod lock;
pub mod notify;
pub mod pool;
pub mod series;
pub mod series_metrics;

pub use comparer::{I32Comparer, I64Comparer, KeyComparer, OrdComparer, U64Comparer};
pub use config::{SeriesConfig, DEFAULT_INITIAL_CAPACITY};
pub use cursor::{CursorInvalidated, CursorMode, SeriesCursor};
pub use error::{Result, SeriesError};
pub use keystore::KeyStore;
pub use lock::VersionedLock;
pub use notify::{UpdateNotifier, UpdateSignal};
pub use pool::BufferPool;
pub use series::{
    AppendPolicy, FindResult, GapPosition, Lookup, SeriesSnapshot, SortedSeries,
};
pub use series_metrics::{SeriesMetrics, SeriesMetricsSnapshot};
