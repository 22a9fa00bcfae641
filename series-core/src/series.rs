use std::cmp::Ordering as CmpOrdering;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, ThreadId};

use parking_lot::RwLock;

use crate::{
    comparer::KeyComparer,
    config::SeriesConfig,
    cursor::SeriesCursor,
    error::{Result, SeriesError},
    keystore::{KeyStore, MAX_CAPACITY},
    lock::VersionedLock,
    notify::UpdateNotifier,
    pool::BufferPool,
    series_metrics::SeriesMetrics,
};

/// Search direction for [`SortedSeries::try_find`] and
/// [`SortedSeries::remove_range`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Where a missed lookup landed relative to the live key range. Streaming
/// cursors use `AfterEnd` to decide whether to await a later append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GapPosition {
    BeforeStart,
    Inside,
    AfterEnd,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FindResult<K, V> {
    Found { index: u32, key: K, value: V },
    Missing(GapPosition),
}

/// Overlap handling for [`SortedSeries::append`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppendPolicy {
    /// Reject any overlap between the incoming first key and the live tail.
    ThrowOnOverlap,
    /// Drop live entries at or beyond the incoming first key, then append.
    DropOldOverlap,
    /// Require the overlapping prefix (if any) to match pointwise, then
    /// append the strict tail of the incoming series.
    IgnoreEqualOverlap,
    /// As `IgnoreEqualOverlap`, but a non-empty overlap is mandatory unless
    /// the target is empty.
    RequireEqualOverlap,
}

/// One consistent image of a series, as consumed by the serialiser.
#[derive(Clone, Debug, PartialEq)]
pub struct SeriesSnapshot<K, V> {
    pub size: u32,
    pub version: u64,
    pub sealed: bool,
    /// True when the keys are an arithmetic progression; `keys` then holds
    /// exactly the two descriptor elements.
    pub regular: bool,
    pub keys: Vec<K>,
    pub values: Vec<V>,
}

/// One published epoch of a series. Never mutated after publication:
/// writers build a fresh state and swap it in, so a reader holding an `Arc`
/// to it always sees a fully-formed image.
pub(crate) struct SeriesState<K, V> {
    pub(crate) version: u64,
    pub(crate) order_version: u64,
    pub(crate) sealed: bool,
    pub(crate) size: u32,
    pub(crate) keys: KeyStore<K>,
    pub(crate) values: Vec<V>,
}

/// Ordered mapping `K -> V` with strictly increasing keys, non-blocking
/// consistent reads, and a space-optimised representation for arithmetically
/// regular keys.
///
/// One writer at a time (enforced by the embedded [`VersionedLock`]) clones
/// the current state into a private working image, mutates it, and publishes
/// it as the next epoch. Readers clone the current epoch's `Arc` and read it
/// without retries; every read is a pre- or post-image of each mutation,
/// never an intermediate. Cursors additionally track
/// [`order_version`](Self::order_version), which moves only when existing
/// entries change position, so pure tail appends never invalidate them.
pub struct SortedSeries<K, V, C> {
    state: RwLock<Arc<SeriesState<K, V>>>,
    lock: VersionedLock,
    synchronized: AtomicBool,
    sealed: AtomicBool,
    owner: ThreadId,
    comparer: C,
    notifier: UpdateNotifier,
    metrics: Option<Arc<SeriesMetrics>>,
    key_pool: Arc<BufferPool<K>>,
    value_pool: Arc<BufferPool<V>>,
}

impl<K: Copy, V: Copy, C: KeyComparer<K>> SortedSeries<K, V, C> {
    pub fn new(comparer: C) -> Self {
        Self::with_config(comparer, SeriesConfig::default())
    }

    pub fn with_config(comparer: C, config: SeriesConfig<K, V>) -> Self {
        let SeriesConfig {
            initial_capacity,
            synchronized,
            key_pool,
            value_pool,
            metrics,
        } = config;
        let keys = KeyStore::new(comparer.is_diffable(), initial_capacity, &key_pool);
        let values = value_pool.rent((initial_capacity as usize).max(4));
        Self {
            state: RwLock::new(Arc::new(SeriesState {
                version: 0,
                order_version: 0,
                sealed: false,
                size: 0,
                keys,
                values,
            })),
            lock: VersionedLock::new(),
            synchronized: AtomicBool::new(synchronized),
            sealed: AtomicBool::new(false),
            owner: thread::current().id(),
            comparer,
            notifier: UpdateNotifier::new(),
            metrics,
            key_pool,
            value_pool,
        }
    }

    /// Builds a series from arbitrary pairs: sorts them, keeps the last
    /// write for duplicate keys, and ingests the result.
    pub fn from_sorted(pairs: impl IntoIterator<Item = (K, V)>, comparer: C) -> Self {
        let mut pairs: Vec<(K, V)> = pairs.into_iter().collect();
        pairs.sort_by(|a, b| comparer.compare(&a.0, &b.0));
        let mut deduped: Vec<(K, V)> = Vec::with_capacity(pairs.len());
        for (k, v) in pairs {
            let duplicate = matches!(
                deduped.last(),
                Some(last) if comparer.compare(&last.0, &k) == CmpOrdering::Equal
            );
            if duplicate {
                let slot = deduped.last_mut().expect("non-empty after match");
                slot.1 = v;
            } else {
                deduped.push((k, v));
            }
        }
        Self::from_parts(deduped, 0, false, comparer).expect("sorted and deduplicated input")
    }

    /// Reconstructs a series from strictly increasing pairs, restoring a
    /// previous `version` and `sealed` state. Used by the serialiser.
    pub fn from_parts(
        pairs: Vec<(K, V)>,
        version: u64,
        sealed: bool,
        comparer: C,
    ) -> Result<Self> {
        let config = SeriesConfig::with_capacity((pairs.len() as u32).max(1));
        let SeriesConfig {
            initial_capacity,
            key_pool,
            value_pool,
            metrics,
            ..
        } = config;
        let mut keys = KeyStore::new(comparer.is_diffable(), initial_capacity, &key_pool);
        let mut values = value_pool.rent((initial_capacity as usize).max(4));
        let mut size = 0u32;
        let mut previous: Option<K> = None;
        for (k, v) in pairs {
            if let Some(prev) = previous {
                if comparer.compare(&k, &prev) != CmpOrdering::Greater {
                    return Err(SeriesError::OutOfOrder);
                }
            }
            keys.append(&comparer, size, k, &key_pool);
            values.push(v);
            previous = Some(k);
            size += 1;
        }
        Ok(Self {
            state: RwLock::new(Arc::new(SeriesState {
                version,
                order_version: 0,
                sealed,
                size,
                keys,
                values,
            })),
            lock: VersionedLock::with_version(version),
            synchronized: AtomicBool::new(!sealed),
            sealed: AtomicBool::new(sealed),
            owner: thread::current().id(),
            comparer,
            notifier: if sealed {
                UpdateNotifier::new_sealed()
            } else {
                UpdateNotifier::new()
            },
            metrics,
            key_pool,
            value_pool,
        })
    }

    pub fn comparer(&self) -> &C {
        &self.comparer
    }

    pub fn notifier(&self) -> &UpdateNotifier {
        &self.notifier
    }

    pub fn version(&self) -> u64 {
        self.lock.version()
    }

    pub fn order_version(&self) -> u64 {
        self.read(|s| s.order_version)
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    pub fn is_synchronized(&self) -> bool {
        self.synchronized.load(Ordering::Acquire)
    }

    pub fn is_regular(&self) -> bool {
        self.read(|s| s.keys.is_regular())
    }

    pub fn len(&self) -> u32 {
        self.read(|s| s.size)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, k: &K) -> Result<V> {
        self.read(|s| {
            let idx = s.keys.index_of(&self.comparer, s.size, k)?;
            if idx >= 0 {
                s.values.get(idx as usize).copied()
            } else {
                None
            }
        })
        .ok_or(SeriesError::NotFound)
    }

    pub fn contains(&self, k: &K) -> bool {
        self.get(k).is_ok()
    }

    pub fn first(&self) -> Result<(K, V)> {
        self.read(|s| self.entry_at(s, 0)).ok_or(SeriesError::Empty)
    }

    pub fn last(&self) -> Result<(K, V)> {
        self.read(|s| {
            if s.size == 0 {
                None
            } else {
                self.entry_at(s, s.size - 1)
            }
        })
        .ok_or(SeriesError::Empty)
    }

    pub fn try_find(&self, k: &K, direction: Lookup) -> FindResult<K, V> {
        self.read(|s| self.find_in(s, k, direction))
    }

    /// All live pairs from one published epoch.
    pub fn to_vec(&self) -> Vec<(K, V)> {
        self.read(|s| {
            (0..s.size)
                .map(|i| self.entry_at(s, i))
                .collect::<Option<Vec<_>>>()
        })
        .expect("published state is consistent")
    }

    /// Insert-or-update.
    pub fn set(&self, k: K, v: V) -> Result<()> {
        self.write(|series, state| {
            let idx = series.index_in(state, &k);
            if idx >= 0 {
                // Value-only update: cursors keep their positions.
                state.values[idx as usize] = v;
                if let Some(metrics) = &series.metrics {
                    metrics.record_update();
                }
            } else {
                series.insert_entry(state, (!idx) as u32, k, v);
            }
            Ok(())
        })
    }

    /// Insert, failing on a duplicate key.
    pub fn add(&self, k: K, v: V) -> Result<()> {
        self.write(|series, state| {
            let idx = series.index_in(state, &k);
            if idx >= 0 {
                return Err(SeriesError::DuplicateKey);
            }
            series.insert_entry(state, (!idx) as u32, k, v);
            Ok(())
        })
    }

    /// Append at the tail; the key must exceed the current maximum.
    pub fn add_last(&self, k: K, v: V) -> Result<()> {
        self.write(|series, state| {
            if state.size > 0 {
                let (last, _) = series
                    .entry_at(state, state.size - 1)
                    .expect("live tail entry");
                if series.comparer.compare(&k, &last) != CmpOrdering::Greater {
                    return Err(SeriesError::OutOfOrder);
                }
            }
            series.insert_entry(state, state.size, k, v);
            Ok(())
        })
    }

    /// Prepend; the key must precede the current minimum.
    pub fn add_first(&self, k: K, v: V) -> Result<()> {
        self.write(|series, state| {
            if state.size > 0 {
                let (first, _) = series.entry_at(state, 0).expect("live head entry");
                if series.comparer.compare(&k, &first) != CmpOrdering::Less {
                    return Err(SeriesError::OutOfOrder);
                }
            }
            series.insert_entry(state, 0, k, v);
            Ok(())
        })
    }

    /// Removes `k` if present; `Ok(false)` when absent.
    pub fn remove(&self, k: &K) -> Result<bool> {
        let k = *k;
        self.write(|series, state| {
            let idx = series.index_in(state, &k);
            if idx < 0 {
                return Ok(false);
            }
            series.remove_span(state, idx as u32, idx as u32 + 1);
            Ok(true)
        })
    }

    pub fn remove_first(&self) -> Result<(K, V)> {
        self.write(|series, state| {
            let entry = series.entry_at(state, 0).ok_or(SeriesError::Empty)?;
            series.remove_span(state, 0, 1);
            Ok(entry)
        })
    }

    pub fn remove_last(&self) -> Result<(K, V)> {
        self.write(|series, state| {
            if state.size == 0 {
                return Err(SeriesError::Empty);
            }
            let entry = series
                .entry_at(state, state.size - 1)
                .expect("live tail entry");
            series.remove_span(state, state.size - 1, state.size);
            Ok(entry)
        })
    }

    /// Removes the pivot selected by `try_find(k, direction)` together with
    /// everything strictly on the named side; `Eq` removes exactly the
    /// pivot. `Ok(false)` when nothing matched.
    pub fn remove_range(&self, k: &K, direction: Lookup) -> Result<bool> {
        let k = *k;
        self.write(|series, state| {
            let index = match series.find_in(state, &k, direction) {
                FindResult::Found { index, .. } => index,
                FindResult::Missing(_) => return Ok(false),
            };
            let (lo, hi) = match direction {
                Lookup::Eq => (index, index + 1),
                Lookup::Lt | Lookup::Le => (0, index + 1),
                Lookup::Gt | Lookup::Ge => (index, state.size),
            };
            series.remove_span(state, lo, hi);
            Ok(true)
        })
    }

    /// Removes every entry.
    pub fn clear(&self) -> Result<()> {
        self.write(|series, state| {
            if state.size > 0 {
                series.remove_span(state, 0, state.size);
            }
            Ok(())
        })
    }

    /// Shrinks key and value buffers to the live size.
    pub fn trim_excess(&self) -> Result<()> {
        self.write(|series, state| {
            let size = state.size;
            state.keys.trim_excess(size, &series.key_pool);
            if state.values.capacity() > state.values.len() {
                let mut exact = Vec::with_capacity(state.values.len());
                exact.extend_from_slice(&state.values);
                let old = std::mem::replace(&mut state.values, exact);
                series.value_pool.give(old);
            }
            Ok(())
        })
    }

    /// Appends a consistent snapshot of `other` under `policy`, returning
    /// how many entries were added. Failed policies leave the series
    /// untouched.
    pub fn append(&self, other: &Self, policy: AppendPolicy) -> Result<u32>
    where
        V: PartialEq,
    {
        let incoming = other.to_vec();
        if incoming.is_empty() {
            if policy == AppendPolicy::RequireEqualOverlap && !self.is_empty() {
                return Err(SeriesError::OverlapMismatch);
            }
            return Ok(0);
        }
        self.write(|series, state| {
            let cmp = &series.comparer;
            let size = state.size;
            let first_incoming = incoming[0].0;
            let overlap_start = {
                let idx = series.index_in(state, &first_incoming);
                if idx >= 0 {
                    idx as u32
                } else {
                    (!idx) as u32
                }
            };
            let appended = match policy {
                AppendPolicy::ThrowOnOverlap => {
                    if overlap_start < size {
                        return Err(SeriesError::OutOfOrder);
                    }
                    series.append_tail(state, &incoming)
                }
                AppendPolicy::DropOldOverlap => {
                    if overlap_start < size {
                        series.remove_span(state, overlap_start, size);
                    }
                    series.append_tail(state, &incoming)
                }
                AppendPolicy::IgnoreEqualOverlap | AppendPolicy::RequireEqualOverlap => {
                    let overlap = (size - overlap_start) as usize;
                    if overlap > incoming.len() {
                        return Err(SeriesError::OverlapMismatch);
                    }
                    if policy == AppendPolicy::RequireEqualOverlap && overlap == 0 && size > 0 {
                        return Err(SeriesError::OverlapMismatch);
                    }
                    for (offset, (k, v)) in incoming[..overlap].iter().enumerate() {
                        let (live_key, live_value) = series
                            .entry_at(state, overlap_start + offset as u32)
                            .expect("live overlap entry");
                        if cmp.compare(&live_key, k) != CmpOrdering::Equal || live_value != *v {
                            return Err(SeriesError::OverlapMismatch);
                        }
                    }
                    series.append_tail(state, &incoming[overlap..])
                }
            };
            if let Some(metrics) = &series.metrics {
                metrics.record_append(appended as u64);
            }
            Ok(appended)
        })
    }

    /// Seals the series: no further mutation, synchronisation disabled.
    /// Idempotent.
    pub fn complete(&self) {
        if self.is_sealed() {
            return;
        }
        {
            let guard = self.lock.write();
            if !self.sealed.load(Ordering::Relaxed) {
                let target = self.lock.version() + 1;
                let current = self.state.read().clone();
                let mut working = self.working_copy(&current, target);
                working.sealed = true;
                self.sealed.store(true, Ordering::Release);
                let old = std::mem::replace(&mut *self.state.write(), Arc::new(working));
                drop(guard);
                drop(current);
                self.recycle(old);
            }
        }
        self.synchronized.store(false, Ordering::Release);
        self.notifier.seal();
    }

    /// A positional cursor over this series. Creating one from a thread
    /// other than the constructor's re-enables synchronised reads.
    pub fn cursor(self: &Arc<Self>) -> SeriesCursor<K, V, C> {
        if thread::current().id() != self.owner && !self.is_sealed() {
            self.synchronized.store(true, Ordering::Release);
        }
        SeriesCursor::new(Arc::clone(self))
    }

    /// One consistent image for the serialiser; regular stores expose only
    /// their two descriptor keys.
    pub fn snapshot(&self) -> SeriesSnapshot<K, V> {
        self.read(|s| {
            let regular = s.keys.is_regular() && s.size >= 2;
            let key_count = if regular { 2 } else { s.size };
            let keys = (0..key_count)
                .map(|i| s.keys.get_at(&self.comparer, s.size, i))
                .collect::<Option<Vec<_>>>()
                .expect("published state is consistent");
            SeriesSnapshot {
                size: s.size,
                version: s.version,
                sealed: s.sealed,
                regular,
                keys,
                values: s.values.clone(),
            }
        })
    }

    // ---- read/write infrastructure -------------------------------------

    /// Runs `f` against the current published epoch. The `Arc` clone keeps
    /// that epoch alive for the duration of the read, so a concurrent
    /// writer can never mutate or free anything `f` observes.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&SeriesState<K, V>) -> R) -> R {
        let snapshot = self.state.read().clone();
        f(&snapshot)
    }

    /// Clones the current epoch into a writer-private image, applies `f`,
    /// and publishes the result as the next epoch. Readers switch over at
    /// the swap; in-flight readers keep their epoch alive through its
    /// reference count.
    fn write<R>(
        &self,
        f: impl FnOnce(&Self, &mut SeriesState<K, V>) -> Result<R>,
    ) -> Result<R> {
        if self.is_sealed() {
            return Err(SeriesError::Sealed);
        }
        let guard = self.lock.write();
        if self.is_sealed() {
            return Err(SeriesError::Sealed);
        }
        let target = self.lock.version() + 1;
        let current = self.state.read().clone();
        let mut working = self.working_copy(&current, target);
        let result = f(self, &mut working);
        match &result {
            Ok(_) => {
                let old = std::mem::replace(&mut *self.state.write(), Arc::new(working));
                drop(guard);
                drop(current);
                self.recycle(old);
                self.notifier.notify();
            }
            Err(_) => {
                // The working image was never published; its buffers are
                // exclusively ours.
                self.key_pool.give(working.keys.into_buf());
                self.value_pool.give(working.values);
                drop(guard);
            }
        }
        result
    }

    fn working_copy(&self, current: &SeriesState<K, V>, version: u64) -> SeriesState<K, V> {
        let keys = current.keys.clone_with(&self.key_pool);
        let mut values = self.value_pool.rent(current.values.capacity().max(4));
        values.extend_from_slice(&current.values);
        SeriesState {
            version,
            order_version: current.order_version,
            sealed: current.sealed,
            size: current.size,
            keys,
            values,
        }
    }

    /// Returns a superseded epoch's buffers to the pool, but only when the
    /// writer holds the last reference; an epoch still pinned by readers is
    /// simply dropped and freed by the final reader.
    fn recycle(&self, old: Arc<SeriesState<K, V>>) {
        if let Ok(state) = Arc::try_unwrap(old) {
            self.key_pool.give(state.keys.into_buf());
            self.value_pool.give(state.values);
        }
    }

    // ---- shared helpers -------------------------------------------------

    pub(crate) fn entry_at(&self, state: &SeriesState<K, V>, index: u32) -> Option<(K, V)> {
        let key = state.keys.get_at(&self.comparer, state.size, index)?;
        let value = state.values.get(index as usize).copied()?;
        Some((key, value))
    }

    pub(crate) fn find_in(&self, state: &SeriesState<K, V>, k: &K, direction: Lookup) -> FindResult<K, V> {
        let size = state.size;
        if size == 0 {
            return FindResult::Missing(GapPosition::AfterEnd);
        }
        let found = |index: u32| match self.entry_at(state, index) {
            Some((key, value)) => FindResult::Found { index, key, value },
            None => FindResult::Missing(GapPosition::Inside),
        };
        let idx = match state.keys.index_of(&self.comparer, size, k) {
            Some(idx) => idx,
            None => return FindResult::Missing(GapPosition::Inside),
        };
        if idx >= 0 {
            let idx = idx as u32;
            match direction {
                Lookup::Eq | Lookup::Le | Lookup::Ge => found(idx),
                Lookup::Lt => {
                    if idx > 0 {
                        found(idx - 1)
                    } else {
                        FindResult::Missing(GapPosition::BeforeStart)
                    }
                }
                Lookup::Gt => {
                    if idx + 1 < size {
                        found(idx + 1)
                    } else {
                        FindResult::Missing(GapPosition::AfterEnd)
                    }
                }
            }
        } else {
            let insertion = (!idx) as u32;
            match direction {
                Lookup::Eq => FindResult::Missing(if insertion == 0 {
                    GapPosition::BeforeStart
                } else if insertion >= size {
                    GapPosition::AfterEnd
                } else {
                    GapPosition::Inside
                }),
                Lookup::Lt | Lookup::Le => {
                    if insertion > 0 {
                        found(insertion - 1)
                    } else {
                        FindResult::Missing(GapPosition::BeforeStart)
                    }
                }
                Lookup::Gt | Lookup::Ge => {
                    if insertion < size {
                        found(insertion)
                    } else {
                        FindResult::Missing(GapPosition::AfterEnd)
                    }
                }
            }
        }
    }

    fn index_in(&self, state: &SeriesState<K, V>, k: &K) -> i32 {
        state
            .keys
            .index_of(&self.comparer, state.size, k)
            .expect("working state is consistent")
    }

    fn insert_entry(&self, state: &mut SeriesState<K, V>, index: u32, k: K, v: V) {
        let size = state.size;
        let demoted = state
            .keys
            .insert_at(&self.comparer, size, index, k, &self.key_pool);
        if state.values.len() == state.values.capacity() {
            let grown = (state.values.capacity() * 2).max(4).min(MAX_CAPACITY);
            let mut replacement = self.value_pool.rent(grown);
            replacement.extend_from_slice(&state.values);
            let old = std::mem::replace(&mut state.values, replacement);
            self.value_pool.give(old);
        }
        state.values.insert(index as usize, v);
        state.size = size + 1;
        if demoted {
            if let Some(metrics) = &self.metrics {
                metrics.record_materialization();
            }
        }
        // A strict tail append leaves existing indices untouched.
        if index != size || demoted {
            self.bump_order(state);
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_insert();
        }
    }

    fn remove_span(&self, state: &mut SeriesState<K, V>, lo: u32, hi: u32) {
        let size = state.size;
        let demoted = if hi - lo == 1 {
            state.keys.remove_at(&self.comparer, size, lo, &self.key_pool)
        } else {
            state
                .keys
                .range_remove(&self.comparer, size, lo, hi, &self.key_pool)
        };
        state.values.drain(lo as usize..hi as usize);
        state.size = size - (hi - lo);
        if demoted {
            if let Some(metrics) = &self.metrics {
                metrics.record_materialization();
            }
        }
        self.bump_order(state);
        if let Some(metrics) = &self.metrics {
            metrics.record_remove((hi - lo) as u64);
        }
    }

    fn append_tail(&self, state: &mut SeriesState<K, V>, pairs: &[(K, V)]) -> u32 {
        for (k, v) in pairs {
            self.insert_entry(state, state.size, *k, *v);
        }
        pairs.len() as u32
    }

    fn bump_order(&self, state: &mut SeriesState<K, V>) {
        state.order_version += 1;
        if let Some(metrics) = &self.metrics {
            metrics.record_order_bump();
        }
    }
}
