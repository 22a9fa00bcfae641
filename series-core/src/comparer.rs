use std::cmp::Ordering;
use std::marker::PhantomData;

/// Total order over keys, with an optional arithmetic capability.
///
/// A comparer that answers `Some` from [`diff`](KeyComparer::diff) and
/// [`add`](KeyComparer::add) lets the key store represent an arithmetic
/// progression as `(first, step)` instead of a dense array. The two methods
/// must agree: `diff(add(a, d), a) == Some(d)` for every representable `d`,
/// `diff` is antisymmetric and additive, and `add` preserves ordering.
/// Order-only comparers leave both at the `None` default and force dense
/// storage.
pub trait KeyComparer<K>: Clone + Send + Sync + 'static {
    fn compare(&self, a: &K, b: &K) -> Ordering;

    /// Whether this comparer carries the arithmetic capability. Key stores
    /// consult this once, at construction, to pick their shape.
    fn is_diffable(&self) -> bool {
        false
    }

    /// Signed distance from `b` to `a`, or `None` when the comparer is
    /// order-only or the distance does not fit an `i64`.
    fn diff(&self, a: &K, b: &K) -> Option<i64> {
        let _ = (a, b);
        None
    }

    /// `base` advanced by `delta` steps, or `None` when unsupported or
    /// unrepresentable.
    fn add(&self, base: &K, delta: i64) -> Option<K> {
        let _ = (base, delta);
        None
    }
}

/// Identity arithmetic over `i64` keys (nanosecond timestamps and the like).
#[derive(Clone, Copy, Debug, Default)]
pub struct I64Comparer;

impl KeyComparer<i64> for I64Comparer {
    fn compare(&self, a: &i64, b: &i64) -> Ordering {
        a.cmp(b)
    }

    fn is_diffable(&self) -> bool {
        true
    }

    fn diff(&self, a: &i64, b: &i64) -> Option<i64> {
        a.checked_sub(*b)
    }

    fn add(&self, base: &i64, delta: i64) -> Option<i64> {
        base.checked_add(delta)
    }
}

/// Widening arithmetic over `i32` keys.
#[derive(Clone, Copy, Debug, Default)]
pub struct I32Comparer;

impl KeyComparer<i32> for I32Comparer {
    fn compare(&self, a: &i32, b: &i32) -> Ordering {
        a.cmp(b)
    }

    fn is_diffable(&self) -> bool {
        true
    }

    fn diff(&self, a: &i32, b: &i32) -> Option<i64> {
        Some(*a as i64 - *b as i64)
    }

    fn add(&self, base: &i32, delta: i64) -> Option<i32> {
        (*base as i64).checked_add(delta)?.try_into().ok()
    }
}

/// Arithmetic over `u64` keys; distances outside the `i64` range report
/// `None`, which keeps such stores dense instead of overflowing.
#[derive(Clone, Copy, Debug, Default)]
pub struct U64Comparer;

impl KeyComparer<u64> for U64Comparer {
    fn compare(&self, a: &u64, b: &u64) -> Ordering {
        a.cmp(b)
    }

    fn is_diffable(&self) -> bool {
        true
    }

    fn diff(&self, a: &u64, b: &u64) -> Option<i64> {
        if a >= b {
            (*a - *b).try_into().ok()
        } else {
            let magnitude: i64 = (*b - *a).try_into().ok()?;
            Some(-magnitude)
        }
    }

    fn add(&self, base: &u64, delta: i64) -> Option<u64> {
        if delta >= 0 {
            base.checked_add(delta as u64)
        } else {
            base.checked_sub(delta.unsigned_abs())
        }
    }
}

/// Order-only fallback for any `Ord` key. Stores built over it are always
/// dense.
pub struct OrdComparer<K> {
    _marker: PhantomData<fn() -> K>,
}

impl<K> OrdComparer<K> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<K> Default for OrdComparer<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Clone for OrdComparer<K> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<K: Ord + 'static> KeyComparer<K> for OrdComparer<K> {
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}
