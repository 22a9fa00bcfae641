use std::cmp::Ordering;

use crate::{comparer::KeyComparer, pool::BufferPool};

/// Hard cap on element capacity; indices are encoded into `i32`.
pub const MAX_CAPACITY: usize = i32::MAX as usize;

const MIN_DENSE_CAPACITY: usize = 4;

/// Key storage with two physical shapes behind one "index -> key" contract.
///
/// Dense stores keep every key in a sorted buffer. Regular stores keep only
/// `[first, second]` and derive key `i` as `first + i * step`; they demote to
/// dense the moment an insert breaks the progression, and are never promoted
/// back. The logical entry count lives in the owning series and is passed
/// into every call.
///
/// Mutating methods require exclusive access (`&mut self`); the owning
/// series only mutates a writer-private image that no reader can observe, so
/// buffers replaced by growth or materialisation go back to the pool
/// immediately. Read-side methods (`get_at`, `index_of`, `step`) are
/// bounds-safe and return `None` rather than panic on an out-of-range index.
pub struct KeyStore<K> {
    buf: Vec<K>,
    regular: bool,
}

impl<K: Copy> KeyStore<K> {
    /// `regular` should be the comparer's diffable capability; order-only
    /// comparers always get a dense store.
    pub fn new(regular: bool, initial_capacity: u32, pool: &BufferPool<K>) -> Self {
        if regular {
            // Regular stores hold at most the two descriptor keys.
            Self {
                buf: pool.rent(2),
                regular: true,
            }
        } else {
            Self {
                buf: pool.rent((initial_capacity as usize).max(MIN_DENSE_CAPACITY)),
                regular: false,
            }
        }
    }

    pub fn is_regular(&self) -> bool {
        self.regular
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Deep copy backed by a freshly rented buffer.
    pub fn clone_with(&self, pool: &BufferPool<K>) -> Self {
        let mut buf = pool.rent(self.buf.capacity().max(2));
        buf.extend_from_slice(&self.buf);
        Self {
            buf,
            regular: self.regular,
        }
    }

    /// Releases the backing buffer, e.g. for return to a pool.
    pub fn into_buf(self) -> Vec<K> {
        self.buf
    }

    /// Constant step of a regular store with at least two entries.
    pub fn step<C: KeyComparer<K>>(&self, cmp: &C, size: u32) -> Option<i64> {
        if !self.regular || size < 2 {
            return None;
        }
        let first = self.buf.first()?;
        let second = self.buf.get(1)?;
        cmp.diff(second, first)
    }

    pub fn get_at<C: KeyComparer<K>>(&self, cmp: &C, size: u32, index: u32) -> Option<K> {
        if index >= size {
            return None;
        }
        if !self.regular || index < 2 {
            return self.buf.get(index as usize).copied();
        }
        let first = *self.buf.first()?;
        let step = self.step(cmp, size)?;
        let delta = step.checked_mul(index as i64)?;
        cmp.add(&first, delta)
    }

    /// Index of `k`, or the bitwise-complement encoding `!insertion_point`
    /// when absent.
    pub fn index_of<C: KeyComparer<K>>(&self, cmp: &C, size: u32, k: &K) -> Option<i32> {
        if size == 0 {
            return Some(!0);
        }
        if !self.regular {
            let keys = self.buf.get(..size as usize)?;
            return Some(match keys.binary_search_by(|probe| cmp.compare(probe, k)) {
                Ok(found) => found as i32,
                Err(insertion) => !(insertion as i32),
            });
        }
        let first = self.buf.first()?;
        if size == 1 {
            return Some(match cmp.compare(k, first) {
                Ordering::Equal => 0,
                Ordering::Less => !0,
                Ordering::Greater => !1,
            });
        }
        let step = self.step(cmp, size)?;
        let delta = match cmp.diff(k, first) {
            Some(delta) => delta,
            // Too far from `first` to measure; it is off one end.
            None => {
                return Some(if cmp.compare(k, first) == Ordering::Less {
                    !0
                } else {
                    !(size as i32)
                });
            }
        };
        let quotient = delta.div_euclid(step);
        let remainder = delta.rem_euclid(step);
        if remainder == 0 {
            if (0..size as i64).contains(&quotient) {
                return Some(quotient as i32);
            }
            return Some(if quotient < 0 { !0 } else { !(size as i32) });
        }
        let insertion = (quotient + 1).clamp(0, size as i64);
        Some(!(insertion as i32))
    }

    /// Inserts `k` at `index`, shifting later keys. Returns `true` when the
    /// insert demoted a regular store to dense. The caller has already
    /// resolved the insertion point; a collision with a stored key here is a
    /// programmer error and aborts.
    pub fn insert_at<C: KeyComparer<K>>(
        &mut self,
        cmp: &C,
        size: u32,
        index: u32,
        k: K,
        pool: &BufferPool<K>,
    ) -> bool {
        if !self.regular {
            self.dense_insert(cmp, size, index, k, pool);
            return false;
        }
        match size {
            0 => {
                self.buf.push(k);
                false
            }
            1 => {
                let existing = self.buf[0];
                let (first, second) = if index == 0 { (k, existing) } else { (existing, k) };
                match cmp.diff(&second, &first) {
                    Some(step) if step > 0 => {
                        self.buf.clear();
                        self.buf.push(first);
                        self.buf.push(second);
                        false
                    }
                    _ => {
                        self.materialize(cmp, size, size + 1, pool);
                        self.dense_insert(cmp, size, index, k, pool);
                        true
                    }
                }
            }
            _ => {
                let step = self.step(cmp, size).expect("regular store step");
                let first = self.buf[0];
                let probe = cmp.diff(&k, &first);
                let tail_delta = step.checked_mul(size as i64);
                if index == size && probe.is_some() && probe == tail_delta {
                    // Step-aligned append; the descriptor pair is unchanged.
                    false
                } else if index == 0 && probe == Some(-step) {
                    self.buf[1] = self.buf[0];
                    self.buf[0] = k;
                    false
                } else {
                    self.materialize(cmp, size, size + 1, pool);
                    self.dense_insert(cmp, size, index, k, pool);
                    true
                }
            }
        }
    }

    pub fn append<C: KeyComparer<K>>(
        &mut self,
        cmp: &C,
        size: u32,
        k: K,
        pool: &BufferPool<K>,
    ) -> bool {
        self.insert_at(cmp, size, size, k, pool)
    }

    /// Removes the key at `index`, shifting later keys down. Returns `true`
    /// when an interior removal demoted a regular store.
    pub fn remove_at<C: KeyComparer<K>>(
        &mut self,
        cmp: &C,
        size: u32,
        index: u32,
        pool: &BufferPool<K>,
    ) -> bool {
        debug_assert!(index < size);
        if !self.regular {
            self.buf.remove(index as usize);
            return false;
        }
        match size {
            1 => {
                self.buf.clear();
                false
            }
            2 => {
                if index == 0 {
                    self.buf[0] = self.buf[1];
                }
                self.buf.truncate(1);
                false
            }
            _ => {
                if index == size - 1 {
                    false
                } else if index == 0 {
                    let step = self.step(cmp, size).expect("regular store step");
                    let second = self.buf[1];
                    self.buf[0] = second;
                    self.buf[1] = cmp.add(&second, step).expect("regular key arithmetic");
                    false
                } else {
                    self.materialize(cmp, size, size, pool);
                    self.buf.remove(index as usize);
                    true
                }
            }
        }
    }

    /// Removes the index range `[lo, hi)`. Returns `true` on demotion.
    pub fn range_remove<C: KeyComparer<K>>(
        &mut self,
        cmp: &C,
        size: u32,
        lo: u32,
        hi: u32,
        pool: &BufferPool<K>,
    ) -> bool {
        debug_assert!(lo < hi && hi <= size);
        if !self.regular {
            self.buf.drain(lo as usize..hi as usize);
            return false;
        }
        let remaining = size - (hi - lo);
        if remaining == 0 {
            self.buf.clear();
            return false;
        }
        if hi == size {
            // Suffix removal leaves the descriptor prefix intact.
            self.buf.truncate((remaining as usize).min(2));
            return false;
        }
        if lo == 0 {
            let step = self.step(cmp, size).expect("regular store step");
            let first = self.buf[0];
            let new_first = cmp
                .add(&first, step * hi as i64)
                .expect("regular key arithmetic");
            self.buf.clear();
            self.buf.push(new_first);
            if remaining >= 2 {
                self.buf
                    .push(cmp.add(&new_first, step).expect("regular key arithmetic"));
            }
            return false;
        }
        self.materialize(cmp, size, size, pool);
        self.buf.drain(lo as usize..hi as usize);
        true
    }

    /// Expands a regular store into a dense buffer with room for at least
    /// `min_capacity` keys; the descriptor buffer goes back to the pool.
    pub fn materialize<C: KeyComparer<K>>(
        &mut self,
        cmp: &C,
        size: u32,
        min_capacity: u32,
        pool: &BufferPool<K>,
    ) {
        debug_assert!(self.regular);
        let capacity = (min_capacity as usize)
            .max(MIN_DENSE_CAPACITY)
            .next_power_of_two()
            .min(MAX_CAPACITY);
        let mut dense = pool.rent(capacity);
        if size > 0 {
            let first = self.buf[0];
            dense.push(first);
            if size > 1 {
                let step = self.step(cmp, size).expect("regular store step");
                dense.push(self.buf[1]);
                for index in 2..size as i64 {
                    dense.push(cmp.add(&first, step * index).expect("regular key arithmetic"));
                }
            }
        }
        let old = std::mem::replace(&mut self.buf, dense);
        pool.give(old);
        self.regular = false;
    }

    /// Shrinks a dense buffer to exactly the live size.
    pub fn trim_excess(&mut self, size: u32, pool: &BufferPool<K>) {
        if self.regular || self.buf.capacity() == self.buf.len() {
            return;
        }
        let mut exact = Vec::with_capacity(size as usize);
        exact.extend_from_slice(&self.buf);
        let old = std::mem::replace(&mut self.buf, exact);
        pool.give(old);
    }

    fn dense_insert<C: KeyComparer<K>>(
        &mut self,
        cmp: &C,
        size: u32,
        index: u32,
        k: K,
        pool: &BufferPool<K>,
    ) {
        debug_assert_eq!(self.buf.len(), size as usize);
        if (index as usize) < self.buf.len()
            && cmp.compare(&self.buf[index as usize], &k) == Ordering::Equal
        {
            log::error!("insert collides with stored key at index {index}");
            std::process::abort();
        }
        if self.buf.len() == self.buf.capacity() {
            let grown = (self.buf.capacity() * 2)
                .max(MIN_DENSE_CAPACITY)
                .min(MAX_CAPACITY);
            let mut replacement = pool.rent(grown);
            replacement.extend_from_slice(&self.buf);
            let old = std::mem::replace(&mut self.buf, replacement);
            pool.give(old);
        }
        self.buf.insert(index as usize, k);
    }
}
