use std::sync::Arc;

use parking_lot::Mutex;

const DEFAULT_MAX_SHELVES: usize = 16;

/// Freelist of reusable buffers shared between series.
///
/// `rent` may hand back a recycled buffer with more capacity than requested;
/// callers must track live length themselves. Returned buffers are cleared
/// but keep their allocation.
pub struct BufferPool<T> {
    shelves: Mutex<Vec<Vec<T>>>,
    max_shelves: usize,
}

impl<T> BufferPool<T> {
    pub fn new(max_shelves: usize) -> Arc<Self> {
        Arc::new(Self {
            shelves: Mutex::new(Vec::new()),
            max_shelves,
        })
    }

    pub fn shared() -> Arc<Self> {
        Self::new(DEFAULT_MAX_SHELVES)
    }

    pub fn rent(&self, min_capacity: usize) -> Vec<T> {
        let mut shelves = self.shelves.lock();
        if let Some(pos) = shelves
            .iter()
            .position(|buf| buf.capacity() >= min_capacity)
        {
            return shelves.swap_remove(pos);
        }
        drop(shelves);
        Vec::with_capacity(min_capacity)
    }

    pub fn give(&self, mut buf: Vec<T>) {
        buf.clear();
        if buf.capacity() == 0 {
            return;
        }
        let mut shelves = self.shelves.lock();
        if shelves.len() < self.max_shelves {
            shelves.push(buf);
        }
    }

    pub fn shelved(&self) -> usize {
        self.shelves.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rent_reuses_returned_buffers() {
        let pool = BufferPool::<i64>::shared();
        let mut buf = pool.rent(8);
        buf.extend_from_slice(&[1, 2, 3]);
        let cap = buf.capacity();
        pool.give(buf);
        assert_eq!(pool.shelved(), 1);

        let again = pool.rent(4);
        assert!(again.is_empty());
        assert_eq!(again.capacity(), cap);
        assert_eq!(pool.shelved(), 0);
    }

    #[test]
    fn rent_allocates_when_no_shelf_fits() {
        let pool = BufferPool::<i64>::shared();
        pool.give(Vec::with_capacity(2));
        let buf = pool.rent(64);
        assert!(buf.capacity() >= 64);
        assert_eq!(pool.shelved(), 1);
    }

    #[test]
    fn shelf_count_is_bounded() {
        let pool = BufferPool::<u8>::new(2);
        for _ in 0..5 {
            pool.give(Vec::with_capacity(4));
        }
        assert_eq!(pool.shelved(), 2);
    }
}
