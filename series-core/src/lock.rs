use std::hint;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Single-writer, many-reader optimistic sequence lock.
///
/// Two counters, both starting equal. A writer bumps `next_version` on entry
/// and publishes `version = next_version` on exit, so the counters differ
/// exactly while a mutation is in flight. Readers snapshot `version`, do
/// their read-only work, then confirm `next_version` still matches; a
/// mismatch means the snapshot raced a writer and must be retried.
///
/// Writer exclusion is a spin flag embedded in the lock. The counters must be
/// equal whenever no writer holds it; observing anything else means a
/// previous writer died mid-mutation, and the process aborts rather than
/// serve a torn series.
pub struct VersionedLock {
    version: AtomicU64,
    next_version: AtomicU64,
    writer: AtomicBool,
}

impl VersionedLock {
    pub const fn new() -> Self {
        Self::with_version(0)
    }

    /// Lock whose counters start at `version`; used when reconstructing a
    /// series from a snapshot.
    pub const fn with_version(version: u64) -> Self {
        Self {
            version: AtomicU64::new(version),
            next_version: AtomicU64::new(version),
            writer: AtomicBool::new(false),
        }
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    #[inline]
    pub fn read_begin(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// True when no writer intervened since `read_begin` returned `begin`.
    #[inline]
    pub fn read_valid(&self, begin: u64) -> bool {
        self.next_version.load(Ordering::Acquire) == begin
    }

    pub fn write(&self) -> WriteGuard<'_> {
        while self
            .writer
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            hint::spin_loop();
        }
        let version = self.version.load(Ordering::Relaxed);
        let next = self.next_version.load(Ordering::Relaxed);
        if version != next {
            log::error!("torn series state: version {version} != next_version {next}");
            std::process::abort();
        }
        self.next_version.store(next + 1, Ordering::Release);
        WriteGuard { lock: self }
    }
}

impl Default for VersionedLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the writer side on drop, publishing the new version.
pub struct WriteGuard<'a> {
    lock: &'a VersionedLock,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            // The mutation did not run to completion; the counters cannot be
            // reconciled with the data they guard.
            log::error!("writer terminated mid-mutation; series state is torn");
            std::process::abort();
        }
        let next = self.lock.next_version.load(Ordering::Relaxed);
        self.lock.version.store(next, Ordering::Release);
        self.lock.writer.store(false, Ordering::Release);
    }
}
