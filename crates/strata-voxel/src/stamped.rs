//! Optimistic stamped locking: an atomic version counter paired with a
//! read-write mutex.
//!
//! The version counter follows a seqlock discipline — odd while a writer is
//! inside, even otherwise, and bumped twice per write. An optimistic reader
//! takes a stamp, runs against a non-blocking `try_read` guard, and validates
//! the stamp afterwards; any interference falls back transparently to the
//! blocking shared path, so callers never observe a failed or torn read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// A value guarded by a version stamp and a read-write mutex.
#[derive(Debug)]
pub struct StampedLock<T> {
    /// Odd while a writer holds the lock; incremented twice per write.
    version: AtomicU64,
    data: RwLock<T>,
}

impl<T> StampedLock<T> {
    /// Wraps `value` with a fresh (even) version stamp.
    pub fn new(value: T) -> Self {
        Self {
            version: AtomicU64::new(0),
            data: RwLock::new(value),
        }
    }

    /// Returns the current version stamp. An odd stamp means a write is in
    /// progress and optimistic validation will fail.
    pub fn begin_optimistic(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Returns `true` if `stamp` is still current and no writer intervened.
    pub fn validate(&self, stamp: u64) -> bool {
        stamp & 1 == 0 && self.version.load(Ordering::Acquire) == stamp
    }

    /// Non-blocking read, validated against the version stamp.
    ///
    /// The closure may run twice: once optimistically and, if a writer
    /// invalidated the stamp or held the lock, once more under the blocking
    /// shared path. It always returns a value consistent with some fully
    /// completed write.
    pub fn optimistic_read<R>(&self, mut f: impl FnMut(&T) -> R) -> R {
        let stamp = self.begin_optimistic();
        if stamp & 1 == 0
            && let Ok(guard) = self.data.try_read()
        {
            let result = f(&guard);
            drop(guard);
            if self.validate(stamp) {
                return result;
            }
        }
        self.read(f)
    }

    /// Blocking shared read.
    pub fn read<R>(&self, mut f: impl FnMut(&T) -> R) -> R {
        let guard = self.data.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Exclusive write. Bumps the version to odd before the closure runs and
    /// back to even after, invalidating every outstanding optimistic stamp.
    pub fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        // The closing bump lives in a drop guard so a panicking closure still
        // restores even parity; otherwise a later write would run on an even
        // stamp and optimistic readers could validate mid-write.
        struct Bump<'a>(&'a AtomicU64);
        impl Drop for Bump<'_> {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::Release);
            }
        }

        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        self.version.fetch_add(1, Ordering::Release);
        let bump = Bump(&self.version);
        let result = f(&mut guard);
        drop(bump);
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    #[test]
    fn test_optimistic_read_sees_value() {
        let lock = StampedLock::new(41);
        lock.write(|v| *v += 1);
        assert_eq!(lock.optimistic_read(|v| *v), 42);
    }

    #[test]
    fn test_write_invalidates_stamp() {
        let lock = StampedLock::new(0);
        let stamp = lock.begin_optimistic();
        assert!(lock.validate(stamp));
        lock.write(|v| *v = 1);
        assert!(!lock.validate(stamp));
        // A fresh stamp is valid again.
        assert!(lock.validate(lock.begin_optimistic()));
    }

    #[test]
    fn test_readers_never_observe_torn_state() {
        // The writer keeps both halves of the pair equal; any torn read
        // would surface as a mismatched pair.
        let lock = Arc::new(StampedLock::new((0u64, 0u64)));
        let stop = Arc::new(AtomicBool::new(false));

        let mut readers = Vec::new();
        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            let stop = Arc::clone(&stop);
            readers.push(thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let (a, b) = lock.optimistic_read(|pair| *pair);
                    assert_eq!(a, b, "torn read: {a} != {b}");
                }
            }));
        }

        let writer = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                for i in 1..=20_000u64 {
                    lock.write(|pair| *pair = (i, i));
                }
            })
        };

        writer.join().unwrap();
        stop.store(true, Ordering::Relaxed);
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(lock.read(|pair| *pair), (20_000, 20_000));
    }

    #[test]
    fn test_poisoned_write_does_not_wedge() {
        let lock = Arc::new(StampedLock::new(7));
        let panicking = Arc::clone(&lock);
        let _ = thread::spawn(move || {
            panicking.write(|_| panic!("writer died"));
        })
        .join();
        // The lock recovers with even parity; subsequent access proceeds.
        assert!(lock.validate(lock.begin_optimistic()));
        assert_eq!(lock.read(|v| *v), 7);
        lock.write(|v| *v = 8);
        assert_eq!(lock.optimistic_read(|v| *v), 8);
    }
}
