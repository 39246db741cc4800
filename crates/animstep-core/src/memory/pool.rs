//! Frame-local pool: a growable list of fixed-size buckets with bump
//! allocation, reset once per frame.
//!
//! Buckets persist across frames; `reset()` only rewinds their used counters.
//! Allocation and reset share one coarse lock. Callers make a few large
//! per-instance requests per frame, not per-command ones.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{align_up, Allocation, Allocator, AllocatorHandle, HeapAllocator, BUFFER_ALIGNMENT};

struct Bucket {
    storage: Allocation,
    used: usize,
}

impl Bucket {
    /// Carve `size` bytes from the bucket if they fit. `size` is already
    /// alignment-rounded and the bucket base is BUFFER_ALIGNMENT-aligned, so
    /// every carve starts aligned.
    fn carve(&mut self, size: usize) -> Option<Allocation> {
        let offset = self.used;
        if offset + size > self.storage.len() {
            return None;
        }
        self.used = offset + size;
        let ptr = unsafe { NonNull::new_unchecked(self.storage.base_ptr().add(offset)) };
        Some(unsafe { Allocation::from_raw(ptr, size) })
    }
}

struct PoolInner {
    buckets: Vec<Bucket>,
    current: usize,
}

/// Bucketed bump allocator reset once per simulation frame.
pub struct FramePool {
    inner: Mutex<PoolInner>,
    bucket_size: usize,
    backing: HeapAllocator,
    /// Live allocations carved from the pool this frame. Must be zero at
    /// reset time: resetting with live regions would hand the same bytes
    /// out twice.
    outstanding: AtomicUsize,
}

impl FramePool {
    pub fn new(bucket_size: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                buckets: Vec::new(),
                current: 0,
            }),
            bucket_size: align_up(bucket_size.max(BUFFER_ALIGNMENT), BUFFER_ALIGNMENT),
            backing: HeapAllocator,
            outstanding: AtomicUsize::new(0),
        }
    }

    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    pub fn bucket_count(&self) -> usize {
        self.inner.lock().buckets.len()
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }

    /// Bump-allocate `size` bytes (rounded up to BUFFER_ALIGNMENT), walking
    /// forward from the current bucket and creating at most one new bucket.
    /// Returns `None` when even a fresh bucket cannot satisfy the request;
    /// the fresh bucket is retained regardless.
    pub fn allocate(&self, size: usize) -> Option<Allocation> {
        let size = align_up(size.max(1), BUFFER_ALIGNMENT);
        let mut inner = self.inner.lock();

        while inner.current < inner.buckets.len() {
            let current = inner.current;
            if let Some(a) = inner.buckets[current].carve(size) {
                self.outstanding.fetch_add(1, Ordering::Relaxed);
                return Some(a);
            }
            inner.current += 1;
        }

        let storage = self.backing.allocate(self.bucket_size)?;
        log::debug!(
            "frame pool grows to {} buckets ({} bytes each)",
            inner.buckets.len() + 1,
            self.bucket_size
        );
        inner.buckets.push(Bucket { storage, used: 0 });
        inner.current = inner.buckets.len() - 1;
        let current = inner.current;
        match inner.buckets[current].carve(size) {
            Some(a) => {
                self.outstanding.fetch_add(1, Ordering::Relaxed);
                Some(a)
            }
            // Request exceeds a whole bucket. The new bucket stays.
            None => None,
        }
    }

    /// Bookkeeping return of a carved region. Bytes are reclaimed in bulk at
    /// the next `reset()`.
    pub fn release(&self, allocation: Allocation) {
        debug_assert!(allocation.len() > 0);
        let prev = self.outstanding.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(prev > 0, "pool release without a matching allocate");
        std::mem::forget(allocation);
    }

    /// Rewind every bucket's used counter, keeping backing memory.
    /// All regions carved this frame must have been released.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        debug_assert_eq!(
            self.outstanding.load(Ordering::Relaxed),
            0,
            "pool reset with live allocations"
        );
        for bucket in inner.buckets.iter_mut() {
            bucket.used = 0;
        }
        inner.current = 0;
    }
}

impl Drop for FramePool {
    fn drop(&mut self) {
        debug_assert_eq!(
            self.outstanding.load(Ordering::Relaxed),
            0,
            "pool dropped with live allocations"
        );
        let inner = self.inner.get_mut();
        for bucket in inner.buckets.drain(..) {
            self.backing.free(bucket.storage);
        }
    }
}

/// `Allocator` capability over a shared [`FramePool`].
pub struct PoolAllocator {
    pool: Arc<FramePool>,
}

impl PoolAllocator {
    pub fn new(pool: Arc<FramePool>) -> Self {
        Self { pool }
    }

    pub fn handle(pool: Arc<FramePool>) -> AllocatorHandle {
        Arc::new(Self::new(pool))
    }
}

impl Allocator for PoolAllocator {
    fn allocate(&self, size: usize) -> Option<Allocation> {
        self.pool.allocate(size)
    }

    fn free(&self, allocation: Allocation) {
        self.pool.release(allocation);
    }

    fn guaranteed_alignment(&self) -> usize {
        BUFFER_ALIGNMENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// it should serve sequential allocations from one bucket and grow on demand
    #[test]
    fn bump_allocation_and_growth() {
        let pool = FramePool::new(256);
        let a = pool.allocate(100).expect("first fits");
        let b = pool.allocate(100).expect("second fits");
        assert_eq!(pool.bucket_count(), 1);
        let c = pool.allocate(100).expect("third forces a new bucket");
        assert_eq!(pool.bucket_count(), 2);
        for x in [a, b, c] {
            pool.release(x);
        }
    }

    /// it should fail oversized requests but retain the extra bucket
    #[test]
    fn oversized_request_fails_and_keeps_bucket() {
        let pool = FramePool::new(128);
        assert!(pool.allocate(4096).is_none());
        assert_eq!(pool.bucket_count(), 1);
    }

    /// it should reuse bucket memory after reset
    #[test]
    fn reset_reuses_buckets() {
        let pool = FramePool::new(128);
        let a = pool.allocate(128).expect("fills the bucket");
        pool.release(a);
        pool.reset();
        let b = pool.allocate(128).expect("full-bucket request after reset");
        pool.release(b);
        assert_eq!(pool.bucket_count(), 1);
    }
}
