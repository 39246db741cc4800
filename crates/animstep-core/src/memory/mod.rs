//! Allocation capability and the frame-local pool.
//!
//! Buffer owners hold an `AllocatorHandle` and stay agnostic to the concrete
//! strategy: persistent pose containers allocate from the heap, per-frame
//! scratch (write poses, command buffers) from the [`FramePool`].

pub mod pool;

pub use pool::{FramePool, PoolAllocator};

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::Arc;

/// Every allocator in this crate hands out regions aligned to this.
pub const BUFFER_ALIGNMENT: usize = 16;

/// An owned raw byte region handed out by an [`Allocator`].
///
/// Invariants: the region is uniquely owned by this value while it is alive,
/// is at least [`BUFFER_ALIGNMENT`]-aligned, and stays valid until returned to
/// the allocator that produced it (for pool regions: until the next pool
/// reset, which must not happen while the allocation is live).
#[derive(Debug)]
pub struct Allocation {
    ptr: NonNull<u8>,
    len: usize,
}

// The region is uniquely owned; shared access only ever reads.
unsafe impl Send for Allocation {}
unsafe impl Sync for Allocation {}

impl Allocation {
    /// # Safety
    /// `ptr` must point to a region of `len` writable bytes, aligned to
    /// [`BUFFER_ALIGNMENT`], not aliased by any other live `Allocation`.
    pub(crate) unsafe fn from_raw(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // Unique ownership of the region makes this sound for any &self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    #[inline]
    pub(crate) fn base_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

/// Allocation capability: allocate/free plus an alignment guarantee.
///
/// Handles are value-semantic via `Arc`; cloning a handle shares the
/// underlying strategy.
pub trait Allocator: Send + Sync {
    /// Allocate `size` zero-initialized-or-reused bytes. `None` on exhaustion.
    fn allocate(&self, size: usize) -> Option<Allocation>;

    /// Return a region to the allocator. Pool regions are reclaimed in bulk
    /// at reset, so this may be a bookkeeping-only operation.
    fn free(&self, allocation: Allocation);

    /// Minimum alignment of every region this allocator hands out.
    fn guaranteed_alignment(&self) -> usize;
}

pub type AllocatorHandle = Arc<dyn Allocator>;

/// Global-allocator-backed strategy for persistent buffers.
#[derive(Debug, Default)]
pub struct HeapAllocator;

impl HeapAllocator {
    pub fn handle() -> AllocatorHandle {
        Arc::new(HeapAllocator)
    }
}

impl Allocator for HeapAllocator {
    fn allocate(&self, size: usize) -> Option<Allocation> {
        if size == 0 {
            return Some(unsafe { Allocation::from_raw(NonNull::dangling(), 0) });
        }
        let layout = Layout::from_size_align(size, BUFFER_ALIGNMENT).ok()?;
        // Zeroed so freshly locked buffer fields read as valid POD values.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw)?;
        Some(unsafe { Allocation::from_raw(ptr, size) })
    }

    fn free(&self, allocation: Allocation) {
        if allocation.len == 0 {
            return;
        }
        let layout = Layout::from_size_align(allocation.len, BUFFER_ALIGNMENT)
            .expect("layout was valid at allocation time");
        unsafe { dealloc(allocation.ptr.as_ptr(), layout) };
    }

    fn guaranteed_alignment(&self) -> usize {
        BUFFER_ALIGNMENT
    }
}

#[inline]
pub(crate) fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// it should hand out aligned, writable, zeroed regions from the heap
    #[test]
    fn heap_allocations_aligned_and_zeroed() {
        let heap = HeapAllocator::handle();
        let mut a = heap.allocate(100).expect("heap allocation");
        assert_eq!(a.len(), 100);
        assert_eq!(a.base_ptr() as usize % BUFFER_ALIGNMENT, 0);
        assert!(a.as_slice().iter().all(|b| *b == 0));
        a.as_mut_slice()[99] = 7;
        assert_eq!(a.as_slice()[99], 7);
        heap.free(a);
    }

    /// it should treat zero-sized allocations as valid empty regions
    #[test]
    fn heap_zero_sized_allocation() {
        let heap = HeapAllocator::handle();
        let a = heap.allocate(0).expect("empty allocation");
        assert!(a.is_empty());
        heap.free(a);
    }
}
