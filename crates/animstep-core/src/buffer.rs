//! Fixed-field heterogeneous buffer: N statically-typed fields in one
//! allocation, with a two-phase declare-then-lock layout.
//!
//! Unlocked, each field records a declared byte length via `resize`. `lock()`
//! folds fields in order into offsets (aligned per field) and reallocates only
//! when existing capacity is insufficient; it never shrinks. Field access is
//! valid only while the buffer is locked and its capacity covers the declared
//! total.

use crate::memory::{align_up, Allocation, AllocatorHandle, BUFFER_ALIGNMENT};

/// Element types that may back a buffer field.
///
/// # Safety
/// Implementors must be plain-old-data: `repr(C)`, no padding bytes read as
/// part of the value, and valid for every bit pattern.
pub unsafe trait FieldElem: Copy + 'static {}

unsafe impl FieldElem for f32 {}
unsafe impl FieldElem for u32 {}
unsafe impl FieldElem for crate::transform::QuatT {}

#[derive(Copy, Clone, Debug, Default)]
struct Field {
    declared: usize,
    align: usize,
    offset: usize,
}

/// One allocation holding `N` differently-typed fields.
pub struct FieldBuffer<const N: usize> {
    allocator: AllocatorHandle,
    allocation: Option<Allocation>,
    fields: [Field; N],
    total: usize,
    locked: bool,
}

impl<const N: usize> FieldBuffer<N> {
    pub fn new(allocator: AllocatorHandle) -> Self {
        Self {
            allocator,
            allocation: None,
            fields: [Field::default(); N],
            total: 0,
            locked: false,
        }
    }

    /// Declare `count` elements of `T` for `field`, rounded to T's natural
    /// alignment. Unlocked mode only.
    pub fn resize<T: FieldElem>(&mut self, field: usize, count: usize) {
        self.resize_padded::<T>(field, count, std::mem::align_of::<T>());
    }

    /// Declare with an explicit padding (alignment) override.
    pub fn resize_padded<T: FieldElem>(&mut self, field: usize, count: usize, padding: usize) {
        assert!(!self.locked, "resize on a locked field buffer");
        assert!(padding.is_power_of_two() && padding <= BUFFER_ALIGNMENT);
        let align = padding.max(std::mem::align_of::<T>());
        self.fields[field] = Field {
            declared: align_up(count * std::mem::size_of::<T>(), align),
            align,
            offset: 0,
        };
    }

    /// Fold declared fields into offsets and ensure backing capacity.
    /// Returns whether the buffer is valid afterwards; on allocation failure
    /// the buffer locks in an invalid state and field access is rejected.
    pub fn lock(&mut self) -> bool {
        assert!(!self.locked, "lock on an already locked field buffer");
        let mut total = 0usize;
        for field in self.fields.iter_mut() {
            total = align_up(total, field.align.max(1));
            field.offset = total;
            total += field.declared;
        }
        self.total = total;
        self.locked = true;

        let capacity = self.allocation.as_ref().map_or(0, Allocation::len);
        if capacity < total {
            // Never shrinks a sufficient allocation; only grows here.
            if let Some(old) = self.allocation.take() {
                self.allocator.free(old);
            }
            self.allocation = self.allocator.allocate(total);
        }
        self.is_valid()
    }

    /// Reverse the lock bookkeeping so field sizes can be redeclared.
    /// The backing allocation is retained.
    pub fn unlock(&mut self) {
        self.locked = false;
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Locked with enough capacity for every declared field.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.locked && self.allocation.as_ref().map_or(0, Allocation::len) >= self.total
    }

    /// Declared element count of `field`.
    #[inline]
    pub fn size<T: FieldElem>(&self, field: usize) -> usize {
        self.fields[field].declared / std::mem::size_of::<T>()
    }

    pub fn slice<T: FieldElem>(&self, field: usize) -> &[T] {
        assert!(self.is_valid(), "field access on an invalid buffer");
        let f = &self.fields[field];
        if f.declared == 0 {
            return &[];
        }
        debug_assert_eq!(f.offset % std::mem::align_of::<T>(), 0);
        let base = self
            .allocation
            .as_ref()
            .expect("valid buffer has an allocation")
            .as_slice()
            .as_ptr();
        let count = f.declared / std::mem::size_of::<T>();
        unsafe { std::slice::from_raw_parts(base.add(f.offset) as *const T, count) }
    }

    pub fn slice_mut<T: FieldElem>(&mut self, field: usize) -> &mut [T] {
        assert!(self.is_valid(), "field access on an invalid buffer");
        let f = self.fields[field];
        if f.declared == 0 {
            return &mut [];
        }
        debug_assert_eq!(f.offset % std::mem::align_of::<T>(), 0);
        let base = self
            .allocation
            .as_mut()
            .expect("valid buffer has an allocation")
            .as_mut_slice()
            .as_mut_ptr();
        let count = f.declared / std::mem::size_of::<T>();
        unsafe { std::slice::from_raw_parts_mut(base.add(f.offset) as *mut T, count) }
    }

    /// Raw bytes of the locked region, for whole-buffer copies.
    pub(crate) fn bytes(&self) -> &[u8] {
        assert!(self.is_valid());
        &self.allocation.as_ref().expect("valid").as_slice()[..self.total]
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        assert!(self.is_valid());
        let total = self.total;
        &mut self.allocation.as_mut().expect("valid").as_mut_slice()[..total]
    }
}

impl<const N: usize> Clone for FieldBuffer<N> {
    /// Deep-copies raw bytes only when the source is currently valid;
    /// otherwise the clone carries no allocation.
    fn clone(&self) -> Self {
        let mut out = Self {
            allocator: self.allocator.clone(),
            allocation: None,
            fields: self.fields,
            total: self.total,
            locked: self.locked,
        };
        if self.is_valid() {
            out.allocation = self.allocator.allocate(self.total);
            if let Some(dst) = out.allocation.as_mut() {
                dst.as_mut_slice()[..self.total].copy_from_slice(self.bytes());
            }
        } else {
            out.locked = false;
            out.total = 0;
        }
        out
    }
}

impl<const N: usize> Drop for FieldBuffer<N> {
    fn drop(&mut self) {
        if let Some(a) = self.allocation.take() {
            self.allocator.free(a);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::HeapAllocator;
    use crate::transform::QuatT;

    /// it should lay fields out in order with per-field alignment after lock
    #[test]
    fn lock_aligns_and_sizes_fields() {
        let mut buf: FieldBuffer<3> = FieldBuffer::new(HeapAllocator::handle());
        buf.resize::<QuatT>(0, 5);
        buf.resize::<u32>(1, 5);
        buf.resize::<f32>(2, 3);
        assert!(buf.lock());
        assert!(buf.is_valid());
        assert_eq!(buf.size::<QuatT>(0), 5);
        assert_eq!(buf.size::<u32>(1), 5);
        assert_eq!(buf.size::<f32>(2), 3);
        assert_eq!(buf.slice::<QuatT>(0).len(), 5);
        assert_eq!(
            buf.slice::<u32>(1).as_ptr() as usize % std::mem::align_of::<u32>(),
            0
        );
    }

    /// it should allow unlock, redeclare, relock without shrinking capacity
    #[test]
    fn unlock_redeclare_relock() {
        let mut buf: FieldBuffer<2> = FieldBuffer::new(HeapAllocator::handle());
        buf.resize::<f32>(0, 100);
        buf.resize::<f32>(1, 100);
        assert!(buf.lock());
        buf.unlock();
        buf.resize::<f32>(0, 10);
        buf.resize::<f32>(1, 10);
        assert!(buf.lock());
        assert_eq!(buf.size::<f32>(0), 10);
        buf.slice_mut::<f32>(0)[9] = 2.5;
        assert_eq!(buf.slice::<f32>(0)[9], 2.5);
    }

    /// it should deep-copy only valid sources on clone
    #[test]
    fn clone_copies_valid_source() {
        let mut buf: FieldBuffer<1> = FieldBuffer::new(HeapAllocator::handle());
        buf.resize::<u32>(0, 4);
        assert!(buf.lock());
        buf.slice_mut::<u32>(0).copy_from_slice(&[1, 2, 3, 4]);
        let copy = buf.clone();
        assert!(copy.is_valid());
        assert_eq!(copy.slice::<u32>(0), &[1, 2, 3, 4]);

        let invalid: FieldBuffer<1> = FieldBuffer::new(HeapAllocator::handle());
        let copy2 = invalid.clone();
        assert!(!copy2.is_valid());
    }
}
