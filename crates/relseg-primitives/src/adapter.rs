//! `allocator-api2` adapter for arena-backed containers.

use core::alloc::Layout;
use core::ptr::NonNull;

use allocator_api2::alloc::{AllocError, Allocator};

use crate::anchor::SegmentTag;
use crate::arena::LinearArena;
use crate::offset::Offset;

/// Borrow of a [`LinearArena`] usable wherever an
/// [`allocator_api2::alloc::Allocator`] is expected.
///
/// Deallocation is a no-op: containers built over this adapter are
/// arena-scoped consumers. Dropping them returns nothing, and every resize
/// permanently consumes the discarded buffer until the arena is reset. Their
/// internal pointers are ordinary raw pointers, so such containers are for
/// process-local use; resident cross-process data stores handles instead.
pub struct ArenaAlloc<'a, T: SegmentTag, O: Offset = u32> {
    arena: &'a LinearArena<T, O>,
}

impl<'a, T: SegmentTag, O: Offset> core::fmt::Debug for ArenaAlloc<'a, T, O> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ArenaAlloc").finish_non_exhaustive()
    }
}

impl<'a, T: SegmentTag, O: Offset> ArenaAlloc<'a, T, O> {
    /// Adapter over `arena`.
    #[inline]
    pub fn new(arena: &'a LinearArena<T, O>) -> Self {
        Self { arena }
    }

    /// The arena this adapter draws from.
    #[inline]
    pub fn arena(&self) -> &'a LinearArena<T, O> {
        self.arena
    }
}

impl<T: SegmentTag, O: Offset> Clone for ArenaAlloc<'_, T, O> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}
impl<T: SegmentTag, O: Offset> Copy for ArenaAlloc<'_, T, O> {}

/// Two adapters are interchangeable exactly when they draw from the same
/// arena.
impl<T: SegmentTag, O: Offset> PartialEq for ArenaAlloc<'_, T, O> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.arena, other.arena)
    }
}
impl<T: SegmentTag, O: Offset> Eq for ArenaAlloc<'_, T, O> {}

unsafe impl<T: SegmentTag, O: Offset> Allocator for ArenaAlloc<'_, T, O> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        if layout.size() == 0 {
            // Zero-size allocations get the usual dangling aligned pointer.
            let dangling = unsafe { NonNull::new_unchecked(layout.align() as *mut u8) };
            return Ok(NonNull::slice_from_raw_parts(dangling, 0));
        }
        let ptr = self.arena.alloc(layout.size(), layout.align());
        let ptr = NonNull::new(ptr).ok_or(AllocError)?;
        Ok(NonNull::slice_from_raw_parts(ptr, layout.size()))
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {
        // Monotonic arena: space comes back only at reset.
    }
}
