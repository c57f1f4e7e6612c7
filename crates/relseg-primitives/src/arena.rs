//! Lock-free linear arena allocator.
//!
//! A [`LinearArena`] hands out aligned byte ranges from a region by bumping
//! a single atomic cursor. Allocation is a CAS loop: successful allocations
//! are pairwise disjoint and the cursor never moves backwards between
//! resets. There is no per-object free; the only way space comes back is a
//! whole-arena [`reset`](LinearArena::reset) at a quiescent point.
//!
//! The cursor lives in an [`ArenaHeader`]. Where that header sits decides
//! who may allocate concurrently:
//!
//! - [`LinearArena::new`] keeps the header inside the arena handle. Threads
//!   of one process sharing the handle allocate safely; another process
//!   constructing its own arena over the same bytes would have an
//!   independent cursor and hand out overlapping ranges.
//! - [`LinearArena::init_at`] / [`LinearArena::attach_at`] place the header
//!   inside the region itself, so every process attaching to the same bytes
//!   contends on the same cursor and cross-process allocation is safe.
//!
//! The cursor CAS publishes only the allocator's own state. Bytes a caller
//! writes into an allocation are published to other observers by the
//! caller's own protocol, typically a release store of the handle into a
//! shared slot that readers load with acquire before decoding.

use core::marker::PhantomData;
use core::mem::{align_of, size_of};
use core::ptr::{self, NonNull};

use crate::anchor::{self, SegmentTag};
use crate::offset::Offset;
use crate::region::{CACHE_LINE, Region, align_up, align_up_addr};
use crate::segptr::SegPtr;
use crate::sync::{AtomicU64, Ordering, spin_loop};

/// Arena control block (64 bytes, cache-line aligned).
///
/// Placed in shared bytes by [`LinearArena::init_at`] when cross-process
/// allocation is wanted, or kept inside the arena handle otherwise.
#[repr(C, align(64))]
pub struct ArenaHeader {
    /// Arena capacity in bytes; written once at init, immutable after.
    capacity: u64,
    /// Bytes reserved since the last reset.
    cursor: AtomicU64,
    _pad: [u8; 48],
}

#[cfg(not(loom))]
const _: () = assert!(size_of::<ArenaHeader>() == CACHE_LINE);
#[cfg(not(loom))]
const _: () = assert!(align_of::<ArenaHeader>() == CACHE_LINE);

impl ArenaHeader {
    fn new(capacity: u64) -> Self {
        Self {
            capacity,
            cursor: AtomicU64::new(0),
            _pad: [0; 48],
        }
    }
}

/// Errors from [`LinearArena::attach_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaAttachError {
    /// The region cannot hold an arena header plus at least one data byte.
    RegionTooSmall,
    /// The header's capacity field is zero; nothing initialized it.
    Uninitialized,
    /// The header claims more capacity than the mapping exposes.
    CapacityExceedsRegion,
    /// The shared cursor is past the recorded capacity.
    CursorOutOfRange,
}

impl core::fmt::Display for ArenaAttachError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            ArenaAttachError::RegionTooSmall => "region too small for an arena",
            ArenaAttachError::Uninitialized => "arena header was never initialized",
            ArenaAttachError::CapacityExceedsRegion => "arena capacity exceeds the mapped region",
            ArenaAttachError::CursorOutOfRange => "arena cursor is past its capacity",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for ArenaAttachError {}

enum HeaderSlot {
    /// Header owned by this handle; cursor is process-local.
    Inline(ArenaHeader),
    /// Header resides in the region; cursor is shared with every attacher.
    Shared(NonNull<ArenaHeader>),
}

/// Monotonic bump allocator over a contiguous byte range.
///
/// `Tag` names the segment family whose per-process base the returned
/// handles decode through; every constructor binds `Tag` to the region base
/// as a side effect. `O` is the storage integer of returned handles.
///
/// Raw addresses returned by [`alloc`](LinearArena::alloc) are ephemeral,
/// process-local values; anything persisted into the region must be stored
/// as a handle. Constructing several arenas over overlapping bytes with the
/// same tag is not detected and yields overlapping allocations; keeping
/// placements disjoint is the caller's contract.
pub struct LinearArena<T: SegmentTag, O: Offset = u32> {
    /// The data range the cursor walks; excludes any in-region header.
    data: Region,
    header: HeaderSlot,
    _marker: PhantomData<(fn() -> T, fn() -> O)>,
}

impl<T: SegmentTag, O: Offset> core::fmt::Debug for LinearArena<T, O> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LinearArena").finish_non_exhaustive()
    }
}

// SAFETY: all cursor mutation goes through atomics, and the region creator
// promised the bytes stay valid; the handle itself holds no thread-affine
// state.
unsafe impl<T: SegmentTag, O: Offset> Send for LinearArena<T, O> {}
unsafe impl<T: SegmentTag, O: Offset> Sync for LinearArena<T, O> {}

impl<T: SegmentTag, O: Offset> LinearArena<T, O> {
    /// Arena over the whole region with a process-local cursor.
    ///
    /// Binds `Tag` to the region base. Cross-process allocation needs
    /// [`LinearArena::init_at`] instead.
    pub fn new(region: Region) -> Self {
        anchor::bind::<T>(region.as_ptr());
        Self {
            data: region,
            header: HeaderSlot::Inline(ArenaHeader::new(region.len() as u64)),
            _marker: PhantomData,
        }
    }

    /// Write a fresh control block at `header_offset` and manage the bytes
    /// after it.
    ///
    /// The arena's data range starts at the first 64-byte boundary past the
    /// header and runs to the end of the region. Binds `Tag` to the region
    /// base.
    ///
    /// # Safety
    ///
    /// The caller must have exclusive access to the region for the duration
    /// of the call; concurrent attachers may only appear afterwards.
    pub unsafe fn init_at(region: Region, header_offset: usize) -> Self {
        let data_offset = Self::data_offset(region, header_offset)
            .expect("region too small for an arena header");

        let header_ptr = region.offset(header_offset) as *mut ArenaHeader;
        let data = region.slice_from(data_offset);
        // write, not assign: the destination bytes are raw region content,
        // not a live ArenaHeader to drop over.
        unsafe { header_ptr.write(ArenaHeader::new(data.len() as u64)) };

        anchor::bind::<T>(region.as_ptr());
        Self {
            data,
            header: HeaderSlot::Shared(NonNull::new(header_ptr).expect("header is non-null")),
            _marker: PhantomData,
        }
    }

    /// Attach to a control block previously written by
    /// [`LinearArena::init_at`], possibly by another process.
    ///
    /// Binds `Tag` to the region base.
    ///
    /// # Safety
    ///
    /// `header_offset` must address an `ArenaHeader` that some process
    /// initialized in this region's backing bytes.
    pub unsafe fn attach_at(
        region: Region,
        header_offset: usize,
    ) -> Result<Self, ArenaAttachError> {
        let data_offset = Self::data_offset(region, header_offset)
            .ok_or(ArenaAttachError::RegionTooSmall)?;

        let header_ptr = region.offset(header_offset) as *mut ArenaHeader;
        let header = unsafe { &*header_ptr };

        let capacity = header.capacity as usize;
        if capacity == 0 {
            return Err(ArenaAttachError::Uninitialized);
        }
        if capacity > region.len() - data_offset {
            return Err(ArenaAttachError::CapacityExceedsRegion);
        }
        if header.cursor.load(Ordering::Acquire) > capacity as u64 {
            return Err(ArenaAttachError::CursorOutOfRange);
        }

        anchor::bind::<T>(region.as_ptr());
        Ok(Self {
            // Clamp to the capacity recorded at init: a mapping that has
            // since grown must not widen the arena under the shared cursor.
            data: region.slice(data_offset, capacity),
            header: HeaderSlot::Shared(NonNull::new(header_ptr).expect("header is non-null")),
            _marker: PhantomData,
        })
    }

    fn data_offset(region: Region, header_offset: usize) -> Option<usize> {
        assert!(
            header_offset.is_multiple_of(align_of::<ArenaHeader>()),
            "header_offset must be 64-byte aligned"
        );
        let data_offset = align_up(
            header_offset.checked_add(size_of::<ArenaHeader>())?,
            align_of::<ArenaHeader>(),
        );
        (data_offset < region.len()).then_some(data_offset)
    }

    #[inline]
    fn header(&self) -> &ArenaHeader {
        match &self.header {
            HeaderSlot::Inline(header) => header,
            HeaderSlot::Shared(ptr) => unsafe { ptr.as_ref() },
        }
    }

    /// Reserve `size` bytes aligned to `align`.
    ///
    /// Returns null on a zero-size request, arithmetic overflow, or
    /// insufficient remaining capacity, leaving the cursor untouched.
    /// `align == 0` is treated as 1; non-power-of-two alignments are
    /// honored. Lock-free: concurrent callers retry on cursor contention
    /// and some caller always makes progress.
    pub fn alloc(&self, size: usize, align: usize) -> *mut u8 {
        if size == 0 {
            return ptr::null_mut();
        }
        let align = if align == 0 { 1 } else { align };
        let header = self.header();
        let base_addr = self.data.base_addr();
        let capacity = self.data.len();

        let mut cur = header.cursor.load(Ordering::Acquire) as usize;
        loop {
            let Some(aligned_addr) = base_addr
                .checked_add(cur)
                .and_then(|addr| align_up_addr(addr, align))
            else {
                return ptr::null_mut();
            };
            let aligned_off = aligned_addr - base_addr;
            if aligned_off > capacity || size > capacity - aligned_off {
                return ptr::null_mut();
            }
            let next = aligned_off + size;

            match header.cursor.compare_exchange_weak(
                cur as u64,
                next as u64,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return (base_addr + aligned_off) as *mut u8,
                Err(observed) => {
                    cur = observed as usize;
                    spin_loop();
                }
            }
        }
    }

    /// [`alloc`](LinearArena::alloc), returning a relocatable byte handle.
    ///
    /// The null handle reports failure. Panics if the allocated address is
    /// not representable in `O` relative to the bound base.
    pub fn alloc_handle(&self, size: usize, align: usize) -> SegPtr<u8, T, O> {
        let ptr = self.alloc(size, align);
        if ptr.is_null() {
            SegPtr::null()
        } else {
            SegPtr::new(ptr)
        }
    }

    /// Storage for `count` values of `V`, aligned for `V`.
    ///
    /// Returns null when `count` is zero, when `count * size_of::<V>()`
    /// overflows or is zero, or when the arena is exhausted.
    pub fn allocate<V>(&self, count: usize) -> *mut V {
        if count == 0 {
            return ptr::null_mut();
        }
        let Some(size) = count.checked_mul(size_of::<V>()) else {
            return ptr::null_mut();
        };
        self.alloc(size, align_of::<V>()) as *mut V
    }

    /// [`allocate`](LinearArena::allocate), returning a relocatable handle.
    pub fn allocate_handle<V>(&self, count: usize) -> SegPtr<V, T, O> {
        let ptr = self.allocate::<V>(count);
        if ptr.is_null() {
            SegPtr::null()
        } else {
            SegPtr::new(ptr)
        }
    }

    /// Move `value` into freshly reserved storage and return its handle.
    ///
    /// The null handle reports exhaustion (the value is dropped). No
    /// destructor is registered anywhere: [`reset`](LinearArena::reset)
    /// will not drop the value, so resident types should be ones whose
    /// drop is trivial or irrelevant.
    pub fn make_handle<V>(&self, value: V) -> SegPtr<V, T, O> {
        let slot = self.allocate::<V>(1);
        if slot.is_null() {
            return SegPtr::null();
        }
        unsafe { slot.write(value) };
        SegPtr::new(slot)
    }

    /// Rewind the cursor to zero.
    ///
    /// # Safety
    ///
    /// The caller must guarantee a quiescent point: no thread or process is
    /// allocating from this arena or reading objects inside it. The store
    /// does not interlock with in-flight allocations.
    pub unsafe fn reset(&self) {
        self.header().cursor.store(0, Ordering::Release);
    }

    /// Zero the used prefix, then rewind the cursor.
    ///
    /// # Safety
    ///
    /// Same quiescence requirement as [`reset`](LinearArena::reset).
    pub unsafe fn secure_reset(&self) {
        let used = self.used();
        unsafe { self.data.zero_prefix(used.min(self.data.len())) };
        self.header().cursor.store(0, Ordering::Release);
    }

    /// Bytes reserved since the last reset (payload plus alignment padding).
    #[inline]
    pub fn used(&self) -> usize {
        self.header().cursor.load(Ordering::Acquire) as usize
    }

    /// Total arena capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes still available before the arena is exhausted.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.used())
    }

    /// Returns true if `ptr` falls inside the arena's byte range.
    #[inline]
    pub fn owns(&self, ptr: *const u8) -> bool {
        self.data.offset_of(ptr).is_some()
    }

    /// First byte of the arena's data range.
    #[inline]
    pub fn base(&self) -> *mut u8 {
        self.data.as_ptr()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::region::{HeapRegion, align_up_addr};
    use crate::segment_tag;

    fn expected_start(base: usize, cursor: usize, align: usize) -> usize {
        let align = if align == 0 { 1 } else { align };
        align_up_addr(base + cursor, align).unwrap() - base
    }

    #[test]
    fn padding_and_used_accounting() {
        segment_tag! {
            struct T;
        }
        let backing = HeapRegion::new_zeroed(4096);
        let arena: LinearArena<T> = LinearArena::new(backing.region());
        let base = arena.base() as usize;

        let mut cursor = 0usize;
        for (size, align) in [(1, 1), (7, 8), (13, 16), (64, 32), (5, 0), (9, 24)] {
            let before = arena.used();
            let ptr = arena.alloc(size, align);
            let after = arena.used();

            assert!(!ptr.is_null());
            let start = expected_start(base, cursor, align);
            assert_eq!(ptr as usize, base + start);
            assert_eq!(after, start + size);
            assert_eq!(after - before, (start - cursor) + size);
            cursor = start + size;
        }
    }

    #[test]
    fn zero_size_returns_null_without_advancing() {
        segment_tag! {
            struct T;
        }
        let backing = HeapRegion::new_zeroed(1024);
        let arena: LinearArena<T> = LinearArena::new(backing.region());

        let before = arena.used();
        assert!(arena.alloc(0, 1).is_null());
        assert!(arena.alloc(0, 64).is_null());
        assert_eq!(arena.used(), before);
    }

    #[test]
    fn exhaustion_leaves_cursor_untouched() {
        segment_tag! {
            struct T;
        }
        let backing = HeapRegion::new_zeroed(256);
        let arena: LinearArena<T> = LinearArena::new(backing.region());

        assert!(!arena.alloc(200, 16).is_null());
        let used = arena.used();
        assert!(used <= 256);

        assert!(arena.alloc(256, 1).is_null());
        assert_eq!(arena.used(), used);

        // Whatever padding a 4096 boundary costs, 57 bytes cannot fit in
        // the 56 that remain.
        assert!(arena.alloc(57, 4096).is_null());
        assert_eq!(arena.used(), used);
    }

    #[test]
    fn reset_rewinds_to_the_first_address() {
        segment_tag! {
            struct T;
        }
        let backing = HeapRegion::new_zeroed(1024);
        let arena: LinearArena<T> = LinearArena::new(backing.region());

        let first = arena.alloc(32, 32);
        assert!(!first.is_null());
        assert!(!arena.alloc(32, 32).is_null());
        assert!(arena.used() > 0);

        unsafe { arena.reset() };
        assert_eq!(arena.used(), 0);

        let again = arena.alloc(32, 32);
        assert_eq!(again, first);
    }

    #[test]
    fn secure_reset_zeroes_the_used_prefix() {
        segment_tag! {
            struct T;
        }
        let backing = HeapRegion::new_zeroed(1024);
        let arena: LinearArena<T> = LinearArena::new(backing.region());

        let ptr = arena.alloc(128, 16);
        assert!(!ptr.is_null());
        unsafe { ptr::write_bytes(ptr, 0xCD, 128) };

        let used_before = arena.used();
        assert!(used_before >= 128);

        unsafe { arena.secure_reset() };
        assert_eq!(arena.used(), 0);

        let bytes = unsafe { core::slice::from_raw_parts(arena.base(), used_before) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn typed_allocation_rejects_zero_count_and_overflow() {
        segment_tag! {
            struct T;
        }
        let backing = HeapRegion::new_zeroed(1024);
        let arena: LinearArena<T> = LinearArena::new(backing.region());

        assert!(arena.allocate::<u64>(0).is_null());
        assert!(arena.allocate::<u64>(usize::MAX / 8 + 1).is_null());
        assert_eq!(arena.used(), 0);

        let p = arena.allocate::<u64>(4);
        assert!(!p.is_null());
        assert!((p as usize).is_multiple_of(align_of::<u64>()));
    }

    #[test]
    fn handles_decode_to_their_allocation() {
        segment_tag! {
            struct T;
        }
        #[repr(C)]
        struct Pair {
            x: u32,
            y: u32,
        }

        let backing = HeapRegion::new_zeroed(4096);
        let arena: LinearArena<T> = LinearArena::new(backing.region());

        let handle = arena.make_handle(Pair { x: 1, y: 2 });
        assert!(!handle.is_null());
        let pair = unsafe { handle.as_ref() };
        assert_eq!(pair.x, 1);
        assert_eq!(pair.y, 2);

        let raw = arena.alloc_handle(64, 32);
        assert!(!raw.is_null());
        assert!((raw.get() as usize).is_multiple_of(32));
        assert!(arena.owns(raw.get()));

        let typed = arena.allocate_handle::<u64>(3);
        assert!(!typed.is_null());
        assert!(arena.owns(typed.get() as *const u8));
    }

    #[test]
    fn make_handle_returns_null_when_exhausted() {
        segment_tag! {
            struct T;
        }
        let backing = HeapRegion::new_zeroed(64);
        let arena: LinearArena<T> = LinearArena::new(backing.region());

        assert!(!arena.alloc(64, 1).is_null());
        let handle = arena.make_handle([0u8; 128]);
        assert!(handle.is_null());
        assert_eq!(arena.used(), 64);
    }

    #[test]
    fn owns_tracks_the_data_range_only() {
        segment_tag! {
            struct T;
        }
        let backing = HeapRegion::new_zeroed(512);
        let region = backing.region();
        let arena: LinearArena<T> = unsafe { LinearArena::init_at(region, 0) };

        // The header itself is not allocatable space.
        assert!(!arena.owns(region.as_ptr()));
        assert!(arena.owns(arena.base()));

        let p = arena.alloc(16, 8);
        assert!(arena.owns(p));
        assert!(!arena.owns((region.as_ptr() as usize + region.len()) as *const u8));
    }

    #[test]
    fn shared_header_coordinates_two_attachers() {
        segment_tag! {
            struct T;
        }
        let backing = HeapRegion::new_zeroed(1024);
        let region = backing.region();

        let owner: LinearArena<T> = unsafe { LinearArena::init_at(region, 0) };
        let attacher: LinearArena<T> =
            unsafe { LinearArena::attach_at(region, 0) }.expect("attach to shared header");

        let a = owner.alloc(100, 8);
        let b = attacher.alloc(100, 8);
        assert!(!a.is_null());
        assert!(!b.is_null());

        // One shared cursor: the second allocation lands past the first.
        assert_eq!(owner.used(), attacher.used());
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        assert!(lo as usize + 100 <= hi as usize);
    }

    #[test]
    fn attach_rejects_uninitialized_and_oversized_headers() {
        segment_tag! {
            struct T;
        }
        let backing = HeapRegion::new_zeroed(256);
        let region = backing.region();

        let err = unsafe { LinearArena::<T>::attach_at(region, 0) }.unwrap_err();
        assert_eq!(err, ArenaAttachError::Uninitialized);

        let _owner: LinearArena<T> = unsafe { LinearArena::init_at(region, 0) };
        unsafe { region.get_mut::<ArenaHeader>(0) }.capacity = 4096;
        let err = unsafe { LinearArena::<T>::attach_at(region, 0) }.unwrap_err();
        assert_eq!(err, ArenaAttachError::CapacityExceedsRegion);
    }

    #[test]
    fn non_power_of_two_alignment_is_exact() {
        segment_tag! {
            struct T;
        }
        let backing = HeapRegion::new_zeroed(4096);
        let arena: LinearArena<T> = LinearArena::new(backing.region());

        for align in [3usize, 5, 7, 24, 48, 96] {
            let p = arena.alloc(10, align);
            assert!(!p.is_null());
            assert!((p as usize).is_multiple_of(align));
        }
    }
}
