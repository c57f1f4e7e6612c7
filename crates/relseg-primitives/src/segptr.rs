//! Segment-anchored relocatable pointers.

use core::fmt;
use core::marker::PhantomData;
use core::ptr;

use crate::anchor::{self, SegmentTag};
use crate::offset::Offset;

/// A typed reference into a tagged segment, stored as one integer.
///
/// The stored integer is a displacement from the base bound for `Tag` in the
/// current process (see [`anchor::bind`]), offset by one so that zero is the
/// null encoding. Because the decoding base comes from the registry and not
/// from the handle's own address, a `SegPtr` is a plain integer value:
/// copying it, moving it, or block-moving a whole range of them with a raw
/// byte copy preserves meaning. That property is what makes
/// segment-resident data structures relocatable.
///
/// Encoding panics when the displacement does not fit in `O` or would
/// collide with the null encoding; use [`SegPtr::try_new`] to handle those
/// cases as values. Decoding never validates: a handle decoded under a wrong
/// or stale binding yields a wrong address, not an error.
///
/// Decoding with an unbound tag is a caller bug. Debug builds catch it with
/// an assertion; release builds decode relative to address zero.
#[repr(transparent)]
pub struct SegPtr<T, Tag, O = u32> {
    raw: O,
    _marker: PhantomData<(fn() -> T, fn() -> Tag)>,
}

// Manual Clone/Copy: a handle is an integer, copyable no matter what `T` is.
impl<T, Tag, O: Offset> Clone for SegPtr<T, Tag, O> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}
impl<T, Tag, O: Offset> Copy for SegPtr<T, Tag, O> {}

impl<T, Tag: SegmentTag, O: Offset> SegPtr<T, Tag, O> {
    /// The null handle.
    #[inline]
    pub const fn null() -> Self {
        Self {
            raw: O::NULL,
            _marker: PhantomData,
        }
    }

    /// Encode `ptr` against the base currently bound for `Tag`.
    ///
    /// A null `ptr` produces the null handle. Panics if the displacement
    /// does not fit in `O` or would collide with the null encoding.
    #[inline]
    pub fn new(ptr: *mut T) -> Self {
        match Self::try_new(ptr) {
            Some(handle) => handle,
            None => panic!("displacement not representable as a relocatable handle"),
        }
    }

    /// Encode `ptr`, returning `None` where [`SegPtr::new`] would panic.
    #[inline]
    pub fn try_new(ptr: *mut T) -> Option<Self> {
        if ptr.is_null() {
            return Some(Self::null());
        }
        let base = anchor::bound_base::<Tag>();
        debug_assert!(
            !base.is_null(),
            "segment tag must be bound before encoding a handle"
        );
        let displacement = (ptr as usize).wrapping_sub(base as usize) as isize;
        O::encode(displacement).map(|raw| Self {
            raw,
            _marker: PhantomData,
        })
    }

    /// Rebuild a handle from storage previously read with
    /// [`SegPtr::raw_storage`].
    ///
    /// The value must originate from a handle of the same `T`/`Tag`/`O`
    /// triple; this is the escape hatch for headers that persist a handle
    /// through a widened atomic slot.
    #[inline]
    pub fn from_raw_storage(raw: O) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Decode to a raw address under the current binding for `Tag`.
    ///
    /// Null decodes to null. The result is not validated against any region
    /// bounds.
    #[inline]
    pub fn get(self) -> *mut T {
        if self.raw.is_null() {
            return ptr::null_mut();
        }
        let base = anchor::bound_base::<Tag>();
        debug_assert!(
            !base.is_null(),
            "segment tag must be bound before decoding a handle"
        );
        base.wrapping_offset(self.raw.decode()) as *mut T
    }

    /// Returns true if this is the null handle.
    #[inline]
    pub fn is_null(self) -> bool {
        self.raw.is_null()
    }

    /// The stored integer, for diagnostics and persistence.
    #[inline]
    pub fn raw_storage(self) -> O {
        self.raw
    }

    /// Reinterpret the handle as addressing a `U` at the same location.
    ///
    /// The integer is unchanged; this is the handle analog of
    /// [`NonNull::cast`](core::ptr::NonNull::cast).
    #[inline]
    pub fn cast<U>(self) -> SegPtr<U, Tag, O> {
        SegPtr {
            raw: self.raw,
            _marker: PhantomData,
        }
    }

    /// Shared reference to the target.
    ///
    /// # Safety
    ///
    /// The handle must be non-null, the tag binding must be the one the
    /// handle was encoded under (or a byte-identical relocation of it), and
    /// the target must be a live `T` unaliased by writers for `'a`.
    #[inline]
    pub unsafe fn as_ref<'a>(self) -> &'a T {
        unsafe { &*self.get() }
    }

    /// Exclusive reference to the target.
    ///
    /// # Safety
    ///
    /// Same as [`SegPtr::as_ref`], plus exclusivity for `'a`.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_mut<'a>(self) -> &'a mut T {
        unsafe { &mut *self.get() }
    }
}

impl<T, Tag: SegmentTag, O: Offset> Default for SegPtr<T, Tag, O> {
    #[inline]
    fn default() -> Self {
        Self::null()
    }
}

// Under one tag the decoding base is shared, so equal stored integers and
// equal decoded addresses are the same relation; null equals only null.
impl<T, Tag, O: Offset> PartialEq for SegPtr<T, Tag, O> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}
impl<T, Tag, O: Offset> Eq for SegPtr<T, Tag, O> {}

impl<T, Tag, O: Offset> fmt::Debug for SegPtr<T, Tag, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SegPtr").field(&self.raw).finish()
    }
}
