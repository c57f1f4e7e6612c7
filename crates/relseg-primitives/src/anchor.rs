//! Segment tags and the per-process base registry.
//!
//! A [`SegmentTag`] is a compile-time identity for one logical segment
//! family. Each tag owns exactly one process-local slot holding the base
//! address its [`SegPtr`](crate::SegPtr)s decode against. The slot is a
//! plain static in the crate that declares the tag, so every module and
//! dynamic library that links against the tag type shares the same storage.
//!
//! Binding is explicit: mapping a segment does not bind its base. The
//! [`LinearArena`](crate::LinearArena) constructors bind as a convenience,
//! and segment handles expose a bind helper; everything else goes through
//! [`bind`] directly.
//!
//! The registry deliberately lives outside shared bytes. A base address is
//! only meaningful to the process that mapped it.

// The registry is not a loom-modeled component: binds happen during process
// setup, before decoding starts, so these stay on core atomics even when the
// rest of the crate is compiled for loom.
use core::sync::atomic::{AtomicUsize, Ordering};

/// Compile-time identity selecting one per-process base-pointer slot.
///
/// Declare tags with [`segment_tag!`](crate::segment_tag); implementing this
/// trait by hand only requires returning the same `'static` slot from every
/// call site.
pub trait SegmentTag: 'static {
    /// The process-local slot holding the bound base address (0 = unbound).
    fn base_slot() -> &'static AtomicUsize;
}

/// Bind `base` as the decoding base for `T` in this process.
///
/// Later binds replace earlier ones; rebinding after a region copy or remap
/// is the normal relocation flow. The store uses release ordering so a bind
/// performed before handing work to other threads is visible to their
/// decodes.
#[inline]
pub fn bind<T: SegmentTag>(base: *mut u8) {
    T::base_slot().store(base as usize, Ordering::Release);
}

/// The base currently bound for `T`, or null if the tag is unbound.
#[inline]
pub fn bound_base<T: SegmentTag>() -> *mut u8 {
    T::base_slot().load(Ordering::Acquire) as *mut u8
}

/// Returns true if a base has been bound for `T` in this process.
#[inline]
pub fn is_bound<T: SegmentTag>() -> bool {
    !bound_base::<T>().is_null()
}

/// Declare a segment tag type with its own process-local base slot.
///
/// ```
/// relseg_primitives::segment_tag! {
///     /// Tag for the telemetry segment.
///     pub struct TelemetryTag;
/// }
/// ```
#[macro_export]
macro_rules! segment_tag {
    ($(#[$meta:meta])* $vis:vis struct $name:ident;) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        $vis struct $name;

        impl $crate::anchor::SegmentTag for $name {
            #[inline]
            fn base_slot() -> &'static ::core::sync::atomic::AtomicUsize {
                static SLOT: ::core::sync::atomic::AtomicUsize =
                    ::core::sync::atomic::AtomicUsize::new(0);
                &SLOT
            }
        }
    };
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    segment_tag! {
        struct TagA;
    }
    segment_tag! {
        struct TagB;
    }

    #[test]
    fn tags_have_independent_slots() {
        let mut a = 1u8;
        let mut b = 2u8;

        bind::<TagA>(&mut a);
        bind::<TagB>(&mut b);

        assert_eq!(bound_base::<TagA>(), &raw mut a);
        assert_eq!(bound_base::<TagB>(), &raw mut b);
    }

    #[test]
    fn later_binds_replace_earlier_ones() {
        segment_tag! {
            struct Rebound;
        }

        let mut first = 0u8;
        let mut second = 0u8;

        assert!(!is_bound::<Rebound>());
        bind::<Rebound>(&mut first);
        assert!(is_bound::<Rebound>());
        bind::<Rebound>(&mut second);
        assert_eq!(bound_base::<Rebound>(), &raw mut second);
    }
}
