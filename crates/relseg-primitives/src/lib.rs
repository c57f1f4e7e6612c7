//! Relocatable references and a lock-free linear arena for shared byte regions.
//!
//! Everything in this crate operates on a contiguous byte region whose base
//! address differs from process to process (a shared-memory mapping, a
//! memory-mapped file, or a plain heap arena). Resident data never stores a
//! native pointer; it stores a small integer offset that is decoded through an
//! *anchor*:
//!
//! - [`SegPtr`] is anchored to the per-process base bound for a [`SegmentTag`].
//!   It is a plain integer and therefore bitwise-relocatable: the whole region
//!   can be copied or remapped at a different base and every handle keeps its
//!   meaning once the new base is bound.
//! - [`SelfPtr`] is anchored to the address of its own storage. It survives
//!   whole-blob byte copies (the pointer-to-pointee distance is preserved) but
//!   cannot be moved on its own, so it is written in place and is neither
//!   `Copy` nor `Clone`.
//!
//! [`LinearArena`] carves aligned ranges out of a region with a single atomic
//! bump cursor. The cursor can live inside the region itself, which lets
//! several processes allocate disjoint ranges from one arena without any
//! external coordination.
//!
//! The crate is `no_std`; the `alloc` feature adds [`HeapRegion`] for
//! heap-backed arenas and tests.

#![no_std]

#[cfg(any(test, feature = "alloc"))]
extern crate alloc;
#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod adapter;
pub mod anchor;
pub mod arena;
pub mod offset;
pub mod region;
pub mod segptr;
pub mod selfptr;
pub mod sync;

pub use adapter::ArenaAlloc;
pub use anchor::{SegmentTag, bind, bound_base, is_bound};
pub use arena::{ArenaAttachError, ArenaHeader, LinearArena};
pub use offset::Offset;
#[cfg(any(test, feature = "alloc"))]
pub use region::HeapRegion;
pub use region::Region;
pub use segptr::SegPtr;
pub use selfptr::SelfPtr;
