//! Named OS-backed shared-memory segments for relocatable data.
//!
//! A [`Segment`] is a contiguous byte region backed by a named OS object —
//! a POSIX shared-memory object on unix, a pagefile-backed named section on
//! windows — mapped read-write into the calling process. Names use one
//! portable form everywhere: a leading `/`, no further `/`, valid UTF-8
//! (see [`SegmentName`]); the mapping onto the native namespace is internal.
//!
//! Mapping a segment gives this process a base address; it does *not* make
//! stored handles decodable. That takes the explicit extra step of binding
//! the base into the per-process registry, via [`Segment::bind`] or one of
//! the arena constructors from `relseg-primitives`.
//!
//! ```ignore
//! use relseg_primitives::{LinearArena, segment_tag};
//! use relseg_shm::{Segment, SegmentName};
//!
//! segment_tag! {
//!     struct CacheTag;
//! }
//!
//! // Producer process.
//! let name = SegmentName::new("/my-cache")?;
//! let seg = Segment::create(&name, 1 << 20)?;
//! let arena: LinearArena<CacheTag> = unsafe { LinearArena::init_at(seg.region(), 64) };
//! let handle = arena.make_handle(42u64);
//!
//! // Consumer process: same name, its own mapping and binding.
//! let seg = Segment::open(&name)?;
//! let arena: LinearArena<CacheTag> = unsafe { LinearArena::attach_at(seg.region(), 64)? };
//! ```
//!
//! The segment owns the mapping: drop unmaps and closes, and never removes
//! the name. Removing the name is the separate [`Segment::remove`], a no-op
//! on windows where section lifetime is tied to open handles.

#[macro_use]
mod macros;

pub mod error;
pub mod layout;
pub mod name;
pub mod segment;

#[cfg(unix)]
mod os_unix;
#[cfg(windows)]
mod os_windows;

pub use error::SegmentError;
pub use layout::{ARENA_HEADER_OFFSET, HEADER_SIZE, MAGIC, SegmentHeader, VERSION};
pub use name::SegmentName;
pub use segment::{OpenMode, Segment};
