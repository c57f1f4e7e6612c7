//! Recommended in-segment layout.
//!
//! The core imposes nothing on segment bytes; this module is the convention
//! the crate's own tests and most users share: a fixed [`SegmentHeader`] at
//! offset 0 carrying a magic, a version, and one root handle slot, with the
//! arena control block at [`ARENA_HEADER_OFFSET`] right behind it and arena
//! bytes after that.
//!
//! The root slot doubles as the publication point between processes: the
//! producer fully initializes its data, then [`publish_root`]es the handle
//! with release ordering; consumers [`load_root`] with acquire ordering
//! before decoding anything. That pairing is what makes the bytes behind
//! the handle visible, not the arena's own cursor traffic.
//!
//! [`publish_root`]: SegmentHeader::publish_root
//! [`load_root`]: SegmentHeader::load_root

use core::sync::atomic::{AtomicU64, Ordering};

use relseg_primitives::{Offset, SegPtr, SegmentTag};

/// Magic bytes identifying a relseg segment header.
pub const MAGIC: [u8; 8] = *b"RELSEG\x00\x01";

/// Segment header format version.
pub const VERSION: u32 = 1;

/// Fixed size of [`SegmentHeader`] in bytes.
pub const HEADER_SIZE: usize = 64;

/// Conventional offset of the arena control block: directly behind the
/// header.
pub const ARENA_HEADER_OFFSET: usize = HEADER_SIZE;

/// Fixed header at offset 0 of a segment following the recommended layout.
#[repr(C, align(64))]
pub struct SegmentHeader {
    /// Identifies the layout; see [`MAGIC`].
    pub magic: [u8; 8],
    /// Layout version; see [`VERSION`].
    pub version: u32,
    /// Always [`HEADER_SIZE`], for forward extension.
    pub header_size: u32,
    /// Root handle slot, written and read as widened raw handle storage.
    root: AtomicU64,
    reserved: [u8; 40],
}

const _: () = assert!(size_of::<SegmentHeader>() == HEADER_SIZE);

impl SegmentHeader {
    /// Stamp a fresh header with magic and version, root slot null.
    pub fn init(&mut self) {
        self.magic = MAGIC;
        self.version = VERSION;
        self.header_size = HEADER_SIZE as u32;
        self.root = AtomicU64::new(0);
        self.reserved = [0; 40];
    }

    /// Check magic, version, and recorded header size.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.magic != MAGIC {
            return Err("bad magic");
        }
        if self.version != VERSION {
            return Err("unsupported version");
        }
        if self.header_size != HEADER_SIZE as u32 {
            return Err("unexpected header size");
        }
        Ok(())
    }

    /// Publish `handle` as the segment's root with release ordering.
    ///
    /// Everything written before this call is visible to a consumer that
    /// loads the root afterwards.
    pub fn publish_root<T, Tag: SegmentTag, O: Offset>(&self, handle: SegPtr<T, Tag, O>) {
        self.root
            .store(handle.raw_storage().to_bits(), Ordering::Release);
    }

    /// Load the segment's root handle with acquire ordering.
    ///
    /// The null handle means no root has been published yet.
    pub fn load_root<T, Tag: SegmentTag, O: Offset>(&self) -> SegPtr<T, Tag, O> {
        SegPtr::from_raw_storage(O::from_bits(self.root.load(Ordering::Acquire)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relseg_primitives::{HeapRegion, bind, segment_tag};

    #[test]
    fn header_is_exactly_one_cache_line() {
        assert_eq!(size_of::<SegmentHeader>(), 64);
    }

    #[test]
    fn init_then_validate_roundtrips() {
        let backing = HeapRegion::new_zeroed(128);
        let region = backing.region();

        let header = unsafe { region.get_mut::<SegmentHeader>(0) };
        header.init();
        assert!(header.validate().is_ok());

        header.magic[0] ^= 0xFF;
        assert_eq!(header.validate(), Err("bad magic"));
        header.magic[0] ^= 0xFF;

        header.version += 1;
        assert_eq!(header.validate(), Err("unsupported version"));
    }

    #[test]
    fn root_slot_roundtrips_handles() {
        segment_tag! {
            struct RootTag;
        }

        let backing = HeapRegion::new_zeroed(4096);
        let region = backing.region();
        bind::<RootTag>(region.as_ptr());

        let header = unsafe { region.get_mut::<SegmentHeader>(0) };
        header.init();

        let none: SegPtr<u64, RootTag, u32> = header.load_root();
        assert!(none.is_null());

        unsafe { *region.get_mut::<u64>(256) = 99 };
        let handle: SegPtr<u64, RootTag, u32> = SegPtr::new(region.offset(256) as *mut u64);
        header.publish_root(handle);

        let loaded: SegPtr<u64, RootTag, u32> = header.load_root();
        assert_eq!(loaded, handle);
        assert_eq!(unsafe { *loaded.get() }, 99);
    }
}
