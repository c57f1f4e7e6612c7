//! Segment lifecycle: create, open, map, bind, remove.

#[cfg(unix)]
use std::time::Duration;

use relseg_primitives::{Region, SegmentTag, bind};

use crate::error::SegmentError;
use crate::name::SegmentName;

#[cfg(unix)]
use crate::os_unix as os;
#[cfg(windows)]
use crate::os_windows as os;

/// How a constructor treats an existing or absent name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create a new segment; fail if the name exists. Size must be > 0.
    CreateOnly,
    /// Open an existing segment; fail if absent. A requested size of 0
    /// adopts the existing size; a larger existing size is fine, a smaller
    /// one fails.
    OpenOnly,
    /// Create if absent, otherwise open; size rules follow whichever branch
    /// is taken.
    OpenOrCreate,
}

/// Bounded wait for a freshly created object to be sized by its creator.
///
/// Creation and sizing are two syscalls on the creator side; an opener can
/// observe the window between them as a zero-sized object. Windows sections
/// carry their size from creation, so the wait exists only on unix.
#[cfg(unix)]
const SIZE_RETRY_ATTEMPTS: u32 = 200;
#[cfg(unix)]
const SIZE_RETRY_START: Duration = Duration::from_micros(10);
#[cfg(unix)]
const SIZE_RETRY_CAP: Duration = Duration::from_millis(10);

/// How often `OpenOrCreate` retries when the name keeps appearing and
/// vanishing between its create and open attempts.
const OPEN_OR_CREATE_ATTEMPTS: u32 = 16;

/// A named, OS-backed shared byte region mapped into this process.
///
/// The handle owns its mapping: drop unmaps and closes, leaving the name in
/// place for other processes. [`Segment::remove`] is the separate unlink
/// operation (a no-op on windows, where the section dies with its last
/// handle).
///
/// Mapping does not bind: handles stored in the segment only become
/// decodable after [`Segment::bind`] (or an arena constructor) installs the
/// base for a tag.
#[derive(Debug)]
pub struct Segment {
    ptr: *mut u8,
    len: usize,
    name: SegmentName,
    created: bool,
    #[cfg(unix)]
    _fd: std::os::fd::OwnedFd,
    #[cfg(windows)]
    _section: os::SectionHandle,
}

// SAFETY: the mapping is shared memory by construction; coordination of its
// contents is the resident data structures' concern, and the handle's own
// fields are immutable after construction.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Create a new segment of `size` bytes; fails if the name exists.
    pub fn create(name: &SegmentName, size: usize) -> Result<Self, SegmentError> {
        Self::with_mode(OpenMode::CreateOnly, name, size)
    }

    /// Open an existing segment, adopting whatever size it has.
    pub fn open(name: &SegmentName) -> Result<Self, SegmentError> {
        Self::with_mode(OpenMode::OpenOnly, name, 0)
    }

    /// Open an existing segment, failing unless it holds at least
    /// `min_size` bytes.
    pub fn open_at_least(name: &SegmentName, min_size: usize) -> Result<Self, SegmentError> {
        Self::with_mode(OpenMode::OpenOnly, name, min_size)
    }

    /// Create the segment at `size` bytes, or open it if it already exists
    /// (requiring at least `size` bytes there too).
    pub fn open_or_create(name: &SegmentName, size: usize) -> Result<Self, SegmentError> {
        Self::with_mode(OpenMode::OpenOrCreate, name, size)
    }

    /// Mode-driven constructor behind the named convenience constructors.
    pub fn with_mode(
        mode: OpenMode,
        name: &SegmentName,
        size: usize,
    ) -> Result<Self, SegmentError> {
        match mode {
            OpenMode::CreateOnly => Self::create_impl(name, size),
            OpenMode::OpenOnly => Self::open_impl(name, size),
            OpenMode::OpenOrCreate => {
                if size == 0 {
                    return Err(SegmentError::InvalidSize {
                        name: name.as_str().to_owned(),
                    });
                }
                for _ in 0..OPEN_OR_CREATE_ATTEMPTS {
                    match Self::create_impl(name, size) {
                        Err(SegmentError::AlreadyExists { .. }) => {}
                        done => return done,
                    }
                    match Self::open_impl(name, size) {
                        // Removed between our create and open; go again.
                        Err(SegmentError::NotFound { .. }) => continue,
                        done => return done,
                    }
                }
                Err(SegmentError::NotFound {
                    name: name.as_str().to_owned(),
                })
            }
        }
    }

    #[cfg(unix)]
    fn create_impl(name: &SegmentName, size: usize) -> Result<Self, SegmentError> {
        if size == 0 {
            return Err(SegmentError::InvalidSize {
                name: name.as_str().to_owned(),
            });
        }

        let fd = os::create_exclusive(name).map_err(|err| {
            if err.kind() == std::io::ErrorKind::AlreadyExists {
                SegmentError::AlreadyExists {
                    name: name.as_str().to_owned(),
                }
            } else {
                os_error("shm_open", name, err)
            }
        })?;

        // The name now exists because of us: roll it back on any failure
        // before the handle is fully constructed.
        let mapped = os::set_len(&fd, size)
            .map_err(|err| os_error("ftruncate", name, err))
            .and_then(|()| os::map(&fd, size).map_err(|err| os_error("mmap", name, err)));

        let ptr = match mapped {
            Ok(ptr) => ptr,
            Err(err) => {
                let _ = os::unlink(name);
                return Err(err);
            }
        };

        // SAFETY: freshly mapped for `size` bytes, not yet shared out.
        unsafe { Region::from_raw(ptr, size).zero_prefix(size) };

        debug!("created segment {} ({} bytes)", name, size);
        Ok(Self {
            ptr,
            len: size,
            name: name.clone(),
            created: true,
            _fd: fd,
        })
    }

    #[cfg(unix)]
    fn open_impl(name: &SegmentName, requested: usize) -> Result<Self, SegmentError> {
        let fd = os::open_existing(name).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                SegmentError::NotFound {
                    name: name.as_str().to_owned(),
                }
            } else {
                os_error("shm_open", name, err)
            }
        })?;

        let mut backoff = SIZE_RETRY_START;
        let mut len = 0;
        for attempt in 0..SIZE_RETRY_ATTEMPTS {
            len = os::object_len(&fd).map_err(|err| os_error("fstat", name, err))?;
            if len > 0 {
                break;
            }
            if attempt + 1 == SIZE_RETRY_ATTEMPTS {
                return Err(SegmentError::SizeNeverSet {
                    name: name.as_str().to_owned(),
                    attempts: SIZE_RETRY_ATTEMPTS,
                });
            }
            trace!("segment {} still zero-sized, backing off", name);
            std::thread::sleep(backoff);
            backoff = (backoff * 2).min(SIZE_RETRY_CAP);
        }

        if requested > 0 && len < requested {
            return Err(SegmentError::SizeMismatch {
                name: name.as_str().to_owned(),
                requested,
                actual: len,
            });
        }

        let ptr = os::map(&fd, len).map_err(|err| os_error("mmap", name, err))?;

        debug!("opened segment {} ({} bytes)", name, len);
        Ok(Self {
            ptr,
            len,
            name: name.clone(),
            created: false,
            _fd: fd,
        })
    }

    #[cfg(windows)]
    fn create_impl(name: &SegmentName, size: usize) -> Result<Self, SegmentError> {
        if size == 0 {
            return Err(SegmentError::InvalidSize {
                name: name.as_str().to_owned(),
            });
        }

        let section = os::create_exclusive(name, size).map_err(|err| {
            if err.kind() == std::io::ErrorKind::AlreadyExists {
                SegmentError::AlreadyExists {
                    name: name.as_str().to_owned(),
                }
            } else {
                os_error("CreateFileMappingW", name, err)
            }
        })?;

        // Nothing to unlink on failure: dropping the handle releases the
        // name, since section lifetime is handle-bound.
        let ptr = os::map(&section).map_err(|err| os_error("MapViewOfFile", name, err))?;

        // SAFETY: freshly mapped for `size` bytes, not yet shared out.
        unsafe { Region::from_raw(ptr, size).zero_prefix(size) };

        debug!("created segment {} ({} bytes)", name, size);
        Ok(Self {
            ptr,
            len: size,
            name: name.clone(),
            created: true,
            _section: section,
        })
    }

    #[cfg(windows)]
    fn open_impl(name: &SegmentName, requested: usize) -> Result<Self, SegmentError> {
        let section = os::open_existing(name).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                SegmentError::NotFound {
                    name: name.as_str().to_owned(),
                }
            } else {
                os_error("OpenFileMappingW", name, err)
            }
        })?;

        let ptr = os::map(&section).map_err(|err| os_error("MapViewOfFile", name, err))?;

        // Sections are sized atomically at creation; the view's region size
        // is the page-rounded segment size.
        let len = match os::view_len(ptr) {
            Ok(len) => len,
            Err(err) => {
                os::unmap(ptr);
                return Err(os_error("VirtualQuery", name, err));
            }
        };

        if requested > 0 && len < requested {
            os::unmap(ptr);
            return Err(SegmentError::SizeMismatch {
                name: name.as_str().to_owned(),
                requested,
                actual: len,
            });
        }

        debug!("opened segment {} ({} bytes)", name, len);
        Ok(Self {
            ptr,
            len,
            name: name.clone(),
            created: false,
            _section: section,
        })
    }

    /// Unlink `name` from the OS namespace.
    ///
    /// Existing mappings stay valid; the name simply stops resolving.
    /// Returns `Ok(true)` if a name was removed, `Ok(false)` if there was
    /// nothing to remove — always the case on windows, where named sections
    /// vanish with their last handle instead.
    pub fn remove(name: &SegmentName) -> Result<bool, SegmentError> {
        #[cfg(unix)]
        {
            match os::unlink(name) {
                Ok(()) => {
                    debug!("removed segment {}", name);
                    Ok(true)
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(err) => Err(os_error("shm_unlink", name, err)),
            }
        }
        #[cfg(windows)]
        {
            let _ = name;
            Ok(false)
        }
    }

    /// Base address of this process's mapping.
    #[inline]
    pub fn base(&self) -> *mut u8 {
        self.ptr
    }

    /// Mapped length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the mapping is zero-length (never the case for a
    /// successfully constructed segment).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Region view of the mapping.
    #[inline]
    pub fn region(&self) -> Region {
        // SAFETY: the mapping is valid for the lifetime of this Segment.
        unsafe { Region::from_raw(self.ptr, self.len) }
    }

    /// Returns true if this handle created the underlying object.
    #[inline]
    pub fn created(&self) -> bool {
        self.created
    }

    /// The portable name this segment was constructed under.
    #[inline]
    pub fn name(&self) -> &SegmentName {
        &self.name
    }

    /// Bind this mapping's base as the decode base for `T` in this process.
    pub fn bind<T: SegmentTag>(&self) {
        trace!("binding segment {} base for tag", self.name);
        bind::<T>(self.ptr);
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        trace!("unmapping segment {}", self.name);
        #[cfg(unix)]
        os::unmap(self.ptr, self.len);
        #[cfg(windows)]
        os::unmap(self.ptr);
    }
}

fn os_error(op: &'static str, name: &SegmentName, source: std::io::Error) -> SegmentError {
    SegmentError::Os {
        op,
        name: name.as_str().to_owned(),
        source,
    }
}
