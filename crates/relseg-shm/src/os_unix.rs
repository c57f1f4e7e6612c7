//! POSIX shared-memory object plumbing.
//!
//! Thin wrappers over `shm_open`/`ftruncate`/`fstat`/`mmap`/`shm_unlink`
//! returning raw `io::Error`s; the segment layer attaches operation names
//! and the portable segment name.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use crate::name::SegmentName;

fn c_name(name: &SegmentName) -> CString {
    // Validation already rejected interior NULs.
    CString::new(name.as_str()).expect("segment name contains no NUL")
}

/// `shm_open` with `O_CREAT | O_EXCL`; fails if the name exists.
pub(crate) fn create_exclusive(name: &SegmentName) -> io::Result<OwnedFd> {
    let c = c_name(name);
    let fd = unsafe {
        libc::shm_open(
            c.as_ptr(),
            libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
            0o600 as libc::mode_t,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: shm_open returned a fresh descriptor we now own.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// `shm_open` on an existing object; fails if the name is absent.
pub(crate) fn open_existing(name: &SegmentName) -> io::Result<OwnedFd> {
    let c = c_name(name);
    let fd = unsafe { libc::shm_open(c.as_ptr(), libc::O_RDWR, 0 as libc::mode_t) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: shm_open returned a fresh descriptor we now own.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Size the object to `size` bytes.
pub(crate) fn set_len(fd: &OwnedFd, size: usize) -> io::Result<()> {
    let rc = unsafe { libc::ftruncate(fd.as_raw_fd(), size as libc::off_t) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Current object size as reported by `fstat`.
pub(crate) fn object_len(fd: &OwnedFd) -> io::Result<usize> {
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::fstat(fd.as_raw_fd(), &mut st) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(st.st_size as usize)
}

/// Map `len` bytes of the object read-write and shared.
pub(crate) fn map(fd: &OwnedFd, len: usize) -> io::Result<*mut u8> {
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd.as_raw_fd(),
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    Ok(ptr as *mut u8)
}

/// Unmap a range previously returned by [`map`].
pub(crate) fn unmap(ptr: *mut u8, len: usize) {
    unsafe {
        libc::munmap(ptr as *mut libc::c_void, len);
    }
}

/// Unlink the name from the shm namespace.
pub(crate) fn unlink(name: &SegmentName) -> io::Result<()> {
    let c = c_name(name);
    let rc = unsafe { libc::shm_unlink(c.as_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
