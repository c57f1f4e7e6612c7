//! Windows named-section plumbing.
//!
//! Sections are pagefile-backed and carry their size from creation; the
//! namespace entry dies with the last open handle, so there is no unlink.

use std::ffi::OsStr;
use std::io;
use std::os::windows::ffi::OsStrExt;

use windows_sys::Win32::Foundation::{
    CloseHandle, ERROR_ALREADY_EXISTS, GetLastError, HANDLE, INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::System::Memory::{
    CreateFileMappingW, FILE_MAP_ALL_ACCESS, MEMORY_BASIC_INFORMATION,
    MEMORY_MAPPED_VIEW_ADDRESS, MapViewOfFile, OpenFileMappingW, PAGE_READWRITE, UnmapViewOfFile,
    VirtualQuery,
};

use crate::name::SegmentName;

/// Owned section handle; closes on drop.
pub(crate) struct SectionHandle(HANDLE);

impl SectionHandle {
    #[inline]
    pub(crate) fn raw(&self) -> HANDLE {
        self.0
    }
}

impl Drop for SectionHandle {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.0);
        }
    }
}

// SAFETY: a section handle is a kernel object reference, usable from any
// thread.
unsafe impl Send for SectionHandle {}
unsafe impl Sync for SectionHandle {}

/// `Local\<stem>` in UTF-16 with a trailing NUL.
fn wide_name(name: &SegmentName) -> Vec<u16> {
    OsStr::new("Local\\")
        .encode_wide()
        .chain(OsStr::new(name.stem()).encode_wide())
        .chain(std::iter::once(0))
        .collect()
}

/// Create a pagefile-backed named section of `size` bytes.
///
/// Fails with `AlreadyExists` if the name is taken; the section arrives
/// zero-filled and fully sized.
pub(crate) fn create_exclusive(name: &SegmentName, size: usize) -> io::Result<SectionHandle> {
    let wide = wide_name(name);
    let handle = unsafe {
        CreateFileMappingW(
            INVALID_HANDLE_VALUE,
            std::ptr::null(),
            PAGE_READWRITE,
            (size as u64 >> 32) as u32,
            size as u32,
            wide.as_ptr(),
        )
    };
    if handle.is_null() {
        return Err(io::Error::last_os_error());
    }
    let handle = SectionHandle(handle);
    if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
        // CreateFileMappingW opened the existing section; creation is
        // exclusive here, so hand the name back as taken.
        return Err(io::Error::from(io::ErrorKind::AlreadyExists));
    }
    Ok(handle)
}

/// Open an existing named section.
pub(crate) fn open_existing(name: &SegmentName) -> io::Result<SectionHandle> {
    let wide = wide_name(name);
    let handle = unsafe { OpenFileMappingW(FILE_MAP_ALL_ACCESS, 0, wide.as_ptr()) };
    if handle.is_null() {
        return Err(io::Error::last_os_error());
    }
    Ok(SectionHandle(handle))
}

/// Map the whole section read-write.
pub(crate) fn map(section: &SectionHandle) -> io::Result<*mut u8> {
    let view = unsafe { MapViewOfFile(section.raw(), FILE_MAP_ALL_ACCESS, 0, 0, 0) };
    if view.Value.is_null() {
        return Err(io::Error::last_os_error());
    }
    Ok(view.Value as *mut u8)
}

/// Size of the mapped view, as the page-granular region the OS reports.
pub(crate) fn view_len(ptr: *mut u8) -> io::Result<usize> {
    let mut info: MEMORY_BASIC_INFORMATION = unsafe { std::mem::zeroed() };
    let written = unsafe {
        VirtualQuery(
            ptr as *const _,
            &mut info,
            std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
        )
    };
    if written == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(info.RegionSize)
}

/// Unmap a view previously returned by [`map`].
pub(crate) fn unmap(ptr: *mut u8) {
    unsafe {
        UnmapViewOfFile(MEMORY_MAPPED_VIEW_ADDRESS {
            Value: ptr as *mut _,
        });
    }
}
