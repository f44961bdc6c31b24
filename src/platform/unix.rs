#![cfg(unix)]

use libc::{c_void, mmap, munmap, sysconf, MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, _SC_PAGESIZE};
use std::ptr;

pub(super) fn page_size() -> usize {
    let size = unsafe { sysconf(_SC_PAGESIZE) };
    debug_assert!(size > 0, "sysconf(_SC_PAGESIZE) returned a non-positive size");
    size as usize
}

/// `mmap` with `MAP_ANONYMOUS` is already zero-filled by the kernel, so the
/// returned region needs no further clearing.
pub(super) fn map(bytes: usize) -> *mut u8 {
    let ptr = unsafe {
        mmap(
            ptr::null_mut(),
            bytes,
            PROT_READ | PROT_WRITE,
            MAP_PRIVATE | MAP_ANONYMOUS,
            -1,
            0,
        )
    };

    if ptr == MAP_FAILED {
        log::error!(
            "mmap of {} bytes failed: {}",
            bytes,
            std::io::Error::last_os_error()
        );
        std::process::abort();
    }

    ptr as *mut u8
}

pub(super) fn unmap(ptr: *mut u8, bytes: usize) {
    let result = unsafe { munmap(ptr as *mut c_void, bytes) };
    if result != 0 {
        log::error!(
            "munmap of {} bytes at {:p} failed: {}",
            bytes,
            ptr,
            std::io::Error::last_os_error()
        );
        std::process::abort();
    }
}
