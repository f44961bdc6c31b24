#![cfg(windows)]

use windows_sys::Win32::System::Memory::{
    VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE,
};
use windows_sys::Win32::System::SystemInformation::GetSystemInfo;
use windows_sys::Win32::System::SystemInformation::SYSTEM_INFO;

pub(super) fn page_size() -> usize {
    unsafe {
        let mut info: SYSTEM_INFO = std::mem::zeroed();
        GetSystemInfo(&mut info);
        info.dwPageSize as usize
    }
}

/// `VirtualAlloc` zero-fills freshly committed pages, so the returned region
/// needs no further clearing.
pub(super) fn map(bytes: usize) -> *mut u8 {
    let ptr = unsafe {
        VirtualAlloc(
            std::ptr::null(),
            bytes,
            MEM_COMMIT | MEM_RESERVE,
            PAGE_READWRITE,
        )
    };

    if ptr.is_null() {
        log::error!(
            "VirtualAlloc of {} bytes failed: {}",
            bytes,
            std::io::Error::last_os_error()
        );
        std::process::abort();
    }

    ptr as *mut u8
}

pub(super) fn unmap(ptr: *mut u8, _bytes: usize) {
    let ok = unsafe { VirtualFree(ptr as *mut _, 0, MEM_RELEASE) };
    if ok == 0 {
        log::error!(
            "VirtualFree at {:p} failed: {}",
            ptr,
            std::io::Error::last_os_error()
        );
        std::process::abort();
    }
}
