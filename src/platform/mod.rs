//! The abstract platform page interface: acquire and release page-aligned,
//! zero-filled, read/write regions of integer page multiples.
//!
//! Implemented per-OS in sibling modules; the rest of the crate only ever
//! sees [`page_size`], [`map_pages`], and [`unmap_pages`].

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as imp;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as imp;

use std::sync::OnceLock;

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// The platform page size, queried once and cached for the process.
pub fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(imp::page_size)
}

/// Acquires `units * page_size()` zero-initialized, read/write bytes.
/// Aborts the process on failure.
pub fn map_pages(units: usize) -> *mut u8 {
    imp::map(units * page_size())
}

/// Releases a region previously returned by [`map_pages`] with the same
/// `units`. Aborts the process on failure.
pub fn unmap_pages(ptr: *mut u8, units: usize) {
    imp::unmap(ptr, units * page_size())
}
