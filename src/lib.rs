//! A family-aware heap manager: register named, fixed-size object families,
//! then allocate and release contiguous runs of elements by family name.
//!
//! Each family carves its own pages, mapped lazily from the platform, into
//! variably sized blocks with inline metadata; a worst-fit free-list keeps
//! splitting from growing the free-block count unnecessarily, and freed
//! blocks coalesce with their immediate neighbors before the page itself is
//! released once empty.
//!
//! `HeapManager` is single-threaded by construction: it holds raw pointers
//! with no internal synchronization, so it is neither `Send` nor `Sync` and
//! cannot cross a thread boundary.

pub mod block;
pub mod diagnostics;
mod engine;
pub mod error;
pub mod page;
pub mod platform;
pub mod registry;

use core::marker::PhantomData;
use core::mem::size_of;
use core::ptr::NonNull;

pub use block::{SplitClass, SplitCounts};
pub use diagnostics::{BlockUsage, FamilySummary, MemoryUsage};
pub use error::AllocError;

use registry::Registry;

/// A single family-aware heap.
pub struct HeapManager {
    registry: Registry,
    page_size: usize,
    _not_send_sync: PhantomData<*const ()>,
}

impl HeapManager {
    /// Caches the platform page size and returns a fresh, family-less heap.
    pub fn init() -> Self {
        let page_size = platform::page_size();
        Self {
            registry: Registry::new(),
            page_size,
            _not_send_sync: PhantomData,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// The largest single allocation any family can satisfy from one page.
    pub fn max_payload_per_page(&self) -> usize {
        self.page_size - page::HEADER_SIZE
    }

    /// Registers a new family. Aborts the process if `element_size` exceeds
    /// the platform page size: an unrecoverable misconfiguration, not a
    /// request the caller can meaningfully retry.
    pub fn register_family(&mut self, name: &str, element_size: u32) {
        if element_size as usize > self.page_size {
            log::error!(
                "family {:?} element size {} exceeds page size {}",
                name,
                element_size,
                self.page_size
            );
            std::process::abort();
        }

        unsafe {
            self.registry.register(name, element_size);
        }

        #[cfg(debug_assertions)]
        self.check_invariants();
    }

    /// Allocates `units` contiguous elements of `name`'s family and zeroes
    /// them.
    pub fn alloc(&mut self, name: &str, units: i32) -> Result<NonNull<u8>, AllocError> {
        let family = self
            .registry
            .lookup(name)
            .ok_or_else(|| AllocError::UnknownFamily(name.to_owned()))?;

        let element_size = unsafe { family.as_ref().element_size };
        let capacity = self.max_payload_per_page() as i64;
        let requested = i64::from(units) * i64::from(element_size);

        if requested < 0 || requested > capacity {
            return Err(AllocError::RequestTooLarge {
                requested: requested.max(0) as usize,
                capacity: capacity as usize,
            });
        }
        let requested = requested as usize;

        let ptr = unsafe { engine::alloc(family, requested as u32) };
        unsafe {
            core::ptr::write_bytes(ptr.as_ptr(), 0, requested);
        }

        #[cfg(debug_assertions)]
        self.check_invariants();

        Ok(ptr)
    }

    /// Convenience wrapper keyed by Rust type rather than a family-name
    /// string: registers `T` on first use (named by `type_name::<T>()`,
    /// sized by `size_of::<T>()`) and forwards to [`Self::alloc`].
    pub fn alloc_typed<T>(&mut self, units: i32) -> Result<NonNull<T>, AllocError> {
        let name = core::any::type_name::<T>();
        if self.registry.lookup(name).is_none() {
            self.register_family(name, size_of::<T>() as u32);
        }
        self.alloc(name, units).map(NonNull::cast)
    }

    /// Frees a pointer previously returned by [`Self::alloc`] or
    /// [`Self::alloc_typed`].
    ///
    /// # Safety
    /// `ptr` must be a pointer this heap returned that has not already been
    /// freed. Passing any other pointer is undefined behavior; there is no
    /// way to validate an arbitrary pointer's provenance.
    pub unsafe fn free(&mut self, ptr: NonNull<u8>) {
        engine::free(ptr);

        #[cfg(debug_assertions)]
        self.check_invariants();
    }

    pub fn registered_families(&self) -> Vec<FamilySummary> {
        diagnostics::family_summaries(&self.registry)
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        diagnostics::memory_usage(&self.registry)
    }

    pub fn block_usage(&self) -> Vec<BlockUsage> {
        diagnostics::block_usage(&self.registry)
    }

    pub fn print_registered_families(&self) {
        diagnostics::print_registered_families(&self.registry)
    }

    pub fn print_memory_usage(&self) {
        diagnostics::print_memory_usage(&self.registry)
    }

    pub fn print_block_usage(&self) {
        diagnostics::print_block_usage(&self.registry)
    }

    #[cfg(debug_assertions)]
    fn check_invariants(&self) {
        engine::check_invariants(&self.registry);
    }

    /// Walks every family and asserts invariants I1-I6. Runs automatically
    /// after every `alloc`/`free` under debug assertions; exposed directly
    /// so tests can check invariants at arbitrary checkpoints regardless of
    /// build profile.
    pub fn check_invariants_for_test(&self) {
        engine::check_invariants(&self.registry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_alloc_free_round_trip() {
        let mut heap = HeapManager::init();
        heap.register_family("widget", 36);

        let ptr = heap.alloc("widget", 1).expect("alloc should succeed");
        heap.check_invariants_for_test();

        unsafe {
            heap.free(ptr);
        }
        heap.check_invariants_for_test();

        assert_eq!(heap.memory_usage().total_pages, 0);
    }

    #[test]
    fn alloc_zeroes_payload() {
        let mut heap = HeapManager::init();
        heap.register_family("widget", 36);
        let ptr = heap.alloc("widget", 1).unwrap();
        let bytes = unsafe { core::slice::from_raw_parts(ptr.as_ptr(), 36) };
        assert!(bytes.iter().all(|&b| b == 0));
        unsafe { heap.free(ptr) };
    }

    #[test]
    fn unknown_family_is_recoverable() {
        let mut heap = HeapManager::init();
        let err = heap.alloc("nope", 1).unwrap_err();
        assert_eq!(err, AllocError::UnknownFamily("nope".to_owned()));
    }

    #[test]
    fn oversized_request_is_recoverable() {
        let mut heap = HeapManager::init();
        heap.register_family("widget", 36);
        let too_many = (heap.max_payload_per_page() as i32) / 36 + 1000;
        let err = heap.alloc("widget", too_many).unwrap_err();
        assert!(matches!(err, AllocError::RequestTooLarge { .. }));
    }

    #[test]
    fn alloc_typed_infers_name_and_size() {
        struct Widget {
            _a: u64,
            _b: u64,
        }

        let mut heap = HeapManager::init();
        let ptr = heap.alloc_typed::<Widget>(1).unwrap();
        heap.check_invariants_for_test();
        unsafe {
            heap.free(ptr.cast());
        }
    }

    #[test]
    fn independent_families_do_not_share_pages() {
        let mut heap = HeapManager::init();
        heap.register_family("small", 36);
        heap.register_family("big", 72);

        let a = heap.alloc("small", 1).unwrap();
        let b = heap.alloc("big", 1).unwrap();

        assert_eq!(heap.memory_usage().total_pages, 2);

        unsafe {
            heap.free(a);
            heap.free(b);
        }
        assert_eq!(heap.memory_usage().total_pages, 0);
    }
}
