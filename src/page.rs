//! Application pages: page-sized regions hosting one family's block chain.

use core::mem::size_of;
use core::ptr::NonNull;

use crate::block::BlockMeta;
use crate::platform;
use crate::registry::FamilyDescriptor;

/// Header occupying the lowest addresses of an application page. The
/// `sentinel` field is itself a `BlockMeta`, sitting at `SENTINEL_OFFSET`;
/// the payload region follows immediately after the sentinel's own meta
/// bytes, i.e. at `HEADER_SIZE`.
#[repr(C)]
pub struct ApplicationPage {
    pub next: Option<NonNull<ApplicationPage>>,
    pub prev: Option<NonNull<ApplicationPage>>,
    pub family: NonNull<FamilyDescriptor>,
    pub sentinel: BlockMeta,
}

/// Distance from a page base to the sentinel meta-block itself (I3 for the
/// sentinel): the size of the `next`/`prev`/`family` fields that precede it.
pub const SENTINEL_OFFSET: usize = core::mem::offset_of!(ApplicationPage, sentinel);

/// Distance from a page base to where payload bytes begin, i.e. past the
/// sentinel's own meta header.
pub const HEADER_SIZE: usize = size_of::<ApplicationPage>();

impl ApplicationPage {
    /// Acquires one fresh page from the platform and initializes its
    /// sentinel to span the whole payload, free.
    ///
    /// # Safety
    /// `family` must be a valid, stable pointer to a registered family.
    pub unsafe fn create(family: NonNull<FamilyDescriptor>) -> NonNull<ApplicationPage> {
        let sys_page_size = platform::page_size();
        let base = platform::map_pages(1);
        let page = base as *mut ApplicationPage;

        core::ptr::addr_of_mut!((*page).next).write(None);
        core::ptr::addr_of_mut!((*page).prev).write(None);
        core::ptr::addr_of_mut!((*page).family).write(family);

        let sentinel_ptr = NonNull::new_unchecked(core::ptr::addr_of_mut!((*page).sentinel));
        let payload_size = sys_page_size - HEADER_SIZE;
        BlockMeta::init(sentinel_ptr, SENTINEL_OFFSET as u32, payload_size as u32);

        NonNull::new_unchecked(page)
    }

    pub fn base(page: NonNull<ApplicationPage>) -> *mut u8 {
        page.as_ptr() as *mut u8
    }

    /// One past the last valid payload byte of `page`.
    pub fn payload_end(page: NonNull<ApplicationPage>) -> usize {
        Self::base(page) as usize + platform::page_size()
    }

    pub fn sentinel_ptr(mut page: NonNull<ApplicationPage>) -> NonNull<BlockMeta> {
        unsafe { NonNull::new_unchecked(&mut page.as_mut().sentinel as *mut BlockMeta) }
    }

    /// Structural emptiness (per the corrected definition: the original's
    /// free-bit-only check missed that the free-list could still hold other
    /// blocks): the sentinel is free and has no chain neighbors, meaning it
    /// is the page's only block.
    pub fn is_empty(page: NonNull<ApplicationPage>) -> bool {
        unsafe {
            let sentinel = &page.as_ref().sentinel;
            sentinel.is_free && sentinel.prev.is_none() && sentinel.next.is_none()
        }
    }

    /// Returns the page's memory to the platform.
    ///
    /// # Safety
    /// `page` must already be unlinked from its family's page list.
    pub unsafe fn release(page: NonNull<ApplicationPage>) {
        platform::unmap_pages(Self::base(page), 1);
    }
}
