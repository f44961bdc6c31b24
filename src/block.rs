//! Inline block metadata: the header that precedes every span of payload
//! bytes inside an application page.

use core::cmp::Ordering;
use core::mem::size_of;
use core::ptr::NonNull;

use intrusive_list::{container_of, Link};

use crate::page::ApplicationPage;

/// Size of a meta-block header, used throughout the split/coalesce
/// arithmetic.
pub const META_SIZE: usize = size_of::<BlockMeta>();

/// The header preceding a block's payload bytes.
#[repr(C)]
pub struct BlockMeta {
    pub is_free: bool,
    pub block_size: u32,
    pub offset: u32,
    pub free_node: Link,
    pub prev: Option<NonNull<BlockMeta>>,
    pub next: Option<NonNull<BlockMeta>>,
}

impl BlockMeta {
    /// Places a freshly initialized, free, standalone block at `ptr`.
    ///
    /// # Safety
    /// `ptr` must point at writable, otherwise-unoccupied memory large
    /// enough for a `BlockMeta`.
    pub unsafe fn init(ptr: NonNull<BlockMeta>, offset: u32, block_size: u32) {
        ptr.as_ptr().write(BlockMeta {
            is_free: true,
            block_size,
            offset,
            free_node: Link::new(),
            prev: None,
            next: None,
        });
    }

    /// The application page that owns `block`, recovered from its stored
    /// offset (I3).
    pub fn page_base(block: NonNull<BlockMeta>) -> NonNull<ApplicationPage> {
        unsafe {
            let addr = block.as_ptr() as usize - block.as_ref().offset as usize;
            NonNull::new_unchecked(addr as *mut ApplicationPage)
        }
    }

    /// The user-visible payload pointer for `block`.
    pub fn user_ptr(block: NonNull<BlockMeta>) -> NonNull<u8> {
        unsafe { NonNull::new_unchecked((block.as_ptr() as *mut u8).add(META_SIZE)) }
    }

    /// Recovers the owning block from a payload pointer previously returned
    /// by [`Self::user_ptr`].
    ///
    /// # Safety
    /// `ptr` must have been returned by `user_ptr` for a live block.
    pub unsafe fn from_user_ptr(ptr: NonNull<u8>) -> NonNull<BlockMeta> {
        NonNull::new_unchecked(ptr.as_ptr().sub(META_SIZE) as *mut BlockMeta)
    }

    /// Recovers the owning block from a pointer to its embedded free-list
    /// link.
    ///
    /// # Safety
    /// `link` must point at the `free_node` field of a live `BlockMeta`.
    pub unsafe fn from_link(link: NonNull<Link>) -> NonNull<BlockMeta> {
        container_of!(link.as_ptr(), BlockMeta, free_node)
    }

    /// A pointer to `block`'s embedded free-list link.
    pub fn link_ptr(mut block: NonNull<BlockMeta>) -> NonNull<Link> {
        unsafe { NonNull::new_unchecked(&mut block.as_mut().free_node as *mut Link) }
    }
}

/// Worst-fit comparator for the per-family free-list: larger blocks sort
/// first, so the list stays non-increasing by size (I6).
pub fn by_size_descending(a: NonNull<Link>, b: NonNull<Link>) -> Ordering {
    unsafe {
        let a_size = BlockMeta::from_link(a).as_ref().block_size;
        let b_size = BlockMeta::from_link(b).as_ref().block_size;
        b_size.cmp(&a_size)
    }
}

/// Classification of a split's leftover bytes. Soft/full affect no behavior
/// here but are preserved for diagnostics, as the remainder-counting is a
/// pure function of the remainder, meta size, and element size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitClass {
    NoSplit,
    HardFragmentation,
    SoftFragmentation,
    FullSplit,
}

impl SplitClass {
    pub fn classify(remainder: u32, element_size: u32) -> Self {
        if remainder == 0 {
            SplitClass::NoSplit
        } else if (remainder as usize) < META_SIZE {
            SplitClass::HardFragmentation
        } else if (remainder as usize) < META_SIZE + element_size as usize {
            SplitClass::SoftFragmentation
        } else {
            SplitClass::FullSplit
        }
    }
}

/// Running per-family tally of how every allocation's split was classified.
/// The soft/full distinction affects no allocator behavior, but must still
/// be counted and preserved for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitCounts {
    pub no_split: usize,
    pub hard_fragmentation: usize,
    pub soft_fragmentation: usize,
    pub full_split: usize,
}

impl SplitCounts {
    pub fn record(&mut self, class: SplitClass) {
        match class {
            SplitClass::NoSplit => self.no_split += 1,
            SplitClass::HardFragmentation => self.hard_fragmentation += 1,
            SplitClass::SoftFragmentation => self.soft_fragmentation += 1,
            SplitClass::FullSplit => self.full_split += 1,
        }
    }
}
