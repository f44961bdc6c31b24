//! The allocate-split and deallocate-coalesce state machines: the heart of
//! the allocator.

use core::ptr::NonNull;

use intrusive_list::Link;

use crate::block::{by_size_descending, BlockMeta, SplitClass, META_SIZE};
use crate::page::ApplicationPage;
use crate::registry::{FamilyDescriptor, Registry};

unsafe fn insert_free(mut family: NonNull<FamilyDescriptor>, mut block: NonNull<BlockMeta>) {
    block.as_mut().is_free = true;
    let link = BlockMeta::link_ptr(block);
    family.as_mut().free_list.priority_insert(link, by_size_descending);
}

unsafe fn remove_free(block: NonNull<BlockMeta>) {
    let link = BlockMeta::link_ptr(block);
    Link::remove(link);
}

unsafe fn grow_family(mut family: NonNull<FamilyDescriptor>) {
    let mut page = ApplicationPage::create(family);

    let old_head = family.as_ref().first_page;
    page.as_mut().next = old_head;
    if let Some(mut h) = old_head {
        h.as_mut().prev = Some(page);
    }
    family.as_mut().first_page = Some(page);

    let sentinel = ApplicationPage::sentinel_ptr(page);
    insert_free(family, sentinel);
}

/// Finds the worst-fit candidate big enough for `size`, growing the family
/// with a fresh page if the current candidate (if any) is too small.
unsafe fn select_or_grow(family: NonNull<FamilyDescriptor>, size: u32) -> NonNull<BlockMeta> {
    loop {
        if let Some(link) = family.as_ref().free_list.head() {
            let block = BlockMeta::from_link(link);
            if block.as_ref().block_size >= size {
                return block;
            }
        }
        grow_family(family);
    }
}

/// Splits off a trailing free block of `remainder - META_SIZE` bytes after
/// `block`, which has already been shrunk to its final `block_size`.
unsafe fn split_trailing(
    family: NonNull<FamilyDescriptor>,
    mut block: NonNull<BlockMeta>,
    remainder: u32,
) {
    let block_size = block.as_ref().block_size;
    let new_addr = (block.as_ptr() as *mut u8).add(META_SIZE + block_size as usize);
    let mut new_block = NonNull::new_unchecked(new_addr as *mut BlockMeta);
    let new_offset = block.as_ref().offset + META_SIZE as u32 + block_size;
    let new_size = remainder - META_SIZE as u32;

    BlockMeta::init(new_block, new_offset, new_size);

    new_block.as_mut().prev = Some(block);
    new_block.as_mut().next = block.as_ref().next;
    if let Some(mut next) = block.as_ref().next {
        next.as_mut().prev = Some(new_block);
    }
    block.as_mut().next = Some(new_block);

    insert_free(family, new_block);
}

/// Allocates `size` payload bytes from `family`, returning the payload
/// pointer. The caller is responsible for zeroing exactly `size` bytes.
///
/// # Safety
/// `family` must be a valid, stable pointer to a registered family.
pub unsafe fn alloc(mut family: NonNull<FamilyDescriptor>, size: u32) -> NonNull<u8> {
    let mut block = select_or_grow(family, size);
    remove_free(block);

    let original_size = block.as_ref().block_size;
    block.as_mut().is_free = false;
    block.as_mut().block_size = size;

    let remainder = original_size - size;
    let element_size = family.as_ref().element_size;
    let class = SplitClass::classify(remainder, element_size);
    family.as_mut().split_counts.record(class);
    match class {
        SplitClass::NoSplit | SplitClass::HardFragmentation => {
            // Hard-fragmentation bytes are absorbed silently; they are
            // recovered by tail-slack recovery the next time this block is
            // freed.
        }
        SplitClass::SoftFragmentation | SplitClass::FullSplit => {
            split_trailing(family, block, remainder);
        }
    }

    BlockMeta::user_ptr(block)
}

unsafe fn recover_tail_slack(page: NonNull<ApplicationPage>, mut block: NonNull<BlockMeta>) {
    if let Some(next) = block.as_ref().next {
        let logical_end = block.as_ptr() as usize + META_SIZE + block.as_ref().block_size as usize;
        let gap = next.as_ptr() as usize - logical_end;
        block.as_mut().block_size += gap as u32;
    } else {
        let page_end = ApplicationPage::payload_end(page);
        let header_end = block.as_ptr() as usize + META_SIZE;
        block.as_mut().block_size = (page_end - header_end) as u32;
    }
}

unsafe fn coalesce_forward(mut block: NonNull<BlockMeta>, next: NonNull<BlockMeta>) {
    remove_free(next);
    block.as_mut().block_size += META_SIZE as u32 + next.as_ref().block_size;
    let after = next.as_ref().next;
    block.as_mut().next = after;
    if let Some(mut a) = after {
        a.as_mut().prev = Some(block);
    }
}

/// Merges `block` into `prev`, which survives. Returns `prev`.
unsafe fn coalesce_backward(
    mut prev: NonNull<BlockMeta>,
    block: NonNull<BlockMeta>,
) -> NonNull<BlockMeta> {
    remove_free(prev);
    prev.as_mut().block_size += META_SIZE as u32 + block.as_ref().block_size;
    let after = block.as_ref().next;
    prev.as_mut().next = after;
    if let Some(mut a) = after {
        a.as_mut().prev = Some(prev);
    }
    prev
}

unsafe fn reclaim_page(mut family: NonNull<FamilyDescriptor>, page: NonNull<ApplicationPage>) {
    let prev = page.as_ref().prev;
    let next = page.as_ref().next;
    if let Some(mut p) = prev {
        p.as_mut().next = next;
    } else {
        family.as_mut().first_page = next;
    }
    if let Some(mut n) = next {
        n.as_mut().prev = prev;
    }
    ApplicationPage::release(page);
}

/// Frees a block previously returned by [`alloc`], coalescing with free
/// neighbors and returning the owning page to the platform if it becomes
/// empty.
///
/// # Safety
/// `ptr` must have been returned by [`alloc`] for a block that has not
/// already been freed.
pub unsafe fn free(ptr: NonNull<u8>) {
    let mut block = BlockMeta::from_user_ptr(ptr);

    if block.as_ref().is_free {
        log::error!("double free detected");
        std::process::abort();
    }
    block.as_mut().is_free = true;

    let page = BlockMeta::page_base(block);
    let family = page.as_ref().family;

    recover_tail_slack(page, block);

    if let Some(next) = block.as_ref().next {
        if next.as_ref().is_free {
            coalesce_forward(block, next);
        }
    }

    let mut surviving = block;
    if let Some(prev) = surviving.as_ref().prev {
        if prev.as_ref().is_free {
            surviving = coalesce_backward(prev, surviving);
        }
    }

    if ApplicationPage::is_empty(page) {
        reclaim_page(family, page);
    } else {
        insert_free(family, surviving);
    }
}

/// Walks every family and asserts invariants I1-I6. A no-op in release
/// builds at call sites guarded by `debug_assertions`; exposed
/// unconditionally so tests can invoke it directly.
pub fn check_invariants(registry: &Registry) {
    for family in registry.iter() {
        unsafe { check_family(family) };
    }
}

unsafe fn check_family(family: NonNull<FamilyDescriptor>) {
    let mut page_cursor = family.as_ref().first_page;
    while let Some(page) = page_cursor {
        check_page(page);
        page_cursor = page.as_ref().next;
    }

    let mut prev_size: Option<u32> = None;
    for link in family.as_ref().free_list.iter() {
        let block = BlockMeta::from_link(link);
        debug_assert!(block.as_ref().is_free, "I1: free-list member must be free");
        if let Some(p) = prev_size {
            debug_assert!(
                p >= block.as_ref().block_size,
                "I6: free-list must be non-increasing by block_size"
            );
        }
        prev_size = Some(block.as_ref().block_size);
    }
}

unsafe fn check_page(page: NonNull<ApplicationPage>) {
    let page_base = page.as_ptr() as usize;
    let page_end = ApplicationPage::payload_end(page);

    let mut cursor = Some(ApplicationPage::sentinel_ptr(page));
    let mut prev_was_free = false;

    while let Some(block) = cursor {
        let b = block.as_ref();

        debug_assert_eq!(
            page_base + b.offset as usize,
            block.as_ptr() as usize,
            "I3: offset consistency"
        );
        debug_assert_eq!(
            b.is_free,
            b.free_node.is_linked(),
            "I1: free bit must match free-list membership"
        );
        debug_assert!(
            !(prev_was_free && b.is_free),
            "I4: no two adjacent free blocks"
        );

        match b.next {
            Some(next) => {
                let expected = block.as_ptr() as usize + META_SIZE + b.block_size as usize;
                debug_assert_eq!(expected, next.as_ptr() as usize, "I2: block contiguity");
            }
            None => {
                let end = block.as_ptr() as usize + META_SIZE + b.block_size as usize;
                debug_assert_eq!(end, page_end, "I5: last block ends at page end");
            }
        }

        prev_was_free = b.is_free;
        cursor = b.next;
    }
}
