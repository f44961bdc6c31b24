//! Structured snapshots of live allocator state, plus `log`-based printers.
//!
//! These are diagnostic only: the snapshot types are the observable
//! contract, not any particular formatted string a caller might parse.

use crate::block::SplitCounts;
use crate::page::ApplicationPage;
use crate::registry::Registry;

#[derive(Debug, Clone)]
pub struct FamilySummary {
    pub name: String,
    pub element_size: u32,
    pub page_count: usize,
    pub free_block_count: usize,
    pub split_counts: SplitCounts,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryUsage {
    pub families: Vec<FamilySummary>,
    pub total_pages: usize,
}

#[derive(Debug, Clone)]
pub struct BlockUsage {
    pub family: String,
    pub page_index: usize,
    pub offset: u32,
    pub block_size: u32,
    pub is_free: bool,
}

pub(crate) fn family_summaries(registry: &Registry) -> Vec<FamilySummary> {
    registry
        .iter()
        .map(|family| unsafe {
            let f = family.as_ref();
            let mut page_count = 0;
            let mut cursor = f.first_page;
            while let Some(page) = cursor {
                page_count += 1;
                cursor = page.as_ref().next;
            }
            FamilySummary {
                name: f.name.clone(),
                element_size: f.element_size,
                page_count,
                free_block_count: f.free_list.count(),
                split_counts: f.split_counts,
            }
        })
        .collect()
}

pub(crate) fn memory_usage(registry: &Registry) -> MemoryUsage {
    let families = family_summaries(registry);
    let total_pages = families.iter().map(|f| f.page_count).sum();
    MemoryUsage {
        families,
        total_pages,
    }
}

pub(crate) fn block_usage(registry: &Registry) -> Vec<BlockUsage> {
    let mut out = Vec::new();
    for family in registry.iter() {
        unsafe {
            let f = family.as_ref();
            let mut page_index = 0;
            let mut page_cursor = f.first_page;
            while let Some(page) = page_cursor {
                let mut block_cursor = Some(ApplicationPage::sentinel_ptr(page));
                while let Some(block) = block_cursor {
                    let b = block.as_ref();
                    out.push(BlockUsage {
                        family: f.name.clone(),
                        page_index,
                        offset: b.offset,
                        block_size: b.block_size,
                        is_free: b.is_free,
                    });
                    block_cursor = b.next;
                }
                page_index += 1;
                page_cursor = page.as_ref().next;
            }
        }
    }
    out
}

pub fn print_registered_families(registry: &Registry) {
    for summary in family_summaries(registry) {
        log::info!(
            "family {:?}: element_size={} pages={} free_blocks={} splits(none={} hard={} soft={} full={})",
            summary.name,
            summary.element_size,
            summary.page_count,
            summary.free_block_count,
            summary.split_counts.no_split,
            summary.split_counts.hard_fragmentation,
            summary.split_counts.soft_fragmentation,
            summary.split_counts.full_split,
        );
    }
}

pub fn print_memory_usage(registry: &Registry) {
    let usage = memory_usage(registry);
    log::info!("total pages in use: {}", usage.total_pages);
    for summary in &usage.families {
        log::info!(
            "  {:?}: {} page(s), {} free block(s)",
            summary.name, summary.page_count, summary.free_block_count
        );
    }
}

pub fn print_block_usage(registry: &Registry) {
    for block in block_usage(registry) {
        log::info!(
            "{:?} page#{} offset={} size={} free={}",
            block.family, block.page_index, block.offset, block.block_size, block.is_free
        );
    }
}
