//! Per-process page tables.

use super::frame::FrameId;
use std::collections::BTreeMap;

bitflags::bitflags! {
    /// Flags of a page table entry.
    pub struct PteFlags: u8 {
        /// The page was read or written since it was mapped.
        const ACCESSED = 1 << 0;
        /// The page was written since it was mapped.
        const DIRTY = 1 << 1;
    }
}

/// A page table entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pte {
    /// Frame backing the page.
    pub frame: FrameId,
    /// Access flags.
    pub flags: PteFlags,
}

/// The mapping from virtual pages to frames of one process.
///
/// Created empty when the process is admitted to memory and populated on
/// demand.
#[derive(Clone, Debug)]
pub struct PageTable {
    memory_size: usize,
    page_count: usize,
    entries: BTreeMap<usize, Pte>,
}

impl PageTable {
    /// Creates an empty table for an address space of `memory_size` bytes
    /// split into pages of `page_size` bytes.
    pub fn new(memory_size: usize, page_size: usize) -> Self {
        Self {
            memory_size,
            page_count: memory_size.div_ceil(page_size.max(1)),
            entries: BTreeMap::new(),
        }
    }

    /// Size of the address space.
    pub fn memory_size(&self) -> usize {
        self.memory_size
    }

    /// Number of virtual pages of the address space.
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Number of pages currently backed by a frame.
    pub fn resident(&self) -> usize {
        self.entries.len()
    }

    /// Entry of `page`, if mapped.
    pub fn get(&self, page: usize) -> Option<&Pte> {
        self.entries.get(&page)
    }

    pub(crate) fn get_mut(&mut self, page: usize) -> Option<&mut Pte> {
        self.entries.get_mut(&page)
    }

    pub(crate) fn map(&mut self, page: usize, frame: FrameId) {
        self.entries.insert(
            page,
            Pte {
                frame,
                flags: PteFlags::ACCESSED,
            },
        );
    }

    pub(crate) fn unmap(&mut self, page: usize) -> Option<Pte> {
        self.entries.remove(&page)
    }

    /// Iterates over `(page, entry)` in page order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Pte)> {
        self.entries.iter().map(|(page, pte)| (*page, pte))
    }
}
