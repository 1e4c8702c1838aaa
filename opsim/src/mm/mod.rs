//! # Demand-paged memory management.
//!
//! Every simulated process owns a private address space of `memory_size`
//! bytes, split into virtual pages of `frame_size` bytes. Physical memory is
//! split into frames of the same size. Each address holds a 16-bit word.
//!
//! The [`MemoryManager`] follows the **demand paging** policy. Admitting a
//! process into memory with [`MemoryManager::allocate`] only creates an
//! empty [`PageTable`]; no frame is reserved. A frame is bound to a page the
//! first time the process touches an address of that page, through
//! [`MemoryManager::ensure_page_mapped`].
//!
//! ## Replacement
//!
//! When no frame is free, the manager reclaims the frame at the front of the
//! **FIFO queue**. Frames enter the back of the queue when they are bound to
//! a page, so the victim is always the frame that has been resident the
//! longest, whoever owns it. The victim may even belong to the process that
//! is faulting; the process simply faults again on its next touch of the
//! evicted page.
//!
//! The contents of an evicted page are kept in a swap area and restored when
//! the page is brought back. A page touched for the first time is
//! zero-filled.
//!
//! ## Invariants
//!
//! - A frame has an owner iff exactly one page table maps it and it appears
//!   exactly once in the FIFO queue.
//! - The frames owned by a process are exactly the frames its page table
//!   maps.
//!
//! [`MemoryManager::audit`] checks both.
//!
//! ## Backing store
//!
//! Allocation, page faults, swap-ins, swap-outs and deallocation are
//! recorded in the [`BackingStore`].

pub mod backing_store;
pub mod frame;
pub mod page_table;
pub mod snapshot;

use crate::{Pid, error::MemoryFault, process::MemoryBus, util::Timestamp};
use backing_store::{BackingStore, PagingEvent};
use frame::{Frame, FrameId};
use page_table::{PageTable, PteFlags};
use snapshot::MemorySnapshot;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    ops::Range,
};

/// The memory manager.
#[derive(Debug)]
pub struct MemoryManager {
    frame_size: usize,
    frames: Vec<Frame>,
    physical: Vec<u16>,
    page_tables: BTreeMap<Pid, PageTable>,
    fifo: VecDeque<FrameId>,
    swap: HashMap<(Pid, usize), Box<[u16]>>,
    backing_store: BackingStore,
    paged_in: u64,
    paged_out: u64,
}

impl MemoryManager {
    /// Creates a manager of `total_memory` bytes of physical memory.
    pub fn new(total_memory: usize, frame_size: usize) -> Self {
        Self::with_backing_store(total_memory, frame_size, BackingStore::default())
    }

    /// Creates a manager recording into `backing_store`.
    pub fn with_backing_store(
        total_memory: usize,
        frame_size: usize,
        backing_store: BackingStore,
    ) -> Self {
        let mut mm = Self {
            frame_size: 1,
            frames: Vec::new(),
            physical: Vec::new(),
            page_tables: BTreeMap::new(),
            fifo: VecDeque::new(),
            swap: HashMap::new(),
            backing_store,
            paged_in: 0,
            paged_out: 0,
        };
        mm.init(total_memory, frame_size);
        mm
    }

    /// Resets the manager to `total_memory / frame_size` free frames.
    ///
    /// Every page table, the FIFO queue and the swap area are dropped. The
    /// backing store is emptied, including its file.
    pub fn init(&mut self, total_memory: usize, frame_size: usize) {
        self.frame_size = frame_size.max(1);
        let count = total_memory / self.frame_size;
        self.frames = (0..count).map(Frame::free).collect();
        self.physical = vec![0; count * self.frame_size];
        self.page_tables.clear();
        self.fifo.clear();
        self.swap.clear();
        self.backing_store.clear();
        self.paged_in = 0;
        self.paged_out = 0;
        log::debug!(
            "Memory: {count} frames of {} bytes ({total_memory} bytes)",
            self.frame_size
        );
    }

    /// Admits `pid` with an address space of `memory_size` bytes.
    ///
    /// Only an empty page table is created. Returns false if `pid` already
    /// holds one.
    pub fn allocate(&mut self, pid: Pid, memory_size: usize) -> bool {
        if self.page_tables.contains_key(&pid) {
            return false;
        }
        let table = PageTable::new(memory_size, self.frame_size);
        self.backing_store.record(PagingEvent::Alloc {
            pid,
            mem: memory_size,
            pages: table.page_count(),
        });
        self.page_tables.insert(pid, table);
        true
    }

    /// Returns true if `pid` holds a page table.
    pub fn is_allocated(&self, pid: Pid) -> bool {
        self.page_tables.contains_key(&pid)
    }

    fn frame_range(&self, frame: FrameId) -> Range<usize> {
        frame * self.frame_size..(frame + 1) * self.frame_size
    }

    // Reclaims the frame at the front of the FIFO queue.
    fn evict(&mut self) -> Result<FrameId, MemoryFault> {
        let victim = self.fifo.pop_front().ok_or(MemoryFault::NoFrameAvailable)?;
        if let Some((owner, page)) = self.frames[victim].release() {
            if let Some(table) = self.page_tables.get_mut(&owner) {
                table.unmap(page);
            }
            let words = self.physical[self.frame_range(victim)].into();
            self.swap.insert((owner, page), words);
            self.backing_store.record(PagingEvent::SwapOut {
                pid: owner,
                vpage: page,
                pframe: victim,
            });
            self.paged_out += 1;
        }
        Ok(victim)
    }

    /// Returns the frame backing `page` of `pid`, mapping it if needed.
    ///
    /// An unmapped page gets the lowest free frame, or the frame evicted from
    /// the front of the FIFO queue when none is free.
    pub fn ensure_page_mapped(&mut self, pid: Pid, page: usize) -> Result<FrameId, MemoryFault> {
        let frame_size = self.frame_size;
        let table = self
            .page_tables
            .get_mut(&pid)
            .ok_or(MemoryFault::Unallocated(pid))?;
        if page >= table.page_count() {
            return Err(MemoryFault::InvalidAddress {
                addr: page * frame_size,
                size: table.memory_size(),
            });
        }
        if let Some(pte) = table.get_mut(page) {
            pte.flags |= PteFlags::ACCESSED;
            return Ok(pte.frame);
        }

        self.backing_store
            .record(PagingEvent::PageFault { pid, vpage: page });
        let frame = match self.frames.iter().position(Frame::is_free) {
            Some(free) => free,
            None => self.evict()?,
        };
        self.frames[frame].bind(pid, page);
        if let Some(table) = self.page_tables.get_mut(&pid) {
            table.map(page, frame);
        }
        self.fifo.push_back(frame);

        let range = self.frame_range(frame);
        match self.swap.remove(&(pid, page)) {
            Some(words) => self.physical[range].copy_from_slice(&words),
            None => self.physical[range].fill(0),
        }
        self.backing_store.record(PagingEvent::SwapIn {
            pid,
            vpage: page,
            pframe: frame,
        });
        self.paged_in += 1;
        Ok(frame)
    }

    /// Releases every frame and page of `pid`.
    ///
    /// Returns false if `pid` held no page table.
    pub fn deallocate(&mut self, pid: Pid) -> bool {
        let Some(table) = self.page_tables.remove(&pid) else {
            return false;
        };
        let freed = table
            .iter()
            .map(|(_, pte)| pte.frame)
            .collect::<BTreeSet<_>>();
        for frame in freed.iter() {
            self.frames[*frame].release();
        }
        self.fifo.retain(|frame| !freed.contains(frame));
        self.swap.retain(|(owner, _), _| *owner != pid);
        self.backing_store.record(PagingEvent::Dealloc { pid });
        true
    }

    // Maps `addr` of `pid` and returns the index of its word.
    fn translate(&mut self, pid: Pid, addr: usize) -> Result<(usize, usize), MemoryFault> {
        let table = self
            .page_tables
            .get(&pid)
            .ok_or(MemoryFault::Unallocated(pid))?;
        if addr >= table.memory_size() {
            return Err(MemoryFault::InvalidAddress {
                addr,
                size: table.memory_size(),
            });
        }
        let (page, offset) = (addr / self.frame_size, addr % self.frame_size);
        let frame = self.ensure_page_mapped(pid, page)?;
        Ok((page, frame * self.frame_size + offset))
    }

    /// Reads the word at `addr` of `pid`.
    pub fn read(&mut self, pid: Pid, addr: usize) -> Result<u16, MemoryFault> {
        let (_, index) = self.translate(pid, addr)?;
        Ok(self.physical[index])
    }

    /// Writes `value` at `addr` of `pid`.
    pub fn write(&mut self, pid: Pid, addr: usize, value: u16) -> Result<(), MemoryFault> {
        let (page, index) = self.translate(pid, addr)?;
        self.physical[index] = value;
        if let Some(pte) = self
            .page_tables
            .get_mut(&pid)
            .and_then(|table| table.get_mut(page))
        {
            pte.flags |= PteFlags::DIRTY;
        }
        Ok(())
    }

    /// Captures the frame occupancy for quantum cycle `cycle`.
    pub fn dump_status(&self, cycle: u64) -> MemorySnapshot {
        MemorySnapshot {
            cycle,
            taken: Timestamp::now(),
            frame_size: self.frame_size,
            frames: self.frames.clone(),
        }
    }

    /// Checks the frame table, the page tables and the FIFO queue against
    /// each other.
    pub fn audit(&self) -> Result<(), String> {
        let mut queued = vec![0usize; self.frames.len()];
        for frame in self.fifo.iter() {
            queued[*frame] += 1;
        }
        let mut mapped = vec![0usize; self.frames.len()];
        for (pid, table) in self.page_tables.iter() {
            for (page, pte) in table.iter() {
                mapped[pte.frame] += 1;
                let frame = &self.frames[pte.frame];
                if frame.owner != Some(*pid) || frame.virtual_page != Some(page) {
                    return Err(format!(
                        "frame {} is mapped by pid {pid} page {page} but held by {:?}",
                        pte.frame, frame
                    ));
                }
            }
        }
        for frame in self.frames.iter() {
            let expected = usize::from(!frame.is_free());
            if mapped[frame.id] != expected || queued[frame.id] != expected {
                return Err(format!(
                    "frame {} (owner {:?}) is mapped {} time(s) and queued {} time(s)",
                    frame.id, frame.owner, mapped[frame.id], queued[frame.id]
                ));
            }
        }
        Ok(())
    }

    /// Frame (and page) size.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// The frame table.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Size of physical memory.
    pub fn total_memory(&self) -> usize {
        self.frames.len() * self.frame_size
    }

    /// Bytes of physical memory held by processes.
    pub fn used_memory(&self) -> usize {
        self.fifo.len() * self.frame_size
    }

    /// Number of frames no process holds.
    pub fn free_frames(&self) -> usize {
        self.frames.len() - self.fifo.len()
    }

    /// Page table of `pid`.
    pub fn page_table(&self, pid: Pid) -> Option<&PageTable> {
        self.page_tables.get(&pid)
    }

    /// Processes holding a page table, with their resident page count.
    pub fn residents(&self) -> impl Iterator<Item = (Pid, usize)> {
        self.page_tables
            .iter()
            .map(|(pid, table)| (*pid, table.resident()))
    }

    /// The FIFO queue, next victim first.
    pub fn fifo(&self) -> impl Iterator<Item = FrameId> {
        self.fifo.iter().copied()
    }

    /// The backing store.
    pub fn backing_store(&self) -> &BackingStore {
        &self.backing_store
    }

    /// Number of pages brought into a frame.
    pub fn paged_in(&self) -> u64 {
        self.paged_in
    }

    /// Number of pages evicted from a frame.
    pub fn paged_out(&self) -> u64 {
        self.paged_out
    }
}

impl MemoryBus for MemoryManager {
    fn read(&mut self, pid: Pid, addr: usize) -> Result<u16, MemoryFault> {
        MemoryManager::read(self, pid, addr)
    }

    fn write(&mut self, pid: Pid, addr: usize, value: u16) -> Result<(), MemoryFault> {
        MemoryManager::write(self, pid, addr, value)
    }
}
