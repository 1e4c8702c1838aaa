//! The backing store.
//!
//! Paging activity is recorded as an append-only sequence of
//! [`PagingEvent`]s, one text line each:
//!
//! ```text
//! ALLOC pid=3 mem=256 pages=4
//! PAGEFAULT pid=3 vpage=1
//! SWAPOUT pid=1 vpage=0 pframe=7
//! SWAPIN pid=3 vpage=1 pframe=7
//! DEALLOC pid=3
//! ```
//!
//! The most recent [`HISTORY`] events are kept in memory. When the store is
//! attached to a file, the file is truncated first and every event is
//! appended to it as well.

use crate::Pid;
use std::{
    collections::VecDeque,
    fs::{File, OpenOptions},
    io::{LineWriter, Seek, SeekFrom, Write},
    path::Path,
};

/// Number of events kept in memory.
pub const HISTORY: usize = 4096;

/// A paging event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PagingEvent {
    /// A page table was created.
    Alloc {
        /// Owner.
        pid: Pid,
        /// Address space size.
        mem: usize,
        /// Virtual pages of the address space.
        pages: usize,
    },
    /// A page was touched while unmapped.
    PageFault {
        /// Faulting process.
        pid: Pid,
        /// Faulting page.
        vpage: usize,
    },
    /// A page was brought into a frame.
    SwapIn {
        /// Owner.
        pid: Pid,
        /// Virtual page.
        vpage: usize,
        /// Frame receiving the page.
        pframe: usize,
    },
    /// A page was evicted from its frame.
    SwapOut {
        /// Owner of the victim.
        pid: Pid,
        /// Victim page.
        vpage: usize,
        /// Frame being reclaimed.
        pframe: usize,
    },
    /// Every frame and page of a process was released.
    Dealloc {
        /// Former owner.
        pid: Pid,
    },
}

impl core::fmt::Display for PagingEvent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PagingEvent::Alloc { pid, mem, pages } => {
                write!(f, "ALLOC pid={pid} mem={mem} pages={pages}")
            }
            PagingEvent::PageFault { pid, vpage } => write!(f, "PAGEFAULT pid={pid} vpage={vpage}"),
            PagingEvent::SwapIn { pid, vpage, pframe } => {
                write!(f, "SWAPIN pid={pid} vpage={vpage} pframe={pframe}")
            }
            PagingEvent::SwapOut { pid, vpage, pframe } => {
                write!(f, "SWAPOUT pid={pid} vpage={vpage} pframe={pframe}")
            }
            PagingEvent::Dealloc { pid } => write!(f, "DEALLOC pid={pid}"),
        }
    }
}

/// Append-only log of [`PagingEvent`]s.
#[derive(Debug, Default)]
pub struct BackingStore {
    history: VecDeque<PagingEvent>,
    recorded: u64,
    sink: Option<LineWriter<File>>,
}

impl BackingStore {
    /// Creates a store that also appends to the file at `path`, discarding
    /// whatever the file held before.
    pub fn with_file(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            sink: Some(LineWriter::new(file)),
            ..Default::default()
        })
    }

    /// Appends `event`.
    pub fn record(&mut self, event: PagingEvent) {
        log::trace!("Memory: {event}");
        if let Some(Err(e)) = self.sink.as_mut().map(|sink| writeln!(sink, "{event}")) {
            log::warn!("Memory: backing store is no longer written: {e}");
            self.sink = None;
        }
        if self.history.len() == HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(event);
        self.recorded += 1;
    }

    /// Drops the recorded events. The file, if any, is truncated.
    pub fn clear(&mut self) {
        self.history.clear();
        self.recorded = 0;
        if let Some(Err(e)) = self.sink.as_mut().map(truncate) {
            log::warn!("Memory: backing store is no longer written: {e}");
            self.sink = None;
        }
    }

    /// The most recent events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &PagingEvent> {
        self.history.iter()
    }

    /// Number of events recorded since the last [`BackingStore::clear`].
    pub fn recorded(&self) -> u64 {
        self.recorded
    }
}

fn truncate(sink: &mut LineWriter<File>) -> std::io::Result<()> {
    sink.flush()?;
    sink.get_mut().set_len(0)?;
    sink.get_mut().seek(SeekFrom::Start(0))?;
    Ok(())
}
