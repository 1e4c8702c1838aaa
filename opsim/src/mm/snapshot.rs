//! Memory snapshots.

use super::frame::Frame;
use crate::{Pid, util::Timestamp};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

/// Frame occupancy at a quantum-cycle boundary.
#[derive(Clone, Debug)]
pub struct MemorySnapshot {
    /// Index of the quantum cycle.
    pub cycle: u64,
    /// Capture time.
    pub taken: Timestamp,
    /// Frame size.
    pub frame_size: usize,
    /// Frames, by ascending id.
    pub frames: Vec<Frame>,
}

impl MemorySnapshot {
    /// Processes owning at least one frame.
    pub fn processes(&self) -> BTreeSet<Pid> {
        self.frames.iter().filter_map(|f| f.owner).collect()
    }

    /// Size of physical memory.
    pub fn total_memory(&self) -> usize {
        self.frames.len() * self.frame_size
    }

    /// Bytes held by processes.
    pub fn used_memory(&self) -> usize {
        self.frames.iter().filter(|f| !f.is_free()).count() * self.frame_size
    }

    /// Bytes not held by any process.
    pub fn free_memory(&self) -> usize {
        self.total_memory() - self.used_memory()
    }

    /// Writes the snapshot to `memory_stamp_<cycle>.txt` under `dir`.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join(format!("memory_stamp_{}.txt", self.cycle));
        std::fs::write(&path, self.to_string())?;
        Ok(path)
    }
}

impl core::fmt::Display for MemorySnapshot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Timestamp: ({})", self.taken)?;
        writeln!(f, "Quantum cycle: {}", self.cycle)?;
        writeln!(f, "Number of processes in memory: {}", self.processes().len())?;
        writeln!(f, "Total memory: {}", self.total_memory())?;
        writeln!(f, "Used memory: {}", self.used_memory())?;
        writeln!(f, "Free memory: {}", self.free_memory())?;

        writeln!(f, "\nMemory layout:")?;
        for row in self.frames.chunks(64) {
            let line: String = row
                .iter()
                .map(|frame| if frame.is_free() { '.' } else { '#' })
                .collect();
            writeln!(f, "{line}")?;
        }

        writeln!(f, "\n----end---- = {}", self.total_memory())?;
        for frame in self.frames.iter().rev() {
            if let (Some(pid), Some(page)) = (frame.owner, frame.virtual_page) {
                let base = frame.id * self.frame_size;
                writeln!(f, "{}", base + self.frame_size)?;
                writeln!(f, "P{pid} page {page}")?;
                writeln!(f, "{base}\n")?;
            }
        }
        writeln!(f, "----start---- = 0")
    }
}
