//! Reports of the scheduler state.
//!
//! Each report is a plain value with a [`Display`] implementation rendering
//! the text the console shows for it.
//!
//! [`Display`]: core::fmt::Display

use crate::{
    Pid,
    process::{CrashReport, ProcessState},
    util::Timestamp,
};

const RULE: &str = "----------------------------------------";

/// A process in a listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessLine {
    /// Process name.
    pub name: String,
    /// Process id.
    pub pid: Pid,
    /// Creation time for running processes, completion time for the others.
    pub time: Timestamp,
    /// Core running the process.
    pub core: Option<usize>,
    /// Executed instructions, i.e. the program counter.
    pub progress: usize,
    /// Length of the program.
    pub total: usize,
    /// State.
    pub state: ProcessState,
}

/// The CPU utilization report, shown by `screen -ls` and `report-util`.
#[derive(Clone, Debug)]
pub struct Status {
    /// Number of cores.
    pub num_cpu: usize,
    /// Processes waiting for a core.
    pub ready: usize,
    /// Processes on a core, by core.
    pub running: Vec<ProcessLine>,
    /// Finished and crashed processes, by completion.
    pub finished: Vec<ProcessLine>,
}

impl Status {
    /// Cores running a process.
    pub fn cores_used(&self) -> usize {
        self.running.len()
    }

    /// Cores without a process.
    pub fn cores_available(&self) -> usize {
        self.num_cpu.saturating_sub(self.running.len())
    }

    /// Share of busy cores, in percent.
    pub fn utilization(&self) -> f64 {
        percent(self.cores_used(), self.num_cpu)
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "CPU utilization: {:.0}%", self.utilization())?;
        writeln!(f, "Cores used: {}", self.cores_used())?;
        writeln!(f, "Cores available: {}", self.cores_available())?;
        writeln!(f, "\n{RULE}")?;
        writeln!(f, "Running processes:")?;
        for p in self.running.iter() {
            writeln!(
                f,
                "{:<10} ({})   Core: {:<3} {} / {}",
                p.name,
                p.time,
                p.core.map_or_else(|| "-".to_string(), |c| c.to_string()),
                p.progress,
                p.total
            )?;
        }
        writeln!(f, "\nFinished processes:")?;
        for p in self.finished.iter() {
            writeln!(
                f,
                "{:<10} ({})   {:<9} {} / {}",
                p.name, p.time, p.state, p.progress, p.total
            )?;
        }
        writeln!(f, "{RULE}")
    }
}

/// Memory and CPU tick counters, shown by `vmstat`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VmStat {
    /// Size of physical memory.
    pub total_memory: usize,
    /// Bytes held by processes.
    pub used_memory: usize,
    /// Bytes not held by any process.
    pub free_memory: usize,
    /// Core-ticks spent without a process.
    pub idle_ticks: u64,
    /// Core-ticks spent executing a process.
    pub active_ticks: u64,
    /// Pages brought into a frame.
    pub pages_in: u64,
    /// Pages evicted from a frame.
    pub pages_out: u64,
}

impl VmStat {
    /// Idle plus active ticks.
    pub fn total_ticks(&self) -> u64 {
        self.idle_ticks + self.active_ticks
    }
}

impl core::fmt::Display for VmStat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "{:>12} B total memory", self.total_memory)?;
        writeln!(f, "{:>12} B used memory", self.used_memory)?;
        writeln!(f, "{:>12} B free memory", self.free_memory)?;
        writeln!(f, "{:>12} idle cpu ticks", self.idle_ticks)?;
        writeln!(f, "{:>12} active cpu ticks", self.active_ticks)?;
        writeln!(f, "{:>12} total cpu ticks", self.total_ticks())?;
        writeln!(f, "{:>12} pages paged in", self.pages_in)?;
        writeln!(f, "{:>12} pages paged out", self.pages_out)
    }
}

/// Memory held by one process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryUsage {
    /// Process name.
    pub name: String,
    /// Process id.
    pub pid: Pid,
    /// Bytes of physical memory held.
    pub bytes: usize,
}

/// Summary of CPU and memory use, shown by `process-smi`.
#[derive(Clone, Debug)]
pub struct ProcessSmi {
    /// Share of busy cores, in percent.
    pub utilization: f64,
    /// Size of physical memory.
    pub total_memory: usize,
    /// Bytes held by processes.
    pub used_memory: usize,
    /// Processes holding a page table.
    pub processes: Vec<MemoryUsage>,
}

impl core::fmt::Display for ProcessSmi {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "{RULE}")?;
        writeln!(f, "| PROCESS-SMI V01.00 Driver Version: 01.00 |")?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "CPU-Util: {:.0}%", self.utilization)?;
        writeln!(
            f,
            "Memory Usage: {} B / {} B",
            self.used_memory, self.total_memory
        )?;
        writeln!(
            f,
            "Memory Util: {:.0}%",
            percent(self.used_memory, self.total_memory)
        )?;
        writeln!(f, "\nRunning processes and memory usage:")?;
        writeln!(f, "{RULE}")?;
        for p in self.processes.iter() {
            writeln!(f, "{:<10} {} B", p.name, p.bytes)?;
        }
        writeln!(f, "{RULE}")
    }
}

/// A single process, shown by `screen -r`.
#[derive(Clone, Debug)]
pub struct ProcessView {
    /// Process name.
    pub name: String,
    /// Process id.
    pub pid: Pid,
    /// State.
    pub state: ProcessState,
    /// Core the process runs on.
    pub core: Option<usize>,
    /// Size of the address space.
    pub memory_size: usize,
    /// Program counter.
    pub program_counter: usize,
    /// Length of the program.
    pub instruction_count: usize,
    /// Printed lines. Empty while the process is on a core.
    pub log: Vec<String>,
    /// The violation that crashed the process.
    pub crash: Option<CrashReport>,
}

impl core::fmt::Display for ProcessView {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Process name: {}", self.name)?;
        writeln!(f, "ID: {}", self.pid)?;
        writeln!(f, "Logs:")?;
        match (self.state, self.core) {
            (ProcessState::Running, Some(core)) => writeln!(f, "(running on core {core})")?,
            _ => {
                for line in self.log.iter() {
                    writeln!(f, "{line}")?;
                }
            }
        }
        writeln!(f)?;
        match (&self.crash, self.state) {
            (Some(crash), _) => writeln!(
                f,
                "Process {} shut down due to memory access violation error that occurred at {}. {:#x} invalid.",
                self.name,
                crash.at.clock(),
                crash.addr
            ),
            (None, ProcessState::Finished) => writeln!(f, "Finished!"),
            _ => {
                writeln!(f, "Current instruction line: {}", self.program_counter)?;
                writeln!(f, "Lines of code: {}", self.instruction_count)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(name: &str, core: Option<usize>, state: ProcessState) -> ProcessLine {
        ProcessLine {
            name: name.into(),
            pid: Pid(1),
            time: Timestamp::from_unix(0),
            core,
            progress: 3,
            total: 10,
            state,
        }
    }

    #[test]
    fn status_counts_cores() {
        let status = Status {
            num_cpu: 4,
            ready: 0,
            running: vec![line("p01", Some(2), ProcessState::Running)],
            finished: vec![line("p00", None, ProcessState::Crashed)],
        };
        assert_eq!(status.cores_available(), 3);
        assert_eq!(status.utilization(), 25.0);
        let text = status.to_string();
        assert!(text.contains("CPU utilization: 25%"));
        assert!(text.contains("Core: 2"));
        assert!(text.contains("Crashed"));
    }

    #[test]
    fn crashed_view_names_address() {
        let view = ProcessView {
            name: "p07".into(),
            pid: Pid(7),
            state: ProcessState::Crashed,
            core: Some(0),
            memory_size: 64,
            program_counter: 2,
            instruction_count: 5,
            log: Vec::new(),
            crash: Some(CrashReport {
                addr: 0x500,
                at: Timestamp::from_unix(3_600),
                message: String::new(),
            }),
        };
        assert!(view.to_string().ends_with(
            "Process p07 shut down due to memory access violation error that occurred at 01:00:00. 0x500 invalid.\n"
        ));
    }
}
