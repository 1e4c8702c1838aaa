//! Scheduling policies.

use crate::{config::PolicyKind, process::Process};

/// A trait for a scheduling policy.
///
/// The [`Policy`] decides how long a dispatched process may keep its core.
/// The ready queue itself is shared by every policy and is always served in
/// FIFO order; a policy only decides *when* the running process goes back to
/// it.
pub trait Policy: Send + Sync {
    /// Name of the policy.
    fn name(&self) -> &'static str;

    /// Called when `process` is dispatched onto a core.
    fn on_dispatch(&self, process: &mut Process);

    /// Called after every tick of the running `process`.
    ///
    /// Returns true if the process used up its time slice and should yield
    /// the core to the next ready process.
    fn timer_tick(&self, process: &mut Process) -> bool;
}

/// First-Come-First-Served. A process runs until it finishes or crashes.
pub struct Fcfs;

impl Policy for Fcfs {
    fn name(&self) -> &'static str {
        "fcfs"
    }

    fn on_dispatch(&self, process: &mut Process) {
        process.remaining_quantum = 0;
    }

    fn timer_tick(&self, _process: &mut Process) -> bool {
        false
    }
}

/// A round robin policy.
///
/// Each dispatch grants the process `quantum` ticks. Once they are used up,
/// and the process is not sleeping, it yields the core.
pub struct RoundRobin {
    quantum: u64,
}

impl RoundRobin {
    /// Creates a [`RoundRobin`] policy with a time slice of `quantum` ticks.
    pub fn new(quantum: u64) -> Self {
        Self {
            quantum: quantum.max(1),
        }
    }

    /// The time slice.
    pub fn quantum(&self) -> u64 {
        self.quantum
    }
}

impl Policy for RoundRobin {
    fn name(&self) -> &'static str {
        "rr"
    }

    fn on_dispatch(&self, process: &mut Process) {
        process.remaining_quantum = self.quantum;
    }

    fn timer_tick(&self, process: &mut Process) -> bool {
        process.remaining_quantum = process.remaining_quantum.saturating_sub(1);
        process.remaining_quantum == 0 && !process.is_sleeping()
    }
}

/// Builds the policy of `kind`.
pub fn from_kind(kind: PolicyKind, quantum: u64) -> Box<dyn Policy> {
    match kind {
        PolicyKind::Fcfs => Box::new(Fcfs),
        PolicyKind::RoundRobin => Box::new(RoundRobin::new(quantum)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Pid, process::Instruction};

    #[test]
    fn quantum_expires_after_slice() {
        let policy = RoundRobin::new(3);
        let mut process = Process::new(Pid(0), "p", 64, vec![Instruction::ForEnd; 8]);
        policy.on_dispatch(&mut process);
        assert!(!policy.timer_tick(&mut process));
        assert!(!policy.timer_tick(&mut process));
        assert!(policy.timer_tick(&mut process));
        policy.on_dispatch(&mut process);
        assert_eq!(process.remaining_quantum, 3);
    }

    #[test]
    fn sleeping_process_keeps_core() {
        let policy = RoundRobin::new(1);
        let mut process = Process::new(Pid(0), "p", 64, vec![Instruction::Sleep(5)]);
        policy.on_dispatch(&mut process);
        process.sleep_counter = 4;
        assert!(!policy.timer_tick(&mut process));
        process.sleep_counter = 0;
        assert!(policy.timer_tick(&mut process));
    }

    #[test]
    fn fcfs_never_preempts() {
        let mut process = Process::new(Pid(0), "p", 64, Vec::new());
        Fcfs.on_dispatch(&mut process);
        assert!((0..100).all(|_| !Fcfs.timer_tick(&mut process)));
        assert_eq!(from_kind(PolicyKind::Fcfs, 5).name(), "fcfs");
        assert_eq!(from_kind(PolicyKind::RoundRobin, 5).name(), "rr");
    }
}
