//! The process table.
//!
//! Every process admitted to the scheduler has exactly one [`Entry`], keyed
//! by pid. The entry records where the process is ([`Location`]) and, unless
//! a core is running it, owns the process itself. Dispatching a process
//! leases the `Box<Process>` out of its entry; requeueing or retiring it
//! puts the box back.

use crate::{
    Pid,
    error::KernelError,
    process::{Process, ProcessState},
    util::Timestamp,
};
use std::collections::{BTreeMap, HashMap};

/// Where a process is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Location {
    /// In the ready queue.
    Ready,
    /// Leased to the core.
    Running(usize),
    /// In the finished set, either finished or crashed.
    Finished,
}

/// An entry of the [`ProcessTable`].
#[derive(Debug)]
pub struct Entry {
    name: String,
    location: Location,
    created: Timestamp,
    instruction_count: usize,
    memory_size: usize,
    slot: Option<Box<Process>>,
}

impl Entry {
    /// Process name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current location.
    pub fn location(&self) -> Location {
        self.location
    }

    /// Creation time.
    pub fn created(&self) -> Timestamp {
        self.created
    }

    /// Length of the program.
    pub fn instruction_count(&self) -> usize {
        self.instruction_count
    }

    /// Size of the address space.
    pub fn memory_size(&self) -> usize {
        self.memory_size
    }

    /// The process, unless it is leased to a core.
    pub fn process(&self) -> Option<&Process> {
        self.slot.as_deref()
    }

    fn is_live(&self) -> bool {
        self.location != Location::Finished
    }
}

/// The table of every admitted process.
#[derive(Debug, Default)]
pub struct ProcessTable {
    entries: BTreeMap<Pid, Entry>,
    by_name: HashMap<String, Pid>,
}

impl ProcessTable {
    /// Admits `process` as `Ready`.
    ///
    /// Fails if a live process has the same name. A finished or crashed
    /// process with the name is shadowed by the new one.
    pub fn insert(&mut self, process: Box<Process>) -> Result<(), KernelError> {
        if self
            .find(process.name())
            .is_some_and(|(_, entry)| entry.is_live())
        {
            return Err(KernelError::DuplicateProcess(process.name().to_string()));
        }
        let pid = process.pid();
        self.by_name.insert(process.name().to_string(), pid);
        self.entries.insert(
            pid,
            Entry {
                name: process.name().to_string(),
                location: Location::Ready,
                created: process.created(),
                instruction_count: process.instructions().len(),
                memory_size: process.memory_size(),
                slot: Some(process),
            },
        );
        Ok(())
    }

    /// Leases the process `pid` to `core`.
    pub fn lease(&mut self, pid: Pid, core: usize) -> Option<Box<Process>> {
        let entry = self.entries.get_mut(&pid)?;
        let mut process = entry.slot.take()?;
        entry.location = Location::Running(core);
        process.state = ProcessState::Running;
        process.core = Some(core);
        Some(process)
    }

    /// Returns a leased process, to the ready queue unless it has
    /// terminated.
    pub fn restore(&mut self, mut process: Box<Process>) -> Location {
        let location = if process.state().is_terminal() {
            Location::Finished
        } else {
            process.state = ProcessState::Ready;
            Location::Ready
        };
        if let Some(entry) = self.entries.get_mut(&process.pid()) {
            entry.location = location;
            entry.slot = Some(process);
        }
        location
    }

    /// Entry of `pid`.
    pub fn get(&self, pid: Pid) -> Option<&Entry> {
        self.entries.get(&pid)
    }

    /// The most recent process named `name`.
    pub fn find(&self, name: &str) -> Option<(Pid, &Entry)> {
        let pid = *self.by_name.get(name)?;
        self.entries.get(&pid).map(|entry| (pid, entry))
    }

    /// Number of admitted processes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no process was admitted.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Instruction;

    fn process(pid: u32, name: &str) -> Box<Process> {
        Box::new(Process::new(
            Pid(pid),
            name,
            64,
            vec![Instruction::Sleep(1)],
        ))
    }

    #[test]
    fn lease_and_restore() {
        let mut table = ProcessTable::default();
        table.insert(process(0, "a")).unwrap();
        let leased = table.lease(Pid(0), 2).unwrap();
        assert_eq!(leased.state(), ProcessState::Running);
        assert_eq!(table.get(Pid(0)).unwrap().location(), Location::Running(2));
        assert!(table.get(Pid(0)).unwrap().process().is_none());
        assert!(table.lease(Pid(0), 1).is_none());
        assert_eq!(table.restore(leased), Location::Ready);
        assert_eq!(
            table.get(Pid(0)).unwrap().process().map(Process::state),
            Some(ProcessState::Ready)
        );
    }

    #[test]
    fn names_are_unique_among_live_processes() {
        let mut table = ProcessTable::default();
        table.insert(process(0, "a")).unwrap();
        assert!(matches!(
            table.insert(process(1, "a")),
            Err(KernelError::DuplicateProcess(name)) if name == "a"
        ));

        let mut leased = table.lease(Pid(0), 0).unwrap();
        leased.state = ProcessState::Finished;
        assert_eq!(table.restore(leased), Location::Finished);
        table.insert(process(2, "a")).unwrap();
        assert_eq!(table.find("a").map(|(pid, _)| pid), Some(Pid(2)));
        assert_eq!(table.len(), 2);
    }
}
