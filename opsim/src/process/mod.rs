//! # Processes.
//!
//! A [`Process`] is the unit the scheduler dispatches. It bundles a program
//! (a list of [`Instruction`]s) with its execution state: the program
//! counter, a bounded symbol table of 16-bit variables, a bounded loop stack,
//! a pending sleep, and the log of everything the program printed.
//!
//! A process is always owned by exactly one place. While it waits for a core
//! it lives in the scheduler's process table. A core that dispatches the
//! process takes it out of the table as a `Box<Process>` and has exclusive
//! access to it until the process is requeued or retired.
//!
//! ## Symbol table
//!
//! The [`SymbolTable`] holds at most [`SYMBOL_CAPACITY`] variables. A
//! declaration of a new variable on a full table is silently dropped, and
//! reading an undeclared variable declares it at 0 (subject to the same
//! capacity rule).
//!
//! ## Loops
//!
//! `FOR` loops nest at most [`LOOP_DEPTH`] deep. A `FOR` beyond that depth
//! is skipped, and so is its matching `END`.

pub mod generator;
pub mod instruction;
pub mod interpreter;

use crate::{Pid, util::Timestamp};
use arrayvec::ArrayVec;

pub use generator::{ProgramGenerator, RandomProgram};
pub use instruction::{Instruction, Operand, PrintPart};
pub use interpreter::{MemoryBus, StepOutcome};

/// Maximum number of variables of a process.
pub const SYMBOL_CAPACITY: usize = 32;

/// Maximum nesting depth of loops.
pub const LOOP_DEPTH: usize = 3;

/// The state of a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    /// Waiting in the ready queue.
    Ready,
    /// Dispatched on a core.
    Running,
    /// Executed its last instruction.
    Finished,
    /// Killed by a memory access violation.
    Crashed,
}

impl ProcessState {
    /// Returns true for `Finished` and `Crashed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Finished | ProcessState::Crashed)
    }
}

impl core::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.pad(match self {
            ProcessState::Ready => "Ready",
            ProcessState::Running => "Running",
            ProcessState::Finished => "Finished",
            ProcessState::Crashed => "Crashed",
        })
    }
}

/// Describes the memory access violation that crashed a process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrashReport {
    /// The offending logical address.
    pub addr: usize,
    /// When the violation happened.
    pub at: Timestamp,
    /// Human readable description.
    pub message: String,
}

#[derive(Clone, Debug)]
struct Symbol {
    name: String,
    value: u16,
}

/// A bounded map from variable names to 16-bit values.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    slots: ArrayVec<Symbol, SYMBOL_CAPACITY>,
}

impl SymbolTable {
    /// Value of `name`, if declared.
    pub fn get(&self, name: &str) -> Option<u16> {
        self.slots.iter().find(|s| s.name == name).map(|s| s.value)
    }

    /// Sets `name` to `value`.
    ///
    /// Returns false if `name` is new and the table is full, in which case
    /// nothing changes.
    pub fn set(&mut self, name: &str, value: u16) -> bool {
        if let Some(slot) = self.slots.iter_mut().find(|s| s.name == name) {
            slot.value = value;
            return true;
        }
        self.slots
            .try_push(Symbol {
                name: name.to_string(),
                value,
            })
            .is_ok()
    }

    /// Value of `name`, declaring it at 0 if absent.
    pub fn resolve(&mut self, name: &str) -> u16 {
        match self.get(name) {
            Some(value) => value,
            None => {
                self.set(name, 0);
                0
            }
        }
    }

    /// Number of declared variables.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no variable is declared.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates over `(name, value)` in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> {
        self.slots.iter().map(|s| (s.name.as_str(), s.value))
    }
}

/// An active loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopFrame {
    /// Index of the `FOR` instruction.
    pub start: usize,
    /// Iterations left, counting the running one.
    pub remaining: u32,
}

/// The stack of active loops.
#[derive(Clone, Debug, Default)]
pub struct LoopStack {
    frames: ArrayVec<LoopFrame, LOOP_DEPTH>,
    // `FOR`s skipped for depth whose `END` is still ahead.
    skipped: usize,
}

impl LoopStack {
    /// Enters the loop at `start`. Returns false if the loop was skipped.
    pub fn enter(&mut self, start: usize, repeats: u32) -> bool {
        let frame = LoopFrame {
            start,
            remaining: repeats.max(1),
        };
        if self.skipped > 0 || self.frames.try_push(frame).is_err() {
            self.skipped += 1;
            false
        } else {
            true
        }
    }

    /// Closes the innermost loop iteration.
    ///
    /// Returns the index to resume at when another iteration is due.
    pub fn next_iteration(&mut self) -> Option<usize> {
        if self.skipped > 0 {
            self.skipped -= 1;
            return None;
        }
        let top = self.frames.last_mut()?;
        top.remaining -= 1;
        if top.remaining > 0 {
            Some(top.start + 1)
        } else {
            self.frames.pop();
            None
        }
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

/// A simulated process.
#[derive(Debug)]
pub struct Process {
    pid: Pid,
    name: String,
    memory_size: usize,
    instructions: Vec<Instruction>,
    pub(crate) pc: usize,
    pub(crate) symbols: SymbolTable,
    pub(crate) loops: LoopStack,
    pub(crate) sleep_counter: u32,
    /// Ticks left in the current Round-Robin quantum.
    pub remaining_quantum: u64,
    pub(crate) state: ProcessState,
    pub(crate) core: Option<usize>,
    created: Timestamp,
    pub(crate) finished: Option<Timestamp>,
    pub(crate) log: Vec<String>,
    pub(crate) crash: Option<CrashReport>,
}

impl Process {
    /// Creates a `Ready` process.
    pub fn new(
        pid: Pid,
        name: impl Into<String>,
        memory_size: usize,
        instructions: Vec<Instruction>,
    ) -> Self {
        Self {
            pid,
            name: name.into(),
            memory_size,
            instructions,
            pc: 0,
            symbols: SymbolTable::default(),
            loops: LoopStack::default(),
            sleep_counter: 0,
            remaining_quantum: 0,
            state: ProcessState::Ready,
            core: None,
            created: Timestamp::now(),
            finished: None,
            log: Vec::new(),
            crash: None,
        }
    }

    /// Process id.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Process name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the address space.
    pub fn memory_size(&self) -> usize {
        self.memory_size
    }

    /// The program.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Index of the next instruction.
    pub fn program_counter(&self) -> usize {
        self.pc
    }

    /// Current state.
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Returns true while a `SLEEP` holds the process.
    pub fn is_sleeping(&self) -> bool {
        self.sleep_counter > 0
    }

    /// Core the process last ran on.
    pub fn core(&self) -> Option<usize> {
        self.core
    }

    /// Creation time.
    pub fn created(&self) -> Timestamp {
        self.created
    }

    /// Time the process finished or crashed.
    pub fn finished(&self) -> Option<Timestamp> {
        self.finished
    }

    /// The variables.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Printed lines, oldest first.
    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// The violation that crashed the process.
    pub fn crash_report(&self) -> Option<&CrashReport> {
        self.crash.as_ref()
    }
}
