//! The instruction interpreter.
//!
//! [`Process::step`] advances a process by one tick. A tick either consumes
//! one tick of a pending `SLEEP` or executes exactly one instruction.
//! Memory instructions go through a [`MemoryBus`], which the scheduler
//! backs with the shared [`MemoryManager`].
//!
//! [`MemoryManager`]: crate::mm::MemoryManager

use super::{CrashReport, Instruction, Operand, PrintPart, Process, ProcessState};
use crate::{Pid, error::MemoryFault, util::Timestamp};

/// Access to the memory of processes.
pub trait MemoryBus {
    /// Reads the word at logical address `addr` of `pid`.
    fn read(&mut self, pid: Pid, addr: usize) -> Result<u16, MemoryFault>;

    /// Writes `value` at logical address `addr` of `pid`.
    fn write(&mut self, pid: Pid, addr: usize, value: u16) -> Result<(), MemoryFault>;
}

/// The result of a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// An instruction executed.
    Executed,
    /// A tick of a pending sleep elapsed.
    Slept,
    /// The memory access could not get a frame. The program counter did not
    /// move, so the instruction is retried on the next dispatch.
    Stalled,
    /// The process executed its last instruction.
    Finished,
    /// The process hit a memory access violation.
    Crashed,
}

impl Process {
    fn value_of(&mut self, operand: &Operand) -> u16 {
        match operand {
            Operand::Literal(v) => *v,
            Operand::Var(name) => self.symbols.resolve(name),
        }
    }

    fn print(&mut self, core: usize, parts: &[PrintPart]) {
        let mut text = String::new();
        for part in parts {
            match part {
                PrintPart::Text(s) => text.push_str(s),
                PrintPart::Var(name) => {
                    let value = self.symbols.get(name).unwrap_or(0);
                    text.push_str(&value.to_string());
                }
            }
        }
        self.log
            .push(format!("({}) Core:{core} \"{text}\"", Timestamp::now()));
    }

    fn crash(&mut self, addr: usize) -> StepOutcome {
        let at = Timestamp::now();
        self.crash = Some(CrashReport {
            addr,
            at,
            message: format!(
                "{} | Memory access violation at address {addr:#x}",
                at.clock()
            ),
        });
        self.state = ProcessState::Crashed;
        self.finished = Some(at);
        StepOutcome::Crashed
    }

    fn finish_if_done(&mut self) -> bool {
        if self.pc >= self.instructions.len() {
            self.sleep_counter = 0;
            self.state = ProcessState::Finished;
            self.finished = Some(Timestamp::now());
            true
        } else {
            false
        }
    }

    /// Runs one tick of the process on `core`.
    ///
    /// A `SLEEP(n)` occupies `n` ticks counting the one that executes it.
    /// The process becomes `Finished` on the tick that executes its last
    /// instruction, even when that instruction is a `SLEEP`, and `Crashed`
    /// on the first access beyond its address space. A terminal process
    /// never advances again.
    pub fn step(&mut self, core: usize, bus: &mut dyn MemoryBus) -> StepOutcome {
        match self.state {
            ProcessState::Finished => return StepOutcome::Finished,
            ProcessState::Crashed => return StepOutcome::Crashed,
            _ => (),
        }
        self.core = Some(core);

        if self.sleep_counter > 0 {
            self.sleep_counter -= 1;
            return if self.finish_if_done() {
                StepOutcome::Finished
            } else {
                StepOutcome::Slept
            };
        }

        let Some(instruction) = self.instructions.get(self.pc).cloned() else {
            self.finish_if_done();
            return StepOutcome::Finished;
        };
        let mut next = self.pc + 1;

        match &instruction {
            Instruction::Print(parts) => self.print(core, parts),
            Instruction::Declare { var, value } => {
                self.symbols.set(var, *value);
            }
            Instruction::Add { dst, lhs, rhs } => {
                let value = self.value_of(lhs).wrapping_add(self.value_of(rhs));
                self.symbols.set(dst, value);
            }
            Instruction::Subtract { dst, lhs, rhs } => {
                let value = self.value_of(lhs).wrapping_sub(self.value_of(rhs));
                self.symbols.set(dst, value);
            }
            Instruction::Sleep(n) => self.sleep_counter = n.saturating_sub(1),
            Instruction::ForStart(repeats) => {
                self.loops.enter(self.pc, *repeats);
            }
            Instruction::ForEnd => {
                if let Some(resume) = self.loops.next_iteration() {
                    next = resume;
                }
            }
            Instruction::Read { var, addr } => match bus.read(self.pid, *addr) {
                Ok(value) => {
                    self.symbols.set(var, value);
                }
                Err(MemoryFault::InvalidAddress { addr, .. }) => return self.crash(addr),
                Err(_) => return StepOutcome::Stalled,
            },
            Instruction::Write { addr, value } => {
                let value = self.value_of(value);
                match bus.write(self.pid, *addr, value) {
                    Ok(()) => (),
                    Err(MemoryFault::InvalidAddress { addr, .. }) => return self.crash(addr),
                    Err(_) => return StepOutcome::Stalled,
                }
            }
        }

        self.pc = next;
        if self.finish_if_done() {
            StepOutcome::Finished
        } else {
            StepOutcome::Executed
        }
    }
}
