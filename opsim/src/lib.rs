//! # opsim
//!
//! `opsim` simulates the core of an operating-system kernel: a multi-core
//! CPU scheduler that dispatches synthetic processes onto worker cores, and a
//! demand-paged virtual-memory manager that backs their address spaces.
//!
//! A **process** in `opsim` is a small program written in a toy instruction
//! set ([`Instruction`]). Each scheduling *tick* executes exactly one
//! instruction of a process, or consumes one tick of a pending sleep. Programs
//! can print, declare and compute 16-bit variables, loop with bounded nesting,
//! and touch memory with `READ`/`WRITE`.
//!
//! ## Components
//!
//! - [`process`]: the process control block, the instruction set, the
//!   interpreter that advances a process by one tick, and the random program
//!   generator used by batch generation.
//! - [`mm`]: the [`MemoryManager`]. Frames are handed out lazily on the first
//!   touch of a page and reclaimed in FIFO order when physical memory runs out.
//! - [`sched`]: the [`Scheduler`] runtime. One OS thread per simulated core
//!   pulls processes from a shared ready queue under a First-Come-First-Served
//!   or Round-Robin [`Policy`].
//! - [`config`]: the [`SchedulerConfig`] and its `key value` file format.
//!
//! ## Example
//!
//! ```text
//! let scheduler = Scheduler::new();
//! scheduler.initialize(SchedulerConfig::default())?;
//! scheduler.add_process("p01", None)?;
//! scheduler.wait_idle(Duration::from_secs(10));
//! println!("{}", scheduler.status()?);
//! ```
//!
//! [`Instruction`]: process::Instruction
//! [`MemoryManager`]: mm::MemoryManager
//! [`Scheduler`]: sched::Scheduler
//! [`Policy`]: sched::policy::Policy
//! [`SchedulerConfig`]: config::SchedulerConfig

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod kprint;
pub mod mm;
pub mod process;
pub mod sched;
pub mod util;

pub use config::{PolicyKind, SchedulerConfig};
pub use error::{ConfigError, KernelError, MemoryFault, ParseError};
pub use sched::Scheduler;

/// Maximum number of simulated cores.
pub const MAX_CPU: usize = 128;

/// A process identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u32);

impl core::fmt::Display for Pid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}
