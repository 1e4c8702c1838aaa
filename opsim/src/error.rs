//! Error types of the simulator.

use crate::Pid;
use thiserror::Error;

/// Represents errors raised while reading or validating a
/// [`SchedulerConfig`].
///
/// [`SchedulerConfig`]: crate::config::SchedulerConfig
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A line that does not have the `key value` shape.
    #[error("line {line}: expected `key value`")]
    Malformed {
        /// 1-based line number.
        line: usize,
    },
    /// A numeric key holding something that is not a number.
    #[error("`{key}` expects a number, found `{value}`")]
    NotANumber {
        /// Offending key.
        key: String,
        /// Raw value.
        value: String,
    },
    /// The `scheduler` key names an unknown policy.
    #[error("unknown scheduler policy `{0}` (expected `fcfs` or `rr`)")]
    UnknownPolicy(String),
    /// A value outside of its permitted range.
    #[error("`{key}` = {value} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Offending key.
        key: &'static str,
        /// Parsed value.
        value: u64,
        /// Inclusive lower bound.
        min: u64,
        /// Inclusive upper bound.
        max: u64,
    },
    /// A memory parameter that is not a power of two.
    #[error("`{key}` = {value} is not a power of two")]
    NotPowerOfTwo {
        /// Offending key.
        key: &'static str,
        /// Parsed value.
        value: u64,
    },
    /// A `min-*` key larger than its `max-*` counterpart.
    #[error("`{min_key}` ({min}) exceeds `{max_key}` ({max})")]
    InvertedRange {
        /// Lower key.
        min_key: &'static str,
        /// Upper key.
        max_key: &'static str,
        /// Lower value.
        min: u64,
        /// Upper value.
        max: u64,
    },
    /// Failed to read or create the configuration file.
    #[error("config file: {0}")]
    Io(#[from] std::io::Error),
}

/// Represents errors of parsing a user supplied program.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The program holds no instruction.
    #[error("program is empty")]
    Empty,
    /// The program holds more instructions than allowed.
    #[error("program has {0} instructions, at most 50 are allowed")]
    TooLong(usize),
    /// Unknown opcode.
    #[error("unknown instruction `{0}`")]
    UnknownOpcode(String),
    /// Wrong number of operands.
    #[error("`{op}` expects {expected} operand(s), found {found}")]
    Arity {
        /// Opcode.
        op: &'static str,
        /// Expected operand count.
        expected: usize,
        /// Operands found.
        found: usize,
    },
    /// An operand that is neither a literal nor a variable name.
    #[error("invalid operand `{0}`")]
    InvalidOperand(String),
    /// A string literal without its closing quote.
    #[error("unterminated string literal")]
    UnterminatedString,
    /// `FOR` without `END`, or the other way round.
    #[error("unbalanced FOR/END")]
    UnbalancedLoop,
}

/// Represents faults of a memory access.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemoryFault {
    /// The address lies beyond the address space of the process.
    #[error("address {addr:#x} is outside of the {size}-byte address space")]
    InvalidAddress {
        /// Faulting address.
        addr: usize,
        /// Size of the address space.
        size: usize,
    },
    /// Neither a free frame nor an eviction victim exists.
    #[error("no physical frame available")]
    NoFrameAvailable,
    /// The process holds no page table.
    #[error("process {0} has no page table")]
    Unallocated(Pid),
}

/// Represents errors of a kernel operation.
///
/// These are surfaced synchronously to the caller of a [`Scheduler`]
/// operation. Faults raised while a process executes never appear here; they
/// are handled by the core that runs the process.
///
/// [`Scheduler`]: crate::sched::Scheduler
#[derive(Debug, Error)]
pub enum KernelError {
    /// Invalid configuration. (EINVAL)
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The scheduler has not been initialized. (EPERM)
    #[error("scheduler is not initialized")]
    NotInitialized,
    /// The scheduler is already initialized. (EBUSY)
    #[error("scheduler is already initialized")]
    AlreadyInitialized,
    /// A live process with the same name exists. (EEXIST)
    #[error("process `{0}` already exists")]
    DuplicateProcess(String),
    /// Memory size is not a power of two in the permitted range. (EINVAL)
    #[error("invalid memory size {size}: must be a power of two in [{min}, {max}]")]
    InvalidMemorySize {
        /// Requested size.
        size: usize,
        /// Inclusive lower bound.
        min: usize,
        /// Inclusive upper bound.
        max: usize,
    },
    /// Malformed program text. (ENOEXEC)
    #[error("invalid program: {0}")]
    InstructionParse(#[from] ParseError),
    /// No process with the name. (ENOENT)
    #[error("no such process `{0}`")]
    NoSuchProcess(String),
    /// IO Error. (EIO)
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl KernelError {
    /// Returns the errno-style negative code of the [`KernelError`].
    pub fn errno(&self) -> isize {
        match self {
            KernelError::NotInitialized => -1,
            KernelError::NoSuchProcess(_) => -2,
            KernelError::Io(_) => -5,
            KernelError::InstructionParse(_) => -8,
            KernelError::AlreadyInitialized => -16,
            KernelError::DuplicateProcess(_) => -17,
            KernelError::Config(_) | KernelError::InvalidMemorySize { .. } => -22,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_codes() {
        assert_eq!(KernelError::NotInitialized.errno(), -1);
        assert_eq!(KernelError::DuplicateProcess("p".into()).errno(), -17);
        assert_eq!(
            KernelError::from(ParseError::UnbalancedLoop).errno(),
            -8
        );
        assert_eq!(
            KernelError::from(ConfigError::UnknownPolicy("sjf".into())).errno(),
            -22
        );
    }

    #[test]
    fn fault_message_names_address() {
        let fault = MemoryFault::InvalidAddress {
            addr: 0x500,
            size: 256,
        };
        assert_eq!(
            fault.to_string(),
            "address 0x500 is outside of the 256-byte address space"
        );
    }
}
