//! # Scheduler configuration.
//!
//! The simulator is configured by a plain text file holding one `key value`
//! pair per line. Text after a `#` outside double quotes is a comment, and
//! values may be wrapped in double quotes.
//!
//! ```text
//! num-cpu 4
//! scheduler "rr"
//! quantum-cycles 5
//! batch-process-freq 1
//! min-ins 1000
//! max-ins 2000
//! delays-per-exec 0
//! max-overall-mem 16384
//! mem-per-frame 64
//! min-mem-per-proc 1024
//! max-mem-per-proc 4096
//! ```
//!
//! | key                  | range                                 |
//! |----------------------|---------------------------------------|
//! | `num-cpu`            | `[1, 128]`                            |
//! | `scheduler`          | `fcfs` or `rr`                        |
//! | `quantum-cycles`     | `[1, 2^32]`                           |
//! | `batch-process-freq` | `[1, 2^32]`                           |
//! | `min-ins`, `max-ins` | `[1, 2^32]`, `min-ins <= max-ins`     |
//! | `delays-per-exec`    | `[0, 2^32]`                           |
//! | memory keys          | power of two in `[64, 65536]`         |
//!
//! `min-mem-per-proc` must not exceed `max-mem-per-proc`. Unknown keys are
//! reported with a warning and otherwise ignored. [`SchedulerConfig::load_or_create`]
//! writes the defaults when the file does not exist yet.

use crate::{
    MAX_CPU,
    error::ConfigError,
    util::{MAX_MEMORY, MIN_MEMORY, is_pow2_within},
};
use std::{
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

const U32_SPAN: u64 = 1 << 32;

/// The scheduling policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyKind {
    /// First-Come-First-Served. A process keeps its core until it finishes.
    Fcfs,
    /// Round-Robin with a fixed quantum.
    RoundRobin,
}

impl FromStr for PolicyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_matches('"').to_ascii_lowercase().as_str() {
            "fcfs" => Ok(PolicyKind::Fcfs),
            "rr" => Ok(PolicyKind::RoundRobin),
            other => Err(ConfigError::UnknownPolicy(other.to_string())),
        }
    }
}

impl core::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            PolicyKind::Fcfs => "fcfs",
            PolicyKind::RoundRobin => "rr",
        })
    }
}

/// Configuration of a [`Scheduler`].
///
/// [`Scheduler`]: crate::sched::Scheduler
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of simulated cores.
    pub num_cpu: usize,
    /// Scheduling policy.
    pub policy: PolicyKind,
    /// Round-Robin quantum, and the interval of memory snapshots, in ticks.
    pub quantum_cycles: u64,
    /// Batch generation enqueues one process every this many clock ticks.
    pub batch_process_freq: u64,
    /// Minimum length of a generated program.
    pub min_ins: u64,
    /// Maximum length of a generated program.
    pub max_ins: u64,
    /// Busy-wait units spent on each instruction.
    pub delays_per_exec: u64,
    /// Physical memory size.
    pub max_overall_mem: usize,
    /// Frame (and page) size.
    pub mem_per_frame: usize,
    /// Smallest address space of a generated process.
    pub min_mem_per_proc: usize,
    /// Largest address space of a generated process.
    pub max_mem_per_proc: usize,
    /// Wall-clock length of one delay unit. Not read from the file.
    pub exec_unit: Duration,
    /// Directory receiving the paging log, snapshots, process logs and
    /// reports. Nothing is written to disk when unset. Not read from the file.
    pub output_dir: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            num_cpu: 4,
            policy: PolicyKind::RoundRobin,
            quantum_cycles: 5,
            batch_process_freq: 1,
            min_ins: 1000,
            max_ins: 2000,
            delays_per_exec: 0,
            max_overall_mem: 16384,
            mem_per_frame: 64,
            min_mem_per_proc: 1024,
            max_mem_per_proc: 4096,
            exec_unit: Duration::from_millis(10),
            output_dir: None,
        }
    }
}

fn number(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::NotANumber {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn within(key: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            key,
            value,
            min,
            max,
        })
    }
}

fn memory(key: &'static str, value: usize) -> Result<(), ConfigError> {
    let value = value as u64;
    within(key, value, MIN_MEMORY as u64, MAX_MEMORY as u64)?;
    if is_pow2_within(value, MIN_MEMORY as u64, MAX_MEMORY as u64) {
        Ok(())
    } else {
        Err(ConfigError::NotPowerOfTwo { key, value })
    }
}

fn ordered(
    min_key: &'static str,
    max_key: &'static str,
    min: u64,
    max: u64,
) -> Result<(), ConfigError> {
    if min <= max {
        Ok(())
    } else {
        Err(ConfigError::InvertedRange {
            min_key,
            max_key,
            min,
            max,
        })
    }
}

/// Cuts `line` at the first `#` outside double quotes.
fn strip_comment(line: &str) -> &str {
    let mut quoted = false;
    for (at, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '#' if !quoted => return &line[..at],
            _ => (),
        }
    }
    line
}

impl SchedulerConfig {
    /// Parses a configuration text.
    ///
    /// Keys absent from `text` keep their default value. The result is
    /// validated with [`SchedulerConfig::validate`].
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for (idx, raw) in text.lines().enumerate() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once(char::is_whitespace)
                .map(|(k, v)| (k, v.trim().trim_matches('"')))
                .ok_or(ConfigError::Malformed { line: idx + 1 })?;
            match key {
                "num-cpu" => config.num_cpu = number(key, value)? as usize,
                "scheduler" => config.policy = value.parse()?,
                "quantum-cycles" => config.quantum_cycles = number(key, value)?,
                "batch-process-freq" => config.batch_process_freq = number(key, value)?,
                "min-ins" => config.min_ins = number(key, value)?,
                "max-ins" => config.max_ins = number(key, value)?,
                "delays-per-exec" => config.delays_per_exec = number(key, value)?,
                "max-overall-mem" => config.max_overall_mem = number(key, value)? as usize,
                "mem-per-frame" => config.mem_per_frame = number(key, value)? as usize,
                "min-mem-per-proc" => config.min_mem_per_proc = number(key, value)? as usize,
                "max-mem-per-proc" => config.max_mem_per_proc = number(key, value)? as usize,
                unknown => log::warn!("Config: ignoring unknown key `{unknown}`"),
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration at `path`.
    ///
    /// When the file does not exist, it is created with the default
    /// configuration, which is returned.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                std::fs::write(path, config.to_string())?;
                log::info!(
                    "Config: {} not found, wrote the default configuration",
                    path.display()
                );
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Checks every range constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        within("num-cpu", self.num_cpu as u64, 1, MAX_CPU as u64)?;
        within("quantum-cycles", self.quantum_cycles, 1, U32_SPAN)?;
        within("batch-process-freq", self.batch_process_freq, 1, U32_SPAN)?;
        within("min-ins", self.min_ins, 1, U32_SPAN)?;
        within("max-ins", self.max_ins, 1, U32_SPAN)?;
        within("delays-per-exec", self.delays_per_exec, 0, U32_SPAN)?;
        ordered("min-ins", "max-ins", self.min_ins, self.max_ins)?;
        memory("max-overall-mem", self.max_overall_mem)?;
        memory("mem-per-frame", self.mem_per_frame)?;
        memory("min-mem-per-proc", self.min_mem_per_proc)?;
        memory("max-mem-per-proc", self.max_mem_per_proc)?;
        ordered(
            "min-mem-per-proc",
            "max-mem-per-proc",
            self.min_mem_per_proc as u64,
            self.max_mem_per_proc as u64,
        )
    }

    /// Number of physical frames.
    pub fn frame_count(&self) -> usize {
        self.max_overall_mem
            .checked_div(self.mem_per_frame)
            .unwrap_or(0)
    }

    /// Wall-clock time a core spends on each tick.
    pub fn tick_delay(&self) -> Duration {
        let units = u32::try_from(self.delays_per_exec.max(1)).unwrap_or(u32::MAX);
        self.exec_unit.saturating_mul(units)
    }
}

/// Renders the configuration in the file format.
impl core::fmt::Display for SchedulerConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "num-cpu {}", self.num_cpu)?;
        writeln!(f, "scheduler \"{}\"", self.policy)?;
        writeln!(f, "quantum-cycles {}", self.quantum_cycles)?;
        writeln!(f, "batch-process-freq {}", self.batch_process_freq)?;
        writeln!(f, "min-ins {}", self.min_ins)?;
        writeln!(f, "max-ins {}", self.max_ins)?;
        writeln!(f, "delays-per-exec {}", self.delays_per_exec)?;
        writeln!(f, "max-overall-mem {}", self.max_overall_mem)?;
        writeln!(f, "mem-per-frame {}", self.mem_per_frame)?;
        writeln!(f, "min-mem-per-proc {}", self.min_mem_per_proc)?;
        writeln!(f, "max-mem-per-proc {}", self.max_mem_per_proc)
    }
}
