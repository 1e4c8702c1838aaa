//! Kernel print utilities.
//!
//! The simulator logs through the [`log`] facade. This module provides the
//! backend: every record is written to the standard error as a single line
//! tagged with its level, e.g. `[INFO] Scheduler: 4 cores online`.
//!
//! Logging can be silenced at runtime with [`set_quiet`], which is what the
//! test harness does to keep the output readable.

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

/// Suppresses every message while set.
pub static QUIET: AtomicBool = AtomicBool::new(false);

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        !QUIET.load(Ordering::SeqCst) && metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = render(record.level(), record.args());
        let mut guard = std::io::stderr().lock();
        let _ = writeln!(guard, "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Formats a record the way the kernel logger prints it.
pub fn render(level: Level, args: &core::fmt::Arguments<'_>) -> String {
    let tag = match level {
        Level::Error => "ERROR",
        Level::Warn => "WARN",
        Level::Info => "INFO",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    };
    format!("[{tag}] {args}")
}

/// Installs the kernel logger with the maximum `level`.
///
/// Only the first call installs the logger; later calls just adjust the
/// level.
pub fn init(level: LevelFilter) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}

/// Silences (or restores) the kernel logger.
pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::SeqCst);
}
