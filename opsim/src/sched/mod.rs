//! # Multicore Scheduling.
//!
//! The [`Scheduler`] shares the simulated cores between processes. Each
//! simulated core is an OS thread, so processes execute truly in parallel.
//!
//! ## Dispatching
//!
//! Admitted processes wait in a single **ready queue** shared by every core.
//! A core with nothing to run blocks on a condition variable until a process
//! becomes ready or the scheduler shuts down. It then takes the head of the
//! queue; cores never reorder the queue, so processes are dispatched in the
//! exact order they became ready.
//!
//! On its first dispatch, a process is admitted to memory with
//! [`MemoryManager::allocate`]. It keeps its page table until it terminates,
//! including while it waits in the ready queue after a preemption; frames are
//! only taken away from it by FIFO eviction.
//!
//! The core then runs the process one tick at a time. After each tick the
//! [`Policy`] decides whether the process used up its time slice:
//!
//! - Under **FCFS**, a process keeps its core until it finishes or crashes.
//! - Under **Round-Robin**, a process that used up `quantum-cycles` ticks
//!   while not sleeping goes back to the **tail** of the ready queue and gets
//!   a fresh quantum on its next dispatch. If no other process is ready, it
//!   keeps the core with a fresh quantum instead.
//!
//! A finished or crashed process moves to the finished set and its memory is
//! released with [`MemoryManager::deallocate`], exactly once.
//!
//! ## Locking
//!
//! The process table, the ready queue, the running and finished sets and the
//! [`MemoryManager`] live behind one scheduler-wide lock. A core holds it
//! only to dequeue, requeue, retire, or perform a single memory access, and
//! never while sleeping between ticks. The process being executed is leased
//! out of the table, so the core runs the interpreter without the lock.
//!
//! Counters shared by every core (the clock, the tick counters, the pid
//! counter) are atomics, and each core's own counters sit in a
//! [`CachePadded`] slot.
//!
//! ## Clock and snapshots
//!
//! Besides the cores, a tick thread advances the global clock once per
//! execution unit. On each clock tick it accounts idle cores and, while batch
//! generation is on, admits one new process every `batch-process-freq`
//! ticks.
//!
//! Whenever the global clock crosses a multiple of `quantum-cycles`, the
//! first core to execute a tick afterwards captures a [`MemorySnapshot`] and
//! queues it on a lock-free queue. At most one snapshot is taken per quantum
//! cycle, however many cores are busy. The tick thread writes the queued
//! snapshots to disk.
//!
//! ## Shutdown
//!
//! [`Scheduler::shutdown`] clears the running flag, wakes every blocked core
//! and joins every thread. A core finishes at most its in-flight tick and
//! returns its process to the ready queue. Shutting down twice, or dropping
//! a scheduler that was shut down, is harmless.
//!
//! [`MemoryManager`]: crate::mm::MemoryManager
//! [`MemoryManager::allocate`]: crate::mm::MemoryManager::allocate
//! [`MemoryManager::deallocate`]: crate::mm::MemoryManager::deallocate
//! [`MemorySnapshot`]: crate::mm::snapshot::MemorySnapshot
//! [`Policy`]: policy::Policy
//! [`CachePadded`]: crossbeam_utils::CachePadded

pub mod policy;
pub mod report;
pub mod table;

use crate::{
    Pid,
    config::SchedulerConfig,
    error::{KernelError, MemoryFault},
    mm::{MemoryManager, backing_store::BackingStore, snapshot::MemorySnapshot},
    process::{
        Instruction, MemoryBus, Process, ProcessState, ProgramGenerator, RandomProgram,
        StepOutcome,
    },
    util::{MAX_MEMORY, MIN_MEMORY, is_pow2_within, pow2_range, use_system_offset},
};
use crossbeam_queue::SegQueue;
use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex};
use policy::Policy;
use report::{MemoryUsage, ProcessLine, ProcessSmi, ProcessView, Status, VmStat};
use std::{
    collections::{BTreeSet, VecDeque},
    fs::OpenOptions,
    io::Write,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering},
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};
use table::{Location, ProcessTable};

/// Number of dispatches kept by [`Scheduler::dispatch_history`].
pub const DISPATCH_HISTORY: usize = 4096;

const IDLE: u64 = u64::MAX;

/// Per-core counters.
struct PerCore {
    /// Ticks spent executing a process.
    active_ticks: AtomicU64,
    /// Pid of the process on the core, or `IDLE`.
    current: AtomicU64,
    /// Program counter of that process after its last tick.
    pc: AtomicUsize,
}

/// Everything behind the scheduler-wide lock.
struct KernelState {
    table: ProcessTable,
    ready: VecDeque<Pid>,
    running: BTreeSet<Pid>,
    finished: Vec<Pid>,
    memory: MemoryManager,
    dispatches: VecDeque<Pid>,
}

impl KernelState {
    fn is_idle(&self) -> bool {
        self.ready.is_empty() && self.running.is_empty()
    }
}

/// State shared by the cores, the tick thread and the [`Scheduler`].
struct Shared {
    config: SchedulerConfig,
    policy: Box<dyn Policy>,
    state: Mutex<KernelState>,
    /// Signaled when a process becomes ready, and on shutdown.
    wakeup: Condvar,
    /// Signaled when a process leaves a core.
    settled: Condvar,
    running: AtomicBool,
    batching: AtomicBool,
    clock: AtomicU64,
    /// Last quantum cycle of the clock a snapshot was captured for.
    last_cycle: AtomicU64,
    idle_ticks: AtomicU64,
    snapshots_taken: AtomicU64,
    next_pid: AtomicU32,
    next_batch: AtomicU64,
    cores: Vec<CachePadded<PerCore>>,
    snapshots: SegQueue<MemorySnapshot>,
    generator: Mutex<Box<dyn ProgramGenerator>>,
}

/// Why a process left its core.
enum Yield {
    /// The quantum expired.
    Preempted,
    /// A memory access found no frame.
    Stalled,
    /// Finished or crashed.
    Terminated,
    /// The scheduler is shutting down.
    Shutdown,
}

/// A [`MemoryBus`] taking the scheduler-wide lock for each access.
struct SharedMemory<'a>(&'a Mutex<KernelState>);

impl MemoryBus for SharedMemory<'_> {
    fn read(&mut self, pid: Pid, addr: usize) -> Result<u16, MemoryFault> {
        self.0.lock().memory.read(pid, addr)
    }

    fn write(&mut self, pid: Pid, addr: usize, value: u16) -> Result<(), MemoryFault> {
        self.0.lock().memory.write(pid, addr, value)
    }
}

impl Shared {
    fn admit(
        &self,
        name: &str,
        memory_size: Option<usize>,
        program: Option<Vec<Instruction>>,
    ) -> Result<Pid, KernelError> {
        let memory_size = match memory_size {
            Some(size) if is_pow2_within(size as u64, MIN_MEMORY as u64, MAX_MEMORY as u64) => {
                size
            }
            Some(size) => {
                return Err(KernelError::InvalidMemorySize {
                    size,
                    min: MIN_MEMORY,
                    max: MAX_MEMORY,
                });
            }
            None => {
                let choices = pow2_range(self.config.min_mem_per_proc, self.config.max_mem_per_proc)
                    .collect::<Vec<_>>();
                self.generator
                    .lock()
                    .pick(&choices)
                    .unwrap_or(self.config.min_mem_per_proc)
            }
        };
        let instructions = match program {
            Some(program) => program,
            None => {
                let mut generator = self.generator.lock();
                let count = generator.length(self.config.min_ins, self.config.max_ins);
                generator.generate(name, count, memory_size)
            }
        };

        let pid = Pid(self.next_pid.fetch_add(1, Ordering::SeqCst));
        let count = instructions.len();
        let process = Box::new(Process::new(pid, name, memory_size, instructions));
        let mut state = self.state.lock();
        state.table.insert(process)?;
        state.ready.push_back(pid);
        drop(state);
        self.wakeup.notify_one();
        log::debug!(
            "Scheduler: admitted {name} (pid {pid}, {count} instructions, {memory_size} bytes)"
        );
        Ok(pid)
    }

    /// Blocks until a process is ready, and leases it to `core`.
    fn dispatch(&self, core: usize) -> Option<Box<Process>> {
        let mut state = self.state.lock();
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return None;
            }
            let Some(pid) = state.ready.pop_front() else {
                self.wakeup.wait(&mut state);
                continue;
            };
            let Some(memory_size) = state.table.get(pid).map(|entry| entry.memory_size()) else {
                continue;
            };
            if !state.memory.is_allocated(pid) {
                state.memory.allocate(pid, memory_size);
            }
            let Some(mut process) = state.table.lease(pid, core) else {
                continue;
            };
            state.running.insert(pid);
            if state.dispatches.len() == DISPATCH_HISTORY {
                state.dispatches.pop_front();
            }
            state.dispatches.push_back(pid);
            drop(state);

            self.policy.on_dispatch(&mut process);
            let slot = &self.cores[core];
            slot.current.store(u64::from(pid.0), Ordering::SeqCst);
            slot.pc.store(process.program_counter(), Ordering::SeqCst);
            log::trace!("Scheduler: core {core} runs {}", process.name());
            return Some(process);
        }
    }

    /// Runs `process` on `core` until it leaves the core.
    fn run(&self, core: usize, process: &mut Process) -> Yield {
        let delay = self.config.tick_delay();
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return Yield::Shutdown;
            }
            let printed = process.log().len();
            let outcome = process.step(core, &mut SharedMemory(&self.state));
            self.cores[core].active_ticks.fetch_add(1, Ordering::SeqCst);
            self.cores[core]
                .pc
                .store(process.program_counter(), Ordering::SeqCst);
            self.capture_quantum_cycle();
            self.append_log(process, printed);
            std::thread::sleep(delay);

            match outcome {
                StepOutcome::Finished | StepOutcome::Crashed => return Yield::Terminated,
                StepOutcome::Stalled => return Yield::Stalled,
                StepOutcome::Executed | StepOutcome::Slept => (),
            }
            if self.policy.timer_tick(process) {
                if !self.state.lock().ready.is_empty() {
                    return Yield::Preempted;
                }
                self.policy.on_dispatch(process);
            }
        }
    }

    /// Puts a process back after it left `core`.
    fn release(&self, core: usize, process: Box<Process>, why: Yield) {
        self.cores[core].current.store(IDLE, Ordering::SeqCst);
        let pid = process.pid();
        let name = process.name().to_string();
        let crash = process.crash_report().map(|c| c.message.clone());

        let mut state = self.state.lock();
        state.running.remove(&pid);
        let requeued = match state.table.restore(process) {
            Location::Finished => {
                state.finished.push(pid);
                state.memory.deallocate(pid);
                false
            }
            _ => {
                state.ready.push_back(pid);
                true
            }
        };
        drop(state);

        match (why, crash) {
            (Yield::Terminated, Some(message)) => {
                log::warn!("Scheduler: {name} crashed on core {core}: {message}")
            }
            (Yield::Terminated, None) => log::debug!("Scheduler: {name} finished on core {core}"),
            (Yield::Stalled, _) => log::debug!("Scheduler: {name} stalled waiting for a frame"),
            (Yield::Preempted, _) => log::trace!("Scheduler: {name} preempted on core {core}"),
            (Yield::Shutdown, _) => (),
        }
        if requeued {
            self.wakeup.notify_one();
        }
        self.settled.notify_all();
    }

    /// Captures a snapshot if the clock entered a quantum cycle that has
    /// none yet.
    fn capture_quantum_cycle(&self) {
        let cycle = self.clock.load(Ordering::SeqCst) / self.config.quantum_cycles;
        let last = self.last_cycle.load(Ordering::SeqCst);
        if cycle <= last
            || self
                .last_cycle
                .compare_exchange(last, cycle, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
        {
            return;
        }
        let snapshot = self.state.lock().memory.dump_status(cycle);
        self.snapshots.push(snapshot);
        self.snapshots_taken.fetch_add(1, Ordering::SeqCst);
    }

    /// Appends the lines `process` printed since `from` to its log file.
    fn append_log(&self, process: &Process, from: usize) {
        let (Some(dir), Some(lines)) = (&self.config.output_dir, process.log().get(from..)) else {
            return;
        };
        if lines.is_empty() {
            return;
        }
        let path = dir.join("logs").join(format!("{}.txt", process.name()));
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| lines.iter().try_for_each(|line| writeln!(file, "{line}")));
        if let Err(e) = result {
            log::warn!("Scheduler: cannot write {}: {e}", path.display());
        }
    }

    fn flush_snapshots(&self) {
        while let Some(snapshot) = self.snapshots.pop() {
            let Some(dir) = &self.config.output_dir else {
                continue;
            };
            if let Err(e) = snapshot.write_to(dir) {
                log::warn!("Memory: cannot write snapshot {}: {e}", snapshot.cycle);
            }
        }
    }

    fn idle_cores(&self) -> usize {
        self.cores
            .iter()
            .filter(|slot| slot.current.load(Ordering::SeqCst) == IDLE)
            .count()
    }

    fn status(&self) -> Status {
        let state = self.state.lock();
        let running = state
            .running
            .iter()
            .filter_map(|pid| {
                let entry = state.table.get(*pid)?;
                let core = match entry.location() {
                    Location::Running(core) => Some(core),
                    _ => None,
                };
                Some(ProcessLine {
                    name: entry.name().to_string(),
                    pid: *pid,
                    time: entry.created(),
                    core,
                    progress: core.map_or(0, |c| self.cores[c].pc.load(Ordering::SeqCst)),
                    total: entry.instruction_count(),
                    state: ProcessState::Running,
                })
            })
            .collect();
        let finished = state
            .finished
            .iter()
            .filter_map(|pid| {
                let entry = state.table.get(*pid)?;
                let process = entry.process()?;
                Some(ProcessLine {
                    name: entry.name().to_string(),
                    pid: *pid,
                    time: process.finished().unwrap_or(entry.created()),
                    core: process.core(),
                    progress: process.program_counter(),
                    total: entry.instruction_count(),
                    state: process.state(),
                })
            })
            .collect();
        Status {
            num_cpu: self.config.num_cpu,
            ready: state.ready.len(),
            running,
            finished,
        }
    }
}

fn worker(shared: Arc<Shared>, core: usize) {
    log::debug!("Scheduler: core {core} online");
    while let Some(mut process) = shared.dispatch(core) {
        let why = shared.run(core, &mut process);
        shared.release(core, process, why);
    }
    log::debug!("Scheduler: core {core} offline");
}

fn ticker(shared: Arc<Shared>) {
    let unit = shared.config.exec_unit;
    while shared.running.load(Ordering::SeqCst) {
        std::thread::sleep(unit);
        let now = shared.clock.fetch_add(1, Ordering::SeqCst) + 1;
        shared
            .idle_ticks
            .fetch_add(shared.idle_cores() as u64, Ordering::SeqCst);
        if shared.batching.load(Ordering::SeqCst) && now % shared.config.batch_process_freq == 0 {
            let name = format!("p{:02}", shared.next_batch.fetch_add(1, Ordering::SeqCst) + 1);
            if let Err(e) = shared.admit(&name, None, None) {
                log::debug!("Scheduler: batch process {name} skipped: {e}");
            }
        }
        shared.flush_snapshots();
    }
    shared.flush_snapshots();
}

/// An initialized scheduler.
struct Runtime {
    shared: Arc<Shared>,
    threads: Vec<JoinHandle<()>>,
}

impl Runtime {
    fn spawn(
        &mut self,
        name: String,
        f: impl FnOnce(Arc<Shared>) + Send + 'static,
    ) -> Result<(), KernelError> {
        let shared = self.shared.clone();
        let handle = std::thread::Builder::new()
            .name(name)
            .spawn(move || f(shared))?;
        self.threads.push(handle);
        Ok(())
    }

    fn start(&mut self, num_cpu: usize) -> Result<(), KernelError> {
        for core in 0..num_cpu {
            self.spawn(format!("core-{core}"), move |shared| worker(shared, core))?;
        }
        self.spawn("ticker".to_string(), ticker)
    }

    fn stop(self) {
        let shared = self.shared;
        shared.running.store(false, Ordering::SeqCst);
        {
            let _state = shared.state.lock();
            shared.wakeup.notify_all();
            shared.settled.notify_all();
        }
        for handle in self.threads {
            if handle.join().is_err() {
                log::error!("Scheduler: a thread panicked");
            }
        }
        shared.flush_snapshots();
    }
}

/// The scheduler.
///
/// The scheduler does nothing until [`Scheduler::initialize`] starts its
/// cores. Every other operation fails with [`KernelError::NotInitialized`]
/// before that.
pub struct Scheduler {
    runtime: Mutex<Option<Runtime>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Scheduler {
    /// Creates an uninitialized scheduler.
    pub fn new() -> Self {
        Self {
            runtime: Mutex::new(None),
        }
    }

    /// Validates `config` and starts the cores and the tick thread.
    ///
    /// Timestamps taken afterwards are rendered in the system time zone. An
    /// output directory, when set, is cleared of the paging log and process
    /// logs of an earlier run.
    ///
    /// Fails with [`KernelError::AlreadyInitialized`], without any effect, if
    /// the scheduler is already running.
    pub fn initialize(&self, config: SchedulerConfig) -> Result<(), KernelError> {
        self.initialize_with(config, Box::new(RandomProgram::from_entropy()))
    }

    /// Like [`Scheduler::initialize`], drawing programs and memory sizes from
    /// `generator`.
    pub fn initialize_with(
        &self,
        config: SchedulerConfig,
        generator: Box<dyn ProgramGenerator>,
    ) -> Result<(), KernelError> {
        let mut runtime = self.runtime.lock();
        if runtime.is_some() {
            return Err(KernelError::AlreadyInitialized);
        }
        config.validate()?;
        use_system_offset();

        let backing_store = match &config.output_dir {
            Some(dir) => {
                let logs = dir.join("logs");
                match std::fs::remove_dir_all(&logs) {
                    Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                    _ => (),
                }
                std::fs::create_dir_all(&logs)?;
                BackingStore::with_file(&dir.join("backing_store.txt"))?
            }
            None => BackingStore::default(),
        };
        let memory = MemoryManager::with_backing_store(
            config.max_overall_mem,
            config.mem_per_frame,
            backing_store,
        );
        let shared = Arc::new(Shared {
            policy: policy::from_kind(config.policy, config.quantum_cycles),
            state: Mutex::new(KernelState {
                table: ProcessTable::default(),
                ready: VecDeque::new(),
                running: BTreeSet::new(),
                finished: Vec::new(),
                memory,
                dispatches: VecDeque::new(),
            }),
            wakeup: Condvar::new(),
            settled: Condvar::new(),
            running: AtomicBool::new(true),
            batching: AtomicBool::new(false),
            clock: AtomicU64::new(0),
            last_cycle: AtomicU64::new(0),
            idle_ticks: AtomicU64::new(0),
            snapshots_taken: AtomicU64::new(0),
            next_pid: AtomicU32::new(0),
            next_batch: AtomicU64::new(0),
            cores: (0..config.num_cpu)
                .map(|_| {
                    CachePadded::new(PerCore {
                        active_ticks: AtomicU64::new(0),
                        current: AtomicU64::new(IDLE),
                        pc: AtomicUsize::new(0),
                    })
                })
                .collect(),
            snapshots: SegQueue::new(),
            generator: Mutex::new(generator),
            config,
        });

        let mut started = Runtime {
            shared,
            threads: Vec::new(),
        };
        let num_cpu = started.shared.config.num_cpu;
        if let Err(e) = started.start(num_cpu) {
            started.stop();
            return Err(e);
        }
        log::info!(
            "Scheduler: {num_cpu} cores online ({}, {} frames of {} bytes)",
            started.shared.policy.name(),
            started.shared.config.frame_count(),
            started.shared.config.mem_per_frame
        );
        *runtime = Some(started);
        Ok(())
    }

    /// Returns true between [`Scheduler::initialize`] and
    /// [`Scheduler::shutdown`].
    pub fn is_initialized(&self) -> bool {
        self.runtime.lock().is_some()
    }

    fn shared(&self) -> Result<Arc<Shared>, KernelError> {
        self.runtime
            .lock()
            .as_ref()
            .map(|runtime| runtime.shared.clone())
            .ok_or(KernelError::NotInitialized)
    }

    /// Admits a process with a generated program.
    ///
    /// Without `memory_size`, the size is a random power of two between
    /// `min-mem-per-proc` and `max-mem-per-proc`.
    pub fn add_process(&self, name: &str, memory_size: Option<usize>) -> Result<Pid, KernelError> {
        self.shared()?.admit(name, memory_size, None)
    }

    /// Admits a process running the `;`-separated program `text`.
    ///
    /// Nothing is admitted if the program does not parse.
    pub fn add_program(
        &self,
        name: &str,
        memory_size: usize,
        text: &str,
    ) -> Result<Pid, KernelError> {
        let shared = self.shared()?;
        let program = Instruction::parse_program(text)?;
        shared.admit(name, Some(memory_size), Some(program))
    }

    /// Admits a process running `program`.
    pub fn add_process_with(
        &self,
        name: &str,
        memory_size: usize,
        program: Vec<Instruction>,
    ) -> Result<Pid, KernelError> {
        self.shared()?.admit(name, Some(memory_size), Some(program))
    }

    /// Starts batch generation.
    pub fn scheduler_start(&self) -> Result<(), KernelError> {
        self.shared()?.batching.store(true, Ordering::SeqCst);
        log::info!("Scheduler: batch generation started");
        Ok(())
    }

    /// Stops batch generation.
    pub fn scheduler_stop(&self) -> Result<(), KernelError> {
        self.shared()?.batching.store(false, Ordering::SeqCst);
        log::info!("Scheduler: batch generation stopped");
        Ok(())
    }

    /// Returns true while batch generation is on.
    pub fn is_batching(&self) -> Result<bool, KernelError> {
        Ok(self.shared()?.batching.load(Ordering::SeqCst))
    }

    /// Blocks until no process is ready or running, for at most `timeout`.
    ///
    /// Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> Result<bool, KernelError> {
        let shared = self.shared()?;
        let deadline = Instant::now() + timeout;
        let mut state = shared.state.lock();
        while !state.is_idle() {
            if shared.settled.wait_until(&mut state, deadline).timed_out() {
                return Ok(state.is_idle());
            }
        }
        Ok(true)
    }

    /// The CPU utilization report (`screen -ls`).
    pub fn status(&self) -> Result<Status, KernelError> {
        Ok(self.shared()?.status())
    }

    /// Writes the CPU utilization report to `opsim-log.txt` in the output
    /// directory, or in the working directory when none is configured.
    pub fn report_util(&self) -> Result<PathBuf, KernelError> {
        let shared = self.shared()?;
        let path = shared
            .config
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("opsim-log.txt");
        std::fs::write(&path, shared.status().to_string())?;
        log::info!("Scheduler: report generated at {}", path.display());
        Ok(path)
    }

    /// A single process (`screen -r`).
    pub fn process(&self, name: &str) -> Result<ProcessView, KernelError> {
        let shared = self.shared()?;
        let state = shared.state.lock();
        let (pid, entry) = state
            .table
            .find(name)
            .ok_or_else(|| KernelError::NoSuchProcess(name.to_string()))?;
        Ok(match (entry.process(), entry.location()) {
            (Some(process), _) => ProcessView {
                name: entry.name().to_string(),
                pid,
                state: process.state(),
                core: process.core(),
                memory_size: entry.memory_size(),
                program_counter: process.program_counter(),
                instruction_count: entry.instruction_count(),
                log: process.log().to_vec(),
                crash: process.crash_report().cloned(),
            },
            (None, location) => {
                let core = match location {
                    Location::Running(core) => Some(core),
                    _ => None,
                };
                ProcessView {
                    name: entry.name().to_string(),
                    pid,
                    state: ProcessState::Running,
                    core,
                    memory_size: entry.memory_size(),
                    program_counter: core
                        .map_or(0, |c| shared.cores[c].pc.load(Ordering::SeqCst)),
                    instruction_count: entry.instruction_count(),
                    log: Vec::new(),
                    crash: None,
                }
            }
        })
    }

    /// Memory and tick counters (`vmstat`).
    pub fn vmstat(&self) -> Result<VmStat, KernelError> {
        let shared = self.shared()?;
        let state = shared.state.lock();
        Ok(VmStat {
            total_memory: state.memory.total_memory(),
            used_memory: state.memory.used_memory(),
            free_memory: state.memory.total_memory() - state.memory.used_memory(),
            idle_ticks: shared.idle_ticks.load(Ordering::SeqCst),
            active_ticks: shared
                .cores
                .iter()
                .map(|slot| slot.active_ticks.load(Ordering::SeqCst))
                .sum(),
            pages_in: state.memory.paged_in(),
            pages_out: state.memory.paged_out(),
        })
    }

    /// CPU and per-process memory use (`process-smi`).
    pub fn process_smi(&self) -> Result<ProcessSmi, KernelError> {
        let shared = self.shared()?;
        let state = shared.state.lock();
        let frame_size = state.memory.frame_size();
        let processes = state
            .memory
            .residents()
            .filter_map(|(pid, pages)| {
                state.table.get(pid).map(|entry| MemoryUsage {
                    name: entry.name().to_string(),
                    pid,
                    bytes: pages * frame_size,
                })
            })
            .collect();
        let busy = shared.config.num_cpu - shared.idle_cores();
        Ok(ProcessSmi {
            utilization: busy as f64 * 100.0 / shared.config.num_cpu as f64,
            total_memory: state.memory.total_memory(),
            used_memory: state.memory.used_memory(),
            processes,
        })
    }

    /// Pids in the order they were dispatched, oldest first.
    ///
    /// Only the last [`DISPATCH_HISTORY`] dispatches are kept.
    pub fn dispatch_history(&self) -> Result<Vec<Pid>, KernelError> {
        let shared = self.shared()?;
        let state = shared.state.lock();
        Ok(state.dispatches.iter().copied().collect())
    }

    /// Runs `f` on the memory manager, under the scheduler-wide lock.
    pub fn with_memory<R>(&self, f: impl FnOnce(&MemoryManager) -> R) -> Result<R, KernelError> {
        let shared = self.shared()?;
        let state = shared.state.lock();
        Ok(f(&state.memory))
    }

    /// Number of memory snapshots captured, at most one per quantum cycle of
    /// the global clock.
    pub fn snapshots_taken(&self) -> Result<u64, KernelError> {
        Ok(self.shared()?.snapshots_taken.load(Ordering::SeqCst))
    }

    /// Ticks of the global clock.
    pub fn clock(&self) -> Result<u64, KernelError> {
        Ok(self.shared()?.clock.load(Ordering::SeqCst))
    }

    /// Stops every core and the tick thread, and joins them.
    ///
    /// Processes on a core go back to the ready queue. Does nothing if the
    /// scheduler is not initialized.
    pub fn shutdown(&self) {
        let Some(runtime) = self.runtime.lock().take() else {
            return;
        };
        runtime.stop();
        log::info!("Scheduler: shut down");
    }
}
