use opsim::{
    KernelError, PolicyKind, Scheduler, SchedulerConfig, kprint,
    process::{Instruction, ProcessState, RandomProgram},
};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);

fn config(num_cpu: usize) -> SchedulerConfig {
    kprint::set_quiet(true);
    SchedulerConfig {
        num_cpu,
        policy: PolicyKind::Fcfs,
        quantum_cycles: 1,
        min_ins: 5,
        max_ins: 5,
        max_overall_mem: 1024,
        mem_per_frame: 64,
        min_mem_per_proc: 64,
        max_mem_per_proc: 256,
        exec_unit: Duration::from_millis(1),
        ..SchedulerConfig::default()
    }
}

/// Tests that processes run in admission order on a single core.
///
/// This test ensures that:
/// - Every process is dispatched exactly once.
/// - The dispatch order equals the admission order.
/// - Every process finishes.
#[test]
fn admission_order() {
    let scheduler = Scheduler::new();
    scheduler.initialize(config(1)).unwrap();
    let pids = ["a", "b", "c", "d"]
        .iter()
        .map(|name| {
            scheduler
                .add_program(name, 64, "DECLARE(x, 1); ADD(x, x, 1); ADD(x, x, x)")
                .unwrap()
        })
        .collect::<Vec<_>>();
    assert!(scheduler.wait_idle(TIMEOUT).unwrap());

    assert_eq!(scheduler.dispatch_history().unwrap(), pids);
    let status = scheduler.status().unwrap();
    assert_eq!(status.finished.len(), 4);
    assert!(status.running.is_empty());
    assert!(
        status
            .finished
            .iter()
            .all(|p| p.state == ProcessState::Finished && p.progress == 3 && p.total == 3)
    );
    scheduler.shutdown();
}

/// Tests that FCFS never preempts.
///
/// This test ensures that:
/// - A long process keeps its core while others wait.
/// - A sleeping process keeps its core.
#[test]
fn no_preemption() {
    let scheduler = Scheduler::new();
    scheduler.initialize(config(1)).unwrap();
    let long = scheduler
        .add_program("long", 64, "SLEEP(5); FOR(4); DECLARE(x, 1); END")
        .unwrap();
    let short = scheduler.add_program("short", 64, "DECLARE(y, 2)").unwrap();
    assert!(scheduler.wait_idle(TIMEOUT).unwrap());
    assert_eq!(scheduler.dispatch_history().unwrap(), vec![long, short]);
}

/// Tests the output of a sleeping process.
///
/// This test ensures that:
/// - A process prints after its sleep elapsed.
/// - Printed lines name the core and resolve variables.
/// - A finished process is reported as finished.
#[test]
fn sleep_then_print() {
    let scheduler = Scheduler::new();
    scheduler.initialize(config(2)).unwrap();
    scheduler
        .add_program("printer", 64, r#"DECLARE(n, 41); ADD(n, n, 1); SLEEP(3); PRINT("n is " + n)"#)
        .unwrap();
    assert!(scheduler.wait_idle(TIMEOUT).unwrap());

    let view = scheduler.process("printer").unwrap();
    assert_eq!(view.state, ProcessState::Finished);
    assert_eq!(view.log.len(), 1);
    assert!(view.log[0].contains("Core:"));
    assert!(view.log[0].ends_with("\"n is 42\""));
    assert!(view.to_string().contains("Finished!"));
}

/// Tests a memory access violation.
///
/// This test ensures that:
/// - An access beyond the address space crashes the process.
/// - The crash names the offending address.
/// - The memory of the crashed process is released.
/// - Instructions after the violation never run.
#[test]
fn access_violation() {
    let scheduler = Scheduler::new();
    scheduler.initialize(config(1)).unwrap();
    let pid = scheduler
        .add_program("bad", 64, r#"WRITE(0x10, 3); WRITE(0x500, 1); PRINT("unreachable")"#)
        .unwrap();
    assert!(scheduler.wait_idle(TIMEOUT).unwrap());

    let view = scheduler.process("bad").unwrap();
    assert_eq!(view.state, ProcessState::Crashed);
    assert!(view.log.is_empty());
    assert_eq!(view.crash.as_ref().map(|crash| crash.addr), Some(0x500));
    assert!(
        view.to_string()
            .contains("shut down due to memory access violation")
    );
    assert!(!scheduler.with_memory(|mm| mm.is_allocated(pid)).unwrap());
    assert_eq!(
        scheduler.with_memory(|mm| mm.free_frames()).unwrap(),
        1024 / 64
    );
}

/// Tests the admission checks.
///
/// This test ensures that:
/// - A name in use by a live process is refused.
/// - Memory sizes must be powers of two within `[64, 65536]`.
/// - A program that does not parse is refused and nothing is admitted.
/// - Unknown processes are reported.
#[test]
fn admission_errors() {
    let scheduler = Scheduler::new();
    scheduler.initialize(config(1)).unwrap();
    scheduler
        .add_program("dup", 64, "SLEEP(50); DECLARE(x, 1)")
        .unwrap();
    assert!(matches!(
        scheduler.add_program("dup", 64, "SLEEP(1)"),
        Err(KernelError::DuplicateProcess(name)) if name == "dup"
    ));
    assert!(matches!(
        scheduler.add_program("odd", 100, "SLEEP(1)"),
        Err(KernelError::InvalidMemorySize { size: 100, .. })
    ));
    assert!(matches!(
        scheduler.add_program("huge", 1 << 17, "SLEEP(1)"),
        Err(KernelError::InvalidMemorySize { .. })
    ));
    assert!(matches!(
        scheduler.add_program("broken", 64, "JUMP(1)"),
        Err(KernelError::InstructionParse(_))
    ));
    assert!(matches!(
        scheduler.process("broken"),
        Err(KernelError::NoSuchProcess(_))
    ));

    // The name is free again once the process finished.
    assert!(scheduler.wait_idle(TIMEOUT).unwrap());
    scheduler.add_program("dup", 64, "SLEEP(1)").unwrap();
    assert!(scheduler.wait_idle(TIMEOUT).unwrap());
}

/// Tests generated processes.
///
/// This test ensures that:
/// - A generated program has a length within `[min-ins, max-ins]`.
/// - A generated memory size is a power of two within the configured range.
#[test]
fn generated_process() {
    let scheduler = Scheduler::new();
    scheduler
        .initialize_with(config(2), Box::new(RandomProgram::seeded(7)))
        .unwrap();
    scheduler.add_process("gen", None).unwrap();
    scheduler.add_process("sized", Some(128)).unwrap();
    assert!(scheduler.wait_idle(TIMEOUT).unwrap());

    let view = scheduler.process("gen").unwrap();
    assert_eq!(view.instruction_count, 5);
    assert!(view.memory_size.is_power_of_two());
    assert!((64..=256).contains(&view.memory_size));
    assert!(view.state.is_terminal());
    assert_eq!(scheduler.process("sized").unwrap().memory_size, 128);
}

/// Tests batch generation.
///
/// This test ensures that:
/// - Batch generation admits processes named `p01`, `p02`, ...
/// - Stopping batch generation stops admissions.
#[test]
fn batch_generation() {
    let scheduler = Scheduler::new();
    scheduler.initialize(config(4)).unwrap();
    assert!(!scheduler.is_batching().unwrap());
    scheduler.scheduler_start().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    scheduler.scheduler_stop().unwrap();
    assert!(scheduler.wait_idle(TIMEOUT).unwrap());

    let status = scheduler.status().unwrap();
    assert!(!status.finished.is_empty());
    assert!(scheduler.process("p01").is_ok());
    let admitted = status.finished.len();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(scheduler.status().unwrap().finished.len(), admitted);
}

/// Tests the scheduler lifecycle.
///
/// This test ensures that:
/// - Every operation fails before initialization.
/// - A second initialization is refused.
/// - Shutting down twice is harmless, and the scheduler can start again.
#[test]
fn lifecycle() {
    let scheduler = Scheduler::new();
    assert!(!scheduler.is_initialized());
    assert!(matches!(
        scheduler.add_process("p", None),
        Err(KernelError::NotInitialized)
    ));
    assert!(matches!(
        scheduler.status(),
        Err(KernelError::NotInitialized)
    ));
    assert!(matches!(
        scheduler.add_process_with("p", 64, vec![Instruction::Sleep(1)]),
        Err(KernelError::NotInitialized)
    ));

    scheduler.initialize(config(2)).unwrap();
    assert!(matches!(
        scheduler.initialize(config(2)),
        Err(KernelError::AlreadyInitialized)
    ));
    assert_eq!(KernelError::AlreadyInitialized.errno(), -16);
    scheduler
        .add_process_with("spin", 64, vec![Instruction::Sleep(10_000)])
        .unwrap();
    scheduler.shutdown();
    scheduler.shutdown();
    assert!(!scheduler.is_initialized());

    scheduler.initialize(config(1)).unwrap();
    assert!(scheduler.status().unwrap().finished.is_empty());
}
