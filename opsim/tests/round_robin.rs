use opsim::{PolicyKind, Scheduler, SchedulerConfig, kprint, process::ProcessState};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);

fn config(num_cpu: usize, quantum_cycles: u64, exec_unit: Duration) -> SchedulerConfig {
    kprint::set_quiet(true);
    SchedulerConfig {
        num_cpu,
        policy: PolicyKind::RoundRobin,
        quantum_cycles,
        min_ins: 3,
        max_ins: 3,
        max_overall_mem: 256,
        mem_per_frame: 64,
        min_mem_per_proc: 64,
        max_mem_per_proc: 256,
        exec_unit,
        ..SchedulerConfig::default()
    }
}

/// Tests the preemption of processes on a single core.
///
/// Two processes of four ticks share one core with a quantum of two ticks.
///
/// This test ensures that:
/// - A process that used up its quantum goes back to the tail of the queue.
/// - The processes alternate on the core.
#[test]
fn alternation() {
    let scheduler = Scheduler::new();
    scheduler
        .initialize(config(1, 2, Duration::from_millis(20)))
        .unwrap();
    let program = "DECLARE(x, 1); ADD(x, x, 1); ADD(x, x, 1); ADD(x, x, 1)";
    let a = scheduler.add_program("a", 64, program).unwrap();
    let b = scheduler.add_program("b", 64, program).unwrap();
    assert!(scheduler.wait_idle(TIMEOUT).unwrap());

    assert_eq!(scheduler.dispatch_history().unwrap(), vec![a, b, a, b]);
    let status = scheduler.status().unwrap();
    assert!(
        status
            .finished
            .iter()
            .all(|p| p.state == ProcessState::Finished && p.progress == 4)
    );
}

/// Tests that a lone process keeps its core.
///
/// This test ensures that:
/// - A process whose quantum expired with nobody waiting gets a new quantum
///   instead of being requeued.
#[test]
fn refill_when_alone() {
    let scheduler = Scheduler::new();
    scheduler
        .initialize(config(2, 1, Duration::from_millis(1)))
        .unwrap();
    let pid = scheduler
        .add_program("alone", 64, "FOR(5); DECLARE(x, 1); END")
        .unwrap();
    assert!(scheduler.wait_idle(TIMEOUT).unwrap());
    assert_eq!(scheduler.dispatch_history().unwrap(), vec![pid]);
}

/// Tests that a sleeping process is not preempted.
///
/// This test ensures that:
/// - A process sleeping past its quantum keeps the core until it wakes up.
#[test]
fn sleeping_keeps_core() {
    let scheduler = Scheduler::new();
    scheduler
        .initialize(config(1, 2, Duration::from_millis(5)))
        .unwrap();
    let sleeper = scheduler
        .add_program("sleeper", 64, "SLEEP(6); DECLARE(x, 1); DECLARE(y, 1); DECLARE(z, 1)")
        .unwrap();
    let other = scheduler.add_program("other", 64, "DECLARE(x, 1)").unwrap();
    assert!(scheduler.wait_idle(TIMEOUT).unwrap());

    let history = scheduler.dispatch_history().unwrap();
    assert_eq!(history[..2], [sleeper, other]);
    assert_eq!(history.iter().filter(|pid| **pid == sleeper).count(), 2);
}

/// Tests many processes on many cores.
///
/// This test ensures that:
/// - Every process finishes.
/// - Every executed instruction is accounted as one active tick.
/// - The memory of every process is released.
/// - No more snapshots are captured than the clock has quantum cycles.
#[test]
fn many_cores() {
    let scheduler = Scheduler::new();
    scheduler
        .initialize(config(4, 2, Duration::from_millis(1)))
        .unwrap();
    for i in 0..16 {
        scheduler
            .add_program(&format!("w{i}"), 64, "DECLARE(a, 1); ADD(a, a, a); SUBTRACT(a, a, 1)")
            .unwrap();
    }
    assert!(scheduler.wait_idle(TIMEOUT).unwrap());

    let status = scheduler.status().unwrap();
    assert_eq!(status.finished.len(), 16);
    let vmstat = scheduler.vmstat().unwrap();
    assert_eq!(vmstat.active_ticks, 16 * 3);
    assert_eq!(vmstat.used_memory, 0);
    assert_eq!(vmstat.free_memory, 256);
    let snapshots = scheduler.snapshots_taken().unwrap();
    assert!(snapshots <= scheduler.clock().unwrap() / 2 + 1);
}

/// Tests memory snapshots with every core busy.
///
/// Four processes sleep on four cores, so each clock tick sees four executed
/// ticks.
///
/// This test ensures that:
/// - Snapshots follow the global clock, not the ticks executed by all cores.
/// - At most one snapshot is captured per quantum cycle.
#[test]
fn one_snapshot_per_quantum_cycle() {
    let scheduler = Scheduler::new();
    scheduler
        .initialize(config(4, 5, Duration::from_millis(2)))
        .unwrap();
    for i in 0..4 {
        scheduler
            .add_program(&format!("s{i}"), 64, "SLEEP(1000); DECLARE(x, 1)")
            .unwrap();
    }
    std::thread::sleep(Duration::from_millis(300));

    let snapshots = scheduler.snapshots_taken().unwrap();
    let clock = scheduler.clock().unwrap();
    assert!(snapshots >= 1);
    assert!(snapshots <= clock / 5 + 1);
    scheduler.shutdown();
}
