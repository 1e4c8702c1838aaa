use crossbeam_utils::thread;
use opsim::{
    MemoryFault, Pid,
    mm::{
        MemoryManager,
        backing_store::{BackingStore, PagingEvent},
    },
};
use parking_lot::Mutex;

const A: Pid = Pid(1);
const B: Pid = Pid(2);
const C: Pid = Pid(3);

/// Tests demand paging under memory pressure.
///
/// Physical memory holds 16 frames of 64 bytes. Three processes of 512
/// bytes (8 pages each) together need 24 frames.
///
/// This test ensures that:
/// - No frame is handed out before a page is touched.
/// - Touching every page of every process never uses more than 16 frames.
/// - Frames are evicted in FIFO order once memory is full.
/// - The manager stays consistent after every access.
#[test]
fn pressure() {
    let mut mm = MemoryManager::new(1024, 64);
    for pid in [A, B, C] {
        assert!(mm.allocate(pid, 512));
    }
    assert_eq!(mm.free_frames(), 16);
    assert_eq!(mm.used_memory(), 0);

    for pid in [A, B, C] {
        for page in 0..8 {
            mm.write(pid, page * 64, page as u16 + 1).unwrap();
            mm.audit().unwrap();
            assert!(mm.used_memory() <= 1024);
        }
    }
    assert_eq!(mm.free_frames(), 0);
    assert_eq!(mm.paged_in(), 24);
    assert_eq!(mm.paged_out(), 8);

    // A's pages were the first in, so they were the first out.
    assert_eq!(mm.page_table(A).unwrap().resident(), 0);
    assert_eq!(mm.page_table(B).unwrap().resident(), 8);
    assert_eq!(mm.page_table(C).unwrap().resident(), 8);
    // C took over A's frames in order.
    assert_eq!(
        mm.fifo().skip(8).collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4, 5, 6, 7]
    );
}

/// Tests a large process joining two small ones.
///
/// Processes A and B of 256 bytes hold 8 of the 16 frames. Process C of
/// 1024 bytes then touches every one of its 16 pages.
///
/// This test ensures that:
/// - C first takes the 8 free frames.
/// - C then evicts the pages of A and B in the order they were mapped.
/// - No more than 16 frames are ever resident.
#[test]
fn large_process_evicts_oldest() {
    let mut mm = MemoryManager::new(1024, 64);
    for (pid, size) in [(A, 256), (B, 256), (C, 1024)] {
        assert!(mm.allocate(pid, size));
    }
    for pid in [A, B] {
        for page in 0..4 {
            mm.write(pid, page * 64, 1).unwrap();
        }
    }
    for page in 0..16 {
        mm.read(C, page * 64).unwrap();
        let resident = mm.residents().map(|(_, pages)| pages).sum::<usize>();
        assert!(resident <= 16);
        match page {
            0..8 => assert_eq!(mm.page_table(A).unwrap().resident(), 4),
            8..12 => assert_eq!(mm.page_table(A).unwrap().resident(), 11 - page),
            _ => assert_eq!(mm.page_table(B).unwrap().resident(), 15 - page),
        }
        mm.audit().unwrap();
    }
    assert_eq!(mm.page_table(C).unwrap().resident(), 16);
    assert_eq!(mm.paged_out(), 8);
}

/// Tests that evicted pages keep their content.
///
/// This test ensures that:
/// - A page evicted to the backing store is restored on the next access.
/// - A never-written page reads as zero.
/// - The paging log records the fault, the eviction and the reload.
#[test]
fn swap_preserves_data() {
    let mut mm = MemoryManager::new(128, 64);
    assert!(mm.allocate(A, 128));
    assert!(mm.allocate(B, 64));

    mm.write(A, 3, 0xbeef).unwrap();
    mm.write(A, 64, 7).unwrap();
    // Both frames are taken, so B evicts A's page 0.
    assert_eq!(mm.read(B, 0).unwrap(), 0);
    assert!(mm.page_table(A).unwrap().get(0).is_none());

    // Reloading page 0 evicts A's page 1.
    assert_eq!(mm.read(A, 3).unwrap(), 0xbeef);
    assert_eq!(mm.read(A, 64).unwrap(), 7);
    mm.audit().unwrap();

    assert!(mm.backing_store().events().any(|event| matches!(
        event,
        PagingEvent::SwapOut {
            pid: A,
            vpage: 0,
            ..
        }
    )));
    assert!(mm.backing_store().events().any(|event| matches!(
        event,
        PagingEvent::SwapIn {
            pid: A,
            vpage: 1,
            ..
        }
    )));
}

/// Tests the address checks.
///
/// This test ensures that:
/// - Addresses past the address space are rejected without a fault.
/// - Accesses of a process without page table are refused.
/// - Deallocation returns every frame and is reported once.
#[test]
fn invalid_access_and_release() {
    let mut mm = MemoryManager::new(256, 64);
    assert!(mm.allocate(A, 128));
    assert!(!mm.allocate(A, 128));
    assert_eq!(
        mm.read(A, 128),
        Err(MemoryFault::InvalidAddress {
            addr: 128,
            size: 128
        })
    );
    assert_eq!(mm.paged_in(), 0);
    assert_eq!(mm.read(B, 0), Err(MemoryFault::Unallocated(B)));

    mm.write(A, 0, 1).unwrap();
    mm.write(A, 127, 1).unwrap();
    assert_eq!(mm.free_frames(), 2);
    assert!(mm.deallocate(A));
    assert!(!mm.deallocate(A));
    assert_eq!(mm.free_frames(), 4);
    assert_eq!(mm.fifo().count(), 0);
    mm.audit().unwrap();
}

/// Tests the memory manager shared by several cores.
///
/// This test ensures that:
/// - Concurrent accesses through a lock keep the manager consistent.
/// - Every process reads back its own writes.
#[test]
fn concurrent_access() {
    let mm = Mutex::new(MemoryManager::new(512, 64));
    for pid in 0..4 {
        assert!(mm.lock().allocate(Pid(pid), 512));
    }

    thread::scope(|s| {
        for pid in 0..4u32 {
            let mm = &mm;
            s.spawn(move |_| {
                for round in 0..32u16 {
                    let addr = (round as usize * 37) % 512;
                    let value = ((pid as u16) << 8) | round;
                    mm.lock().write(Pid(pid), addr, value).unwrap();
                    assert_eq!(mm.lock().read(Pid(pid), addr).unwrap(), value);
                }
            });
        }
    })
    .unwrap();

    let mm = mm.into_inner();
    mm.audit().unwrap();
    assert_eq!(mm.free_frames(), 0);
    assert_eq!(mm.paged_in(), mm.paged_out() + 8);
}

/// Tests the backing-store file across resets.
///
/// This test ensures that:
/// - Events left in the file by an earlier run are discarded on creation.
/// - Resetting the manager empties the file.
/// - Events recorded after a reset are written from the start of the file.
#[test]
fn backing_store_file_starts_empty() {
    let path = std::env::temp_dir().join(format!("opsim-store-{}.txt", std::process::id()));
    std::fs::write(&path, "ALLOC pid=99 mem=64 pages=1\n").unwrap();

    let store = BackingStore::with_file(&path).unwrap();
    let mut mm = MemoryManager::with_backing_store(1024, 64, store);
    assert!(mm.allocate(Pid(0), 64));
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "ALLOC pid=0 mem=64 pages=1\n"
    );

    mm.init(1024, 64);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    assert!(mm.allocate(Pid(1), 128));
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "ALLOC pid=1 mem=128 pages=2\n"
    );
    std::fs::remove_file(&path).unwrap();
}
