// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg(target_os = "linux")]

// This binary holds the one test that snapshots every thread in the
// process. It must not share a process with tests that block signals or
// park threads of their own, so it stays alone here.

use datadog_thread_stacks::StackTraceSnapshot;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst};
use std::sync::Arc;
use std::time::Duration;

const NUM_THREADS: usize = 6;

// Every worker parks inside this one function so that all of them produce
// the same stack and end up in the same snapshot group.
#[inline(never)]
fn park_until(done: &AtomicBool, ready: &AtomicUsize) {
    ready.fetch_add(1, SeqCst);
    while !done.load(SeqCst) {
        std::thread::park();
    }
}

#[test]
fn test_snapshot_groups_identical_threads() -> anyhow::Result<()> {
    let done = Arc::new(AtomicBool::new(false));
    let ready = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..NUM_THREADS {
        let done = Arc::clone(&done);
        let ready = Arc::clone(&ready);
        handles.push(
            std::thread::Builder::new()
                .name("stack-dump-park".to_string())
                .spawn(move || park_until(&done, &ready))?,
        );
    }
    while ready.load(SeqCst) < NUM_THREADS {
        std::thread::sleep(Duration::from_millis(1));
    }
    // Let the workers settle into the parked futex wait.
    std::thread::sleep(Duration::from_millis(50));

    let mut snapshot = StackTraceSnapshot::new();
    snapshot.snapshot_all_stacks()?;

    assert_eq!(snapshot.num_failed(), 0);
    assert!(snapshot.threads().len() > NUM_THREADS);
    for info in snapshot.threads() {
        assert!(info.status.is_ok(), "tid {}: {:?}", info.tid, info.status);
        assert!(info.stack.has_collected());
        assert!(!info.thread_name.is_empty());
    }
    assert!(
        snapshot
            .threads()
            .iter()
            .filter(|info| info.thread_name == "stack-dump-park")
            .count()
            >= NUM_THREADS
    );

    // The groups partition the entries, and the parked workers collapse
    // into a single group.
    let mut total = 0;
    let mut max_parked_in_one_group = 0;
    snapshot.visit_groups(|group| {
        assert!(!group.is_empty());
        for info in group {
            assert_eq!(info.stack, group[0].stack);
        }
        total += group.len();
        let parked = group
            .iter()
            .filter(|info| info.thread_name == "stack-dump-park")
            .count();
        max_parked_in_one_group = max_parked_in_one_group.max(parked);
    });
    assert_eq!(total, snapshot.threads().len());
    assert!(
        max_parked_in_one_group >= NUM_THREADS,
        "parked workers landed in different groups"
    );

    done.store(true, SeqCst);
    for handle in &handles {
        handle.thread().unpark();
    }
    for handle in handles {
        handle.join().unwrap();
    }
    Ok(())
}
