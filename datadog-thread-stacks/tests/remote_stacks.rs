// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg(target_os = "linux")]

use datadog_thread_stacks::{dump_thread_stack, get_thread_stack, StackTrace, StackTraceError};
use nix::sys::signal::{pthread_sigmask, SigSet, SigmaskHow, Signal};
use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use std::sync::{mpsc, Arc};
use std::time::Duration;

fn current_tid() -> i64 {
    i64::from(nix::unistd::gettid().as_raw())
}

#[inline(never)]
fn foo() -> StackTrace {
    let mut trace = StackTrace::new();
    trace.collect(0);
    std::hint::black_box(trace)
}

#[test]
fn test_self_stack_symbolizes_enclosing_function() -> anyhow::Result<()> {
    let trace = foo();
    assert!(trace.num_frames() >= 1);
    let symbolized = trace.symbolize();
    anyhow::ensure!(symbolized.contains("foo"), "unexpected trace:\n{symbolized}");
    Ok(())
}

#[test]
fn test_remote_stack_of_parked_thread() -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel();
    let done = Arc::new(AtomicBool::new(false));
    let thread_done = Arc::clone(&done);
    let handle = std::thread::spawn(move || {
        tx.send(current_tid()).unwrap();
        while !thread_done.load(SeqCst) {
            std::thread::park();
        }
    });
    let tid = rx.recv()?;

    let mut stack = StackTrace::new();
    get_thread_stack(tid, &mut stack)?;
    assert!(stack.has_collected());

    let symbolized = dump_thread_stack(tid);
    assert!(!symbolized.is_empty());
    assert!(symbolized.starts_with("    @ "), "{symbolized}");

    done.store(true, SeqCst);
    handle.thread().unpark();
    handle.join().unwrap();
    Ok(())
}

#[test]
fn test_signal_blocked_target_times_out() -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel();
    let done = Arc::new(AtomicBool::new(false));
    let thread_done = Arc::clone(&done);
    let handle = std::thread::spawn(move || {
        let mut mask = SigSet::empty();
        mask.add(Signal::SIGUSR2);
        pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&mask), None).unwrap();
        tx.send(current_tid()).unwrap();
        while !thread_done.load(SeqCst) {
            std::thread::park();
        }
    });
    let tid = rx.recv()?;

    let mut stack = StackTrace::new();
    let err = get_thread_stack(tid, &mut stack).unwrap_err();
    assert!(matches!(err, StackTraceError::TimedOut(_)), "{err:?}");
    assert!(!stack.has_collected());

    // The target is unharmed and still responsive.
    done.store(true, SeqCst);
    handle.thread().unpark();
    handle.join().unwrap();
    Ok(())
}

#[test]
fn test_exited_thread_is_not_found() -> anyhow::Result<()> {
    let handle = std::thread::spawn(current_tid);
    let tid = handle.join().unwrap();
    // Joined means reaped; the tid no longer names a thread in this group.
    std::thread::sleep(Duration::from_millis(50));

    let mut stack = StackTrace::new();
    let err = get_thread_stack(tid, &mut stack).unwrap_err();
    assert!(matches!(err, StackTraceError::NotFound(_)), "{err:?}");
    assert!(!stack.has_collected());

    let dumped = dump_thread_stack(tid);
    assert!(dumped.starts_with("<not found:"), "{dumped}");
    Ok(())
}
