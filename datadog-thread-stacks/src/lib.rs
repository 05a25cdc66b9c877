// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! This crate collects the call stacks of arbitrary threads in the current
//! process, including threads spawned by third-party libraries, without any
//! cooperation from the target thread beyond tolerating a signal.
//!
//! Architecturally, it consists of three parts:
//! 1. A signal handler, which runs in the target thread when a queued signal
//!    arrives, walks the thread's stack and writes the raw return addresses
//!    into a caller-owned [`StackTrace`] record. The handler runs under a
//!    constrained environment where many standard operations are illegal.
//!    <https://man7.org/linux/man-pages/man7/signal-safety.7.html>
//!    In particular, memory allocation and synchronization such as mutexes
//!    are potentially UB, so the handler communicates with the requester
//!    only through atomics and a raw futex word.
//! 2. A per-request collector ([`StackTraceCollector`]), which queues the
//!    signal directly to a target tid with a pointer to a shared rendezvous
//!    object as payload, then waits for the handler to report completion
//!    under a deadline. Teardown is arbitrated through an atomic state
//!    machine so that a late-arriving signal can never write into freed
//!    memory.
//! 3. A process-wide snapshot ([`StackTraceSnapshot`]), which enumerates all
//!    threads through procfs, fans out one collector per thread, captures
//!    thread names while the signals are in flight, and groups the resulting
//!    traces so that identical stacks are reported once.
//!
//! Remote collection requires Linux (queued signals targeted at a specific
//! tid within the thread group). On other platforms those entry points
//! return [`StackTraceError::NotSupported`]; collecting the current thread's
//! own stack still works everywhere.

mod api;
#[cfg(target_os = "linux")]
mod collector;
#[cfg(unix)]
mod coverage;
mod errors;
mod snapshot;
mod spinlock;
mod stack_trace;
mod threads;
mod unwind_safety;

pub use api::{
    dump_thread_stack, get_log_format_stack_trace_hex, get_stack_trace, get_stack_trace_hex,
    get_thread_stack, set_stack_trace_signal,
};
#[cfg(target_os = "linux")]
pub use collector::stack_collector::StackTraceCollector;
#[cfg(unix)]
pub use coverage::{is_coverage_build, try_flush_coverage};
pub use errors::StackTraceError;
pub use snapshot::{StackTraceSnapshot, ThreadInfo};
pub use stack_trace::{HexFormat, StackTrace, MAX_FRAMES};
pub use threads::list_threads;
pub use unwind_safety::{safe_to_unwind, ScopedUnsafeToUnwind};
