// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::signal_data::SignalData;
use libc::{c_int, c_void, siginfo_t};
use nix::errno::Errno;
use std::sync::atomic::Ordering::SeqCst;

// This file runs in signal handler context. Everything it touches must be
// async-signal-safe: atomics, the errno save/restore, gettid (a raw
// syscall), the primed unwinder, writes into the caller-owned stack record,
// and the futex wake inside CompletionFlag::signal. No allocation, no
// locks, no logging.

/// Restores errno on scope exit. The signal may have interrupted the target
/// mid-syscall, and the handler must leave errno exactly as it found it.
struct SavedErrno(i32);

impl SavedErrno {
    fn new() -> Self {
        Self(Errno::last_raw())
    }
}

impl Drop for SavedErrno {
    fn drop(&mut self) {
        Errno::set_raw(self.0);
    }
}

/// Handler for the stack trace signal, running in the target thread.
///
/// The signal is expected to come from `StackTraceCollector::trigger_async`
/// with a rendezvous pointer as payload; anything else is ignored.
pub(crate) extern "C" fn handle_stack_trace_signal(
    _signum: c_int,
    info: *mut siginfo_t,
    _ucontext: *mut c_void,
) {
    let _saved_errno = SavedErrno::new();

    if info.is_null() {
        return;
    }
    // SAFETY: the kernel hands the handler a valid siginfo; the payload slot
    // is only a pointer-sized read.
    let sig_data = unsafe { (*info).si_value().sival_ptr } as *const SignalData;
    if sig_data.is_null() {
        // Someone raised our signal by hand rather than through a collector.
        return;
    }
    // SAFETY: a non-null payload was placed there by trigger_async, and the
    // revoke protocol guarantees the allocation is still live: the requester
    // either leaks it (tid still queued) or frees it only after
    // result_ready, which this invocation has not signalled yet.
    let sig_data = unsafe { &*sig_data };

    let my_tid = i64::from(nix::unistd::gettid().as_raw());
    // If we were slow to process the signal, the requester may have given up
    // and revoked. Claiming the rendezvous here is what obliges the
    // requester to wait for result_ready before freeing it.
    if sig_data
        .queued_to_tid
        .compare_exchange(my_tid, SignalData::DUMP_STARTED, SeqCst, SeqCst)
        .is_err()
    {
        return;
    }
    // SAFETY: DUMP_STARTED grants this thread exclusive ownership of the
    // caller's stack record until result_ready is signalled. skip_frames of
    // one drops this handler's own frame from the trace.
    unsafe { (*sig_data.stack).collect(1) };
    sig_data.result_ready.signal();
}
