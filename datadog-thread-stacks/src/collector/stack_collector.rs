// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::signal_data::SignalData;
use super::signal_handler_manager;
use crate::errors::StackTraceError;
use crate::stack_trace::{self, StackTrace};
use libc::{c_int, c_void};
use std::marker::PhantomData;
use std::mem;
use std::ptr;
use std::sync::atomic::Ordering::SeqCst;
use std::time::Instant;

/// The sender-populated slice of the kernel's siginfo layout for SI_QUEUE
/// payloads. libc only exposes read accessors for `si_value`, so the fields
/// are written through this mirror laid over a zeroed `libc::siginfo_t`.
#[repr(C)]
#[allow(dead_code)] // exists purely for its layout
struct QueuedSigInfo {
    si_signo: c_int,
    si_errno: c_int,
    si_code: c_int,
    _pad: c_int,
    si_pid: libc::pid_t,
    si_uid: libc::uid_t,
    si_value: *mut c_void,
}

const _: () = assert!(mem::size_of::<QueuedSigInfo>() <= mem::size_of::<libc::siginfo_t>());

/// Single-use driver for collecting one remote thread's stack.
///
/// `trigger_async` queues the signal and hands back a collector that borrows
/// the destination record for as long as the request is outstanding;
/// `await_collection` waits for the result. Dropping a collector that was
/// never awaited revokes the request so that a late signal delivery cannot
/// write into the borrowed record.
pub struct StackTraceCollector<'a> {
    tid: i64,
    sig_data: *mut SignalData,
    _stack: PhantomData<&'a mut StackTrace>,
}

impl<'a> StackTraceCollector<'a> {
    /// Queues the stack trace signal to `tid` with a fresh rendezvous as
    /// payload. `stack` is reset and will be filled by the target thread.
    ///
    /// Fails with `NotSupported` when the signal handler cannot be installed
    /// and `NotFound` when the signal cannot be delivered, typically because
    /// the thread has exited.
    pub fn trigger_async(
        tid: i64,
        stack: &'a mut StackTrace,
    ) -> Result<Self, StackTraceError> {
        let signum = signal_handler_manager::ensure_installed()?;

        // Prime the unwinder before any signal goes out. Otherwise the first
        // unwind in this process could happen inside the handler, deadlocking
        // on the unwinder's one-time initialization:
        //   Once::call_once()   [waits on the once, which never finishes]
        //   StackTrace::collect()
        //   <signal handler>
        //   prime_unwinder()
        //   Once::call_once()   [not yet initialized, so starts initializing]
        //   StackTrace::collect()
        stack_trace::prime_unwinder();

        // A failed collection must leave the record visibly empty.
        stack.reset();

        // The target tid goes into the rendezvous before the signal is sent,
        // so a delayed delivery reaching some other thread knows to ignore
        // it.
        let sig_data = Box::into_raw(Box::new(SignalData::new(tid, stack as *mut StackTrace)));

        let mut info: libc::siginfo_t = unsafe { mem::zeroed() };
        info.si_signo = signum;
        info.si_code = libc::SI_QUEUE;
        // SAFETY: QueuedSigInfo matches the head of the kernel's siginfo
        // layout on 64-bit Linux, see the size assertion above.
        unsafe {
            let raw = &mut info as *mut libc::siginfo_t as *mut QueuedSigInfo;
            (*raw).si_pid = libc::getpid();
            (*raw).si_uid = libc::getuid();
            (*raw).si_value = sig_data as *mut c_void;
        }

        // The raw thread-group-qualified syscall rather than kill(): if the
        // thread exited and the tid was recycled into another process, this
        // delivery fails instead of signalling a stranger.
        // SAFETY: queued signal to our own thread group; the payload is the
        // heap allocation above, which stays live until revoked.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_rt_tgsigqueueinfo,
                libc::getpid(),
                tid as libc::pid_t,
                signum,
                &info as *const libc::siginfo_t,
            )
        };
        if rc != 0 {
            // Nothing holds the payload anymore; reclaim it.
            // SAFETY: created by Box::into_raw above, never published.
            unsafe { drop(Box::from_raw(sig_data)) };
            return Err(StackTraceError::NotFound(
                "unable to deliver signal: process may have exited".to_string(),
            ));
        }

        // The signal is now pending on the target thread. The rendezvous is
        // kept as a raw pointer because its destruction must go through the
        // revoke protocol rather than plain ownership.
        Ok(Self {
            tid,
            sig_data,
            _stack: PhantomData,
        })
    }

    /// Waits for the target thread to finish collecting, up to `deadline`,
    /// then revokes the rendezvous. A completion that lands between the wait
    /// timing out and the revocation still counts as success; the revocation
    /// reads the authoritative state.
    ///
    /// On `TimedOut` the destination record is guaranteed untouched, now and
    /// forever. The usual reason for a timeout is a target that blocks the
    /// chosen signal; glibc's internal timer thread does, for example.
    pub fn await_collection(mut self, deadline: Instant) -> Result<(), StackTraceError> {
        // SAFETY: sig_data is live until revoked, and trigger_async is the
        // only constructor.
        let _ = unsafe { &*self.sig_data }.result_ready.wait_until(deadline);

        if !self.revoke_sig_data() {
            return Err(StackTraceError::TimedOut(
                "thread did not respond: maybe it is blocking signals".to_string(),
            ));
        }
        Ok(())
    }

    /// Detaches from the rendezvous, returning whether the handler completed
    /// a collection into the destination record.
    fn revoke_sig_data(&mut self) -> bool {
        // Exchange 'not in use' back in first. A handler that has not yet
        // claimed the rendezvous will see it and abort without touching the
        // stack record.
        // SAFETY: sig_data is non-null while attached; see callers.
        let old_val = unsafe { &*self.sig_data }
            .queued_to_tid
            .swap(SignalData::NOT_IN_USE, SeqCst);

        // Two cases remain.
        //
        // 1) The handler never ran: the signal is still pending and may be
        //    delivered at any later moment, at which point the handler will
        //    dereference the payload pointer. The allocation therefore must
        //    outlive us; leak it. The handler will still find NOT_IN_USE in
        //    queued_to_tid and leave the stack record alone.
        if old_val == self.tid {
            // TODO(stack-free-list): park these on a per-tid free-list and
            // reuse them on the next request for the same tid instead of
            // leaking.
            log::debug!(
                "leaking rendezvous {:p} after lost signal to thread {}",
                self.sig_data,
                self.tid
            );
            self.sig_data = ptr::null_mut();
            return false;
        }

        // 2) The handler claimed the rendezvous. It is either mid-collection
        //    (wait for it, bounded by the unwinding work) or already done
        //    (the wait is a no-op). Either way the record was populated and
        //    the allocation can be freed.
        assert_eq!(old_val, SignalData::DUMP_STARTED);
        // SAFETY: still attached; freed only after result_ready proves the
        // handler is finished with it.
        unsafe {
            (*self.sig_data).result_ready.wait();
            drop(Box::from_raw(self.sig_data));
        }
        self.sig_data = ptr::null_mut();
        true
    }
}

impl Drop for StackTraceCollector<'_> {
    fn drop(&mut self) {
        if !self.sig_data.is_null() {
            self.revoke_sig_data();
        }
    }
}
