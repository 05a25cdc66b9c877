// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering::SeqCst};
use std::time::Instant;

/// One-shot completion flag built directly on a futex word.
///
/// A mutex and condvar cannot be used here because the flag is signalled
/// from a signal handler, and pthread locks are not async-signal-safe.
/// POSIX semaphores are, but their timed wait only understands the wall
/// clock, and these waits need strict monotonic deadlines.
pub(crate) struct CompletionFlag {
    complete: AtomicU32,
}

impl CompletionFlag {
    pub const fn new() -> Self {
        Self {
            complete: AtomicU32::new(0),
        }
    }

    /// Marks the flag complete, waking all waiters.
    ///
    /// Async-signal-safe: one atomic store and one raw futex syscall.
    pub fn signal(&self) {
        self.complete.store(1, SeqCst);
        // SAFETY: raw wake on the flag word; no pointers are dereferenced by
        // the kernel beyond the word itself.
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.complete.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                libc::INT_MAX,
                ptr::null::<libc::timespec>(),
                ptr::null::<u32>(),
                0,
            );
        }
    }

    /// Waits for the flag to become complete, up until the given deadline.
    /// Returns whether the flag was complete before the deadline. Spurious
    /// futex returns are absorbed by re-checking the flag in a loop.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        if self.complete() {
            return true;
        }
        let mut now = Instant::now();
        while now < deadline {
            let remaining = deadline - now;
            let ts = libc::timespec {
                tv_sec: remaining.as_secs() as libc::time_t,
                tv_nsec: remaining.subsec_nanos() as libc::c_long,
            };
            // SAFETY: waits only if the word is still 0; the timeout pointer
            // refers to a stack local that outlives the call.
            unsafe {
                libc::syscall(
                    libc::SYS_futex,
                    self.complete.as_ptr(),
                    libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                    0,
                    &ts as *const libc::timespec,
                    ptr::null::<u32>(),
                    0,
                );
            }
            if self.complete() {
                return true;
            }
            now = Instant::now();
        }
        self.complete()
    }

    /// Waits with no deadline. Only used once the signal handler is known to
    /// have claimed the rendezvous, which bounds the wait by the handler's
    /// remaining unwinding work.
    pub fn wait(&self) {
        while !self.complete() {
            // SAFETY: as in `wait_until`, with no timeout.
            unsafe {
                libc::syscall(
                    libc::SYS_futex,
                    self.complete.as_ptr(),
                    libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                    0,
                    ptr::null::<libc::timespec>(),
                    ptr::null::<u32>(),
                    0,
                );
            }
        }
    }

    /// Clears the flag. Only safe while no thread is waiting on it or about
    /// to signal it.
    #[allow(dead_code)]
    pub fn reset(&self) {
        self.complete.store(0, SeqCst);
    }

    pub fn complete(&self) -> bool {
        self.complete.load(SeqCst) != 0
    }
}
