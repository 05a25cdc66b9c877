// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg(target_os = "linux")]

// Installing a foreign handler poisons process-wide signal state, so this
// test lives in its own binary.

use datadog_thread_stacks::{set_stack_trace_signal, StackTraceError};

extern "C" fn foreign_handler(_signum: libc::c_int) {}

#[test]
fn test_foreign_handler_is_never_overwritten() {
    // SAFETY: plain handler installation on a signal nothing else uses.
    let rc = unsafe { libc::signal(libc::SIGUSR1, foreign_handler as libc::sighandler_t) };
    assert_ne!(rc, libc::SIG_ERR);

    let err = set_stack_trace_signal(libc::SIGUSR1).unwrap_err();
    assert!(matches!(err, StackTraceError::InvalidArgument(_)), "{err:?}");

    // The foreign handler must still be in place.
    let mut act: libc::sigaction = unsafe { std::mem::zeroed() };
    // SAFETY: query-only sigaction with a null new action.
    assert_eq!(
        unsafe { libc::sigaction(libc::SIGUSR1, std::ptr::null(), &mut act) },
        0
    );
    assert_eq!(act.sa_sigaction, foreign_handler as libc::sighandler_t);

    // Moving to an unclaimed signal recovers from the error state.
    set_stack_trace_signal(libc::SIGUSR2).unwrap();

    // The occupied signal keeps being refused, and moving away keeps
    // working.
    assert!(set_stack_trace_signal(libc::SIGUSR1).is_err());
    set_stack_trace_signal(libc::SIGUSR2).unwrap();
}
