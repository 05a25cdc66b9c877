// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::signal_handler::handle_stack_trace_signal;
use crate::errors::StackTraceError;
use crate::spinlock::SpinLock;
use std::mem;
use std::ptr;

/// Signal used to ask another thread for its stack. It must not be in use by
/// any other library in the process; `install_unlocked` refuses to overwrite
/// a foreign disposition.
const DEFAULT_STACK_TRACE_SIGNUM: i32 = libc::SIGUSR2;

#[derive(Clone, Copy, PartialEq, Eq)]
enum InitState {
    Uninitialized,
    InitError,
    Initialized,
}

struct HandlerState {
    signum: i32,
    state: InitState,
}

/// Guards the signal number and the installation of the handler. The
/// critical sections are a couple of sigaction calls, so a spinlock is
/// enough and keeps this usable from any thread.
static HANDLER_STATE: SpinLock<HandlerState> = SpinLock::new(HandlerState {
    signum: DEFAULT_STACK_TRACE_SIGNUM,
    state: InitState::Uninitialized,
});

/// Configures which signal is used for remote stack collection, installing
/// the handler on it.
///
/// Idempotent; switching to a new signal releases the previously claimed
/// one. Fails with `InvalidArgument` if the requested signal already has a
/// foreign handler.
pub fn set_stack_trace_signal(signum: i32) -> Result<(), StackTraceError> {
    let mut state = HANDLER_STATE.lock();
    if !install_unlocked(&mut state, signum) {
        return Err(StackTraceError::InvalidArgument(
            "unable to install stack trace signal handler".to_string(),
        ));
    }
    Ok(())
}

/// Makes sure the handler is installed on the configured signal, returning
/// the signal number to queue. Called on every trigger so that collection
/// works without explicit initialization.
pub(crate) fn ensure_installed() -> Result<i32, StackTraceError> {
    let mut state = HANDLER_STATE.lock();
    let signum = state.signum;
    if !install_unlocked(&mut state, signum) {
        return Err(StackTraceError::NotSupported(
            "unable to take thread stack: signal handler unavailable".to_string(),
        ));
    }
    Ok(signum)
}

fn install_unlocked(state: &mut HandlerState, signum: i32) -> bool {
    // If we had registered a handler but are being asked to change signals,
    // release the old slot, provided it still points at us.
    if signum != state.signum && state.state == InitState::Initialized {
        let mut old_act: libc::sigaction = unsafe { mem::zeroed() };
        // SAFETY: query-only sigaction with a null new action.
        if unsafe { libc::sigaction(state.signum, ptr::null(), &mut old_act) } == 0
            && old_act.sa_sigaction == handle_stack_trace_signal as libc::sighandler_t
        {
            // SAFETY: restoring the default disposition on a signal we own.
            unsafe { libc::signal(state.signum, libc::SIG_DFL) };
        }
    }

    // A changed signal number always restarts the state machine, including
    // out of a previous error.
    if signum != state.signum {
        state.signum = signum;
        state.state = InitState::Uninitialized;
    }

    if state.state == InitState::Uninitialized {
        let mut old_act: libc::sigaction = unsafe { mem::zeroed() };
        // SAFETY: query-only sigaction with a null new action.
        if unsafe { libc::sigaction(signum, ptr::null(), &mut old_act) } != 0 {
            state.state = InitState::InitError;
            return false;
        }
        if old_act.sa_sigaction != libc::SIG_DFL && old_act.sa_sigaction != libc::SIG_IGN {
            state.state = InitState::InitError;
            log::warn!(
                "signal handler for stack trace signal {signum} is already in use: \
                 thread stack traces will not be produced"
            );
        } else {
            // No one appears to be using the signal. This read-then-install
            // is racy against foreign installers, there being no atomic swap
            // for signal dispositions; the race is detected below.
            let mut act: libc::sigaction = unsafe { mem::zeroed() };
            act.sa_sigaction = handle_stack_trace_signal as libc::sighandler_t;
            act.sa_flags = libc::SA_SIGINFO | libc::SA_RESTART;
            let mut prev_act: libc::sigaction = unsafe { mem::zeroed() };
            // SAFETY: installing our own extern "C" sigaction handler.
            if unsafe { libc::sigaction(signum, &act, &mut prev_act) } != 0 {
                state.state = InitState::InitError;
                return false;
            }
            if prev_act.sa_sigaction != libc::SIG_DFL && prev_act.sa_sigaction != libc::SIG_IGN {
                // The pre-install read saw the default disposition, yet we
                // displaced a live foreign handler that cannot be restored
                // race-free. Unrecoverable programming error.
                eprintln!("raced against another thread installing a signal handler");
                std::process::abort();
            }
            state.state = InitState::Initialized;
        }
    }
    state.state == InitState::Initialized
}
