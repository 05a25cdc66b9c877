// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Convenience entry points over the collector and the stack trace record.

use crate::errors::StackTraceError;
use crate::stack_trace::StackTrace;

/// Configures which signal is used for remote stack collection.
///
/// The default is `SIGUSR2`. The signal must not be claimed by any other
/// library in the process; a foreign handler on it fails the call with
/// `InvalidArgument` and is left untouched.
#[cfg(target_os = "linux")]
pub fn set_stack_trace_signal(signum: i32) -> Result<(), StackTraceError> {
    crate::collector::signal_handler_manager::set_stack_trace_signal(signum)
}

/// Configures which signal is used for remote stack collection.
#[cfg(not(target_os = "linux"))]
pub fn set_stack_trace_signal(_signum: i32) -> Result<(), StackTraceError> {
    Err(StackTraceError::NotSupported(
        "remote stack collection is not supported on this platform".to_string(),
    ))
}

/// Collects the stack of the thread `tid` into `stack`.
///
/// The target gets about a second to respond. In testing, threads respond
/// within a few milliseconds, so the timeout is very conservative; the usual
/// way to hit it is a target that blocks the chosen signal.
#[cfg(target_os = "linux")]
pub fn get_thread_stack(tid: i64, stack: &mut StackTrace) -> Result<(), StackTraceError> {
    use crate::collector::stack_collector::StackTraceCollector;
    use std::time::{Duration, Instant};

    let collector = StackTraceCollector::trigger_async(tid, stack)?;
    collector.await_collection(Instant::now() + Duration::from_secs(1))
}

/// Collects the stack of the thread `tid` into `stack`.
#[cfg(not(target_os = "linux"))]
pub fn get_thread_stack(_tid: i64, _stack: &mut StackTrace) -> Result<(), StackTraceError> {
    Err(StackTraceError::NotSupported(
        "remote stack collection is not supported on this platform".to_string(),
    ))
}

/// Collects and symbolizes the stack of the thread `tid`. Failures come back
/// as the error text in angle brackets rather than an `Err`, since the
/// output is destined for a report either way.
pub fn dump_thread_stack(tid: i64) -> String {
    let mut stack = StackTrace::new();
    match get_thread_stack(tid, &mut stack) {
        Ok(()) => stack.symbolize(),
        Err(e) => format!("<{e}>"),
    }
}

/// The current thread's stack, symbolized.
///
/// Each of the current-thread entry points skips its own frame, which only
/// works if it actually has one; hence the inlining barriers.
#[inline(never)]
pub fn get_stack_trace() -> String {
    let mut stack = StackTrace::new();
    stack.collect(1);
    stack.symbolize()
}

/// The current thread's stack as space-separated hex addresses.
#[inline(never)]
pub fn get_stack_trace_hex() -> String {
    let mut stack = StackTrace::new();
    stack.collect(1);
    stack.to_hex_string()
}

/// The current thread's stack as one hex address per line, in the layout
/// used for offline symbolization of log files.
#[inline(never)]
pub fn get_log_format_stack_trace_hex() -> String {
    let mut stack = StackTrace::new();
    stack.collect(1);
    stack.to_log_format_hex_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_stack_trace_mentions_this_test() {
        let trace = get_stack_trace();
        assert!(
            trace.contains("test_get_stack_trace_mentions_this_test"),
            "unexpected trace:\n{trace}"
        );
    }

    #[test]
    fn test_get_stack_trace_hex_is_well_formed() {
        let hex = get_stack_trace_hex();
        assert!(!hex.is_empty());
        assert!(hex
            .split(' ')
            .all(|frame| frame.len() == 16 && frame.chars().all(|c| c.is_ascii_hexdigit())));
    }

    #[test]
    fn test_log_format_lines() {
        let log = get_log_format_stack_trace_hex();
        assert!(!log.is_empty());
        assert!(log.lines().all(|line| line.starts_with("    @ ")));
    }
}
