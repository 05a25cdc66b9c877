// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors reported by the stack collection subsystem.
///
/// The signal handler itself never reports errors; it silently gives up when
/// it loses the rendezvous race. Everything observable by callers surfaces
/// through one of these variants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StackTraceError {
    /// The requested signal is already bound to a foreign handler.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The platform lacks the required signal or syscall surface.
    #[error("not supported: {0}")]
    NotSupported(String),
    /// Signal delivery failed, typically because the thread has exited.
    #[error("not found: {0}")]
    NotFound(String),
    /// The target thread did not respond before the deadline.
    #[error("timed out: {0}")]
    TimedOut(String),
    /// Collection was refused because a debugger or tracer is attached.
    #[error("incomplete: {0}")]
    Incomplete(String),
    /// The kernel thread listing could not be read.
    #[error("I/O error: {0}")]
    IoError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_kind_and_message() {
        let err = StackTraceError::TimedOut("thread did not respond".to_string());
        assert_eq!(err.to_string(), "timed out: thread did not respond");

        let err = StackTraceError::NotFound("process may have exited".to_string());
        assert_eq!(err.to_string(), "not found: process may have exited");
    }
}
