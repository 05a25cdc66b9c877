// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::completion_flag::CompletionFlag;
use crate::stack_trace::StackTrace;
use std::sync::atomic::AtomicI64;

/// Rendezvous object shared between a requesting thread and the signal
/// handler running in the target thread. A pointer to it travels to the
/// target as the queued signal's payload.
///
/// The state machine is as follows (each state is a tuple of `queued_to_tid`
/// and `result_ready`):
///
/// ```text
///   [ NOT_IN_USE, false ]
///           |
///           | (A)
///           v                 (D)
///   [ <target tid>, false ]  --->  [ NOT_IN_USE, false ] (leaked)
///           |
///           | (B)
///           v                 (E)
///   [ DUMP_STARTED, false ]  --->  [ NOT_IN_USE, false ] (requester waits for result_ready)
///           |                                |
///           | (C)                            | (G)
///           v                 (F)            v
///   [ DUMP_STARTED, true ]   --->  [ NOT_IN_USE, true ] (already complete)
/// ```
///
/// Transitions:
///    (A): requester stores the target tid before queueing the signal
///    (B): handler CASes the tid to DUMP_STARTED, and gives up on CAS failure
///    (C,G): handler finishes collecting and signals `result_ready`
///    (D,E,F): requester exchanges NOT_IN_USE back into `queued_to_tid` when
///             revoking
///
/// The caller-owned stack record behind `stack` is written only while
/// `queued_to_tid == DUMP_STARTED`, and once `result_ready` is set the whole
/// object is immutable.
pub(crate) struct SignalData {
    /// Destination for the stack trace collected in the target thread.
    pub stack: *mut StackTrace,

    /// One of the two sentinels below, or the tid the requester is waiting
    /// on.
    pub queued_to_tid: AtomicI64,

    /// Set once the target thread has collected its stack. The requester
    /// waits for this to become true.
    pub result_ready: CompletionFlag,
}

impl SignalData {
    /// The requester has revoked; a late handler must not touch `stack`.
    pub const NOT_IN_USE: i64 = 0;
    /// The handler has claimed the rendezvous and owns `stack` until it
    /// signals `result_ready`.
    pub const DUMP_STARTED: i64 = -1;

    pub fn new(tid: i64, stack: *mut StackTrace) -> Self {
        Self {
            stack,
            queued_to_tid: AtomicI64::new(tid),
            result_ready: CompletionFlag::new(),
        }
    }
}
