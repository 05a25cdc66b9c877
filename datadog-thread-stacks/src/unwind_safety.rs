// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tracks whether it is currently safe to run the unwinder.
//!
//! The unwinder consults the dynamic loader's tables and may take the
//! loader's internal lock. If a signal interrupts a thread that is inside
//! `dlopen` or a similar entry point and the handler then unwinds, the
//! process deadlocks. Code that re-enters the loader brackets the call with
//! a [`ScopedUnsafeToUnwind`] guard; `StackTrace::collect` checks the flag
//! and substitutes a self-describing synthetic frame while any guard is
//! live.

use std::sync::atomic::{AtomicU32, Ordering::SeqCst};

static UNWIND_UNSAFE_DEPTH: AtomicU32 = AtomicU32::new(0);

/// Whether the unwinder may be invoked right now, on any thread.
pub fn safe_to_unwind() -> bool {
    UNWIND_UNSAFE_DEPTH.load(SeqCst) == 0
}

/// RAII guard marking a region where unwinding must not happen.
///
/// The counter is process-wide: a stack trace request can land on any
/// thread, so a loader re-entry anywhere suppresses unwinding everywhere.
/// Guards nest.
pub struct ScopedUnsafeToUnwind {
    _priv: (),
}

impl ScopedUnsafeToUnwind {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        UNWIND_UNSAFE_DEPTH.fetch_add(1, SeqCst);
        Self { _priv: () }
    }
}

impl Drop for ScopedUnsafeToUnwind {
    fn drop(&mut self) {
        UNWIND_UNSAFE_DEPTH.fetch_sub(1, SeqCst);
    }
}
