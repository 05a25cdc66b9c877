// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Best-effort flushing of coverage counters before abnormal exits.
//!
//! Coverage builds link a flush hook into the binary; regular builds do not.
//! The hook is looked up through `dlsym` at runtime so this crate carries no
//! link-time dependency on it.

use crate::spinlock::SpinLock;
use std::sync::OnceLock;

type CoverageFlushFn = unsafe extern "C" fn();

static COVERAGE_FLUSH: OnceLock<Option<CoverageFlushFn>> = OnceLock::new();
static COVERAGE_LOCK: SpinLock<()> = SpinLock::new(());

fn coverage_flush() -> Option<CoverageFlushFn> {
    *COVERAGE_FLUSH.get_or_init(|| {
        // SAFETY: dlsym with a static nul-terminated name; the symbol, when
        // present, has the declared zero-argument C signature.
        let sym = unsafe {
            libc::dlsym(
                libc::RTLD_DEFAULT,
                b"__gcov_flush\0".as_ptr() as *const libc::c_char,
            )
        };
        if sym.is_null() {
            None
        } else {
            // SAFETY: non-null symbol from the toolchain's coverage runtime.
            Some(unsafe { std::mem::transmute::<*mut libc::c_void, CoverageFlushFn>(sym) })
        }
    })
}

/// Whether this binary was linked with coverage instrumentation.
pub fn is_coverage_build() -> bool {
    coverage_flush().is_some()
}

/// Flushes coverage counters to disk if this is a coverage build.
///
/// Flushing is neither reentrant nor thread-safe, so concurrent requests are
/// dropped rather than serialized.
pub fn try_flush_coverage() {
    let Some(flush) = coverage_flush() else {
        return;
    };
    let Some(_guard) = COVERAGE_LOCK.try_lock() else {
        return;
    };
    // SAFETY: serialized by the lock above.
    unsafe { flush() };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_is_a_noop_without_instrumentation() {
        // Plain test builds carry no coverage runtime; both calls must be
        // harmless either way.
        try_flush_coverage();
        try_flush_coverage();
        if !is_coverage_build() {
            assert!(coverage_flush().is_none());
        }
    }
}
