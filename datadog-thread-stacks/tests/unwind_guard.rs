// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

// The unwind-safety guard is process-wide state; collecting anywhere else
// in the process while a guard is live would observe the synthetic frame,
// so this test runs alone in its own binary.

use datadog_thread_stacks::{safe_to_unwind, ScopedUnsafeToUnwind, StackTrace};

#[test]
fn test_guard_substitutes_synthetic_frame() {
    assert!(safe_to_unwind());
    {
        let _outer = ScopedUnsafeToUnwind::new();
        assert!(!safe_to_unwind());
        {
            let _inner = ScopedUnsafeToUnwind::new();
            assert!(!safe_to_unwind());
        }
        // Guards nest; one is still live.
        assert!(!safe_to_unwind());

        let mut trace = StackTrace::new();
        trace.collect(0);
        assert_eq!(trace.num_frames(), 1);
        let symbolized = trace.symbolize();
        assert!(
            symbolized.contains("could_not_collect_stack_trace_because_inside_libdl"),
            "unexpected trace:\n{symbolized}"
        );
    }

    assert!(safe_to_unwind());
    let mut trace = StackTrace::new();
    trace.collect(0);
    assert!(trace.num_frames() >= 1);
    assert!(!trace
        .symbolize()
        .contains("could_not_collect_stack_trace_because_inside_libdl"));
}
