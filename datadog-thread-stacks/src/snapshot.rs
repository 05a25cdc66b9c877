// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::StackTraceError;
use crate::stack_trace::StackTrace;

/// The result of collecting one thread's stack in a snapshot.
#[derive(Debug, Clone)]
pub struct ThreadInfo {
    pub tid: i64,
    /// From procfs; `<unknown name>` when the name could not be read, empty
    /// when name capture is disabled or collection already failed.
    pub thread_name: String,
    pub status: Result<(), StackTraceError>,
    /// Empty unless `status` is `Ok`.
    pub stack: StackTrace,
}

/// Captures the stacks of every thread in the process and groups identical
/// ones, so that a report over hundreds of threads stays readable.
pub struct StackTraceSnapshot {
    infos: Vec<ThreadInfo>,
    capture_thread_names: bool,
    num_failed: usize,
}

impl StackTraceSnapshot {
    pub fn new() -> Self {
        Self {
            infos: Vec::new(),
            capture_thread_names: true,
            num_failed: 0,
        }
    }

    /// Disabling name capture skips the per-thread procfs reads.
    pub fn set_capture_thread_names(&mut self, capture: bool) {
        self.capture_thread_names = capture;
    }

    /// Number of threads whose stack could not be collected in the last
    /// snapshot.
    pub fn num_failed(&self) -> usize {
        self.num_failed
    }

    /// The collected entries, sorted by stack.
    pub fn threads(&self) -> &[ThreadInfo] {
        &self.infos
    }

    /// Collects the stack of every thread in the process, with a shared one
    /// second deadline.
    ///
    /// Per-thread failures land in the corresponding [`ThreadInfo::status`]
    /// and in [`num_failed`](Self::num_failed); this function itself only
    /// fails on the gating checks (tracer attached, thread listing
    /// unreadable).
    #[cfg(target_os = "linux")]
    pub fn snapshot_all_stacks(&mut self) -> Result<(), StackTraceError> {
        use crate::collector::stack_collector::StackTraceCollector;
        use crate::threads;
        use std::time::{Duration, Instant};

        // Our signal would get tangled up with the tracer's own signal
        // interception.
        if threads::is_being_debugged() {
            return Err(StackTraceError::Incomplete(
                "not collecting stack traces since a debugger or strace is attached".to_string(),
            ));
        }

        let tids = threads::list_threads()?;

        let mut stacks = vec![StackTrace::new(); tids.len()];
        let mut statuses: Vec<Result<(), StackTraceError>> = Vec::with_capacity(tids.len());
        let collectors: Vec<Option<StackTraceCollector<'_>>> = stacks
            .iter_mut()
            .zip(&tids)
            .map(|(stack, &tid)| match StackTraceCollector::trigger_async(tid, stack) {
                Ok(collector) => {
                    statuses.push(Ok(()));
                    Some(collector)
                }
                Err(e) => {
                    statuses.push(Err(e));
                    None
                }
            })
            .collect();

        // Read the thread names while the signals are in flight, overlapping
        // the procfs reads with the remote unwinding.
        let names: Vec<String> = tids
            .iter()
            .zip(&statuses)
            .map(|(&tid, status)| {
                if self.capture_thread_names && status.is_ok() {
                    threads::thread_name(tid)
                } else {
                    String::new()
                }
            })
            .collect();

        let deadline = Instant::now() + Duration::from_secs(1);
        for (collector, status) in collectors.into_iter().zip(statuses.iter_mut()) {
            if let Some(collector) = collector {
                if let Err(e) = collector.await_collection(deadline) {
                    *status = Err(e);
                }
            }
        }

        self.num_failed = 0;
        self.infos = tids
            .into_iter()
            .zip(names)
            .zip(statuses.into_iter().zip(stacks))
            .map(|((tid, thread_name), (status, stack))| ThreadInfo {
                tid,
                thread_name,
                status,
                stack,
            })
            .collect();
        for info in &self.infos {
            if info.status.is_err() {
                self.num_failed += 1;
                debug_assert!(!info.stack.has_collected(), "{:?}", info.status);
            }
        }

        self.infos.sort_by(|a, b| a.stack.cmp(&b.stack));
        Ok(())
    }

    /// Collects the stack of every thread in the process.
    #[cfg(not(target_os = "linux"))]
    pub fn snapshot_all_stacks(&mut self) -> Result<(), StackTraceError> {
        Err(StackTraceError::NotSupported(
            "thread stack snapshots are not supported on this platform".to_string(),
        ))
    }

    /// Invokes `visitor` once per maximal run of entries with equal stacks.
    /// The runs are disjoint, in sorted order, and together cover every
    /// entry of the snapshot.
    pub fn visit_groups(&self, mut visitor: impl FnMut(&[ThreadInfo])) {
        let mut start = 0;
        while start < self.infos.len() {
            let mut end = start + 1;
            while end < self.infos.len() && self.infos[end].stack == self.infos[start].stack {
                end += 1;
            }
            visitor(&self.infos[start..end]);
            start = end;
        }
    }
}

impl Default for StackTraceSnapshot {
    fn default() -> Self {
        Self::new()
    }
}
