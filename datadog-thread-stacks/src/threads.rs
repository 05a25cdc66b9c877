// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Thread enumeration and metadata, read from the kernel's procfs export.

use crate::errors::StackTraceError;

/// Lists the kernel thread ids of every thread in the current process.
#[cfg(target_os = "linux")]
pub fn list_threads() -> Result<Vec<i64>, StackTraceError> {
    let entries = std::fs::read_dir("/proc/self/task")
        .map_err(|e| StackTraceError::IoError(format!("failed to open task dir: {e}")))?;
    let mut tids = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| StackTraceError::IoError(format!("failed to read task dir: {e}")))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        match name.parse::<i64>() {
            Ok(tid) => tids.push(tid),
            Err(_) => log::warn!("bad tid found in procfs: {name}"),
        }
    }
    Ok(tids)
}

/// Lists the kernel thread ids of every thread in the current process.
#[cfg(not(target_os = "linux"))]
pub fn list_threads() -> Result<Vec<i64>, StackTraceError> {
    Err(StackTraceError::NotSupported(
        "unable to list threads on this platform".to_string(),
    ))
}

/// Reads a thread's name from its `comm` pseudo-file.
#[cfg(target_os = "linux")]
pub(crate) fn thread_name(tid: i64) -> String {
    match std::fs::read_to_string(format!("/proc/self/task/{tid}/comm")) {
        Ok(name) => name.trim_end_matches('\n').to_string(),
        Err(_) => "<unknown name>".to_string(),
    }
}

/// Whether a ptrace tracer (debugger, strace) is attached to this process.
#[cfg(target_os = "linux")]
pub(crate) fn is_being_debugged() -> bool {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return false;
    };
    for line in status.lines() {
        if let Some(tracer) = line.strip_prefix("TracerPid:") {
            return tracer.trim().parse::<i64>().map(|pid| pid != 0).unwrap_or(false);
        }
    }
    false
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn test_list_threads_contains_current_thread() {
        let tid = nix::unistd::gettid().as_raw() as i64;
        let tids = list_threads().unwrap();
        assert!(tids.contains(&tid), "{tid} missing from {tids:?}");
    }

    #[test]
    fn test_thread_name_of_current_thread() {
        let tid = nix::unistd::gettid().as_raw() as i64;
        let name = thread_name(tid);
        assert!(!name.is_empty());
        assert!(!name.ends_with('\n'));
    }

    #[test]
    fn test_thread_name_of_missing_thread() {
        assert_eq!(thread_name(-1), "<unknown name>");
    }

    #[test]
    fn test_not_being_debugged_under_cargo_test() {
        assert!(!is_being_debugged());
    }
}
