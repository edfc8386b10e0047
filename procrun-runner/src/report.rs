use crate::process::child_failure_hint;
use procrun_core::RunSummary;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Something that happened during a runner invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// The caller broke a precondition; nothing was spawned.
    ContractViolation { run_id: Uuid, reason: String },
    Spawned { run_id: Uuid, pid: i32, program: String },
    /// No child exists.
    SpawnFailed { run_id: Uuid, error: String },
    /// The child's fate is unknown.
    WaitFailed { run_id: Uuid, pid: i32, error: String },
    Finished { summary: RunSummary },
}

impl RunEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            RunEvent::ContractViolation { run_id, .. }
            | RunEvent::Spawned { run_id, .. }
            | RunEvent::SpawnFailed { run_id, .. }
            | RunEvent::WaitFailed { run_id, .. } => *run_id,
            RunEvent::Finished { summary } => summary.run_id,
        }
    }
}

/// Receives runner events in place of a process-wide diagnostic stream.
pub trait Reporter: Send + Sync {
    fn report(&self, event: &RunEvent);
}

/// Emits every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: &RunEvent) {
        match event {
            RunEvent::ContractViolation { run_id, reason } => {
                error!(run_id = %run_id, reason = %reason, "Rejected run: contract violation");
            }
            RunEvent::Spawned { run_id, pid, program } => {
                debug!(run_id = %run_id, pid = pid, program = %program, "Spawned child");
            }
            RunEvent::SpawnFailed { run_id, error } => {
                error!(run_id = %run_id, error = %error, "Failed to create child process");
            }
            RunEvent::WaitFailed { run_id, pid, error } => {
                error!(
                    run_id = %run_id,
                    pid = pid,
                    error = %error,
                    "Failed to wait for child; its exit status is unknown"
                );
            }
            RunEvent::Finished { summary } => {
                let hint = summary.outcome.as_ref().and_then(child_failure_hint);
                match (summary.success, hint) {
                    (true, _) => info!(
                        run_id = %summary.run_id,
                        mode = ?summary.mode,
                        duration_ms = summary.duration_ms,
                        "Run succeeded"
                    ),
                    (false, Some(hint)) => warn!(
                        run_id = %summary.run_id,
                        mode = ?summary.mode,
                        outcome = ?summary.outcome,
                        hint = hint,
                        "Run failed before the target program started"
                    ),
                    (false, None) => warn!(
                        run_id = %summary.run_id,
                        mode = ?summary.mode,
                        outcome = ?summary.outcome,
                        duration_ms = summary.duration_ms,
                        "Run failed"
                    ),
                }
            }
        }
    }
}

/// Keeps events in memory so callers can inspect what was reported.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<RunEvent>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.lock().clone()
    }

    /// Drain everything recorded so far.
    pub fn take(&self) -> Vec<RunEvent> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RunEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, event: &RunEvent) {
        self.lock().push(event.clone());
    }
}
