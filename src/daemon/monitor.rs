//! 실행 중(IN_PROGRESS) task 정리.
//!
//! 모든 종료 전이는 "아직 IN_PROGRESS인 경우에만" 적용된다. 같은 task에 대해
//! orphan scan과 exit handler가 중복으로 돌아도 두 번째는 no-op이다.

use anyhow::Result;
use tracing::{debug, info};

use crate::error::SupervisionError;
use crate::events::{EventBus, FailureCause, TaskEvent};
use crate::infrastructure::process::{ProbeResult, ProcessProbe};
use crate::queue::repository::TaskRepository;
use crate::queue::Database;

/// child 프로세스 종료 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    Code(i32),
    Signal(i32),
    /// 종료 상태를 관측하지 못함 (이미 reap됨 등)
    Unknown,
}

impl ChildExit {
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        match (status.code(), status.signal()) {
            (Some(code), _) => ChildExit::Code(code),
            (None, Some(sig)) => ChildExit::Signal(sig),
            _ => ChildExit::Unknown,
        }
    }

    fn failure(self) -> Option<SupervisionError> {
        match self {
            ChildExit::Code(0) | ChildExit::Unknown => None,
            ChildExit::Code(code) => Some(SupervisionError::ExitCode(code)),
            ChildExit::Signal(sig) => Some(SupervisionError::Signal(sig)),
        }
    }
}

pub fn orphan_message(pid: u32) -> String {
    format!("Task failed: worker process (PID {pid}) no longer running")
}

pub fn timeout_message(secs: u64) -> String {
    format!("Task timed out after {secs} seconds")
}

fn exit_message(err: &SupervisionError) -> String {
    match err {
        SupervisionError::ExitCode(code) => format!("Worker subprocess exited with code {code}"),
        SupervisionError::Signal(sig) => format!("Worker subprocess terminated by signal {sig}"),
        SupervisionError::Timeout(secs) => timeout_message(*secs),
    }
}

pub struct Monitor<'a> {
    db: &'a Database,
    events: &'a EventBus,
    probe: &'a dyn ProcessProbe,
}

impl<'a> Monitor<'a> {
    pub fn new(db: &'a Database, events: &'a EventBus, probe: &'a dyn ProcessProbe) -> Self {
        Self { db, events, probe }
    }

    /// worker_pid가 더 이상 살아있지 않은 IN_PROGRESS task를 FAILED로 전이한다.
    ///
    /// scan과 전이는 하나의 write lock 안에서 일어나고, 이벤트는 commit 이후에 발생한다.
    /// 반환값은 FAILED로 바뀐 task 수.
    pub fn detect_orphans(&self) -> Result<usize> {
        let failed = self.db.with_write_lock(|| {
            let mut failed = Vec::new();
            for task in self.db.task_scan_in_progress_with_pid()? {
                let Some(pid) = task.worker_pid else {
                    continue;
                };
                match self.probe.probe(pid) {
                    ProbeResult::Alive => continue,
                    ProbeResult::AliveOtherOwner => {
                        debug!("task {}: pid {pid} owned by another user, assuming alive", task.id);
                        continue;
                    }
                    ProbeResult::Gone => {}
                }
                if self.db.task_fail_if_in_progress(&task.id, &orphan_message(pid))? {
                    failed.push(task.id);
                }
            }
            Ok(failed)
        })?;

        for id in &failed {
            self.fire_failure(id, None)?;
        }
        if !failed.is_empty() {
            info!("reconciled {} orphaned task(s)", failed.len());
        }
        Ok(failed.len())
    }

    /// 정상 종료(`Code(0)`)나 관측 불가(`Unknown`)는 no-op.
    /// 반환값은 이번 호출로 FAILED 전이가 일어났는지 여부.
    pub fn handle_exit(&self, task_id: &str, exit: ChildExit) -> Result<bool> {
        let Some(err) = exit.failure() else {
            return Ok(false);
        };
        self.fail(task_id, err)
    }

    pub fn handle_timeout(&self, task_id: &str, timeout_secs: u64) -> Result<bool> {
        self.fail(task_id, SupervisionError::Timeout(timeout_secs))
    }

    fn fail(&self, task_id: &str, err: SupervisionError) -> Result<bool> {
        if !self.db.task_fail_if_in_progress(task_id, &exit_message(&err))? {
            return Ok(false);
        }
        self.fire_failure(task_id, Some(&err))?;
        Ok(true)
    }

    fn fire_failure(&self, task_id: &str, error: FailureCause<'_>) -> Result<()> {
        if let Some(task) = self.db.task_get(task_id)? {
            self.events.emit(&TaskEvent::OnFailure { task: &task, error });
        }
        Ok(())
    }
}
