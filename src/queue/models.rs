use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

// ─── Task status ───

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    /// 관리자가 외부에서만 설정한다. claim/execute/monitor 경로는 생성하지 않는다.
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Queued,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Executor가 실행을 진행해도 되는 상태인지 (claim 직후는 InProgress)
    pub fn is_runnable(&self) -> bool {
        matches!(self, TaskStatus::Queued | TaskStatus::InProgress)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_runnable()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown task status: {s}"))
    }
}

impl ToSql for TaskStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TaskStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

// ─── Task record ───

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub created: String,
    pub modified: String,
    pub callable_ref: String,
    /// JSON 직렬화된 keyword arguments (실행 시점에 파싱)
    pub arguments: String,
    pub status: TaskStatus,
    pub output: Option<String>,
    pub error: Option<String>,
    pub worker_pid: Option<u32>,
    pub log: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub callable_ref: String,
    pub arguments: String,
}

/// 부분 업데이트. `None` 필드는 건드리지 않는다.
///
/// `worker_pid`/`log`는 NULL로 되돌릴 수 있어야 하므로 `Option<Option<_>>`:
/// `Some(None)` = clear, `Some(Some(v))` = set.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub output: Option<String>,
    pub error: Option<String>,
    pub worker_pid: Option<Option<u32>>,
    pub log: Option<Option<String>>,
}

// ─── Query result models ───

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskListItem {
    pub id: String,
    pub callable_ref: String,
    pub status: TaskStatus,
    pub modified: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    pub queued: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

impl StatusCounts {
    pub fn add(&mut self, status: TaskStatus, count: i64) {
        match status {
            TaskStatus::Queued => self.queued += count,
            TaskStatus::InProgress => self.in_progress += count,
            TaskStatus::Completed => self.completed += count,
            TaskStatus::Failed => self.failed += count,
            TaskStatus::Cancelled => self.cancelled += count,
        }
    }
}
