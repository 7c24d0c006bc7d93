//! task 생성/조회 surface. CLI와 embedding 애플리케이션이 같이 쓴다.

use anyhow::Result;

use crate::config::models::TasksConfig;
use crate::error::{CreateError, QueueError};
use crate::queue::models::{NewTask, Task, TaskStatus};
use crate::queue::repository::{QueueAdmin, TaskRepository};
use crate::queue::Database;
use crate::registry::json_type_name;

/// QUEUED task 생성 후 id 반환.
///
/// `callable_ref`는 여기서 해석하지 않는다 — 존재 여부는 실행 시점에 판정된다.
pub fn create_task(
    db: &Database,
    policy: &TasksConfig,
    callable_ref: &str,
    arguments: &serde_json::Value,
) -> Result<String, CreateError> {
    if !arguments.is_object() {
        return Err(CreateError::ArgumentType(json_type_name(arguments)));
    }
    if !policy.is_allowed(callable_ref) {
        return Err(CreateError::NotAllowed(callable_ref.to_string()));
    }

    let serialized = serde_json::to_string(arguments).map_err(anyhow::Error::from)?;
    if serialized.len() > policy.max_args_size {
        return Err(CreateError::ArgumentsTooLarge {
            size: serialized.len(),
            max: policy.max_args_size,
        });
    }

    let id = db.task_insert(&NewTask {
        callable_ref: callable_ref.to_string(),
        arguments: serialized,
    })?;
    tracing::debug!("created task {id} ({callable_ref})");
    Ok(id)
}

pub fn get_status(db: &Database, task_id: &str) -> Result<Task> {
    db.task_get(task_id)?
        .ok_or_else(|| QueueError::TaskNotFound(task_id.to_string()).into())
}

/// 종료된 task를 다시 QUEUED로
pub fn enqueue(db: &Database, task_id: &str) -> Result<String> {
    let task = get_status(db, task_id)?;
    if task.status.is_terminal() && db.queue_enqueue(task_id)? {
        Ok(format!("re-enqueued: {task_id} (was {})\n", task.status))
    } else {
        Ok(format!(
            "not re-enqueued: {task_id} is {} (only completed/failed/cancelled tasks can be re-enqueued)\n",
            task.status
        ))
    }
}

/// task 한 건 — text 또는 JSON
pub fn render_task(task: &Task, json: bool) -> Result<String> {
    if json {
        return Ok(format!("{}\n", serde_json::to_string_pretty(task)?));
    }

    let mut output = String::new();
    output.push_str(&format!("id:        {}\n", task.id));
    output.push_str(&format!("callable:  {}\n", task.callable_ref));
    output.push_str(&format!("status:    {}\n", task.status));
    output.push_str(&format!("arguments: {}\n", task.arguments));
    output.push_str(&format!("created:   {}\n", task.created));
    output.push_str(&format!("modified:  {}\n", task.modified));
    if let Some(pid) = task.worker_pid {
        output.push_str(&format!("worker:    {pid}\n"));
    }

    for (label, body) in [
        ("output", &task.output),
        ("error", &task.error),
        ("log", &task.log),
    ] {
        if let Some(body) = body {
            output.push_str(&format!("\n--- {label} ---\n{}\n", body.trim_end()));
        }
    }
    Ok(output)
}

/// 최근 task 목록
pub fn list(db: &Database, status: Option<TaskStatus>, limit: u32) -> Result<String> {
    let items = db.task_list(status, limit)?;
    let mut output = String::new();

    for item in &items {
        output.push_str(&format!(
            "  {} {:<12} {} {}\n",
            item.modified, item.status, item.id, item.callable_ref
        ));
    }

    if output.is_empty() {
        output.push_str("No tasks found.\n");
    }

    Ok(output)
}

/// 상태별 개수
pub fn summary(db: &Database) -> Result<String> {
    let counts = db.queue_counts()?;
    let mut output = String::from("Tasks:\n");
    for (status, n) in [
        (TaskStatus::Queued, counts.queued),
        (TaskStatus::InProgress, counts.in_progress),
        (TaskStatus::Completed, counts.completed),
        (TaskStatus::Failed, counts.failed),
        (TaskStatus::Cancelled, counts.cancelled),
    ] {
        output.push_str(&format!("  {:<12} {n}\n", status.as_str()));
    }
    Ok(output)
}
