use anyhow::Result;
use rusqlite::types::ToSql;
use rusqlite::{OptionalExtension, Row};
use uuid::Uuid;

use super::models::*;
use super::{now_timestamp, Database};

// ─── Repository traits ───

pub trait TaskRepository {
    fn task_insert(&self, task: &NewTask) -> Result<String>;
    fn task_get(&self, id: &str) -> Result<Option<Task>>;
    fn task_update(&self, id: &str, update: &TaskUpdate) -> Result<()>;
    /// 가장 오래된(modified 기준) queued task를 원자적으로 in_progress로 전이하고 id 반환
    fn task_claim_next(&self, pid: u32) -> Result<Option<String>>;
    /// 아직 in_progress일 때만 worker_pid를 기록한다. 이미 종료된 task면 false.
    fn task_set_worker_pid(&self, id: &str, pid: u32) -> Result<bool>;
    /// worker_pid가 있는 in_progress task 목록.
    ///
    /// lock을 잡지 않는다. scan 결과로 전이를 결정하려면 `Database::with_write_lock`
    /// 안에서 호출해야 한다 (안에서 다시 lock을 잡으면 중첩 트랜잭션 에러).
    fn task_scan_in_progress_with_pid(&self) -> Result<Vec<Task>>;
    /// 아직 in_progress일 때만 failed로 전이. error에 `message`를 덧붙이고 worker_pid를 비운다.
    fn task_fail_if_in_progress(&self, id: &str, message: &str) -> Result<bool>;
    fn task_list(&self, status: Option<TaskStatus>, limit: u32) -> Result<Vec<TaskListItem>>;
}

pub trait QueueAdmin {
    /// 종료 상태의 task를 다시 queued로 되돌린다 (output/error/log/worker_pid 초기화)
    fn queue_enqueue(&self, id: &str) -> Result<bool>;
    fn queue_counts(&self) -> Result<StatusCounts>;
}

// ─── SQLite implementations ───

const TASK_COLUMNS: &str =
    "id, created, modified, callable_ref, arguments, status, output, error, worker_pid, log";

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        created: row.get(1)?,
        modified: row.get(2)?,
        callable_ref: row.get(3)?,
        arguments: row.get(4)?,
        status: row.get(5)?,
        output: row.get(6)?,
        error: row.get(7)?,
        worker_pid: row.get(8)?,
        log: row.get(9)?,
    })
}

impl TaskRepository for Database {
    fn task_insert(&self, task: &NewTask) -> Result<String> {
        let now = now_timestamp();
        let id = Uuid::new_v4().to_string();

        self.conn().execute(
            "INSERT INTO tasks (id, created, modified, callable_ref, arguments, status) \
             VALUES (?1, ?2, ?2, ?3, ?4, ?5)",
            rusqlite::params![id, now, task.callable_ref, task.arguments, TaskStatus::Queued],
        )?;

        Ok(id)
    }

    fn task_get(&self, id: &str) -> Result<Option<Task>> {
        let task = self
            .conn()
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                rusqlite::params![id],
                row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    fn task_update(&self, id: &str, update: &TaskUpdate) -> Result<()> {
        let now = now_timestamp();
        let mut sets = vec!["modified = ?2".to_string()];
        let mut params: Vec<&dyn ToSql> = vec![&id, &now];

        if let Some(ref status) = update.status {
            params.push(status);
            sets.push(format!("status = ?{}", params.len()));
        }
        if let Some(ref output) = update.output {
            params.push(output);
            sets.push(format!("output = ?{}", params.len()));
        }
        if let Some(ref error) = update.error {
            params.push(error);
            sets.push(format!("error = ?{}", params.len()));
        }
        if let Some(ref worker_pid) = update.worker_pid {
            params.push(worker_pid);
            sets.push(format!("worker_pid = ?{}", params.len()));
        }
        if let Some(ref log) = update.log {
            params.push(log);
            sets.push(format!("log = ?{}", params.len()));
        }

        self.conn().execute(
            &format!("UPDATE tasks SET {} WHERE id = ?1", sets.join(", ")),
            params.as_slice(),
        )?;
        Ok(())
    }

    fn task_claim_next(&self, pid: u32) -> Result<Option<String>> {
        self.with_write_lock(|| {
            let id: Option<String> = self
                .conn()
                .query_row(
                    "SELECT id FROM tasks WHERE status = ?1 ORDER BY modified, rowid LIMIT 1",
                    rusqlite::params![TaskStatus::Queued],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(ref id) = id {
                self.conn().execute(
                    "UPDATE tasks SET status = ?2, worker_pid = ?3, modified = ?4 WHERE id = ?1",
                    rusqlite::params![id, TaskStatus::InProgress, pid, now_timestamp()],
                )?;
                tracing::debug!("claimed task {id} (pid {pid})");
            }
            Ok(id)
        })
    }

    fn task_set_worker_pid(&self, id: &str, pid: u32) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE tasks SET worker_pid = ?2, modified = ?3 WHERE id = ?1 AND status = ?4",
            rusqlite::params![id, pid, now_timestamp(), TaskStatus::InProgress],
        )?;
        Ok(affected > 0)
    }

    fn task_scan_in_progress_with_pid(&self) -> Result<Vec<Task>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE status = ?1 AND worker_pid IS NOT NULL ORDER BY modified"
        ))?;
        let rows = stmt.query_map(rusqlite::params![TaskStatus::InProgress], row_to_task)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn task_fail_if_in_progress(&self, id: &str, message: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE tasks SET status = ?2, error = COALESCE(error, '') || ?3, \
             worker_pid = NULL, modified = ?4 \
             WHERE id = ?1 AND status = ?5",
            rusqlite::params![
                id,
                TaskStatus::Failed,
                format!("\n{message}"),
                now_timestamp(),
                TaskStatus::InProgress
            ],
        )?;
        if affected > 0 {
            tracing::error!("task {id} failed: {message}");
        }
        Ok(affected > 0)
    }

    fn task_list(&self, status: Option<TaskStatus>, limit: u32) -> Result<Vec<TaskListItem>> {
        let conn = self.conn();
        let map = |row: &Row<'_>| -> rusqlite::Result<TaskListItem> {
            Ok(TaskListItem {
                id: row.get(0)?,
                callable_ref: row.get(1)?,
                status: row.get(2)?,
                modified: row.get(3)?,
            })
        };

        let rows = match status {
            Some(status) => {
                let mut stmt = conn.prepare(
                    "SELECT id, callable_ref, status, modified FROM tasks \
                     WHERE status = ?1 ORDER BY modified DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(rusqlite::params![status, limit], map)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, callable_ref, status, modified FROM tasks \
                     ORDER BY modified DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map(rusqlite::params![limit], map)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(rows)
    }
}

impl QueueAdmin for Database {
    fn queue_enqueue(&self, id: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE tasks SET status = ?2, output = NULL, error = NULL, log = NULL, \
             worker_pid = NULL, modified = ?3 \
             WHERE id = ?1 AND status IN (?4, ?5, ?6)",
            rusqlite::params![
                id,
                TaskStatus::Queued,
                now_timestamp(),
                TaskStatus::Completed,
                TaskStatus::Failed,
                TaskStatus::Cancelled
            ],
        )?;
        Ok(affected > 0)
    }

    fn queue_counts(&self) -> Result<StatusCounts> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM tasks GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, TaskStatus>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let (status, count) = row?;
            counts.add(status, count);
        }
        Ok(counts)
    }
}
