use anyhow::Result;
use rusqlite::Connection;

pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS tasks (
            id              TEXT PRIMARY KEY,
            created         TEXT NOT NULL,
            modified        TEXT NOT NULL,
            callable_ref    TEXT NOT NULL,
            arguments       TEXT NOT NULL DEFAULT '{}',
            status          TEXT NOT NULL DEFAULT 'queued',
            output          TEXT,
            error           TEXT,
            worker_pid      INTEGER,
            log             TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_status_modified ON tasks(status, modified);
        ",
    )?;

    Ok(())
}
