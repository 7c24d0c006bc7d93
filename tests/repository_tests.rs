use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Barrier};

use taskq::queue::models::*;
use taskq::queue::repository::*;
use taskq::queue::Database;

// ─── Helpers ───

fn open_memory_db() -> Database {
    let db = Database::open(Path::new(":memory:")).expect("open in-memory db");
    db.initialize().expect("initialize schema");
    db
}

fn insert(db: &Database, callable_ref: &str) -> String {
    db.task_insert(&NewTask {
        callable_ref: callable_ref.into(),
        arguments: "{}".into(),
    })
    .expect("insert task")
}

fn set_status(db: &Database, id: &str, status: TaskStatus) {
    db.task_update(
        id,
        &TaskUpdate {
            status: Some(status),
            ..Default::default()
        },
    )
    .unwrap();
}

// ═══════════════════════════════════════════════
// 1. insert / get / update
// ═══════════════════════════════════════════════

#[test]
fn insert_creates_queued_task() {
    let db = open_memory_db();
    let id = insert(&db, "app.hello");

    let task = db.task_get(&id).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Queued);
    assert_eq!(task.callable_ref, "app.hello");
    assert_eq!(task.arguments, "{}");
    assert_eq!(task.created, task.modified);
    assert!(task.output.is_none());
    assert!(task.error.is_none());
    assert!(task.worker_pid.is_none());
    assert!(task.log.is_none());
}

#[test]
fn get_missing_returns_none() {
    let db = open_memory_db();
    assert!(db.task_get("nope").unwrap().is_none());
}

#[test]
fn update_is_partial_and_bumps_modified() {
    let db = open_memory_db();
    let id = insert(&db, "app.hello");
    let before = db.task_get(&id).unwrap().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(2));

    db.task_update(
        &id,
        &TaskUpdate {
            output: Some("partial".into()),
            ..Default::default()
        },
    )
    .unwrap();

    let after = db.task_get(&id).unwrap().unwrap();
    assert_eq!(after.output.as_deref(), Some("partial"));
    assert_eq!(after.status, TaskStatus::Queued);
    assert!(after.modified > before.modified);
    assert_eq!(after.created, before.created);
}

#[test]
fn update_can_set_and_clear_nullable_fields() {
    let db = open_memory_db();
    let id = insert(&db, "app.hello");

    db.task_update(
        &id,
        &TaskUpdate {
            worker_pid: Some(Some(4242)),
            log: Some(Some("diag".into())),
            ..Default::default()
        },
    )
    .unwrap();
    let task = db.task_get(&id).unwrap().unwrap();
    assert_eq!(task.worker_pid, Some(4242));
    assert_eq!(task.log.as_deref(), Some("diag"));

    db.task_update(
        &id,
        &TaskUpdate {
            worker_pid: Some(None),
            log: Some(None),
            ..Default::default()
        },
    )
    .unwrap();
    let task = db.task_get(&id).unwrap().unwrap();
    assert_eq!(task.worker_pid, None);
    assert_eq!(task.log, None);
}

// ═══════════════════════════════════════════════
// 2. claim
// ═══════════════════════════════════════════════

#[test]
fn claim_returns_none_when_empty() {
    let db = open_memory_db();
    assert_eq!(db.task_claim_next(1).unwrap(), None);
}

#[test]
fn claim_is_fifo_by_modified() {
    let db = open_memory_db();
    let a = insert(&db, "app.a");
    let b = insert(&db, "app.b");
    let c = insert(&db, "app.c");

    assert_eq!(db.task_claim_next(10).unwrap().as_deref(), Some(a.as_str()));
    assert_eq!(db.task_claim_next(10).unwrap().as_deref(), Some(b.as_str()));
    assert_eq!(db.task_claim_next(10).unwrap().as_deref(), Some(c.as_str()));
    assert_eq!(db.task_claim_next(10).unwrap(), None);
}

#[test]
fn claim_stamps_pid_and_status() {
    let db = open_memory_db();
    let id = insert(&db, "app.a");

    db.task_claim_next(777).unwrap();
    let task = db.task_get(&id).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::InProgress);
    assert_eq!(task.worker_pid, Some(777));
}

#[test]
fn claim_skips_non_queued() {
    let db = open_memory_db();
    let done = insert(&db, "app.done");
    set_status(&db, &done, TaskStatus::Completed);
    let cancelled = insert(&db, "app.cancelled");
    set_status(&db, &cancelled, TaskStatus::Cancelled);
    let queued = insert(&db, "app.queued");

    assert_eq!(db.task_claim_next(1).unwrap(), Some(queued));
    assert_eq!(db.task_claim_next(1).unwrap(), None);
}

#[test]
fn concurrent_claims_never_duplicate() {
    const TASKS: usize = 40;
    const WORKERS: usize = 4;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("claim.db");
    let seed = Database::open(&path).unwrap();
    seed.initialize().unwrap();
    let mut expected = HashSet::new();
    for i in 0..TASKS {
        expected.insert(insert(&seed, &format!("app.t{i}")));
    }

    let barrier = Arc::new(Barrier::new(WORKERS));
    let handles: Vec<_> = (0..WORKERS)
        .map(|w| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let db = Database::open(&path).unwrap();
                barrier.wait();
                let mut claimed = Vec::new();
                while let Some(id) = db.task_claim_next(1000 + w as u32).unwrap() {
                    claimed.push(id);
                }
                claimed
            })
        })
        .collect();

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in handles {
        for id in handle.join().unwrap() {
            total += 1;
            assert!(seen.insert(id), "task claimed twice");
        }
    }
    assert_eq!(total, TASKS);
    assert_eq!(seen, expected);
}

#[test]
fn set_worker_pid_only_while_in_progress() {
    let db = open_memory_db();
    let running = insert(&db, "app.a");
    db.task_claim_next(100).unwrap();
    assert!(db.task_set_worker_pid(&running, 200).unwrap());
    assert_eq!(db.task_get(&running).unwrap().unwrap().worker_pid, Some(200));

    // child가 먼저 끝난 경우: 종료 상태 row에는 pid가 남지 않는다
    let done = insert(&db, "app.b");
    set_status(&db, &done, TaskStatus::Completed);
    assert!(!db.task_set_worker_pid(&done, 300).unwrap());
    let task = db.task_get(&done).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.worker_pid.is_none());

    let queued = insert(&db, "app.c");
    assert!(!db.task_set_worker_pid(&queued, 400).unwrap());
    assert!(!db.task_set_worker_pid("missing", 500).unwrap());
}

#[test]
fn scan_runs_inside_write_lock() {
    let db = open_memory_db();
    insert(&db, "app.a");
    db.task_claim_next(42).unwrap();

    let scanned = db
        .with_write_lock(|| db.task_scan_in_progress_with_pid())
        .unwrap();
    assert_eq!(scanned.len(), 1);
    assert_eq!(scanned[0].worker_pid, Some(42));
}

// ═══════════════════════════════════════════════
// 3. scan / guarded fail
// ═══════════════════════════════════════════════

#[test]
fn scan_returns_in_progress_with_pid_only() {
    let db = open_memory_db();
    let claimed = insert(&db, "app.a");
    db.task_claim_next(55).unwrap();

    let no_pid = insert(&db, "app.b");
    set_status(&db, &no_pid, TaskStatus::InProgress);
    insert(&db, "app.c");

    let scanned = db.task_scan_in_progress_with_pid().unwrap();
    assert_eq!(scanned.len(), 1);
    assert_eq!(scanned[0].id, claimed);
    assert_eq!(scanned[0].worker_pid, Some(55));
}

#[test]
fn fail_if_in_progress_appends_and_is_idempotent() {
    let db = open_memory_db();
    let id = insert(&db, "app.a");
    db.task_claim_next(9).unwrap();
    db.task_update(
        &id,
        &TaskUpdate {
            output: Some("half".into()),
            error: Some("earlier".into()),
            ..Default::default()
        },
    )
    .unwrap();

    assert!(db.task_fail_if_in_progress(&id, "first").unwrap());
    assert!(!db.task_fail_if_in_progress(&id, "second").unwrap());

    let task = db.task_get(&id).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some("earlier\nfirst"));
    assert_eq!(task.output.as_deref(), Some("half"));
    assert_eq!(task.worker_pid, None);
}

#[test]
fn fail_if_in_progress_ignores_queued_and_completed() {
    let db = open_memory_db();
    let queued = insert(&db, "app.a");
    let done = insert(&db, "app.b");
    set_status(&db, &done, TaskStatus::Completed);

    assert!(!db.task_fail_if_in_progress(&queued, "x").unwrap());
    assert!(!db.task_fail_if_in_progress(&done, "x").unwrap());
    assert_eq!(
        db.task_get(&done).unwrap().unwrap().status,
        TaskStatus::Completed
    );
}

// ═══════════════════════════════════════════════
// 4. list / admin
// ═══════════════════════════════════════════════

#[test]
fn list_filters_and_limits() {
    let db = open_memory_db();
    for i in 0..5 {
        insert(&db, &format!("app.q{i}"));
    }
    let done = insert(&db, "app.done");
    set_status(&db, &done, TaskStatus::Completed);

    assert_eq!(db.task_list(None, 100).unwrap().len(), 6);
    assert_eq!(db.task_list(None, 2).unwrap().len(), 2);

    let completed = db.task_list(Some(TaskStatus::Completed), 100).unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, done);

    // 최근 수정 순
    assert_eq!(db.task_list(None, 1).unwrap()[0].id, done);
}

#[test]
fn enqueue_resets_terminal_task() {
    let db = open_memory_db();
    let id = insert(&db, "app.a");
    db.task_claim_next(3).unwrap();
    db.task_update(
        &id,
        &TaskUpdate {
            output: Some("out".into()),
            log: Some(Some("log".into())),
            ..Default::default()
        },
    )
    .unwrap();
    db.task_fail_if_in_progress(&id, "boom").unwrap();

    assert!(db.queue_enqueue(&id).unwrap());
    let task = db.task_get(&id).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Queued);
    assert!(task.output.is_none());
    assert!(task.error.is_none());
    assert!(task.log.is_none());
    assert!(task.worker_pid.is_none());

    assert_eq!(db.task_claim_next(4).unwrap(), Some(id));
}

#[test]
fn enqueue_refuses_active_tasks() {
    let db = open_memory_db();
    let queued = insert(&db, "app.a");
    let running = insert(&db, "app.b");
    set_status(&db, &running, TaskStatus::InProgress);

    assert!(!db.queue_enqueue(&queued).unwrap());
    assert!(!db.queue_enqueue(&running).unwrap());
    assert!(!db.queue_enqueue("missing").unwrap());
}

#[test]
fn counts_by_status() {
    let db = open_memory_db();
    insert(&db, "app.a");
    insert(&db, "app.b");
    let c = insert(&db, "app.c");
    set_status(&db, &c, TaskStatus::Failed);
    let d = insert(&db, "app.d");
    set_status(&db, &d, TaskStatus::Cancelled);

    let counts = db.queue_counts().unwrap();
    assert_eq!(counts.queued, 2);
    assert_eq!(counts.in_progress, 0);
    assert_eq!(counts.completed, 0);
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.cancelled, 1);
}
