//! Dispatcher — claim → spawn → wait(timeout) → 로그 수집 → reconcile 루프.
//!
//! 여러 Dispatcher 프로세스가 같은 DB를 polling해도 claim lock 외의 공유 상태는 없다.
//! task 실행은 항상 별도 child 프로세스(`taskq execute`)에서 일어난다.

pub mod child;
pub mod collector;
pub mod log;
pub mod monitor;

use std::fs::File;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::process::Child;
use tracing::{debug, error, info, warn};

use crate::config;
use crate::config::models::{TaskqConfig, WorkerConfig};
use crate::events::{self, EventBus};
use crate::infrastructure::process::{ProcessProbe, RealProcessProbe};
use crate::queue::models::TaskUpdate;
use crate::queue::repository::TaskRepository;
use crate::queue::Database;

use self::child::SpawnedChild;
use self::collector::LogCollector;
use self::monitor::{ChildExit, Monitor};

/// Dispatcher 실행 파라미터
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// child에게 `--db`로 넘길 경로
    pub db_path: PathBuf,
    /// `execute` 서브커맨드를 가진 실행 파일 (보통 current_exe)
    pub worker_program: PathBuf,
    pub poll_min: Duration,
    pub poll_max: Duration,
    pub task_timeout: Option<Duration>,
    pub terminate_grace: Duration,
    pub log_drain_grace: Duration,
}

impl DispatcherSettings {
    pub fn new(db_path: PathBuf, worker_program: PathBuf, cfg: &WorkerConfig) -> Self {
        let (poll_min, poll_max) = cfg.poll_range();
        Self {
            db_path,
            worker_program,
            poll_min,
            poll_max,
            task_timeout: cfg.task_timeout(),
            terminate_grace: Duration::from_secs(cfg.terminate_grace_secs),
            log_drain_grace: Duration::from_secs(cfg.log_drain_grace_secs),
        }
    }
}

/// `run_once` 한 번의 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Iteration {
    /// claim할 QUEUED task 없음
    Idle,
    Exited { task_id: String, exit: ChildExit },
    TimedOut { task_id: String },
    SpawnFailed { task_id: String },
}

pub struct Dispatcher {
    db: Database,
    events: EventBus,
    probe: Box<dyn ProcessProbe>,
    settings: DispatcherSettings,
}

impl Dispatcher {
    pub fn new(
        db: Database,
        events: EventBus,
        probe: Box<dyn ProcessProbe>,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            db,
            events,
            probe,
            settings,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    fn monitor(&self) -> Monitor<'_> {
        Monitor::new(&self.db, &self.events, &*self.probe)
    }

    /// poll 간격: [poll_min, poll_max] 균등 분포
    fn poll_delay(&self) -> Duration {
        rand::thread_rng().gen_range(self.settings.poll_min..=self.settings.poll_max)
    }

    /// SIGINT까지 sleep → `run_once` 반복
    pub async fn run(&self) -> Result<()> {
        self.run_until(tokio::signal::ctrl_c()).await
    }

    /// `shutdown`이 완료될 때까지 sleep → `run_once` 반복.
    /// 한 iteration의 실패는 로그만 남기고 계속한다.
    pub async fn run_until<F: Future>(&self, shutdown: F) -> Result<()> {
        tokio::pin!(shutdown);

        loop {
            let delay = self.poll_delay();
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(delay) => {}
            }
            tokio::select! {
                _ = &mut shutdown => break,
                result = self.run_once() => {
                    if let Err(e) = result {
                        error!("dispatcher iteration failed: {e:#}");
                    }
                }
            }
        }

        info!("shutdown requested, dispatcher stopping");
        Ok(())
    }

    /// CLAIMING → (SPAWNING → RUNNING → TIMED_OUT | EXITED) → RECONCILING 한 바퀴
    pub async fn run_once(&self) -> Result<Iteration> {
        let pid = std::process::id();
        match resident_memory_mb() {
            Some(mb) => debug!("[RAM Usage: {mb:.2} MB] dispatcher {pid} heartbeat"),
            None => debug!("dispatcher {pid} heartbeat"),
        }

        let outcome = match self.db.task_claim_next(pid)? {
            Some(task_id) => self.dispatch(task_id).await?,
            None => Iteration::Idle,
        };

        self.monitor().detect_orphans()?;
        Ok(outcome)
    }

    async fn dispatch(&self, task_id: String) -> Result<Iteration> {
        info!("claimed task {task_id}");

        let spawned = child::spawn_executor(
            &self.settings.worker_program,
            &self.settings.db_path,
            &task_id,
        );
        let SpawnedChild {
            mut child,
            pid,
            log_reader,
        } = match spawned {
            Ok(spawned) => spawned,
            Err(e) => {
                error!("task {task_id}: {e:#}");
                self.db.task_fail_if_in_progress(
                    &task_id,
                    &format!("Failed to start worker subprocess: {e:#}"),
                )?;
                return Ok(Iteration::SpawnFailed { task_id });
            }
        };

        match self.supervise(&task_id, &mut child, pid, log_reader).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!("task {task_id}: lost supervision of worker {pid}: {e:#}");
                self.abandon(&task_id, &mut child, pid, &e).await?;
                Err(e)
            }
        }
    }

    /// spawn 이후: pid 기록 → wait(timeout) → 로그 → exit/timeout 정리
    async fn supervise(
        &self,
        task_id: &str,
        child: &mut Child,
        pid: u32,
        log_reader: File,
    ) -> Result<Iteration> {
        let task_id = task_id.to_string();
        let collector = LogCollector::spawn(log_reader)?;
        if self.db.task_set_worker_pid(&task_id, pid)? {
            debug!("task {task_id} running in worker {pid}");
        } else {
            debug!("task {task_id} left in_progress before worker {pid} was recorded");
        }

        let waited = match self.settings.task_timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait()).await.ok(),
            None => Some(child.wait().await),
        };

        match waited {
            Some(status) => {
                let exit = match status {
                    Ok(status) => ChildExit::from_status(status),
                    Err(e) => {
                        warn!("failed to wait for worker {pid}: {e}");
                        ChildExit::Unknown
                    }
                };
                self.finalize_log(&task_id, collector).await?;
                self.monitor().handle_exit(&task_id, exit)?;
                Ok(Iteration::Exited { task_id, exit })
            }
            None => {
                let secs = self.settings.task_timeout.map_or(0, |d| d.as_secs());
                warn!("task {task_id} exceeded {secs}s timeout, terminating worker {pid}");
                self.terminate(child, pid).await;
                self.finalize_log(&task_id, collector).await?;
                self.monitor().handle_timeout(&task_id, secs)?;
                Ok(Iteration::TimedOut { task_id })
            }
        }
    }

    /// supervise 도중 에러: child를 죽이고 task를 FAILED로 정리한다.
    ///
    /// claim 시 찍힌 pid는 살아있는 이 Dispatcher의 것이라 orphan scan이 잡지 못한다.
    async fn abandon(
        &self,
        task_id: &str,
        child: &mut Child,
        pid: u32,
        cause: &anyhow::Error,
    ) -> Result<()> {
        if let Err(e) = child.kill().await {
            debug!("worker {pid} already gone: {e}");
        }
        self.db
            .task_fail_if_in_progress(task_id, &format!("Worker supervision failed: {cause:#}"))?;
        Ok(())
    }

    /// SIGTERM → grace 대기 → SIGKILL
    async fn terminate(&self, child: &mut Child, pid: u32) {
        if let Err(e) = self.probe.terminate(pid) {
            warn!("failed to send SIGTERM to worker {pid}: {e}");
        }
        if tokio::time::timeout(self.settings.terminate_grace, child.wait())
            .await
            .is_ok()
        {
            return;
        }
        warn!("worker {pid} still alive after SIGTERM, killing");
        if let Err(e) = child.kill().await {
            warn!("failed to kill worker {pid}: {e}");
        }
    }

    /// 수집된 diagnostic 출력을 `log`에 기록하고 `worker_pid`를 비운다 (성공/실패 무관)
    async fn finalize_log(&self, task_id: &str, collector: LogCollector) -> Result<()> {
        let bytes = collector.finish(self.settings.log_drain_grace).await;
        let log = (!bytes.is_empty()).then(|| String::from_utf8_lossy(&bytes).into_owned());
        self.db.task_update(
            task_id,
            &TaskUpdate {
                worker_pid: Some(None),
                log: Some(log),
                ..Default::default()
            },
        )
    }
}

/// 현재 프로세스의 resident memory (MB)
fn resident_memory_mb() -> Option<f64> {
    let pid = Pid::from_u32(std::process::id());
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]));
    sys.process(pid)
        .map(|process| process.memory() as f64 / (1024.0 * 1024.0))
}

// ─── Worker Entry Point ───

/// `taskq worker` — 포그라운드 Dispatcher 루프
pub async fn start(home: &Path, db_path: &Path, cfg: &TaskqConfig) -> Result<()> {
    let log_dir = config::resolve_log_dir(&cfg.daemon.log_dir, home);
    let n = log::cleanup_old_logs(&log_dir, cfg.daemon.log_retention_days);
    if n > 0 {
        info!("startup log cleanup: deleted {n} old log files");
    }

    let db = Database::open(db_path)?;
    db.initialize()?;

    let mut events = EventBus::new();
    events::install_tracing_subscribers(&mut events);

    let settings = DispatcherSettings::new(
        db_path.to_path_buf(),
        std::env::current_exe()?,
        &cfg.worker,
    );
    info!(
        "worker {} started (db: {}, timeout: {:?})",
        std::process::id(),
        db_path.display(),
        settings.task_timeout
    );

    let dispatcher = Dispatcher::new(db, events, Box::new(RealProcessProbe), settings);
    dispatcher.run().await
}
