use std::time::Duration;

use serde::{Deserialize, Serialize};

/// taskq.yaml 전체 스키마
/// 글로벌(~/.taskq.yaml) + `$TASKQ_HOME/taskq.yaml`을 딥머지하여 최종 설정 생성
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct TaskqConfig {
    pub worker: WorkerConfig,
    pub tasks: TasksConfig,
    pub daemon: DaemonConfig,
}

/// Dispatcher 루프 설정
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    pub poll_min_secs: f64,
    pub poll_max_secs: f64,
    /// 0 이하면 timeout 없음
    pub task_timeout_secs: i64,
    pub terminate_grace_secs: u64,
    pub log_drain_grace_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_min_secs: 3.0,
            poll_max_secs: 9.0,
            task_timeout_secs: 3600,
            terminate_grace_secs: 5,
            log_drain_grace_secs: 5,
        }
    }
}

impl WorkerConfig {
    pub fn task_timeout(&self) -> Option<Duration> {
        u64::try_from(self.task_timeout_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// (min, max) — 음수/NaN은 0으로, min > max면 max를 min으로 맞춘다
    pub fn poll_range(&self) -> (Duration, Duration) {
        let clamp = |secs: f64| {
            if secs.is_finite() && secs > 0.0 {
                Duration::from_secs_f64(secs)
            } else {
                Duration::ZERO
            }
        };
        let min = clamp(self.poll_min_secs);
        let max = clamp(self.poll_max_secs).max(min);
        (min, max)
    }
}

/// task 생성/실행 정책
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TasksConfig {
    /// None = 모든 callable 허용, Some(빈 목록) = 전부 거부
    pub allowed: Option<Vec<String>>,
    pub max_args_size: usize,
    pub max_output_size: usize,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            allowed: None,
            max_args_size: 1024 * 1024,
            max_output_size: 10 * 1024 * 1024,
        }
    }
}

impl TasksConfig {
    pub fn is_allowed(&self, callable_ref: &str) -> bool {
        self.allowed
            .as_ref()
            .map_or(true, |list| list.iter().any(|name| name == callable_ref))
    }
}

/// worker 로그 파일 설정
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// 상대 경로면 TASKQ_HOME 기준
    pub log_dir: String,
    pub log_retention_days: u32,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".into(),
            log_retention_days: 30,
        }
    }
}
