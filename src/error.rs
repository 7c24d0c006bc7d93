use thiserror::Error;

/// 단일 task 실행 중 발생하는 실패. 항상 task의 `error`에 기록되고 FAILED로 끝난다.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("callable '{0}' is not registered")]
    Resolution(String),

    #[error("malformed arguments: {0}")]
    MalformedArguments(String),

    #[error("output exceeded the {limit} byte limit")]
    OutputTooLarge { limit: usize },

    #[error("callable panicked: {0}")]
    Panicked(String),
}

/// 생성 시점 거부 — 호출자에게 동기적으로 반환되며 task로 저장되지 않는다.
#[derive(Debug, Error)]
pub enum CreateError {
    #[error("arguments should be a JSON object, got {0}")]
    ArgumentType(&'static str),

    #[error("task '{0}' is not in the allowed list; add it to tasks.allowed in taskq.yaml")]
    NotAllowed(String),

    #[error("arguments are {size} bytes, exceeding the {max} byte limit")]
    ArgumentsTooLarge { size: usize, max: usize },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Dispatcher/Monitor가 관측한 child 프로세스 수준의 실패
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SupervisionError {
    #[error("task exceeded {0}s timeout")]
    Timeout(u64),

    #[error("worker subprocess exited with code {0}")]
    ExitCode(i32),

    #[error("worker subprocess terminated by signal {0}")]
    Signal(i32),
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("task not found: {0}")]
    TaskNotFound(String),
}
