//! 단일 task 실행기.
//!
//! 보통 Dispatcher가 띄운 child 프로세스(`taskq execute`) 안에서 호출된다.
//! `status`/`output`/`error`만 쓰고, `worker_pid`/`log`는 Dispatcher 몫이다.

pub mod redirect;

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as StdError;
use std::fs::File;
use std::panic::{self, AssertUnwindSafe};

use anyhow::Result;
use tracing::info;

use crate::error::{ExecutionError, QueueError};
use crate::events::{EventBus, TaskEvent};
use crate::queue::models::{Task, TaskStatus, TaskUpdate};
use crate::queue::repository::TaskRepository;
use crate::queue::Database;
use crate::registry::{json_type_name, Arguments, Callable, Registry};

use self::redirect::StdioRedirect;

pub const DEFAULT_MAX_OUTPUT_SIZE: usize = 10 * 1024 * 1024;

pub struct Executor<'a> {
    db: &'a Database,
    registry: &'a Registry,
    events: &'a EventBus,
    max_output_size: usize,
}

impl<'a> Executor<'a> {
    pub fn new(db: &'a Database, registry: &'a Registry, events: &'a EventBus) -> Self {
        Self {
            db,
            registry,
            events,
            max_output_size: DEFAULT_MAX_OUTPUT_SIZE,
        }
    }

    pub fn with_max_output_size(mut self, limit: usize) -> Self {
        self.max_output_size = limit;
        self
    }

    /// task를 실행하고 종료 상태를 기록한다.
    ///
    /// callable의 실패는 task의 FAILED로 기록되며 여기서 `Err`로 올라오지 않는다.
    /// `Err`는 store 접근 실패나 task 부재 같은 인프라 오류뿐이다.
    /// `sink`가 주어지면 실행 동안 stdout/stderr가 그쪽으로 간다.
    pub fn execute(&self, task_id: &str, sink: Option<File>) -> Result<()> {
        let _redirect = match sink {
            Some(file) => Some(StdioRedirect::install(file)?),
            None => None,
        };

        let mut task = self
            .db
            .task_get(task_id)?
            .ok_or_else(|| QueueError::TaskNotFound(task_id.to_string()))?;
        info!("initiating task id: {task_id}");

        // claim과 dispatch 사이에 취소/종료된 task는 건드리지 않는다
        if !task.status.is_runnable() {
            info!("task {task_id} is {}, skipping", task.status);
            return Ok(());
        }

        self.events.emit(&TaskEvent::BeforeExecution { task: &task });

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run(&mut task)))
            .unwrap_or_else(|payload| Err(ExecutionError::Panicked(panic_message(&*payload)).into()));

        match result {
            Ok(()) => {
                task.status = TaskStatus::Completed;
                self.db.task_update(
                    task_id,
                    &TaskUpdate {
                        status: Some(TaskStatus::Completed),
                        ..Default::default()
                    },
                )?;
                self.events.emit(&TaskEvent::OnSuccess { task: &task });
            }
            Err(err) => {
                let rendered = render_failure(&err);
                task.status = TaskStatus::Failed;
                task.error = Some(rendered.clone());
                self.db.task_update(
                    task_id,
                    &TaskUpdate {
                        status: Some(TaskStatus::Failed),
                        error: Some(rendered),
                        ..Default::default()
                    },
                )?;
                let cause: &(dyn StdError + Send + Sync + 'static) = err.as_ref();
                self.events.emit(&TaskEvent::OnFailure {
                    task: &task,
                    error: Some(cause),
                });
            }
        }

        info!("finished task id: {task_id}");
        Ok(())
    }

    fn run(&self, task: &mut Task) -> Result<()> {
        let callable = self.registry.resolve(&task.callable_ref)?;
        let args = parse_arguments(&task.arguments)?;

        // 파싱 실패 시 output은 NULL로 남고, 여기서부터는 최소 ""가 보장된다
        task.output = Some(String::new());
        self.persist_output(task)?;

        match callable {
            Callable::Single(f) => {
                let output = f(&args)?;
                self.check_output_size(output.len())?;
                task.output = Some(output);
                self.persist_output(task)?;
            }
            Callable::Sequence(f) => {
                let fragments = f(&args)?;
                for (index, fragment) in fragments.enumerate() {
                    let fragment = fragment?;
                    self.events
                        .emit(&TaskEvent::BeforeIteration { task: &*task, index });

                    let current = task.output.get_or_insert_with(String::new);
                    self.check_output_size(current.len() + fragment.len())?;
                    current.push_str(&fragment);
                    self.persist_output(task)?;

                    self.events.emit(&TaskEvent::AfterIteration {
                        task: &*task,
                        fragment: &fragment,
                        index,
                    });
                }
            }
        }
        Ok(())
    }

    fn persist_output(&self, task: &Task) -> Result<()> {
        self.db.task_update(
            &task.id,
            &TaskUpdate {
                output: task.output.clone(),
                ..Default::default()
            },
        )
    }

    fn check_output_size(&self, len: usize) -> Result<(), ExecutionError> {
        if len > self.max_output_size {
            return Err(ExecutionError::OutputTooLarge {
                limit: self.max_output_size,
            });
        }
        Ok(())
    }
}

fn parse_arguments(raw: &str) -> Result<Arguments, ExecutionError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| ExecutionError::MalformedArguments(e.to_string()))?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(ExecutionError::MalformedArguments(format!(
            "expected a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

/// `{debug repr}: {display chain}` + 빈 줄 + `Stack backtrace:` + trace
pub fn render_failure(err: &anyhow::Error) -> String {
    let head = err
        .chain()
        .next()
        .map(|e| format!("{e:?}"))
        .unwrap_or_default();
    let backtrace = match err.backtrace().status() {
        BacktraceStatus::Captured => err.backtrace().to_string(),
        _ => Backtrace::force_capture().to_string(),
    };
    format!("{head}: {err:#}\n\nStack backtrace:\n{backtrace}")
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
