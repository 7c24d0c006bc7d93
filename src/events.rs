//! Task 생명주기 이벤트 버스.
//!
//! 이벤트 종류별로 subscriber를 등록 순서대로 보관하고, 발생 시 같은 스레드에서
//! 동기적으로 호출한다. 전역 registry는 없고 Executor/Monitor에 명시적으로 주입한다.

use std::collections::HashMap;
use std::error::Error as StdError;

use crate::queue::models::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BeforeExecution,
    OnSuccess,
    OnFailure,
    BeforeIteration,
    AfterIteration,
}

pub type FailureCause<'a> = Option<&'a (dyn StdError + Send + Sync + 'static)>;

pub enum TaskEvent<'a> {
    BeforeExecution {
        task: &'a Task,
    },
    OnSuccess {
        task: &'a Task,
    },
    /// orphan 감지처럼 원인 객체를 관측할 수 없으면 `error`는 None
    OnFailure {
        task: &'a Task,
        error: FailureCause<'a>,
    },
    BeforeIteration {
        task: &'a Task,
        index: usize,
    },
    AfterIteration {
        task: &'a Task,
        fragment: &'a str,
        index: usize,
    },
}

impl TaskEvent<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            TaskEvent::BeforeExecution { .. } => EventKind::BeforeExecution,
            TaskEvent::OnSuccess { .. } => EventKind::OnSuccess,
            TaskEvent::OnFailure { .. } => EventKind::OnFailure,
            TaskEvent::BeforeIteration { .. } => EventKind::BeforeIteration,
            TaskEvent::AfterIteration { .. } => EventKind::AfterIteration,
        }
    }

    pub fn task(&self) -> &Task {
        match self {
            TaskEvent::BeforeExecution { task }
            | TaskEvent::OnSuccess { task }
            | TaskEvent::OnFailure { task, .. }
            | TaskEvent::BeforeIteration { task, .. }
            | TaskEvent::AfterIteration { task, .. } => task,
        }
    }
}

pub type Subscriber = Box<dyn Fn(&TaskEvent<'_>) + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    subscribers: HashMap<EventKind, Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, kind: EventKind, f: F) -> &mut Self
    where
        F: Fn(&TaskEvent<'_>) + Send + Sync + 'static,
    {
        self.subscribers.entry(kind).or_default().push(Box::new(f));
        self
    }

    pub fn emit(&self, event: &TaskEvent<'_>) {
        if let Some(subs) = self.subscribers.get(&event.kind()) {
            for sub in subs {
                sub(event);
            }
        }
    }
}

/// 모든 이벤트를 tracing으로 남기는 subscriber 등록
pub fn install_tracing_subscribers(bus: &mut EventBus) {
    bus.subscribe(EventKind::BeforeExecution, |e| {
        let task = e.task();
        tracing::info!("task {} starting ({})", task.id, task.callable_ref);
    })
    .subscribe(EventKind::OnSuccess, |e| {
        tracing::info!("task {} completed", e.task().id);
    })
    .subscribe(EventKind::OnFailure, |e| {
        if let TaskEvent::OnFailure { task, error } = e {
            match error {
                Some(err) => tracing::warn!("task {} failed: {err}", task.id),
                None => tracing::warn!("task {} failed", task.id),
            }
        }
    })
    .subscribe(EventKind::AfterIteration, |e| {
        if let TaskEvent::AfterIteration { task, index, .. } = e {
            tracing::debug!("task {} iteration {index} done", task.id);
        }
    });
}
