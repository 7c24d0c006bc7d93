//! `callable_ref` → 실행 가능한 handler 매핑.
//!
//! 애플리케이션이 시작 시 채우고 Executor에 명시적으로 넘긴다.
//! 해석은 task 생성 시점이 아니라 실행 시점에 일어난다.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::error::ExecutionError;

/// callable에 전달되는 keyword arguments (JSON object)
pub type Arguments = serde_json::Map<String, serde_json::Value>;

/// sequence callable이 반환하는 lazy fragment 스트림
pub type FragmentIter = Box<dyn Iterator<Item = Result<String>>>;

type SingleFn = dyn Fn(&Arguments) -> Result<String> + Send + Sync;
type SequenceFn = dyn Fn(&Arguments) -> Result<FragmentIter> + Send + Sync;

pub enum Callable {
    /// 한 번 호출, 반환값이 그대로 output
    Single(Box<SingleFn>),
    /// fragment를 순서대로 yield, output에 누적
    Sequence(Box<SequenceFn>),
}

#[derive(Default)]
pub struct Registry {
    callables: BTreeMap<String, Callable>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&Arguments) -> Result<String> + Send + Sync + 'static,
    {
        self.callables
            .insert(name.to_string(), Callable::Single(Box::new(f)));
        self
    }

    pub fn register_sequence<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&Arguments) -> Result<FragmentIter> + Send + Sync + 'static,
    {
        self.callables
            .insert(name.to_string(), Callable::Sequence(Box::new(f)));
        self
    }

    pub fn resolve(&self, name: &str) -> Result<&Callable, ExecutionError> {
        self.callables
            .get(name)
            .ok_or_else(|| ExecutionError::Resolution(name.to_string()))
    }
}

pub fn json_type_name(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;

    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
