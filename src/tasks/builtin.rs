use std::time::Duration;

use anyhow::{anyhow, bail, Result};

use crate::registry::{Arguments, FragmentIter};

fn arg_str<'a>(args: &'a Arguments, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("missing string argument '{key}'"))
}

fn arg_u64(args: &Arguments, key: &str, default: u64) -> Result<u64> {
    match args.get(key) {
        None => Ok(default),
        Some(v) => v
            .as_u64()
            .ok_or_else(|| anyhow!("argument '{key}' should be a non-negative integer")),
    }
}

/// `message` 인자를 그대로 반환 (없으면 빈 문자열)
pub fn echo(args: &Arguments) -> Result<String> {
    match args.get("message") {
        None => Ok(String::new()),
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
    }
}

pub fn sleep(args: &Arguments) -> Result<String> {
    let secs = match args.get("seconds") {
        None => 1.0,
        Some(v) => v
            .as_f64()
            .filter(|s| s.is_finite() && *s >= 0.0)
            .ok_or_else(|| anyhow!("argument 'seconds' should be a non-negative number"))?,
    };
    std::thread::sleep(Duration::from_secs_f64(secs));
    Ok("slept".into())
}

/// `"0\n"`, `"1\n"`, … `n`개 fragment
pub fn count(args: &Arguments) -> Result<FragmentIter> {
    let n = arg_u64(args, "n", 3)?;
    let delay = Duration::from_millis(arg_u64(args, "delay_ms", 0)?);
    Ok(Box::new((0..n).map(move |i| {
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        Ok::<_, anyhow::Error>(format!("{i}\n"))
    })))
}

pub fn fail(args: &Arguments) -> Result<String> {
    let message = arg_str(args, "message").unwrap_or("builtin.fail was called");
    bail!("{message}")
}

/// 프로세스를 `code`로 즉시 종료 — Executor가 종료 상태를 기록하지 못하는 경로
pub fn exit(args: &Arguments) -> Result<String> {
    let code = args.get("code").and_then(|v| v.as_i64()).unwrap_or(1);
    let code = i32::try_from(code).map_err(|_| anyhow!("exit code out of range: {code}"))?;
    std::process::exit(code)
}

/// stdout/stderr/tracing 각각에 한 줄씩 쓴다
pub fn log(args: &Arguments) -> Result<String> {
    let message = arg_str(args, "message").unwrap_or("hello from builtin.log");
    println!("stdout: {message}");
    eprintln!("stderr: {message}");
    tracing::info!("tracing: {message}");
    Ok("logged".into())
}
