use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{info, warn};

/// tracing-appender daily rolling 파일 prefix (`worker.YYYY-MM-DD.log`)
pub const LOG_PREFIX: &str = "worker";

/// `log_dir`에서 retention_days보다 오래된 worker 로그를 지우고 삭제 건수를 반환한다.
pub fn cleanup_old_logs(log_dir: &Path, retention_days: u32) -> usize {
    let today = chrono::Local::now().date_naive();
    let mut deleted = 0;
    for path in expired_logs(log_dir, retention_days, today) {
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!("deleted old log: {}", path.display());
                deleted += 1;
            }
            Err(e) => warn!("failed to delete {}: {e}", path.display()),
        }
    }
    deleted
}

/// cutoff(today - retention_days)보다 이전 날짜의 로그 파일 목록
fn expired_logs(log_dir: &Path, retention_days: u32, today: NaiveDate) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(log_dir) else {
        return Vec::new();
    };
    let cutoff = today - chrono::Duration::days(i64::from(retention_days));

    let mut expired: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| {
            let name = entry.file_name();
            log_date(&name.to_string_lossy()).is_some_and(|date| date < cutoff)
        })
        .map(|entry| entry.path())
        .collect();
    expired.sort();
    expired
}

/// "worker.2026-02-20.log" → 2026-02-20
fn log_date(filename: &str) -> Option<NaiveDate> {
    let date = filename
        .strip_prefix(LOG_PREFIX)?
        .strip_prefix('.')?
        .strip_suffix(".log")?;
    if date.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}
