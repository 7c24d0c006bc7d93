pub mod models;
pub mod repository;
pub mod schema;

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// 동시 claim 시 lock 대기 상한. 초과하면 SQLITE_BUSY로 실패한다.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    pub fn initialize(&self) -> Result<()> {
        schema::create_tables(&self.conn)
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// store 전역 write lock(`BEGIN IMMEDIATE`) 안에서 `f`를 실행한다.
    ///
    /// SQLite에는 row 단위 lock-skip(`SKIP LOCKED`)이 없으므로 blocking 획득으로 대신한다.
    /// 다른 connection이 lock을 잡고 있으면 busy timeout까지 대기한다.
    /// `f`가 에러를 반환하면 트랜잭션은 rollback된다.
    pub fn with_write_lock<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let out = f()?;
        tx.commit()?;
        Ok(out)
    }
}

/// 고정 폭 RFC 3339 (UTC, microseconds) — 문자열 정렬 = 시간 정렬
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
