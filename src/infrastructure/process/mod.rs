pub mod mock;
pub mod real;

use std::io;

pub use real::RealProcessProbe;

/// pid 생존 확인 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// signal 0 전송 성공
    Alive,
    /// pid는 존재하지만 다른 사용자 소유 (EPERM) — 살아있는 것으로 간주
    AliveOtherOwner,
    /// 해당 pid의 프로세스 없음 (ESRCH)
    Gone,
}

/// OS 프로세스 조작 추상화
pub trait ProcessProbe: Send + Sync {
    /// `kill(pid, 0)`
    fn probe(&self, pid: u32) -> ProbeResult;

    /// `kill(pid, SIGTERM)` — 협조적 종료 요청
    fn terminate(&self, pid: u32) -> io::Result<()>;
}
