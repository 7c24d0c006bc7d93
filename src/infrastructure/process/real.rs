use std::io;

use super::{ProbeResult, ProcessProbe};

/// libc signal로 실제 프로세스를 조작하는 구현체
pub struct RealProcessProbe;

impl ProcessProbe for RealProcessProbe {
    fn probe(&self, pid: u32) -> ProbeResult {
        let Ok(pid) = i32::try_from(pid) else {
            return ProbeResult::Gone;
        };
        // SAFETY: signal 0은 권한/존재 확인만 하고 아무것도 보내지 않는다
        if unsafe { libc::kill(pid, 0) } == 0 {
            return ProbeResult::Alive;
        }
        match io::Error::last_os_error().raw_os_error() {
            Some(libc::EPERM) => ProbeResult::AliveOtherOwner,
            _ => ProbeResult::Gone,
        }
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        let pid = i32::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        // SAFETY: 유효 범위의 pid에 SIGTERM 전송
        if unsafe { libc::kill(pid, libc::SIGTERM) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}
