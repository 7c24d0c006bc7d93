use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd, RawFd};

const STDOUT_FD: RawFd = 1;
const STDERR_FD: RawFd = 2;

/// 프로세스의 stdout/stderr를 `sink`로 돌리는 scope guard.
///
/// fd 수준(`dup2`)으로 교체하므로 `println!`, `io::stderr()`, tracing 출력이 모두
/// sink로 간다. Drop 시점에 원래 fd를 복구한다 — 에러/panic 경로 포함.
pub struct StdioRedirect {
    saved_stdout: OwnedFd,
    saved_stderr: OwnedFd,
    sink: File,
}

impl StdioRedirect {
    pub fn install(sink: File) -> io::Result<Self> {
        flush_std();

        // SAFETY: 1/2는 프로세스 수명 동안 열려 있는 표준 fd
        let saved_stdout = unsafe { BorrowedFd::borrow_raw(STDOUT_FD) }.try_clone_to_owned()?;
        let saved_stderr = unsafe { BorrowedFd::borrow_raw(STDERR_FD) }.try_clone_to_owned()?;

        dup2(sink.as_raw_fd(), STDOUT_FD)?;
        dup2(sink.as_raw_fd(), STDERR_FD)?;

        Ok(Self {
            saved_stdout,
            saved_stderr,
            sink,
        })
    }
}

impl Drop for StdioRedirect {
    fn drop(&mut self) {
        flush_std();
        let _ = self.sink.flush();
        if let Err(e) = dup2(self.saved_stdout.as_raw_fd(), STDOUT_FD) {
            tracing::warn!("failed to restore stdout: {e}");
        }
        if let Err(e) = dup2(self.saved_stderr.as_raw_fd(), STDERR_FD) {
            tracing::warn!("failed to restore stderr: {e}");
        }
    }
}

fn flush_std() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}

fn dup2(src: RawFd, dst: RawFd) -> io::Result<()> {
    // SAFETY: 두 fd 모두 호출 시점에 유효하다. dup2는 dst를 원자적으로 교체한다.
    if unsafe { libc::dup2(src, dst) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
