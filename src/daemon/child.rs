use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::{Child, Command};

/// `taskq execute`로 띄운 child와 그 diagnostic stream의 read end
pub struct SpawnedChild {
    pub child: Child,
    pub pid: u32,
    pub log_reader: File,
}

/// 단방향 익명 pipe: (read, write).
///
/// read end는 close-on-exec, write end는 상속 가능 — child만 write end를 물려받는다.
fn diagnostic_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0; 2];
    // SAFETY: fds는 길이 2의 유효한 버퍼
    if unsafe { libc::pipe(fds.as_mut_ptr()) } == -1 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: pipe()가 방금 연 fd이며 소유권을 여기서 가져간다
    let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

    // SAFETY: read는 유효한 fd
    if unsafe { libc::fcntl(read.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok((read, write))
}

/// `<program> --db <db_path> execute <task_id> --log-fd <fd>` 실행.
///
/// 부모의 write end는 spawn 직후 닫히므로 child가 끝나면 read end가 EOF를 본다.
pub fn spawn_executor(program: &Path, db_path: &Path, task_id: &str) -> Result<SpawnedChild> {
    let (read, write) = diagnostic_pipe().context("failed to create diagnostic pipe")?;

    let child = Command::new(program)
        .arg("--db")
        .arg(db_path)
        .arg("execute")
        .arg(task_id)
        .arg("--log-fd")
        .arg(write.as_raw_fd().to_string())
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn {}", program.display()))?;
    drop(write);

    let pid = child
        .id()
        .context("spawned worker subprocess has no pid")?;

    Ok(SpawnedChild {
        child,
        pid,
        log_reader: File::from(read),
    })
}
