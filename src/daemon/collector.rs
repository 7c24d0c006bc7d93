use std::io::{ErrorKind, Read};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::warn;

const CHUNK_SIZE: usize = 8 * 1024;

/// child의 diagnostic stream을 전용 스레드에서 EOF까지 읽어 모은다.
///
/// 버퍼는 무제한으로 자라므로 child의 write가 막히지 않는다.
pub struct LogCollector {
    buffer: Arc<Mutex<Vec<u8>>>,
    done: oneshot::Receiver<()>,
}

impl LogCollector {
    pub fn spawn<R>(mut reader: R) -> std::io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (tx, done) = oneshot::channel();

        let sink = Arc::clone(&buffer);
        thread::Builder::new()
            .name("log-collector".into())
            .spawn(move || {
                let mut chunk = [0u8; CHUNK_SIZE];
                loop {
                    match reader.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(n) => match sink.lock() {
                            Ok(mut buf) => buf.extend_from_slice(&chunk[..n]),
                            Err(_) => break,
                        },
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => {
                            warn!("log collector read failed: {e}");
                            break;
                        }
                    }
                }
                let _ = tx.send(());
            })?;

        Ok(Self { buffer, done })
    }

    /// drain 완료를 최대 `grace`만큼 기다린 뒤 지금까지 모인 바이트를 반환한다.
    ///
    /// child가 이미 종료된 뒤 호출되는 것을 전제로 한다. 손자 프로세스가 write end를
    /// 물고 있으면 EOF가 오지 않으므로, 시간 초과 시 부분 결과로 진행한다.
    pub async fn finish(self, grace: Duration) -> Vec<u8> {
        if tokio::time::timeout(grace, self.done).await.is_err() {
            warn!("log collector did not drain within {}s, continuing", grace.as_secs());
        }
        match self.buffer.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}
