use std::collections::HashMap;
use std::io;
use std::sync::Mutex;

use super::{ProbeResult, ProcessProbe};

/// 테스트용 ProcessProbe 구현체 — 등록되지 않은 pid는 Gone
#[derive(Default)]
pub struct MockProcessProbe {
    states: Mutex<HashMap<u32, ProbeResult>>,
    /// probe 호출 기록
    pub probed: Mutex<Vec<u32>>,
    /// terminate 호출 기록
    pub terminated: Mutex<Vec<u32>>,
}

impl MockProcessProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(&self, pid: u32, state: ProbeResult) {
        self.states.lock().unwrap().insert(pid, state);
    }

    pub fn probe_count(&self) -> usize {
        self.probed.lock().unwrap().len()
    }
}

impl ProcessProbe for MockProcessProbe {
    fn probe(&self, pid: u32) -> ProbeResult {
        self.probed.lock().unwrap().push(pid);
        self.states
            .lock()
            .unwrap()
            .get(&pid)
            .copied()
            .unwrap_or(ProbeResult::Gone)
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        self.terminated.lock().unwrap().push(pid);
        self.states.lock().unwrap().insert(pid, ProbeResult::Gone);
        Ok(())
    }
}
