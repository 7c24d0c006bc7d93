pub mod loader;
pub mod models;

use std::path::{Path, PathBuf};

/// 환경 변수 접근을 추상화하는 트레이트 (테스트 격리를 위해 사용)
pub trait Env: Send + Sync {
    fn var(&self, key: &str) -> Result<String, std::env::VarError>;
}

/// 실제 환경 변수를 사용하는 구현체
pub struct RealEnv;

impl Env for RealEnv {
    fn var(&self, key: &str) -> Result<String, std::env::VarError> {
        std::env::var(key)
    }
}

/// `$TASKQ_HOME`, 없으면 `~/.taskq`. HOME도 없으면 None.
pub fn taskq_home(env: &dyn Env) -> Option<PathBuf> {
    if let Ok(home) = env.var("TASKQ_HOME") {
        return Some(PathBuf::from(home));
    }
    let home = env.var("HOME").ok()?;
    Some(Path::new(&home).join(".taskq"))
}

/// `--db` 미지정 시 기본 DB 경로
pub fn default_db_path(env: &dyn Env) -> Option<PathBuf> {
    taskq_home(env).map(|home| home.join("taskq.db"))
}

/// 로그 디렉토리 경로 해석: 절대 경로면 그대로, 상대 경로면 home 기준
pub fn resolve_log_dir(log_dir: &str, home: &Path) -> PathBuf {
    let path = Path::new(log_dir);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        home.join(log_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapEnv(HashMap<&'static str, &'static str>);

    impl Env for MapEnv {
        fn var(&self, key: &str) -> Result<String, std::env::VarError> {
            self.0
                .get(key)
                .map(|v| v.to_string())
                .ok_or(std::env::VarError::NotPresent)
        }
    }

    #[test]
    fn home_prefers_taskq_home() {
        let env = MapEnv(HashMap::from([("TASKQ_HOME", "/srv/taskq"), ("HOME", "/home/u")]));
        assert_eq!(taskq_home(&env), Some(PathBuf::from("/srv/taskq")));
        assert_eq!(default_db_path(&env), Some(PathBuf::from("/srv/taskq/taskq.db")));
    }

    #[test]
    fn home_falls_back_to_dot_dir() {
        let env = MapEnv(HashMap::from([("HOME", "/home/u")]));
        assert_eq!(taskq_home(&env), Some(PathBuf::from("/home/u/.taskq")));
        assert_eq!(taskq_home(&MapEnv(HashMap::new())), None);
    }

    #[test]
    fn log_dir_resolution() {
        let home = Path::new("/srv/taskq");
        assert_eq!(resolve_log_dir("logs", home), PathBuf::from("/srv/taskq/logs"));
        assert_eq!(resolve_log_dir("/var/log/taskq", home), PathBuf::from("/var/log/taskq"));
    }
}
