use std::path::{Path, PathBuf};

use super::models::TaskqConfig;
use super::{taskq_home, Env};

const GLOBAL_CONFIG_FILENAME: &str = ".taskq.yaml";
const HOME_CONFIG_FILENAME: &str = "taskq.yaml";

/// 글로벌(~/.taskq.yaml) + TASKQ_HOME(taskq.yaml)을 머지하여 최종 설정 반환
/// Raw YAML Value 단계에서 딥머지 → 최종 역직렬화
pub fn load_merged(env: &dyn Env) -> TaskqConfig {
    let global = global_config_path(env).and_then(|p| load_raw_yaml(&p));
    let local = taskq_home(env).and_then(|home| load_raw_yaml(&home.join(HOME_CONFIG_FILENAME)));

    let merged = match (global, local) {
        (Some(g), Some(l)) => deep_merge(g, l),
        (Some(v), None) | (None, Some(v)) => v,
        (None, None) => return TaskqConfig::default(),
    };

    // serde(default)가 미지정 필드를 채움
    match serde_json::from_value(merged) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("invalid taskq config, using defaults: {e}");
            TaskqConfig::default()
        }
    }
}

pub fn global_config_path(env: &dyn Env) -> Option<PathBuf> {
    let home = env.var("HOME").ok()?;
    Some(Path::new(&home).join(GLOBAL_CONFIG_FILENAME))
}

/// YAML 파일 → serde_json::Value
/// 미지정 필드는 Value에 존재하지 않아 머지 시 base를 보존
fn load_raw_yaml(path: &Path) -> Option<serde_json::Value> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_yaml::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("failed to parse {}: {e}", path.display());
            None
        }
    }
}

/// over에 명시적으로 존재하는 값만 base를 덮어씀.
/// null은 상속된 list를 지운다 (`allowed: null` → allow-list 해제). 그 외의 null은 무시.
fn deep_merge(base: serde_json::Value, over: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match (base, over) {
        (Value::Object(mut b), Value::Object(o)) => {
            for (key, over_val) in o {
                let base_val = b.remove(&key).unwrap_or(Value::Null);
                b.insert(key, deep_merge(base_val, over_val));
            }
            Value::Object(b)
        }
        (Value::Array(_), Value::Null) => Value::Null,
        (base, Value::Null) => base,
        (_, over) => over,
    }
}
