//! 领域数据集
//!
//! 每个任务加载一份新的 JSON 数据（users / orders / products），工具在其上读写；
//! `content_hash` 对键排序后的规范序列化做 SHA-256，用来比较两份数据的终态是否一致。

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::core::AgentError;

/// 共享可变数据集；克隆共享同一份数据
#[derive(Debug, Clone)]
pub struct Dataset {
    inner: Arc<Mutex<Value>>,
}

impl Dataset {
    pub fn from_value(value: Value) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let value: Value = serde_json::from_str(&text)?;
        Ok(Self::from_value(value))
    }

    fn lock(&self) -> MutexGuard<'_, Value> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 在锁内对数据执行 f（f 不得 await）
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    pub fn snapshot(&self) -> Value {
        self.lock().clone()
    }

    pub fn content_hash(&self) -> String {
        content_hash(&self.lock())
    }
}

/// 键排序后的规范 JSON 文本
pub fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = Map::new();
            for (k, v) in entries {
                out.insert(k.clone(), canonicalize(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// SHA-256 hex
pub fn content_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    hex::encode(hasher.finalize())
}
