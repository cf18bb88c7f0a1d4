//! 任务定义与加载
//!
//! Task：用户指令、标准动作序列（用于复现标准终态）与期望输出片段。
//! 任务文件按划分命名：`tasks_{train|dev|test}.json`。

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::AgentError;

/// 一条标准动作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub user_id: String,
    pub instruction: String,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

/// 任务划分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSplit {
    Train,
    Dev,
    Test,
}

impl TaskSplit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskSplit::Train => "train",
            TaskSplit::Dev => "dev",
            TaskSplit::Test => "test",
        }
    }

    pub fn file_name(&self) -> String {
        format!("tasks_{}.json", self.as_str())
    }

    pub fn path_in(&self, dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref().join(self.file_name())
    }
}

impl fmt::Display for TaskSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskSplit {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "train" => Ok(TaskSplit::Train),
            "dev" => Ok(TaskSplit::Dev),
            "test" => Ok(TaskSplit::Test),
            other => Err(AgentError::Config(format!(
                "unknown task split {other:?}, expected train, dev or test"
            ))),
        }
    }
}

pub fn load_tasks(path: impl AsRef<Path>) -> Result<Vec<Task>, AgentError> {
    let text = std::fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&text)?)
}

/// 取 [start, end) 区间，越界截断
pub fn select_range(tasks: Vec<Task>, start: usize, end: usize) -> Vec<Task> {
    let end = end.min(tasks.len());
    if start >= end {
        return Vec::new();
    }
    tasks.into_iter().skip(start).take(end - start).collect()
}
