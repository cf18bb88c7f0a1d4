//! 步骤日志：每轮迭代一条，追加后不再修改；记忆重建与轨迹提取都只读它

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::core::AgentError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub tool_arguments: Value,
}

/// 记录下来的错误：类别 + 展示文本
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepError {
    pub kind: String,
    pub message: String,
}

impl From<&AgentError> for StepError {
    fn from(err: &AgentError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepLogEntry {
    pub iteration: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// 耗时（秒）；finish 时写入，未结束时为 0
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
}

impl StepLogEntry {
    pub fn start(iteration: usize) -> Self {
        Self {
            iteration,
            start_time: Utc::now(),
            end_time: None,
            duration: 0.0,
            llm_output: None,
            rationale: None,
            tool_call: None,
            observation: None,
            error: None,
            final_answer: None,
        }
    }

    pub fn finish(&mut self) {
        let end = Utc::now();
        self.duration = (end - self.start_time).num_milliseconds() as f64 / 1000.0;
        self.end_time = Some(end);
    }
}
