//! 轨迹：步骤日志的紧凑投影，每条日志对应一个 {thought, action, observation} 节点

use serde::Serialize;

use crate::react::{StepLogEntry, ToolCallRecord};

const ERROR_OBSERVATION: &str = "resulted in error";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrajectoryNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ToolCallRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
}

/// 有错误的步骤以 "resulted in error" 作为观察，覆盖原有观察
pub fn extract_trajectory(logs: &[StepLogEntry]) -> Vec<TrajectoryNode> {
    logs.iter()
        .map(|entry| TrajectoryNode {
            thought: entry
                .rationale
                .as_ref()
                .map(|r| r.replace("Thought: ", "")),
            action: entry.tool_call.clone(),
            observation: if entry.error.is_some() {
                Some(ERROR_OBSERVATION.to_string())
            } else {
                entry.observation.clone()
            },
        })
        .collect()
}
