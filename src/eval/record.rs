//! 轨迹记录落盘：每个任务一个 JSON 文件，`{data_hash}_{MMDDHHMMSS}.json`

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;

use crate::core::AgentError;
use crate::domain::Task;
use crate::eval::reward::RewardResult;
use crate::eval::trajectory::TrajectoryNode;
use crate::react::ToolCallRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewardInfo {
    pub correct_actions_reward: bool,
    pub final_reward: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectoryRecord {
    pub instruction: String,
    pub trajectory: Vec<TrajectoryNode>,
    pub ground_truth_tool_calls: Vec<ToolCallRecord>,
    pub reward_info: RewardInfo,
}

/// 批次时间标签，同一批次的所有文件共用
pub fn batch_tag(now: DateTime<Local>) -> String {
    now.format("%m%d%H%M%S").to_string()
}

pub fn record_file_name(data_hash: &str, tag: &str) -> String {
    format!("{data_hash}_{tag}.json")
}

impl TrajectoryRecord {
    pub fn new(task: &Task, trajectory: Vec<TrajectoryNode>, reward: &RewardResult) -> Self {
        Self {
            instruction: task.instruction.clone(),
            trajectory,
            ground_truth_tool_calls: task
                .actions
                .iter()
                .map(|a| ToolCallRecord {
                    tool_name: a.name.clone(),
                    tool_arguments: Value::Object(a.kwargs.clone()),
                })
                .collect(),
            reward_info: RewardInfo {
                correct_actions_reward: reward.r_actions,
                final_reward: reward.reward,
            },
        }
    }

    /// 写入 dir（不存在则创建），返回文件路径
    pub fn save(&self, dir: impl AsRef<Path>, data_hash: &str, tag: &str) -> Result<PathBuf, AgentError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(record_file_name(data_hash, tag));
        std::fs::write(&path, serde_json::to_string(self)?)?;
        tracing::debug!(path = %path.display(), "trajectory saved");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Action;
    use chrono::TimeZone;
    use serde_json::{json, Map};
    use std::collections::BTreeMap;

    #[test]
    fn test_batch_tag_format() {
        let t = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap();
        assert_eq!(batch_tag(t), "0307090502");
    }

    #[test]
    fn test_save_writes_expected_shape() {
        let mut kwargs = Map::new();
        kwargs.insert("product_id".into(), json!("6086499569"));
        let task = Task {
            user_id: "u1".into(),
            instruction: "exchange watch".into(),
            actions: vec![Action {
                name: "get_product_details".into(),
                kwargs,
            }],
            outputs: vec![],
        };
        let reward = RewardResult {
            computed_hash: "abc".into(),
            ground_truth_hash: "abc".into(),
            r_actions: true,
            outputs: BTreeMap::new(),
            reward: 1.0,
        };
        let record = TrajectoryRecord::new(
            &task,
            vec![TrajectoryNode {
                thought: Some("look".into()),
                ..TrajectoryNode::default()
            }],
            &reward,
        );

        let dir = tempfile::tempdir().unwrap();
        let path = record.save(dir.path().join("results"), "abc", "0307090502").unwrap();
        assert!(path.ends_with("abc_0307090502.json"));

        let v: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["instruction"], "exchange watch");
        assert_eq!(v["trajectory"][0]["thought"], "look");
        assert_eq!(v["ground_truth_tool_calls"][0]["tool_name"], "get_product_details");
        assert_eq!(v["ground_truth_tool_calls"][0]["tool_arguments"]["product_id"], "6086499569");
        assert_eq!(v["reward_info"]["correct_actions_reward"], true);
        assert_eq!(v["reward_info"]["final_reward"], 1.0);
    }
}
