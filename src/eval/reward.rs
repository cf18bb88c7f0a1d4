//! 奖励计算
//!
//! 动作奖励：agent 运行后的数据集哈希与在新数据集上重放标准动作后的哈希一致。
//! 输出奖励：每个期望片段（忽略大小写）至少出现在一次 respond_customer 的 query 中，
//! 比较前去掉 query 里的逗号。最终奖励由 RewardRule 决定，默认只看输出奖励。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{replay_actions, Dataset, Task};
use crate::react::StepLogEntry;
use crate::tools::RESPOND_CUSTOMER;

/// 最终奖励的判定规则
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardRule {
    /// 所有期望输出都出现即为 1.0；动作奖励单独记录，不影响最终奖励
    #[default]
    Outputs,
    /// 动作奖励与输出奖励同时满足才为 1.0
    ActionsAndOutputs,
}

impl RewardRule {
    pub fn score(self, r_actions: bool, r_outputs: bool) -> f64 {
        let passed = match self {
            RewardRule::Outputs => r_outputs,
            RewardRule::ActionsAndOutputs => r_actions && r_outputs,
        };
        if passed {
            1.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewardResult {
    pub computed_hash: String,
    pub ground_truth_hash: String,
    pub r_actions: bool,
    /// 期望片段 -> 是否找到；任务没有期望输出时为空
    pub outputs: BTreeMap<String, bool>,
    pub reward: f64,
}

impl RewardResult {
    pub fn r_outputs(&self) -> bool {
        self.outputs.values().all(|found| *found)
    }
}

/// respond_customer 调用里发给客户的文本，按出现顺序
pub fn customer_responses(logs: &[StepLogEntry]) -> Vec<String> {
    logs.iter()
        .filter_map(|entry| entry.tool_call.as_ref())
        .filter(|call| call.tool_name == RESPOND_CUSTOMER)
        .filter_map(|call| match &call.tool_arguments {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => map.get("query").and_then(Value::as_str).map(String::from),
            _ => None,
        })
        .collect()
}

pub fn score_outputs(expected: &[String], logs: &[StepLogEntry]) -> BTreeMap<String, bool> {
    let responses: Vec<String> = customer_responses(logs)
        .iter()
        .map(|r| r.to_lowercase().replace(',', ""))
        .collect();
    expected
        .iter()
        .map(|output| {
            let needle = output.to_lowercase();
            let found = responses.iter().any(|r| r.contains(&needle));
            (output.clone(), found)
        })
        .collect()
}

/// agent_data：agent 运行后的数据集；fresh：新加载、尚未改动的数据集（会在其上重放标准动作）
pub fn compute_reward(
    task: &Task,
    agent_data: &Dataset,
    fresh: &Dataset,
    logs: &[StepLogEntry],
    rule: RewardRule,
) -> RewardResult {
    let computed_hash = agent_data.content_hash();
    let replayed = match replay_actions(fresh, &task.actions) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "ground truth replay failed");
            false
        }
    };
    let ground_truth_hash = fresh.content_hash();
    let r_actions = replayed && computed_hash == ground_truth_hash;

    let outputs = score_outputs(&task.outputs, logs);
    let r_outputs = outputs.values().all(|found| *found);
    let reward = rule.score(r_actions, r_outputs);

    tracing::info!(r_actions, r_outputs, reward, "reward computed");
    RewardResult {
        computed_hash,
        ground_truth_hash,
        r_actions,
        outputs,
        reward,
    }
}
