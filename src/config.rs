//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BELIEF__*` 覆盖（双下划线表示嵌套，如 `BELIEF__LLM__PROVIDER=gemini`）。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::core::RetryPolicy;
use crate::domain::TaskSplit;
use crate::eval::RewardRule;
use crate::react::AgentSettings;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSection,
    pub llm: LlmSection,
    pub user: UserSection,
    pub tools: ToolsSection,
    pub run: RunSection,
}

/// [agent] 段：迭代上限与信念/计划间隔（0 表示每轮都做）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_iterations: usize,
    pub belief_interval: usize,
    pub plan_interval: usize,
    pub belief_attempts: u32,
    /// 覆盖 prompt 模板的目录，未设置时查找 config/prompts
    pub prompts_dir: Option<PathBuf>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            belief_interval: 2,
            plan_interval: 4,
            belief_attempts: 3,
            prompts_dir: None,
        }
    }
}

fn interval(n: usize) -> Option<usize> {
    (n > 0).then_some(n)
}

impl AgentSection {
    pub fn settings(&self) -> AgentSettings {
        AgentSettings {
            max_iterations: self.max_iterations,
            belief_interval: interval(self.belief_interval),
            plan_interval: interval(self.plan_interval),
            belief_attempts: self.belief_attempts,
        }
    }
}

/// [llm] 段：后端选择、超时与限流重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / gemini / mock；缺少对应 API Key 时回退到 mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub timeouts: LlmTimeoutsSection,
    pub retry: LlmRetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
            retry: LlmRetrySection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmRetrySection {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
}

impl Default for LlmRetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 2000,
        }
    }
}

impl LlmSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.request)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::rate_limit()
            .with_max_attempts(self.retry.max_attempts.max(1))
            .with_initial_delay(Duration::from_millis(self.retry.initial_delay_ms))
    }
}

/// [user] 段：用户模拟器使用的模型
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserSection {
    pub provider: String,
    pub model: String,
}

impl Default for UserSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
        }
    }
}

/// [run] 段：任务与数据位置、任务区间、结果目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub tasks_dir: PathBuf,
    pub dataset_path: PathBuf,
    /// 领域策略文件，未设置时用内置零售策略
    pub policy_path: Option<PathBuf>,
    pub task_split: TaskSplit,
    pub start_index: usize,
    pub end_index: usize,
    pub log_dir: PathBuf,
    pub concurrency: usize,
    /// outputs：只看期望输出；actions_and_outputs：还要求动作奖励
    pub reward_rule: RewardRule,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            tasks_dir: PathBuf::from("data"),
            dataset_path: PathBuf::from("data/retail.json"),
            policy_path: None,
            task_split: TaskSplit::Train,
            start_index: 0,
            end_index: 10,
            log_dir: PathBuf::from("results"),
            concurrency: 1,
            reward_rule: RewardRule::Outputs,
        }
    }
}

impl RunSection {
    pub fn tasks_path(&self) -> PathBuf {
        self.task_split.path_in(&self.tasks_dir)
    }
}

/// 从 config 目录加载配置，环境变量 BELIEF__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（可覆盖前面的键；文件必须存在）
/// 3. 最后叠加环境变量 BELIEF__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BELIEF")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        let settings = cfg.agent.settings();
        assert_eq!(settings, AgentSettings::default());
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
        assert_eq!(cfg.llm.request_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.llm.retry_policy().max_attempts, 5);
        assert_eq!(cfg.run.tasks_path(), PathBuf::from("data/tasks_train.json"));
        assert_eq!(cfg.run.concurrency, 1);
        assert_eq!(cfg.run.reward_rule, RewardRule::Outputs);
    }

    #[test]
    fn test_zero_interval_means_every_iteration() {
        let section = AgentSection {
            belief_interval: 0,
            plan_interval: 3,
            ..AgentSection::default()
        };
        let settings = section.settings();
        assert_eq!(settings.belief_interval, None);
        assert_eq!(settings.plan_interval, Some(3));
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(
            &path,
            "[agent]\nmax_iterations = 7\n\n[llm]\nprovider = \"mock\"\n\n[run]\ntask_split = \"dev\"\nend_index = 3\nreward_rule = \"actions_and_outputs\"\n",
        )
        .unwrap();
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.agent.max_iterations, 7);
        assert_eq!(cfg.agent.plan_interval, 4);
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.run.task_split, TaskSplit::Dev);
        assert_eq!(cfg.run.end_index, 3);
        assert_eq!(cfg.run.reward_rule, RewardRule::ActionsAndOutputs);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
