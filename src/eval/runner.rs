//! 批量运行：每个任务新建数据集、用户模拟器、工具集与 agent，跑完后计算奖励并落盘轨迹
//!
//! concurrency > 1 时各任务在独立的 tokio 任务上运行，由 Semaphore 限制并发；任务之间不共享可变状态。

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::agent::build_toolbox;
use crate::core::AgentError;
use crate::domain::{Dataset, Task, UserSimulator};
use crate::eval::record::TrajectoryRecord;
use crate::eval::reward::{compute_reward, RewardResult, RewardRule};
use crate::eval::trajectory::{extract_trajectory, TrajectoryNode};
use crate::llm::LlmClient;
use crate::react::{AgentObserver, AgentSettings, BeliefAgent, PromptSet, StepLogEntry};
use crate::tools::ToolExecutor;

/// 为每个任务创建一个新的用户模拟器
pub type UserFactory = Arc<dyn Fn(&Task) -> Arc<dyn UserSimulator> + Send + Sync>;

/// 数据集来源；每次 load 都得到一份独立的数据
#[derive(Debug, Clone)]
pub enum DatasetSource {
    File(PathBuf),
    Inline(Value),
}

impl DatasetSource {
    pub fn load(&self) -> Result<Dataset, AgentError> {
        match self {
            DatasetSource::File(path) => Dataset::load(path),
            DatasetSource::Inline(value) => Ok(Dataset::from_value(value.clone())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// 任务在划分文件中的下标
    pub index: usize,
    pub task: Task,
    pub answer: String,
    pub logs: Vec<StepLogEntry>,
    pub trajectory: Vec<TrajectoryNode>,
    pub reward: RewardResult,
    pub record_path: Option<PathBuf>,
}

impl TaskOutcome {
    pub fn record(&self) -> TrajectoryRecord {
        TrajectoryRecord::new(&self.task, self.trajectory.clone(), &self.reward)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RewardSummary {
    pub total_executions: usize,
    pub total_action_rewards: f64,
    pub total_rewards: f64,
}

impl RewardSummary {
    pub fn from_outcomes(outcomes: &[TaskOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut acc, o| {
            acc.total_executions += 1;
            if o.reward.r_actions {
                acc.total_action_rewards += 1.0;
            }
            acc.total_rewards += o.reward.reward;
            acc
        })
    }
}

impl fmt::Display for RewardSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, ">>>>>>>>>> REWARD SUMMARY >>>>>>>>>>>>>")?;
        writeln!(f, "total_executions: {}", self.total_executions)?;
        writeln!(f, "total_actions rewards: {:?}", self.total_action_rewards)?;
        writeln!(f, "total rewards: {:?}", self.total_rewards)?;
        write!(f, ">>>>>>>>>> REWARD SUMMARY >>>>>>>>>>>>>")
    }
}

/// 批次结果：成功的任务与失败的任务（下标 + 错误文本）
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<TaskOutcome>,
    pub failures: Vec<(usize, String)>,
}

impl BatchReport {
    pub fn summary(&self) -> RewardSummary {
        RewardSummary::from_outcomes(&self.outcomes)
    }
}

pub struct TaskRunner {
    llm: Arc<dyn LlmClient>,
    users: UserFactory,
    dataset: DatasetSource,
    policy: String,
    prompts: PromptSet,
    settings: AgentSettings,
    tool_timeout: Duration,
    reward_rule: RewardRule,
    observer: Option<Arc<dyn AgentObserver>>,
    cancel: Option<CancellationToken>,
    records: Option<(PathBuf, String)>,
}

impl TaskRunner {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        users: UserFactory,
        dataset: DatasetSource,
        policy: impl Into<String>,
        prompts: PromptSet,
        settings: AgentSettings,
    ) -> Self {
        Self {
            llm,
            users,
            dataset,
            policy: policy.into(),
            prompts,
            settings,
            tool_timeout: Duration::from_secs(30),
            reward_rule: RewardRule::default(),
            observer: None,
            cancel: None,
            records: None,
        }
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_reward_rule(mut self, rule: RewardRule) -> Self {
        self.reward_rule = rule;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn AgentObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// 每个任务结束后把轨迹写入 dir，文件名带批次标签 tag
    pub fn with_records(mut self, dir: impl Into<PathBuf>, tag: impl Into<String>) -> Self {
        self.records = Some((dir.into(), tag.into()));
        self
    }

    pub async fn run_task(&self, index: usize, task: &Task) -> Result<TaskOutcome, AgentError> {
        let dataset = self.dataset.load()?;
        let user = (self.users)(task);
        let opening = user.reset(&task.instruction).await?;

        let executor = ToolExecutor::with_timeout(build_toolbox(&dataset, user)?, self.tool_timeout);
        let mut agent = BeliefAgent::new(
            self.llm.clone(),
            executor,
            &self.policy,
            self.prompts.clone(),
            self.settings.clone(),
        )?;
        if let Some(observer) = &self.observer {
            agent = agent.with_observer(observer.clone());
        }
        if let Some(token) = &self.cancel {
            agent = agent.with_cancellation(token.clone());
        }

        tracing::info!(index, instruction = %task.instruction, "running task");
        let answer = agent.run(&opening).await?;
        let logs = agent.logs().to_vec();

        let reward = compute_reward(task, &dataset, &self.dataset.load()?, &logs, self.reward_rule);
        let mut outcome = TaskOutcome {
            index,
            task: task.clone(),
            answer,
            trajectory: extract_trajectory(&logs),
            logs,
            reward,
            record_path: None,
        };
        if let Some((dir, tag)) = &self.records {
            let path = outcome.record().save(dir, &outcome.reward.computed_hash, tag)?;
            outcome.record_path = Some(path);
        }
        Ok(outcome)
    }

    /// 运行一批任务；first_index 为 tasks[0] 在划分文件中的下标。结果按任务顺序排列
    pub async fn run_batch(self: Arc<Self>, first_index: usize, tasks: Vec<Task>, concurrency: usize) -> BatchReport {
        let mut results = Vec::with_capacity(tasks.len());

        if concurrency <= 1 {
            for (offset, task) in tasks.iter().enumerate() {
                let index = first_index + offset;
                results.push((index, self.run_task(index, task).await.map_err(|e| e.to_string())));
            }
        } else {
            let semaphore = Arc::new(Semaphore::new(concurrency));
            let mut handles = Vec::with_capacity(tasks.len());
            for (offset, task) in tasks.into_iter().enumerate() {
                let index = first_index + offset;
                let runner = Arc::clone(&self);
                let semaphore = Arc::clone(&semaphore);
                handles.push((
                    index,
                    tokio::spawn(async move {
                        let _permit = match semaphore.acquire_owned().await {
                            Ok(permit) => permit,
                            Err(e) => return Err(e.to_string()),
                        };
                        runner.run_task(index, &task).await.map_err(|e| e.to_string())
                    }),
                ));
            }
            for (index, handle) in handles {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(format!("task join failed: {e}")),
                };
                results.push((index, result));
            }
        }

        let mut report = BatchReport::default();
        for (index, result) in results {
            match result {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(error) => {
                    tracing::error!(index, error = %error, "task failed");
                    report.failures.push((index, error));
                }
            }
        }
        report
    }
}
