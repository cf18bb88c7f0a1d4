//! belief-agent 批量运行入口
//!
//! 用法：`belief-agent [config.toml]`。读取配置，按区间加载任务，逐个运行并打印奖励汇总。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use belief_agent::agent::{create_llm_from_config, create_user_llm, load_policy};
use belief_agent::config::load_config;
use belief_agent::domain::{load_tasks, select_range, LlmUserSimulator, Task, UserSimulator};
use belief_agent::eval::{batch_tag, DatasetSource, TaskRunner, UserFactory};
use belief_agent::observability;
use belief_agent::react::PromptSet;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path.as_deref()).context("Failed to load config")?;
    tracing::info!(?cfg, "config loaded");

    let tasks_path = cfg.run.tasks_path();
    let tasks = load_tasks(&tasks_path)
        .with_context(|| format!("Failed to load tasks from {}", tasks_path.display()))?;
    let tasks = select_range(tasks, cfg.run.start_index, cfg.run.end_index);
    let policy = load_policy(cfg.run.policy_path.as_deref()).context("Failed to load policy")?;
    let prompts = PromptSet::load(cfg.agent.prompts_dir.as_deref()).context("Invalid prompt templates")?;

    let user_llm = create_user_llm(&cfg);
    let users: UserFactory = Arc::new(move |_: &Task| {
        Arc::new(LlmUserSimulator::new(user_llm.clone())) as Arc<dyn UserSimulator>
    });

    std::fs::create_dir_all(&cfg.run.log_dir)
        .with_context(|| format!("Failed to create {}", cfg.run.log_dir.display()))?;
    let tag = batch_tag(chrono::Local::now());

    let runner = TaskRunner::new(
        create_llm_from_config(&cfg),
        users,
        DatasetSource::File(cfg.run.dataset_path.clone()),
        policy,
        prompts,
        cfg.agent.settings(),
    )
    .with_tool_timeout(Duration::from_secs(cfg.tools.tool_timeout_secs))
    .with_reward_rule(cfg.run.reward_rule)
    .with_records(cfg.run.log_dir.clone(), tag);

    let report = Arc::new(runner)
        .run_batch(cfg.run.start_index, tasks, cfg.run.concurrency)
        .await;

    for (index, error) in &report.failures {
        eprintln!("task {index} failed: {error}");
    }
    println!("\n\n{}", report.summary());
    Ok(())
}
