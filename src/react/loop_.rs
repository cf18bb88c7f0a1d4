//! Belief / Plan / Act 主循环
//!
//! 每轮迭代：按 belief_interval 计算信念 -> 按 plan_interval 起草或修订计划 -> 生成一个动作并执行。
//! Agent 级错误在迭代边界被写入该轮日志，下一轮模型会在记忆中看到它；其余错误直接上抛。
//! 迭代耗尽后追加一条终止日志，并让模型基于全部记忆给出兜底回答。

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::react::belief::{BeliefFacts, BeliefGenerator};
use crate::react::events::{AgentObserver, RunTokenUsage, TracingObserver};
use crate::react::memory::build_memory;
use crate::react::parser::{parse_tool_call, split_rationale_action};
use crate::react::planner::{ExecutionPlan, Planner};
use crate::react::prompts::{PromptSet, ACTION_MARKER, ACT_STOP, OBSERVATION_STOP};
use crate::react::step::{StepError, StepLogEntry, ToolCallRecord};
use crate::tools::{FinalAnswerTool, ToolArguments, ToolExecutor, FINAL_ANSWER};

/// 循环参数
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub max_iterations: usize,
    /// None：每轮都计算信念；Some(n)：仅在 iteration % n == 0 时计算
    pub belief_interval: Option<usize>,
    /// None：每轮都计划；Some(n)：仅在 iteration % n == 0 时计划
    pub plan_interval: Option<usize>,
    pub belief_attempts: u32,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            belief_interval: Some(2),
            plan_interval: Some(4),
            belief_attempts: 3,
        }
    }
}

impl AgentSettings {
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.belief_interval == Some(0) {
            return Err(AgentError::Config("belief_interval must be at least 1".to_string()));
        }
        if self.plan_interval == Some(0) {
            return Err(AgentError::Config("plan_interval must be at least 1".to_string()));
        }
        if self.belief_attempts == 0 {
            return Err(AgentError::Config("belief_attempts must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn due(interval: Option<usize>, iteration: usize) -> bool {
    match interval {
        None => true,
        Some(n) => iteration % n == 0,
    }
}

/// 单个任务的运行状态；每次 run 开始时重置
#[derive(Debug, Clone, Default)]
pub struct RunState {
    /// 每次 run 生成的唯一标识，出现在该次运行的日志字段中
    pub run_id: String,
    pub task: String,
    pub logs: Vec<StepLogEntry>,
    pub beliefs: Vec<Arc<BeliefFacts>>,
    pub plans: Vec<ExecutionPlan>,
    pub iteration: usize,
    /// run 结束时写入
    pub token_usage: RunTokenUsage,
}

impl RunState {
    fn new(task: &str) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            task: task.to_string(),
            ..Self::default()
        }
    }
}

pub struct BeliefAgent {
    llm: Arc<dyn LlmClient>,
    executor: ToolExecutor,
    prompts: PromptSet,
    belief: BeliefGenerator,
    planner: Planner,
    tool_names: String,
    tool_descriptions: String,
    settings: AgentSettings,
    observer: Arc<dyn AgentObserver>,
    cancel: Option<CancellationToken>,
    state: RunState,
}

impl BeliefAgent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: ToolExecutor,
        policy: &str,
        prompts: PromptSet,
        settings: AgentSettings,
    ) -> Result<Self, AgentError> {
        settings.validate()?;
        let tool_names = executor
            .tool_names()
            .iter()
            .map(|n| format!("'{n}'"))
            .collect::<Vec<_>>()
            .join(", ");
        let tool_descriptions = executor.registry().describe_all();
        let belief = BeliefGenerator::new(
            llm.clone(),
            &prompts.belief_system,
            &prompts.belief_user,
            policy,
        )?
        .with_max_attempts(settings.belief_attempts);
        let planner = Planner::new(
            llm.clone(),
            prompts.plan_system.clone(),
            prompts.plan_user.clone(),
            policy,
            tool_descriptions.clone(),
        );
        Ok(Self {
            llm,
            executor,
            prompts,
            belief,
            planner,
            tool_names,
            tool_descriptions,
            settings,
            observer: Arc::new(TracingObserver),
            cancel: None,
            state: RunState::default(),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn AgentObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn logs(&self) -> &[StepLogEntry] {
        &self.state.logs
    }

    /// 运行一个任务直到给出答案或迭代耗尽；正常情况下总是返回 Ok(answer)
    pub async fn run(&mut self, task: &str) -> Result<String, AgentError> {
        self.state = RunState::new(task);
        tracing::info!(run_id = %self.state.run_id, task, "======== New task ========");

        let usage_start = self.llm.token_usage();
        let result = self.run_iterations().await;
        self.state.token_usage = RunTokenUsage::between(usage_start, self.llm.token_usage());
        self.observer.on_token_usage(&self.state.token_usage);
        result
    }

    async fn run_iterations(&mut self) -> Result<String, AgentError> {
        while self.state.iteration < self.settings.max_iterations {
            if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                tracing::warn!(run_id = %self.state.run_id, iteration = self.state.iteration, "run cancelled");
                return Err(AgentError::Cancelled);
            }
            let iteration = self.state.iteration;
            self.observer
                .on_iteration_start(iteration, self.settings.max_iterations);

            let mut entry = StepLogEntry::start(iteration);
            let outcome = self.step(iteration, &mut entry).await;
            entry.finish();

            let answer = match outcome {
                Ok(answer) => answer,
                Err(e) if e.is_agent_level() => {
                    self.observer.on_error(iteration, &e);
                    entry.error = Some(StepError::from(&e));
                    None
                }
                Err(e) => {
                    self.state.logs.push(entry);
                    return Err(e);
                }
            };
            self.state.logs.push(entry);
            self.state.iteration += 1;

            if let Some(answer) = answer {
                self.observer.on_final_answer(iteration, &answer, false);
                return Ok(answer);
            }
        }

        self.fallback().await
    }

    async fn step(&mut self, iteration: usize, entry: &mut StepLogEntry) -> Result<Option<String>, AgentError> {
        if due(self.settings.belief_interval, iteration) {
            let memory = build_memory(&self.state.task, &self.state.logs);
            let belief = self.belief.generate(iteration, &memory).await?;
            self.observer.on_belief(&belief);
            self.state.beliefs.push(Arc::new(belief));
        }

        if due(self.settings.plan_interval, iteration) {
            let memory = build_memory(&self.state.task, &self.state.logs);
            let plan = self
                .planner
                .plan(
                    iteration,
                    &self.state.task,
                    &memory,
                    self.state.beliefs.last(),
                    self.state.plans.last(),
                )
                .await?;
            self.observer.on_plan(&plan);
            self.state.plans.push(plan);
        }

        self.act(iteration, entry).await
    }

    async fn act(&self, iteration: usize, entry: &mut StepLogEntry) -> Result<Option<String>, AgentError> {
        let belief = self
            .state
            .beliefs
            .last()
            .ok_or(AgentError::PlanWithoutBelief { step: iteration })?;
        let plan = self
            .state
            .plans
            .last()
            .ok_or(AgentError::PlanMissing { step: iteration })?;

        let known = belief.known_facts.join("\n");
        let unknown = belief.unknown_facts.join("\n");
        let system = self.prompts.act_system.render(&[
            ("tool_names", &self.tool_names),
            ("tool_descriptions", &self.tool_descriptions),
            ("known_facts", &known),
            ("unknown_facts", &unknown),
            ("execution_plan", &plan.plan_details),
        ])?;

        let mut messages = vec![Message::system(system)];
        messages.extend(build_memory(&self.state.task, &self.state.logs));
        let stop = [ACT_STOP.to_string(), OBSERVATION_STOP.to_string()];
        let output = self
            .llm
            .complete(&messages, &stop)
            .await
            .map_err(AgentError::Generation)?;
        entry.llm_output = Some(output.clone());

        let (rationale, action) = split_rationale_action(&output, ACTION_MARKER)?;
        let (tool_name, arguments) = parse_tool_call(&action)?;
        entry.rationale = Some(rationale);
        entry.tool_call = Some(ToolCallRecord {
            tool_name: tool_name.clone(),
            tool_arguments: arguments.clone(),
        });
        self.observer.on_tool_call(iteration, &tool_name, &arguments);

        if tool_name == FINAL_ANSWER {
            let answer = final_answer_text(&arguments);
            entry.final_answer = Some(answer.clone());
            return Ok(Some(answer));
        }

        let observation = self.executor.execute(&tool_name, arguments).await?;
        let observation = observation.trim().to_string();
        self.observer.on_observation(iteration, &tool_name, &observation);
        entry.observation = Some(observation);
        Ok(None)
    }

    /// 迭代耗尽：追加终止日志，基于全部记忆让模型兜底回答；兜底失败也转为文本答案
    async fn fallback(&mut self) -> Result<String, AgentError> {
        let max = self.settings.max_iterations;
        let error = AgentError::MaxIterations(max);
        self.observer.on_error(max, &error);

        let mut terminal = StepLogEntry::start(max);
        terminal.end_time = Some(terminal.start_time);
        terminal.error = Some(StepError::from(&error));

        let mut replay = self.state.logs.clone();
        replay.push(terminal.clone());

        let mut messages = vec![Message::system(self.prompts.fallback_system.render(&[])?)];
        messages.extend(build_memory(&self.state.task, &replay));
        messages.push(Message::user(
            self.prompts
                .fallback_user
                .render(&[("task", &self.state.task)])?,
        ));

        let answer = match self.llm.complete(&messages, &[]).await {
            Ok(text) => text,
            Err(e) => format!("Error in generating final llm output: {e}."),
        };
        terminal.final_answer = Some(answer.clone());
        self.state.logs.push(terminal);
        self.observer.on_final_answer(max, &answer, true);
        Ok(answer)
    }
}

/// answer 键优先，否则整个参数
fn final_answer_text(arguments: &Value) -> String {
    match ToolArguments::from_value(arguments.clone()) {
        Ok(args) => FinalAnswerTool::extract(&args),
        Err(_) => arguments.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, MockReply};
    use crate::react::events::NoopObserver;
    use crate::react::prompts::{BELIEF_STOP, PLAN_STOP};
    use crate::tools::{FinalAnswerTool, ToolRegistry};
    use serde_json::json;

    const BELIEF: &str = r#"{"belief_state": "UNDERSTANDING", "belief_explanation": "x", "known_facts": ["k"], "unknown_facts": ["u"]}"#;

    fn agent(mock: Arc<MockLlmClient>, settings: AgentSettings) -> BeliefAgent {
        let mut registry = ToolRegistry::new();
        registry.register(FinalAnswerTool);
        BeliefAgent::new(
            mock,
            ToolExecutor::new(registry, 5),
            "POLICY",
            PromptSet::builtin().unwrap(),
            settings,
        )
        .unwrap()
        .with_observer(Arc::new(NoopObserver))
    }

    #[test]
    fn test_zero_interval_rejected() {
        let settings = AgentSettings {
            plan_interval: Some(0),
            ..AgentSettings::default()
        };
        assert_eq!(settings.validate().unwrap_err().kind(), "config");
    }

    #[test]
    fn test_due() {
        assert!(due(None, 7));
        assert!(due(Some(2), 4));
        assert!(!due(Some(2), 3));
    }

    #[test]
    fn test_final_answer_text_variants() {
        assert_eq!(final_answer_text(&json!({"answer": "ok"})), "ok");
        assert_eq!(final_answer_text(&json!("plain")), "plain");
        assert_eq!(final_answer_text(&json!([1, 2])), "[1,2]");
    }

    #[tokio::test]
    async fn test_final_answer_on_first_iteration() {
        let mock = Arc::new(
            MockLlmClient::new()
                .with_texts(Some(BELIEF_STOP), &[BELIEF])
                .with_texts(Some(PLAN_STOP), &["1. answer"])
                .with_texts(
                    Some(ACT_STOP),
                    &["Thought: done\nAction:\n{\"action\": \"final_answer\", \"action_input\": {\"answer\": \"all set\"}}"],
                ),
        );
        let mut agent = agent(mock.clone(), AgentSettings::default());
        assert_eq!(agent.run("help me").await.unwrap(), "all set");
        let logs = agent.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].rationale.as_deref(), Some("Thought: done"));
        assert_eq!(logs[0].final_answer.as_deref(), Some("all set"));

        let act_call = mock
            .calls()
            .into_iter()
            .find(|c| c.stop.contains(&ACT_STOP.to_string()))
            .unwrap();
        assert_eq!(act_call.stop, vec![ACT_STOP.to_string(), OBSERVATION_STOP.to_string()]);
        let system = &act_call.messages[0].content;
        assert!(system.contains("Known Facts:\nk"));
        assert!(system.contains("Unknown Facts:\nu"));
        assert!(system.contains("1. answer"));
        assert!(system.contains("'final_answer'"));
    }

    #[tokio::test]
    async fn test_generation_error_recorded_and_loop_continues() {
        let mock = Arc::new(
            MockLlmClient::new()
                .with_texts(Some(BELIEF_STOP), &[BELIEF])
                .with_texts(Some(PLAN_STOP), &["1. answer"])
                .with_replies(
                    Some(ACT_STOP),
                    vec![
                        MockReply::error("boom"),
                        MockReply::text("Action: {\"action\": \"final_answer\", \"action_input\": \"ok\"}"),
                    ],
                ),
        );
        let settings = AgentSettings {
            belief_interval: None,
            plan_interval: None,
            ..AgentSettings::default()
        };
        let mut agent = agent(mock, settings);
        assert_eq!(agent.run("t").await.unwrap(), "ok");
        let logs = agent.logs();
        assert_eq!(logs.len(), 2);
        let error = logs[0].error.as_ref().unwrap();
        assert_eq!(error.kind, "generation");
        assert!(error.message.starts_with("Error in generating llm output:"));
        assert!(logs[0].llm_output.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_iteration() {
        let token = CancellationToken::new();
        token.cancel();
        let mut agent = agent(Arc::new(MockLlmClient::new()), AgentSettings::default())
            .with_cancellation(token);
        let err = agent.run("t").await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert!(agent.logs().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_failure_becomes_text() {
        let mock = Arc::new(
            MockLlmClient::new()
                .with_texts(Some(BELIEF_STOP), &[BELIEF])
                .with_texts(Some(PLAN_STOP), &["1. loop"])
                .with_texts(Some(ACT_STOP), &["no action here"])
                .with_replies(None, vec![MockReply::error("quota")]),
        );
        let settings = AgentSettings {
            max_iterations: 2,
            ..AgentSettings::default()
        };
        let mut agent = agent(mock, settings);
        let answer = agent.run("t").await.unwrap();
        assert!(answer.starts_with("Error in generating final llm output:"));
        assert!(answer.contains("quota"));
        let terminal = agent.logs().last().unwrap();
        assert_eq!(terminal.iteration, 2);
        assert_eq!(terminal.final_answer.as_deref(), Some(answer.as_str()));
    }
}
