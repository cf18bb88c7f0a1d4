//! 循环过程事件与观察者
//!
//! 循环不直接写日志，而是通知注入的 AgentObserver：
//! TracingObserver 输出结构化 tracing 事件（默认），ChannelObserver 把 AgentEvent 推到 mpsc 通道，
//! NoopObserver 什么也不做。

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::core::AgentError;
use crate::react::belief::{BeliefFacts, BeliefState};
use crate::react::planner::ExecutionPlan;

/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

fn preview(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    IterationStart {
        iteration: usize,
        max_iterations: usize,
    },
    Belief {
        step: usize,
        state: BeliefState,
        known_facts: usize,
        unknown_facts: usize,
    },
    Plan {
        step: usize,
        text: String,
    },
    ToolCall {
        iteration: usize,
        tool: String,
        args: Value,
    },
    Observation {
        iteration: usize,
        tool: String,
        preview: String,
    },
    Error {
        iteration: usize,
        kind: String,
        text: String,
    },
    FinalAnswer {
        iteration: usize,
        answer: String,
        /// 是否来自迭代耗尽后的兜底回答
        fallback: bool,
    },
    /// 一次 run 结束时的 token 用量：本次增量 + 客户端累计
    TokenUsage {
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
        cumulative_total: u64,
    },
}

/// 一次 run 的 token 用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cumulative_total: u64,
}

impl RunTokenUsage {
    /// start / end 为 LlmClient::token_usage 在 run 前后的读数
    pub fn between(start: (u64, u64, u64), end: (u64, u64, u64)) -> Self {
        Self {
            prompt_tokens: end.0.saturating_sub(start.0),
            completion_tokens: end.1.saturating_sub(start.1),
            cumulative_total: end.2,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

pub trait AgentObserver: Send + Sync {
    fn on_iteration_start(&self, _iteration: usize, _max_iterations: usize) {}
    fn on_belief(&self, _belief: &BeliefFacts) {}
    fn on_plan(&self, _plan: &ExecutionPlan) {}
    fn on_tool_call(&self, _iteration: usize, _tool: &str, _args: &Value) {}
    fn on_observation(&self, _iteration: usize, _tool: &str, _observation: &str) {}
    fn on_error(&self, _iteration: usize, _error: &AgentError) {}
    fn on_final_answer(&self, _iteration: usize, _answer: &str, _fallback: bool) {}
    fn on_token_usage(&self, _usage: &RunTokenUsage) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl AgentObserver for NoopObserver {}

/// 结构化 tracing 输出
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl AgentObserver for TracingObserver {
    fn on_iteration_start(&self, iteration: usize, max_iterations: usize) {
        tracing::debug!(iteration, max_iterations, "iteration start");
    }

    fn on_belief(&self, belief: &BeliefFacts) {
        tracing::info!(
            step = belief.step,
            state = %belief.belief_state,
            known = belief.known_facts.len(),
            unknown = belief.unknown_facts.len(),
            "belief computed"
        );
    }

    fn on_plan(&self, plan: &ExecutionPlan) {
        tracing::info!(step = plan.step, plan = %plan.plan_details.trim(), "plan computed");
    }

    fn on_tool_call(&self, iteration: usize, tool: &str, args: &Value) {
        tracing::info!(iteration, tool, args = %args, "tool call");
    }

    fn on_observation(&self, iteration: usize, tool: &str, observation: &str) {
        tracing::info!(
            iteration,
            tool,
            observation = %preview(observation, OBSERVATION_PREVIEW_CHARS),
            "observation"
        );
    }

    fn on_error(&self, iteration: usize, error: &AgentError) {
        tracing::error!(iteration, kind = error.kind(), error = %error, "step failed");
    }

    fn on_final_answer(&self, iteration: usize, answer: &str, fallback: bool) {
        tracing::info!(iteration, fallback, answer, "final answer");
    }

    fn on_token_usage(&self, usage: &RunTokenUsage) {
        tracing::info!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens(),
            cumulative_total = usage.cumulative_total,
            "token usage"
        );
    }
}

/// 把事件推送到 mpsc 通道；接收端关闭后静默丢弃
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<AgentEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<AgentEvent>) -> Self {
        Self { tx }
    }

    /// 创建观察者与对应的接收端
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AgentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn send(&self, event: AgentEvent) {
        let _ = self.tx.send(event);
    }
}

impl AgentObserver for ChannelObserver {
    fn on_iteration_start(&self, iteration: usize, max_iterations: usize) {
        self.send(AgentEvent::IterationStart {
            iteration,
            max_iterations,
        });
    }

    fn on_belief(&self, belief: &BeliefFacts) {
        self.send(AgentEvent::Belief {
            step: belief.step,
            state: belief.belief_state,
            known_facts: belief.known_facts.len(),
            unknown_facts: belief.unknown_facts.len(),
        });
    }

    fn on_plan(&self, plan: &ExecutionPlan) {
        self.send(AgentEvent::Plan {
            step: plan.step,
            text: plan.plan_details.clone(),
        });
    }

    fn on_tool_call(&self, iteration: usize, tool: &str, args: &Value) {
        self.send(AgentEvent::ToolCall {
            iteration,
            tool: tool.to_string(),
            args: args.clone(),
        });
    }

    fn on_observation(&self, iteration: usize, tool: &str, observation: &str) {
        self.send(AgentEvent::Observation {
            iteration,
            tool: tool.to_string(),
            preview: preview(observation, OBSERVATION_PREVIEW_CHARS),
        });
    }

    fn on_error(&self, iteration: usize, error: &AgentError) {
        self.send(AgentEvent::Error {
            iteration,
            kind: error.kind().to_string(),
            text: error.to_string(),
        });
    }

    fn on_final_answer(&self, iteration: usize, answer: &str, fallback: bool) {
        self.send(AgentEvent::FinalAnswer {
            iteration,
            answer: answer.to_string(),
            fallback,
        });
    }

    fn on_token_usage(&self, usage: &RunTokenUsage) {
        self.send(AgentEvent::TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens(),
            cumulative_total: usage.cumulative_total,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_observer_forwards_events() {
        let (observer, mut rx) = ChannelObserver::channel();
        observer.on_iteration_start(0, 3);
        observer.on_error(0, &AgentError::parsing("bad", "x"));
        observer.on_final_answer(1, "done", false);

        assert_eq!(
            rx.try_recv().unwrap(),
            AgentEvent::IterationStart {
                iteration: 0,
                max_iterations: 3
            }
        );
        match rx.try_recv().unwrap() {
            AgentEvent::Error { kind, .. } => assert_eq!(kind, "parsing"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(rx.try_recv().unwrap(), AgentEvent::FinalAnswer { fallback: false, .. }));
    }

    #[test]
    fn test_usage_between_readings() {
        let usage = RunTokenUsage::between((100, 10, 110), (130, 16, 146));
        assert_eq!(usage.prompt_tokens, 30);
        assert_eq!(usage.completion_tokens, 6);
        assert_eq!(usage.total_tokens(), 36);
        assert_eq!(usage.cumulative_total, 146);
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (observer, rx) = ChannelObserver::channel();
        drop(rx);
        observer.on_iteration_start(0, 1);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = AgentEvent::Observation {
            iteration: 1,
            tool: "get_product_details".into(),
            preview: "Error: product not found".into(),
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "observation");
        assert_eq!(v["tool"], "get_product_details");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(500);
        let p = preview(&long, OBSERVATION_PREVIEW_CHARS);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), OBSERVATION_PREVIEW_CHARS + 3);
    }
}
