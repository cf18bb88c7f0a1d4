//! 信念计算
//!
//! 每个信念周期根据当前记忆让模型给出：Agent 所处阶段（理解 / 调查 / 解决）、已知事实与未知事实。
//! 结果只追加不修改，最新一条为准。模型失败或解析失败都会重试，最多 3 次。

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::{AgentError, RetryPolicy};
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::react::parser::parse_belief;
use crate::react::prompts::{PromptTemplate, BELIEF_STOP};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BeliefState {
    Understanding,
    Investigating,
    Resolution,
}

impl BeliefState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BeliefState::Understanding => "UNDERSTANDING",
            BeliefState::Investigating => "INVESTIGATING",
            BeliefState::Resolution => "RESOLUTION",
        }
    }
}

impl fmt::Display for BeliefState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BeliefState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UNDERSTANDING" => Ok(BeliefState::Understanding),
            "INVESTIGATING" => Ok(BeliefState::Investigating),
            "RESOLUTION" => Ok(BeliefState::Resolution),
            other => Err(format!(
                "unknown belief state {other:?}, expected UNDERSTANDING, INVESTIGATING or RESOLUTION"
            )),
        }
    }
}

impl TryFrom<String> for BeliefState {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BeliefState> for String {
    fn from(state: BeliefState) -> Self {
        state.as_str().to_string()
    }
}

/// 某一步计算出的信念与事实
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeliefFacts {
    pub step: usize,
    pub raw_model_output: String,
    pub belief_state: BeliefState,
    pub belief_explanation: String,
    pub known_facts: Vec<String>,
    pub unknown_facts: Vec<String>,
}

/// 信念生成器：持有 LLM、两段模板与重试边界
pub struct BeliefGenerator {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    user_prompt: String,
    retry: RetryPolicy,
}

impl BeliefGenerator {
    /// system 模板在构造时以领域策略渲染一次
    pub fn new(
        llm: Arc<dyn LlmClient>,
        system: &PromptTemplate,
        user: &PromptTemplate,
        domain_knowledge: &str,
    ) -> Result<Self, AgentError> {
        Ok(Self {
            llm,
            system_prompt: system.render(&[("domain_knowledge", domain_knowledge)])?,
            user_prompt: user.render(&[])?,
            retry: RetryPolicy::immediate(3),
        })
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.retry = self.retry.with_max_attempts(attempts);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry.max_attempts
    }

    fn messages(&self, memory: &[Message]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(memory.len() + 2);
        messages.push(Message::system(self.system_prompt.clone()));
        messages.extend_from_slice(memory);
        messages.push(Message::user(self.user_prompt.clone()));
        messages
    }

    /// 计算 step 处的信念；尝试耗尽后返回 BeliefComputation
    pub async fn generate(&self, step: usize, memory: &[Message]) -> Result<BeliefFacts, AgentError> {
        let messages = self.messages(memory);
        let stop = vec![BELIEF_STOP.to_string()];
        let result = self
            .retry
            .run(
                |attempt| {
                    let messages = &messages;
                    let stop = &stop;
                    async move {
                        let output = self
                            .llm
                            .complete(messages, stop)
                            .await
                            .map_err(AgentError::ModelInvocation)?;
                        let raw = parse_belief(&output).map_err(|e| {
                            tracing::warn!(step, attempt, error = %e, "belief parse failed");
                            e
                        })?;
                        Ok::<_, AgentError>(BeliefFacts {
                            step,
                            raw_model_output: output,
                            belief_state: raw.belief_state,
                            belief_explanation: raw.belief_explanation,
                            known_facts: raw.known_facts,
                            unknown_facts: raw.unknown_facts,
                        })
                    }
                },
                |_| true,
            )
            .await;
        result.map_err(|exhausted| AgentError::BeliefComputation {
            attempts: exhausted.attempts,
            last_error: exhausted.last_error.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, MockReply};
    use crate::react::prompts::PromptSet;

    const GOOD: &str = r#"BeliefWithFacts:
{"belief_state": "UNDERSTANDING", "belief_explanation": "New request.", "known_facts": ["wants exchange"], "unknown_facts": ["order id"]}"#;

    fn generator(mock: Arc<MockLlmClient>) -> BeliefGenerator {
        let set = PromptSet::builtin().unwrap();
        BeliefGenerator::new(mock, &set.belief_system, &set.belief_user, "POLICY TEXT").unwrap()
    }

    #[tokio::test]
    async fn test_generate_sends_policy_and_stop() {
        let mock = Arc::new(MockLlmClient::new().with_texts(Some(BELIEF_STOP), &[GOOD]));
        let facts = generator(mock.clone())
            .generate(4, &[Message::user("Task: exchange")])
            .await
            .unwrap();
        assert_eq!(facts.step, 4);
        assert_eq!(facts.belief_state, BeliefState::Understanding);
        assert_eq!(facts.unknown_facts, vec!["order id"]);
        assert_eq!(facts.raw_model_output, GOOD);

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].stop, vec![BELIEF_STOP.to_string()]);
        assert!(calls[0].messages[0].content.contains("POLICY TEXT"));
        assert_eq!(calls[0].messages.len(), 3);
    }

    #[tokio::test]
    async fn test_recovers_on_second_attempt() {
        let mock = Arc::new(
            MockLlmClient::new().with_replies(
                Some(BELIEF_STOP),
                vec![MockReply::text("not json"), MockReply::text(GOOD)],
            ),
        );
        let facts = generator(mock.clone()).generate(0, &[]).await.unwrap();
        assert_eq!(facts.known_facts, vec!["wants exchange"]);
        assert_eq!(mock.call_count_with(BELIEF_STOP), 2);
    }

    #[tokio::test]
    async fn test_fails_after_exactly_three_attempts() {
        let mock = Arc::new(MockLlmClient::new().with_replies(
            Some(BELIEF_STOP),
            vec![
                MockReply::error("overloaded"),
                MockReply::text("{broken"),
                MockReply::text("still not json"),
                MockReply::text(GOOD),
            ],
        ));
        let err = generator(mock.clone()).generate(0, &[]).await.unwrap_err();
        match err {
            AgentError::BeliefComputation { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(mock.call_count_with(BELIEF_STOP), 3);
    }

    #[test]
    fn test_belief_state_parse() {
        assert_eq!("resolution".parse::<BeliefState>().unwrap(), BeliefState::Resolution);
        assert!("done".parse::<BeliefState>().is_err());
    }
}
