//! Planner：基于最新信念起草或修订执行计划
//!
//! 计划必须以一条已有信念为前提；单次调用，模型失败原样上抛（ModelInvocation），不重试。

use std::sync::Arc;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::react::belief::BeliefFacts;
use crate::react::prompts::{PromptTemplate, PLAN_STOP};

/// 某一步生成的执行计划，引用其依据的信念
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub step: usize,
    pub belief_facts_used: Arc<BeliefFacts>,
    pub plan_details: String,
}

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system: PromptTemplate,
    user: PromptTemplate,
    domain_knowledge: String,
    tool_descriptions: String,
}

impl Planner {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        system: PromptTemplate,
        user: PromptTemplate,
        domain_knowledge: impl Into<String>,
        tool_descriptions: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            system,
            user,
            domain_knowledge: domain_knowledge.into(),
            tool_descriptions: tool_descriptions.into(),
        }
    }

    pub async fn plan(
        &self,
        step: usize,
        task: &str,
        memory: &[Message],
        belief: Option<&Arc<BeliefFacts>>,
        previous: Option<&ExecutionPlan>,
    ) -> Result<ExecutionPlan, AgentError> {
        let belief = belief.ok_or(AgentError::PlanWithoutBelief { step })?;

        let previous_plan = previous
            .map(|p| format!("Your previous prepared plan:\n{}", p.plan_details))
            .unwrap_or_default();
        let known = belief.known_facts.join("\n");
        let unknown = belief.unknown_facts.join("\n");

        let mut messages = Vec::with_capacity(memory.len() + 2);
        messages.push(Message::system(self.system.render(&[("task", task)])?));
        messages.extend_from_slice(memory);
        messages.push(Message::user(self.user.render(&[
            ("task", task),
            ("domain_knowledge", &self.domain_knowledge),
            ("known_facts", &known),
            ("unknown_facts", &unknown),
            ("tool_descriptions", &self.tool_descriptions),
            ("previous_plan", &previous_plan),
        ])?));

        let plan_details = self
            .llm
            .complete(&messages, &[PLAN_STOP.to_string()])
            .await?;

        Ok(ExecutionPlan {
            step,
            belief_facts_used: Arc::clone(belief),
            plan_details,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, MockReply};
    use crate::react::belief::BeliefState;
    use crate::react::prompts::PromptSet;

    fn belief() -> Arc<BeliefFacts> {
        Arc::new(BeliefFacts {
            step: 0,
            raw_model_output: String::new(),
            belief_state: BeliefState::Investigating,
            belief_explanation: "checking".into(),
            known_facts: vec!["user wants watch".into()],
            unknown_facts: vec!["product id validity".into()],
        })
    }

    fn planner(mock: Arc<MockLlmClient>) -> Planner {
        let set = PromptSet::builtin().unwrap();
        Planner::new(mock, set.plan_system, set.plan_user, "POLICY", "- get_product_details: x")
    }

    #[tokio::test]
    async fn test_requires_belief() {
        let mock = Arc::new(MockLlmClient::new());
        let err = planner(mock.clone())
            .plan(3, "task", &[], None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::PlanWithoutBelief { step: 3 }));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_plan_prompt_includes_facts_and_previous_plan() {
        let mock = Arc::new(MockLlmClient::new().with_texts(Some(PLAN_STOP), &["1. a", "1. b"]));
        let p = planner(mock.clone());
        let b = belief();
        let first = p.plan(0, "exchange watch", &[], Some(&b), None).await.unwrap();
        assert_eq!(first.plan_details, "1. a");
        assert!(Arc::ptr_eq(&first.belief_facts_used, &b));

        let second = p
            .plan(4, "exchange watch", &[], Some(&b), Some(&first))
            .await
            .unwrap();
        assert_eq!(second.plan_details, "1. b");

        let calls = mock.calls();
        let user = &calls[1].messages.last().unwrap().content;
        assert!(user.contains("Your previous prepared plan:\n1. a"));
        assert!(user.contains("user wants watch"));
        assert!(user.contains("product id validity"));
        assert!(calls[0].messages[0].content.contains("exchange watch"));
        assert!(!calls[0].messages.last().unwrap().content.contains("previous prepared plan"));
    }

    #[tokio::test]
    async fn test_model_failure_not_retried() {
        let mock = Arc::new(
            MockLlmClient::new().with_replies(Some(PLAN_STOP), vec![MockReply::error("down")]),
        );
        let err = planner(mock.clone())
            .plan(0, "t", &[], Some(&belief()), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "model_invocation");
        assert_eq!(mock.call_count_with(PLAN_STOP), 1);
    }
}
