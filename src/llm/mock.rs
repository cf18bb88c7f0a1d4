//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按停止序列路由脚本化回复：belief / plan / act 各自一条队列，依次弹出，耗尽后重复最后一条
//! （strict 模式下改为报错）。未配置路由的调用走默认回复，便于本地无 key 跑通整个循环。
//! 每次调用的消息与停止序列都会被记录；可为每次调用设定固定的 token 用量。

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, TokenUsage};
use crate::memory::{Message, Role};
use crate::react::prompts::{ACT_STOP, BELIEF_STOP, PLAN_STOP};

/// 一条预设回复
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Error(LlmError),
}

impl MockReply {
    pub fn text(s: impl Into<String>) -> Self {
        MockReply::Text(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        MockReply::Error(LlmError::Script(s.into()))
    }
}

/// 被记录的一次调用
#[derive(Debug, Clone)]
pub struct MockCall {
    pub messages: Vec<Message>,
    pub stop: Vec<String>,
}

#[derive(Debug)]
struct Route {
    /// Some(m)：停止序列包含 m 的调用；None：无停止序列的调用
    marker: Option<String>,
    queue: VecDeque<MockReply>,
    last: Option<MockReply>,
}

impl Route {
    fn matches(&self, stop: &[String]) -> bool {
        match &self.marker {
            Some(m) => stop.iter().any(|s| s == m),
            None => stop.is_empty(),
        }
    }
}

/// Mock 客户端
#[derive(Debug)]
pub struct MockLlmClient {
    model: String,
    strict: bool,
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<MockCall>>,
    usage_per_call: (u64, u64),
    usage: TokenUsage,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            model: "mock".to_string(),
            strict: false,
            routes: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            usage_per_call: (0, 0),
            usage: TokenUsage::new(),
        }
    }

    /// 为某一停止标记配置回复队列（None 表示无停止序列的调用，如 fallback）
    pub fn with_replies<I>(self, marker: Option<&str>, replies: I) -> Self
    where
        I: IntoIterator<Item = MockReply>,
    {
        lock(&self.routes).push(Route {
            marker: marker.map(String::from),
            queue: replies.into_iter().collect(),
            last: None,
        });
        self
    }

    pub fn with_texts(self, marker: Option<&str>, replies: &[&str]) -> Self {
        self.with_replies(marker, replies.iter().map(|r| MockReply::text(*r)))
    }

    /// 每次调用累计 prompt / completion token
    pub fn with_usage_per_call(mut self, prompt: u64, completion: u64) -> Self {
        self.usage_per_call = (prompt, completion);
        self
    }

    /// 队列耗尽时报错而不是重复最后一条
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    /// 停止序列包含 marker 的调用次数
    pub fn call_count_with(&self, marker: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.stop.iter().any(|s| s == marker))
            .count()
    }

    fn scripted(&self, stop: &[String]) -> Option<MockReply> {
        let mut routes = lock(&self.routes);
        let route = routes.iter_mut().find(|r| r.matches(stop))?;
        match route.queue.pop_front() {
            Some(reply) => {
                route.last = Some(reply.clone());
                Some(reply)
            }
            None if self.strict => Some(MockReply::error("mock script exhausted")),
            None => route.last.clone(),
        }
    }
}

fn last_user_text(messages: &[Message]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| matches!(m.role, Role::User))
        .map(|m| m.content.as_str())
        .unwrap_or("(no input)")
}

/// 未配置脚本时的默认回复
fn default_reply(messages: &[Message], stop: &[String]) -> String {
    let has = |marker: &str| stop.iter().any(|s| s == marker);
    if has(BELIEF_STOP) {
        r#"{"belief_state": "UNDERSTANDING", "belief_explanation": "Mock belief.", "known_facts": ["The customer described a request."], "unknown_facts": []}"#
            .to_string()
    } else if has(PLAN_STOP) {
        "1. Answer the customer request directly.\n".to_string()
    } else if has(ACT_STOP) {
        let answer = serde_json::to_string(&format!("Echo from Mock: {}", last_user_text(messages)))
            .unwrap_or_else(|_| "\"\"".to_string());
        format!(
            "Thought: I can answer directly.\nAction:\n{{\"action\": \"final_answer\", \"action_input\": {{\"answer\": {answer}}}}}"
        )
    } else {
        format!("Echo from Mock: {}", last_user_text(messages))
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message], stop: &[String]) -> Result<String, LlmError> {
        lock(&self.calls).push(MockCall {
            messages: messages.to_vec(),
            stop: stop.to_vec(),
        });
        self.usage.add(self.usage_per_call.0, self.usage_per_call.1);
        match self.scripted(stop) {
            Some(MockReply::Text(t)) => Ok(t),
            Some(MockReply::Error(e)) => Err(e),
            None => Ok(default_reply(messages, stop)),
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }
}
