//! 用户模拟
//!
//! respond_customer 工具是 Agent 与客户交流的唯一通道，其背后是 UserSimulator：
//! `reset` 根据任务指令给出客户的开场白，`step` 根据 Agent 的话给出客户的下一句。
//! 客户认为目标已达成时回复 `###STOP###`。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;

/// 会话结束标记
pub const STOP_TOKEN: &str = "###STOP###";

#[async_trait]
pub trait UserSimulator: Send + Sync {
    /// 开始新会话，返回客户第一句话
    async fn reset(&self, instruction: &str) -> Result<String, LlmError>;

    /// 给出客户对 content 的回复
    async fn step(&self, content: &str) -> Result<String, LlmError>;
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 脚本用户：开场白（默认即指令）+ 固定回复序列，耗尽后返回 STOP_TOKEN
#[derive(Debug, Default)]
pub struct ScriptedUser {
    opening: Option<String>,
    script: Vec<String>,
    pending: Mutex<VecDeque<String>>,
    received: Mutex<Vec<String>>,
}

impl ScriptedUser {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let script: Vec<String> = replies.into_iter().map(Into::into).collect();
        Self {
            opening: None,
            pending: Mutex::new(script.iter().cloned().collect()),
            script,
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn with_opening(mut self, opening: impl Into<String>) -> Self {
        self.opening = Some(opening.into());
        self
    }

    /// Agent 通过 step 发来的全部内容
    pub fn received(&self) -> Vec<String> {
        lock(&self.received).clone()
    }
}

#[async_trait]
impl UserSimulator for ScriptedUser {
    async fn reset(&self, instruction: &str) -> Result<String, LlmError> {
        *lock(&self.pending) = self.script.iter().cloned().collect();
        lock(&self.received).clear();
        Ok(self
            .opening
            .clone()
            .unwrap_or_else(|| instruction.to_string()))
    }

    async fn step(&self, content: &str) -> Result<String, LlmError> {
        lock(&self.received).push(content.to_string());
        Ok(lock(&self.pending)
            .pop_front()
            .unwrap_or_else(|| STOP_TOKEN.to_string()))
    }
}

fn user_system_prompt(instruction: &str) -> String {
    format!(
        "You are a user interacting with an agent.

Instruction: {instruction}

Rules:
- Just generate one line at a time to simulate the user's message.
- Do not give away all the instruction at once. Only provide the information that is necessary for the current step.
- Do not hallucinate information that is not provided in the instruction. For example, if the agent asks for the order id but it is not mentioned in the instruction, do not make up an order id, just say you do not remember or have it.
- If the instruction goal is satisified, generate '{STOP_TOKEN}' as a standalone message without anything else to end the conversation.
- Do not repeat the exact instruction in the conversation. Instead, use your own words to convey the same information.
- Try to make the conversation as natural as possible, and stick to the personalities in the instruction."
    )
}

/// 由 LLM 扮演客户。模型视角下 Agent 的话是 user，客户的话是 assistant。
pub struct LlmUserSimulator {
    llm: Arc<dyn LlmClient>,
    history: Mutex<Vec<Message>>,
}

impl LlmUserSimulator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            history: Mutex::new(Vec::new()),
        }
    }

    async fn generate(&self, agent_turn: String) -> Result<String, LlmError> {
        let messages = {
            let mut history = lock(&self.history);
            history.push(Message::user(agent_turn));
            history.clone()
        };
        let reply = self.llm.complete(&messages, &[]).await?;
        let reply = reply.trim().to_string();
        lock(&self.history).push(Message::assistant(reply.clone()));
        Ok(reply)
    }

    pub fn history(&self) -> Vec<Message> {
        lock(&self.history).clone()
    }
}

#[async_trait]
impl UserSimulator for LlmUserSimulator {
    async fn reset(&self, instruction: &str) -> Result<String, LlmError> {
        *lock(&self.history) = vec![Message::system(user_system_prompt(instruction))];
        self.generate("Hi! How can I help you today?".to_string()).await
    }

    async fn step(&self, content: &str) -> Result<String, LlmError> {
        self.generate(content.to_string()).await
    }
}
