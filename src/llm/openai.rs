//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）。
//! 角色映射：tool-response -> user，tool-call -> assistant；映射后合并相邻同角色消息。

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::CreateChatCompletionRequest;
use async_openai::Client;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::RetryPolicy;
use crate::llm::normalize::merge_consecutive;
use crate::llm::traits::call_with_retry;
use crate::llm::{LlmClient, LlmError, TokenUsage};
use crate::memory::{Message, Role};

const TEMPERATURE: f64 = 0.5;

/// OpenAI 兼容客户端
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    retry: RetryPolicy,
    timeout: Duration,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    /// api_key 为 None 时读取 OPENAI_API_KEY；都没有则返回 MissingApiKey
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Result<Self, LlmError> {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| LlmError::MissingApiKey("OPENAI_API_KEY".to_string()))?;

        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };

        Ok(Self {
            client: Client::with_config(config),
            model: model.to_string(),
            retry: RetryPolicy::rate_limit(),
            timeout: Duration::from_secs(60),
            usage: TokenUsage::new(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn provider_role(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User | Role::ToolResponse => "user",
            Role::Assistant | Role::ToolCall => "assistant",
        }
    }

    /// 构造请求体（JSON），角色已映射并合并
    pub fn build_request(&self, messages: &[Message], stop: &[String]) -> Value {
        let messages: Vec<Value> = merge_consecutive(messages, Self::provider_role)
            .into_iter()
            .map(|(role, content)| json!({ "role": role, "content": content }))
            .collect();
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": TEMPERATURE,
        });
        if !stop.is_empty() {
            body["stop"] = json!(stop);
        }
        body
    }

    async fn send_once(&self, body: Value) -> Result<String, LlmError> {
        let request: CreateChatCompletionRequest =
            serde_json::from_value(body).map_err(|e| LlmError::InvalidRequest(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(classify_error)?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        Ok(content)
    }
}

/// 把 async_openai 错误归类：限流 -> RateLimited，网络 -> Network，其余 -> Api
fn classify_error(err: OpenAIError) -> LlmError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("rate limit") || lower.contains("429") || lower.contains("rate_limit") {
        return LlmError::RateLimited { attempts: 1 };
    }
    match err {
        OpenAIError::Reqwest(_) => LlmError::Network(message),
        OpenAIError::JSONDeserialize(..) => LlmError::InvalidResponse(message),
        _ => LlmError::Api {
            status: None,
            message,
        },
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message], stop: &[String]) -> Result<String, LlmError> {
        let body = self.build_request(messages, stop);
        tracing::debug!(model = %self.model, messages = messages.len(), "openai request");
        call_with_retry(&self.retry, self.timeout, || self.send_once(body.clone())).await
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }
}
