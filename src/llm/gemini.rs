//! Gemini generateContent 客户端（reqwest）
//!
//! 角色映射：assistant / tool-call -> `model`，user / tool-response -> `user`；
//! system 消息抽出放入 `systemInstruction`（保留第一条）。

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::RetryPolicy;
use crate::llm::normalize::merge_consecutive;
use crate::llm::traits::call_with_retry;
use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const TEMPERATURE: f64 = 0.3;
const TOP_P: f64 = 0.9;
const MAX_OUTPUT_TOKENS: u32 = 4096;

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    retry: RetryPolicy,
    timeout: Duration,
}

impl GeminiClient {
    /// api_key 为 None 时依次读取 GEMINI_API_KEY、GOOGLE_API_KEY
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Result<Self, LlmError> {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .ok_or_else(|| LlmError::MissingApiKey("GEMINI_API_KEY".to_string()))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: base_url
                .unwrap_or(GEMINI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            api_key,
            retry: RetryPolicy::rate_limit(),
            timeout: Duration::from_secs(60),
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
            Role::Assistant | Role::ToolCall => "model",
        }
    }

    /// 构造 generateContent 请求体
    pub fn build_request(&self, messages: &[Message], stop: &[String]) -> Value {
        let system = messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.clone());
        let rest: Vec<Message> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect();

        let contents: Vec<Value> = merge_consecutive(&rest, Self::provider_role)
            .into_iter()
            .map(|(role, text)| json!({ "role": role, "parts": [{ "text": text }] }))
            .collect();

        let mut generation_config = json!({
            "maxOutputTokens": MAX_OUTPUT_TOKENS,
            "temperature": TEMPERATURE,
            "topP": TOP_P,
        });
        if !stop.is_empty() {
            generation_config["stopSequences"] = json!(stop);
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": generation_config,
        });
        if let Some(text) = system {
            body["systemInstruction"] = json!({ "parts": [{ "text": text }] });
        }
        body
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    async fn send_once(&self, body: &Value) -> Result<String, LlmError> {
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited { attempts: 1 });
        }
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;
        if !status.is_success() {
            if text.contains("RESOURCE_EXHAUSTED") {
                return Err(LlmError::RateLimited { attempts: 1 });
            }
            return Err(LlmError::Api {
                status: Some(status.as_u16()),
                message: text,
            });
        }

        let value: Value =
            serde_json::from_str(&text).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        extract_text(&value)
    }
}

/// 取 candidates[0].content.parts[*].text 拼接
pub fn extract_text(response: &Value) -> Result<String, LlmError> {
    let parts = response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::InvalidResponse(format!("no candidate content in {response}")))?;
    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .concat())
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, messages: &[Message], stop: &[String]) -> Result<String, LlmError> {
        let body = self.build_request(messages, stop);
        tracing::debug!(model = %self.model, messages = messages.len(), "gemini request");
        call_with_retry(&self.retry, self.timeout, || self.send_once(&body)).await
    }

    fn model(&self) -> &str {
        &self.model
    }
}
