//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Gemini / Mock）实现 LlmClient：有序消息 + 停止序列 -> 完成文本。
//! 限流重试与单次调用超时在后端内部完成（见 `call_with_retry`），调用方只看到最终结果。

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::core::RetryPolicy;
use crate::memory::{validate_messages, Message};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// 模型调用错误
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("API error{}: {message}", .status.map(|s| format!(" {s}")).unwrap_or_default())]
    Api { status: Option<u16>, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Missing API key: environment variable {0} not set")]
    MissingApiKey(String),

    /// Mock 脚本中预设的失败
    #[error("Scripted failure: {0}")]
    Script(String),
}

impl LlmError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    pub fn is_retryable(&self) -> bool {
        self.is_rate_limit()
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成；生成在任一停止序列处截断
    async fn complete(&self, messages: &[Message], stop: &[String]) -> Result<String, LlmError>;

    /// 接收原始 JSON 消息：先校验键集合与角色，再走 complete
    async fn complete_raw(&self, raw: &[Value], stop: &[String]) -> Result<String, LlmError> {
        let messages = validate_messages(raw)?;
        self.complete(&messages, stop).await
    }

    /// 当前模型名
    fn model(&self) -> &str;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 单次调用超时 + 限流退避重试。op 每次返回一个新的请求 future。
pub(crate) async fn call_with_retry<F, Fut>(
    policy: &RetryPolicy,
    timeout: Duration,
    mut op: F,
) -> Result<String, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, LlmError>>,
{
    let result = policy
        .run(
            |attempt| {
                let fut = op();
                async move {
                    match tokio::time::timeout(timeout, fut).await {
                        Ok(r) => {
                            if let Err(ref e) = r {
                                if e.is_rate_limit() {
                                    tracing::warn!(attempt, "LLM rate limited, backing off");
                                }
                            }
                            r
                        }
                        Err(_) => Err(LlmError::Timeout(timeout)),
                    }
                }
            },
            LlmError::is_retryable,
        )
        .await;

    result.map_err(|exhausted| match exhausted.last_error {
        LlmError::RateLimited { .. } => LlmError::RateLimited {
            attempts: exhausted.attempts,
        },
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_llm_error_is_retryable() {
        assert!(LlmError::RateLimited { attempts: 1 }.is_retryable());
        assert!(!LlmError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!LlmError::InvalidMessage("x".into()).is_retryable());
    }

    #[test]
    fn test_api_error_display() {
        let e = LlmError::Api {
            status: Some(500),
            message: "boom".into(),
        };
        assert_eq!(e.to_string(), "API error 500: boom");
        let e = LlmError::Api {
            status: None,
            message: "boom".into(),
        };
        assert_eq!(e.to_string(), "API error: boom");
    }

    #[tokio::test]
    async fn test_call_with_retry_reports_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(4);
        let err = call_with_retry(&policy, Duration::from_secs(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::RateLimited { attempts: 1 }) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, LlmError::RateLimited { attempts: 4 }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_call_with_retry_timeout() {
        let policy = RetryPolicy::immediate(1);
        let err = call_with_retry(&policy, Duration::from_millis(10), || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, LlmError::Timeout(_)));
    }
}
