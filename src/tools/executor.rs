//! 工具执行器
//!
//! 持有 ToolRegistry 与单次调用超时，execute(tool_name, args) 在超时内调用 registry.dispatch；
//! 超时转为 ToolExecution；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::ToolRegistry;

/// 工具执行器：对每次调用施加超时
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn with_timeout(registry: ToolRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// 执行指定工具并输出 JSON 审计日志
    pub async fn execute(&self, tool_name: &str, args: Value) -> Result<String, AgentError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.registry.dispatch(tool_name, args)).await;

        let outcome = match &result {
            Ok(Ok(_)) => "ok",
            Ok(Err(e)) => e.kind(),
            Err(_) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": matches!(result, Ok(Ok(_))),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "tool");

        match result {
            Ok(r) => r,
            Err(_) => {
                let description = self
                    .registry
                    .get(tool_name)
                    .map(|t| t.describe())
                    .unwrap_or_default();
                Err(AgentError::ToolExecution {
                    tool: tool_name.to_string(),
                    message: format!("tool timed out after {:?}", self.timeout),
                    description,
                })
            }
        }
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Tool, ToolArguments, ToolInputs};
    use async_trait::async_trait;
    use serde_json::json;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        fn inputs(&self) -> ToolInputs {
            ToolInputs::new()
        }

        async fn call(&self, _args: ToolArguments) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("done".to_string())
        }
    }

    #[tokio::test]
    async fn test_timeout_becomes_tool_execution() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let executor = ToolExecutor::with_timeout(registry, Duration::from_millis(20));
        let err = executor.execute("slow", json!({})).await.unwrap_err();
        match err {
            AgentError::ToolExecution {
                message,
                description,
                ..
            } => {
                assert!(message.contains("timed out"));
                assert!(description.starts_with("- slow:"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = json!({ "text": "x".repeat(500) });
        let preview = args_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 203);
    }
}
