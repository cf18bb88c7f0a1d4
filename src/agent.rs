//! Agent 组装
//!
//! create_llm_from_config / create_user_llm 按配置构建模型客户端（缺少 API Key 时回退到 Mock），
//! build_toolbox 为单个任务构建绑定到该任务数据集与用户模拟器的工具集，
//! load_policy 读取领域策略文本。

use std::path::Path;
use std::sync::Arc;

use crate::config::{AppConfig, LlmSection};
use crate::core::AgentError;
use crate::domain::{retail_tools, Dataset, UserSimulator, DEFAULT_POLICY};
use crate::llm::{GeminiClient, LlmClient, MockLlmClient, OpenAiClient};
use crate::tools::{FinalAnswerTool, RespondToCustomerTool, ToolRegistry};

/// 按 provider 与 model 创建客户端；backend 创建失败（通常是没有 key）时回退到 Mock
pub fn create_llm(provider: &str, model: &str, section: &LlmSection) -> Arc<dyn LlmClient> {
    let base = section.base_url.as_deref();
    match provider.to_lowercase().as_str() {
        "openai" => match OpenAiClient::new(base, model, None) {
            Ok(client) => {
                tracing::info!("Using OpenAI LLM ({})", model);
                Arc::new(
                    client
                        .with_retry(section.retry_policy())
                        .with_timeout(section.request_timeout()),
                )
            }
            Err(e) => {
                tracing::warn!(error = %e, "OpenAI client unavailable, using Mock LLM");
                Arc::new(MockLlmClient::new())
            }
        },
        "gemini" | "google" => match GeminiClient::new(base, model, None) {
            Ok(client) => {
                tracing::info!("Using Gemini LLM ({})", model);
                Arc::new(
                    client
                        .with_retry(section.retry_policy())
                        .with_timeout(section.request_timeout()),
                )
            }
            Err(e) => {
                tracing::warn!(error = %e, "Gemini client unavailable, using Mock LLM");
                Arc::new(MockLlmClient::new())
            }
        },
        "mock" => {
            tracing::info!("Using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
        other => {
            tracing::warn!(provider = other, "Unknown LLM provider, using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
    }
}

/// Agent 使用的模型
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    create_llm(&cfg.llm.provider, &cfg.llm.model, &cfg.llm)
}

/// 用户模拟器使用的模型（共用 [llm] 的超时与重试设置）
pub fn create_user_llm(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    create_llm(&cfg.user.provider, &cfg.user.model, &cfg.llm)
}

/// 单个任务的工具集：零售工具 + respond_customer + final_answer
pub fn build_toolbox(dataset: &Dataset, user: Arc<dyn UserSimulator>) -> Result<ToolRegistry, AgentError> {
    let mut tools = ToolRegistry::new();
    for tool in retail_tools(dataset)? {
        tools.register(tool);
    }
    tools.register(RespondToCustomerTool::new(user));
    tools.register(FinalAnswerTool);
    Ok(tools)
}

/// 读取策略文件；未指定时用内置零售策略
pub fn load_policy(path: Option<&Path>) -> Result<String, AgentError> {
    match path {
        Some(p) => Ok(std::fs::read_to_string(p)?),
        None => Ok(DEFAULT_POLICY.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ScriptedUser;
    use crate::tools::{FINAL_ANSWER, RESPOND_CUSTOMER};
    use serde_json::json;

    #[test]
    fn test_toolbox_contents() {
        let dataset = Dataset::from_value(json!({"users": {}, "orders": {}, "products": {}}));
        let user: Arc<dyn UserSimulator> = Arc::new(ScriptedUser::new(["ok"]));
        let tools = build_toolbox(&dataset, user).unwrap();
        let names = tools.tool_names();
        assert!(names.contains(&RESPOND_CUSTOMER.to_string()));
        assert!(names.contains(&FINAL_ANSWER.to_string()));
        assert!(names.contains(&"get_product_details".to_string()));
        assert!(names.contains(&"list_all_product_types".to_string()));
        assert_eq!(names.len(), 10);
    }

    #[test]
    fn test_mock_provider() {
        let cfg = AppConfig::default();
        let llm = create_llm("mock", "m", &cfg.llm);
        assert_eq!(llm.model(), "mock");
    }

    #[test]
    fn test_policy_default_and_file() {
        assert_eq!(load_policy(None).unwrap(), DEFAULT_POLICY);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.md");
        std::fs::write(&path, "be nice").unwrap();
        assert_eq!(load_policy(Some(&path)).unwrap(), "be nice");
    }
}
