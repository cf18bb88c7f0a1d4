//! Agent 错误类型
//!
//! 与循环的恢复策略配合：`is_agent_level()` 为 true 的错误在单轮迭代边界被捕获、写入 StepLogEntry，
//! 作为下一轮上下文；其余错误（配置、IO、模板等编程错误）直接向上传播。

use thiserror::Error;

use crate::llm::LlmError;

/// Agent 运行过程中可能出现的错误（解析、工具、模型调用、信念/计划计算等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 模型输出格式错误：缺少分隔标记、JSON 非法或缺少必需键
    #[error("Error: {message}\nYour output:\n{text}")]
    Parsing { message: String, text: String },

    #[error("Error: unknown tool {name}, should be instead one of [{}].", .available.join(", "))]
    UnknownTool { name: String, available: Vec<String> },

    #[error("Arguments passed to tool should be a dict or string: got {0}.")]
    InvalidArgumentShape(String),

    /// 工具内部失败：附带工具文档，便于模型自我纠正
    #[error(
        "Error in tool call execution: {message}\nYou should only use this tool with a correct input.\nAs a reminder, this tool's description is the following:\n{description}"
    )]
    ToolExecution {
        tool: String,
        message: String,
        description: String,
    },

    /// Act 阶段生成失败
    #[error("Error in generating llm output: {0}.")]
    Generation(LlmError),

    /// 计划等阶段的模型调用失败（不重试，原样上抛）
    #[error("Model invocation failed: {0}")]
    ModelInvocation(#[from] LlmError),

    #[error("Belief computation failed after {attempts} attempts: {last_error}")]
    BeliefComputation { attempts: u32, last_error: String },

    #[error("Facts not computed before computing plan @step: {step}")]
    PlanWithoutBelief { step: usize },

    #[error("No execution plan available before acting @step: {step}")]
    PlanMissing { step: usize },

    #[error("Reached max iterations ({0}).")]
    MaxIterations(usize),

    #[error("Cancelled")]
    Cancelled,

    #[error("Prompt template error: {0}")]
    Template(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// 构造解析错误
    pub fn parsing(message: impl Into<String>, text: impl Into<String>) -> Self {
        AgentError::Parsing {
            message: message.into(),
            text: text.into(),
        }
    }

    /// 是否为 Agent 级错误（可在迭代边界恢复）
    pub fn is_agent_level(&self) -> bool {
        matches!(
            self,
            AgentError::Parsing { .. }
                | AgentError::UnknownTool { .. }
                | AgentError::InvalidArgumentShape(_)
                | AgentError::ToolExecution { .. }
                | AgentError::Generation(_)
                | AgentError::ModelInvocation(_)
                | AgentError::BeliefComputation { .. }
                | AgentError::PlanWithoutBelief { .. }
                | AgentError::PlanMissing { .. }
                | AgentError::MaxIterations(_)
        )
    }

    /// 错误类别名（写入步骤日志与事件）
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Parsing { .. } => "parsing",
            AgentError::UnknownTool { .. } => "unknown_tool",
            AgentError::InvalidArgumentShape(_) => "invalid_argument_shape",
            AgentError::ToolExecution { .. } => "tool_execution",
            AgentError::Generation(_) => "generation",
            AgentError::ModelInvocation(_) => "model_invocation",
            AgentError::BeliefComputation { .. } => "belief_computation",
            AgentError::PlanWithoutBelief { .. } => "plan_without_belief",
            AgentError::PlanMissing { .. } => "plan_missing",
            AgentError::MaxIterations(_) => "max_iterations",
            AgentError::Cancelled => "cancelled",
            AgentError::Template(_) => "template",
            AgentError::Config(_) => "config",
            AgentError::Io(_) => "io",
            AgentError::Json(_) => "json",
        }
    }
}
