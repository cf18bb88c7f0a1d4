//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / inputs / call），由 ToolRegistry 按名注册与查找。
//! dispatch 负责三类错误：未知工具、参数形状非法、工具内部失败（附带工具文档）。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::AgentError;

/// 单个参数的说明（type / description，其余 schema 字段原样保留）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInput {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ToolInput {
    pub fn string(description: impl Into<String>) -> Self {
        Self {
            kind: "string".to_string(),
            description: description.into(),
            extra: Map::new(),
        }
    }
}

/// 参数名 -> 参数说明（有序，保证渲染稳定）
pub type ToolInputs = BTreeMap<String, ToolInput>;

/// 工具调用参数：具名映射或单个文本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolArguments {
    Named(Map<String, Value>),
    Text(String),
}

impl Default for ToolArguments {
    fn default() -> Self {
        ToolArguments::Named(Map::new())
    }
}

impl ToolArguments {
    /// null 归一为空映射；映射与字符串之外的形状报 InvalidArgumentShape
    pub fn from_value(value: Value) -> Result<Self, AgentError> {
        match value {
            Value::Null => Ok(ToolArguments::default()),
            Value::Object(map) => Ok(ToolArguments::Named(map)),
            Value::String(s) => Ok(ToolArguments::Text(s)),
            other => Err(AgentError::InvalidArgumentShape(format!(
                "a {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            ToolArguments::Named(map) => map.get(key),
            ToolArguments::Text(_) => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// 具名参数取 key；文本参数直接作为该参数
    pub fn text_or(&self, key: &str) -> Option<&str> {
        match self {
            ToolArguments::Named(_) => self.get_str(key),
            ToolArguments::Text(s) => Some(s),
        }
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数说明、异步执行
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（对应 action JSON 中的 "action" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    fn inputs(&self) -> ToolInputs;

    fn output_type(&self) -> &str {
        "string"
    }

    /// 执行工具；Err 为给模型看的失败原因
    async fn call(&self, args: ToolArguments) -> Result<String, String>;

    /// 渲染为 prompt 中的工具文档
    fn describe(&self) -> String {
        let inputs = serde_json::to_string(&self.inputs()).unwrap_or_else(|_| "{}".to_string());
        format!(
            "- {}: {}\n    Takes inputs: {}\n    Returns an output of type: {}",
            self.name(),
            self.description(),
            inputs,
            self.output_type()
        )
    }
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "tool re-registered, previous definition replaced");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// 已注册工具名（字典序）
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 全部工具文档，每个工具一段
    pub fn describe_all(&self) -> String {
        self.tools
            .values()
            .map(|t| t.describe())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 按名调用：先查名字，再校验参数形状，工具失败转为 ToolExecution
    pub async fn dispatch(&self, name: &str, raw_args: Value) -> Result<String, AgentError> {
        let tool = self.get(name).ok_or_else(|| AgentError::UnknownTool {
            name: name.to_string(),
            available: self.tool_names(),
        })?;
        let args = ToolArguments::from_value(raw_args)?;
        tool.call(args)
            .await
            .map_err(|message| AgentError::ToolExecution {
                tool: name.to_string(),
                message,
                description: tool.describe(),
            })
    }
}
