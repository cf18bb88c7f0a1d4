//! 外部工具适配
//!
//! 外部工具以 OpenAI function-calling 形状描述（`{type: "function", function: {name, description,
//! parameters: {properties, required}}}`），配一个同步处理函数。构造时一次性归一为 DatasetTool，
//! 绑定到当前任务的 Dataset。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::domain::Dataset;
use crate::tools::{Tool, ToolArguments, ToolInputs};

/// 处理函数：在数据集上执行并返回观察文本；Err 为参数类错误
pub type ToolHandler = fn(&mut Value, &Map<String, Value>) -> Result<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionParameters {
    #[serde(default)]
    pub properties: ToolInputs,
    #[serde(default)]
    pub required: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parameters: FunctionParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDef,
}

impl FunctionSpec {
    pub fn from_value(value: Value) -> Result<Self, AgentError> {
        let spec: FunctionSpec = serde_json::from_value(value)?;
        if spec.kind != "function" {
            return Err(AgentError::Config(format!(
                "tool spec {} has type {:?}, expected \"function\"",
                spec.function.name, spec.kind
            )));
        }
        Ok(spec)
    }
}

/// 绑定数据集的外部工具
pub struct DatasetTool {
    name: String,
    description: String,
    inputs: ToolInputs,
    required: Vec<String>,
    handler: ToolHandler,
    dataset: Dataset,
}

impl DatasetTool {
    pub fn from_spec(spec: FunctionSpec, handler: ToolHandler, dataset: Dataset) -> Self {
        let FunctionDef {
            name,
            description,
            parameters,
        } = spec.function;
        Self {
            name,
            description,
            inputs: parameters.properties,
            required: parameters.required,
            handler,
            dataset,
        }
    }

    /// 单参数工具允许以文本直接传参
    fn named_args(&self, args: ToolArguments) -> Result<Map<String, Value>, String> {
        match args {
            ToolArguments::Named(map) => Ok(map),
            ToolArguments::Text(text) => {
                let mut keys = self.inputs.keys();
                match (keys.next(), keys.next()) {
                    (Some(key), None) => {
                        let mut map = Map::new();
                        map.insert(key.clone(), Value::String(text));
                        Ok(map)
                    }
                    _ => Err(format!(
                        "{} expects named arguments {:?}, got a single string",
                        self.name,
                        self.inputs.keys().collect::<Vec<_>>()
                    )),
                }
            }
        }
    }
}

#[async_trait]
impl Tool for DatasetTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn inputs(&self) -> ToolInputs {
        self.inputs.clone()
    }

    async fn call(&self, args: ToolArguments) -> Result<String, String> {
        let args = self.named_args(args)?;
        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|k| !args.contains_key(k.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(format!("missing required argument(s): {}", missing.join(", ")));
        }
        let handler = self.handler;
        self.dataset.with_mut(|data| handler(data, &args))
    }
}
