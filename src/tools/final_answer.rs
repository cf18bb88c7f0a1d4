//! final_answer：结束任务。注册它只为让文档出现在 prompt 中，循环在分发前截获该调用。

use async_trait::async_trait;

use crate::tools::{Tool, ToolArguments, ToolInput, ToolInputs};

pub const FINAL_ANSWER: &str = "final_answer";

pub struct FinalAnswerTool;

impl FinalAnswerTool {
    /// answer 键优先；否则整个参数（文本原样，映射取 JSON 文本）
    pub fn extract(args: &ToolArguments) -> String {
        match args {
            ToolArguments::Named(map) => match map.get("answer") {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => serde_json::Value::Object(map.clone()).to_string(),
            },
            ToolArguments::Text(s) => s.clone(),
        }
    }
}

#[async_trait]
impl Tool for FinalAnswerTool {
    fn name(&self) -> &str {
        FINAL_ANSWER
    }

    fn description(&self) -> &str {
        "Provides a final answer to the given problem."
    }

    fn inputs(&self) -> ToolInputs {
        let mut inputs = ToolInputs::new();
        inputs.insert(
            "answer".to_string(),
            ToolInput::string("The final answer to the problem"),
        );
        inputs
    }

    async fn call(&self, args: ToolArguments) -> Result<String, String> {
        Ok(Self::extract(&args))
    }
}
