//! respond_customer：向客户发话并取回客户的下一句（澄清问题的唯一通道）

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::UserSimulator;
use crate::tools::{Tool, ToolArguments, ToolInput, ToolInputs};

pub const RESPOND_CUSTOMER: &str = "respond_customer";

pub struct RespondToCustomerTool {
    user: Arc<dyn UserSimulator>,
}

impl RespondToCustomerTool {
    pub fn new(user: Arc<dyn UserSimulator>) -> Self {
        Self { user }
    }
}

#[async_trait]
impl Tool for RespondToCustomerTool {
    fn name(&self) -> &str {
        RESPOND_CUSTOMER
    }

    fn description(&self) -> &str {
        "Use this function to respond to customer with defined query."
    }

    fn inputs(&self) -> ToolInputs {
        let mut inputs = ToolInputs::new();
        inputs.insert(
            "query".to_string(),
            ToolInput::string("query or question or clarification to ask customer."),
        );
        inputs
    }

    async fn call(&self, args: ToolArguments) -> Result<String, String> {
        let query = args
            .text_or("query")
            .ok_or_else(|| "missing required argument: query".to_string())?;
        self.user.step(query).await.map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ScriptedUser;
    use serde_json::{json, Map};

    #[tokio::test]
    async fn test_forwards_query_to_user() {
        let user = Arc::new(ScriptedUser::new(["my email is mei@example.com"]));
        let tool = RespondToCustomerTool::new(user.clone());
        let mut args = Map::new();
        args.insert("query".to_string(), json!("Could you share your email?"));
        let reply = tool.call(ToolArguments::Named(args)).await.unwrap();
        assert_eq!(reply, "my email is mei@example.com");
        assert_eq!(user.received(), vec!["Could you share your email?"]);
    }

    #[tokio::test]
    async fn test_accepts_plain_text_and_rejects_missing_query() {
        let user = Arc::new(ScriptedUser::new(Vec::<String>::new()));
        let tool = RespondToCustomerTool::new(user);
        let reply = tool.call(ToolArguments::Text("Anything else?".into())).await.unwrap();
        assert_eq!(reply, "###STOP###");
        assert!(tool.call(ToolArguments::default()).await.is_err());
    }
}
