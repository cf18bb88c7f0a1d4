//! 对话消息
//!
//! Message 是模型适配器的统一输入：role + content。原始 JSON 消息在适配器边界经 `Message::from_value`
//! 校验：键集合必须恰为 {role, content}，role 必须属于已知集合。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::LlmError;

/// 消息角色（抽象角色集合，由各后端映射为自己的原生角色）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    System,
    User,
    Assistant,
    ToolCall,
    ToolResponse,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::System,
        Role::User,
        Role::Assistant,
        Role::ToolCall,
        Role::ToolResponse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::ToolCall => "tool-call",
            Role::ToolResponse => "tool-response",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|r| r.as_str() == s)
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// 从原始 JSON 校验并构造消息
    pub fn from_value(value: &Value) -> Result<Self, LlmError> {
        let obj = value
            .as_object()
            .ok_or_else(|| LlmError::InvalidMessage(format!("message must be an object, got {value}")))?;
        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        if keys != ["content", "role"] {
            return Err(LlmError::InvalidMessage(format!(
                "Message should contain only 'role' and 'content' keys! got {keys:?}"
            )));
        }
        let role_str = obj["role"].as_str().unwrap_or_default();
        let role = Role::parse(role_str).ok_or_else(|| {
            let supported: Vec<&str> = Role::ALL.iter().map(Role::as_str).collect();
            LlmError::InvalidMessage(format!(
                "Incorrect role {}, only {:?} are supported for now.",
                obj["role"], supported
            ))
        })?;
        let content = obj["content"]
            .as_str()
            .ok_or_else(|| LlmError::InvalidMessage("message content must be a string".to_string()))?;
        Ok(Self::new(role, content))
    }
}

/// 批量校验原始消息
pub fn validate_messages(raw: &[Value]) -> Result<Vec<Message>, LlmError> {
    raw.iter().map(Message::from_value).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_roundtrip_names() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(role));
            let s = serde_json::to_string(&role).unwrap();
            assert_eq!(s, format!("\"{}\"", role.as_str()));
        }
    }

    #[test]
    fn test_from_value_ok() {
        let msg = Message::from_value(&json!({"role": "tool-response", "content": "ok"})).unwrap();
        assert_eq!(msg.role, Role::ToolResponse);
        assert_eq!(msg.content, "ok");
    }

    #[test]
    fn test_extra_key_rejected() {
        let err = Message::from_value(&json!({"role": "user", "content": "hi", "extra": 1})).unwrap_err();
        assert!(matches!(err, LlmError::InvalidMessage(_)));
    }

    #[test]
    fn test_missing_key_rejected() {
        assert!(Message::from_value(&json!({"role": "user"})).is_err());
    }

    #[test]
    fn test_unknown_role_rejected() {
        let err = Message::from_value(&json!({"role": "narrator", "content": "hi"})).unwrap_err();
        assert!(err.to_string().contains("narrator"));
    }
}
