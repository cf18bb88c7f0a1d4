//! 结构化输出解析
//!
//! 模型输出是 "Thought ... Action: {json}" 的自由文本。这里负责：按最后一个分隔标记切分推理与动作、
//! 从文本中宽松地提取 JSON 对象（容忍尾逗号与多余空白）、解析工具调用与信念。

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::react::belief::BeliefState;

/// 按最后一个 marker 切分，返回 (rationale, action)，两段均去首尾空白
pub fn split_rationale_action(text: &str, marker: &str) -> Result<(String, String), AgentError> {
    let idx = text.rfind(marker).ok_or_else(|| {
        AgentError::parsing(
            format!(
                "No '{marker}' token provided in your output. Be sure to include an action, prefaced with '{marker}'!"
            ),
            text,
        )
    })?;
    let rationale = text[..idx].trim().to_string();
    let action = text[idx + marker.len()..].trim().to_string();
    Ok((rationale, action))
}

/// 去掉字符串字面量之外、紧跟 `}` 或 `]` 的逗号
fn strip_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;
    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// 取第一个 `{` 到最后一个 `}` 之间的 JSON 对象
pub fn parse_json_blob(text: &str) -> Result<Map<String, Value>, AgentError> {
    let (start, end) = match (text.find('{'), text.rfind('}')) {
        (Some(s), Some(e)) if s < e => (s, e),
        _ => {
            return Err(AgentError::parsing(
                "The model output does not contain any JSON blob.",
                text,
            ))
        }
    };
    let blob = strip_trailing_commas(&text[start..=end]);
    match serde_json::from_str::<Value>(&blob) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AgentError::parsing("The JSON blob must be an object.", text)),
        Err(e) => Err(AgentError::parsing(
            format!("The JSON blob you used is invalid due to the following error: {e}."),
            text,
        )),
    }
}

/// 解析工具调用：`action` 为工具名，`action_input` 缺省或 null 时为空映射
pub fn parse_tool_call(payload: &str) -> Result<(String, Value), AgentError> {
    let mut blob = parse_json_blob(payload)?;
    let name = match blob.remove("action") {
        Some(Value::String(name)) => name,
        Some(_) => {
            return Err(AgentError::parsing(
                "Could not parse the given action: key 'action' must be a string.",
                payload,
            ))
        }
        None => {
            return Err(AgentError::parsing(
                "Could not parse the given action: key 'action' not found.",
                payload,
            ))
        }
    };
    let input = match blob.remove("action_input") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(v) => v,
    };
    Ok((name, input))
}

/// 尚未绑定步骤号的信念
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawBelief {
    pub belief_state: BeliefState,
    pub belief_explanation: String,
    pub known_facts: Vec<String>,
    pub unknown_facts: Vec<String>,
}

pub fn parse_belief(text: &str) -> Result<RawBelief, AgentError> {
    let blob = parse_json_blob(text)?;
    serde_json::from_value(Value::Object(blob)).map_err(|e| {
        AgentError::parsing(format!("Could not parse the belief state: {e}."), text)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_on_last_marker() {
        let (rationale, action) =
            split_rationale_action("foo Action: {bar} Action: {baz}", "Action:").unwrap();
        assert_eq!(rationale, "foo Action: {bar}");
        assert_eq!(action, "{baz}");
    }

    #[test]
    fn test_split_missing_marker_reports_text() {
        let err = split_rationale_action("Thought: I am unsure", "Action:").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("No 'Action:' token"));
        assert!(msg.contains("Thought: I am unsure"));
        assert_eq!(err.kind(), "parsing");
    }

    #[test]
    fn test_tool_call_tolerates_trailing_commas() {
        let payload = r#"
        {
          "action": "get_user_details",
          "action_input": {
            "user_id": "mei_kovacs_8020",
          },
        }"#;
        let (name, input) = parse_tool_call(payload).unwrap();
        assert_eq!(name, "get_user_details");
        assert_eq!(input, json!({"user_id": "mei_kovacs_8020"}));
    }

    #[test]
    fn test_comma_inside_string_kept() {
        let (_, input) =
            parse_tool_call(r#"{"action": "respond_customer", "action_input": "a ,} b"}"#).unwrap();
        assert_eq!(input, json!("a ,} b"));
    }

    #[test]
    fn test_missing_or_null_input_is_empty_mapping() {
        let (name, input) = parse_tool_call(r#"{"action": "list_all_product_types"}"#).unwrap();
        assert_eq!(name, "list_all_product_types");
        assert_eq!(input, json!({}));
        let (_, input) =
            parse_tool_call(r#"{"action": "list_all_product_types", "action_input": null}"#).unwrap();
        assert_eq!(input, json!({}));
    }

    #[test]
    fn test_missing_action_key() {
        assert!(parse_tool_call(r#"{"action_input": {}}"#).is_err());
        assert!(parse_tool_call("no json at all").is_err());
        assert!(parse_tool_call(r#"{"action": 3}"#).is_err());
    }

    #[test]
    fn test_parse_belief_case_insensitive_state() {
        let text = r#"BeliefWithFacts:
        {
          "belief_state": "investigating",
          "belief_explanation": "Looking up the order.",
          "known_facts": ["The user wants to exchange a watch. citation: user input",],
          "unknown_facts": ["Order id",]
        }"#;
        let belief = parse_belief(text).unwrap();
        assert_eq!(belief.belief_state, BeliefState::Investigating);
        assert_eq!(belief.known_facts.len(), 1);
        assert_eq!(belief.unknown_facts, vec!["Order id"]);
    }

    #[test]
    fn test_parse_belief_rejects_unknown_state_and_missing_keys() {
        let bad_state = r#"{"belief_state": "DREAMING", "belief_explanation": "", "known_facts": [], "unknown_facts": []}"#;
        assert!(parse_belief(bad_state).is_err());
        let missing = r#"{"belief_state": "RESOLUTION", "known_facts": [], "unknown_facts": []}"#;
        assert!(parse_belief(missing).is_err());
    }
}
