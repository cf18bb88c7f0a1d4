//! Prompt 模板
//!
//! 占位符统一为 `<<key>>`。PromptTemplate 在构造时校验：声明的键必须都出现在文本中，
//! 文本中的占位符必须都已声明；渲染时缺少绑定即报错。每个模板可由 `config/prompts/{name}.txt` 覆盖。

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::core::AgentError;

/// 信念计算的停止序列
pub const BELIEF_STOP: &str = "<belief_state_with_facts>";
/// 计划的停止序列
pub const PLAN_STOP: &str = "<end_plan>";
/// 动作的停止序列
pub const ACT_STOP: &str = "<end_action>";
pub const OBSERVATION_STOP: &str = "Observation:";
/// 推理与动作之间的分隔标记
pub const ACTION_MARKER: &str = "Action:";

const PLACEHOLDER: &str = r"<<(\w+)>>";

/// 已校验的模板
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    name: String,
    text: String,
    keys: Vec<String>,
    pattern: Regex,
}

impl PromptTemplate {
    pub fn new(name: &str, text: impl Into<String>, keys: &[&str]) -> Result<Self, AgentError> {
        let text = text.into();
        let pattern = Regex::new(PLACEHOLDER).map_err(|e| AgentError::Template(e.to_string()))?;
        let found: BTreeSet<&str> = pattern
            .captures_iter(&text)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        let declared: BTreeSet<&str> = keys.iter().copied().collect();

        if let Some(missing) = declared.difference(&found).next() {
            return Err(AgentError::Template(format!(
                "template {name} declares <<{missing}>> but the text never uses it"
            )));
        }
        if let Some(undeclared) = found.difference(&declared).next() {
            return Err(AgentError::Template(format!(
                "template {name} uses undeclared placeholder <<{undeclared}>>"
            )));
        }

        Ok(Self {
            name: name.to_string(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
            text,
            pattern,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// 单遍替换，绑定值中出现的 `<<x>>` 不会被再次展开
    pub fn render(&self, bindings: &[(&str, &str)]) -> Result<String, AgentError> {
        let values: HashMap<&str, &str> = bindings.iter().copied().collect();
        if let Some(missing) = self.keys.iter().find(|k| !values.contains_key(k.as_str())) {
            return Err(AgentError::Template(format!(
                "template {} rendered without a value for <<{missing}>>",
                self.name
            )));
        }
        let rendered = self.pattern.replace_all(&self.text, |caps: &regex::Captures<'_>| {
            let key = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            values.get(key).copied().unwrap_or_default().to_string()
        });
        Ok(rendered.into_owned())
    }
}

/// 各阶段使用的全部模板
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub act_system: PromptTemplate,
    pub belief_system: PromptTemplate,
    pub belief_user: PromptTemplate,
    pub plan_system: PromptTemplate,
    pub plan_user: PromptTemplate,
    pub fallback_system: PromptTemplate,
    pub fallback_user: PromptTemplate,
}

const DEFAULT_PROMPT_DIRS: [&str; 2] = ["config/prompts", "../config/prompts"];

fn read_override(dirs: &[PathBuf], name: &str) -> Option<String> {
    dirs.iter()
        .map(|d| d.join(format!("{name}.txt")))
        .find_map(|p| std::fs::read_to_string(p).ok())
}

impl PromptSet {
    /// 内置模板
    pub fn builtin() -> Result<Self, AgentError> {
        Self::from_sources(|_| None)
    }

    /// 从 dir（或默认的 config/prompts、../config/prompts）读取覆盖文件，缺失的用内置模板
    pub fn load(dir: Option<&Path>) -> Result<Self, AgentError> {
        let dirs: Vec<PathBuf> = match dir {
            Some(d) => vec![d.to_path_buf()],
            None => DEFAULT_PROMPT_DIRS.iter().map(PathBuf::from).collect(),
        };
        Self::from_sources(|name| {
            let text = read_override(&dirs, name);
            if text.is_some() {
                tracing::info!(prompt = name, "using prompt override");
            }
            text
        })
    }

    fn from_sources(source: impl Fn(&str) -> Option<String>) -> Result<Self, AgentError> {
        let build = |name: &str, builtin: &str, keys: &[&str]| {
            let text = source(name).unwrap_or_else(|| builtin.to_string());
            PromptTemplate::new(name, text, keys)
        };
        Ok(Self {
            act_system: build(
                "act_system",
                ACT_SYSTEM_PROMPT,
                &[
                    "tool_names",
                    "tool_descriptions",
                    "known_facts",
                    "unknown_facts",
                    "execution_plan",
                ],
            )?,
            belief_system: build("belief_system", BELIEF_SYSTEM_PROMPT, &["domain_knowledge"])?,
            belief_user: build("belief_user", BELIEF_USER_PROMPT, &[])?,
            plan_system: build("plan_system", PLAN_SYSTEM_PROMPT, &["task"])?,
            plan_user: build(
                "plan_user",
                PLAN_USER_PROMPT,
                &[
                    "task",
                    "domain_knowledge",
                    "known_facts",
                    "unknown_facts",
                    "tool_descriptions",
                    "previous_plan",
                ],
            )?,
            fallback_system: build("fallback_system", FALLBACK_SYSTEM_PROMPT, &[])?,
            fallback_user: build("fallback_user", FALLBACK_USER_PROMPT, &["task"])?,
        })
    }
}

pub const FALLBACK_SYSTEM_PROMPT: &str = "An agent tried to answer an user query but it got stuck and failed to do so. You are tasked with providing an answer instead. Here is the agent's memory:";

pub const FALLBACK_USER_PROMPT: &str =
    "Based on the above, please provide an answer to the following user request:\n<<task>>";

pub const ACT_SYSTEM_PROMPT: &str = r##"You are an expert assistant who can solve any task using JSON tool calls. You will be given a task to solve as best you can.
To do so, you have been given access to the following tools: <<tool_names>>

The way you use the tools is by specifying a json blob, ending with '<end_action>'.
Specifically, this json should have an `action` key (name of the tool to use) and an `action_input` key (input to the tool).

The $ACTION_JSON_BLOB should only contain a SINGLE action, do NOT return a list of multiple actions. It should be formatted in json. Do not try to escape special characters. Here is the template of a valid $ACTION_JSON_BLOB:
{
  "action": $TOOL_NAME,
  "action_input": $INPUT
}<end_action>

Make sure to have the $INPUT as a dictionary in the right format for the tool you are using, and do not put variable names as input if you can find the right values.

You should ALWAYS use the following format:

Thought: you should always think about one action to take. Then use the action as follows:
Action:
$ACTION_JSON_BLOB
Observation: the result of the action
... (this Thought/Action/Observation can repeat N times, you should take several steps when needed. The $ACTION_JSON_BLOB must only use a SINGLE action at a time.)

You can use the result of the previous action as input for the next action.
The observation will always be a string: it can represent a file, like "image_1.jpg".
Then you can use it as input for the next action. You can do it for instance as follows:

Observation: "image_1.jpg"

Thought: I need to transform the image that I received in the previous observation to make it green.
Action:
{
  "action": "image_transformer",
  "action_input": {"image": "image_1.jpg"}
}<end_action>

To provide the final answer to the task, use an action blob with "action": "final_answer" tool. The `final_answer` can only be generated when user replied with `###STOP###`. This It is the only way to complete the task instruction else you will be stuck on a loop. So your final output should look like this:
Action:
{
  "action": "final_answer",
  "action_input": {"answer": "insert your final answer here."}
}<end_action>


Here are a few examples using notional tools:
---
Task: "I want to exchange my watch to 8945888101."

Thought:The user provided a new item ID. I need to confirm that the new item ID is for a watch and that it is a valid item ID. I will use the `get_product_details` tool to check the product details
Action:
{
  "action": "get_product_details",
  "action_input": {"product_id": "8945888101"}
}<end_action>
Observation: "Error: product not found"


Thought: The product ID was not found. I need to inform the user that the product ID is invalid and try to check options for watches using `list_all_product_types`.
Action:
{
  "action": "list_all_product_types",
  "action_input": {}
}<end_action>
Observation: "List of all product types"

Thought: I found 8945888101 as on of variant of watches. I will inform user that I found the product. 
Action:
{
  "action": "respond_customer",
  "action_input": {"query" : "I found 8945888101 as one of variant of watches."}
}<end_action>

---
Task: "I want to exchange 2 items, can you please help?"

Thought: I have validated the user and extracted order #W6791234 has 2 items 4458198585, 5668787148 can be exchanged with 6786522780 and 1235746168 as per exchange policy.
Action:
{
  "action": "exchange_delivered_order_items",
  "action_input": {
    "order_id": "#W6791234",
    "item_ids": [
      "4458198585", "5668787148"
    ],
    "new_item_ids": [
      "6786522780", "1235746168"
    ],
    "payment_method_id": "credit_card_8976988"
  }
}<end_action>
Observation: Both items have been exchanged that are in single order. 

---
Task: "Hello there. I'd like to know how many t-shirt options you currently have available in your online store."

Thought: I need to first authenticate the user. I need to ask their email or first name, last name and zip code.
Action:
{
    "action": "respond_customer",
    "action_input": "Sure, in order to better assist you, could you please provide your email address?"
}<end_action>
Observation: ['Sure, my email address is mei_kovacs_8020@example.com']

---
Task: Can you please provide me status of my last order?

Thought: I need to start by identifying the user. I'll ask for their email address first
Action:
{
  "action": "respond_customer",
  "action_input": {
    "query": "Sure. In order to better assist you with your exchange, could you please provide your email address?"
  }
}<end_action>
Observation: Sure, my email address is mei_kovacs_8020@example.com

Thought: Now that I have the user's email, I can use the `find_user_id_by_email` tool to find their user ID.
Action:
{
  "action": "find_user_id_by_email",
  "action_input": {
    "email": "mei_kovacs_8020@example.com"
  }
}<end_action>
Observation: I can't find any user with email address mei_kovacs_8020@example.com.

Thought: The user was not found by email. I will now ask for their first name, last name, and zip code to try and find them using the `find_user_id_by_name_zip` tool.
Action:
{
  "action": "respond_customer",
  "action_input": {
    "query": "I couldn't find your user ID using your email address. Could you please provide your first name, last name, and zip code?"
  }
}<end_action>
Observation: My first name is Mei, my last name is Kovacs, and my zip code is 28236.

Thought: Now that I have the user's first name, last name, and zip code, I can use the `find_user_id_by_name_zip` tool to find their user ID.
Action:
{
  "action": "find_user_id_by_name_zip",
  "action_input": {
    "first_name": "Mei",
    "last_name": "Kovacs",
    "zip": "28236"
  }
}<end_action>
Observation: User is found with user_id as mei_kovacs_8020.

Thought: Now that I have the user ID, I can respond to the user and ask for the order ID.
Action:
{
  "action": "respond_customer",
  "action_input": {
    "query": "Thank you, Mei. I have found your user ID. To proceed with the exchange, please provide the order ID of the items you would like to exchange."
  }
}<end_action>
Observation: I'm sorry, but I don't have the order ID with me right now.

Thought: Since user doesn't know order_id and I have user_id, I can use the `get_user_details` tool to find their details.
Action:
{
  "action": "get_user_details",
  "action_input": {
    "user_id": "mei_kovacs_8020",
  }
}<end_action>
Observation: User's last order id is #W6390527".

Above example were using notional tools that might not exist for you. You only have access to these tools:
<<tool_descriptions>>

You should refer to gathered facts so far:
Known Facts:
<<known_facts>>

Unknown Facts:
<<unknown_facts>>

You should also refer to computed plan for your guidance:
<<execution_plan>>

Here are the rules you should always follow to solve your task:
1. ALWAYS provide a 'Thought:' sequence, and an 'Action:' sequence that ends with <end_action>, else you will fail.
2. Always use the right arguments for the tools. Never use variable names in the 'action_input' field, use the value instead.
3. Call a tool only when needed: do not call the search agent if you do not need information, try to solve the task yourself.
4. Never re-do a tool call that you previously did with the exact same parameters.

Now Begin! If you solve the task correctly, you will receive a reward of $1,000,000.
"##;

pub const BELIEF_SYSTEM_PROMPT: &str = r##"
You are a highly advanced AI model specializing in understanding the nuances of human-AI interaction. Your primary task is to meticulously analyze conversations and identify the underlying 'belief state'.

<BeliefState>
A belief state represents the assistant's current cognitive focus within the dialogue. The possible belief states are:

UNDERSTANDING: The assistant is primarily focused on comprehending the user's needs, requests, or problems. This often involves asking clarifying questions or actively listening.
INVESTIGATING: The assistant is actively gathering information, searching for solutions, or exploring different options to address the user's needs.
RESOLUTION: The assistant is focused on providing a solution, completing a task, or confirming that the user's needs have been met. This could involve offering a direct answer, presenting a summary of findings, or confirming the completion of a request.
</BeliefState>

<Facts>
In addition to identifying the belief state, you must also extract and categorize the factual information exchanged in the conversation.  Pay close attention to both explicitly stated and implicitly conveyed information.
</facts>

<ImportantPoints>
- Belief State: Determine the AI assistant's primary focus (UNDERSTANDING, INVESTIGATING, or RESOLUTION). Provide a brief explanation to justify your choice.
- Known Facts: These are facts that the assistant has established or confirmed to be true within the conversation. Categorize facts as:
    1. User facts: Relating to the user (e.g., location, preferences, orders, items).
    2. Discourse facts: Information from the conversation itself. Provide a citation or source for each known fact if available. If uncertain about a fact's truth, do NOT provide it."
    3. Unknown Facts: These are facts that the assistant needs to gather or confirm to fulfill the user's request. Clearly state what information is missing or needs further investigation.
- Your analysis should consider the entire conversation history up to the current turn to accurately determine the belief state and extract the relevant facts. Pay close attention to the assistant's language, the types of questions it asks, and the actions it takes.
</ImportantPoints>

<DomainKnowledge>
You should use Domain Knowledge for listing unknown facts.
<<domain_knowledge>>
</DomainKnowledge>

Provide your analysis as a $BELIEF_JSON_BLOB with the following structure which SHOULD end with <belief_state_with_facts>.
The $BELIEF_JSON_BLOB should be formatted in json. Do not try to escape special characters. Here is the template of a valid $BELIEF_JSON_BLOB:
{
  "belief_state": "(UNDERSTANDING, INVESTIGATING, or RESOLUTION)",
  "belief_explanation": "...", 
  "known_facts": [
   "..., citation: ...",
   "..., citation: ..."
  ],
  "unknown_facts": [
    "...",
    "..."
  ]
}<belief_state_with_facts>

You should always use following format:

BeliefWithFacts: 
$BELIEF_JSON_BLOB

Example:

BeliefWithFacts:
{
  "belief_state": "UNDERSTANDING",
  "belief_explanation": "The assistant is primarily focused on gathering information and exploring options to fulfill the user's requests.",
  "known_facts": [
    "The user wants to exchange few items. citation: user input",
    "The user has shared email. citation: user input",
    "The user's ID is abc_2124324. citation: find_user_id_by_name_zip output",
  ],
  "unknown_facts": [
     "The specific changes the user wants to make in order.",
     "Find Order and its status.",
  ]
}<belief_state_with_facts>

Do not add anything else.
"##;

pub const BELIEF_USER_PROMPT: &str = r##"
Now, analyze the conversation and provide updated beliefs and facts (known, unknown) in requested format. 
"##;

pub const PLAN_SYSTEM_PROMPT: &str = r##"You are a world expert at making efficient plans to solve any task using a set of carefully crafted tools.

You have been given a task:
```
<<task>>
```

Find below the record of what has been tried so far to solve it. Then you will be asked to make an updated plan to solve the task.
If the previous tries so far have met some success, you can make an updated plan based on these actions.
If you are stalled, you can make a completely new plan starting from scratch.
"##;

pub const PLAN_USER_PROMPT: &str = r##"You're still working towards solving this task:
```
<<task>>
```

You should follow this domain policy and knowledge for creating a plan:
<<domain_knowledge>>

Here is the up to date list of facts that you know:
```
Known Facts:
<<known_facts>>

Unknown Facts:
<<unknown_facts>>
```

You have access to these tools and only these:
<<tool_descriptions>>

<<previous_plan>>

Now for the given task, develop a step-by-step high-level plan taking into account the above inputs and list of facts.
This plan should involve individual tasks based on the available tools, that if executed correctly will yield the correct answer.
Do not skip steps, do not add any superfluous steps. DO NOT USE ANY TOOL which is NOT mentioned above.
After writing the final step of the plan, write the '
<end_plan>' tag and stop there.

Now write your new plan below."##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_templates_validate() {
        let set = PromptSet::builtin().unwrap();
        assert_eq!(set.act_system.keys().len(), 5);
        assert!(set.belief_user.keys().is_empty());
    }

    #[test]
    fn test_act_prompt_renders_known_and_unknown_separately() {
        let set = PromptSet::builtin().unwrap();
        let text = set
            .act_system
            .render(&[
                ("tool_names", "a, b"),
                ("tool_descriptions", "- a: x"),
                ("known_facts", "KNOWN-1"),
                ("unknown_facts", "UNKNOWN-1"),
                ("execution_plan", "1. do it"),
            ])
            .unwrap();
        assert!(text.contains("Known Facts:\nKNOWN-1"));
        assert!(text.contains("Unknown Facts:\nUNKNOWN-1"));
        assert!(!text.contains("<<"));
    }

    #[test]
    fn test_declared_key_must_appear() {
        let err = PromptTemplate::new("t", "Hello <<name>>", &["name", "task"]).unwrap_err();
        assert!(err.to_string().contains("task"));
    }

    #[test]
    fn test_undeclared_placeholder_rejected() {
        let err = PromptTemplate::new("t", "Hello <<name>> <<extra>>", &["name"]).unwrap_err();
        assert!(err.to_string().contains("extra"));
    }

    #[test]
    fn test_render_requires_every_binding() {
        let t = PromptTemplate::new("t", "<<a>> and <<b>>", &["a", "b"]).unwrap();
        assert!(t.render(&[("a", "1")]).is_err());
        assert_eq!(t.render(&[("a", "1"), ("b", "2")]).unwrap(), "1 and 2");
    }

    #[test]
    fn test_render_is_single_pass() {
        let t = PromptTemplate::new("t", "<<a>>|<<b>>", &["a", "b"]).unwrap();
        assert_eq!(t.render(&[("a", "<<b>>"), ("b", "x")]).unwrap(), "<<b>>|x");
    }

    #[test]
    fn test_load_override_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fallback_user.txt"), "Answer this: <<task>>").unwrap();
        let set = PromptSet::load(Some(dir.path())).unwrap();
        assert_eq!(
            set.fallback_user.render(&[("task", "exchange")]).unwrap(),
            "Answer this: exchange"
        );
        assert_eq!(set.fallback_system.render(&[]).unwrap(), FALLBACK_SYSTEM_PROMPT);
    }

    #[test]
    fn test_invalid_override_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("plan_system.txt"), "no placeholders here").unwrap();
        assert!(PromptSet::load(Some(dir.path())).is_err());
    }
}
