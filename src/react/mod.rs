//! 认知层：信念生成、计划、动作解析与 Belief/Plan/Act 主循环

pub mod belief;
pub mod events;
pub mod loop_;
pub mod memory;
pub mod parser;
pub mod planner;
pub mod prompts;
pub mod step;

pub use belief::{BeliefFacts, BeliefGenerator, BeliefState};
pub use events::{AgentEvent, AgentObserver, ChannelObserver, NoopObserver, RunTokenUsage, TracingObserver};
pub use loop_::{AgentSettings, BeliefAgent, RunState};
pub use memory::build_memory;
pub use planner::{ExecutionPlan, Planner};
pub use prompts::{PromptSet, PromptTemplate};
pub use step::{StepError, StepLogEntry, ToolCallRecord};
