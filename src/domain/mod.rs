//! 领域层：数据集、任务、零售工具与用户模拟

pub mod dataset;
pub mod retail;
pub mod task;
pub mod user;

pub use dataset::{content_hash, Dataset};
pub use retail::{replay_actions, retail_tools, DEFAULT_POLICY};
pub use task::{load_tasks, select_range, Action, Task, TaskSplit};
pub use user::{LlmUserSimulator, ScriptedUser, UserSimulator, STOP_TOKEN};
