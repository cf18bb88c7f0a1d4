//! 记忆层：对话消息类型（回放式记忆重建见 react::memory）

pub mod conversation;

pub use conversation::{validate_messages, Message, Role};
