//! 核心层：错误类型与有界重试策略

pub mod error;
pub mod retry;

pub use error::AgentError;
pub use retry::{RetryExhausted, RetryPolicy};
