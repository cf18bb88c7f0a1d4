//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Gemini / Mock）

pub mod gemini;
pub mod mock;
pub mod normalize;
pub mod openai;
pub mod traits;

pub use gemini::GeminiClient;
pub use mock::{MockCall, MockLlmClient, MockReply};
pub use normalize::{merge_consecutive, MERGE_SEPARATOR};
pub use openai::OpenAiClient;
pub use traits::{LlmClient, LlmError, TokenUsage};
