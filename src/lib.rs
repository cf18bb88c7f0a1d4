//! belief-agent：以信念驱动的多步客服 Agent
//!
//! 模块划分：
//! - **agent**: 组装模型客户端、工具集与领域策略
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与有界重试策略
//! - **domain**: 零售数据集、任务、零售工具与用户模拟器
//! - **eval**: 轨迹投影、奖励计算、轨迹落盘与批量运行
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Gemini / Mock）
//! - **memory**: 对话消息类型
//! - **observability**: tracing 订阅器初始化
//! - **react**: 信念、计划、动作解析与主循环
//! - **tools**: 工具 trait、注册表与执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod domain;
pub mod eval;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use crate::core::AgentError;
pub use react::{AgentSettings, BeliefAgent};
