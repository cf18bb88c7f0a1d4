//! 可观测性：进程级 tracing 订阅器，仅由二进制在启动时调用一次

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// RUST_LOG 未设置或无法解析时使用 info
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}
