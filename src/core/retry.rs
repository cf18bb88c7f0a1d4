//! 有界重试策略
//!
//! 统一表达「最多 N 次尝试 + 指数退避 + 抖动」：模型适配器用它处理限流，信念计算用它处理解析失败。

use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// 重试策略：max_attempts 含首次尝试
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// 首次重试前的等待
    pub initial_delay: Duration,
    /// 每次重试后等待时间的乘数
    pub multiplier: f64,
    /// 乘数上叠加的随机量上限：实际乘数取 multiplier + U(0, jitter)
    pub jitter: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::rate_limit()
    }
}

/// 重试耗尽：最后一次错误与实际尝试次数
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl RetryPolicy {
    /// 限流退避：5 次，初始 2s，乘数 2 + U(0,1)
    pub fn rate_limit() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(2),
            multiplier: 2.0,
            jitter: 1.0,
            max_delay: Duration::from_secs(120),
        }
    }

    /// 立即重试（无等待），用于解析类失败
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
            max_delay: Duration::ZERO,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// 根据当前等待时间计算下一次等待
    pub fn next_delay(&self, current: Duration) -> Duration {
        let factor = if self.jitter > 0.0 {
            self.multiplier + rand::thread_rng().gen_range(0.0..self.jitter)
        } else {
            self.multiplier
        };
        current.mul_f64(factor.max(0.0)).min(self.max_delay)
    }

    /// 执行 op，直到成功、遇到不可重试错误或尝试次数耗尽。
    /// op 接收当前尝试序号（从 1 开始）。
    pub async fn run<T, E, F, Fut, P>(&self, mut op: F, is_retryable: P) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut delay = self.initial_delay;
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if attempt >= max_attempts || !is_retryable(&e) {
                        return Err(RetryExhausted {
                            attempts: attempt,
                            last_error: e,
                        });
                    }
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                        delay = self.next_delay(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}
