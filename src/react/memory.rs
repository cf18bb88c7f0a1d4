//! 记忆重建
//!
//! 每次调用模型前都从任务文本和步骤日志完整回放出一份消息序列，不做缓存：
//! 任务消息在前；每条日志依次贡献模型输出（assistant）与错误或观察（user）。

use crate::memory::Message;
use crate::react::step::StepLogEntry;

pub fn error_turn(error: &str) -> String {
    format!(
        "Error:\n{error}\nNow let's retry: take care not to repeat previous errors! If you have retried several times, try a completely different approach.\n"
    )
}

/// 纯函数；同样输入总是得到同样输出
pub fn build_memory(task: &str, logs: &[StepLogEntry]) -> Vec<Message> {
    let mut memory = vec![Message::user(format!("Task: {task}"))];
    for entry in logs {
        if let Some(output) = &entry.llm_output {
            memory.push(Message::assistant(output.trim()));
        }
        if let Some(error) = &entry.error {
            memory.push(Message::user(error_turn(&error.message)));
        } else if let Some(observation) = &entry.observation {
            memory.push(Message::user(format!("Observation:\n{observation}")));
        }
    }
    memory
}
