//! 消息规整：角色映射后合并相邻同角色消息
//!
//! 各后端先把抽象角色映射到自己的原生角色，再调用 `merge_consecutive`，
//! 保证发出的序列中不存在两条相邻的同角色消息。

use crate::memory::{Message, Role};

/// 合并内容时的分隔符
pub const MERGE_SEPARATOR: &str = "\n=======\n";

/// 按 map 映射角色，并把映射后相邻同角色的消息用 `MERGE_SEPARATOR` 拼接为一条
pub fn merge_consecutive<R, F>(messages: &[Message], map: F) -> Vec<(R, String)>
where
    R: PartialEq + Copy,
    F: Fn(Role) -> R,
{
    let mut out: Vec<(R, String)> = Vec::with_capacity(messages.len());
    for m in messages {
        let role = map(m.role);
        match out.last_mut() {
            Some((last_role, content)) if *last_role == role => {
                content.push_str(MERGE_SEPARATOR);
                content.push_str(&m.content);
            }
            _ => out.push((role, m.content.clone())),
        }
    }
    out
}
