//! 评估：轨迹投影、奖励计算、轨迹落盘与批量运行

pub mod record;
pub mod reward;
pub mod runner;
pub mod trajectory;

pub use record::{batch_tag, record_file_name, RewardInfo, TrajectoryRecord};
pub use reward::{compute_reward, customer_responses, score_outputs, RewardResult, RewardRule};
pub use runner::{BatchReport, DatasetSource, RewardSummary, TaskOutcome, TaskRunner, UserFactory};
pub use trajectory::{extract_trajectory, TrajectoryNode};
