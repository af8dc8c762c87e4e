/// 轮询同步模块
///
/// 职责：
/// - 以 id 去重、按时间排序地合并消息（MergeStore）
/// - 管理增量拉取游标（SyncCursor）
/// - 可取消的后台轮询循环（SyncLoop）
/// - 组合根：发送、查询、显示名、观察者（SyncEngine）

pub mod backoff;
pub mod cursor;
pub mod merge_store;
pub mod shared;
pub mod sync_engine;
pub mod sync_loop;

pub use backoff::{BackoffPolicy, FailureBackoff};
pub use cursor::SyncCursor;
pub use merge_store::{MergeStats, MergeStore};
pub use sync_engine::SyncEngine;
pub use sync_loop::{SyncLoop, TickOutcome};

/// 后台循环阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SyncPhase {
    /// 空闲（未启动或已停止）
    Idle,
    /// 正在轮询
    Running,
    /// 连续失败，退避中（仍在运行）
    BackingOff,
}
