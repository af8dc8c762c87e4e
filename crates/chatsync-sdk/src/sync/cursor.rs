//! 增量拉取游标
//!
//! 记录已应用的拉取结果中最大的 timestamp，作为下一次 fetch 的 since 参数。
//! 只前进不后退：服务端返回乱序或过期消息时保持原值。

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::message::Message;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncCursor {
    since: Option<DateTime<Utc>>,
}

impl SyncCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前游标；None 表示从头拉取
    pub fn since(&self) -> Option<DateTime<Utc>> {
        self.since
    }

    /// 用一批刚拉取到的消息推进游标，返回是否发生了变化
    pub fn advance(&mut self, batch: &[Message]) -> bool {
        match batch.iter().map(|m| m.timestamp).max() {
            Some(latest) => self.advance_to(latest),
            None => false,
        }
    }

    /// 推进到指定时间点（不会后退）
    pub fn advance_to(&mut self, candidate: DateTime<Utc>) -> bool {
        match self.since {
            Some(current) if candidate <= current => {
                debug!("游标保持不变: current={}, candidate={}", current, candidate);
                false
            }
            _ => {
                self.since = Some(candidate);
                true
            }
        }
    }
}
