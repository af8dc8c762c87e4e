/// 合并存储
///
/// 职责：
/// - 以 id 为键保存去重后的消息
/// - 整条 upsert（不做字段级合并），后到的观测覆盖先到的
/// - 维护按 timestamp 升序的有序视图（同一时间戳按 id 排序）
///
/// 不做 I/O，不会失败。并发串行化由持有者（SyncEngine）负责。

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::message::Message;

/// 有序索引键：(timestamp, id)
type OrderKey = (DateTime<Utc>, String);

#[derive(Debug, Default, Clone)]
pub struct MergeStore {
    /// id -> 消息
    by_id: HashMap<String, Message>,
    /// 有序索引
    order: BTreeSet<OrderKey>,
}

/// 单次 apply 的合并统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    pub replaced: usize,
    pub unchanged: usize,
}

impl MergeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 应用一批消息，返回合并后的有序视图
    ///
    /// 批内同一 id 出现多次时，按批次迭代顺序后者生效。
    pub fn apply<I>(&mut self, batch: I) -> Vec<Message>
    where
        I: IntoIterator<Item = Message>,
    {
        let stats = self.upsert_batch(batch);
        if stats != MergeStats::default() {
            debug!(
                "合并完成: inserted={}, replaced={}, unchanged={}, total={}",
                stats.inserted,
                stats.replaced,
                stats.unchanged,
                self.len()
            );
        }
        self.messages()
    }

    /// 只做 upsert，返回统计
    pub fn upsert_batch<I>(&mut self, batch: I) -> MergeStats
    where
        I: IntoIterator<Item = Message>,
    {
        let mut stats = MergeStats::default();
        for message in batch {
            match self.by_id.get(&message.id) {
                Some(existing) if *existing == message => {
                    stats.unchanged += 1;
                }
                Some(existing) => {
                    // 服务端流式更新时 timestamp 也可能变化，旧索引必须先移除
                    self.order.remove(&(existing.timestamp, existing.id.clone()));
                    self.order.insert((message.timestamp, message.id.clone()));
                    self.by_id.insert(message.id.clone(), message);
                    stats.replaced += 1;
                }
                None => {
                    self.order.insert((message.timestamp, message.id.clone()));
                    self.by_id.insert(message.id.clone(), message);
                    stats.inserted += 1;
                }
            }
        }
        stats
    }

    /// 当前有序视图
    pub fn messages(&self) -> Vec<Message> {
        self.order
            .iter()
            .filter_map(|(_, id)| self.by_id.get(id).cloned())
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.by_id.get(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
