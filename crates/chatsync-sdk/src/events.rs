//! 事件系统模块 - 向展示层推送消息列表变更与错误
//!
//! 功能包括：
//! - 消息列表变更事件（来自发送或后台轮询）
//! - 错误事件（人类可读字符串）
//! - 广播订阅与回调监听两种消费方式
//!
//! 事件在产生它的那次合并的串行区内发出，因此订阅者看到的顺序与合并顺序一致。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use crate::message::Message;

/// 变更来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOrigin {
    /// 用户发送
    Send,
    /// 后台轮询
    Poll,
}

/// SDK 事件类型
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncEvent {
    /// 有序消息列表已变更（携带变更后的完整视图）
    MessagesUpdated {
        messages: Vec<Message>,
        origin: UpdateOrigin,
        timestamp: i64,
    },
    /// 传输/服务端错误
    SyncFailed {
        error: String,
        origin: UpdateOrigin,
        timestamp: i64,
    },
}

impl SyncEvent {
    pub fn messages_updated(messages: Vec<Message>, origin: UpdateOrigin) -> Self {
        SyncEvent::MessagesUpdated {
            messages,
            origin,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn sync_failed(error: impl Into<String>, origin: UpdateOrigin) -> Self {
        SyncEvent::SyncFailed {
            error: error.into(),
            origin,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// 获取事件类型字符串
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::MessagesUpdated { .. } => "messages_updated",
            SyncEvent::SyncFailed { .. } => "sync_failed",
        }
    }

    pub fn origin(&self) -> UpdateOrigin {
        match self {
            SyncEvent::MessagesUpdated { origin, .. } => *origin,
            SyncEvent::SyncFailed { origin, .. } => *origin,
        }
    }

    /// 事件时间（UTC 毫秒）
    pub fn timestamp(&self) -> i64 {
        match self {
            SyncEvent::MessagesUpdated { timestamp, .. } => *timestamp,
            SyncEvent::SyncFailed { timestamp, .. } => *timestamp,
        }
    }
}

/// 消息列表变更回调
pub type MessagesListener = Box<dyn Fn(&[Message]) + Send + Sync>;

/// 错误回调
pub type ErrorListener = Box<dyn Fn(&str) + Send + Sync>;

/// 事件统计信息
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    /// 总事件数
    pub total_events: u64,
    /// 按类型分组的事件数
    pub events_by_type: HashMap<String, u64>,
    /// 监听器数量
    pub listener_count: usize,
    /// 最后事件时间
    pub last_event_time: Option<i64>,
}

/// 事件管理器
///
/// 监听器在 emit 时同步调用；回调内不要阻塞，也不要同步等待 SyncEngine 的其它操作。
pub struct EventManager {
    /// 广播发送器
    sender: broadcast::Sender<SyncEvent>,
    messages_listeners: Arc<RwLock<Vec<MessagesListener>>>,
    error_listeners: Arc<RwLock<Vec<ErrorListener>>>,
    /// 事件统计
    stats: Arc<RwLock<EventStats>>,
}

impl EventManager {
    /// 创建新的事件管理器
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);

        Self {
            sender,
            messages_listeners: Arc::new(RwLock::new(Vec::new())),
            error_listeners: Arc::new(RwLock::new(Vec::new())),
            stats: Arc::new(RwLock::new(EventStats::default())),
        }
    }

    /// 发布事件
    pub async fn emit(&self, event: SyncEvent) {
        debug!("Emitting event: {}", event.event_type());

        {
            let mut stats = self.stats.write().await;
            stats.total_events += 1;
            *stats
                .events_by_type
                .entry(event.event_type().to_string())
                .or_insert(0) += 1;
            stats.last_event_time = Some(event.timestamp());
        }

        match &event {
            SyncEvent::MessagesUpdated { messages, .. } => {
                let listeners = self.messages_listeners.read().await;
                for listener in listeners.iter() {
                    listener(messages.as_slice());
                }
            }
            SyncEvent::SyncFailed { error, .. } => {
                let listeners = self.error_listeners.read().await;
                for listener in listeners.iter() {
                    listener(error.as_str());
                }
            }
        }

        // 无订阅者时 send 会失败，属正常场景（无 UI 客户端），仅打 debug
        if let Err(e) = self.sender.send(event) {
            debug!("Failed to broadcast event (no active receivers): {}", e);
        }
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// 注册消息列表变更回调
    pub async fn add_messages_listener<F>(&self, listener: F)
    where
        F: Fn(&[Message]) + Send + Sync + 'static,
    {
        self.messages_listeners.write().await.push(Box::new(listener));
        self.refresh_listener_count().await;
        info!("Added messages listener");
    }

    /// 注册错误回调
    pub async fn add_error_listener<F>(&self, listener: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.error_listeners.write().await.push(Box::new(listener));
        self.refresh_listener_count().await;
        info!("Added error listener");
    }

    /// 移除所有监听器
    pub async fn clear_listeners(&self) {
        self.messages_listeners.write().await.clear();
        self.error_listeners.write().await.clear();
        self.refresh_listener_count().await;
        info!("Cleared all event listeners");
    }

    async fn refresh_listener_count(&self) {
        let count = self.messages_listeners.read().await.len() + self.error_listeners.read().await.len();
        self.stats.write().await.listener_count = count;
    }

    /// 获取事件统计
    pub async fn get_stats(&self) -> EventStats {
        self.stats.read().await.clone()
    }

    /// 测试用：持有统计写锁，使 emit 停在发出事件之前
    #[cfg(test)]
    pub(crate) async fn hold_stats(&self) -> tokio::sync::RwLockWriteGuard<'_, EventStats> {
        self.stats.write().await
    }
}
