/// 串行区
///
/// MergeStore 与游标是仅有的共享可变状态，所有修改都经过这里的同一把锁：
/// 发送路径与后台循环的 apply 严格串行，事件在锁内发出，顺序与合并顺序一致。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ChatSyncError;
use crate::events::{EventManager, SyncEvent, UpdateOrigin};
use crate::message::Message;
use crate::sync::cursor::SyncCursor;
use crate::sync::merge_store::MergeStore;

#[derive(Debug, Default)]
struct SyncState {
    store: MergeStore,
    cursor: SyncCursor,
}

pub struct SyncShared {
    state: Mutex<SyncState>,
    events: Arc<EventManager>,
}

impl SyncShared {
    pub fn new(events: Arc<EventManager>) -> Self {
        Self {
            state: Mutex::new(SyncState::default()),
            events,
        }
    }

    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }

    /// 当前有序视图
    pub async fn messages(&self) -> Vec<Message> {
        self.state.lock().await.store.messages()
    }

    /// 当前游标
    pub async fn cursor(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.cursor.since()
    }

    /// 合并一批消息并通知观察者
    ///
    /// 空批次不修改任何状态、不发事件。来自轮询的批次同时推进游标；
    /// 发送路径不推进游标。
    pub async fn apply(&self, batch: Vec<Message>, origin: UpdateOrigin) -> Vec<Message> {
        let mut state = self.state.lock().await;
        if batch.is_empty() {
            return state.store.messages();
        }

        if origin == UpdateOrigin::Poll && state.cursor.advance(&batch) {
            debug!("游标前进: {:?}", state.cursor.since());
        }

        let view = state.store.apply(batch);
        self.events
            .emit(SyncEvent::messages_updated(view.clone(), origin))
            .await;
        view
    }

    /// 通过错误流上报（人类可读字符串）；本地输入校验错误不上报
    pub async fn report_error(&self, error: &ChatSyncError, origin: UpdateOrigin) {
        if error.is_invalid_input() {
            debug!("忽略本地校验错误: {}", error);
            return;
        }
        let _state = self.state.lock().await;
        self.events
            .emit(SyncEvent::sync_failed(error.to_string(), origin))
            .await;
    }
}
