/// 同步引擎（组合根）
///
/// 职责：
/// - 持有 MergeStore / 游标（经 SyncShared 串行化）与 SyncLoop
/// - 发送消息：本地校验 → MessageSource.submit → 立即合并
/// - 暴露当前消息列表、显示名、观察者注册

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::error::{ChatSyncError, Result};
use crate::events::{EventManager, EventStats, SyncEvent, UpdateOrigin};
use crate::message::Message;
use crate::preferences::Preferences;
use crate::source::{HttpMessageSource, MessageSource, MockMessageSource};
use crate::sync::shared::SyncShared;
use crate::sync::sync_loop::{SyncLoop, TickOutcome};
use crate::sync::SyncPhase;

pub struct SyncEngine {
    config: SyncConfig,
    source: Arc<dyn MessageSource>,
    preferences: Arc<dyn Preferences>,
    shared: Arc<SyncShared>,
    sync_loop: SyncLoop,
    /// 当前显示名（已 trim；未设置时为空串）
    display_name: RwLock<String>,
}

impl SyncEngine {
    /// 创建同步引擎，并从 Preferences 载入显示名
    ///
    /// 不会自动启动轮询，需要调用 `start()`。
    pub async fn new(
        config: SyncConfig,
        source: Arc<dyn MessageSource>,
        preferences: Arc<dyn Preferences>,
    ) -> Result<Self> {
        config.validate()?;

        let display_name = preferences
            .get(&config.display_name_key)
            .await?
            .unwrap_or_default();

        let events = Arc::new(EventManager::new(config.event_capacity));
        let shared = Arc::new(SyncShared::new(events));
        let sync_loop = SyncLoop::new(
            source.clone(),
            shared.clone(),
            config.poll_interval(),
            config.backoff.clone(),
        );

        info!(
            "同步引擎已创建: interval={}ms, display_name={:?}",
            config.poll_interval_ms, display_name
        );

        Ok(Self {
            config,
            source,
            preferences,
            shared,
            sync_loop,
            display_name: RwLock::new(display_name),
        })
    }

    /// 按配置选择 HTTP 或 mock 消息来源
    pub async fn from_config(config: SyncConfig, preferences: Arc<dyn Preferences>) -> Result<Self> {
        let source: Arc<dyn MessageSource> = if config.mock_mode {
            info!("使用离线 mock 消息来源");
            Arc::new(MockMessageSource::new())
        } else {
            Arc::new(HttpMessageSource::new(&config.server, &config.http)?)
        };
        Self::new(config, source, preferences).await
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ============================================================
    // 发送
    // ============================================================

    /// 发送消息
    ///
    /// 内容 trim 后为空或作者为空时返回 `InvalidInput`，不发起网络请求、不进入错误流。
    /// 传输失败原样返回给调用方（不重试），同时上报错误流。
    pub async fn send(&self, content: &str, author: &str) -> Result<Message> {
        let content = content.trim();
        let author = author.trim();
        if content.is_empty() {
            return Err(ChatSyncError::InvalidInput("消息内容不能为空".to_string()));
        }
        if author.is_empty() {
            return Err(ChatSyncError::InvalidInput("作者不能为空".to_string()));
        }

        match self.source.submit(author, content).await {
            Ok(message) => {
                info!("消息发送成功: id={}", message.id);
                self.shared
                    .apply(vec![message.clone()], UpdateOrigin::Send)
                    .await;
                Ok(message)
            }
            Err(e) => {
                warn!("消息发送失败: {}", e);
                self.shared.report_error(&e, UpdateOrigin::Send).await;
                Err(e)
            }
        }
    }

    /// 以当前显示名发送
    pub async fn send_message(&self, content: &str) -> Result<Message> {
        let author = self.display_name();
        self.send(content, &author).await
    }

    // ============================================================
    // 查询
    // ============================================================

    /// 当前有序消息列表
    pub async fn current_messages(&self) -> Vec<Message> {
        self.shared.messages().await
    }

    /// 当前增量拉取游标
    pub async fn cursor(&self) -> Option<DateTime<Utc>> {
        self.shared.cursor().await
    }

    // ============================================================
    // 显示名
    // ============================================================

    pub fn display_name(&self) -> String {
        self.display_name.read().clone()
    }

    /// 设置显示名：trim 后为空返回 false；否则持久化并返回 true
    pub async fn set_display_name(&self, name: &str) -> Result<bool> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Ok(false);
        }

        self.preferences
            .set(&self.config.display_name_key, trimmed)
            .await?;
        *self.display_name.write() = trimmed.to_string();

        info!("显示名已更新: {}", trimmed);
        Ok(true)
    }

    // ============================================================
    // 观察者
    // ============================================================

    /// 注册消息列表变更回调（发送与后台轮询都会触发）
    pub async fn on_messages_updated<F>(&self, listener: F)
    where
        F: Fn(&[Message]) + Send + Sync + 'static,
    {
        self.shared.events().add_messages_listener(listener).await;
    }

    /// 注册错误回调（人类可读字符串）
    pub async fn on_error<F>(&self, listener: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.shared.events().add_error_listener(listener).await;
    }

    /// 移除所有回调（展示层销毁时调用）；已有的广播订阅不受影响
    pub async fn clear_observers(&self) {
        self.shared.events().clear_listeners().await;
    }

    /// 订阅事件流
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.shared.events().subscribe()
    }

    pub async fn event_stats(&self) -> EventStats {
        self.shared.events().get_stats().await
    }

    // ============================================================
    // 生命周期
    // ============================================================

    /// 启动（或重启）后台轮询
    pub async fn start(&self) {
        self.sync_loop.start().await;
    }

    /// 停止后台轮询；返回后不会再有新的 tick
    pub async fn stop(&self) {
        self.sync_loop.stop().await;
    }

    pub async fn shutdown(&self) {
        info!("同步引擎关闭");
        self.stop().await;
    }

    pub async fn is_running(&self) -> bool {
        self.sync_loop.is_running().await
    }

    pub fn loop_phase(&self) -> SyncPhase {
        self.sync_loop.phase()
    }

    /// 立即执行一次拉取合并（不影响后台循环的节奏）
    pub async fn sync_now(&self) -> TickOutcome {
        self.sync_loop.tick().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::TimeZone;

    use crate::preferences::MemoryPreferences;
    use crate::source::test_helpers::{transport_error, ScriptedMessageSource};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_714_550_400 + secs, 0).unwrap()
    }

    async fn engine_with(source: Arc<ScriptedMessageSource>) -> SyncEngine {
        let config = SyncConfig::builder().poll_interval_ms(5).build();
        SyncEngine::new(config, source, Arc::new(MemoryPreferences::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_send_rejects_blank_content_without_io() {
        let source = Arc::new(ScriptedMessageSource::new());
        let engine = engine_with(source.clone()).await;
        let errors = Arc::new(AtomicUsize::new(0));
        let errors_clone = errors.clone();
        engine
            .on_error(move |_| {
                errors_clone.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        let result = engine.send("   ", "alice").await;
        assert!(matches!(result, Err(ChatSyncError::InvalidInput(_))));
        let result = engine.send("hello", "").await;
        assert!(matches!(result, Err(ChatSyncError::InvalidInput(_))));

        assert_eq!(source.submit_count(), 0);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
        assert!(engine.current_messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_send_merges_result_and_notifies() {
        let source = Arc::new(ScriptedMessageSource::new());
        source.push_submit(Ok(Message::new("m1", "alice", "hello", at(5))));
        let engine = engine_with(source.clone()).await;
        let updates = Arc::new(parking_lot::Mutex::new(Vec::<usize>::new()));
        let updates_clone = updates.clone();
        engine
            .on_messages_updated(move |messages| updates_clone.lock().push(messages.len()))
            .await;

        let message = engine.send("  hello  ", "alice").await.unwrap();
        assert_eq!(message.id, "m1");
        assert_eq!(engine.current_messages().await, vec![message]);
        assert_eq!(*updates.lock(), vec![1]);
        // 发送不推进游标
        assert_eq!(engine.cursor().await, None);
    }

    #[tokio::test]
    async fn test_send_trims_content_before_submit() {
        let source = Arc::new(ScriptedMessageSource::new());
        let engine = engine_with(source.clone()).await;
        let message = engine.send("\n hi there \t", " alice ").await.unwrap();
        assert_eq!(message.content, "hi there");
        assert_eq!(message.author, "alice");
    }

    #[tokio::test]
    async fn test_send_failure_is_returned_and_reported() {
        let source = Arc::new(ScriptedMessageSource::new());
        source.push_submit(Err(ChatSyncError::ServerError("Bad Gateway".to_string())));
        let engine = engine_with(source.clone()).await;
        let mut receiver = engine.subscribe();

        let result = engine.send("hello", "alice").await;
        assert!(matches!(result, Err(ChatSyncError::ServerError(ref reason)) if reason == "Bad Gateway"));
        assert_eq!(source.submit_count(), 1);
        assert!(engine.current_messages().await.is_empty());

        match receiver.try_recv() {
            Ok(SyncEvent::SyncFailed { error, origin, .. }) => {
                assert_eq!(error, "Bad Gateway");
                assert_eq!(origin, UpdateOrigin::Send);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_display_name_roundtrip() {
        let prefs = Arc::new(MemoryPreferences::new());
        prefs.set("chat.username", "stored").await.unwrap();
        let source = Arc::new(ScriptedMessageSource::new());
        let engine = SyncEngine::new(SyncConfig::default(), source.clone(), prefs.clone())
            .await
            .unwrap();
        assert_eq!(engine.display_name(), "stored");

        assert!(!engine.set_display_name("   ").await.unwrap());
        assert_eq!(engine.display_name(), "stored");

        assert!(engine.set_display_name("  alice ").await.unwrap());
        assert_eq!(engine.display_name(), "alice");
        assert_eq!(prefs.get("chat.username").await.unwrap().as_deref(), Some("alice"));
        assert_eq!(source.submit_count(), 0);
        assert_eq!(source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_send_message_requires_display_name() {
        let source = Arc::new(ScriptedMessageSource::new());
        let engine = engine_with(source.clone()).await;

        let result = engine.send_message("hello").await;
        assert!(matches!(result, Err(ChatSyncError::InvalidInput(_))));

        engine.set_display_name("bob").await.unwrap();
        let message = engine.send_message("hello").await.unwrap();
        assert_eq!(message.author, "bob");
        assert_eq!(source.submit_count(), 1);
    }

    #[tokio::test]
    async fn test_edit_scenario_through_engine() {
        let source = Arc::new(ScriptedMessageSource::new());
        source.push_fetch(Ok(vec![
            Message::new("1", "a", "one", at(1)),
            Message::new("2", "b", "two", at(2)),
        ]));
        source.push_fetch(Ok(vec![Message::new("1", "a", "edited", at(1))]));
        let engine = engine_with(source.clone()).await;

        engine.sync_now().await;
        let ids: Vec<_> = engine.current_messages().await.into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["1", "2"]);

        engine.sync_now().await;
        let messages = engine.current_messages().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "edited");
        assert_eq!(messages[1].id, "2");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_send_and_poll_overlap() {
        let source = Arc::new(ScriptedMessageSource::new());
        // 轮询结果里包含与发送结果相同的 id，且是更新后的版本
        source.push_fetch(Ok(vec![
            Message::new("shared", "alice", "hello (edited)", at(10)),
            Message::new("other", "bob", "hey", at(11)),
        ]));
        source.push_submit(Ok(Message::new("shared", "alice", "hello", at(10))));
        let engine = Arc::new(engine_with(source.clone()).await);
        let mut receiver = engine.subscribe();

        let sender = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.send("hello", "alice").await })
        };
        let poller = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.sync_now().await })
        };
        sender.await.unwrap().unwrap();
        poller.await.unwrap();

        let messages = engine.current_messages().await;
        assert_eq!(messages.len(), 2);
        let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["shared", "other"]);

        // 两次合并各发一次事件；最后一次合并决定 "shared" 的内容
        let first = receiver.try_recv().unwrap();
        let last = receiver.try_recv().unwrap();
        assert!(receiver.try_recv().is_err());
        assert_ne!(first.origin(), last.origin());
        let expected = match last.origin() {
            UpdateOrigin::Send => "hello",
            UpdateOrigin::Poll => "hello (edited)",
        };
        assert_eq!(messages[0].content, expected);
        match last {
            SyncEvent::MessagesUpdated { messages: view, .. } => assert_eq!(view, messages),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clear_observers_stops_callbacks() {
        let source = Arc::new(ScriptedMessageSource::new());
        let engine = engine_with(source.clone()).await;
        let updates = Arc::new(AtomicUsize::new(0));
        let updates_clone = updates.clone();
        engine
            .on_messages_updated(move |_| {
                updates_clone.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        let mut receiver = engine.subscribe();

        engine.send("one", "alice").await.unwrap();
        engine.clear_observers().await;
        engine.send("two", "alice").await.unwrap();

        assert_eq!(updates.load(Ordering::SeqCst), 1);
        assert_eq!(engine.event_stats().await.listener_count, 0);
        // 广播订阅仍然收到两次
        assert!(receiver.try_recv().is_ok());
        assert!(receiver.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_observers_see_mutations_in_order() {
        let source = Arc::new(ScriptedMessageSource::new());
        for i in 0..20 {
            source.push_fetch(Ok(vec![Message::new(format!("p{}", i), "bot", "tick", at(i))]));
        }
        let engine = Arc::new(engine_with(source.clone()).await);
        let sizes = Arc::new(parking_lot::Mutex::new(Vec::<usize>::new()));
        let sizes_clone = sizes.clone();
        engine
            .on_messages_updated(move |messages| sizes_clone.lock().push(messages.len()))
            .await;

        engine.start().await;
        for i in 0..10 {
            engine.send(&format!("msg {}", i), "alice").await.unwrap();
        }
        while engine.cursor().await != Some(at(19)) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        engine.stop().await;

        // 每次合并都新增一条且严格按顺序通知
        let sizes = sizes.lock().clone();
        assert_eq!(sizes, (1..=30).collect::<Vec<_>>());
        assert_eq!(engine.current_messages().await.len(), 30);
    }

    #[tokio::test]
    async fn test_poll_errors_reach_error_listener() {
        let source = Arc::new(ScriptedMessageSource::new());
        source.push_fetch(Err(transport_error()));
        let engine = engine_with(source.clone()).await;
        let errors = Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));
        let errors_clone = errors.clone();
        engine
            .on_error(move |e| errors_clone.lock().push(e.to_string()))
            .await;

        assert!(matches!(engine.sync_now().await, TickOutcome::Failed(_)));
        assert_eq!(
            *errors.lock(),
            vec!["Transport error: connection refused".to_string()]
        );
        assert_eq!(engine.cursor().await, None);
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let source = Arc::new(ScriptedMessageSource::new());
        let engine = engine_with(source.clone()).await;
        assert_eq!(engine.loop_phase(), SyncPhase::Idle);
        assert!(!engine.is_running().await);

        engine.start().await;
        assert!(engine.is_running().await);
        assert_eq!(engine.loop_phase(), SyncPhase::Running);

        engine.shutdown().await;
        assert!(!engine.is_running().await);
        assert_eq!(engine.loop_phase(), SyncPhase::Idle);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = SyncConfig::builder().poll_interval_ms(0).build();
        let result = SyncEngine::new(
            config,
            Arc::new(ScriptedMessageSource::new()),
            Arc::new(MemoryPreferences::new()),
        )
        .await;
        assert!(matches!(result, Err(ChatSyncError::Config(_))));
    }

    #[tokio::test]
    async fn test_mock_mode_engine() {
        let config = SyncConfig::builder().mock_mode(true).poll_interval_ms(5).build();
        let engine = SyncEngine::from_config(config, Arc::new(MemoryPreferences::new()))
            .await
            .unwrap();

        engine.sync_now().await;
        engine.sync_now().await;
        assert_eq!(engine.current_messages().await.len(), 1);

        let sent = engine.send("hi", "alice").await.unwrap();
        let messages = engine.current_messages().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages.last().map(|m| m.id.clone()), Some(sent.id));
    }
}
