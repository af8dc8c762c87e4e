/// 后台轮询循环
///
/// 状态机：Idle → start() → Running（Fetching → Applying → Sleeping → …）→ stop() → Idle
///
/// - 每个 tick：fetch(since=游标) → 非空则合并并推进游标 → sleep
/// - 拉取失败：上报错误流，游标不动，循环继续（下一个 tick 即重试）
/// - fetch 与 sleep 是仅有的取消点，合并与上报总会完整执行；stop() 返回后不会再开始新的 tick
/// - 再次 start() 会先停止旧循环，游标与存储保持不变

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;
use crate::events::UpdateOrigin;
use crate::message::Message;
use crate::source::MessageSource;
use crate::sync::backoff::{BackoffPolicy, FailureBackoff};
use crate::sync::shared::SyncShared;
use crate::sync::SyncPhase;

/// 单个 tick 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// 拉取到消息并已合并
    Applied {
        fetched: usize,
        cursor: Option<DateTime<Utc>>,
    },
    /// 拉取成功但没有新消息
    Empty,
    /// 拉取失败（已上报错误流）
    Failed(String),
}

/// 正在运行的循环
struct RunningLoop {
    token: CancellationToken,
    task: JoinHandle<()>,
}

pub struct SyncLoop {
    source: Arc<dyn MessageSource>,
    shared: Arc<SyncShared>,
    interval: Duration,
    backoff: Option<BackoffPolicy>,
    phase: Arc<RwLock<SyncPhase>>,
    running: Mutex<Option<RunningLoop>>,
}

impl SyncLoop {
    pub fn new(
        source: Arc<dyn MessageSource>,
        shared: Arc<SyncShared>,
        interval: Duration,
        backoff: Option<BackoffPolicy>,
    ) -> Self {
        Self {
            source,
            shared,
            interval,
            backoff,
            phase: Arc::new(RwLock::new(SyncPhase::Idle)),
            running: Mutex::new(None),
        }
    }

    /// 启动循环；已在运行时先取消旧循环再启动新循环
    #[instrument(skip(self))]
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if let Some(previous) = running.take() {
            info!("重启轮询循环");
            Self::shutdown(previous).await;
        }

        let token = CancellationToken::new();
        *self.phase.write() = SyncPhase::Running;

        let task = tokio::spawn(Self::run(
            self.source.clone(),
            self.shared.clone(),
            self.interval,
            FailureBackoff::new(self.backoff.clone()),
            self.phase.clone(),
            token.clone(),
        ));

        *running = Some(RunningLoop { token, task });
        info!("轮询循环已启动: interval={:?}", self.interval);
    }

    /// 停止循环（幂等）；返回时循环任务已退出
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        match running.take() {
            Some(previous) => {
                Self::shutdown(previous).await;
                info!("轮询循环已停止");
            }
            None => debug!("轮询循环未运行，忽略 stop"),
        }
        *self.phase.write() = SyncPhase::Idle;
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.read()
    }

    /// 手动执行一个 tick（不 sleep）
    pub async fn tick(&self) -> TickOutcome {
        Self::run_tick(self.source.as_ref(), &self.shared).await
    }

    async fn shutdown(previous: RunningLoop) {
        previous.token.cancel();
        if let Err(e) = previous.task.await {
            if e.is_panic() {
                warn!("轮询任务异常退出: {}", e);
            }
        }
    }

    async fn run(
        source: Arc<dyn MessageSource>,
        shared: Arc<SyncShared>,
        interval: Duration,
        mut backoff: FailureBackoff,
        phase: Arc<RwLock<SyncPhase>>,
        token: CancellationToken,
    ) {
        loop {
            // Fetching（取消点）
            let since = shared.cursor().await;
            let fetched = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                result = source.fetch(since) => result,
            };

            // Applying 不可取消：存储一旦修改，对应事件必须发出
            let outcome = Self::settle(&shared, since, fetched).await;

            match outcome {
                TickOutcome::Failed(_) => backoff.record_failure(),
                _ => backoff.record_success(),
            }
            *phase.write() = if backoff.is_backing_off() {
                SyncPhase::BackingOff
            } else {
                SyncPhase::Running
            };

            // Sleeping（取消点）
            let pause = backoff.next_sleep(interval);
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }
        debug!("轮询任务退出");
    }

    async fn run_tick(source: &dyn MessageSource, shared: &SyncShared) -> TickOutcome {
        let since = shared.cursor().await;
        let fetched = source.fetch(since).await;
        Self::settle(shared, since, fetched).await
    }

    /// 合并拉取结果或上报错误
    async fn settle(
        shared: &SyncShared,
        since: Option<DateTime<Utc>>,
        fetched: Result<Vec<Message>>,
    ) -> TickOutcome {
        match fetched {
            Ok(batch) if batch.is_empty() => {
                debug!("无新消息 (since={:?})", since);
                TickOutcome::Empty
            }
            Ok(batch) => {
                let fetched = batch.len();
                shared.apply(batch, UpdateOrigin::Poll).await;
                let cursor = shared.cursor().await;
                debug!("拉取并合并 {} 条消息，游标={:?}", fetched, cursor);
                TickOutcome::Applied { fetched, cursor }
            }
            Err(e) => {
                if e.is_transient() {
                    warn!("拉取消息失败，下个周期重试: {}", e);
                } else {
                    error!("拉取消息失败（非瞬时错误）: {}", e);
                }
                shared.report_error(&e, UpdateOrigin::Poll).await;
                TickOutcome::Failed(e.to_string())
            }
        }
    }
}

impl Drop for SyncLoop {
    fn drop(&mut self) {
        // 进程/会话销毁时不留下孤儿任务
        if let Ok(mut running) = self.running.try_lock() {
            if let Some(previous) = running.take() {
                previous.token.cancel();
            }
        }
    }
}
