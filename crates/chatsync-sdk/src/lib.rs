//! ChatSync SDK - 聊天消息轮询同步核心
//!
//! 本 SDK 提供：
//! - 🔁 可取消的后台轮询循环，基于 since 游标增量拉取
//! - 🧩 以 id 去重、按时间排序的幂等合并（支持流式消息的修订）
//! - 📤 发送消息并立即合并到本地视图
//! - 📣 消息列表变更与错误事件（回调 + 广播订阅）
//! - 🧵 并发安全：所有合并在同一串行区内完成
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chatsync_sdk::{MemoryPreferences, SyncConfig, SyncEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SyncConfig::builder()
//!         .base_url("http://localhost:8080")
//!         .poll_interval_ms(500)
//!         .build();
//!
//!     let engine = SyncEngine::from_config(config, Arc::new(MemoryPreferences::new())).await?;
//!
//!     engine.on_messages_updated(|messages| {
//!         println!("当前共 {} 条消息", messages.len());
//!     }).await;
//!     engine.on_error(|error| eprintln!("同步错误: {}", error)).await;
//!
//!     engine.set_display_name("alice").await?;
//!     engine.start().await;
//!     engine.send_message("Hello, World!").await?;
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod message;
pub mod preferences;
pub mod source;
pub mod sync;
pub mod version;

pub use config::{HttpClientConfig, ServerConfig, SyncConfig, SyncConfigBuilder};
pub use error::{ChatSyncError, Result};
pub use events::{EventManager, EventStats, SyncEvent, UpdateOrigin};
pub use message::{Message, SendMessageRequest};
pub use preferences::{KvPreferences, MemoryPreferences, Preferences};
pub use source::{HttpMessageSource, MessageSource, MockMessageSource};
pub use sync::{
    BackoffPolicy, MergeStats, MergeStore, SyncCursor, SyncEngine, SyncLoop, SyncPhase, TickOutcome,
};
pub use version::SDK_VERSION;
