//! 消息来源（MessageSource）
//!
//! 网络边界的抽象：提交一条新消息、拉取某个时间点之后的消息。
//! 引擎不假设 `fetch(since)` 严格只返回更新的消息，结果会原样交给幂等合并。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::message::Message;

pub mod http;
pub mod mock;

pub use http::HttpMessageSource;
pub use mock::MockMessageSource;

/// 消息来源 trait（由传输层实现）
///
/// 失败只会是 `Transport` / `InvalidResponse` / `ServerError` 三类。
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// 提交新消息，返回权威来源分配了 id 与时间戳的消息
    async fn submit(&self, author: &str, content: &str) -> Result<Message>;

    /// 拉取 since 之后的消息；since 为 None 时从头拉取
    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Message>>;
}
