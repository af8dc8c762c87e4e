//! 消息模型
//!
//! 线上格式：`{id, author, content, timestamp, complete}`，timestamp 为 RFC 3339 (UTC)。
//! `complete` 缺省为 true；同时兼容 `isComplete` 字段名。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 聊天消息
///
/// `id` 由权威来源分配（服务端，或离线模式下的客户端），在存储中唯一标识一条消息。
/// 同一 `id` 的后一次观测是前一次的修订版本（流式生成时 content/complete 会变化）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub author: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "complete", alias = "isComplete", default = "default_complete")]
    pub is_complete: bool,
}

fn default_complete() -> bool {
    true
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        author: impl Into<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            content: content.into(),
            timestamp,
            is_complete: true,
        }
    }

    /// 标记为未完成（流式生成中的占位消息）
    pub fn incomplete(mut self) -> Self {
        self.is_complete = false;
        self
    }

    /// 本地时区的短时间格式，如 "14:05"
    pub fn timestamp_formatted(&self) -> String {
        self.timestamp
            .with_timezone(&chrono::Local)
            .format("%H:%M")
            .to_string()
    }
}

/// 发送消息请求体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub author: String,
    pub content: String,
}
