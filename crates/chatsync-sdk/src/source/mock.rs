//! 离线 mock 消息来源
//!
//! submit 在本地生成 UUID 与当前时间；fetch 总是返回同一条欢迎消息，
//! 反复拉取由幂等合并吸收。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::message::Message;
use crate::source::MessageSource;

const MOCK_AUTHOR: &str = "Codex";
const MOCK_CONTENT: &str = "Hello from the mock server";

pub struct MockMessageSource {
    welcome: Message,
}

impl MockMessageSource {
    pub fn new() -> Self {
        Self {
            welcome: Message::new(Uuid::new_v4().to_string(), MOCK_AUTHOR, MOCK_CONTENT, Utc::now()),
        }
    }

    pub fn welcome(&self) -> &Message {
        &self.welcome
    }
}

impl Default for MockMessageSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageSource for MockMessageSource {
    async fn submit(&self, author: &str, content: &str) -> Result<Message> {
        Ok(Message::new(Uuid::new_v4().to_string(), author, content, Utc::now()))
    }

    async fn fetch(&self, _since: Option<DateTime<Utc>>) -> Result<Vec<Message>> {
        Ok(vec![self.welcome.clone()])
    }
}
