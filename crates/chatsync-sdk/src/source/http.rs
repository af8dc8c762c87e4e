//! HTTP 消息来源 - 基于 reqwest 的 REST 实现
//!
//! - `POST {base_url}{message_path}`，JSON body `{author, content}`，返回单条消息
//! - `GET {base_url}{message_path}?since=<RFC3339>`，返回消息数组

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Response, Url};
use tracing::{debug, error, info};

use crate::config::{HttpClientConfig, ServerConfig};
use crate::error::{ChatSyncError, Result};
use crate::message::{Message, SendMessageRequest};
use crate::source::MessageSource;
use crate::version::SDK_VERSION;

/// HTTP 消息来源
pub struct HttpMessageSource {
    client: Client,
    endpoint: Url,
}

impl HttpMessageSource {
    /// 创建新的 HTTP 消息来源
    pub fn new(server: &ServerConfig, config: &HttpClientConfig) -> Result<Self> {
        let endpoint = Self::build_endpoint(server)?;

        let mut builder = Client::builder().user_agent(format!("chatsync-sdk/{}", SDK_VERSION));

        if let Some(timeout) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(timeout));
        }

        if let Some(timeout) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let client = builder
            .build()
            .map_err(|e| ChatSyncError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;

        info!("HTTP 消息来源已创建: {}", endpoint);

        Ok(Self { client, endpoint })
    }

    fn build_endpoint(server: &ServerConfig) -> Result<Url> {
        let base = Url::parse(server.base_url.trim())
            .map_err(|e| ChatSyncError::Config(format!("服务器地址不正确: {}", e)))?;
        base.join(&server.message_path)
            .map_err(|e| ChatSyncError::Config(format!("消息路径不正确: {}", e)))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// 拉取地址；since 按 RFC 3339（UTC, 'Z'）编码并保留原有精度
    pub fn fetch_url(&self, since: Option<DateTime<Utc>>) -> Url {
        let mut url = self.endpoint.clone();
        if let Some(since) = since {
            url.query_pairs_mut()
                .append_pair("since", &since.to_rfc3339_opts(SecondsFormat::AutoSi, true));
        }
        url
    }

    /// 校验状态码，非 2xx 映射为 ServerError（使用状态码的标准描述）
    fn validate(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let reason = status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        error!("服务端返回错误状态: {} ({})", status.as_u16(), reason);
        Err(ChatSyncError::ServerError(reason))
    }
}

#[async_trait]
impl MessageSource for HttpMessageSource {
    async fn submit(&self, author: &str, content: &str) -> Result<Message> {
        let body = SendMessageRequest {
            author: author.to_string(),
            content: content.to_string(),
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?;

        // 解码失败经 From<reqwest::Error> 映射为 InvalidResponse
        let message: Message = Self::validate(response)?.json().await?;

        debug!("消息已提交: id={}", message.id);
        Ok(message)
    }

    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<Vec<Message>> {
        let url = self.fetch_url(since);

        let response = self.client.get(url).send().await?;
        let messages: Vec<Message> = Self::validate(response)?.json().await?;

        debug!("拉取到 {} 条消息 (since={:?})", messages.len(), since);
        Ok(messages)
    }
}
