//! SDK 配置
//!
//! 轮询间隔、服务器地址、HTTP 超时、失败退避等，全部通过 `SyncConfig` 注入。

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChatSyncError, Result};
use crate::sync::backoff::BackoffPolicy;

/// 默认轮询间隔（毫秒）
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// 显示名在 Preferences 中的默认 key
pub const DEFAULT_DISPLAY_NAME_KEY: &str = "chat.username";

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 服务器基础地址，如 http://localhost:8080
    pub base_url: String,
    /// 消息资源路径
    pub message_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            message_path: "/messages".to_string(),
        }
    }
}

/// HTTP 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// 连接超时（秒）
    pub connect_timeout_secs: Option<u64>,
    /// 请求超时（秒）
    pub request_timeout_secs: Option<u64>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: Some(10),
            request_timeout_secs: Some(30),
        }
    }
}

/// 同步 SDK 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// HTTP 客户端配置
    pub http: HttpClientConfig,
    /// 轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 连续失败时的退避策略；None 表示固定间隔
    pub backoff: Option<BackoffPolicy>,
    /// 事件广播缓冲容量
    pub event_capacity: usize,
    /// 显示名持久化 key
    pub display_name_key: String,
    /// 离线 mock 模式（不访问网络）
    pub mock_mode: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            http: HttpClientConfig::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            backoff: None,
            event_capacity: 256,
            display_name_key: DEFAULT_DISPLAY_NAME_KEY.to_string(),
            mock_mode: false,
        }
    }
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::new()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(ChatSyncError::Config("poll_interval_ms 必须大于 0".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(ChatSyncError::Config("event_capacity 必须大于 0".to_string()));
        }
        if self.display_name_key.is_empty() {
            return Err(ChatSyncError::Config("display_name_key 不能为空".to_string()));
        }
        let base_url = self.server.base_url.trim();
        if base_url.is_empty() {
            return Err(ChatSyncError::Config("服务器地址不能为空".to_string()));
        }
        reqwest::Url::parse(base_url)
            .map_err(|e| ChatSyncError::Config(format!("服务器地址不正确: {} ({})", base_url, e)))?;
        if let Some(backoff) = &self.backoff {
            backoff.validate()?;
        }
        Ok(())
    }
}

pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    pub fn base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.server.base_url = url.into();
        self
    }

    pub fn message_path<S: Into<String>>(mut self, path: S) -> Self {
        self.config.server.message_path = path.into();
        self
    }

    pub fn server_config(mut self, server: ServerConfig) -> Self {
        self.config.server = server;
        self
    }

    pub fn http_client_config(mut self, http: HttpClientConfig) -> Self {
        self.config.http = http;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn poll_interval_ms(mut self, millis: u64) -> Self {
        self.config.poll_interval_ms = millis;
        self
    }

    pub fn backoff(mut self, policy: BackoffPolicy) -> Self {
        self.config.backoff = Some(policy);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn display_name_key<S: Into<String>>(mut self, key: S) -> Self {
        self.config.display_name_key = key.into();
        self
    }

    pub fn mock_mode(mut self, enabled: bool) -> Self {
        self.config.mock_mode = enabled;
        self
    }

    pub fn build(self) -> SyncConfig {
        self.config
    }
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.server.message_path, "/messages");
        assert_eq!(config.display_name_key, "chat.username");
    }

    #[test]
    fn test_builder_overrides() {
        let config = SyncConfig::builder()
            .base_url("https://chat.example.com")
            .poll_interval(Duration::from_secs(3))
            .mock_mode(true)
            .build();
        assert_eq!(config.server.base_url, "https://chat.example.com");
        assert_eq!(config.poll_interval_ms, 3000);
        assert!(config.mock_mode);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_interval = SyncConfig::builder().poll_interval_ms(0).build();
        assert!(matches!(zero_interval.validate(), Err(ChatSyncError::Config(_))));

        let bad_url = SyncConfig::builder().base_url("not a url").build();
        assert!(matches!(bad_url.validate(), Err(ChatSyncError::Config(_))));

        let empty_url = SyncConfig::builder().base_url("  ").build();
        assert!(matches!(empty_url.validate(), Err(ChatSyncError::Config(_))));

        let zero_capacity = SyncConfig::builder().event_capacity(0).build();
        assert!(matches!(zero_capacity.validate(), Err(ChatSyncError::Config(_))));
    }

    #[test]
    fn test_config_roundtrips_through_json() {
        let config = SyncConfig::builder().poll_interval_ms(3000).build();
        let json = serde_json::to_string(&config).unwrap();
        let decoded: SyncConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.poll_interval_ms, 3000);
        assert!(decoded.backoff.is_none());
    }
}
