//! KV 偏好存储 - 基于 sled
//!
//! 值以 JSON 字符串写入 `preferences` Tree。

use std::path::Path;

use async_trait::async_trait;
use sled::{Db, Tree};
use tracing::{info, warn};

use crate::error::{ChatSyncError, Result};
use crate::preferences::Preferences;

const TREE_NAME: &str = "preferences";

/// sled 偏好存储
pub struct KvPreferences {
    /// 保持数据库实例存活
    _db: Db,
    tree: Tree,
}

impl KvPreferences {
    /// 在 `base_path/kv` 下打开（或创建）偏好存储
    pub async fn open(base_path: &Path) -> Result<Self> {
        let kv_path = base_path.join("kv");

        tokio::fs::create_dir_all(&kv_path)
            .await
            .map_err(|e| ChatSyncError::IO(format!("创建 KV 存储目录失败: {}", e)))?;

        // 旧实例可能刚释放文件锁，带退避重试
        const MAX_OPEN_RETRIES: u32 = 6;
        const RETRY_DELAY_MS: u64 = 50;
        let mut attempt = 0;
        let db = loop {
            match sled::open(&kv_path) {
                Ok(db) => break db,
                Err(e) => {
                    let msg = e.to_string();
                    let is_lock = msg.contains("could not acquire lock")
                        || msg.contains("Resource temporarily unavailable")
                        || msg.contains("WouldBlock");
                    attempt += 1;
                    if !is_lock || attempt >= MAX_OPEN_RETRIES {
                        return Err(ChatSyncError::KvStore(format!("打开 sled 数据库失败: {}", e)));
                    }
                    let delay_ms = RETRY_DELAY_MS * (1 << attempt);
                    warn!("sled 数据库被占用，{}ms 后重试 (第 {} 次)", delay_ms, attempt);
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                }
            }
        };
        let tree = db
            .open_tree(TREE_NAME)
            .map_err(|e| ChatSyncError::KvStore(format!("打开偏好 Tree 失败: {}", e)))?;

        info!("偏好存储已打开: {}", kv_path.display());

        Ok(Self { _db: db, tree })
    }
}

#[async_trait]
impl Preferences for KvPreferences {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let result = self
            .tree
            .get(key)
            .map_err(|e| ChatSyncError::KvStore(format!("获取键值对失败: {}", e)))?;

        match result {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| ChatSyncError::Serialization(format!("反序列化值失败: {}", e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| ChatSyncError::Serialization(format!("序列化值失败: {}", e)))?;

        self.tree
            .insert(key, bytes)
            .map_err(|e| ChatSyncError::KvStore(format!("设置键值对失败: {}", e)))?;
        self.tree.flush_async().await?;

        Ok(())
    }
}
