//! 拉取失败退避策略
//!
//! 默认关闭（固定间隔轮询）。开启后，连续失败会拉长下一次 sleep，成功一次即复位。
//! 退避永远不会让循环停止。

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChatSyncError, Result};

/// 退避策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// 首次失败后的延迟（毫秒）
    pub base_delay_ms: u64,
    /// 最大延迟（毫秒）
    pub max_delay_ms: u64,
    /// 指数退避因子
    pub backoff_factor: f64,
    /// 随机抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl BackoffPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.base_delay_ms == 0 || self.max_delay_ms < self.base_delay_ms {
            return Err(ChatSyncError::Config(format!(
                "退避延迟不合法: base={}ms, max={}ms",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        if self.backoff_factor < 1.0 {
            return Err(ChatSyncError::Config("backoff_factor 不能小于 1.0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ChatSyncError::Config("jitter_factor 必须在 0.0-1.0 之间".to_string()));
        }
        Ok(())
    }

    /// 计算第 `failures` 次连续失败后的延迟（未加抖动）
    pub fn capped_delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        // base * factor^(failures-1)
        let exponent = (failures - 1).min(32) as f64;
        let delay = self.base_delay_ms as f64 * self.backoff_factor.powf(exponent);
        Duration::from_millis(delay.min(self.max_delay_ms as f64) as u64)
    }

    /// 带抖动的延迟
    pub fn delay_for(&self, failures: u32) -> Duration {
        let capped = self.capped_delay(failures).as_millis() as f64;
        let jitter = capped * self.jitter_factor * (rand::random::<f64>() - 0.5);
        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }
}

/// 连续失败计数
#[derive(Debug, Clone)]
pub struct FailureBackoff {
    policy: Option<BackoffPolicy>,
    consecutive_failures: u32,
}

impl FailureBackoff {
    pub fn new(policy: Option<BackoffPolicy>) -> Self {
        Self {
            policy,
            consecutive_failures: 0,
        }
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// 是否处于退避中
    pub fn is_backing_off(&self) -> bool {
        self.policy.is_some() && self.consecutive_failures > 0
    }

    /// 下一次 sleep 的时长：未退避时为轮询间隔，退避时取两者较大值
    pub fn next_sleep(&self, interval: Duration) -> Duration {
        match &self.policy {
            Some(policy) if self.consecutive_failures > 0 => {
                policy.delay_for(self.consecutive_failures).max(interval)
            }
            _ => interval,
        }
    }
}
