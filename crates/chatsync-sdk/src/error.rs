use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatSyncError {
    /// 本地校验失败（空内容、空作者、空显示名），不触发任何 I/O
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// 网络/连接层错误
    #[error("Transport error: {0}")]
    Transport(String),
    /// 响应信封格式错误或无法解析
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// 服务端返回非 2xx，携带服务端给出的原因
    #[error("{0}")]
    ServerError(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("KV store error: {0}")]
    KvStore(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    IO(String),
}

impl From<serde_json::Error> for ChatSyncError {
    fn from(error: serde_json::Error) -> Self {
        ChatSyncError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for ChatSyncError {
    fn from(error: std::io::Error) -> Self {
        ChatSyncError::IO(error.to_string())
    }
}

impl From<sled::Error> for ChatSyncError {
    fn from(error: sled::Error) -> Self {
        ChatSyncError::KvStore(error.to_string())
    }
}

impl From<reqwest::Error> for ChatSyncError {
    fn from(error: reqwest::Error) -> Self {
        // 响应体解码失败属于信封问题，其余（连接、超时、请求构造）都算传输层
        if error.is_decode() {
            ChatSyncError::InvalidResponse(error.to_string())
        } else {
            ChatSyncError::Transport(error.to_string())
        }
    }
}

impl ChatSyncError {
    /// 是否为远端来源的瞬时错误（后台循环会在下一个 tick 自动重试）
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChatSyncError::Transport(_)
                | ChatSyncError::InvalidResponse(_)
                | ChatSyncError::ServerError(_)
        )
    }

    /// 是否为本地输入校验错误（不进入错误事件流）
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, ChatSyncError::InvalidInput(_))
    }
}

pub type Result<T> = std::result::Result<T, ChatSyncError>;
