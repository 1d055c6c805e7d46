//! 统一错误模型
//! 定义执行引擎的错误类型，以及错误在结果中的分类

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 渲染给调用方的错误前缀，便于展示层区分错误与命令输出
pub const ERROR_PREFIX: &str = "Error executing command: ";

/// 引擎错误类型
#[derive(Debug, Clone, Error)]
pub enum ExecError {
    #[error("SSH connection error: {0}")]
    Connection(String),

    #[error("SSH authentication failed: {0}")]
    Authentication(String),

    #[error("Failed to load private key: {0}")]
    KeyLoad(String),

    #[error("Host key rejected: {0}")]
    HostKeyRejected(String),

    #[error("SSH channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// 传输层失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 认证或建立连接失败
    Connection,
    /// 已建立连接上的通道打开/读写/关闭失败
    Channel,
}

impl ExecError {
    /// 错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecError::Channel(_) => ErrorKind::Channel,
            ExecError::Connection(_)
            | ExecError::Authentication(_)
            | ExecError::KeyLoad(_)
            | ExecError::HostKeyRejected(_)
            | ExecError::Config(_) => ErrorKind::Connection,
        }
    }

    /// 渲染为面向用户的文本
    pub fn render(&self) -> String {
        format!("{}{}", ERROR_PREFIX, self)
    }

    // 便捷方法
    pub fn connection(msg: impl std::fmt::Display) -> Self {
        ExecError::Connection(msg.to_string())
    }

    pub fn channel(msg: impl std::fmt::Display) -> Self {
        ExecError::Channel(msg.to_string())
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ExecError>;

impl From<config::ConfigError> for ExecError {
    fn from(e: config::ConfigError) -> Self {
        ExecError::Config(e.to_string())
    }
}
