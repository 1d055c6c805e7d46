//! 远程命令执行引擎
//! 在单一目标上维护持久 SSH 会话，逐条执行命令并返回规范化文本结果

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod output;
pub mod ssh;
pub mod telemetry;

pub use error::{ErrorKind, ExecError};
pub use models::{CommandRequest, CommandResult, Endpoint, TerminationReason};
pub use ssh::{CommandExecutor, ExecutorOptions, SessionManager, SshExecutor};

/// 根据配置构建基于 russh 的执行器（不会立即建连）
pub fn build_executor(config: &config::AppConfig) -> Result<SshExecutor, ExecError> {
    let connector = ssh::RusshConnector::new(config.connect_options()?);
    let session = Arc::new(SessionManager::new(connector, config.endpoint()?));
    Ok(CommandExecutor::new(session, config.executor_options()))
}
