//! 数据模型模块
//! 远端目标、命令请求与执行结果

pub mod command;
pub mod endpoint;

pub use command::{CommandRequest, CommandResult, TerminationReason};
pub use endpoint::{Credential, Endpoint, HostKeyVerification};
