//! SSH执行模块
//! 会话管理、命令执行，以及基于 russh 的传输实现

pub mod client;
pub mod executor;
pub mod session;
pub mod transport;

pub use client::{ConnectOptions, RusshChannel, RusshConnection, RusshConnector};
pub use executor::{CommandExecutor, ExecutorOptions};
pub use session::{ConnectionState, SessionLease, SessionManager};
pub use transport::{Connection, Connector, ShellChannel, Viewport, INTERRUPT};

/// 基于 russh 的执行器
pub type SshExecutor = CommandExecutor<RusshConnector>;
