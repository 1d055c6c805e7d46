//! 传输抽象
//!
//! 执行引擎只依赖以下能力：认证建连、打开交互式通道、写字节、
//! 非阻塞读字节、发送控制字节、关闭。任何实现这些 trait 的传输都可替换 russh。

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Endpoint;

/// 中断信号（Ctrl-C）
pub const INTERRUPT: u8 = 0x03;

/// 伪终端尺寸，只影响远端输出的折行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewport {
    pub term: String,
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            term: "xterm".to_string(),
            width: 120,
            height: 80,
        }
    }
}

/// 建立到目标的已认证连接
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: Connection;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Connection>;
}

/// 已认证的连接
#[async_trait]
pub trait Connection: Send + Sync {
    type Channel: ShellChannel;

    /// 打开一个带伪终端的交互式 shell 通道
    async fn open_shell(&self, viewport: &Viewport) -> Result<Self::Channel>;

    /// 底层传输是否仍然可用
    fn is_alive(&self) -> bool {
        true
    }

    /// 尽力断开，忽略失败
    async fn disconnect(&self) {}
}

/// 单次命令使用的交互式通道
#[async_trait]
pub trait ShellChannel: Send {
    /// 写入字节
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// 非阻塞读取：返回当前已到达的一段字节，没有数据时返回 None
    fn try_recv(&mut self) -> Result<Option<Vec<u8>>>;

    /// 远端是否已结束（退出码 / EOF / 关闭）
    fn is_finished(&self) -> bool;

    /// 远端上报的退出码
    fn exit_status(&self) -> Option<u32> {
        None
    }

    /// 关闭通道
    async fn close(&mut self) -> Result<()>;
}
