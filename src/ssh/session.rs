//! 会话管理
//!
//! 持有到单一目标的零或一个连接：首次使用时建立，任何失败后丢弃，
//! 由下一次请求重新建立。连接槽位由互斥锁保护，持有租约期间独占使用。

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::{ExecError, Result};
use crate::models::Endpoint;

use super::transport::{Connection, Connector};

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// 尚未建立
    Absent,
    /// 可用
    Live,
    /// 因失败被丢弃，下次请求时重建
    Broken,
}

enum Slot<T> {
    Absent,
    Live(T),
    Broken,
}

impl<T> Slot<T> {
    fn state(&self) -> ConnectionState {
        match self {
            Slot::Absent => ConnectionState::Absent,
            Slot::Live(_) => ConnectionState::Live,
            Slot::Broken => ConnectionState::Broken,
        }
    }
}

/// 会话管理器
pub struct SessionManager<C: Connector> {
    connector: C,
    endpoint: Endpoint,
    slot: Mutex<Slot<C::Connection>>,
}

impl<C: Connector> SessionManager<C> {
    pub fn new(connector: C, endpoint: Endpoint) -> Self {
        Self {
            connector,
            endpoint,
            slot: Mutex::new(Slot::Absent),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// 获取独占租约；并发调用在此排队
    pub async fn lease(&self) -> SessionLease<'_, C> {
        SessionLease {
            manager: self,
            slot: self.slot.lock().await,
        }
    }

    /// 当前连接状态
    pub async fn state(&self) -> ConnectionState {
        self.slot.lock().await.state()
    }

    /// 预先建立连接（可选，run 会按需建立）
    pub async fn ensure_connected(&self) -> Result<()> {
        let mut lease = self.lease().await;
        match lease.get_connection().await {
            Ok(_) => Ok(()),
            Err(e) => {
                lease.invalidate(&e).await;
                Err(e)
            }
        }
    }

    /// 强制丢弃当前连接
    pub async fn invalidate(&self, reason: &ExecError) {
        self.lease().await.invalidate(reason).await;
    }
}

/// 会话租约：持有期间独占连接槽位
pub struct SessionLease<'a, C: Connector> {
    manager: &'a SessionManager<C>,
    slot: MutexGuard<'a, Slot<C::Connection>>,
}

impl<'a, C: Connector> SessionLease<'a, C> {
    pub fn state(&self) -> ConnectionState {
        self.slot.state()
    }

    /// 返回可用连接；缺失、已损坏或传输已关闭时重新建立
    pub async fn get_connection(&mut self) -> Result<&C::Connection> {
        let reusable = matches!(&*self.slot, Slot::Live(conn) if conn.is_alive());

        if !reusable {
            if matches!(&*self.slot, Slot::Live(_)) {
                warn!(
                    endpoint = %self.manager.endpoint.target(),
                    "Cached SSH connection is closed, reconnecting"
                );
                if let Slot::Live(stale) = std::mem::replace(&mut *self.slot, Slot::Broken) {
                    stale.disconnect().await;
                }
            }

            let was = self.slot.state();
            debug!(state = ?was, "Establishing SSH connection");

            let conn = self.manager.connector.connect(&self.manager.endpoint).await?;
            *self.slot = Slot::Live(conn);

            info!(
                endpoint = %self.manager.endpoint.target(),
                reconnect = was == ConnectionState::Broken,
                "SSH connection is live"
            );
        }

        match &*self.slot {
            Slot::Live(conn) => Ok(conn),
            _ => Err(ExecError::connection("no live connection")),
        }
    }

    /// 丢弃当前连接（尽力断开），状态置为 Broken
    pub async fn invalidate(&mut self, reason: &ExecError) {
        warn!(
            endpoint = %self.manager.endpoint.target(),
            error = %reason,
            "Invalidating SSH connection"
        );

        if let Slot::Live(conn) = std::mem::replace(&mut *self.slot, Slot::Broken) {
            conn.disconnect().await;
        }
    }
}
