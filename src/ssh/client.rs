//! 基于 russh 的传输实现
//!
//! 提供 `Connector` / `Connection` / `ShellChannel` 的真实 SSH 版本

use std::sync::Arc;
use std::time::Duration;

use std::future::Future;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use futures::FutureExt;
use russh::client;
use russh::ChannelMsg;
use russh_keys::key::PublicKey;
use russh_keys::load_secret_key;
use russh_keys::PublicKeyBase64;
use secrecy::ExposeSecret;
use sha2::Digest;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::error::{ExecError, Result};
use crate::models::{Credential, Endpoint, HostKeyVerification};

use super::transport::{Connection, Connector, ShellChannel, Viewport};

/// 建连选项
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// 建连 + 认证的总超时
    pub connect_timeout: Duration,
    pub host_key_verification: HostKeyVerification,
    /// 固定的主机密钥指纹，格式同 `ssh-keygen -lf`（`SHA256:<base64>`，前缀可省略）
    pub host_key_fingerprint: Option<String>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            host_key_verification: HostKeyVerification::default(),
            host_key_fingerprint: None,
        }
    }
}

/// russh 连接器
#[derive(Debug, Clone, Default)]
pub struct RusshConnector {
    options: ConnectOptions,
}

impl RusshConnector {
    pub fn new(options: ConnectOptions) -> Self {
        Self { options }
    }

    async fn establish(&self, endpoint: &Endpoint) -> Result<RusshConnection> {
        let client_config = Arc::new(client::Config {
            preferred: russh::Preferred::default(),
            ..Default::default()
        });

        let handler = ClientHandler {
            verification_mode: self.options.host_key_verification,
            pinned_fingerprint: self
                .options
                .host_key_fingerprint
                .as_deref()
                .map(normalize_fingerprint),
            host: endpoint.host.clone(),
            port: endpoint.port,
        };

        let mut handle =
            client::connect(client_config, (endpoint.host.clone(), endpoint.port), handler)
                .await
                .map_err(|e| {
                    error!(error = %e, endpoint = %endpoint.target(), "SSH connect failed");
                    match e {
                        russh::Error::UnknownKey => {
                            ExecError::HostKeyRejected(format!("{}:{}", endpoint.host, endpoint.port))
                        }
                        other => ExecError::connection(other),
                    }
                })?;

        let authenticated = match &endpoint.credential {
            Credential::Password(password) => {
                handle
                    .authenticate_password(endpoint.username.clone(), password.expose_secret().as_str())
                    .await
            }
            Credential::PrivateKey { path, passphrase } => {
                let key = load_secret_key(path, passphrase.as_ref().map(|p| p.expose_secret().as_str()))
                    .map_err(|e| {
                        error!(error = %e, path = %path.display(), "Failed to load private key");
                        ExecError::KeyLoad(e.to_string())
                    })?;

                handle
                    .authenticate_publickey(endpoint.username.clone(), Arc::new(key))
                    .await
            }
        }
        .map_err(ExecError::connection)?;

        if !authenticated {
            error!(endpoint = %endpoint.target(), "SSH authentication rejected");
            return Err(ExecError::Authentication(endpoint.target()));
        }

        info!(endpoint = %endpoint.target(), "SSH session established");
        Ok(RusshConnection { handle })
    }
}

#[async_trait]
impl Connector for RusshConnector {
    type Connection = RusshConnection;

    async fn connect(&self, endpoint: &Endpoint) -> Result<RusshConnection> {
        debug!(
            host = %endpoint.host,
            port = endpoint.port,
            user = %endpoint.username,
            "Connecting"
        );

        timeout(self.options.connect_timeout, self.establish(endpoint))
            .await
            .map_err(|_| {
                ExecError::Connection(format!(
                    "timed out after {}s connecting to {}",
                    self.options.connect_timeout.as_secs(),
                    endpoint.target()
                ))
            })?
    }
}

/// 已认证的 russh 会话
pub struct RusshConnection {
    handle: client::Handle<ClientHandler>,
}

#[async_trait]
impl Connection for RusshConnection {
    type Channel = RusshChannel;

    async fn open_shell(&self, viewport: &Viewport) -> Result<RusshChannel> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| ExecError::Channel(format!("failed to open session channel: {}", e)))?;

        channel
            .request_pty(false, &viewport.term, viewport.width, viewport.height, 0, 0, &[])
            .await
            .map_err(|e| ExecError::Channel(format!("failed to request pty: {}", e)))?;

        channel
            .request_shell(false)
            .await
            .map_err(|e| ExecError::Channel(format!("failed to request shell: {}", e)))?;

        Ok(RusshChannel {
            inner: channel,
            finished: false,
            exit_status: None,
        })
    }

    fn is_alive(&self) -> bool {
        !self.handle.is_closed()
    }

    async fn disconnect(&self) {
        let _ = self
            .handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await;
    }
}

/// russh 交互式通道
pub struct RusshChannel {
    inner: russh::Channel<client::Msg>,
    finished: bool,
    exit_status: Option<u32>,
}

#[async_trait]
impl ShellChannel for RusshChannel {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.inner
            .data(data)
            .await
            .map_err(|e| ExecError::Channel(format!("write failed: {}", e)))
    }

    fn try_recv(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            // wait() 只是从 mpsc 取消息，轮询一次后丢弃是安全的
            let Some(msg) = poll_now(self.inner.wait()) else {
                return Ok(None);
            };

            match msg {
                Some(ChannelMsg::Data { data }) => return Ok(Some(data.to_vec())),
                Some(ChannelMsg::ExtendedData { data, .. }) => return Ok(Some(data.to_vec())),
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    self.exit_status = Some(exit_status);
                    self.finished = true;
                }
                Some(ChannelMsg::ExitSignal { .. })
                | Some(ChannelMsg::Eof)
                | Some(ChannelMsg::Close) => {
                    self.finished = true;
                }
                Some(_) => {}
                None if self.finished => return Ok(None),
                None => {
                    return Err(ExecError::channel("channel closed before the shell exited"));
                }
            }
        }
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn exit_status(&self) -> Option<u32> {
        self.exit_status
    }

    async fn close(&mut self) -> Result<()> {
        match self.inner.close().await {
            Ok(()) => Ok(()),
            Err(e) if self.finished => {
                debug!(error = %e, "Close after remote exit ignored");
                Ok(())
            }
            Err(e) => Err(ExecError::Channel(format!("close failed: {}", e))),
        }
    }
}

/// 轮询一次；不受 tokio 协作预算限制，队列中已有的消息总能取到
fn poll_now<F: Future>(future: F) -> Option<F::Output> {
    tokio::task::unconstrained(future).now_or_never()
}

/// 计算主机公钥指纹，与 `ssh-keygen -lf` 输出一致：`SHA256:` + 无填充 base64
pub fn fingerprint(key: &PublicKey) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(key.public_key_bytes());
    format!(
        "SHA256:{}",
        general_purpose::STANDARD_NO_PAD.encode(hasher.finalize())
    )
}

/// 规范化用户配置的指纹：补齐 `SHA256:` 前缀，去掉 base64 填充
pub fn normalize_fingerprint(pinned: &str) -> String {
    let digest = pinned.trim();
    let digest = digest.strip_prefix("SHA256:").unwrap_or(digest);
    format!("SHA256:{}", digest.trim_end_matches('='))
}

/// SSH 客户端会话处理器
pub struct ClientHandler {
    verification_mode: HostKeyVerification,
    pinned_fingerprint: Option<String>,
    host: String,
    port: u16,
}

impl ClientHandler {
    fn verify(&self, actual: &str) -> bool {
        let host_key = format!("{}:{}", self.host, self.port);

        match self.verification_mode {
            HostKeyVerification::Disabled => {
                warn!(host = %host_key, "Host key verification DISABLED - accepting all keys");
                true
            }
            HostKeyVerification::Accept => match &self.pinned_fingerprint {
                Some(expected) if expected != actual => {
                    error!(
                        host = %host_key,
                        expected = %expected,
                        actual = %actual,
                        "Host key mismatch - REJECTING CONNECTION"
                    );
                    false
                }
                Some(_) => {
                    debug!(host = %host_key, "Host key verified");
                    true
                }
                None => {
                    info!(host = %host_key, fingerprint = %actual, "Accepting host key");
                    true
                }
            },
            HostKeyVerification::Strict => match &self.pinned_fingerprint {
                Some(expected) if expected == actual => {
                    debug!(host = %host_key, "Host key verified (strict mode)");
                    true
                }
                Some(expected) => {
                    error!(
                        host = %host_key,
                        expected = %expected,
                        actual = %actual,
                        "Host key mismatch - REJECTING CONNECTION"
                    );
                    false
                }
                None => {
                    error!(host = %host_key, "No pinned host key in strict mode - rejecting connection");
                    false
                }
            },
        }
    }
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(self.verify(&fingerprint(server_public_key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(mode: HostKeyVerification, pinned: Option<&str>) -> ClientHandler {
        ClientHandler {
            verification_mode: mode,
            pinned_fingerprint: pinned.map(str::to_string),
            host: "target".to_string(),
            port: 22,
        }
    }

    #[test]
    fn test_accept_without_pin() {
        assert!(handler(HostKeyVerification::Accept, None).verify("abcd"));
    }

    #[test]
    fn test_accept_with_pin_rejects_mismatch() {
        let h = handler(HostKeyVerification::Accept, Some("abcd"));
        assert!(h.verify("abcd"));
        assert!(!h.verify("ef01"));
    }

    #[test]
    fn test_strict_requires_pin() {
        assert!(!handler(HostKeyVerification::Strict, None).verify("abcd"));
        assert!(handler(HostKeyVerification::Strict, Some("abcd")).verify("abcd"));
        assert!(!handler(HostKeyVerification::Strict, Some("abcd")).verify("ef01"));
    }

    #[test]
    fn test_disabled_accepts_anything() {
        assert!(handler(HostKeyVerification::Disabled, Some("abcd")).verify("ef01"));
    }

    #[test]
    fn test_fingerprint_matches_ssh_keygen() {
        let key = russh_keys::parse_public_key_base64(
            "AAAAC3NzaC1lZDI1NTE5AAAAIJRyPztmlUMqmjr7A0FndHyT84K5E28uNnnDnc6C6eEy",
        )
        .unwrap();
        assert_eq!(
            fingerprint(&key),
            "SHA256:Wt9CxtutcqVIZ2K2TVmiAH9360v0IpMnbPzEsUwWCTs"
        );
    }

    #[test]
    fn test_normalize_fingerprint() {
        let expected = "SHA256:Wt9CxtutcqVIZ2K2TVmiAH9360v0IpMnbPzEsUwWCTs";
        assert_eq!(normalize_fingerprint(expected), expected);
        assert_eq!(
            normalize_fingerprint(" Wt9CxtutcqVIZ2K2TVmiAH9360v0IpMnbPzEsUwWCTs= "),
            expected
        );
    }

    #[tokio::test]
    async fn test_poll_now_drains_past_coop_budget() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        for i in 0..1000u32 {
            tx.send(i).unwrap();
        }
        drop(tx);

        let mut received = 0;
        while let Some(Some(_)) = poll_now(rx.recv()) {
            received += 1;
        }
        assert_eq!(received, 1000);
    }

    #[test]
    fn test_default_connect_options() {
        let options = ConnectOptions::default();
        assert_eq!(options.connect_timeout, Duration::from_secs(10));
        assert_eq!(options.host_key_verification, HostKeyVerification::Accept);
        assert!(options.host_key_fingerprint.is_none());
    }
}
