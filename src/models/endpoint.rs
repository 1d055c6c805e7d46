//! 远端目标模型
//!
//! 进程启动时提供一次、之后不可变的连接目标与凭据

use secrecy::Secret;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 认证凭据
#[derive(Debug, Clone)]
pub enum Credential {
    /// 密码认证
    Password(Secret<String>),
    /// 私钥认证
    PrivateKey {
        /// 私钥文件路径
        path: PathBuf,
        /// 私钥密码（如果有）
        passphrase: Option<Secret<String>>,
    },
}

/// 远端目标
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credential: Credential,
}

impl Endpoint {
    /// 使用密码认证创建目标
    pub fn with_password(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            credential: Credential::Password(Secret::new(password.into())),
        }
    }

    /// 使用私钥认证创建目标
    pub fn with_key(
        host: impl Into<String>,
        username: impl Into<String>,
        path: impl Into<PathBuf>,
        passphrase: Option<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            credential: Credential::PrivateKey {
                path: path.into(),
                passphrase: passphrase.map(Secret::new),
            },
        }
    }

    /// 设置端口
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// 获取目标地址字符串
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

/// 主机密钥验证策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyVerification {
    /// 严格模式：必须预先固定主机密钥指纹
    Strict,
    /// 接受模式：记录指纹并接受；若已固定指纹则必须匹配
    #[default]
    Accept,
    /// 禁用验证（不安全，仅用于开发/测试）
    Disabled,
}

impl std::str::FromStr for HostKeyVerification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "accept" => Ok(Self::Accept),
            "disabled" | "none" | "false" => Ok(Self::Disabled),
            _ => Err(format!("Unknown host key verification mode: {}", s)),
        }
    }
}
