//! 配置系统
//! 从环境变量加载所有配置，使用 Secret 包装敏感信息
//!
//! 变量前缀为 `TARGET_`，嵌套字段用 `__` 分隔，例如
//! `TARGET_HOST`、`TARGET_SSH_USER`、`TARGET_SSH_PASS`、`TARGET_SHELL__POLL_INTERVAL_MS`。
//! 变量值按原样读取为字符串，数值与布尔字段在反序列化时再转换，凭据不会被改写。
//!
//! `TARGET_HOST_KEY_FINGERPRINT` 使用 `ssh-keygen -lf` 的格式：`SHA256:<base64>`。

use config::{Config, ConfigError, Environment};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::{Credential, Endpoint, HostKeyVerification};
use crate::ssh::{ConnectOptions, ExecutorOptions, Viewport};

#[derive(Debug, Clone, Deserialize)]
pub struct ShellConfig {
    /// 伪终端列数
    pub width: u32,
    /// 伪终端行数
    pub height: u32,
    /// 终端类型
    pub term: String,
    /// 轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 发送中断后的等待时间（毫秒）
    pub interrupt_grace_ms: u64,
    /// 最后一次读取前的等待时间（毫秒）
    pub drain_grace_ms: u64,
    /// 默认截止时间（秒），0 表示不限制
    pub default_timeout_secs: f64,
    /// 命令后追加 exit
    pub exit_after_command: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty, compact
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// 目标主机
    pub host: String,
    /// SSH 用户名
    pub ssh_user: String,
    /// SSH 密码（使用 Secret 包装，防止日志泄露）
    #[serde(default)]
    pub ssh_pass: Option<Secret<String>>,
    /// SSH 端口
    pub ssh_port: u16,
    /// 私钥文件路径（可选，优先于密码）
    #[serde(default)]
    pub ssh_key: Option<String>,
    /// 私钥密码（可选，使用 Secret 包装）
    #[serde(default)]
    pub ssh_key_passphrase: Option<Secret<String>>,
    /// 主机密钥验证策略（strict/accept/disabled）
    pub host_key_verification: String,
    /// 固定的主机密钥指纹（`SHA256:<base64>`）
    #[serde(default)]
    pub host_key_fingerprint: Option<String>,
    /// 建连超时（秒）
    pub connect_timeout_secs: u64,
    pub shell: ShellConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Config::builder();

        // 添加默认配置
        settings = settings
            .set_default("ssh_port", 22)?
            .set_default("host_key_verification", "accept")?
            .set_default("connect_timeout_secs", 10)?
            .set_default("shell.width", 120)?
            .set_default("shell.height", 80)?
            .set_default("shell.term", "xterm")?
            .set_default("shell.poll_interval_ms", 100)?
            .set_default("shell.interrupt_grace_ms", 500)?
            .set_default("shell.drain_grace_ms", 200)?
            .set_default("shell.default_timeout_secs", 5.0)?
            .set_default("shell.exit_after_command", true)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?;

        settings = settings.add_source(
            Environment::with_prefix("TARGET")
                .prefix_separator("_")
                .separator("__"),
        );

        let config: AppConfig = settings.build()?.try_deserialize()?;

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 验证配置合法性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Message("TARGET_HOST must not be empty".to_string()));
        }

        if self.ssh_user.trim().is_empty() {
            return Err(ConfigError::Message("TARGET_SSH_USER must not be empty".to_string()));
        }

        // 必须提供密码或私钥之一
        if self.key_path().is_none() && self.password().is_none() {
            return Err(ConfigError::Message(
                "No SSH credential: set TARGET_SSH_PASS or TARGET_SSH_KEY".to_string(),
            ));
        }

        let verification = self.host_key_verification_mode()?;
        if verification == HostKeyVerification::Strict && self.host_key_fingerprint.is_none() {
            return Err(ConfigError::Message(
                "Strict host key verification requires TARGET_HOST_KEY_FINGERPRINT".to_string(),
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Message("connect_timeout_secs must be > 0".to_string()));
        }

        // 轮询间隔必须小于 1 秒
        if self.shell.poll_interval_ms == 0 || self.shell.poll_interval_ms >= 1000 {
            return Err(ConfigError::Message(
                "shell.poll_interval_ms must be between 1 and 999".to_string(),
            ));
        }

        if self.shell.width == 0 || self.shell.height == 0 {
            return Err(ConfigError::Message("shell viewport must be non-empty".to_string()));
        }

        if !self.shell.default_timeout_secs.is_finite() || self.shell.default_timeout_secs < 0.0 {
            return Err(ConfigError::Message(
                "shell.default_timeout_secs must be >= 0".to_string(),
            ));
        }

        // 验证日志级别
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        // 验证日志格式
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty, compact",
                    self.logging.format
                )))
            }
        }

        Ok(())
    }

    fn password(&self) -> Option<&Secret<String>> {
        self.ssh_pass
            .as_ref()
            .filter(|p| !p.expose_secret().is_empty())
    }

    fn key_path(&self) -> Option<&str> {
        self.ssh_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    fn host_key_verification_mode(&self) -> Result<HostKeyVerification, ConfigError> {
        self.host_key_verification
            .parse::<HostKeyVerification>()
            .map_err(ConfigError::Message)
    }

    /// 构建连接目标；私钥优先于密码
    pub fn endpoint(&self) -> Result<Endpoint, ConfigError> {
        let credential = if let Some(path) = self.key_path() {
            Credential::PrivateKey {
                path: PathBuf::from(path),
                passphrase: self.ssh_key_passphrase.clone(),
            }
        } else if let Some(password) = self.password() {
            Credential::Password(password.clone())
        } else {
            return Err(ConfigError::Message("No SSH credential configured".to_string()));
        };

        Ok(Endpoint {
            host: self.host.clone(),
            port: self.ssh_port,
            username: self.ssh_user.clone(),
            credential,
        })
    }

    /// 构建建连选项
    pub fn connect_options(&self) -> Result<ConnectOptions, ConfigError> {
        Ok(ConnectOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            host_key_verification: self.host_key_verification_mode()?,
            host_key_fingerprint: self.host_key_fingerprint.clone(),
        })
    }

    /// 构建执行器选项
    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            viewport: Viewport {
                term: self.shell.term.clone(),
                width: self.shell.width,
                height: self.shell.height,
            },
            poll_interval: Duration::from_millis(self.shell.poll_interval_ms),
            interrupt_grace: Duration::from_millis(self.shell.interrupt_grace_ms),
            drain_grace: Duration::from_millis(self.shell.drain_grace_ms),
            default_timeout: Duration::try_from_secs_f64(self.shell.default_timeout_secs)
                .unwrap_or_default(),
            exit_after_command: self.shell.exit_after_command,
        }
    }
}
