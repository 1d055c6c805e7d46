//! 命令请求与执行结果模型

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ErrorKind, ExecError};

/// 单条命令请求
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    /// 命令文本
    pub text: String,
    /// 截止时间；None 表示运行至自然结束，不发送中断
    pub timeout: Option<Duration>,
}

impl CommandRequest {
    /// 以秒数创建请求，0（或非正数）表示不设截止时间
    pub fn new(text: impl Into<String>, timeout_secs: f64) -> Self {
        let timeout = if timeout_secs > 0.0 {
            Duration::try_from_secs_f64(timeout_secs).ok()
        } else {
            None
        };

        Self {
            text: text.into(),
            timeout,
        }
    }

    /// 不设截止时间的请求
    pub fn unbounded(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timeout: None,
        }
    }
}

/// 结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "kind", rename_all = "snake_case")]
pub enum TerminationReason {
    /// 命令自然结束
    Natural,
    /// 到达截止时间，已发送中断
    TimedOut,
    /// 传输层失败
    TransportError(ErrorKind),
}

/// 执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// 规范化后的文本输出（或错误描述）
    pub raw_output: String,

    pub termination: TerminationReason,

    /// 远端上报的退出码（如果有）
    pub exit_status: Option<u32>,

    /// 执行时长（秒）
    pub duration_secs: f64,
}

impl CommandResult {
    /// 由传输错误构造结果
    pub fn transport_error(error: &ExecError, duration_secs: f64) -> Self {
        Self {
            raw_output: error.render(),
            termination: TerminationReason::TransportError(error.kind()),
            exit_status: None,
            duration_secs,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        self.termination == TerminationReason::TimedOut
    }

    pub fn is_transport_error(&self) -> bool {
        matches!(self.termination, TerminationReason::TransportError(_))
    }

    /// 失败分类（仅传输错误时有值）
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self.termination {
            TerminationReason::TransportError(kind) => Some(kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_zero_timeout_means_unbounded() {
        assert_eq!(CommandRequest::new("tail -f /var/log/syslog", 0.0).timeout, None);
        assert_eq!(CommandRequest::new("ls", -3.0).timeout, None);
        assert_eq!(CommandRequest::new("ls", f64::NAN).timeout, None);
    }

    #[test]
    fn test_request_fractional_timeout() {
        let request = CommandRequest::new("sleep 1", 2.5);
        assert_eq!(request.timeout, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_transport_error_result() {
        let result = CommandResult::transport_error(&ExecError::channel("eof"), 0.1);
        assert!(result.is_transport_error());
        assert!(!result.is_timed_out());
        assert_eq!(result.error_kind(), Some(ErrorKind::Channel));
        assert!(result.raw_output.starts_with(crate::error::ERROR_PREFIX));
    }

    #[test]
    fn test_termination_serialization() {
        let json = serde_json::to_string(&TerminationReason::TimedOut).unwrap();
        assert_eq!(json, r#"{"reason":"timed_out"}"#);

        let json =
            serde_json::to_string(&TerminationReason::TransportError(ErrorKind::Connection))
                .unwrap();
        assert_eq!(json, r#"{"reason":"transport_error","kind":"connection"}"#);
    }
}
