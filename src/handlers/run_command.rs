//! `run_command` 工具处理器
//!
//! 供 LLM 函数调用使用：工具定义、参数解析、执行并返回 JSON 响应

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::models::CommandRequest;
use crate::ssh::{CommandExecutor, Connector};

/// 工具名称
pub const TOOL_NAME: &str = "run_command";

/// 工具参数错误
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// 函数调用工具定义（OpenAI function-calling 格式）
pub fn tool_definition() -> serde_json::Value {
    json!({
        "type": "function",
        "function": {
            "name": TOOL_NAME,
            "description": "Execute a shell command remotely via SSH on the target host. \
                By default, the command will be forcibly stopped after 5 seconds. \
                If you set timeout=0, the command can run indefinitely.",
            "parameters": {
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The bash command to execute on the remote machine."
                    },
                    "timeout": {
                        "type": "number",
                        "description": "Optional. Number of seconds before forcibly sending Ctrl-C. \
                            Set to 0 for indefinite run, defaults to 5 if omitted."
                    }
                },
                "required": ["command"],
                "additionalProperties": false
            }
        }
    })
}

/// 工具参数
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunCommandArgs {
    pub command: String,
    #[serde(default)]
    pub timeout: Option<f64>,
}

impl RunCommandArgs {
    /// 解析并校验参数 JSON
    pub fn parse(arguments: &str) -> Result<Self, ToolError> {
        let args: RunCommandArgs = serde_json::from_str(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        if args.command.trim().is_empty() {
            return Err(ToolError::InvalidArguments("command must not be empty".to_string()));
        }

        if let Some(timeout) = args.timeout {
            if !timeout.is_finite() || timeout < 0.0 {
                return Err(ToolError::InvalidArguments(format!(
                    "timeout must be a non-negative number, got {}",
                    timeout
                )));
            }
        }

        Ok(args)
    }

    /// 转换为命令请求；未指定 timeout 时使用默认值
    pub fn into_request(self, default_timeout: Duration) -> CommandRequest {
        let timeout_secs = self
            .timeout
            .unwrap_or_else(|| default_timeout.as_secs_f64());
        CommandRequest::new(self.command, timeout_secs)
    }
}

/// 工具响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub command: Option<String>,
    pub result: String,
}

impl ToolResponse {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            json!({ "command": self.command, "result": self.result }).to_string()
        })
    }
}

/// 处理一次工具调用
pub async fn handle_tool_call<C: Connector>(
    executor: &CommandExecutor<C>,
    arguments: &str,
) -> ToolResponse {
    let args = match RunCommandArgs::parse(arguments) {
        Ok(args) => args,
        Err(e) => {
            warn!(error = %e, "Rejected tool call");
            return ToolResponse {
                command: None,
                result: e.to_string(),
            };
        }
    };

    let command = args.command.clone();
    let request = args.into_request(executor.options().default_timeout);
    let result = executor.run(&request).await;

    ToolResponse {
        command: Some(command),
        result: result.raw_output,
    }
}
