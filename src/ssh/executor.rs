//! 命令执行器
//!
//! 每次调用打开一个交互式 shell 通道，写入命令后轮询输出与自然结束；
//! 截止时间到达时发送一次中断字节，短暂等待后收集剩余输出并关闭通道。
//! 任何失败都转换为文本结果返回，同时让会话管理器丢弃连接。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{CommandRequest, CommandResult, TerminationReason};
use crate::output;

use super::session::SessionManager;
use super::transport::{Connection, Connector, ShellChannel, Viewport, INTERRUPT};

/// 单次轮询最多读取的字节数，避免持续输出时错过截止检查
const MAX_DRAIN_BYTES: usize = 1024 * 1024;

type ChannelOf<C> = <<C as Connector>::Connection as Connection>::Channel;

/// 执行器选项
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// 伪终端尺寸
    pub viewport: Viewport,
    /// 轮询间隔（必须小于 1 秒）
    pub poll_interval: Duration,
    /// 发送中断后的等待时间
    pub interrupt_grace: Duration,
    /// 停止轮询后、最后一次读取前的等待时间
    pub drain_grace: Duration,
    /// 调用方未指定时使用的截止时间
    pub default_timeout: Duration,
    /// 命令后追加 exit，使 shell 在命令结束后退出，从而可观察到自然结束
    pub exit_after_command: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            poll_interval: Duration::from_millis(100),
            interrupt_grace: Duration::from_millis(500),
            drain_grace: Duration::from_millis(200),
            default_timeout: Duration::from_secs(5),
            exit_after_command: true,
        }
    }
}

/// 一次执行采集到的内容
struct Capture {
    bytes: Vec<u8>,
    termination: TerminationReason,
    exit_status: Option<u32>,
}

/// 命令执行器
pub struct CommandExecutor<C: Connector> {
    session: Arc<SessionManager<C>>,
    options: ExecutorOptions,
}

impl<C: Connector> CommandExecutor<C> {
    pub fn new(session: Arc<SessionManager<C>>, options: ExecutorOptions) -> Self {
        Self { session, options }
    }

    pub fn session(&self) -> &Arc<SessionManager<C>> {
        &self.session
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// 执行命令；总是返回结果，不向调用方传播错误
    pub async fn run(&self, request: &CommandRequest) -> CommandResult {
        let span = info_span!(
            "run",
            run_id = %Uuid::new_v4(),
            timeout_secs = request.timeout.map(|t| t.as_secs_f64()).unwrap_or(0.0),
        );

        self.run_inner(request).instrument(span).await
    }

    async fn run_inner(&self, request: &CommandRequest) -> CommandResult {
        let started = Instant::now();
        debug!(command = %request.text, "Running command");

        // 租约覆盖建连与整个通道生命周期，保证同一时刻只有一个通道
        let mut lease = self.session.lease().await;

        let outcome = match lease.get_connection().await {
            Ok(connection) => self.drive(connection, request).await,
            Err(e) => Err(e),
        };

        let duration_secs = started.elapsed().as_secs_f64();

        match outcome {
            Ok(capture) => {
                let raw_output = output::normalize(&capture.bytes);

                info!(
                    termination = ?capture.termination,
                    exit_status = ?capture.exit_status,
                    output_len = capture.bytes.len(),
                    duration_secs,
                    "Command finished"
                );
                debug!(output = %output::summary(&raw_output, 200), "Command output");

                CommandResult {
                    raw_output,
                    termination: capture.termination,
                    exit_status: capture.exit_status,
                    duration_secs,
                }
            }
            Err(e) => {
                lease.invalidate(&e).await;
                CommandResult::transport_error(&e, duration_secs)
            }
        }
    }

    /// 打开通道并执行，无论成败都关闭通道
    async fn drive(&self, connection: &C::Connection, request: &CommandRequest) -> Result<Capture> {
        let mut channel = connection.open_shell(&self.options.viewport).await?;

        let polled = self.poll(&mut channel, request).await;
        let closed = channel.close().await;

        let capture = polled?;
        closed?;
        Ok(capture)
    }

    async fn poll(&self, channel: &mut ChannelOf<C>, request: &CommandRequest) -> Result<Capture> {
        let mut bytes = Vec::new();

        channel.send(self.payload(&request.text).as_bytes()).await?;
        let written_at = Instant::now();

        let termination = loop {
            drain(channel, &mut bytes)?;

            if channel.is_finished() {
                break TerminationReason::Natural;
            }

            let mut wait = self.options.poll_interval;
            if let Some(timeout) = request.timeout {
                let elapsed = written_at.elapsed();
                if elapsed >= timeout {
                    warn!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Deadline reached, sending interrupt"
                    );
                    channel.send(&[INTERRUPT]).await?;
                    sleep(self.options.interrupt_grace).await;
                    break TerminationReason::TimedOut;
                }
                wait = wait.min(timeout - elapsed);
            }

            sleep(wait).await;
        };

        sleep(self.options.drain_grace).await;
        drain(channel, &mut bytes)?;

        Ok(Capture {
            bytes,
            termination,
            exit_status: channel.exit_status(),
        })
    }

    fn payload(&self, text: &str) -> String {
        if self.options.exit_after_command {
            format!("{}\nexit\n", text)
        } else {
            format!("{}\n", text)
        }
    }
}

/// 读取当前所有已到达的字节
fn drain<Ch: ShellChannel>(channel: &mut Ch, bytes: &mut Vec<u8>) -> Result<usize> {
    let mut total = 0;
    while total < MAX_DRAIN_BYTES {
        match channel.try_recv()? {
            Some(chunk) => {
                total += chunk.len();
                bytes.extend_from_slice(&chunk);
            }
            None => break,
        }
    }
    Ok(total)
}
