//! 测试公共模块
//! 提供脚本化的内存传输：记录写入与中断，按虚拟时钟释放输出

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use remote_shell::error::{ExecError, Result};
use remote_shell::models::Endpoint;
use remote_shell::ssh::{
    CommandExecutor, Connection, Connector, ExecutorOptions, SessionManager, ShellChannel,
    Viewport, INTERRUPT,
};
use tokio::time::Instant;

/// 单个 shell 通道的行为脚本
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// (写入后的偏移, 输出字节)
    pub chunks: Vec<(Duration, Vec<u8>)>,
    /// 写入后多久自然结束；None 表示永不结束
    pub exit_after: Option<Duration>,
    pub exit_status: Option<u32>,
    /// 收到中断后立即输出的字节
    pub on_interrupt: Vec<u8>,
    /// 收到中断后 shell 是否结束
    pub exit_on_interrupt: bool,
    /// 写入命令时失败
    pub fail_on_send: bool,
    /// 写入后多久读取失败
    pub fail_recv_after: Option<Duration>,
    /// 打开通道失败
    pub fail_open: bool,
    /// 发送中断字节时失败
    pub fail_on_interrupt: bool,
    /// 关闭通道时失败
    pub fail_on_close: bool,
}

impl Script {
    /// 立即输出并结束的命令
    pub fn completes_with(output: &str) -> Self {
        Self {
            chunks: vec![(Duration::from_millis(20), output.as_bytes().to_vec())],
            exit_after: Some(Duration::from_millis(50)),
            exit_status: Some(0),
            ..Default::default()
        }
    }

    /// 永不结束的命令
    pub fn runs_forever() -> Self {
        Self {
            on_interrupt: b"^C\r\n".to_vec(),
            ..Default::default()
        }
    }
}

/// 共享的传输状态
#[derive(Default)]
pub struct MockState {
    pub reachable: bool,
    pub connect_attempts: usize,
    pub connections_opened: usize,
    pub disconnects: usize,
    pub channels_opened: usize,
    pub channels_closed: usize,
    pub open_channels: usize,
    pub max_open_channels: usize,
    pub writes: Vec<Vec<u8>>,
    pub written_at: Vec<Instant>,
    pub interrupts: Vec<Instant>,
    pub scripts: VecDeque<Script>,
    pub default_script: Script,
    pub live_flag: Option<Arc<AtomicBool>>,
}

#[derive(Clone)]
pub struct MockConnector {
    pub state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                reachable: true,
                default_script: Script::completes_with("ok\r\n"),
                ..Default::default()
            })),
        }
    }

    pub fn unreachable() -> Self {
        let connector = Self::new();
        connector.set_reachable(false);
        connector
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().unwrap().reachable = reachable;
    }

    /// 追加下一个通道使用的脚本
    pub fn push_script(&self, script: Script) {
        self.state.lock().unwrap().scripts.push_back(script);
    }

    pub fn set_default_script(&self, script: Script) {
        self.state.lock().unwrap().default_script = script;
    }

    /// 模拟服务端在命令之间断开连接
    pub fn drop_connection(&self) {
        if let Some(flag) = &self.state.lock().unwrap().live_flag {
            flag.store(false, Ordering::SeqCst);
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&MockState) -> R) -> R {
        f(&self.state.lock().unwrap())
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self, _endpoint: &Endpoint) -> Result<MockConnection> {
        let mut state = self.state.lock().unwrap();
        state.connect_attempts += 1;

        if !state.reachable {
            return Err(ExecError::connection("Connection refused (os error 111)"));
        }

        state.connections_opened += 1;
        let alive = Arc::new(AtomicBool::new(true));
        state.live_flag = Some(alive.clone());

        Ok(MockConnection {
            state: self.state.clone(),
            alive,
        })
    }
}

pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
    alive: Arc<AtomicBool>,
}

#[async_trait]
impl Connection for MockConnection {
    type Channel = MockChannel;

    async fn open_shell(&self, _viewport: &Viewport) -> Result<MockChannel> {
        let mut state = self.state.lock().unwrap();
        let script = state
            .scripts
            .pop_front()
            .unwrap_or_else(|| state.default_script.clone());

        if script.fail_open {
            return Err(ExecError::channel("administratively prohibited"));
        }

        state.channels_opened += 1;
        state.open_channels += 1;
        state.max_open_channels = state.max_open_channels.max(state.open_channels);

        Ok(MockChannel {
            state: self.state.clone(),
            alive: self.alive.clone(),
            pending: script.chunks.iter().cloned().collect(),
            script,
            written_at: None,
            ready: VecDeque::new(),
            interrupted: false,
            closed: false,
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.state.lock().unwrap().disconnects += 1;
    }
}

pub struct MockChannel {
    state: Arc<Mutex<MockState>>,
    alive: Arc<AtomicBool>,
    script: Script,
    pending: VecDeque<(Duration, Vec<u8>)>,
    ready: VecDeque<Vec<u8>>,
    written_at: Option<Instant>,
    interrupted: bool,
    closed: bool,
}

impl MockChannel {
    fn since_write(&self) -> Option<Duration> {
        self.written_at.map(|at| at.elapsed())
    }
}

#[async_trait]
impl ShellChannel for MockChannel {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if self.script.fail_on_interrupt && data == [INTERRUPT] {
            self.alive.store(false, Ordering::SeqCst);
            return Err(ExecError::channel("Broken pipe (os error 32)"));
        }

        if self.script.fail_on_send {
            self.alive.store(false, Ordering::SeqCst);
            return Err(ExecError::channel("Broken pipe (os error 32)"));
        }

        let now = Instant::now();
        let mut state = self.state.lock().unwrap();

        if data == [INTERRUPT] {
            state.interrupts.push(now);
            self.interrupted = true;
            if !self.script.on_interrupt.is_empty() {
                self.ready.push_back(self.script.on_interrupt.clone());
            }
        } else {
            state.writes.push(data.to_vec());
            state.written_at.push(now);
            if self.written_at.is_none() {
                self.written_at = Some(now);
            }
        }
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(elapsed) = self.since_write() else {
            return Ok(None);
        };

        if let Some(fail_after) = self.script.fail_recv_after {
            if elapsed >= fail_after {
                self.alive.store(false, Ordering::SeqCst);
                return Err(ExecError::channel("Connection reset by peer (os error 104)"));
            }
        }

        if let Some(chunk) = self.ready.pop_front() {
            return Ok(Some(chunk));
        }

        if let Some((offset, _)) = self.pending.front() {
            if *offset <= elapsed {
                return Ok(self.pending.pop_front().map(|(_, bytes)| bytes));
            }
        }

        Ok(None)
    }

    fn is_finished(&self) -> bool {
        if self.interrupted && self.script.exit_on_interrupt {
            return true;
        }
        match (self.script.exit_after, self.since_write()) {
            (Some(exit_after), Some(elapsed)) => elapsed >= exit_after,
            _ => false,
        }
    }

    fn exit_status(&self) -> Option<u32> {
        if self.is_finished() {
            self.script.exit_status
        } else {
            None
        }
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            let mut state = self.state.lock().unwrap();
            state.channels_closed += 1;
            state.open_channels -= 1;
        }
        if self.script.fail_on_close {
            return Err(ExecError::channel("close failed: channel send error"));
        }
        Ok(())
    }
}

pub fn test_endpoint() -> Endpoint {
    Endpoint::with_password("target", "testuser", "password")
}

/// 测试用执行器选项
pub fn test_options() -> ExecutorOptions {
    ExecutorOptions::default()
}

pub fn executor(connector: &MockConnector) -> CommandExecutor<MockConnector> {
    executor_with(connector, test_options())
}

pub fn executor_with(
    connector: &MockConnector,
    options: ExecutorOptions,
) -> CommandExecutor<MockConnector> {
    let session = Arc::new(SessionManager::new(connector.clone(), test_endpoint()));
    CommandExecutor::new(session, options)
}
