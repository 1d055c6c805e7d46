//! 远程命令终端入口
//! 从 stdin 逐行读取命令（或工具调用参数），在目标主机上执行并打印结果

use remote_shell::{
    build_executor, config::AppConfig, handlers::run_command, output, telemetry, CommandRequest,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// 命令行选项
struct CliOptions {
    timeout_secs: Option<f64>,
    tool_mode: bool,
    markdown: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ===== CLI 参数处理 =====
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut options = CliOptions {
        timeout_secs: None,
        tool_mode: false,
        markdown: false,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--version" => {
                println!("remote-shell {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_help();
                return Ok(());
            }
            "--tool" => options.tool_mode = true,
            "--markdown" => options.markdown = true,
            "--timeout" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--timeout requires a value"))?;
                let secs: f64 = value
                    .parse()
                    .map_err(|_| anyhow::anyhow!("Invalid --timeout value: {}", value))?;
                if !secs.is_finite() || secs < 0.0 {
                    anyhow::bail!("--timeout must be a non-negative number");
                }
                options.timeout_secs = Some(secs);
            }
            other => {
                eprintln!("未知参数: {}", other);
                print_help();
                std::process::exit(1);
            }
        }
    }

    // 加载 .env 文件（开发环境）
    dotenv::from_filename(".env.local").ok();
    dotenv::dotenv().ok();

    // 1. 加载配置
    let mut config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    // 2. 初始化日志
    telemetry::init_telemetry(&config.logging);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.host,
        port = config.ssh_port,
        tool_mode = options.tool_mode,
        "remote-shell starting"
    );

    // 命令行 --timeout 覆盖配置，手动模式与工具模式共用
    if let Some(secs) = options.timeout_secs {
        config.shell.default_timeout_secs = secs;
    }

    // 3. 构建执行器（首次执行时建连）
    let executor = build_executor(&config)?;
    let default_timeout = executor.options().default_timeout.as_secs_f64();

    // 4. 逐行处理
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();

        let rendered = if options.tool_mode {
            if line.is_empty() {
                continue;
            }
            run_command::handle_tool_call(&executor, line)
                .await
                .to_json()
        } else if line.is_empty() {
            "Please enter a command.".to_string()
        } else {
            let result = executor.run(&CommandRequest::new(line, default_timeout)).await;
            if options.markdown {
                output::render_markdown(&result.raw_output)
            } else {
                result.raw_output
            }
        };

        stdout.write_all(rendered.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    tracing::info!("stdin closed, exiting");
    Ok(())
}

/// 打印帮助信息
fn print_help() {
    println!("remote-shell {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("用法: remote-shell [选项]");
    println!();
    println!("选项:");
    println!("  --timeout <秒>  每条命令的截止时间，0 表示不限制（默认 5）");
    println!("  --tool          工具模式：每行输入为 run_command 参数 JSON，输出响应 JSON；");
    println!("                  未指定 timeout 的调用使用 --timeout 的值");
    println!("  --markdown      手动模式下以代码块形式输出结果");
    println!("  --version       打印版本信息并退出");
    println!("  --help          打印此帮助信息并退出");
    println!();
    println!("环境变量:");
    println!("  TARGET_HOST, TARGET_SSH_USER, TARGET_SSH_PASS, TARGET_SSH_PORT");
    println!("  TARGET_SSH_KEY, TARGET_SSH_KEY_PASSPHRASE");
    println!("  TARGET_HOST_KEY_VERIFICATION, TARGET_HOST_KEY_FINGERPRINT");
    println!("  TARGET_SHELL__*, TARGET_LOGGING__LEVEL, TARGET_LOGGING__FORMAT");
}
