use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use checker_core::config::LogFormat;
use checker_core::{init_logging, AppConfig};
use checker_scheduler::app::Application;
use checker_scheduler::shutdown::ShutdownManager;
use clap::{Arg, Command};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("checker-scheduler")
        .version(env!("CARGO_PKG_VERSION"))
        .about("分布式拨测任务调度与执行引擎")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径")
                .default_value("config/checker.toml"),
        )
        .arg(
            Arg::new("node-id")
                .long("node-id")
                .value_name("ID")
                .help("节点ID，覆盖配置文件中的 node.id"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config/checker.toml");

    // 加载配置
    let mut config = AppConfig::load(Some(config_path))
        .with_context(|| format!("加载配置文件失败: {config_path}"))?;

    if let Some(id) = matches.get_one::<String>("node-id") {
        config.node.id = Some(id.clone());
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format.parse::<LogFormat>()?;
    }

    // 初始化日志系统
    init_logging(
        &config.observability.log_level,
        config.observability.log_format,
    )?;

    info!("启动分布式拨测调度系统");
    info!("配置文件: {config_path}");

    let app = Arc::new(Application::new(config));
    info!("节点ID: {}", app.node_id());

    // 创建优雅关闭管理器
    let shutdown_manager = ShutdownManager::new();
    shutdown_manager.install_signal_handler();

    let mut app_handle = {
        let app = Arc::clone(&app);
        let token = shutdown_manager.token();
        tokio::spawn(async move { app.run(token).await })
    };

    let token = shutdown_manager.token();
    tokio::select! {
        result = &mut app_handle => {
            // 启动阶段失败时应用会在收到信号前返回
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    error!("应用运行失败: {e:#}");
                    Err(e)
                }
                Err(e) => Err(anyhow::anyhow!("应用任务异常退出: {e}")),
            };
        }
        _ = token.cancelled() => {}
    }

    // 等待应用关闭，设置超时
    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Ok(Ok(()))) => info!("应用已优雅关闭"),
        Ok(Ok(Err(e))) => error!("应用关闭时发生错误: {e:#}"),
        Ok(Err(e)) => error!("应用任务异常退出: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("分布式拨测调度系统已退出");
    Ok(())
}
