use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 优雅关闭管理器
///
/// 持有整个进程的根取消令牌，各组件从中派生子令牌。
pub struct ShutdownManager {
    token: CancellationToken,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// 根令牌的克隆，取消即触发全局关闭
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 触发关闭，重复调用无副作用
    pub fn shutdown(&self) {
        if self.token.is_cancelled() {
            debug!("关闭管理器已经触发过关闭");
            return;
        }
        info!("触发系统关闭");
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 收到 Ctrl+C 或 SIGTERM 后触发关闭
    pub fn install_signal_handler(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = wait_for_shutdown_signal() => {
                    info!("收到关闭信号，开始优雅关闭...");
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        });
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 等待关闭信号
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("安装Ctrl+C信号处理器失败");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("安装SIGTERM信号处理器失败")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
