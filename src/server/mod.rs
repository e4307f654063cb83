//! 展示层（Presentation Layer）
//!
//! ## 职责
//!
//! - 提供单页表单与 JSON 接口
//! - 持有会话表，串行化同一会话内的请求
//! - 把所有错误转换为一次性的提示，不影响进程
//!
//! ## 层次关系
//!
//! ```text
//! server (HTTP / 会话表)
//!     ↓
//! workflow::{ProblemSolver, FollowUpAnswerer}
//!     ↓
//! services (能力层：prompt / llm / ocr)
//!     ↓
//! clients (外部服务：模型 / OCR)
//! ```

pub mod routes;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::utils::logging::log_startup;

pub use routes::{router, AppState};

/// 应用主结构
pub struct App {
    config: Config,
    state: Arc<AppState>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate()?;

        log_startup(&config);

        let state = Arc::new(AppState::from_config(&config));

        Ok(Self { config, state })
    }

    /// 启动 HTTP 服务，直到收到 Ctrl-C
    pub async fn run(self) -> Result<()> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("无法监听地址: {}", addr))?;

        info!("🌐 MathVision: http://{}", addr);

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP 服务异常退出")?;

        info!("👋 服务已停止");
        Ok(())
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("收到退出信号，正在停止服务...");
    }
}
