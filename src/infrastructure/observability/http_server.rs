//! HTTP Observability Server
//!
//! 压测过程中提供Prometheus metrics和健康检查端点
//!
//! ## 端点
//! - `GET /metrics` - Prometheus格式的指标
//! - `GET /health` - 健康检查与进度
//! - `GET /health/ready` - 就绪检查
//! - `GET /health/live` - 存活检查
//!
//! 压测线程是同步的，服务器运行在独立线程的tokio运行时中。

use crate::shared::metrics::METRICS;
use super::health::{HealthChecker, HealthStatus};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use tracing::{error, info};

/// 可观测性服务器
pub struct ObservabilityServer {
    addr: SocketAddr,
    health_checker: Arc<HealthChecker>,
}

impl ObservabilityServer {
    /// 创建新的可观测性服务器
    pub fn new(port: u16, health_checker: Arc<HealthChecker>) -> Self {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        Self {
            addr,
            health_checker,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/health/live", get(liveness_handler))
            .with_state(self.health_checker.clone())
    }

    /// 启动HTTP服务器
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = self.router();

        info!("可观测性服务器启动于 {}", self.addr);
        info!("Metrics端点: http://{}/metrics", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// 在后台线程中启动（独立的tokio运行时）
    pub fn spawn(self) -> std::io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("observability".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("failed to build observability runtime: {}", e);
                        return;
                    }
                };
                if let Err(e) = runtime.block_on(self.run()) {
                    error!("observability server stopped: {}", e);
                }
            })
    }
}

/// Prometheus metrics端点
async fn metrics_handler() -> Response {
    (StatusCode::OK, METRICS.export()).into_response()
}

/// 健康检查端点
async fn health_handler(State(checker): State<Arc<HealthChecker>>) -> Response {
    let response = checker.check_health();

    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(response)).into_response()
}

/// 就绪检查端点
async fn readiness_handler(State(checker): State<Arc<HealthChecker>>) -> Response {
    if checker.check_readiness() {
        StatusCode::OK.into_response()
    } else {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
}

/// 存活检查端点
async fn liveness_handler(State(checker): State<Arc<HealthChecker>>) -> Response {
    if checker.check_liveness() {
        StatusCode::OK.into_response()
    } else {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
}
