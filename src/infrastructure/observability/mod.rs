//! Observability Module
//!
//! 提供压测进程的可观测性功能：
//! - Prometheus metrics导出
//! - 健康检查与进度端点
//!
//! ## 模块结构
//! - `health` - 健康检查
//! - `http_server` - HTTP可观测性服务器

pub mod health;
pub mod http_server;

pub use health::{HealthChecker, HealthDetails, HealthResponse, HealthStatus};
pub use http_server::ObservabilityServer;
