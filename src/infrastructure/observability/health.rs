//! Health Check Endpoint
//!
//! 提供压测进程的健康状态与进度，供监控系统轮询
//!
//! ## 健康检查端点
//! - `/health` - 状态与进度详情
//! - `/health/ready` - 就绪检查（最近一次运行无失败账户）
//! - `/health/live` - 存活检查（进程仍在运行）
//!
//! ## 响应格式
//! ```json
//! {
//!   "status": "healthy",
//!   "uptime_seconds": 3600,
//!   "version": "0.1.0",
//!   "timestamp": 1234567890,
//!   "details": { "runs_completed": 3, "current_rate": 50, ... }
//! }
//! ```

use crate::application::report::RunReport;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use parking_lot::RwLock;

/// 健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// 健康
    Healthy,
    /// 降级（最近一次运行有账户失败）
    Degraded,
    /// 不健康
    Unhealthy,
}

/// 健康检查响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// 状态
    pub status: HealthStatus,
    /// 运行时间（秒）
    pub uptime_seconds: u64,
    /// 版本号
    pub version: String,
    /// 时间戳
    pub timestamp: u64,
    /// 压测进度
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

/// 压测进度
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthDetails {
    /// 已完成的运行数
    pub runs_completed: u64,
    /// 当前目标速率
    pub current_rate: u32,
    /// 当前账户数
    pub current_accounts: usize,
    /// 最近一次运行失败的账户数
    pub failed_accounts: usize,
    /// 最近一次运行的孤儿订单数
    pub orphaned_attempts: u64,
    /// 累计完成的订单数
    pub completed_attempts: u64,
}

/// 健康检查器
pub struct HealthChecker {
    /// 启动时间
    start_time: SystemTime,
    /// 当前状态
    status: Arc<RwLock<HealthStatus>>,
    /// 进度
    details: Arc<RwLock<HealthDetails>>,
    /// 版本号
    version: String,
}

impl HealthChecker {
    /// 创建新的健康检查器
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            start_time: SystemTime::now(),
            status: Arc::new(RwLock::new(HealthStatus::Healthy)),
            details: Arc::new(RwLock::new(HealthDetails::default())),
            version: version.into(),
        }
    }

    /// 获取运行时间（秒）
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time
            .elapsed()
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// 获取当前时间戳
    fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// 设置健康状态
    pub fn set_status(&self, status: HealthStatus) {
        *self.status.write() = status;
    }

    /// 获取健康状态
    pub fn get_status(&self) -> HealthStatus {
        *self.status.read()
    }

    /// 记录即将开始的运行
    pub fn run_started(&self, rate: u32, accounts: usize) {
        let mut details = self.details.write();
        details.current_rate = rate;
        details.current_accounts = accounts;
    }

    /// 记录一次运行的结果，有失败账户时降级
    pub fn run_finished(&self, run: &RunReport) {
        let failed = run.failed_accounts().count();
        {
            let mut details = self.details.write();
            details.runs_completed += 1;
            details.failed_accounts = failed;
            details.orphaned_attempts = run.total_orphans();
            details.completed_attempts += run.total_completed() as u64;
        }
        self.set_status(if failed > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        });
    }

    pub fn details(&self) -> HealthDetails {
        self.details.read().clone()
    }

    /// 生成健康检查响应
    pub fn check_health(&self) -> HealthResponse {
        HealthResponse {
            status: self.get_status(),
            uptime_seconds: self.uptime_seconds(),
            version: self.version.clone(),
            timestamp: Self::current_timestamp(),
            details: Some(self.details()),
        }
    }

    /// 存活检查（liveness probe）
    pub fn check_liveness(&self) -> bool {
        true
    }

    /// 就绪检查（readiness probe）
    pub fn check_readiness(&self) -> bool {
        matches!(self.get_status(), HealthStatus::Healthy)
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::report::{AccountReport, AccountStatus};

    fn run_with(failed: bool) -> RunReport {
        let mut account = AccountReport::new("acc", 10);
        if failed {
            account.status = AccountStatus::Failed("logon timed out".to_string());
        }
        account.counters.orphans = 2;
        RunReport {
            test_number: 1,
            requested_rate: 10,
            accounts: vec![account],
        }
    }

    #[test]
    fn test_health_checker_creation() {
        let checker = HealthChecker::new("1.0.0");
        assert_eq!(checker.version, "1.0.0");
        assert_eq!(checker.get_status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_run_progress() {
        let checker = HealthChecker::new("1.0.0");
        checker.run_started(10, 1);
        checker.run_finished(&run_with(false));

        let details = checker.details();
        assert_eq!(details.runs_completed, 1);
        assert_eq!(details.current_rate, 10);
        assert_eq!(details.orphaned_attempts, 2);
        assert!(checker.check_readiness());
    }

    #[test]
    fn test_failed_account_degrades() {
        let checker = HealthChecker::new("1.0.0");
        checker.run_finished(&run_with(true));
        assert_eq!(checker.get_status(), HealthStatus::Degraded);
        assert!(!checker.check_readiness());
        // 即使降级，存活检查也应该通过
        assert!(checker.check_liveness());

        checker.run_finished(&run_with(false));
        assert_eq!(checker.get_status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_serialization() {
        let checker = HealthChecker::new("1.0.0");
        let response = checker.check_health();

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("runs_completed"));
        assert!(json.contains("1.0.0"));
    }
}
