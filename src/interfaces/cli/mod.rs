/// CLI Interface Module
///
/// Command-line entry point of the load generator.
///
/// ## Responsibilities
/// - Parse command-line arguments into the run configuration
/// - Build the venue, coordinator and result file
/// - Optionally start the metrics server
/// - Run every (rate, account-count) combination in order

use crate::application::{CoordinatorConfig, LoadTestError, Sweep, SweepConfig, WorkerConfig};
use crate::domain::{CorrelationIdGenerator, Credentials, OrderTemplate, Side, TimeInForce};
use crate::infrastructure::{
    HealthChecker, ObservabilityServer, ReportWriter, SimulatedVenue, VenueProfile,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// 交易压测命令行配置
#[derive(Parser, Debug, Clone)]
#[command(name = "trade-perf")]
#[command(version)]
#[command(about = "多账户定速下单压测与延迟统计", long_about = None)]
pub struct CliConfig {
    /// 账户列表（逗号分隔）
    #[arg(short, long, value_delimiter = ',', required = true)]
    pub accounts: Vec<String>,

    /// 账户密码（所有账户共用）
    #[arg(long, default_value = "")]
    pub password: String,

    /// 交易服务器地址
    #[arg(short, long, default_value = "sim")]
    pub server: String,

    /// 目标速率列表，每个账户每秒订单数（逗号分隔）
    #[arg(short, long, value_delimiter = ',', default_value = "10")]
    pub rates: Vec<u32>,

    /// 账户数扫描列表（默认 1..=账户数）
    #[arg(long, value_delimiter = ',')]
    pub account_counts: Vec<usize>,

    /// 每个账户保留的最大持仓数
    #[arg(long)]
    pub persist: Option<usize>,

    /// 每次运行的时长（秒）
    #[arg(long, default_value_t = 10)]
    pub run_secs: u64,

    /// 单个账户最长交易时间（秒）
    #[arg(long)]
    pub max_test_secs: Option<u64>,

    /// 结果文件（追加写入）
    #[arg(short = 'o', long, default_value = "trade-perf-results.csv")]
    pub result_file: PathBuf,

    /// 交易品种
    #[arg(long, default_value = "EURUSD")]
    pub symbol: String,

    /// 买卖方向
    #[arg(long, default_value = "buy")]
    pub side: Side,

    /// 每笔订单数量
    #[arg(long, default_value_t = 100_000.0)]
    pub volume: f64,

    /// 价格偏移（最小变动单位数）
    #[arg(long, default_value_t = 10, allow_negative_numbers = true)]
    pub price_offset: i32,

    /// 等待账户就绪的超时（秒）
    #[arg(long, default_value_t = 10)]
    pub ready_timeout_secs: u64,

    /// 停止时等待未完成回报的时间（毫秒）
    #[arg(long, default_value_t = 500)]
    pub report_grace_ms: u64,

    /// 未完成订单被判定为孤儿的时间（秒）
    #[arg(long, default_value_t = 30)]
    pub orphan_timeout_secs: u64,

    /// 关联ID前缀
    #[arg(long, default_value = "TP")]
    pub id_prefix: String,

    /// 模拟交易所：下单延迟（毫秒）
    #[arg(long, default_value_t = 2)]
    pub sim_submit_latency_ms: u64,

    /// 模拟交易所：回报间隔（毫秒）
    #[arg(long, default_value_t = 1)]
    pub sim_report_latency_ms: u64,

    /// 模拟交易所：拒单概率
    #[arg(long, default_value_t = 0.0)]
    pub sim_reject_rate: f64,

    /// 模拟交易所：平仓失败概率
    #[arg(long, default_value_t = 0.0)]
    pub sim_close_failure_rate: f64,

    /// Prometheus metrics端口（不指定则不启动）
    #[arg(long)]
    pub metrics_port: Option<u16>,

    /// 启用CPU亲和性绑定（需要 cpu-affinity 特性）
    #[arg(long, default_value_t = false)]
    pub cpu_affinity: bool,

    /// 日志级别
    #[arg(short = 'l', long, default_value = "info", value_parser = ["trace", "debug", "info", "warn", "error"])]
    pub log_level: String,

    /// 仅显示配置不执行压测（用于调试）
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

impl CliConfig {
    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            accounts: self.accounts.clone(),
            rates: self.rates.clone(),
            account_counts: self.account_counts.clone(),
            persist_cap: self.persist,
            max_duration: self.max_test_secs.map(Duration::from_secs),
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            run_length: Duration::from_secs(self.run_secs),
            credentials: Credentials {
                server: self.server.clone(),
                password: self.password.clone(),
            },
            template: OrderTemplate {
                symbol: Arc::from(self.symbol.as_str()),
                side: self.side,
                time_in_force: TimeInForce::Ioc,
                volume: self.volume,
                price_offset: self.price_offset,
            },
            worker: WorkerConfig {
                ready_timeout: Duration::from_secs(self.ready_timeout_secs),
                report_grace: Duration::from_millis(self.report_grace_ms),
                orphan_timeout: Duration::from_secs(self.orphan_timeout_secs),
                core_id: self.cpu_affinity.then_some(0),
            },
        }
    }

    pub fn venue_profile(&self) -> VenueProfile {
        VenueProfile {
            submit_latency: Duration::from_millis(self.sim_submit_latency_ms),
            report_latency: Duration::from_millis(self.sim_report_latency_ms),
            reject_rate: self.sim_reject_rate,
            close_failure_rate: self.sim_close_failure_rate,
            ..VenueProfile::default()
        }
    }

    fn validate(&self) -> Result<(), LoadTestError> {
        for (name, p) in [
            ("sim-reject-rate", self.sim_reject_rate),
            ("sim-close-failure-rate", self.sim_close_failure_rate),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(LoadTestError::Config(format!("{} must be within 0..=1", name)));
            }
        }
        if self.volume <= 0.0 {
            return Err(LoadTestError::Config("volume must be positive".to_string()));
        }
        self.sweep_config().validate()
    }
}

/// Runs the CLI application
///
/// Parses command-line arguments and runs the whole sweep.
pub fn run() -> Result<(), LoadTestError> {
    // 解析命令行参数
    let config = CliConfig::parse();

    // 初始化日志系统
    init_logging(&config.log_level);

    tracing::info!("压测启动");
    tracing::debug!("配置: {:?}", config);

    config.validate()?;
    let sweep_config = config.sweep_config();

    // 显示配置信息
    println!("========================================");
    println!("  交易压测 trade-perf v{}", env!("CARGO_PKG_VERSION"));
    println!("========================================");
    println!("服务器:       {}", config.server);
    println!("账户:         {}", config.accounts.join(","));
    println!("速率:         {:?}", config.rates);
    println!("账户数扫描:   {:?}", sweep_config.counts());
    println!("运行时长:     {}s", config.run_secs);
    println!("持仓上限:     {}", config.persist.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()));
    println!("结果文件:     {}", config.result_file.display());
    println!("CPU亲和性:    {}", if config.cpu_affinity { "启用" } else { "禁用" });
    println!("日志级别:     {}", config.log_level);
    println!("========================================");

    // 如果是dry-run模式，仅显示配置
    if config.dry_run {
        println!("\nDry-run 模式 - 不执行压测");
        return Ok(());
    }

    let health = Arc::new(HealthChecker::default());
    if let Some(port) = config.metrics_port {
        ObservabilityServer::new(port, health.clone()).spawn()?;
    }

    let venue = Arc::new(SimulatedVenue::new(config.venue_profile()));
    let ids = Arc::new(CorrelationIdGenerator::new(config.id_prefix.clone()));
    let writer = ReportWriter::open(&config.result_file)?;

    let mut sweep = Sweep::new(sweep_config, venue, config.coordinator_config(), ids, writer)?
        .with_health(health);
    let runs = sweep.run()?;
    let rows = sweep.into_writer().rows();

    tracing::info!(runs = runs.len(), rows, "压测完成");
    Ok(())
}

/// 初始化日志系统
fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_config_default() {
        // 测试默认配置
        let config = CliConfig::parse_from(["trade-perf", "--accounts", "100231"]);
        assert_eq!(config.accounts, vec!["100231"]);
        assert_eq!(config.rates, vec![10]);
        assert!(config.account_counts.is_empty());
        assert_eq!(config.persist, None);
        assert_eq!(config.run_secs, 10);
        assert_eq!(config.side, Side::Buy);
        assert_eq!(config.price_offset, 10);
        assert_eq!(config.log_level, "info");
        assert!(config.metrics_port.is_none());
        assert!(!config.dry_run);
    }

    #[test]
    fn test_cli_config_custom() {
        // 测试自定义配置
        let config = CliConfig::parse_from([
            "trade-perf",
            "--accounts", "a,b,c",
            "--password", "pw",
            "--server", "demo.example.net:443",
            "--rates", "10,50",
            "--account-counts", "1,3",
            "--persist", "20",
            "--run-secs", "30",
            "--max-test-secs", "25",
            "--result-file", "out.csv",
            "--side", "sell",
            "--price-offset", "-5",
            "--sim-reject-rate", "0.1",
            "--metrics-port", "9100",
            "--cpu-affinity",
            "--log-level", "debug",
            "--dry-run",
        ]);

        assert_eq!(config.accounts, vec!["a", "b", "c"]);
        assert_eq!(config.rates, vec![10, 50]);
        assert_eq!(config.account_counts, vec![1, 3]);
        assert_eq!(config.persist, Some(20));
        assert_eq!(config.side, Side::Sell);
        assert_eq!(config.price_offset, -5);
        assert_eq!(config.metrics_port, Some(9100));
        assert!(config.dry_run);

        let sweep = config.sweep_config();
        assert_eq!(sweep.max_duration, Some(Duration::from_secs(25)));
        assert_eq!(sweep.counts(), vec![1, 3]);

        let coordinator = config.coordinator_config();
        assert_eq!(coordinator.run_length, Duration::from_secs(30));
        assert_eq!(coordinator.credentials.server, "demo.example.net:443");
        assert_eq!(coordinator.worker.core_id, Some(0));
        assert_eq!(config.venue_profile().reject_rate, 0.1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_config_short_flags() {
        // 测试短参数
        let config = CliConfig::parse_from([
            "trade-perf",
            "-a", "x,y",
            "-r", "5",
            "-o", "r.csv",
            "-l", "warn",
        ]);

        assert_eq!(config.accounts.len(), 2);
        assert_eq!(config.rates, vec![5]);
        assert_eq!(config.result_file, PathBuf::from("r.csv"));
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_invalid_configuration() {
        let config = CliConfig::parse_from(["trade-perf", "-a", "x", "--account-counts", "2"]);
        assert!(matches!(config.validate(), Err(LoadTestError::Config(_))));

        let config = CliConfig::parse_from(["trade-perf", "-a", "x", "--sim-reject-rate", "1.5"]);
        assert!(matches!(config.validate(), Err(LoadTestError::Config(_))));
    }

    #[test]
    fn test_accounts_required() {
        assert!(CliConfig::try_parse_from(["trade-perf"]).is_err());
    }
}
