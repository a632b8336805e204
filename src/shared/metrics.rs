//! Prometheus Metrics Module
//!
//! 提供压测过程的核心指标监控
//!
//! ## 指标类型
//! - **Counter**: 发单总数、发单失败、平仓失败、孤儿订单、未知回报
//! - **Histogram**: 各阶段延迟 (毫秒)
//! - **Gauge**: 每个账户的实际发单速率
//!
//! ## 使用示例
//! ```rust,ignore
//! use trade_perf::shared::metrics::METRICS;
//!
//! METRICS.orders_submitted.with_label_values(&["acc-1"]).inc();
//! METRICS.stage_latency.with_label_values(&["new"]).observe(3.5);
//! ```

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};

lazy_static! {
    /// 全局Metrics实例
    pub static ref METRICS: Metrics = Metrics::new();
}

/// 压测核心指标
pub struct Metrics {
    /// 成功提交的订单数 (按账户)
    pub orders_submitted: CounterVec,

    /// 提交失败数 (按账户)
    pub submit_errors: CounterVec,

    /// 平仓失败数 (按账户)
    pub close_errors: CounterVec,

    /// 未收到终态回报而被清理的订单数 (按账户)
    pub orphaned_attempts: CounterVec,

    /// 找不到对应订单的回报数
    pub unknown_reports: CounterVec,

    /// 阶段延迟分布 (毫秒)
    pub stage_latency: HistogramVec,

    /// 最近一个窗口的实际发单速率
    pub achieved_rate: GaugeVec,
}

impl Metrics {
    /// 创建并注册到全局registry
    pub fn new() -> Self {
        Self {
            orders_submitted: register_counter_vec!(
                "trade_perf_orders_submitted_total",
                "Total number of orders accepted by the gateway",
                &["account"]
            )
            .expect("register trade_perf_orders_submitted_total"),

            submit_errors: register_counter_vec!(
                "trade_perf_submit_errors_total",
                "Total number of rejected or failed submissions",
                &["account"]
            )
            .expect("register trade_perf_submit_errors_total"),

            close_errors: register_counter_vec!(
                "trade_perf_close_errors_total",
                "Total number of failed position closes",
                &["account"]
            )
            .expect("register trade_perf_close_errors_total"),

            orphaned_attempts: register_counter_vec!(
                "trade_perf_orphaned_attempts_total",
                "Attempts evicted without a terminal execution report",
                &["account"]
            )
            .expect("register trade_perf_orphaned_attempts_total"),

            unknown_reports: register_counter_vec!(
                "trade_perf_unknown_reports_total",
                "Execution reports for unknown or expired correlation ids",
                &["account"]
            )
            .expect("register trade_perf_unknown_reports_total"),

            stage_latency: register_histogram_vec!(
                "trade_perf_stage_latency_milliseconds",
                "Per-stage order lifecycle latency in milliseconds",
                &["stage"],
                vec![0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0]
            )
            .expect("register trade_perf_stage_latency_milliseconds"),

            achieved_rate: register_gauge_vec!(
                "trade_perf_achieved_rate",
                "Orders per second achieved in the latest window",
                &["account"]
            )
            .expect("register trade_perf_achieved_rate"),
        }
    }

    /// 导出Prometheus格式的指标
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("metrics encoding failed: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
