//! Simulated Venue
//!
//! 进程内模拟交易服务器，实现全部协作方接口，便于在没有真实券商连接时运行压测与测试。
//!
//! ## 行为
//! - `submit` 阻塞 `submit_latency` 后返回订单号，按 `reject_rate` 概率拒单
//! - 每个成功订单依次产生 New → Calculated → Filled → FinalCalculated 回报，
//!   间隔 `report_latency`，由独立的回报线程经 crossbeam channel 投递
//! - `close_position` 按 `close_failure_rate` 概率失败
//! - 可指定永远无法就绪的账户，用于验证登录超时路径

use crate::domain::{
    Account, Credentials, ExecutionReport, ExecutionReportListener, OrderGateway, OrderId,
    OrderRequest, QuoteSource, StageKind, TradingSession, Venue, VenueError,
};
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const LIFECYCLE: [StageKind; 4] = [
    StageKind::New,
    StageKind::Calculated,
    StageKind::Filled,
    StageKind::FinalCalculated,
];

/// 模拟服务器参数
#[derive(Debug, Clone)]
pub struct VenueProfile {
    /// 下单调用阻塞时间
    pub submit_latency: Duration,

    /// 相邻两条回报之间的间隔
    pub report_latency: Duration,

    /// 登录后账户信息就绪的延迟
    pub ready_delay: Duration,

    /// 拒单概率 (0.0-1.0)
    pub reject_rate: f64,

    /// 平仓失败概率 (0.0-1.0)
    pub close_failure_rate: f64,

    /// 终态回报丢失概率 (0.0-1.0)，用于制造孤儿订单
    pub report_loss_rate: f64,

    pub bid: f64,
    pub ask: f64,
    pub price_increment: f64,
}

impl Default for VenueProfile {
    fn default() -> Self {
        Self {
            submit_latency: Duration::from_millis(2),
            report_latency: Duration::from_millis(1),
            ready_delay: Duration::from_millis(10),
            reject_rate: 0.0,
            close_failure_rate: 0.0,
            report_loss_rate: 0.0,
            bid: 1.1000,
            ask: 1.1002,
            price_increment: 0.00001,
        }
    }
}

/// 进程内模拟服务器
pub struct SimulatedVenue {
    profile: VenueProfile,
    unready_accounts: HashSet<String>,
    next_order_id: Arc<AtomicU64>,
}

impl SimulatedVenue {
    pub fn new(profile: VenueProfile) -> Self {
        Self {
            profile,
            unready_accounts: HashSet::new(),
            next_order_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// 该账户的会话永远不会就绪
    pub fn with_unready_account(mut self, account: impl Into<String>) -> Self {
        self.unready_accounts.insert(account.into());
        self
    }

    pub fn profile(&self) -> &VenueProfile {
        &self.profile
    }
}

impl Venue for SimulatedVenue {
    fn connect(
        &self,
        account: &Account,
        credentials: &Credentials,
        listener: Arc<dyn ExecutionReportListener>,
    ) -> Result<Box<dyn TradingSession>, VenueError> {
        debug!(account = %account.id, server = %credentials.server, "simulated logon");

        let (tx, rx) = unbounded();
        let closing = Arc::new(AtomicBool::new(false));
        let delivery = {
            let closing = closing.clone();
            thread::Builder::new()
                .name(format!("reports-{}", account.id))
                .spawn(move || deliver_reports(rx, listener, closing))
                .map_err(|e| VenueError::Connect(e.to_string()))?
        };

        let ready = !self.unready_accounts.contains(&account.id);
        Ok(Box::new(SimulatedSession {
            account: account.id.clone(),
            profile: self.profile.clone(),
            connected_at: Instant::now(),
            ready,
            next_order_id: self.next_order_id.clone(),
            rng: Mutex::new(StdRng::from_entropy()),
            reports: Some(tx),
            closing,
            delivery: Some(delivery),
        }))
    }
}

struct ScheduledReport {
    due: Instant,
    report: ExecutionReport,
}

/// 回报投递线程
fn deliver_reports(
    rx: Receiver<ScheduledReport>,
    listener: Arc<dyn ExecutionReportListener>,
    closing: Arc<AtomicBool>,
) {
    for scheduled in rx.iter() {
        if closing.load(Ordering::Acquire) {
            break;
        }
        if let Some(wait) = scheduled.due.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
        listener.on_execution_report(scheduled.report);
    }
}

/// 单个账户的模拟会话
pub struct SimulatedSession {
    account: String,
    profile: VenueProfile,
    connected_at: Instant,
    ready: bool,
    next_order_id: Arc<AtomicU64>,
    rng: Mutex<StdRng>,
    reports: Option<Sender<ScheduledReport>>,
    closing: Arc<AtomicBool>,
    delivery: Option<thread::JoinHandle<()>>,
}

impl SimulatedSession {
    fn roll(&self, probability: f64) -> bool {
        probability > 0.0 && self.rng.lock().gen_bool(probability.min(1.0))
    }

    fn schedule_lifecycle(&self, correlation_id: &str) -> Result<(), VenueError> {
        let reports = self.reports.as_ref().ok_or(VenueError::Disconnected)?;
        let lose_terminal = self.roll(self.profile.report_loss_rate);
        let now = Instant::now();

        for (step, stage) in LIFECYCLE.iter().enumerate() {
            let terminal = step + 1 == LIFECYCLE.len();
            if terminal && lose_terminal {
                break;
            }
            let scheduled = ScheduledReport {
                due: now + self.profile.report_latency * (step as u32 + 1),
                report: ExecutionReport {
                    correlation_id: correlation_id.to_string(),
                    stage: *stage,
                    terminal,
                },
            };
            reports
                .send(scheduled)
                .map_err(|_| VenueError::Disconnected)?;
        }
        Ok(())
    }
}

impl QuoteSource for SimulatedSession {
    fn best_bid(&self, _symbol: &str) -> Option<f64> {
        Some(self.profile.bid)
    }

    fn best_ask(&self, _symbol: &str) -> Option<f64> {
        Some(self.profile.ask)
    }

    fn price_increment(&self, _symbol: &str) -> Option<f64> {
        Some(self.profile.price_increment)
    }
}

impl OrderGateway for SimulatedSession {
    fn submit(&self, request: &OrderRequest) -> Result<OrderId, VenueError> {
        if self.reports.is_none() {
            return Err(VenueError::Disconnected);
        }
        if !self.profile.submit_latency.is_zero() {
            thread::sleep(self.profile.submit_latency);
        }
        if self.roll(self.profile.reject_rate) {
            return Err(VenueError::Submit(format!(
                "{} {} rejected",
                request.correlation_id, request.symbol
            )));
        }

        let order_id = format!("SIM-{}", self.next_order_id.fetch_add(1, Ordering::Relaxed));
        self.schedule_lifecycle(&request.correlation_id)?;
        Ok(order_id)
    }

    fn close_position(&self, order_id: &str) -> Result<(), VenueError> {
        if self.roll(self.profile.close_failure_rate) {
            return Err(VenueError::Close {
                order_id: order_id.to_string(),
                reason: "position is busy".to_string(),
            });
        }
        Ok(())
    }
}

impl TradingSession for SimulatedSession {
    fn wait_ready(&self, timeout: Duration) -> Result<(), VenueError> {
        let ready_at = self.connected_at + self.profile.ready_delay;
        if !self.ready || self.profile.ready_delay > timeout {
            thread::sleep(timeout);
            return Err(VenueError::ConnectTimeout(timeout));
        }
        if let Some(wait) = ready_at.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        self.closing.store(true, Ordering::Release);
        // 关闭发送端，投递线程随之退出
        self.reports.take();
        if let Some(handle) = self.delivery.take() {
            if handle.join().is_err() {
                warn!(account = %self.account, "report delivery thread panicked");
            }
        }
    }
}

impl Drop for SimulatedSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}
