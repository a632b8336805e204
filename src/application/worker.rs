/// Account Worker
///
/// Owns one account for the length of a run: its session, correlator,
/// position book and rate-window loop, all driven from one dedicated thread.
///
/// ## Lifecycle
/// `Created -> AwaitingReady -> Trading -> Stopping -> Closed`
///
/// A worker that cannot log on still takes part in both rendezvous phases,
/// so a failed account never blocks the coordinator or the other workers.

use super::context::RunContext;
use super::positions::PositionBook;
use super::rate_window::{RateWindow, WindowOutcome};
use super::report::{AccountReport, AccountStatus};
use crate::domain::{
    Account, Credentials, ExecutionReportListener, LatencyCorrelator, OrderTemplate,
    TradingSession, Venue, VenueError,
};
use crate::shared::metrics::METRICS;
use crossbeam::channel::Receiver;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// "go" and "stop"
const RENDEZVOUS_PHASES: u8 = 2;

fn rendezvous(ctx: &RunContext, phases_done: &mut u8) {
    ctx.barrier.wait();
    *phases_done += 1;
}

/// Worker timing knobs
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Bound on waiting for account metadata after logon
    pub ready_timeout: Duration,

    /// How long to wait for outstanding reports at stop
    pub report_grace: Duration,

    /// In-flight attempts older than this are evicted as orphans
    pub orphan_timeout: Duration,

    /// 绑定CPU核心（需要 cpu-affinity 特性）
    pub core_id: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(10),
            report_grace: Duration::from_millis(500),
            orphan_timeout: Duration::from_secs(30),
            core_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    AwaitingReady,
    Trading,
    Stopping,
    Closed,
}

pub struct AccountWorker {
    account: Account,
    credentials: Credentials,
    template: OrderTemplate,
    venue: Arc<dyn Venue>,
    config: WorkerConfig,
    correlator: Arc<LatencyCorrelator>,
    state: WorkerState,
}

impl AccountWorker {
    pub fn new(
        account: Account,
        credentials: Credentials,
        template: OrderTemplate,
        venue: Arc<dyn Venue>,
        config: WorkerConfig,
    ) -> Self {
        let correlator = Arc::new(LatencyCorrelator::new(account.id.clone()));
        Self {
            account,
            credentials,
            template,
            venue,
            config,
            correlator,
            state: WorkerState::Created,
        }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Starts the worker on its own named thread
    ///
    /// The thread logs nothing and touches no venue until the run context
    /// arrives on `start`. A closed channel means the run was abandoned
    /// before it began; the worker then exits without joining the rendezvous.
    pub fn spawn(self, start: Receiver<RunContext>) -> io::Result<thread::JoinHandle<AccountReport>> {
        thread::Builder::new()
            .name(format!("account-{}", self.account.id))
            .spawn(move || match start.recv() {
                Ok(ctx) => self.run(ctx),
                Err(_) => {
                    let mut report =
                        AccountReport::new(self.account.id.clone(), self.account.target_rate);
                    report.status = AccountStatus::Failed("run aborted before start".to_string());
                    report
                }
            })
    }

    /// Runs the full lifecycle on the calling thread
    ///
    /// A panic anywhere in the lifecycle is caught; the worker still
    /// completes both rendezvous phases and reports itself as failed.
    pub fn run(self, ctx: RunContext) -> AccountReport {
        let account_id = self.account.id.clone();
        let target_rate = self.account.target_rate;
        let mut phases_done = 0u8;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.lifecycle(&ctx, &mut phases_done)));
        match outcome {
            Ok(report) => report,
            Err(_) => {
                error!(account = %account_id, phases_done, "worker panicked");
                for _ in phases_done..RENDEZVOUS_PHASES {
                    ctx.barrier.wait();
                }
                let mut report = AccountReport::new(account_id, target_rate);
                report.status = AccountStatus::Failed("worker panicked".to_string());
                report
            }
        }
    }

    fn lifecycle(mut self, ctx: &RunContext, phases_done: &mut u8) -> AccountReport {
        self.pin_to_core();
        let mut report = AccountReport::new(self.account.id.clone(), self.account.target_rate);

        let session = match self.connect() {
            Ok(session) => session,
            Err(e) => {
                error!(account = %self.account.id, "worker aborted: {}", e);
                report.status = AccountStatus::Failed(e.to_string());
                self.transition(WorkerState::Closed);
                // 仍需参与两次集合，避免其他线程死锁
                rendezvous(ctx, phases_done);
                rendezvous(ctx, phases_done);
                return report;
            }
        };

        rendezvous(ctx, phases_done);
        report.trading_started_at = Some(Instant::now());
        self.transition(WorkerState::Trading);
        info!(account = %self.account.id, rate = self.account.target_rate, "trading started");

        let mut positions = PositionBook::new(self.account.id.clone());
        self.trade(session.as_ref(), ctx, &mut positions, &mut report);

        self.transition(WorkerState::Stopping);
        self.stop(session, &mut positions, &mut report);

        self.transition(WorkerState::Closed);
        info!(
            account = %self.account.id,
            windows = report.counters.windows,
            completed = report.completed.len(),
            orphans = report.counters.orphans,
            "worker closed"
        );
        rendezvous(ctx, phases_done);
        report
    }

    fn connect(&mut self) -> Result<Box<dyn TradingSession>, VenueError> {
        self.transition(WorkerState::AwaitingReady);
        let listener: Arc<dyn ExecutionReportListener> = self.correlator.clone();
        let mut session = self
            .venue
            .connect(&self.account, &self.credentials, listener)?;

        if let Err(e) = session.wait_ready(self.config.ready_timeout) {
            session.disconnect();
            return Err(e);
        }
        debug!(account = %self.account.id, "session ready");
        Ok(session)
    }

    fn trade(
        &self,
        session: &dyn TradingSession,
        ctx: &RunContext,
        positions: &mut PositionBook,
        report: &mut AccountReport,
    ) {
        let mut rate_window = RateWindow::new(
            self.account.id.clone(),
            self.account.target_rate,
            self.template.clone(),
            ctx.ids.clone(),
            self.correlator.clone(),
        );

        let windows = rate_window.run(
            session,
            &ctx.stop,
            self.account.max_duration,
            |outcome: &WindowOutcome| {
                report.orders_per_sec.add(outcome.achieved_rate);
                report.counters.submitted += outcome.sent as u64;
                report.counters.submit_errors += outcome.submit_errors as u64;
                positions.extend(outcome.order_ids.iter().cloned());

                if let Some(cap) = self.account.persist_cap {
                    let closed = positions.enforce_cap(session, cap);
                    report.counters.close_errors += closed.failed as u64;
                }

                report.record_completed(self.correlator.drain_completed());
                let orphans = self.correlator.sweep_orphans(self.config.orphan_timeout);
                self.count_orphans(report, orphans.len());
            },
        );
        report.counters.windows = windows;
    }

    fn stop(
        &self,
        mut session: Box<dyn TradingSession>,
        positions: &mut PositionBook,
        report: &mut AccountReport,
    ) {
        let closed = positions.close_all(session.as_ref());
        report.counters.close_errors += closed.failed as u64;
        report.open_positions = positions.ids().cloned().collect();

        // 等待尚未到达的回报
        let deadline = Instant::now() + self.config.report_grace;
        while self.correlator.in_flight_len() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        report.record_completed(self.correlator.drain_completed());
        let orphans = self.correlator.drain_in_flight();
        self.count_orphans(report, orphans.len());
        report.counters.unknown_reports = self.correlator.unknown_reports();

        session.disconnect();
    }

    fn transition(&mut self, next: WorkerState) {
        debug!(account = %self.account.id, from = ?self.state, to = ?next, "worker state");
        self.state = next;
    }

    fn count_orphans(&self, report: &mut AccountReport, orphans: usize) {
        if orphans == 0 {
            return;
        }
        report.counters.orphans += orphans as u64;
        METRICS
            .orphaned_attempts
            .with_label_values(&[&self.account.id])
            .inc_by(orphans as f64);
        warn!(account = %self.account.id, orphans, "evicted attempts without terminal report");
    }

    fn pin_to_core(&self) {
        if let Some(core) = self.config.core_id {
            #[cfg(feature = "cpu-affinity")]
            {
                if let Some(core_ids) = core_affinity::get_core_ids() {
                    if let Some(id) = core_ids.get(core % core_ids.len().max(1)) {
                        core_affinity::set_for_current(*id);
                    }
                }
            }
            #[cfg(not(feature = "cpu-affinity"))]
            debug!(account = %self.account.id, core, "cpu-affinity feature disabled, not pinning");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CorrelationIdGenerator, OrderGateway, OrderId, OrderRequest, QuoteSource};

    /// Venue whose sessions never become ready
    struct DeadVenue;

    struct DeadSession;

    impl QuoteSource for DeadSession {
        fn best_bid(&self, _symbol: &str) -> Option<f64> {
            None
        }

        fn best_ask(&self, _symbol: &str) -> Option<f64> {
            None
        }

        fn price_increment(&self, _symbol: &str) -> Option<f64> {
            None
        }
    }

    impl OrderGateway for DeadSession {
        fn submit(&self, _request: &OrderRequest) -> Result<OrderId, VenueError> {
            Err(VenueError::Disconnected)
        }

        fn close_position(&self, _order_id: &str) -> Result<(), VenueError> {
            Err(VenueError::Disconnected)
        }
    }

    impl TradingSession for DeadSession {
        fn wait_ready(&self, timeout: Duration) -> Result<(), VenueError> {
            thread::sleep(timeout);
            Err(VenueError::ConnectTimeout(timeout))
        }

        fn disconnect(&mut self) {}
    }

    impl Venue for DeadVenue {
        fn connect(
            &self,
            _account: &Account,
            _credentials: &Credentials,
            _listener: Arc<dyn ExecutionReportListener>,
        ) -> Result<Box<dyn TradingSession>, VenueError> {
            Ok(Box::new(DeadSession))
        }
    }

    #[test]
    fn test_ready_timeout_fails_worker_without_deadlock() {
        let config = WorkerConfig {
            ready_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let worker = AccountWorker::new(
            Account::new("dead", 5),
            Credentials {
                server: "localhost".to_string(),
                password: String::new(),
            },
            OrderTemplate::default(),
            Arc::new(DeadVenue),
            config,
        );
        let ctx = RunContext::new(1, Arc::new(CorrelationIdGenerator::default()));
        let (start_tx, start_rx) = crossbeam::channel::bounded(1);
        let handle = worker.spawn(start_rx).unwrap();
        start_tx.send(ctx.clone()).unwrap();

        ctx.barrier.wait();
        ctx.stop.cancel();
        ctx.barrier.wait();

        let report = handle.join().unwrap();
        assert!(report.is_failed());
        assert!(report.trading_started_at.is_none());
        match report.status {
            AccountStatus::Failed(reason) => assert!(reason.contains("timed out")),
            AccountStatus::Completed => panic!("worker should have failed"),
        }
    }

    /// Venue whose logon blows up inside the implementation
    struct PanickingVenue;

    impl Venue for PanickingVenue {
        fn connect(
            &self,
            _account: &Account,
            _credentials: &Credentials,
            _listener: Arc<dyn ExecutionReportListener>,
        ) -> Result<Box<dyn TradingSession>, VenueError> {
            panic!("venue SDK crashed during logon");
        }
    }

    fn worker_for(venue: Arc<dyn Venue>) -> AccountWorker {
        AccountWorker::new(
            Account::new("boom", 5),
            Credentials {
                server: "localhost".to_string(),
                password: String::new(),
            },
            OrderTemplate::default(),
            venue,
            WorkerConfig::default(),
        )
    }

    #[test]
    fn test_panic_still_completes_rendezvous() {
        let ctx = RunContext::new(1, Arc::new(CorrelationIdGenerator::default()));
        let (start_tx, start_rx) = crossbeam::channel::bounded(1);
        let handle = worker_for(Arc::new(PanickingVenue)).spawn(start_rx).unwrap();
        start_tx.send(ctx.clone()).unwrap();

        ctx.barrier.wait();
        ctx.stop.cancel();
        ctx.barrier.wait();

        let report = handle.join().unwrap();
        assert_eq!(report.status, AccountStatus::Failed("worker panicked".to_string()));
    }

    #[test]
    fn test_closed_start_channel_skips_rendezvous() {
        let (start_tx, start_rx) = crossbeam::channel::bounded::<RunContext>(1);
        let handle = worker_for(Arc::new(DeadVenue)).spawn(start_rx).unwrap();
        drop(start_tx);

        let report = handle.join().unwrap();
        assert!(report.is_failed());
        assert!(report.trading_started_at.is_none());
    }
}
