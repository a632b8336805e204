/// Rate Window - per-account control loop
///
/// Once per one-second tick the loop sends orders until either the target
/// count is reached or the tick elapses, records the achieved rate, and
/// sleeps to the next tick boundary.
///
/// ## States
/// `Idle -> Sending -> WindowComplete -> (Sending | Stopped)`
///
/// ## Notes
/// - A failed submission is evicted from the correlator and does not count
///   toward the target
/// - A window that overruns its second is not followed by a catch-up burst

use super::context::StopToken;
use crate::domain::{
    CorrelationIdGenerator, LatencyCorrelator, OrderGateway, OrderId, OrderRequest, OrderTemplate,
    QuoteSource, Side,
};
use crate::shared::metrics::METRICS;
use crate::shared::timestamp::{as_millis_f64, remaining_in_window, WINDOW};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Idle,
    Sending,
    WindowComplete,
    Stopped,
}

/// Result of one window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowOutcome {
    pub target: u32,
    pub sent: u32,
    pub submit_errors: u32,

    /// Time spent sending, before pacing
    pub elapsed: Duration,
    pub achieved_rate: f64,

    /// Order ids accepted in this window, in submission order
    pub order_ids: Vec<OrderId>,
}

/// Achieved-rate estimator
///
/// Windows that reached the target, or sent more than one order, report the
/// count as is. Windows that sent at most one order were cut short by
/// latency, so the count is extrapolated to a full second.
pub fn achieved_rate(sent: u32, target: u32, elapsed: Duration) -> f64 {
    if sent == target || sent > 1 {
        return sent as f64;
    }
    let elapsed_ms = as_millis_f64(elapsed);
    if elapsed_ms <= 0.0 {
        return sent as f64;
    }
    sent as f64 * 1000.0 / elapsed_ms
}

/// Opening reference price from the latest quote
///
/// Buy takes the ask, sell the bid (unset quotes count as 0). The offset is
/// applied in the aggressive direction so an IoC order fills or rejects at once.
pub fn reference_price<Q: QuoteSource + ?Sized>(quotes: &Q, template: &OrderTemplate) -> f64 {
    let symbol = &*template.symbol;
    let quote = match template.side {
        Side::Buy => quotes.best_ask(symbol),
        Side::Sell => quotes.best_bid(symbol),
    }
    .unwrap_or(0.0);

    if template.price_offset == 0 {
        return quote;
    }
    match quotes.price_increment(symbol) {
        Some(step) => {
            let offset = step * template.price_offset as f64;
            match template.side {
                Side::Buy => quote + offset,
                Side::Sell => quote - offset,
            }
        }
        None => quote,
    }
}

pub struct RateWindow {
    account: String,
    target: u32,
    template: OrderTemplate,
    ids: Arc<CorrelationIdGenerator>,
    correlator: Arc<LatencyCorrelator>,
    state: WindowState,
}

impl RateWindow {
    pub fn new(
        account: impl Into<String>,
        target: u32,
        template: OrderTemplate,
        ids: Arc<CorrelationIdGenerator>,
        correlator: Arc<LatencyCorrelator>,
    ) -> Self {
        Self {
            account: account.into(),
            target,
            template,
            ids,
            correlator,
            state: WindowState::Idle,
        }
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    /// Runs windows until the stop token fires or `max_duration` passes
    ///
    /// `after_window` runs once per window after pacing. Returns the number
    /// of windows run.
    pub fn run<S, F>(
        &mut self,
        session: &S,
        stop: &StopToken,
        max_duration: Option<Duration>,
        mut after_window: F,
    ) -> u32
    where
        S: QuoteSource + OrderGateway + ?Sized,
        F: FnMut(&WindowOutcome),
    {
        let started = Instant::now();
        let mut windows = 0;

        loop {
            let outcome = self.run_window(session);
            windows += 1;
            after_window(&outcome);

            if stop.is_cancelled() {
                break;
            }
            if max_duration.is_some_and(|limit| started.elapsed() >= limit) {
                debug!(account = %self.account, windows, "max test duration reached");
                break;
            }
        }

        self.state = WindowState::Stopped;
        windows
    }

    /// Sends one window and sleeps for the rest of its second
    pub fn run_window<S>(&mut self, session: &S) -> WindowOutcome
    where
        S: QuoteSource + OrderGateway + ?Sized,
    {
        let window_start = Instant::now();
        let outcome = self.send_window(session, window_start);

        if let Some(remaining) = remaining_in_window(window_start) {
            thread::sleep(remaining);
        }
        outcome
    }

    fn send_window<S>(&mut self, session: &S, window_start: Instant) -> WindowOutcome
    where
        S: QuoteSource + OrderGateway + ?Sized,
    {
        self.state = WindowState::Sending;
        let target = self.target;
        let mut sent = 0u32;
        let mut submit_errors = 0u32;
        let mut order_ids = Vec::with_capacity(target as usize);

        while sent < target && window_start.elapsed() < WINDOW {
            match self.send_one(session) {
                Some(order_id) => {
                    order_ids.push(order_id);
                    sent += 1;
                }
                None => submit_errors += 1,
            }
        }

        let elapsed = window_start.elapsed();
        let achieved_rate = achieved_rate(sent, target, elapsed);
        self.state = WindowState::WindowComplete;

        METRICS
            .achieved_rate
            .with_label_values(&[&self.account])
            .set(achieved_rate);
        debug!(
            account = %self.account,
            sent,
            target,
            submit_errors,
            elapsed_ms = as_millis_f64(elapsed),
            achieved_rate,
            "window complete"
        );

        WindowOutcome {
            target,
            sent,
            submit_errors,
            elapsed,
            achieved_rate,
            order_ids,
        }
    }

    /// Registers, submits and attaches the order id; None on any failure
    fn send_one<S>(&self, session: &S) -> Option<OrderId>
    where
        S: QuoteSource + OrderGateway + ?Sized,
    {
        let correlation_id = self.ids.next_id();
        if let Err(e) = self.correlator.register(&correlation_id) {
            warn!(account = %self.account, "{}", e);
            return None;
        }

        let request = OrderRequest {
            correlation_id,
            symbol: self.template.symbol.clone(),
            side: self.template.side,
            time_in_force: self.template.time_in_force,
            price: reference_price(session, &self.template),
            volume: self.template.volume,
        };

        match session.submit(&request) {
            Ok(order_id) => {
                self.correlator
                    .attach_order_id(&request.correlation_id, &order_id);
                METRICS
                    .orders_submitted
                    .with_label_values(&[&self.account])
                    .inc();
                Some(order_id)
            }
            Err(e) => {
                self.correlator.evict_failed(&request.correlation_id);
                METRICS
                    .submit_errors
                    .with_label_values(&[&self.account])
                    .inc();
                debug!(account = %self.account, correlation_id = %request.correlation_id, "{}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::VenueError;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Gateway double: fixed quotes, configurable delay and failure pattern
    struct ScriptedGateway {
        delay: Duration,
        fail_every: Option<u32>,
        calls: AtomicU32,
        prices: Mutex<Vec<f64>>,
    }

    impl ScriptedGateway {
        fn instant() -> Self {
            Self::with_delay(Duration::ZERO)
        }

        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                fail_every: None,
                calls: AtomicU32::new(0),
                prices: Mutex::new(Vec::new()),
            }
        }
    }

    impl QuoteSource for ScriptedGateway {
        fn best_bid(&self, _symbol: &str) -> Option<f64> {
            Some(1.1000)
        }

        fn best_ask(&self, _symbol: &str) -> Option<f64> {
            Some(1.1002)
        }

        fn price_increment(&self, _symbol: &str) -> Option<f64> {
            Some(0.0001)
        }
    }

    impl OrderGateway for ScriptedGateway {
        fn submit(&self, request: &OrderRequest) -> Result<OrderId, VenueError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.prices.lock().push(request.price);
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            if self.fail_every.is_some_and(|k| n % k == 0) {
                return Err(VenueError::Submit("rejected".to_string()));
            }
            Ok(format!("ORD-{}", n))
        }

        fn close_position(&self, _order_id: &str) -> Result<(), VenueError> {
            Ok(())
        }
    }

    fn window(target: u32, correlator: Arc<LatencyCorrelator>) -> RateWindow {
        RateWindow::new(
            "acc",
            target,
            OrderTemplate::default(),
            Arc::new(CorrelationIdGenerator::new("W")),
            correlator,
        )
    }

    #[test]
    fn test_achieved_rate_estimator() {
        // 达到目标
        assert_eq!(achieved_rate(5, 5, Duration::from_millis(20)), 5.0);
        // 未达目标但发出多于1单
        assert_eq!(achieved_rate(3, 10, Duration::from_millis(1000)), 3.0);
        // 至多1单时外推
        assert_eq!(achieved_rate(1, 10, Duration::from_millis(1250)), 0.8);
        assert_eq!(achieved_rate(0, 10, Duration::from_millis(1000)), 0.0);
    }

    #[test]
    fn test_reference_price() {
        let quotes = ScriptedGateway::instant();
        let mut template = OrderTemplate::default();

        template.price_offset = 0;
        assert_eq!(reference_price(&quotes, &template), 1.1002);

        template.price_offset = 10;
        assert!((reference_price(&quotes, &template) - 1.1012).abs() < 1e-9);

        template.side = Side::Sell;
        assert!((reference_price(&quotes, &template) - 1.0990).abs() < 1e-9);
    }

    #[test]
    fn test_instant_gateway_reaches_target() {
        let correlator = Arc::new(LatencyCorrelator::new("acc"));
        let gateway = ScriptedGateway::instant();
        let mut rw = window(7, correlator.clone());

        let started = Instant::now();
        let outcome = rw.run_window(&gateway);

        assert_eq!(outcome.sent, 7);
        assert_eq!(outcome.achieved_rate, 7.0);
        assert_eq!(outcome.order_ids.len(), 7);
        assert_eq!(correlator.in_flight_len(), 7);
        assert_eq!(rw.state(), WindowState::WindowComplete);
        assert!(gateway.prices.lock().iter().all(|p| (p - 1.1012).abs() < 1e-9));
        // 窗口按秒对齐
        assert!(started.elapsed() >= Duration::from_millis(990));
    }

    #[test]
    fn test_slow_gateway_extrapolates() {
        let correlator = Arc::new(LatencyCorrelator::new("acc"));
        let gateway = ScriptedGateway::with_delay(Duration::from_millis(1200));
        let mut rw = window(5, correlator);

        let outcome = rw.run_window(&gateway);

        assert_eq!(outcome.sent, 1);
        assert!(outcome.elapsed >= Duration::from_millis(1200));
        assert!(outcome.achieved_rate < 1.0);
        let expected = 1000.0 / as_millis_f64(outcome.elapsed);
        assert!((outcome.achieved_rate - expected).abs() < 1e-9);
    }

    #[test]
    fn test_failed_submissions_do_not_count() {
        let correlator = Arc::new(LatencyCorrelator::new("acc"));
        let mut gateway = ScriptedGateway::instant();
        gateway.fail_every = Some(2);
        let mut rw = window(4, correlator.clone());

        let outcome = rw.run_window(&gateway);

        assert_eq!(outcome.sent, 4);
        assert_eq!(outcome.submit_errors, 3);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 7);
        // 失败的尝试已从correlator中移除
        assert_eq!(correlator.in_flight_len(), 4);
    }

    #[test]
    fn test_run_stops_on_token() {
        let correlator = Arc::new(LatencyCorrelator::new("acc"));
        let gateway = ScriptedGateway::instant();
        let stop = StopToken::new();
        let mut rw = window(2, correlator.clone());

        let mut outcomes = Vec::new();
        let windows = rw.run(&gateway, &stop, None, |outcome| {
            outcomes.push(outcome.sent);
            if outcomes.len() == 2 {
                stop.cancel();
            }
        });

        assert_eq!(windows, 2);
        assert_eq!(outcomes, vec![2, 2]);
        assert_eq!(rw.state(), WindowState::Stopped);

        for attempt in correlator.drain_in_flight() {
            assert!(attempt.order_id.is_some());
        }
    }

    #[test]
    fn test_run_honours_max_duration() {
        let correlator = Arc::new(LatencyCorrelator::new("acc"));
        let gateway = ScriptedGateway::instant();
        let stop = StopToken::new();
        let mut rw = window(1, correlator);

        let windows = rw.run(&gateway, &stop, Some(Duration::from_millis(1500)), |_| {});
        assert_eq!(windows, 2);
    }
}
