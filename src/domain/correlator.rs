/// Latency Correlator
///
/// Maps a client correlation id to its in-flight `OrderAttempt`.
///
/// ## Access pattern
/// - The worker thread registers an attempt *before* calling the gateway,
///   so a report can never beat its registration
/// - The venue's callback thread appends stage samples via `on_report`
/// - Terminal attempts move to a completed buffer under the same lock; the
///   worker drains it between windows, keeping `StatAccumulator` single-threaded
///
/// One lock per account. Reports for ids that are not in flight (already
/// terminal, evicted, or never ours) are dropped.

use super::attempt::{AttemptStatus, CompletedAttempt, OrderAttempt, StageKind};
use super::error::CorrelatorError;
use super::ports::{ExecutionReport, ExecutionReportListener};
use crate::shared::metrics::METRICS;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Handle returned by `register`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptHandle {
    pub correlation_id: String,
    pub sent_at: Instant,
}

/// What `on_report` did with a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Stage sample appended, attempt still open
    Recorded,
    /// Terminal stage appended, attempt moved to the completed buffer
    Completed,
    /// No attempt in flight for this id
    Unknown,
}

#[derive(Default)]
struct Inner {
    in_flight: HashMap<String, OrderAttempt>,
    completed: Vec<CompletedAttempt>,
    unknown_reports: u64,
}

pub struct LatencyCorrelator {
    account: String,
    inner: Mutex<Inner>,
}

impl LatencyCorrelator {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Inserts a fresh attempt with `sent = now`
    pub fn register(&self, correlation_id: &str) -> Result<AttemptHandle, CorrelatorError> {
        let mut inner = self.inner.lock();
        if inner.in_flight.contains_key(correlation_id) {
            return Err(CorrelatorError::DuplicateId(correlation_id.to_string()));
        }

        let attempt = OrderAttempt::new(correlation_id);
        let handle = AttemptHandle {
            correlation_id: attempt.correlation_id.clone(),
            sent_at: attempt.sent_at,
        };
        inner.in_flight.insert(correlation_id.to_string(), attempt);
        Ok(handle)
    }

    /// Records one lifecycle event for `correlation_id`
    pub fn on_report(&self, correlation_id: &str, stage: StageKind, terminal: bool) -> ReportOutcome {
        self.on_report_at(correlation_id, stage, terminal, Instant::now())
    }

    fn on_report_at(
        &self,
        correlation_id: &str,
        stage: StageKind,
        terminal: bool,
        now: Instant,
    ) -> ReportOutcome {
        let mut inner = self.inner.lock();

        let recorded = inner.in_flight.get_mut(correlation_id).map(|attempt| {
            attempt.record_stage(stage, now);
            attempt.stages.last().map(|s| s.millis()).unwrap_or_default()
        });

        let latency_ms = match recorded {
            Some(ms) => ms,
            None => {
                inner.unknown_reports += 1;
                drop(inner);
                METRICS.unknown_reports.with_label_values(&[&self.account]).inc();
                debug!(account = %self.account, correlation_id, %stage, "report for unknown attempt dropped");
                return ReportOutcome::Unknown;
            }
        };

        let outcome = if terminal {
            if let Some(mut attempt) = inner.in_flight.remove(correlation_id) {
                attempt.status = AttemptStatus::Completed;
                inner.completed.push(attempt.into_completed());
            }
            ReportOutcome::Completed
        } else {
            ReportOutcome::Recorded
        };
        drop(inner);

        METRICS
            .stage_latency
            .with_label_values(&[stage.as_str()])
            .observe(latency_ms);
        outcome
    }

    /// Stores the gateway's order id on the attempt
    ///
    /// The terminal report may already have arrived, so the completed buffer
    /// is searched as well. Returns false when the attempt is gone.
    pub fn attach_order_id(&self, correlation_id: &str, order_id: &str) -> bool {
        let mut inner = self.inner.lock();
        if let Some(attempt) = inner.in_flight.get_mut(correlation_id) {
            attempt.order_id = Some(order_id.to_string());
            return true;
        }
        match inner
            .completed
            .iter_mut()
            .rev()
            .find(|c| c.correlation_id == correlation_id)
        {
            Some(completed) => {
                completed.order_id = Some(order_id.to_string());
                true
            }
            None => false,
        }
    }

    /// Explicit eviction
    pub fn remove(&self, correlation_id: &str) -> Option<OrderAttempt> {
        self.inner.lock().in_flight.remove(correlation_id)
    }

    /// Evicts an attempt whose submission failed
    ///
    /// Samples already recorded for it (a report racing the failure) are
    /// discarded along with it.
    pub fn evict_failed(&self, correlation_id: &str) -> Option<OrderAttempt> {
        let mut inner = self.inner.lock();
        let mut attempt = match inner.in_flight.remove(correlation_id) {
            Some(attempt) => attempt,
            None => {
                // 回报先于失败到达并已终结
                let pos = inner
                    .completed
                    .iter()
                    .rposition(|c| c.correlation_id == correlation_id)?;
                inner.completed.remove(pos);
                return None;
            }
        };
        attempt.status = AttemptStatus::Failed;
        Some(attempt)
    }

    /// Takes every terminal attempt recorded since the last drain
    pub fn drain_completed(&self) -> Vec<CompletedAttempt> {
        std::mem::take(&mut self.inner.lock().completed)
    }

    /// Evicts attempts older than `max_age`
    pub fn sweep_orphans(&self, max_age: Duration) -> Vec<OrderAttempt> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .in_flight
            .iter()
            .filter(|(_, attempt)| attempt.age(now) > max_age)
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .iter()
            .filter_map(|id| inner.in_flight.remove(id))
            .collect()
    }

    /// Evicts everything still in flight
    pub fn drain_in_flight(&self) -> Vec<OrderAttempt> {
        self.inner.lock().in_flight.drain().map(|(_, a)| a).collect()
    }

    pub fn in_flight_len(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    pub fn contains(&self, correlation_id: &str) -> bool {
        self.inner.lock().in_flight.contains_key(correlation_id)
    }

    /// Reports dropped because no attempt matched
    pub fn unknown_reports(&self) -> u64 {
        self.inner.lock().unknown_reports
    }
}

impl ExecutionReportListener for LatencyCorrelator {
    fn on_execution_report(&self, report: ExecutionReport) {
        self.on_report(&report.correlation_id, report.stage, report.terminal);
    }
}
