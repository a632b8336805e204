/// Run results
///
/// `AccountReport` is assembled by a worker on its own thread and handed to
/// the coordinator only after the stop rendezvous; `RunReport` collects all
/// of them for one (rate, account-count) combination.

use crate::domain::{CompletedAttempt, OrderId};
use crate::shared::StatAccumulator;
use std::fmt::Write as _;
use std::time::{Duration, Instant};

/// Column labels of the four tracked lifecycle stages
pub const STAGE_LABELS: [&str; 4] = ["New", "Calculated1", "Filled", "Calculated2"];

/// Per-stage latency accumulators
///
/// Stages are indexed by arrival order. Each completed attempt is folded in
/// exactly once, one sample per stage it has.
#[derive(Debug, Clone, Default)]
pub struct LatencyStats {
    stages: Vec<StatAccumulator>,
    total: StatAccumulator,
}

impl LatencyStats {
    pub fn record(&mut self, attempt: &CompletedAttempt) {
        for (idx, ms) in attempt.stage_millis().enumerate() {
            if self.stages.len() <= idx {
                self.stages.resize_with(idx + 1, StatAccumulator::new);
            }
            self.stages[idx].add(ms);
        }
        self.total.add(attempt.total_millis());
    }

    pub fn stage(&self, idx: usize) -> Option<&StatAccumulator> {
        self.stages.get(idx)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn total(&self) -> &StatAccumulator {
        &self.total
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountStatus {
    Completed,
    /// Worker aborted before trading; the account is a gap in the report
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerCounters {
    pub windows: u32,
    pub submitted: u64,
    pub submit_errors: u64,
    pub close_errors: u64,
    pub orphans: u64,
    pub unknown_reports: u64,
}

/// Final snapshot of one account worker
#[derive(Debug, Clone)]
pub struct AccountReport {
    pub account: String,
    pub requested_rate: u32,
    pub status: AccountStatus,

    /// Instant the worker left the "go" rendezvous
    pub trading_started_at: Option<Instant>,
    pub orders_per_sec: StatAccumulator,
    pub latency: LatencyStats,
    pub completed: Vec<CompletedAttempt>,

    /// Positions still open after close-all
    pub open_positions: Vec<OrderId>,
    pub counters: WorkerCounters,
}

impl AccountReport {
    pub fn new(account: impl Into<String>, requested_rate: u32) -> Self {
        Self {
            account: account.into(),
            requested_rate,
            status: AccountStatus::Completed,
            trading_started_at: None,
            orders_per_sec: StatAccumulator::new(),
            latency: LatencyStats::default(),
            completed: Vec::new(),
            open_positions: Vec::new(),
            counters: WorkerCounters::default(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, AccountStatus::Failed(_))
    }

    pub fn record_completed(&mut self, attempts: Vec<CompletedAttempt>) {
        for attempt in &attempts {
            self.latency.record(attempt);
        }
        self.completed.extend(attempts);
    }

    /// Mean / SD summary table, one column per measured quantity
    pub fn summary(&self) -> String {
        let mut columns: Vec<(&str, &StatAccumulator)> = vec![("PerSec", &self.orders_per_sec)];
        for (idx, label) in STAGE_LABELS.iter().enumerate() {
            if let Some(stage) = self.latency.stage(idx) {
                columns.push((*label, stage));
            }
        }
        columns.push(("Total", self.latency.total()));

        let mut out = String::new();
        let _ = write!(out, "{:<12}", self.account);
        for (label, _) in &columns {
            let _ = write!(out, "  {:>11}", label);
        }
        for (row, pick) in [
            ("Mean", 0usize),
            ("SD", 1),
            ("Band-2SD", 2),
            ("Band+2SD", 3),
        ] {
            let _ = write!(out, "\n{:<12}", row);
            for (_, acc) in &columns {
                let value = match pick {
                    0 => acc.mean(),
                    1 => acc.std_dev(),
                    2 => acc.confidence_band().map(|b| b.0),
                    _ => acc.confidence_band().map(|b| b.1),
                };
                match value {
                    Ok(v) => {
                        let _ = write!(out, "  {:>11.2}", v);
                    }
                    Err(_) => {
                        let _ = write!(out, "  {:>11}", "-");
                    }
                }
            }
        }
        out
    }
}

/// Results of one coordinator run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Number of accounts in this run (1-based test number)
    pub test_number: usize,
    pub requested_rate: u32,
    pub accounts: Vec<AccountReport>,
}

impl RunReport {
    pub fn failed_accounts(&self) -> impl Iterator<Item = &AccountReport> {
        self.accounts.iter().filter(|a| a.is_failed())
    }

    pub fn total_orphans(&self) -> u64 {
        self.accounts.iter().map(|a| a.counters.orphans).sum()
    }

    pub fn total_completed(&self) -> usize {
        self.accounts.iter().map(|a| a.completed.len()).sum()
    }

    /// Spread between the earliest and latest trading start
    pub fn start_spread(&self) -> Option<Duration> {
        let starts: Vec<Instant> = self
            .accounts
            .iter()
            .filter_map(|a| a.trading_started_at)
            .collect();
        let first = starts.iter().min()?;
        let last = starts.iter().max()?;
        Some(last.duration_since(*first))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{StageKind, StageSample};

    fn completed(stages_ms: &[u64]) -> CompletedAttempt {
        CompletedAttempt {
            correlation_id: "C".to_string(),
            order_id: Some("O".to_string()),
            sent_unix_ms: 0,
            stages: stages_ms
                .iter()
                .map(|ms| StageSample {
                    kind: StageKind::New,
                    latency: Duration::from_millis(*ms),
                })
                .collect(),
        }
    }

    #[test]
    fn test_latency_stats_by_arrival_order() {
        let mut stats = LatencyStats::default();
        stats.record(&completed(&[2, 4, 6, 8]));
        stats.record(&completed(&[4]));

        assert_eq!(stats.stage_count(), 4);
        assert_eq!(stats.stage(0).unwrap().mean().unwrap(), 3.0);
        assert_eq!(stats.stage(1).unwrap().len(), 1);
        assert_eq!(stats.total().samples(), &[20.0, 4.0]);
    }

    #[test]
    fn test_summary_contains_columns() {
        let mut report = AccountReport::new("acc-1", 5);
        report.orders_per_sec.add(5.0).add(5.0);
        report.record_completed(vec![completed(&[1, 2, 3, 4])]);

        let summary = report.summary();
        assert!(summary.starts_with("acc-1"));
        for label in ["PerSec", "New", "Calculated1", "Filled", "Calculated2", "Total"] {
            assert!(summary.contains(label), "missing {}", label);
        }
        assert!(summary.contains("Mean"));
        assert!(summary.contains("10.00"));
    }

    #[test]
    fn test_summary_with_empty_accumulators() {
        let report = AccountReport::new("acc-2", 5);
        let summary = report.summary();
        assert!(summary.contains('-'));
    }

    #[test]
    fn test_start_spread() {
        let now = Instant::now();
        let mut a = AccountReport::new("a", 1);
        a.trading_started_at = Some(now);
        let mut b = AccountReport::new("b", 1);
        b.trading_started_at = Some(now + Duration::from_millis(3));
        let c = AccountReport::new("c", 1);

        let run = RunReport {
            test_number: 3,
            requested_rate: 1,
            accounts: vec![a, b, c],
        };
        assert_eq!(run.start_spread(), Some(Duration::from_millis(3)));
        assert_eq!(run.failed_accounts().count(), 0);
    }
}
