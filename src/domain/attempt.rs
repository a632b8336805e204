/// Order attempts and their lifecycle samples
///
/// An `OrderAttempt` lives in the correlator from registration until its
/// terminal execution report (or eviction). Stage samples are the time
/// between consecutive lifecycle events, the first one measured from the
/// submission instant.

use crate::shared::timestamp::{as_millis_f64, unix_millis};
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lifecycle event kinds carried by execution reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Accepted by the server
    New,
    /// Pending / margin calculated
    Calculated,
    Filled,
    /// Position recalculated after fill
    FinalCalculated,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::New => "new",
            StageKind::Calculated => "calculated",
            StageKind::Filled => "filled",
            StageKind::FinalCalculated => "final_calculated",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    Open,
    Completed,
    Failed,
}

/// One stage-latency sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageSample {
    pub kind: StageKind,
    pub latency: Duration,
}

impl StageSample {
    pub fn millis(&self) -> f64 {
        as_millis_f64(self.latency)
    }
}

/// 大多数订单恰好四个阶段
pub type StageSamples = SmallVec<[StageSample; 4]>;

/// An in-flight order
#[derive(Debug, Clone)]
pub struct OrderAttempt {
    pub correlation_id: String,
    pub order_id: Option<String>,
    pub sent_at: Instant,

    /// Wall-clock submission time (Unix ms), for reports
    pub sent_unix_ms: u64,
    pub last_stage_at: Instant,
    pub stages: StageSamples,
    pub status: AttemptStatus,
}

impl OrderAttempt {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            correlation_id: correlation_id.into(),
            order_id: None,
            sent_at: now,
            sent_unix_ms: unix_millis(),
            last_stage_at: now,
            stages: SmallVec::new(),
            status: AttemptStatus::Open,
        }
    }

    /// Appends `now - last_stage_at` and advances the stage clock
    pub fn record_stage(&mut self, kind: StageKind, now: Instant) {
        let latency = now.saturating_duration_since(self.last_stage_at);
        self.stages.push(StageSample { kind, latency });
        self.last_stage_at = now;
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.sent_at)
    }

    pub fn into_completed(self) -> CompletedAttempt {
        CompletedAttempt {
            correlation_id: self.correlation_id,
            order_id: self.order_id,
            sent_unix_ms: self.sent_unix_ms,
            stages: self.stages,
        }
    }
}

/// A terminal attempt whose samples are ready for aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedAttempt {
    pub correlation_id: String,
    pub order_id: Option<String>,
    pub sent_unix_ms: u64,
    pub stages: StageSamples,
}

impl CompletedAttempt {
    pub fn stage_millis(&self) -> impl Iterator<Item = f64> + '_ {
        self.stages.iter().map(StageSample::millis)
    }

    /// Sum of all stage latencies
    pub fn total_millis(&self) -> f64 {
        self.stage_millis().fold(0.0, |total, ms| total + ms)
    }
}

/// Run-scoped correlation id source
///
/// One generator is shared by every worker, so ids never collide across
/// accounts, windows or sweep combinations.
#[derive(Debug)]
pub struct CorrelationIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl CorrelationIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> String {
        let seq = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:08X}", self.prefix, seq)
    }
}

impl Default for CorrelationIdGenerator {
    fn default() -> Self {
        Self::new("TP")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_record_stage_measures_from_previous() {
        let mut attempt = OrderAttempt::new("A-1");
        let t0 = attempt.sent_at;

        attempt.record_stage(StageKind::New, t0 + Duration::from_millis(5));
        attempt.record_stage(StageKind::Filled, t0 + Duration::from_millis(12));

        assert_eq!(attempt.stages.len(), 2);
        assert_eq!(attempt.stages[0].latency, Duration::from_millis(5));
        assert_eq!(attempt.stages[1].latency, Duration::from_millis(7));
        assert_eq!(attempt.stages[1].kind, StageKind::Filled);
    }

    #[test]
    fn test_completed_total() {
        let mut attempt = OrderAttempt::new("A-2");
        let t0 = attempt.sent_at;
        attempt.record_stage(StageKind::New, t0 + Duration::from_millis(2));
        attempt.record_stage(StageKind::FinalCalculated, t0 + Duration::from_millis(6));

        let completed = attempt.into_completed();
        assert_eq!(completed.total_millis(), 6.0);
        assert_eq!(completed.stage_millis().collect::<Vec<_>>(), vec![2.0, 4.0]);
    }

    #[test]
    fn test_empty_total_is_positive_zero() {
        let completed = OrderAttempt::new("A-3").into_completed();
        assert!(completed.total_millis().is_sign_positive());
        assert_eq!(format!("{:.3}", completed.total_millis()), "0.000");
    }

    #[test]
    fn test_id_generator_unique_across_threads() {
        let generator = Arc::new(CorrelationIdGenerator::new("T"));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = generator.clone();
                thread::spawn(move || (0..1000).map(|_| generator.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(id.starts_with("T-"));
                assert!(seen.insert(id), "correlation id reused");
            }
        }
        assert_eq!(seen.len(), 4000);
    }
}
