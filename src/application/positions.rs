/// Open position bookkeeping
///
/// Every accepted order opens a position on the venue. The worker keeps at
/// most `persist_cap` of them between windows and closes the rest at stop.
/// A failed close never aborts the sweep; the position stays in the book
/// and is retried at the next window boundary.

use crate::domain::{OrderGateway, OrderId};
use crate::shared::metrics::METRICS;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Outcome of a close sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseSummary {
    pub closed: usize,
    pub failed: usize,
}

/// Open position ids, oldest first
///
/// Owned and mutated by the worker thread only.
#[derive(Debug, Default)]
pub struct PositionBook {
    account: String,
    open: VecDeque<OrderId>,
}

impl PositionBook {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            open: VecDeque::new(),
        }
    }

    pub fn extend<I: IntoIterator<Item = OrderId>>(&mut self, ids: I) {
        self.open.extend(ids);
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &OrderId> {
        self.open.iter()
    }

    /// Closes oldest positions until at most `cap` remain
    ///
    /// Positions whose close fails are skipped and the next oldest is tried,
    /// so the cap holds whenever enough closes succeed.
    pub fn enforce_cap<G: OrderGateway + ?Sized>(&mut self, gateway: &G, cap: usize) -> CloseSummary {
        let mut summary = CloseSummary::default();
        if self.open.len() <= cap {
            return summary;
        }

        let mut kept = VecDeque::with_capacity(self.open.len());
        while let Some(id) = self.open.pop_front() {
            if kept.len() + self.open.len() < cap {
                kept.push_back(id);
                continue;
            }
            match gateway.close_position(&id) {
                Ok(()) => {
                    debug!(account = %self.account, order_id = %id, "closed position");
                    summary.closed += 1;
                }
                Err(e) => {
                    self.record_close_failure(&e.to_string());
                    summary.failed += 1;
                    kept.push_back(id);
                }
            }
        }
        self.open = kept;
        summary
    }

    /// Best-effort close of every open position
    pub fn close_all<G: OrderGateway + ?Sized>(&mut self, gateway: &G) -> CloseSummary {
        let mut summary = CloseSummary::default();
        let mut still_open = VecDeque::new();

        for id in std::mem::take(&mut self.open) {
            match gateway.close_position(&id) {
                Ok(()) => summary.closed += 1,
                Err(e) => {
                    summary.failed += 1;
                    still_open.push_back(id);
                    self.record_close_failure(&e.to_string());
                }
            }
        }
        self.open = still_open;

        if summary.failed > 0 {
            warn!(
                account = %self.account,
                closed = summary.closed,
                failed = summary.failed,
                "close-all left positions open"
            );
        }
        summary
    }

    fn record_close_failure(&self, reason: &str) {
        METRICS
            .close_errors
            .with_label_values(&[&self.account])
            .inc();
        warn!(account = %self.account, "{}", reason);
    }
}
