/// Per-run shared context
///
/// Everything the workers of one run share is constructed here and handed
/// to each worker explicitly: the rendezvous barrier, the stop token and
/// the correlation id generator. Nothing is process-global.

use crate::domain::CorrelationIdGenerator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};

/// Cancellation signal shared by the coordinator and all workers
///
/// Advisory: workers observe it only at window boundaries.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    cancelled: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Shared state of one coordinator run
#[derive(Clone)]
pub struct RunContext {
    /// Two-phase rendezvous ("go" then "stop"), sized workers + 1
    pub barrier: Arc<Barrier>,
    pub stop: StopToken,
    pub ids: Arc<CorrelationIdGenerator>,
}

impl RunContext {
    pub fn new(workers: usize, ids: Arc<CorrelationIdGenerator>) -> Self {
        Self {
            barrier: Arc::new(Barrier::new(workers + 1)),
            stop: StopToken::new(),
            ids,
        }
    }
}
