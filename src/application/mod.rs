/// Application Layer - Load Test Orchestration
///
/// Drives the domain model with real threads: one worker per account, a
/// coordinator per run and a sweep over all configured combinations. It
/// talks to venues only through the domain traits.
///
/// ## Modules
/// - `context`: Rendezvous barrier and stop token shared by a run
/// - `rate_window`: Per-account one-second control loop
/// - `positions`: Open position book and cap enforcement
/// - `worker`: Account worker lifecycle
/// - `coordinator`: One run of N workers
/// - `sweep`: Rate x account-count sweep
/// - `report`: Per-account and per-run results

pub mod context;
pub mod coordinator;
pub mod error;
pub mod positions;
pub mod rate_window;
pub mod report;
pub mod sweep;
pub mod worker;

// Re-export key types
pub use context::{RunContext, StopToken};
pub use coordinator::{CoordinatorConfig, TestCoordinator};
pub use error::LoadTestError;
pub use positions::{CloseSummary, PositionBook};
pub use rate_window::{RateWindow, WindowOutcome, WindowState};
pub use report::{AccountReport, AccountStatus, LatencyStats, RunReport, WorkerCounters};
pub use sweep::{Sweep, SweepConfig};
pub use worker::{AccountWorker, WorkerConfig, WorkerState};
