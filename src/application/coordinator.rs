/// Test Coordinator
///
/// Runs one load test: N account workers plus the coordinator itself meet
/// at a two-phase rendezvous.
///
/// ## Phases
/// 1. **go**: every worker has finished logging on (or failed to); the
///    coordinator's arrival releases all of them at the same instant
/// 2. **stop**: after the run length the coordinator fires the stop token and
///    waits again, returning only once every worker has closed its positions
///
/// Worker reports are collected only after phase 2 releases.

use super::context::RunContext;
use super::error::LoadTestError;
use super::report::{AccountReport, AccountStatus, RunReport};
use super::worker::{AccountWorker, WorkerConfig};
use crate::domain::{Account, CorrelationIdGenerator, Credentials, OrderTemplate, Venue};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// Coordinator settings shared by every run of a sweep
#[derive(Clone)]
pub struct CoordinatorConfig {
    /// Time between the "go" and "stop" rendezvous
    pub run_length: Duration,
    pub credentials: Credentials,
    pub template: OrderTemplate,
    pub worker: WorkerConfig,
}

pub struct TestCoordinator {
    venue: Arc<dyn Venue>,
    config: CoordinatorConfig,
    ids: Arc<CorrelationIdGenerator>,
}

impl TestCoordinator {
    pub fn new(
        venue: Arc<dyn Venue>,
        config: CoordinatorConfig,
        ids: Arc<CorrelationIdGenerator>,
    ) -> Self {
        Self { venue, config, ids }
    }

    /// Runs all `accounts` concurrently and returns their final snapshots
    pub fn run(&self, test_number: usize, accounts: Vec<Account>) -> Result<RunReport, LoadTestError> {
        let requested_rate = accounts.first().map(|a| a.target_rate).unwrap_or_default();
        let ctx = RunContext::new(accounts.len(), self.ids.clone());

        info!(
            test_number,
            accounts = accounts.len(),
            requested_rate,
            run_secs = self.config.run_length.as_secs_f64(),
            "starting run"
        );

        // 全部线程创建成功后才下发运行上下文；中途失败时工作线程不会进入集合点
        let (start_tx, start_rx) = crossbeam::channel::bounded(accounts.len());
        let mut handles = Vec::with_capacity(accounts.len());
        for (idx, account) in accounts.into_iter().enumerate() {
            let account_id = account.id.clone();
            let mut worker_config = self.config.worker.clone();
            if worker_config.core_id.is_some() {
                worker_config.core_id = Some(idx);
            }

            let worker = AccountWorker::new(
                account,
                self.config.credentials.clone(),
                self.config.template.clone(),
                self.venue.clone(),
                worker_config,
            );
            match worker.spawn(start_rx.clone()) {
                Ok(handle) => handles.push((account_id, handle)),
                Err(source) => {
                    drop(start_tx);
                    for (_, handle) in handles {
                        let _ = handle.join();
                    }
                    return Err(LoadTestError::Spawn {
                        account: account_id,
                        source,
                    });
                }
            }
        }
        drop(start_rx);
        for _ in 0..handles.len() {
            if start_tx.send(ctx.clone()).is_err() {
                break;
            }
        }

        // go
        ctx.barrier.wait();
        thread::sleep(self.config.run_length);
        ctx.stop.cancel();
        // stop
        ctx.barrier.wait();

        let mut reports = Vec::with_capacity(handles.len());
        for (account_id, handle) in handles {
            match handle.join() {
                Ok(report) => reports.push(report),
                Err(_) => {
                    error!(account = %account_id, "worker thread panicked");
                    let mut report = AccountReport::new(account_id, requested_rate);
                    report.status = AccountStatus::Failed("worker panicked".to_string());
                    reports.push(report);
                }
            }
        }

        let run = RunReport {
            test_number,
            requested_rate,
            accounts: reports,
        };

        for failed in run.failed_accounts() {
            warn!(account = %failed.account, status = ?failed.status, "account missing from results");
        }
        for account in &run.accounts {
            info!("\n{}", account.summary());
        }
        Ok(run)
    }
}
