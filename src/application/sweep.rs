/// Sweep driver
///
/// Runs one `TestCoordinator` run per (rate, account count) combination,
/// sequentially, appending every run's rows to the result file.

use super::coordinator::{CoordinatorConfig, TestCoordinator};
use super::error::LoadTestError;
use super::report::RunReport;
use crate::domain::{Account, CorrelationIdGenerator, Venue};
use crate::infrastructure::observability::{HealthChecker, HealthStatus};
use crate::infrastructure::report_writer::ReportWriter;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub accounts: Vec<String>,
    pub rates: Vec<u32>,

    /// Account counts to run; all of `1..=accounts.len()` when empty
    pub account_counts: Vec<usize>,
    pub persist_cap: Option<usize>,
    pub max_duration: Option<Duration>,
}

impl SweepConfig {
    pub fn validate(&self) -> Result<(), LoadTestError> {
        if self.accounts.is_empty() {
            return Err(LoadTestError::Config("account list is empty".to_string()));
        }
        if self.rates.is_empty() {
            return Err(LoadTestError::Config("rate list is empty".to_string()));
        }
        if self.rates.contains(&0) {
            return Err(LoadTestError::Config("rates must be positive".to_string()));
        }
        if let Some(bad) = self
            .account_counts
            .iter()
            .find(|n| **n == 0 || **n > self.accounts.len())
        {
            return Err(LoadTestError::Config(format!(
                "account count {} outside 1..={}",
                bad,
                self.accounts.len()
            )));
        }
        Ok(())
    }

    /// Account counts in run order
    pub fn counts(&self) -> Vec<usize> {
        if self.account_counts.is_empty() {
            (1..=self.accounts.len()).collect()
        } else {
            self.account_counts.clone()
        }
    }

    /// The first `count` accounts, each targeting `rate`
    pub fn accounts_for(&self, rate: u32, count: usize) -> Vec<Account> {
        self.accounts
            .iter()
            .take(count)
            .map(|id| {
                let mut account = Account::new(id.clone(), rate);
                account.persist_cap = self.persist_cap;
                account.max_duration = self.max_duration;
                account
            })
            .collect()
    }

    pub fn combinations(&self) -> usize {
        self.rates.len() * self.counts().len()
    }
}

pub struct Sweep<W: Write> {
    config: SweepConfig,
    coordinator: TestCoordinator,
    writer: ReportWriter<W>,
    health: Option<Arc<HealthChecker>>,
}

impl<W: Write> Sweep<W> {
    pub fn new(
        config: SweepConfig,
        venue: Arc<dyn Venue>,
        coordinator_config: CoordinatorConfig,
        ids: Arc<CorrelationIdGenerator>,
        writer: ReportWriter<W>,
    ) -> Result<Self, LoadTestError> {
        config.validate()?;
        Ok(Self {
            config,
            coordinator: TestCoordinator::new(venue, coordinator_config, ids),
            writer,
            health: None,
        })
    }

    pub fn with_health(mut self, health: Arc<HealthChecker>) -> Self {
        self.health = Some(health);
        self
    }

    /// Runs every combination; stops at the first run-level error
    ///
    /// A run-level error also marks the health checker unhealthy.
    pub fn run(&mut self) -> Result<Vec<RunReport>, LoadTestError> {
        let result = self.run_all();
        if result.is_err() {
            if let Some(health) = &self.health {
                health.set_status(HealthStatus::Unhealthy);
            }
        }
        result
    }

    fn run_all(&mut self) -> Result<Vec<RunReport>, LoadTestError> {
        let mut runs = Vec::with_capacity(self.config.combinations());

        for &rate in &self.config.rates {
            for count in self.config.counts() {
                if let Some(health) = &self.health {
                    health.run_started(rate, count);
                }

                let run = self.coordinator.run(count, self.config.accounts_for(rate, count))?;
                let rows = self.writer.write_run(&run)?;
                info!(
                    rate,
                    accounts = count,
                    rows,
                    orphans = run.total_orphans(),
                    "combination finished"
                );

                if let Some(health) = &self.health {
                    health.run_finished(&run);
                }
                runs.push(run);
            }
        }

        Ok(runs)
    }

    pub fn into_writer(self) -> ReportWriter<W> {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::worker::WorkerConfig;
    use crate::domain::{Credentials, OrderTemplate};
    use crate::infrastructure::simulated::{SimulatedVenue, VenueProfile};
    use std::io;

    /// Result sink that rejects every write
    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    fn config() -> SweepConfig {
        SweepConfig {
            accounts: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            rates: vec![10, 50],
            account_counts: Vec::new(),
            persist_cap: Some(5),
            max_duration: None,
        }
    }

    #[test]
    fn test_default_counts() {
        let config = config();
        assert_eq!(config.counts(), vec![1, 2, 3]);
        assert_eq!(config.combinations(), 6);
    }

    #[test]
    fn test_accounts_for_takes_prefix() {
        let accounts = config().accounts_for(50, 2);
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].id, "a");
        assert_eq!(accounts[1].id, "b");
        assert!(accounts.iter().all(|a| a.target_rate == 50 && a.persist_cap == Some(5)));
    }

    #[test]
    fn test_validation() {
        assert!(config().validate().is_ok());

        let mut empty = config();
        empty.accounts.clear();
        assert!(matches!(empty.validate(), Err(LoadTestError::Config(_))));

        let mut zero_rate = config();
        zero_rate.rates = vec![10, 0];
        assert!(matches!(zero_rate.validate(), Err(LoadTestError::Config(_))));

        let mut too_many = config();
        too_many.account_counts = vec![4];
        assert!(matches!(too_many.validate(), Err(LoadTestError::Config(_))));

        let mut no_rates = config();
        no_rates.rates.clear();
        assert!(no_rates.validate().is_err());
    }

    #[test]
    fn test_report_failure_marks_unhealthy() {
        let config = SweepConfig {
            accounts: vec!["a".to_string()],
            rates: vec![1],
            account_counts: Vec::new(),
            persist_cap: None,
            max_duration: None,
        };
        let coordinator_config = CoordinatorConfig {
            run_length: Duration::from_millis(50),
            credentials: Credentials {
                server: "sim".to_string(),
                password: String::new(),
            },
            template: OrderTemplate::default(),
            worker: WorkerConfig {
                report_grace: Duration::from_millis(50),
                ..Default::default()
            },
        };
        let health = Arc::new(HealthChecker::new("test"));
        let mut sweep = Sweep::new(
            config,
            Arc::new(SimulatedVenue::new(VenueProfile::default())),
            coordinator_config,
            Arc::new(CorrelationIdGenerator::new("SW")),
            ReportWriter::new(BrokenSink),
        )
        .unwrap()
        .with_health(health.clone());

        assert!(matches!(sweep.run(), Err(LoadTestError::Io(_))));
        assert_eq!(health.get_status(), HealthStatus::Unhealthy);
        assert!(!health.check_readiness());
    }
}
