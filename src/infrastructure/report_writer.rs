/// Delimited result file
///
/// Append-only: one row per completed attempt of every run, flushed after
/// each (rate, account-count) combination. The header is written once, when
/// the file is empty.

use crate::application::report::{AccountReport, RunReport, STAGE_LABELS};
use crate::domain::CompletedAttempt;
use crate::shared::StatAccumulator;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

pub const HEADER: [&str; 11] = [
    "TestNumber",
    "Account",
    "OPS_Req",
    "OPS_Mean",
    "OPS_Sd",
    "Order",
    "New",
    "Calculated1",
    "Filled",
    "Calculated2",
    "Total",
];

pub struct ReportWriter<W: Write> {
    out: csv::Writer<W>,
    rows: usize,
}

impl ReportWriter<File> {
    /// Opens `path` for appending, creating it if needed
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path.as_ref())?;
        let empty = file.metadata()?.len() == 0;

        let mut writer = Self::new(file);
        if empty {
            writer.write_header()?;
        }
        Ok(writer)
    }
}

impl<W: Write> ReportWriter<W> {
    pub fn new(out: W) -> Self {
        let out = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(out);
        Self { out, rows: 0 }
    }

    pub fn write_header(&mut self) -> io::Result<()> {
        self.out.write_record(HEADER)?;
        self.out.flush()
    }

    /// Writes every completed attempt of `run` and flushes
    pub fn write_run(&mut self, run: &RunReport) -> io::Result<usize> {
        let mut written = 0;
        for account in &run.accounts {
            for attempt in &account.completed {
                self.write_row(run, account, attempt)?;
                written += 1;
            }
        }
        self.out.flush()?;
        self.rows += written;
        Ok(written)
    }

    fn write_row(
        &mut self,
        run: &RunReport,
        account: &AccountReport,
        attempt: &CompletedAttempt,
    ) -> io::Result<()> {
        let mut fields = Vec::with_capacity(HEADER.len());
        fields.push(run.test_number.to_string());
        fields.push(account.account.clone());
        fields.push(run.requested_rate.to_string());
        fields.push(fmt_stat(&account.orders_per_sec, StatAccumulator::mean));
        fields.push(fmt_stat(&account.orders_per_sec, StatAccumulator::std_dev));
        fields.push(attempt.order_id.clone().unwrap_or_default());

        let mut stages = attempt.stage_millis();
        for _ in STAGE_LABELS {
            fields.push(stages.next().map(|ms| format!("{:.3}", ms)).unwrap_or_default());
        }
        fields.push(format!("{:.3}", attempt.total_millis()));

        self.out.write_record(&fields)?;
        Ok(())
    }

    /// Rows written since this writer was created
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flushes and returns the underlying writer
    pub fn into_inner(self) -> io::Result<W> {
        self.out.into_inner().map_err(|e| e.into_error())
    }
}

fn fmt_stat<F, E>(acc: &StatAccumulator, stat: F) -> String
where
    F: Fn(&StatAccumulator) -> Result<f64, E>,
{
    stat(acc).map(|v| format!("{:.2}", v)).unwrap_or_default()
}
