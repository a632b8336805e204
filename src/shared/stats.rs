//! Sample statistics
//!
//! `StatAccumulator` 收集延迟或吞吐量样本，输出均值、总体标准差以及固定的 ±2σ 区间。
//!
//! ## 空样本策略
//! 没有样本时 `mean` / `std_dev` / `confidence_band` 返回 `StatsError::EmptySample`，
//! 不会静默产生 NaN。

use std::fmt;
use thiserror::Error;

/// Statistics errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StatsError {
    /// No sample has been recorded yet
    #[error("no samples recorded")]
    EmptySample,
}

/// Rolling sample collector
///
/// Not synchronized: one owner mutates it, other threads only ever see clones.
#[derive(Debug, Clone, Default)]
pub struct StatAccumulator {
    samples: Vec<f64>,
}

impl StatAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sample
    pub fn add(&mut self, value: f64) -> &mut Self {
        self.samples.push(value);
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Arithmetic mean over all samples
    pub fn mean(&self) -> Result<f64, StatsError> {
        if self.samples.is_empty() {
            return Err(StatsError::EmptySample);
        }
        Ok(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    /// Population standard deviation (divisor = sample count)
    pub fn std_dev(&self) -> Result<f64, StatsError> {
        let mean = self.mean()?;
        let n = self.samples.len() as f64;
        let variance = self
            .samples
            .iter()
            .map(|v| (v - mean) * (v - mean) / n)
            .sum::<f64>();
        Ok(variance.sqrt())
    }

    /// Fixed `mean ± 2·stddev` band.
    ///
    /// This is not a statistically derived confidence interval; downstream
    /// reports key off this exact definition.
    pub fn confidence_band(&self) -> Result<(f64, f64), StatsError> {
        let mean = self.mean()?;
        let sd = self.std_dev()?;
        Ok((mean - 2.0 * sd, mean + 2.0 * sd))
    }

    /// Resets to empty
    pub fn clear(&mut self) -> &mut Self {
        self.samples.clear();
        self
    }
}

impl fmt::Display for StatAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.mean(), self.std_dev(), self.confidence_band()) {
            (Ok(mean), Ok(sd), Ok((low, high))) => write!(
                f,
                "Mean={:.1} SD={:.1} ConfInt={:.1}:{:.1} Length={}",
                mean,
                sd,
                low,
                high,
                self.samples.len()
            ),
            _ => write!(f, "Mean=- SD=- ConfInt=- Length=0"),
        }
    }
}
