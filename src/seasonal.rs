//! Monthly seasonal index extraction.

use tracing::info;

use crate::error::{ForecastError, Result};
use crate::models::{MonthlySeries, SeasonalIndex};
use crate::stl::{RobustStl, SeasonalDecomposer};

const MONTHS: usize = 12;

/// Minimum window: two full annual cycles.
pub const MIN_MONTHS: usize = 2 * MONTHS;

/// Derives a [`SeasonalIndex`] from a monthly series.
///
/// Callers truncate the series to its representative window (for example
/// with [`MonthlySeries::since`]) before extraction.
pub struct SeasonalExtractor<D: SeasonalDecomposer = RobustStl> {
    decomposer: D,
}

impl SeasonalExtractor<RobustStl> {
    pub fn new() -> Self {
        Self::with_decomposer(RobustStl::new())
    }
}

impl Default for SeasonalExtractor<RobustStl> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: SeasonalDecomposer> SeasonalExtractor<D> {
    pub fn with_decomposer(decomposer: D) -> Self {
        Self { decomposer }
    }

    /// Decomposes the series, averages the seasonal factor `1 + seasonal/trend`
    /// per calendar month across all years, then divides by the mean of the
    /// twelve averages.
    pub fn extract(&self, series: &MonthlySeries) -> Result<SeasonalIndex> {
        if series.len() < MIN_MONTHS {
            return Err(ForecastError::Decomposition {
                required: MIN_MONTHS,
                actual: series.len(),
            });
        }

        let decomposition = self.decomposer.decompose(&series.values(), MONTHS)?;

        let mut sums = [0.0; MONTHS];
        let mut counts = [0usize; MONTHS];
        for (i, point) in series.points().iter().enumerate() {
            let trend = decomposition.trend[i];
            if !(trend > 0.0) {
                return Err(ForecastError::DegenerateSeasonal(format!(
                    "non-positive trend {trend} at {}",
                    point.period
                )));
            }
            let slot = point.period.month as usize - 1;
            sums[slot] += 1.0 + decomposition.seasonal[i] / trend;
            counts[slot] += 1;
        }

        let mut monthly_means = [0.0; MONTHS];
        for slot in 0..MONTHS {
            monthly_means[slot] = sums[slot] / counts[slot] as f64;
        }

        let index = SeasonalIndex::normalize(monthly_means)?;
        info!(
            months = series.len(),
            start = %series.points()[0].period,
            "seasonal index extracted"
        );
        Ok(index)
    }
}
