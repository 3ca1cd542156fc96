//! Visitor-nights to average daily visitors.

use rayon::prelude::*;
use tracing::info;

use crate::error::{ForecastError, Result};
use crate::models::{DailyVisitorEstimate, DailyVisitorSeries, MonthlyForecast, StayDuration};

/// Divides monthly nights by the average stay of each visitor type.
///
/// Assumes arrivals and departures spread evenly through the month; no
/// month-length or leap-year adjustment is made.
#[derive(Debug, Clone)]
pub struct StayDurationConverter {
    stay: StayDuration,
}

impl StayDurationConverter {
    pub fn new(stay: StayDuration) -> Self {
        Self { stay }
    }

    pub fn convert(&self, monthly: &MonthlyForecast) -> Result<DailyVisitorSeries> {
        // Every key needs a stay duration before any row is produced.
        for key in monthly.keys() {
            match self.stay.get(key) {
                Some(nights) if nights > 0.0 => {}
                Some(nights) => return Err(ForecastError::InvalidStayDuration { key, value: nights }),
                None => return Err(ForecastError::MissingStayDuration(key)),
            }
        }

        let rows = monthly
            .rows()
            .par_iter()
            .map(|row| -> Result<DailyVisitorEstimate> {
                let avg_stay = self
                    .stay
                    .get(row.key)
                    .ok_or(ForecastError::MissingStayDuration(row.key))?;
                Ok(DailyVisitorEstimate {
                    year: row.year,
                    month: row.month,
                    key: row.key,
                    monthly_nights: row.value,
                    avg_stay,
                    daily_visitors: row.value / avg_stay,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(rows = rows.len(), "daily visitor estimates computed");
        Ok(DailyVisitorSeries::from_rows(rows))
    }
}
