//! Expands annual trend points into monthly projections.

use rayon::prelude::*;
use tracing::info;

use crate::models::{MonthlyForecast, MonthlyForecastPoint, SeasonalIndex, TrendForecast};

/// Stateless combiner of a [`TrendForecast`] with a [`SeasonalIndex`].
///
/// Each month is `annual_mean × (1 + index[month])`, an additive modulation
/// on top of the annual mean rather than a split of the annual total.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForecastComposer;

impl ForecastComposer {
    pub fn new() -> Self {
        Self
    }

    pub fn compose(&self, trend: &TrendForecast, index: &SeasonalIndex) -> MonthlyForecast {
        let rows: Vec<MonthlyForecastPoint> = trend
            .points()
            .par_iter()
            .flat_map_iter(|point| {
                (1..=12u32).filter_map(move |month| {
                    index.get(month).map(|multiplier| MonthlyForecastPoint {
                        year: point.year,
                        month,
                        key: point.key,
                        value: point.mean * (1.0 + multiplier),
                    })
                })
            })
            .collect();

        info!(rows = rows.len(), "monthly forecast composed");
        MonthlyForecast::from_rows(rows)
    }
}
