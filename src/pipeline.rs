//! One synchronous forecast run across every stage.

use serde::Serialize;
use tracing::info;

use crate::compose::ForecastComposer;
use crate::error::Result;
use crate::models::{
    AnnualSeries, DailyVisitorSeries, MonthlyForecast, MonthlySeries, SeasonalIndex, SiteForecast,
    SiteRatios, StayDuration, TrendForecast, YearMonth,
};
use crate::seasonal::SeasonalExtractor;
use crate::sites::{RatioCoverageGap, SiteDisaggregator};
use crate::stay::StayDurationConverter;
use crate::trend::TrendForecaster;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    /// Trend damping in (0, 1].
    pub phi: f64,
    /// Forecast horizon in years.
    pub horizon: usize,
    /// First month of the representative seasonal window.
    pub season_start: Option<YearMonth>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            phi: 0.98,
            horizon: 10,
            season_start: None,
        }
    }
}

/// Materialized inputs for a run. Stay durations and ratios are read-only.
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    pub annual: AnnualSeries,
    pub monthly: MonthlySeries,
    pub stay: StayDuration,
    pub ratios: SiteRatios,
    /// Sites to report; `None` means every site with a ratio.
    pub sites: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub trend: TrendForecast,
    pub seasonal_index: SeasonalIndex,
    pub monthly: MonthlyForecast,
    pub daily: DailyVisitorSeries,
    pub sites: Vec<SiteForecast>,
    pub coverage_gap: RatioCoverageGap,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Runs every stage in order; the first failure aborts the run.
    pub fn run(&self, inputs: &PipelineInputs) -> Result<PipelineOutput> {
        let forecaster = TrendForecaster::new(self.config.phi, self.config.horizon)?;
        let seasonal_window = match self.config.season_start {
            Some(start) => inputs.monthly.since(start),
            None => inputs.monthly.clone(),
        };

        let (trend, seasonal_index) = rayon::join(
            || forecaster.forecast(&inputs.annual),
            || SeasonalExtractor::new().extract(&seasonal_window),
        );
        let trend = trend?;
        let seasonal_index = seasonal_index?;

        let monthly = ForecastComposer::new().compose(&trend, &seasonal_index);
        let daily = StayDurationConverter::new(inputs.stay.clone()).convert(&monthly)?;

        let disaggregator = SiteDisaggregator::new(inputs.ratios.clone());
        let totals = daily.total_by_month();
        let disaggregation = match &inputs.sites {
            Some(sites) => disaggregator.disaggregate_sites(&totals, sites),
            None => disaggregator.disaggregate(&totals),
        };

        info!(
            trend_points = trend.points().len(),
            monthly_rows = monthly.rows().len(),
            site_rows = disaggregation.forecasts.len(),
            "forecast run complete"
        );

        Ok(PipelineOutput {
            trend,
            seasonal_index,
            monthly,
            daily,
            sites: disaggregation.forecasts,
            coverage_gap: disaggregation.coverage_gap,
        })
    }
}
