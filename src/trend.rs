//! Annual trend forecasting with a damped additive-trend model.
//!
//! The estimator sits behind [`TrendModel`]; [`DampedHolt`] is the default
//! ETS(A,Ad,N) implementation. [`TrendForecaster`] validates the series,
//! fans out one fit per visitor type and merges the results by year then key.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{ForecastError, Result};
use crate::models::{AnnualSeries, TrendForecast, TrendForecastPoint, VisitorType};

/// z-score of a two-sided 80% interval.
const Z_80: f64 = 1.2816;

/// Point forecast and 80% interval for `horizon` future periods.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelForecast {
    pub mean: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// Estimator contract: fit `values` (contiguous, oldest first) with trend
/// damping `phi` and forecast `horizon` periods ahead.
///
/// Forecast step `k` must not depend on `horizon`.
pub trait TrendModel: Send + Sync {
    fn fit_forecast(&self, values: &[f64], phi: f64, horizon: usize) -> Result<ModelForecast>;
}

/// Additive-error, damped additive-trend exponential smoothing.
///
/// Level and trend start at `y[0]` and `y[1] - y[0]`; alpha and beta are
/// picked from a fixed grid by one-step squared error.
#[derive(Debug, Clone)]
pub struct DampedHolt {
    grid: Vec<f64>,
}

impl DampedHolt {
    pub fn new() -> Self {
        Self {
            grid: (1..20).map(|i| i as f64 * 0.05).collect(),
        }
    }

    /// Restricts the parameter search to the given values in (0, 1).
    pub fn with_grid(grid: Vec<f64>) -> Result<Self> {
        if grid.is_empty() || grid.iter().any(|&v| !(0.0 < v && v < 1.0)) {
            return Err(ForecastError::InvalidParameter {
                name: "grid".to_string(),
                reason: "must be non-empty with values between 0 and 1 (exclusive)".to_string(),
            });
        }
        Ok(Self { grid })
    }
}

impl Default for DampedHolt {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
struct HoltState {
    alpha: f64,
    beta: f64,
    level: f64,
    trend: f64,
    sse: f64,
    steps: usize,
}

fn smooth(values: &[f64], alpha: f64, beta: f64, phi: f64) -> HoltState {
    let mut level = values[0];
    let mut trend = values[1] - values[0];
    let mut sse = 0.0;

    for &value in &values[1..] {
        let predicted = level + phi * trend;
        let error = value - predicted;
        sse += error * error;

        let prev_level = level;
        level = alpha * value + (1.0 - alpha) * predicted;
        trend = beta * (level - prev_level) + (1.0 - beta) * phi * trend;
    }

    HoltState {
        alpha,
        beta,
        level,
        trend,
        sse,
        steps: values.len() - 1,
    }
}

impl TrendModel for DampedHolt {
    fn fit_forecast(&self, values: &[f64], phi: f64, horizon: usize) -> Result<ModelForecast> {
        if values.len() < 2 {
            return Err(ForecastError::InvalidParameter {
                name: "values".to_string(),
                reason: "damped trend needs at least 2 observations".to_string(),
            });
        }

        let mut best: Option<HoltState> = None;
        for &alpha in &self.grid {
            for &beta in &self.grid {
                let state = smooth(values, alpha, beta, phi);
                if best.map_or(true, |b| state.sse < b.sse) {
                    best = Some(state);
                }
            }
        }
        let fit = best.ok_or_else(|| ForecastError::InvalidParameter {
            name: "grid".to_string(),
            reason: "no smoothing parameters to search".to_string(),
        })?;

        let sigma = (fit.sse / fit.steps as f64).sqrt();
        debug!(
            alpha = fit.alpha,
            beta = fit.beta,
            phi,
            sigma,
            observations = values.len(),
            "damped trend fitted"
        );

        let mut mean = Vec::with_capacity(horizon);
        let mut lower = Vec::with_capacity(horizon);
        let mut upper = Vec::with_capacity(horizon);

        // phi + phi^2 + ... + phi^h
        let mut damped_sum = 0.0;
        let mut phi_power = 1.0;
        // Σ_{j<h} c_j², with c_j = alpha * (1 + beta * (phi + ... + phi^j))
        let mut variance_factor = 1.0;
        for step in 1..=horizon {
            phi_power *= phi;
            if step > 1 {
                let c = fit.alpha * (1.0 + fit.beta * damped_sum);
                variance_factor += c * c;
            }
            damped_sum += phi_power;

            let point = fit.level + damped_sum * fit.trend;
            let half_width = Z_80 * sigma * variance_factor.sqrt();
            mean.push(point);
            lower.push(point - half_width);
            upper.push(point + half_width);
        }

        Ok(ModelForecast { mean, lower, upper })
    }
}

/// Fits one trend model per visitor type and forecasts `horizon` years.
pub struct TrendForecaster<M: TrendModel = DampedHolt> {
    model: M,
    phi: f64,
    horizon: usize,
}

impl TrendForecaster<DampedHolt> {
    pub fn new(phi: f64, horizon: usize) -> Result<Self> {
        Self::with_model(DampedHolt::new(), phi, horizon)
    }
}

impl<M: TrendModel> TrendForecaster<M> {
    pub fn with_model(model: M, phi: f64, horizon: usize) -> Result<Self> {
        if !(0.0 < phi && phi <= 1.0) {
            return Err(ForecastError::InvalidParameter {
                name: "phi".to_string(),
                reason: "must lie in (0, 1]".to_string(),
            });
        }
        if horizon == 0 || i32::try_from(horizon).is_err() {
            return Err(ForecastError::InvalidParameter {
                name: "horizon".to_string(),
                reason: format!("must be a positive number of years up to {}", i32::MAX),
            });
        }
        Ok(Self {
            model,
            phi,
            horizon,
        })
    }

    pub fn forecast(&self, series: &AnnualSeries) -> Result<TrendForecast> {
        let keys = series.keys();
        if keys.is_empty() {
            return Err(ForecastError::InvalidParameter {
                name: "annual_series".to_string(),
                reason: "no visitor types to forecast".to_string(),
            });
        }

        let per_key = keys
            .par_iter()
            .map(|&key| self.forecast_key(key, &series.for_key(key)))
            .collect::<Result<Vec<_>>>()?;

        let points: Vec<TrendForecastPoint> = per_key.into_iter().flatten().collect();
        info!(
            keys = keys.len(),
            horizon = self.horizon,
            phi = self.phi,
            "trend forecast complete"
        );
        Ok(TrendForecast::from_points(points))
    }

    fn forecast_key(&self, key: VisitorType, history: &[(i32, f64)]) -> Result<Vec<TrendForecastPoint>> {
        if history.len() < 2 {
            return Err(ForecastError::InsufficientData {
                key,
                required: 2,
                actual: history.len(),
            });
        }
        for pair in history.windows(2) {
            if pair[1].0 != pair[0].0 + 1 {
                return Err(ForecastError::SeriesGap {
                    series: format!("annual/{key}"),
                    detail: format!("missing years between {} and {}", pair[0].0, pair[1].0),
                });
            }
        }

        let values: Vec<f64> = history.iter().map(|(_, v)| *v).collect();
        let fitted = self.model.fit_forecast(&values, self.phi, self.horizon)?;
        let last_year = history[history.len() - 1].0;

        (0..self.horizon)
            .map(|step| -> Result<TrendForecastPoint> {
                let year = i32::try_from(step + 1)
                    .ok()
                    .and_then(|ahead| last_year.checked_add(ahead))
                    .ok_or_else(|| ForecastError::InvalidParameter {
                        name: "horizon".to_string(),
                        reason: format!("{} years past {last_year} is out of range", step + 1),
                    })?;
                Ok(TrendForecastPoint {
                    year,
                    key,
                    mean: fitted.mean[step],
                    lower80: fitted.lower[step],
                    upper80: fitted.upper[step],
                })
            })
            .collect()
    }
}
