//! Robust seasonal-trend decomposition using loess.
//!
//! [`RobustStl`] configures `stlrs` with Cleveland's defaults for monthly
//! data: a 7-point seasonal smoother, two inner passes and fifteen robust
//! passes with bisquare weights.

use tracing::debug;

use crate::error::{ForecastError, Result};

/// Additive components: `values = trend + seasonal + remainder`.
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    pub trend: Vec<f64>,
    pub seasonal: Vec<f64>,
    pub remainder: Vec<f64>,
}

/// Decomposer contract consumed by the seasonal extractor.
pub trait SeasonalDecomposer: Send + Sync {
    fn decompose(&self, values: &[f64], period: usize) -> Result<Decomposition>;
}

#[derive(Debug, Clone)]
pub struct RobustStl {
    seasonal_window: usize,
    inner_iterations: usize,
    robust_iterations: usize,
}

impl RobustStl {
    pub fn new() -> Self {
        Self {
            seasonal_window: 7,
            inner_iterations: 2,
            robust_iterations: 15,
        }
    }

    /// Span of the cycle-subseries smoother, rounded up to an odd number ≥ 3.
    pub fn with_seasonal_window(mut self, window: usize) -> Self {
        let window = window.max(3);
        self.seasonal_window = if window % 2 == 0 { window + 1 } else { window };
        self
    }

    pub fn with_inner_iterations(mut self, iterations: usize) -> Self {
        self.inner_iterations = iterations.max(1);
        self
    }

    /// Zero disables the robustness loop.
    pub fn with_robust_iterations(mut self, iterations: usize) -> Self {
        self.robust_iterations = iterations;
        self
    }
}

impl Default for RobustStl {
    fn default() -> Self {
        Self::new()
    }
}

impl SeasonalDecomposer for RobustStl {
    fn decompose(&self, values: &[f64], period: usize) -> Result<Decomposition> {
        let n = values.len();
        if period < 2 || n < 2 * period {
            return Err(ForecastError::Decomposition {
                required: 2 * period.max(2),
                actual: n,
            });
        }

        let series: Vec<f32> = values.iter().map(|&v| v as f32).collect();
        let fitted = stlrs::params()
            .seasonal_length(self.seasonal_window)
            .inner_loops(self.inner_iterations)
            .outer_loops(self.robust_iterations)
            .robust(self.robust_iterations > 0)
            .fit(&series, period)
            .map_err(|e| ForecastError::InvalidParameter {
                name: "stl".to_string(),
                reason: e.to_string(),
            })?;

        let trend: Vec<f64> = fitted.trend().iter().map(|&v| f64::from(v)).collect();
        let seasonal: Vec<f64> = fitted.seasonal().iter().map(|&v| f64::from(v)).collect();
        // Recomputed in f64 so the components add back to the input exactly.
        let remainder: Vec<f64> = (0..n)
            .map(|i| values[i] - trend[i] - seasonal[i])
            .collect();

        debug!(
            observations = n,
            period,
            seasonal_window = self.seasonal_window,
            inner_iterations = self.inner_iterations,
            robust_iterations = self.robust_iterations,
            "stl decomposition complete"
        );

        Ok(Decomposition {
            trend,
            seasonal,
            remainder,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn seasonal_series(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + 0.5 * i as f64 + 10.0 * (2.0 * PI * i as f64 / 12.0).sin())
            .collect()
    }

    #[test]
    fn short_series_is_rejected() {
        let err = RobustStl::new().decompose(&seasonal_series(23), 12).unwrap_err();
        assert_eq!(err, ForecastError::Decomposition { required: 24, actual: 23 });
    }

    #[test]
    fn components_reconstruct_the_series() {
        let values = seasonal_series(48);
        let result = RobustStl::new().decompose(&values, 12).unwrap();
        for i in 0..values.len() {
            let rebuilt = result.trend[i] + result.seasonal[i] + result.remainder[i];
            assert!((rebuilt - values[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn recovers_seasonal_peak_and_trough() {
        let values = seasonal_series(120);
        let result = RobustStl::new().decompose(&values, 12).unwrap();
        for year in 1..9 {
            assert!(result.seasonal[year * 12 + 3] > 7.0);
            assert!(result.seasonal[year * 12 + 9] < -7.0);
        }
    }

    #[test]
    fn robust_fit_leaves_outlier_in_remainder() {
        let mut values = seasonal_series(96);
        values[40] += 100.0;
        let result = RobustStl::new().decompose(&values, 12).unwrap();
        assert!(result.remainder[40] > 70.0, "remainder {}", result.remainder[40]);
    }

    #[test]
    fn non_robust_fit_absorbs_more_of_the_outlier() {
        let mut values = seasonal_series(96);
        values[40] += 100.0;
        let robust = RobustStl::new().decompose(&values, 12).unwrap();
        let plain = RobustStl::new()
            .with_robust_iterations(0)
            .decompose(&values, 12)
            .unwrap();
        assert!(plain.remainder[40] < robust.remainder[40]);
    }

    #[test]
    fn even_seasonal_window_is_rounded_up() {
        let stl = RobustStl::new().with_seasonal_window(6);
        assert_eq!(stl.seasonal_window, 7);
        let values = seasonal_series(36);
        assert!(stl.decompose(&values, 12).is_ok());
    }
}
