use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ForecastError, Result};

/// Visitor segment used as the key dimension of every series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VisitorType {
    Domestic,
    International,
}

impl VisitorType {
    pub const ALL: [VisitorType; 2] = [VisitorType::Domestic, VisitorType::International];

    pub fn as_str(&self) -> &'static str {
        match self {
            VisitorType::Domestic => "Domestic",
            VisitorType::International => "International",
        }
    }
}

impl fmt::Display for VisitorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisitorType {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "domestic" => Ok(VisitorType::Domestic),
            "international" => Ok(VisitorType::International),
            other => Err(ForecastError::InvalidParameter {
                name: "visitor_type".to_string(),
                reason: format!("unknown visitor type '{other}'"),
            }),
        }
    }
}

/// Calendar month of a specific year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(ForecastError::InvalidParameter {
                name: "month".to_string(),
                reason: format!("{month} is not a calendar month"),
            });
        }
        Ok(Self { year, month })
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ForecastError::InvalidParameter {
            name: "year_month".to_string(),
            reason: format!("expected YYYY-MM, got '{s}'"),
        };
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesPoint<P> {
    pub period: P,
    pub key: VisitorType,
    pub value: f64,
}

/// Yearly observations, one sub-series per visitor type.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnualSeries {
    points: Vec<TimeSeriesPoint<i32>>,
}

impl AnnualSeries {
    /// Orders points by key then year; a repeated (key, year) pair is rejected.
    pub fn new(mut points: Vec<TimeSeriesPoint<i32>>) -> Result<Self> {
        points.sort_by(|a, b| (a.key, a.period).cmp(&(b.key, b.period)));
        for pair in points.windows(2) {
            if pair[0].key == pair[1].key && pair[0].period == pair[1].period {
                return Err(ForecastError::SeriesGap {
                    series: format!("annual/{}", pair[0].key),
                    detail: format!("duplicate year {}", pair[0].period),
                });
            }
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[TimeSeriesPoint<i32>] {
        &self.points
    }

    pub fn keys(&self) -> Vec<VisitorType> {
        let mut keys: Vec<VisitorType> = self.points.iter().map(|p| p.key).collect();
        keys.dedup();
        keys
    }

    /// (year, value) pairs of one key in year order.
    pub fn for_key(&self, key: VisitorType) -> Vec<(i32, f64)> {
        self.points
            .iter()
            .filter(|p| p.key == key)
            .map(|p| (p.period, p.value))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonthlyObservation {
    pub period: YearMonth,
    pub value: f64,
}

/// Aggregate monthly series: strictly increasing, one value per month, no gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlySeries {
    points: Vec<MonthlyObservation>,
}

impl MonthlySeries {
    pub fn new(mut points: Vec<MonthlyObservation>) -> Result<Self> {
        points.sort_by(|a, b| a.period.cmp(&b.period));
        for pair in points.windows(2) {
            let (prev, next) = (pair[0].period, pair[1].period);
            if prev == next {
                return Err(ForecastError::SeriesGap {
                    series: "monthly".to_string(),
                    detail: format!("duplicate month {prev}"),
                });
            }
            if prev.next() != next {
                return Err(ForecastError::SeriesGap {
                    series: "monthly".to_string(),
                    detail: format!("missing months between {prev} and {next}"),
                });
            }
        }
        Ok(Self { points })
    }

    /// Drops every observation before `start`.
    pub fn since(&self, start: YearMonth) -> MonthlySeries {
        MonthlySeries {
            points: self
                .points
                .iter()
                .copied()
                .filter(|p| p.period >= start)
                .collect(),
        }
    }

    pub fn points(&self) -> &[MonthlyObservation] {
        &self.points
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Tolerance on the mean of a [`SeasonalIndex`].
pub const SEASONAL_MEAN_TOLERANCE: f64 = 1e-9;

/// Twelve calendar-month multipliers whose mean is 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeasonalIndex {
    multipliers: [f64; 12],
}

impl SeasonalIndex {
    /// Normalizes raw calendar-month means by dividing by their mean.
    pub fn normalize(raw: [f64; 12]) -> Result<Self> {
        if raw.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::DegenerateSeasonal(
                "non-finite monthly mean".to_string(),
            ));
        }
        let mean = raw.iter().sum::<f64>() / 12.0;
        if mean.abs() < f64::EPSILON {
            return Err(ForecastError::DegenerateSeasonal(
                "monthly means average to zero".to_string(),
            ));
        }
        let mut multipliers = raw;
        for value in multipliers.iter_mut() {
            *value /= mean;
        }
        Ok(Self { multipliers })
    }

    /// Accepts multipliers that already satisfy the mean-1.0 invariant.
    pub fn from_multipliers(multipliers: [f64; 12]) -> Result<Self> {
        let index = Self { multipliers };
        if multipliers.iter().any(|v| !v.is_finite())
            || (index.mean() - 1.0).abs() > SEASONAL_MEAN_TOLERANCE
        {
            return Err(ForecastError::InvalidParameter {
                name: "seasonal_index".to_string(),
                reason: format!("multipliers must average 1.0, got {}", index.mean()),
            });
        }
        Ok(index)
    }

    /// Multiplier for calendar month 1..=12; `None` outside that range.
    pub fn get(&self, month: u32) -> Option<f64> {
        let slot = usize::try_from(month.checked_sub(1)?).ok()?;
        self.multipliers.get(slot).copied()
    }

    pub fn values(&self) -> &[f64; 12] {
        &self.multipliers
    }

    pub fn mean(&self) -> f64 {
        self.multipliers.iter().sum::<f64>() / 12.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendForecastPoint {
    pub year: i32,
    pub key: VisitorType,
    pub mean: f64,
    pub lower80: f64,
    pub upper80: f64,
}

/// Immutable result of one fit+forecast call, ordered by year then key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendForecast {
    points: Vec<TrendForecastPoint>,
}

impl TrendForecast {
    pub(crate) fn from_points(mut points: Vec<TrendForecastPoint>) -> Self {
        points.sort_by(|a, b| (a.year, a.key).cmp(&(b.year, b.key)));
        Self { points }
    }

    pub fn points(&self) -> &[TrendForecastPoint] {
        &self.points
    }

    pub fn for_key(&self, key: VisitorType) -> Vec<&TrendForecastPoint> {
        self.points.iter().filter(|p| p.key == key).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyForecastPoint {
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Month")]
    pub month: u32,
    #[serde(rename = "VisitorType")]
    pub key: VisitorType,
    #[serde(rename = "Value")]
    pub value: f64,
}

/// Monthly visitor-night projections ordered by year, month, key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyForecast {
    rows: Vec<MonthlyForecastPoint>,
}

impl MonthlyForecast {
    pub(crate) fn from_rows(mut rows: Vec<MonthlyForecastPoint>) -> Self {
        rows.sort_by(|a, b| (a.year, a.month, a.key).cmp(&(b.year, b.month, b.key)));
        Self { rows }
    }

    pub fn rows(&self) -> &[MonthlyForecastPoint] {
        &self.rows
    }

    pub fn keys(&self) -> Vec<VisitorType> {
        let mut keys: Vec<VisitorType> = self.rows.iter().map(|r| r.key).collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

/// Average nights per visit for each visitor type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StayDuration {
    nights: BTreeMap<VisitorType, f64>,
}

impl StayDuration {
    pub fn new(nights: BTreeMap<VisitorType, f64>) -> Result<Self> {
        for (&key, &value) in &nights {
            if !value.is_finite() || value <= 0.0 {
                return Err(ForecastError::InvalidStayDuration { key, value });
            }
        }
        Ok(Self { nights })
    }

    pub fn get(&self, key: VisitorType) -> Option<f64> {
        self.nights.get(&key).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyVisitorEstimate {
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Month")]
    pub month: u32,
    #[serde(rename = "VisitorType")]
    pub key: VisitorType,
    #[serde(rename = "MonthlyNights")]
    pub monthly_nights: f64,
    #[serde(rename = "AvgStay")]
    pub avg_stay: f64,
    #[serde(rename = "DailyVisitors")]
    pub daily_visitors: f64,
}

/// Daily visitor counts for one period, summed or for a single key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregateDailyVisitors {
    pub year: i32,
    pub month: u32,
    pub daily_visitors: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyVisitorSeries {
    rows: Vec<DailyVisitorEstimate>,
}

impl DailyVisitorSeries {
    pub(crate) fn from_rows(mut rows: Vec<DailyVisitorEstimate>) -> Self {
        rows.sort_by(|a, b| (a.year, a.month, a.key).cmp(&(b.year, b.month, b.key)));
        Self { rows }
    }

    pub fn rows(&self) -> &[DailyVisitorEstimate] {
        &self.rows
    }

    /// Sums daily visitors across keys for each (year, month).
    pub fn total_by_month(&self) -> Vec<AggregateDailyVisitors> {
        let mut totals: BTreeMap<(i32, u32), f64> = BTreeMap::new();
        for row in &self.rows {
            *totals.entry((row.year, row.month)).or_insert(0.0) += row.daily_visitors;
        }
        totals
            .into_iter()
            .map(|((year, month), daily_visitors)| AggregateDailyVisitors {
                year,
                month,
                daily_visitors,
            })
            .collect()
    }

    pub fn for_key(&self, key: VisitorType) -> Vec<AggregateDailyVisitors> {
        self.rows
            .iter()
            .filter(|r| r.key == key)
            .map(|r| AggregateDailyVisitors {
                year: r.year,
                month: r.month,
                daily_visitors: r.daily_visitors,
            })
            .collect()
    }
}

/// Tolerance allowed on the sum of site ratios above 1.
pub const RATIO_SUM_TOLERANCE: f64 = 1e-9;

/// Frozen per-site share of catchment trips.
///
/// A site absent from the table has an unknown ratio, which is distinct
/// from an explicit ratio of zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteRatios {
    ratios: BTreeMap<String, f64>,
}

impl SiteRatios {
    pub fn new(ratios: BTreeMap<String, f64>) -> Result<Self> {
        for (site, &ratio) in &ratios {
            if !ratio.is_finite() || !(0.0..=1.0).contains(&ratio) {
                return Err(ForecastError::InvalidRatio {
                    site: site.clone(),
                    ratio,
                });
            }
        }
        let sum: f64 = ratios.values().sum();
        if sum > 1.0 + RATIO_SUM_TOLERANCE {
            return Err(ForecastError::RatioSumExceeded { sum });
        }
        Ok(Self { ratios })
    }

    pub fn ratio(&self, site: &str) -> Option<f64> {
        self.ratios.get(site).copied()
    }

    pub fn sites(&self) -> impl Iterator<Item = &str> {
        self.ratios.keys().map(String::as_str)
    }

    pub fn total(&self) -> f64 {
        self.ratios.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteForecast {
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Month")]
    pub month: u32,
    #[serde(rename = "SiteId")]
    pub site_id: String,
    #[serde(rename = "DailyVisitors")]
    pub daily_visitors: f64,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub phi: f64,
    pub horizon: i32,
    pub season_start: Option<String>,
    pub site_rows: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(year: i32, month: u32) -> YearMonth {
        YearMonth::new(year, month).unwrap()
    }

    #[test]
    fn visitor_type_parses_case_insensitively() {
        assert_eq!(" domestic ".parse::<VisitorType>().unwrap(), VisitorType::Domestic);
        assert_eq!("INTERNATIONAL".parse::<VisitorType>().unwrap(), VisitorType::International);
        assert!("day trip".parse::<VisitorType>().is_err());
    }

    #[test]
    fn year_month_rolls_over_december() {
        assert_eq!(month(2023, 12).next(), month(2024, 1));
        assert_eq!("2024-03".parse::<YearMonth>().unwrap(), month(2024, 3));
        assert!(YearMonth::new(2024, 13).is_err());
    }

    #[test]
    fn annual_series_rejects_duplicate_years() {
        let points = vec![
            TimeSeriesPoint { period: 2020, key: VisitorType::Domestic, value: 1.0 },
            TimeSeriesPoint { period: 2020, key: VisitorType::Domestic, value: 2.0 },
        ];
        assert!(matches!(
            AnnualSeries::new(points),
            Err(ForecastError::SeriesGap { .. })
        ));
    }

    #[test]
    fn annual_series_orders_by_key_then_year() {
        let points = vec![
            TimeSeriesPoint { period: 2021, key: VisitorType::International, value: 3.0 },
            TimeSeriesPoint { period: 2021, key: VisitorType::Domestic, value: 2.0 },
            TimeSeriesPoint { period: 2020, key: VisitorType::Domestic, value: 1.0 },
        ];
        let series = AnnualSeries::new(points).unwrap();
        assert_eq!(series.keys(), vec![VisitorType::Domestic, VisitorType::International]);
        assert_eq!(series.for_key(VisitorType::Domestic), vec![(2020, 1.0), (2021, 2.0)]);
    }

    #[test]
    fn monthly_series_rejects_gaps_and_duplicates() {
        let gap = vec![
            MonthlyObservation { period: month(2020, 1), value: 1.0 },
            MonthlyObservation { period: month(2020, 3), value: 1.0 },
        ];
        assert!(MonthlySeries::new(gap).is_err());

        let duplicate = vec![
            MonthlyObservation { period: month(2020, 1), value: 1.0 },
            MonthlyObservation { period: month(2020, 1), value: 2.0 },
        ];
        assert!(MonthlySeries::new(duplicate).is_err());
    }

    #[test]
    fn monthly_series_since_truncates_prefix() {
        let points = (1..=12)
            .map(|m| MonthlyObservation { period: month(2020, m), value: m as f64 })
            .collect();
        let series = MonthlySeries::new(points).unwrap();
        let tail = series.since(month(2020, 7));
        assert_eq!(tail.len(), 6);
        assert_eq!(tail.points()[0].value, 7.0);
    }

    #[test]
    fn seasonal_index_normalizes_to_unit_mean() {
        let raw = [2.0, 4.0, 6.0, 8.0, 2.0, 4.0, 6.0, 8.0, 2.0, 4.0, 6.0, 8.0];
        let index = SeasonalIndex::normalize(raw).unwrap();
        assert!((index.mean() - 1.0).abs() < 1e-9);
        assert!((index.get(1).unwrap() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn seasonal_index_lookup_is_bounded_to_calendar_months() {
        let mut raw = [1.0; 12];
        raw[0] = 0.5;
        raw[11] = 1.5;
        let index = SeasonalIndex::normalize(raw).unwrap();
        assert_eq!(index.get(1), Some(0.5));
        assert_eq!(index.get(12), Some(1.5));
        assert_eq!(index.get(0), None);
        assert_eq!(index.get(13), None);
    }

    #[test]
    fn seasonal_index_rejects_zero_mean() {
        let mut raw = [0.0; 12];
        raw[0] = 1.0;
        raw[1] = -1.0;
        assert!(matches!(
            SeasonalIndex::normalize(raw),
            Err(ForecastError::DegenerateSeasonal(_))
        ));
    }

    #[test]
    fn seasonal_index_from_multipliers_checks_mean() {
        assert!(SeasonalIndex::from_multipliers([1.0; 12]).is_ok());
        assert!(SeasonalIndex::from_multipliers([1.1; 12]).is_err());
    }

    #[test]
    fn stay_duration_rejects_non_positive_nights() {
        let nights = BTreeMap::from([(VisitorType::Domestic, 0.0)]);
        assert!(matches!(
            StayDuration::new(nights),
            Err(ForecastError::InvalidStayDuration { .. })
        ));
    }

    #[test]
    fn site_ratios_validate_range_and_sum() {
        let out_of_range = BTreeMap::from([("a".to_string(), 1.5)]);
        assert!(matches!(
            SiteRatios::new(out_of_range),
            Err(ForecastError::InvalidRatio { .. })
        ));

        let too_much = BTreeMap::from([("a".to_string(), 0.6), ("b".to_string(), 0.5)]);
        assert!(matches!(
            SiteRatios::new(too_much),
            Err(ForecastError::RatioSumExceeded { .. })
        ));

        let ok = BTreeMap::from([("a".to_string(), 0.6), ("b".to_string(), 0.0)]);
        let ratios = SiteRatios::new(ok).unwrap();
        assert_eq!(ratios.ratio("b"), Some(0.0));
        assert_eq!(ratios.ratio("c"), None);
    }

    #[test]
    fn daily_series_totals_across_keys() {
        let rows = vec![
            DailyVisitorEstimate {
                year: 2027,
                month: 1,
                key: VisitorType::International,
                monthly_nights: 200.0,
                avg_stay: 2.0,
                daily_visitors: 100.0,
            },
            DailyVisitorEstimate {
                year: 2027,
                month: 1,
                key: VisitorType::Domestic,
                monthly_nights: 400.0,
                avg_stay: 4.0,
                daily_visitors: 100.0,
            },
        ];
        let series = DailyVisitorSeries::from_rows(rows);
        assert_eq!(series.rows()[0].key, VisitorType::Domestic);
        let totals = series.total_by_month();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].daily_visitors, 200.0);
        assert_eq!(series.for_key(VisitorType::International).len(), 1);
    }
}
