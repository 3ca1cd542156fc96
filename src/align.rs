//! Normalizes raw tables into keyed, period-indexed series.
//!
//! Tables arrive untyped (headers plus string cells) with arbitrary column
//! order. Everything here is a pure function of its inputs: columns are
//! located by name, cells are coerced to the declared type, wide layouts are
//! melted to long `(period, key, value)` triples, and region/metric filters
//! that match nothing fail instead of yielding an empty series.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use tracing::debug;

use crate::error::{ForecastError, Result};
use crate::models::{
    AnnualSeries, MonthlyObservation, MonthlySeries, SiteRatios, StayDuration, TimeSeriesPoint,
    VisitorType, YearMonth,
};

pub mod columns {
    pub const YEAR: &str = "Year";
    pub const VISITOR_TYPE: &str = "VisitorType";
    pub const NIGHTS: &str = "Nights";
    pub const MONTH: &str = "Month";
    pub const OCCUPANCY_RATE: &str = "OccupancyRate";
    pub const REGION: &str = "Region";
    pub const METRIC: &str = "Metric";
    pub const AVG_STAY_NIGHTS: &str = "AvgStayNights";
    pub const SITE_ID: &str = "SiteId";
    pub const RATIO: &str = "Ratio";
}

/// Untyped tabular input as handed over by a loader.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    name: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            headers,
            rows,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column, matched case-insensitively after trimming.
    pub fn column(&self, column: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(column.trim()))
            .ok_or_else(|| ForecastError::MissingColumn {
                table: self.name.clone(),
                column: column.to_string(),
            })
    }

    fn cell(&self, row: usize, column: usize) -> &str {
        self.rows[row]
            .get(column)
            .map(|c| c.trim())
            .unwrap_or("")
    }

    fn coercion_error(&self, column: usize, row: usize, value: &str) -> ForecastError {
        ForecastError::Coercion {
            table: self.name.clone(),
            column: self.headers[column].clone(),
            row,
            value: value.to_string(),
        }
    }

    fn number(&self, row: usize, column: usize) -> Result<f64> {
        let raw = self.cell(row, column);
        parse_number(raw).ok_or_else(|| self.coercion_error(column, row, raw))
    }

    fn year(&self, row: usize, column: usize) -> Result<i32> {
        let raw = self.cell(row, column);
        parse_year(raw).ok_or_else(|| self.coercion_error(column, row, raw))
    }

    fn visitor_type(&self, row: usize, column: usize) -> Result<VisitorType> {
        let raw = self.cell(row, column);
        raw.parse()
            .map_err(|_| self.coercion_error(column, row, raw))
    }
}

/// Parses a number, allowing commas only as 3-digit thousands separators.
fn parse_number(raw: &str) -> Option<f64> {
    let cleaned = if raw.contains(',') {
        strip_thousands(raw)?
    } else {
        raw.to_string()
    };
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn strip_thousands(raw: &str) -> Option<String> {
    let (integer, fraction) = match raw.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (raw, None),
    };
    if fraction.is_some_and(|f| f.contains(',')) {
        return None;
    }
    let digits = integer.strip_prefix(['-', '+']).unwrap_or(integer);
    let mut groups = digits.split(',');
    let lead = groups.next()?;
    if lead.is_empty() || lead.len() > 3 || !lead.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !groups.all(|g| g.len() == 3 && g.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }
    Some(raw.replace(',', ""))
}

fn parse_year(raw: &str) -> Option<i32> {
    raw.parse::<i32>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.fract() == 0.0 && v.abs() < i32::MAX as f64)
            .map(|v| v as i32)
    })
}

/// Accepts `YYYY-MM-DD`, `DD/MM/YYYY`, `YYYY-MM` and `YYYY Mon`.
pub fn parse_month(raw: &str) -> Option<YearMonth> {
    let raw = raw.trim();
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .or_else(|_| NaiveDate::parse_from_str(&format!("{raw} 1"), "%Y %b %d"));
    match date {
        Ok(date) => YearMonth::new(date.year(), date.month()).ok(),
        Err(_) => raw.parse::<YearMonth>().ok(),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SeriesAligner;

impl SeriesAligner {
    pub fn new() -> Self {
        Self
    }

    /// Long layout: one row per (year, visitor type).
    pub fn annual_long(
        &self,
        table: &RawTable,
        year_column: &str,
        key_column: &str,
        value_column: &str,
    ) -> Result<AnnualSeries> {
        let year_idx = table.column(year_column)?;
        let key_idx = table.column(key_column)?;
        let value_idx = table.column(value_column)?;

        let mut points = Vec::with_capacity(table.len());
        for row in 0..table.len() {
            points.push(TimeSeriesPoint {
                period: table.year(row, year_idx)?,
                key: table.visitor_type(row, key_idx)?,
                value: table.number(row, value_idx)?,
            });
        }

        debug!(table = table.name(), points = points.len(), "aligned long annual table");
        AnnualSeries::new(points)
    }

    /// Wide layout: one year column plus one value column per visitor type.
    pub fn annual_wide(
        &self,
        table: &RawTable,
        year_column: &str,
        key_columns: &[(VisitorType, &str)],
    ) -> Result<AnnualSeries> {
        let year_idx = table.column(year_column)?;
        let key_indices = key_columns
            .iter()
            .map(|(key, column)| table.column(column).map(|idx| (*key, idx)))
            .collect::<Result<Vec<_>>>()?;

        let mut points = Vec::with_capacity(table.len() * key_indices.len());
        for row in 0..table.len() {
            let year = table.year(row, year_idx)?;
            for &(key, idx) in &key_indices {
                points.push(TimeSeriesPoint {
                    period: year,
                    key,
                    value: table.number(row, idx)?,
                });
            }
        }

        debug!(table = table.name(), points = points.len(), "melted wide annual table");
        AnnualSeries::new(points)
    }

    /// Keeps rows whose columns equal every `(column, value)` criterion.
    pub fn filter(&self, table: &RawTable, criteria: &[(&str, &str)]) -> Result<RawTable> {
        let indices = criteria
            .iter()
            .map(|(column, value)| table.column(column).map(|idx| (idx, *value)))
            .collect::<Result<Vec<_>>>()?;

        let rows: Vec<Vec<String>> = (0..table.len())
            .filter(|&row| {
                indices
                    .iter()
                    .all(|(idx, value)| table.cell(row, *idx).eq_ignore_ascii_case(value.trim()))
            })
            .map(|row| table.rows[row].clone())
            .collect();

        if rows.is_empty() {
            let filter = criteria
                .iter()
                .map(|(column, value)| format!("{column}={value}"))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ForecastError::FilterMatch {
                filter: format!("{} [{filter}]", table.name()),
            });
        }

        Ok(RawTable::new(table.name.clone(), table.headers.clone(), rows))
    }

    /// Region/metric table with one column per year, melted for a single key.
    /// Blank year cells are skipped.
    pub fn regional_annual(
        &self,
        table: &RawTable,
        region: &str,
        metric: &str,
        key: VisitorType,
    ) -> Result<AnnualSeries> {
        let filtered = self.filter(
            table,
            &[(columns::REGION, region), (columns::METRIC, metric)],
        )?;

        let year_columns: Vec<(usize, i32)> = filtered
            .headers()
            .iter()
            .enumerate()
            .filter_map(|(idx, header)| {
                let header = header.trim();
                (header.len() == 4)
                    .then(|| header.parse::<i32>().ok())
                    .flatten()
                    .map(|year| (idx, year))
            })
            .collect();

        if year_columns.is_empty() {
            return Err(ForecastError::MissingColumn {
                table: filtered.name().to_string(),
                column: "<year>".to_string(),
            });
        }

        let mut points = Vec::new();
        for row in 0..filtered.len() {
            for &(idx, year) in &year_columns {
                if filtered.cell(row, idx).is_empty() {
                    continue;
                }
                points.push(TimeSeriesPoint {
                    period: year,
                    key,
                    value: filtered.number(row, idx)?,
                });
            }
        }

        debug!(region, metric, %key, points = points.len(), "melted regional table");
        AnnualSeries::new(points)
    }

    pub fn monthly(
        &self,
        table: &RawTable,
        month_column: &str,
        value_column: &str,
    ) -> Result<MonthlySeries> {
        let month_idx = table.column(month_column)?;
        let value_idx = table.column(value_column)?;

        let mut points = Vec::with_capacity(table.len());
        for row in 0..table.len() {
            let raw = table.cell(row, month_idx);
            let period =
                parse_month(raw).ok_or_else(|| table.coercion_error(month_idx, row, raw))?;
            points.push(MonthlyObservation {
                period,
                value: table.number(row, value_idx)?,
            });
        }

        debug!(table = table.name(), points = points.len(), "aligned monthly table");
        MonthlySeries::new(points)
    }

    /// One average-stay value per visitor type for the region/metric.
    pub fn stay_durations(&self, table: &RawTable, region: &str, metric: &str) -> Result<StayDuration> {
        let filtered = self.filter(
            table,
            &[(columns::REGION, region), (columns::METRIC, metric)],
        )?;
        let key_idx = filtered.column(columns::VISITOR_TYPE)?;
        let stay_idx = filtered.column(columns::AVG_STAY_NIGHTS)?;

        let mut nights = BTreeMap::new();
        for row in 0..filtered.len() {
            let key = filtered.visitor_type(row, key_idx)?;
            let value = filtered.number(row, stay_idx)?;
            if nights.insert(key, value).is_some() {
                return Err(ForecastError::InvalidParameter {
                    name: "stay_duration".to_string(),
                    reason: format!("{key} listed more than once for {region}/{metric}"),
                });
            }
        }

        StayDuration::new(nights)
    }

    pub fn site_ratios(&self, table: &RawTable) -> Result<SiteRatios> {
        let site_idx = table.column(columns::SITE_ID)?;
        let ratio_idx = table.column(columns::RATIO)?;

        let mut ratios = BTreeMap::new();
        for row in 0..table.len() {
            let site = table.cell(row, site_idx).to_string();
            if site.is_empty() {
                return Err(table.coercion_error(site_idx, row, ""));
            }
            let ratio = table.number(row, ratio_idx)?;
            if ratios.insert(site.clone(), ratio).is_some() {
                return Err(ForecastError::InvalidParameter {
                    name: "site_ratio".to_string(),
                    reason: format!("site '{site}' listed more than once"),
                });
            }
        }

        SiteRatios::new(ratios)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            name,
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn long_annual_table_is_keyed_and_ordered() {
        let raw = table(
            "annual",
            &["nights", "VisitorType", " YEAR "],
            &[
                &["1,100", "Domestic", "2026"],
                &["500", "International", "2025"],
                &["1000", "Domestic", "2025"],
            ],
        );
        let series = SeriesAligner::new()
            .annual_long(&raw, columns::YEAR, columns::VISITOR_TYPE, columns::NIGHTS)
            .unwrap();
        assert_eq!(
            series.for_key(VisitorType::Domestic),
            vec![(2025, 1000.0), (2026, 1100.0)]
        );
        assert_eq!(series.for_key(VisitorType::International), vec![(2025, 500.0)]);
    }

    #[test]
    fn wide_annual_table_is_melted() {
        let raw = table(
            "annual",
            &["Year", "Dom", "Intl"],
            &[&["2024", "10", "1"], &["2025", "12", "2"]],
        );
        let series = SeriesAligner::new()
            .annual_wide(
                &raw,
                "Year",
                &[(VisitorType::Domestic, "Dom"), (VisitorType::International, "Intl")],
            )
            .unwrap();
        assert_eq!(series.points().len(), 4);
        assert_eq!(series.for_key(VisitorType::International), vec![(2024, 1.0), (2025, 2.0)]);
    }

    #[test]
    fn coercion_failure_reports_cell() {
        let raw = table("annual", &["Year", "VisitorType", "Nights"], &[&["2025", "Domestic", "n/a"]]);
        let err = SeriesAligner::new()
            .annual_long(&raw, "Year", "VisitorType", "Nights")
            .unwrap_err();
        assert_eq!(
            err,
            ForecastError::Coercion {
                table: "annual".to_string(),
                column: "Nights".to_string(),
                row: 0,
                value: "n/a".to_string(),
            }
        );
    }

    #[test]
    fn commas_are_only_thousands_separators() {
        assert_eq!(parse_number("1,234,567.5"), Some(1_234_567.5));
        assert_eq!(parse_number("-12,000"), Some(-12_000.0));
        assert_eq!(parse_number("1,5"), None);
        assert_eq!(parse_number("12,34"), None);
        assert_eq!(parse_number("1234,567"), None);
        assert_eq!(parse_number("1.000,5"), None);

        let raw = table("annual", &["Year", "VisitorType", "Nights"], &[&["2025", "Domestic", "1,5"]]);
        assert!(matches!(
            SeriesAligner::new().annual_long(&raw, "Year", "VisitorType", "Nights"),
            Err(ForecastError::Coercion { ref value, .. }) if value == "1,5"
        ));
    }

    #[test]
    fn missing_column_is_reported() {
        let raw = table("annual", &["Year"], &[]);
        assert!(matches!(
            SeriesAligner::new().annual_long(&raw, "Year", "VisitorType", "Nights"),
            Err(ForecastError::MissingColumn { .. })
        ));
    }

    #[test]
    fn empty_filter_fails_loudly() {
        let raw = table(
            "regional",
            &["Region", "Metric", "2024"],
            &[&["Coast", "Nights", "10"]],
        );
        let err = SeriesAligner::new()
            .regional_annual(&raw, "Inland", "Nights", VisitorType::Domestic)
            .unwrap_err();
        assert!(matches!(err, ForecastError::FilterMatch { .. }));
    }

    #[test]
    fn regional_table_melts_year_columns() {
        let raw = table(
            "regional",
            &["Region", "Metric", "2023", "2024", "Notes"],
            &[
                &["Coast", "Domestic nights", "10", "12", "x"],
                &["Inland", "Domestic nights", "3", "4", "y"],
            ],
        );
        let series = SeriesAligner::new()
            .regional_annual(&raw, "coast", "domestic nights", VisitorType::Domestic)
            .unwrap();
        assert_eq!(series.for_key(VisitorType::Domestic), vec![(2023, 10.0), (2024, 12.0)]);
    }

    #[test]
    fn monthly_table_accepts_several_date_layouts() {
        let raw = table(
            "occupancy",
            &["Month", "OccupancyRate"],
            &[
                &["2020-02", "0.5"],
                &["2020-01-01", "0.4"],
                &["2020 Mar", "0.6"],
                &["01/04/2020", "0.7"],
            ],
        );
        let series = SeriesAligner::new()
            .monthly(&raw, columns::MONTH, columns::OCCUPANCY_RATE)
            .unwrap();
        assert_eq!(series.values(), vec![0.4, 0.5, 0.6, 0.7]);
    }

    #[test]
    fn stay_durations_are_filtered_by_region_and_metric() {
        let raw = table(
            "stay",
            &["Region", "Metric", "VisitorType", "AvgStayNights"],
            &[
                &["Coast", "Caravan", "Domestic", "4.0"],
                &["Coast", "Caravan", "International", "6.5"],
                &["Inland", "Caravan", "Domestic", "2.0"],
            ],
        );
        let stay = SeriesAligner::new()
            .stay_durations(&raw, "Coast", "Caravan")
            .unwrap();
        assert_eq!(stay.get(VisitorType::Domestic), Some(4.0));
        assert_eq!(stay.get(VisitorType::International), Some(6.5));
    }

    #[test]
    fn duplicate_site_ratio_is_rejected() {
        let raw = table("ratios", &["SiteId", "Ratio"], &[&["a", "0.1"], &["a", "0.2"]]);
        assert!(SeriesAligner::new().site_ratios(&raw).is_err());
    }
}
