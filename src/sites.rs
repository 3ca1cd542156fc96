//! Site-level view of an aggregate daily-visitor series.

use serde::Serialize;
use tracing::{info, warn};

use crate::models::{AggregateDailyVisitors, SiteForecast, SiteRatios};

/// Requested sites that have no ratio entry. Informational; such sites are
/// left out of the site forecast and the run carries on.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RatioCoverageGap {
    pub sites: Vec<String>,
}

impl RatioCoverageGap {
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteDisaggregation {
    pub forecasts: Vec<SiteForecast>,
    pub coverage_gap: RatioCoverageGap,
}

/// Applies frozen trip-share ratios to every period of an aggregate series.
#[derive(Debug, Clone)]
pub struct SiteDisaggregator {
    ratios: SiteRatios,
}

impl SiteDisaggregator {
    pub fn new(ratios: SiteRatios) -> Self {
        Self { ratios }
    }

    /// Site view for every site with a ratio entry.
    pub fn disaggregate(&self, aggregate: &[AggregateDailyVisitors]) -> SiteDisaggregation {
        let sites: Vec<String> = self.ratios.sites().map(str::to_string).collect();
        self.disaggregate_sites(aggregate, &sites)
    }

    /// Site view for the requested sites; those without a ratio are reported
    /// in the coverage gap. An explicit zero ratio still yields rows.
    pub fn disaggregate_sites(
        &self,
        aggregate: &[AggregateDailyVisitors],
        sites: &[String],
    ) -> SiteDisaggregation {
        let mut known: Vec<(&str, f64)> = Vec::with_capacity(sites.len());
        let mut missing = Vec::new();
        for site in sites {
            match self.ratios.ratio(site) {
                Some(ratio) => known.push((site.as_str(), ratio)),
                None => missing.push(site.clone()),
            }
        }
        known.sort_by(|a, b| a.0.cmp(b.0));
        known.dedup_by(|a, b| a.0 == b.0);
        missing.sort();
        missing.dedup();

        if !missing.is_empty() {
            warn!(sites = ?missing, "sites without a trip ratio are excluded");
        }

        let mut periods = aggregate.to_vec();
        periods.sort_by(|a, b| (a.year, a.month).cmp(&(b.year, b.month)));

        let mut forecasts = Vec::with_capacity(periods.len() * known.len());
        for period in &periods {
            for &(site, ratio) in &known {
                forecasts.push(SiteForecast {
                    year: period.year,
                    month: period.month,
                    site_id: site.to_string(),
                    daily_visitors: period.daily_visitors * ratio,
                });
            }
        }

        info!(
            sites = known.len(),
            periods = periods.len(),
            unattributed = missing.len(),
            "site forecasts computed"
        );

        SiteDisaggregation {
            forecasts,
            coverage_gap: RatioCoverageGap { sites: missing },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn ratios() -> SiteRatios {
        SiteRatios::new(BTreeMap::from([
            ("park-a".to_string(), 0.25),
            ("park-b".to_string(), 0.4),
            ("park-c".to_string(), 0.0),
        ]))
        .unwrap()
    }

    fn aggregate() -> Vec<AggregateDailyVisitors> {
        vec![
            AggregateDailyVisitors { year: 2027, month: 2, daily_visitors: 800.0 },
            AggregateDailyVisitors { year: 2027, month: 1, daily_visitors: 1000.0 },
        ]
    }

    #[test]
    fn site_sum_equals_aggregate_times_ratio_total() {
        let disaggregator = SiteDisaggregator::new(ratios());
        let result = disaggregator.disaggregate(&aggregate());
        for period in aggregate() {
            let total: f64 = result
                .forecasts
                .iter()
                .filter(|f| f.year == period.year && f.month == period.month)
                .map(|f| f.daily_visitors)
                .sum();
            assert!(total <= period.daily_visitors);
            assert!((total - period.daily_visitors * ratios().total()).abs() < 1e-9);
        }
        assert!(result.coverage_gap.is_empty());
    }

    #[test]
    fn unknown_sites_are_excluded_and_reported() {
        let disaggregator = SiteDisaggregator::new(ratios());
        let sites = vec!["park-a".to_string(), "park-z".to_string(), "park-c".to_string()];
        let result = disaggregator.disaggregate_sites(&aggregate(), &sites);

        assert_eq!(result.coverage_gap.sites, vec!["park-z".to_string()]);
        assert!(result.forecasts.iter().all(|f| f.site_id != "park-z"));
        // explicit zero ratio is kept, distinct from an unknown ratio
        assert!(result
            .forecasts
            .iter()
            .any(|f| f.site_id == "park-c" && f.daily_visitors == 0.0));
    }

    #[test]
    fn output_is_ordered_by_period_then_site() {
        let result = SiteDisaggregator::new(ratios()).disaggregate(&aggregate());
        let order: Vec<(i32, u32, &str)> = result
            .forecasts
            .iter()
            .map(|f| (f.year, f.month, f.site_id.as_str()))
            .collect();
        assert_eq!(order[0], (2027, 1, "park-a"));
        assert_eq!(order[3], (2027, 2, "park-a"));
        assert_eq!(result.forecasts[0].daily_visitors, 250.0);
    }
}
