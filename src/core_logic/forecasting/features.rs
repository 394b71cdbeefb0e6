use crate::core_logic::data_processing::{IndicatorRecord, IndicatorStore};
use crate::core_logic::metrics::Metric;
use crate::error::DashboardResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn contains(&self, year: i32) -> bool {
        year >= self.start && year <= self.end
    }

    /// Maps `start..=end` onto `0..=1`; years past `end` keep growing.
    pub fn normalize(&self, year: i32) -> f64 {
        let width = (self.end - self.start).max(1) as f64;
        f64::from(year - self.start) / width
    }
}

/// A country/year row with every indicator filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct FilledRecord {
    pub country_code: String,
    pub year: i32,
    values: [f64; 11],
}

impl FilledRecord {
    pub fn value(&self, metric: Metric) -> f64 {
        self.values[metric.index()]
    }
}

/// Forward-fills gaps within a country's series; leading gaps take the
/// cross-country mean of the indicator.
#[derive(Debug, Clone)]
pub struct Imputer {
    fallback: [f64; 11],
}

impl Imputer {
    pub fn from_store(store: &IndicatorStore) -> DashboardResult<Self> {
        Ok(Imputer::from_means(&store.metric_means()?))
    }

    pub fn from_means(means: &HashMap<Metric, Option<f64>>) -> Self {
        let mut fallback = [0.0; 11];
        for metric in Metric::ALL {
            fallback[metric.index()] = means.get(&metric).copied().flatten().unwrap_or(0.0);
        }
        Imputer { fallback }
    }

    pub fn fallback(&self, metric: Metric) -> f64 {
        self.fallback[metric.index()]
    }

    /// `records` must belong to one country and be ordered by year.
    pub fn fill(&self, records: &[IndicatorRecord]) -> Vec<FilledRecord> {
        let mut last_seen: [Option<f64>; 11] = [None; 11];
        records
            .iter()
            .map(|record| {
                let mut values = [0.0; 11];
                for metric in Metric::ALL {
                    let slot = metric.index();
                    if let Some(value) = metric.value_of(record).filter(|v| v.is_finite()) {
                        last_seen[slot] = Some(value);
                    }
                    values[slot] = last_seen[slot].unwrap_or(self.fallback[slot]);
                }
                FilledRecord {
                    country_code: record.country_code.clone(),
                    year: record.year,
                    values,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Raw(Metric),
    /// Previous year's value of an indicator.
    Lagged(Metric),
    /// Previous year's GDP per capita relative to the cross-country mean.
    GdpIntensity,
    HealthIndex,
    DevelopmentIndex,
    YearNormalized,
}

impl Feature {
    pub fn name(&self) -> String {
        match self {
            Feature::Raw(metric) => metric.key().to_string(),
            Feature::Lagged(metric) => format!("{}_lagged", metric.key()),
            Feature::GdpIntensity => "gdp_intensity".to_string(),
            Feature::HealthIndex => "health_index".to_string(),
            Feature::DevelopmentIndex => "development_index".to_string(),
            Feature::YearNormalized => "year_normalized".to_string(),
        }
    }

    pub fn value(&self, row: &FeatureRow<'_>, context: &FeatureContext<'_>) -> f64 {
        match self {
            Feature::Raw(metric) => row.current.value(*metric),
            Feature::Lagged(metric) => row.previous.value(*metric),
            Feature::GdpIntensity => {
                let mean_gdp = context.imputer.fallback(Metric::Gdp);
                if mean_gdp > 0.0 {
                    row.previous.value(Metric::Gdp) / mean_gdp
                } else {
                    1.0
                }
            }
            Feature::HealthIndex => {
                let life = row.current.value(Metric::LifeExpectancy) / 100.0;
                let survival = 1.0 - row.current.value(Metric::InfantMortality) / 1000.0;
                (life * survival).clamp(0.0, 1.0)
            }
            Feature::DevelopmentIndex => {
                let internet = row.current.value(Metric::Internet).clamp(0.0, 100.0);
                let enrollment = row.current.value(Metric::Enrollment).clamp(0.0, 100.0);
                (internet + enrollment) / 200.0
            }
            Feature::YearNormalized => context.span.normalize(row.current.year),
        }
    }

    /// Whether the feature is computed from `metric` in the same year as the
    /// row it describes.
    pub fn reads_current(&self, metric: Metric) -> bool {
        match self {
            Feature::Raw(raw) => *raw == metric,
            Feature::HealthIndex => matches!(metric, Metric::LifeExpectancy | Metric::InfantMortality),
            Feature::DevelopmentIndex => matches!(metric, Metric::Internet | Metric::Enrollment),
            Feature::Lagged(_) | Feature::GdpIntensity | Feature::YearNormalized => false,
        }
    }

    /// Plausible range used when a value is projected forward.
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            Feature::Raw(metric) | Feature::Lagged(metric) => metric.info().bounds,
            Feature::GdpIntensity => (0.0, f64::MAX),
            Feature::HealthIndex | Feature::DevelopmentIndex => (0.0, 1.0),
            Feature::YearNormalized => (f64::MIN, f64::MAX),
        }
    }

    /// Projected from the calendar rather than from a growth rate.
    pub fn is_calendar(&self) -> bool {
        matches!(self, Feature::YearNormalized)
    }
}

/// A fitted row and the record of the year before it.
pub struct FeatureRow<'a> {
    pub current: &'a FilledRecord,
    pub previous: &'a FilledRecord,
}

pub struct FeatureContext<'a> {
    pub imputer: &'a Imputer,
    pub span: YearRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    features: Vec<Feature>,
}

impl FeatureSet {
    pub fn new(features: Vec<Feature>) -> Self {
        FeatureSet { features }
    }

    /// Every indicator except the target, plus the derived ratios that do
    /// not read the target's own value.
    pub fn forecasting(target: Metric) -> Self {
        let features = Metric::ALL
            .iter()
            .map(|metric| Feature::Raw(*metric))
            .chain([
                Feature::GdpIntensity,
                Feature::HealthIndex,
                Feature::DevelopmentIndex,
                Feature::YearNormalized,
            ])
            .filter(|feature| !feature.reads_current(target))
            .collect();
        FeatureSet { features }
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.features.iter().map(Feature::name).collect()
    }

    pub fn row(&self, row: &FeatureRow<'_>, context: &FeatureContext<'_>) -> Vec<f64> {
        self.features
            .iter()
            .map(|feature| feature.value(row, context))
            .collect()
    }
}
