use crate::core_logic::data_processing::IndicatorRecord;
use crate::error::{DashboardError, DashboardResult};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValueFormat {
    Currency,
    Integer,
    Percent,
    Decimal,
    Index,
}

#[derive(Serialize, Debug, Clone, Copy)]
pub struct MetricInfo {
    pub key: &'static str,
    pub label: &'static str,
    pub unit: &'static str,
    pub format: ValueFormat,
    /// Inclusive range the value can plausibly take.
    #[serde(skip)]
    pub bounds: (f64, f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Gdp,
    Population,
    LifeExpectancy,
    InfantMortality,
    Female,
    Male,
    Internet,
    Hci,
    Enrollment,
    UrbanPop,
    Migration,
}

impl Metric {
    pub const ALL: [Metric; 11] = [
        Metric::Gdp,
        Metric::Population,
        Metric::LifeExpectancy,
        Metric::InfantMortality,
        Metric::Female,
        Metric::Male,
        Metric::Internet,
        Metric::Hci,
        Metric::Enrollment,
        Metric::UrbanPop,
        Metric::Migration,
    ];

    pub fn info(&self) -> MetricInfo {
        match self {
            Metric::Gdp => MetricInfo {
                key: "gdp",
                label: "GDP per Capita",
                unit: "USD",
                format: ValueFormat::Currency,
                bounds: (0.0, f64::MAX),
            },
            Metric::Population => MetricInfo {
                key: "population",
                label: "Population",
                unit: "people",
                format: ValueFormat::Integer,
                bounds: (0.0, f64::MAX),
            },
            Metric::LifeExpectancy => MetricInfo {
                key: "life_expectancy",
                label: "Life Expectancy",
                unit: "years",
                format: ValueFormat::Decimal,
                bounds: (0.0, 120.0),
            },
            Metric::InfantMortality => MetricInfo {
                key: "infant_mortality",
                label: "Infant Mortality",
                unit: "per 1,000 live births",
                format: ValueFormat::Decimal,
                bounds: (0.0, 1000.0),
            },
            Metric::Female => MetricInfo {
                key: "female",
                label: "Female Population",
                unit: "% of total",
                format: ValueFormat::Percent,
                bounds: (0.0, 100.0),
            },
            Metric::Male => MetricInfo {
                key: "male",
                label: "Male Population",
                unit: "% of total",
                format: ValueFormat::Percent,
                bounds: (0.0, 100.0),
            },
            Metric::Internet => MetricInfo {
                key: "internet",
                label: "Internet Users",
                unit: "% of population",
                format: ValueFormat::Percent,
                bounds: (0.0, 100.0),
            },
            Metric::Hci => MetricInfo {
                key: "hci",
                label: "Human Capital Index",
                unit: "index (0-1)",
                format: ValueFormat::Index,
                bounds: (0.0, 1.0),
            },
            Metric::Enrollment => MetricInfo {
                key: "enrollment",
                label: "School Enrollment",
                unit: "% gross",
                format: ValueFormat::Percent,
                // Gross enrollment ratios exceed 100 when over-age pupils are counted.
                bounds: (0.0, 200.0),
            },
            Metric::UrbanPop => MetricInfo {
                key: "urban_pop",
                label: "Urban Population",
                unit: "% of total",
                format: ValueFormat::Percent,
                bounds: (0.0, 100.0),
            },
            Metric::Migration => MetricInfo {
                key: "migration",
                label: "Net Migration",
                unit: "people",
                format: ValueFormat::Integer,
                bounds: (f64::MIN, f64::MAX),
            },
        }
    }

    pub fn key(&self) -> &'static str {
        self.info().key
    }

    /// Position in [`Metric::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Long-form field name from the record schema.
    pub fn field_name(&self) -> &'static str {
        match self {
            Metric::Gdp => "gdp_per_capita",
            Metric::Population => "population",
            Metric::LifeExpectancy => "life_expectancy",
            Metric::InfantMortality => "infant_mortality",
            Metric::Female => "female_pop_pct",
            Metric::Male => "male_pop_pct",
            Metric::Internet => "internet_pct",
            Metric::Hci => "human_capital_index",
            Metric::Enrollment => "enrollment_pct",
            Metric::UrbanPop => "urban_pop_pct",
            Metric::Migration => "net_migration",
        }
    }

    pub fn value_of(&self, record: &IndicatorRecord) -> Option<f64> {
        match self {
            Metric::Gdp => record.gdp_per_capita,
            Metric::Population => record.population,
            Metric::LifeExpectancy => record.life_expectancy,
            Metric::InfantMortality => record.infant_mortality,
            Metric::Female => record.female_pop_pct,
            Metric::Male => record.male_pop_pct,
            Metric::Internet => record.internet_pct,
            Metric::Hci => record.human_capital_index,
            Metric::Enrollment => record.enrollment_pct,
            Metric::UrbanPop => record.urban_pop_pct,
            Metric::Migration => record.net_migration,
        }
    }

    /// Pulls a value back inside the indicator's plausible range.
    pub fn clamp_value(&self, value: f64) -> f64 {
        let (low, high) = self.info().bounds;
        value.clamp(low, high)
    }

    pub fn from_key(key: &str) -> DashboardResult<Metric> {
        let needle = key.trim();
        Metric::ALL
            .iter()
            .copied()
            .find(|metric| {
                metric.key().eq_ignore_ascii_case(needle)
                    || metric.field_name().eq_ignore_ascii_case(needle)
            })
            .ok_or_else(|| DashboardError::InvalidMetric(needle.to_string()))
    }

    pub fn registry() -> Vec<MetricInfo> {
        Metric::ALL.iter().map(Metric::info).collect()
    }
}

impl FromStr for Metric {
    type Err = DashboardError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Metric::from_key(value)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

impl<'de> Deserialize<'de> for Metric {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        Metric::from_key(&key).map_err(de::Error::custom)
    }
}
