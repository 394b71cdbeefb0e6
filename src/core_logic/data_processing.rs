use crate::core_logic::chart_record::ChartRecord;
use crate::core_logic::metrics::Metric;
use crate::error::{DashboardError, DashboardResult};
use ndarray_stats::CorrelationExt;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const COUNTRY: &str = "country_code";
pub const YEAR: &str = "year";
const COUNTRIES: &str = "countries";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct IndicatorRecord {
    pub country_code: String,
    pub year: i32,
    pub gdp_per_capita: Option<f64>,
    pub population: Option<f64>,
    pub life_expectancy: Option<f64>,
    pub infant_mortality: Option<f64>,
    pub female_pop_pct: Option<f64>,
    pub male_pop_pct: Option<f64>,
    pub internet_pct: Option<f64>,
    pub human_capital_index: Option<f64>,
    pub enrollment_pct: Option<f64>,
    pub urban_pop_pct: Option<f64>,
    pub net_migration: Option<f64>,
}

impl IndicatorRecord {
    pub fn new(country_code: impl Into<String>, year: i32) -> Self {
        IndicatorRecord {
            country_code: country_code.into(),
            year,
            ..Default::default()
        }
    }

    pub fn with(mut self, metric: Metric, value: f64) -> Self {
        self.set(metric, Some(value));
        self
    }

    pub fn set(&mut self, metric: Metric, value: Option<f64>) {
        let slot = match metric {
            Metric::Gdp => &mut self.gdp_per_capita,
            Metric::Population => &mut self.population,
            Metric::LifeExpectancy => &mut self.life_expectancy,
            Metric::InfantMortality => &mut self.infant_mortality,
            Metric::Female => &mut self.female_pop_pct,
            Metric::Male => &mut self.male_pop_pct,
            Metric::Internet => &mut self.internet_pct,
            Metric::Hci => &mut self.human_capital_index,
            Metric::Enrollment => &mut self.enrollment_pct,
            Metric::UrbanPop => &mut self.urban_pop_pct,
            Metric::Migration => &mut self.net_migration,
        };
        *slot = value;
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StoreSummary {
    pub total_records: usize,
    pub total_countries: usize,
    pub min_year: Option<i32>,
    pub max_year: Option<i32>,
    pub total_years: usize,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CountryCoverage {
    pub country_code: String,
    pub records: i64,
    pub first_year: i32,
    pub last_year: i32,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    pub metrics: Vec<&'static str>,
    pub observations: usize,
    /// `None` where a coefficient is undefined (a constant column).
    pub coefficients: Vec<Vec<Option<f64>>>,
}

/// Read-only, in-memory view over every indicator record.
pub struct IndicatorStore {
    frame: DataFrame,
}

impl IndicatorStore {
    /// Rows with an empty country code are dropped, non-finite values become
    /// nulls and duplicate (country, year) pairs keep their first occurrence.
    pub fn from_records(records: Vec<IndicatorRecord>) -> DashboardResult<Self> {
        let mut records: Vec<IndicatorRecord> = records
            .into_iter()
            .filter(|record| !record.country_code.trim().is_empty())
            .collect();
        records.sort_by(|a, b| {
            a.country_code
                .cmp(&b.country_code)
                .then(a.year.cmp(&b.year))
        });
        records.dedup_by(|next, kept| next.country_code == kept.country_code && next.year == kept.year);

        let mut columns = vec![
            Series::new(
                COUNTRY,
                records
                    .iter()
                    .map(|record| record.country_code.as_str())
                    .collect::<Vec<&str>>(),
            ),
            Series::new(
                YEAR,
                records.iter().map(|record| record.year).collect::<Vec<i32>>(),
            ),
        ];
        for metric in Metric::ALL {
            columns.push(Series::new(
                metric.key(),
                records
                    .iter()
                    .map(|record| metric.value_of(record).filter(|value| value.is_finite()))
                    .collect::<Vec<Option<f64>>>(),
            ));
        }

        let frame = DataFrame::new(columns)?;
        Ok(IndicatorStore { frame })
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn top_n(&self, metric: Metric, year: i32, limit: usize) -> DashboardResult<Vec<ChartRecord>> {
        let key = metric.key();
        let df = self
            .frame
            .clone()
            .lazy()
            .filter(col(YEAR).eq(lit(year)).and(col(key).is_not_null()))
            .select([col(COUNTRY), col(key)])
            .collect()?;

        let mut rows = country_values(&df, key)?;
        rows.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        rows.truncate(limit);

        Ok(rows
            .into_iter()
            .map(|(country_code, value)| {
                ChartRecord::new()
                    .with_text(COUNTRY, country_code)
                    .with_integer(YEAR, i64::from(year))
                    .with_number(key, value)
            })
            .collect())
    }

    /// Mean across countries per year, or the country's own series.
    pub fn trend(&self, metric: Metric, country_code: Option<&str>) -> DashboardResult<Vec<ChartRecord>> {
        let key = metric.key();

        match country_code {
            Some(code) => {
                let df = self
                    .frame
                    .clone()
                    .lazy()
                    .filter(col(COUNTRY).eq(lit(code)).and(col(key).is_not_null()))
                    .select([col(YEAR), col(key)])
                    .sort(YEAR, Default::default())
                    .collect()?;

                let years = df.column(YEAR)?.i32()?;
                let values = df.column(key)?.f64()?;
                Ok(years
                    .into_iter()
                    .zip(values.into_iter())
                    .filter_map(|(year, value)| match (year, value) {
                        (Some(year), Some(value)) if value.is_finite() => Some(
                            ChartRecord::new()
                                .with_integer(YEAR, i64::from(year))
                                .with_text(COUNTRY, code)
                                .with_number(key, value),
                        ),
                        _ => None,
                    })
                    .collect())
            }
            None => {
                let df = self
                    .frame
                    .clone()
                    .lazy()
                    .filter(col(key).is_not_null())
                    .group_by([col(YEAR)])
                    .agg([
                        col(key).mean().alias(key),
                        col(key).count().cast(DataType::Int64).alias(COUNTRIES),
                    ])
                    .sort(YEAR, Default::default())
                    .collect()?;

                let years = df.column(YEAR)?.i32()?;
                let means = df.column(key)?.f64()?;
                let counts = df.column(COUNTRIES)?.i64()?;
                Ok(years
                    .into_iter()
                    .zip(means.into_iter())
                    .zip(counts.into_iter())
                    .filter_map(|((year, mean), count)| match (year, mean, count) {
                        (Some(year), Some(mean), Some(count)) if count > 0 && mean.is_finite() => {
                            Some(
                                ChartRecord::new()
                                    .with_integer(YEAR, i64::from(year))
                                    .with_number(key, mean)
                                    .with_integer(COUNTRIES, count),
                            )
                        }
                        _ => None,
                    })
                    .collect())
            }
        }
    }

    /// Inner join on validity: a country appears only when both values exist.
    pub fn correlation(
        &self,
        metric_a: Metric,
        metric_b: Metric,
        year: i32,
    ) -> DashboardResult<Vec<ChartRecord>> {
        if metric_a == metric_b {
            return Err(DashboardError::InvalidParameter(
                "correlation requires two different metrics".to_string(),
            ));
        }
        let (key_a, key_b) = (metric_a.key(), metric_b.key());
        let df = self
            .frame
            .clone()
            .lazy()
            .filter(
                col(YEAR)
                    .eq(lit(year))
                    .and(col(key_a).is_not_null())
                    .and(col(key_b).is_not_null()),
            )
            .select([col(COUNTRY), col(key_a), col(key_b)])
            .collect()?;

        let codes = df.column(COUNTRY)?.str()?;
        let values_a = df.column(key_a)?.f64()?;
        let values_b = df.column(key_b)?.f64()?;
        let mut rows: Vec<(String, f64, f64)> = codes
            .into_iter()
            .zip(values_a.into_iter())
            .zip(values_b.into_iter())
            .filter_map(|((code, a), b)| match (code, a, b) {
                (Some(code), Some(a), Some(b)) if !code.is_empty() && a.is_finite() && b.is_finite() => {
                    Some((code.to_string(), a, b))
                }
                _ => None,
            })
            .collect();
        rows.sort_by(|x, y| x.0.cmp(&y.0));

        Ok(rows
            .into_iter()
            .map(|(country_code, a, b)| {
                ChartRecord::new()
                    .with_text(COUNTRY, country_code)
                    .with_number(key_a, a)
                    .with_number(key_b, b)
            })
            .collect())
    }

    pub fn distribution(&self, metric: Metric, year: i32) -> DashboardResult<Vec<ChartRecord>> {
        let key = metric.key();
        let df = self
            .frame
            .clone()
            .lazy()
            .filter(col(YEAR).eq(lit(year)).and(col(key).is_not_null()))
            .select([col(COUNTRY), col(key)])
            .collect()?;

        let mut rows = country_values(&df, key)?;
        rows.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Ok(rows
            .into_iter()
            .map(|(country_code, value)| {
                ChartRecord::new()
                    .with_text(COUNTRY, country_code)
                    .with_number(key, value)
            })
            .collect())
    }

    pub fn records(&self) -> DashboardResult<Vec<IndicatorRecord>> {
        records_from_frame(&self.frame)
    }

    /// The country's records ordered by year, optionally bounded on both ends.
    pub fn country_records(
        &self,
        country_code: &str,
        start_year: Option<i32>,
        end_year: Option<i32>,
    ) -> DashboardResult<Vec<IndicatorRecord>> {
        let mut predicate = col(COUNTRY).eq(lit(country_code));
        if let Some(start) = start_year {
            predicate = predicate.and(col(YEAR).gt_eq(lit(start)));
        }
        if let Some(end) = end_year {
            predicate = predicate.and(col(YEAR).lt_eq(lit(end)));
        }

        let df = self
            .frame
            .clone()
            .lazy()
            .filter(predicate)
            .sort(YEAR, Default::default())
            .collect()?;
        records_from_frame(&df)
    }

    pub fn has_country(&self, country_code: &str) -> DashboardResult<bool> {
        let df = self
            .frame
            .clone()
            .lazy()
            .filter(col(COUNTRY).eq(lit(country_code)))
            .select([col(YEAR)])
            .collect()?;
        Ok(df.height() > 0)
    }

    /// Mean of every metric across all countries and years; `None` when a
    /// metric has no data at all.
    pub fn metric_means(&self) -> DashboardResult<HashMap<Metric, Option<f64>>> {
        let exprs: Vec<Expr> = Metric::ALL
            .iter()
            .map(|metric| col(metric.key()).mean())
            .collect();
        let df = self.frame.clone().lazy().select(exprs).collect()?;

        let mut means = HashMap::with_capacity(Metric::ALL.len());
        for metric in Metric::ALL {
            let mean = df
                .column(metric.key())?
                .f64()?
                .into_iter()
                .next()
                .flatten()
                .filter(|value| value.is_finite());
            means.insert(metric, mean);
        }
        Ok(means)
    }

    pub fn summary(&self) -> DashboardResult<StoreSummary> {
        let years = self.frame.column(YEAR)?;
        let year_values = years.i32()?;
        Ok(StoreSummary {
            total_records: self.frame.height(),
            total_countries: self.frame.column(COUNTRY)?.n_unique()?,
            min_year: year_values.min(),
            max_year: year_values.max(),
            total_years: years.n_unique()?,
        })
    }

    pub fn countries(&self) -> DashboardResult<Vec<CountryCoverage>> {
        let df = self
            .frame
            .clone()
            .lazy()
            .group_by([col(COUNTRY)])
            .agg([
                col(YEAR).count().cast(DataType::Int64).alias("records"),
                col(YEAR).min().alias("first_year"),
                col(YEAR).max().alias("last_year"),
            ])
            .sort(COUNTRY, Default::default())
            .collect()?;

        let codes = df.column(COUNTRY)?.str()?;
        let counts = df.column("records")?.i64()?;
        let firsts = df.column("first_year")?.i32()?;
        let lasts = df.column("last_year")?.i32()?;

        Ok(codes
            .into_iter()
            .zip(counts.into_iter())
            .zip(firsts.into_iter().zip(lasts.into_iter()))
            .filter_map(|((code, count), (first, last))| match (code, count, first, last) {
                (Some(code), Some(records), Some(first_year), Some(last_year)) => Some(CountryCoverage {
                    country_code: code.to_string(),
                    records,
                    first_year,
                    last_year,
                }),
                _ => None,
            })
            .collect())
    }

    /// Pearson coefficients between every pair of `metrics`, over the
    /// countries having all of them for `year` (every year when `None`).
    pub fn correlation_matrix(
        &self,
        metrics: &[Metric],
        year: Option<i32>,
    ) -> DashboardResult<CorrelationMatrix> {
        let keys: Vec<&'static str> = metrics.iter().map(Metric::key).collect();
        let mut predicate = col(COUNTRY).is_not_null();
        if let Some(year) = year {
            predicate = predicate.and(col(YEAR).eq(lit(year)));
        }
        for key in &keys {
            predicate = predicate.and(col(*key).is_not_null());
        }

        let df = self
            .frame
            .clone()
            .lazy()
            .filter(predicate)
            .collect()?;

        if keys.len() < 2 || df.height() < 3 {
            return Ok(CorrelationMatrix {
                metrics: keys,
                observations: df.height(),
                coefficients: Vec::new(),
            });
        }

        let nd_array = df
            .select(keys.clone())?
            .to_ndarray::<Float64Type>(IndexOrder::Fortran)?;
        let correlation_matrix = nd_array
            .t()
            .pearson_correlation()
            .map_err(|err| DashboardError::Model(err.to_string()))?;

        let coefficients: Vec<Vec<Option<f64>>> = correlation_matrix
            .outer_iter()
            .map(|row| {
                row.iter()
                    .map(|value| Some(*value).filter(|value| value.is_finite()))
                    .collect::<Vec<Option<f64>>>()
            })
            .collect();

        Ok(CorrelationMatrix {
            metrics: keys,
            observations: df.height(),
            coefficients,
        })
    }
}

fn country_values(df: &DataFrame, key: &str) -> DashboardResult<Vec<(String, f64)>> {
    let codes = df.column(COUNTRY)?.str()?;
    let values = df.column(key)?.f64()?;
    Ok(codes
        .into_iter()
        .zip(values.into_iter())
        .filter_map(|(code, value)| match (code, value) {
            (Some(code), Some(value)) if !code.is_empty() && value.is_finite() => {
                Some((code.to_string(), value))
            }
            _ => None,
        })
        .collect())
}

fn records_from_frame(df: &DataFrame) -> DashboardResult<Vec<IndicatorRecord>> {
    let codes = df.column(COUNTRY)?.str()?;
    let years = df.column(YEAR)?.i32()?;
    let mut columns: Vec<(Metric, Vec<Option<f64>>)> = Vec::with_capacity(Metric::ALL.len());
    for metric in Metric::ALL {
        let values = df.column(metric.key())?.f64()?.into_iter().collect();
        columns.push((metric, values));
    }

    let mut records = Vec::with_capacity(df.height());
    for (row, (code, year)) in codes.into_iter().zip(years.into_iter()).enumerate() {
        let (Some(code), Some(year)) = (code, year) else {
            continue;
        };
        let mut record = IndicatorRecord::new(code, year);
        for (metric, values) in &columns {
            record.set(*metric, values[row]);
        }
        records.push(record);
    }
    Ok(records)
}
