use crate::core_logic::data_processing::IndicatorStore;
use crate::core_logic::forecasting::boosting::BoostingConfig;
use crate::core_logic::forecasting::evaluation::{
    best_model, recommendation, FittedModels, ModelKind, ModelMetrics,
};
use crate::core_logic::forecasting::features::{
    Feature, FeatureContext, FeatureRow, FeatureSet, Imputer, YearRange,
};
use crate::core_logic::metrics::Metric;
use crate::error::{DashboardError, DashboardResult};
use ndarray::{s, Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Furthest a forecast may reach past the last observed year.
pub const MAX_HORIZON: i32 = 50;
const TRAILING_WINDOW: usize = 6;
const MAX_ANNUAL_GROWTH: f64 = 0.25;
const PERTURBATION: f64 = 0.01;
const HOLDOUT_FRACTION: f64 = 0.2;

fn default_target() -> Metric {
    Metric::Gdp
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ForecastRequest {
    pub country_code: String,
    #[serde(default = "default_target")]
    pub target: Metric,
    /// Years used for fitting; the country's full history when omitted.
    #[serde(default)]
    pub history: Option<YearRange>,
    pub forecast_years: Vec<i32>,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct ForecastPoint {
    pub year: i32,
    pub predicted_value: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ForecastResult {
    pub country_code: String,
    pub target: Metric,
    pub history: YearRange,
    pub training_years: YearRange,
    pub holdout_years: YearRange,
    pub features: Vec<String>,
    pub forecasts: BTreeMap<ModelKind, Vec<ForecastPoint>>,
    pub metrics: BTreeMap<ModelKind, ModelMetrics>,
    pub best_model: ModelKind,
    pub recommendation: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Growth {
    /// Compound annual rate.
    Compound(f64),
    /// Average change per year, used when the series touches zero or below.
    Linear(f64),
}

impl Growth {
    fn estimate(years: &[i32], values: &[f64]) -> Growth {
        let (Some(first), Some(last)) = (values.first(), values.last()) else {
            return Growth::Linear(0.0);
        };
        let span = match (years.first(), years.last()) {
            (Some(start), Some(end)) => f64::from(end - start),
            _ => 0.0,
        };
        if span <= 0.0 {
            return Growth::Linear(0.0);
        }
        if *first > 0.0 && *last > 0.0 {
            let rate = (last / first).powf(1.0 / span) - 1.0;
            Growth::Compound(rate.clamp(-MAX_ANNUAL_GROWTH, MAX_ANNUAL_GROWTH))
        } else {
            Growth::Linear((last - first) / span)
        }
    }

    fn project(&self, last: f64, steps: i32) -> f64 {
        match self {
            Growth::Compound(rate) => last * (1.0 + rate).powi(steps),
            Growth::Linear(slope) => last + slope * f64::from(steps),
        }
    }
}

/// Extends every feature past the observed history.
struct Projector {
    growth: Vec<Growth>,
    last_values: Vec<f64>,
    last_year: i32,
}

impl Projector {
    fn new(years: &[i32], matrix: &Array2<f64>) -> Projector {
        let rows = matrix.nrows();
        let start = rows.saturating_sub(TRAILING_WINDOW);
        let window_years = &years[start..];
        let window = matrix.slice(s![start.., ..]);

        let growth = window
            .columns()
            .into_iter()
            .map(|column| Growth::estimate(window_years, &column.to_vec()))
            .collect();
        let last_values = if rows > 0 {
            matrix.row(rows - 1).to_vec()
        } else {
            vec![0.0; matrix.ncols()]
        };

        Projector {
            growth,
            last_values,
            last_year: years.last().copied().unwrap_or_default(),
        }
    }

    fn project<R: Rng + ?Sized>(
        &self,
        features: &[Feature],
        span: YearRange,
        year: i32,
        rng: &mut R,
    ) -> Vec<f64> {
        let steps = year - self.last_year;
        features
            .iter()
            .enumerate()
            .map(|(i, feature)| {
                if feature.is_calendar() {
                    return span.normalize(year);
                }
                let (low, high) = feature.bounds();
                let clean = self.growth[i]
                    .project(self.last_values[i], steps)
                    .clamp(low, high);
                let noise: f64 = rng.gen_range(-PERTURBATION..=PERTURBATION);
                (clean + noise * clean.abs()).clamp(low, high)
            })
            .collect()
    }
}

fn validate_years(forecast_years: &[i32], last_year: i32) -> DashboardResult<Vec<i32>> {
    if forecast_years.is_empty() {
        return Err(DashboardError::InvalidParameter(
            "forecast_years must name at least one year".to_string(),
        ));
    }
    let mut years = forecast_years.to_vec();
    years.sort_unstable();
    years.dedup();
    for year in &years {
        if *year <= last_year || *year > last_year + MAX_HORIZON {
            return Err(DashboardError::InvalidParameter(format!(
                "forecast year {} must fall between {} and {}",
                year,
                last_year + 1,
                last_year + MAX_HORIZON
            )));
        }
    }
    Ok(years)
}

fn matrix_from_rows(rows: &[Vec<f64>], width: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), width), |(i, j)| rows[i][j])
}

/// Fits both models on a country's history, scores them on the most recent
/// years they did not see, then refits on the full history and projects the
/// requested years.
pub fn run_forecast(
    store: &IndicatorStore,
    request: &ForecastRequest,
    min_history: usize,
) -> DashboardResult<ForecastResult> {
    let country_code = request.country_code.trim();
    if country_code.is_empty() {
        return Err(DashboardError::InvalidParameter(
            "country_code must not be empty".to_string(),
        ));
    }
    if let Some(range) = request.history {
        if range.start > range.end {
            return Err(DashboardError::InvalidParameter(format!(
                "history start {} is after end {}",
                range.start, range.end
            )));
        }
    }
    if !store.has_country(country_code)? {
        return Err(DashboardError::CountryNotFound(country_code.to_string()));
    }

    // One row to train on and one to hold out, at minimum.
    let min_history = min_history.max(2);
    let target = request.target;
    let records = store.country_records(country_code, None, None)?;
    let imputer = Imputer::from_store(store)?;
    let filled = imputer.fill(&records);

    // A row is fitted only when its target is present and the year before
    // it is on record; earlier years still feed the lags.
    let usable: Vec<usize> = records
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, record)| request.history.map_or(true, |range| range.contains(record.year)))
        .filter(|(_, record)| target.value_of(record).map_or(false, f64::is_finite))
        .map(|(i, _)| i)
        .collect();
    if usable.len() < min_history {
        return Err(DashboardError::InsufficientHistory {
            country_code: country_code.to_string(),
            available: usable.len(),
            required: min_history,
        });
    }

    let years: Vec<i32> = usable.iter().map(|&i| records[i].year).collect();
    let (Some(&first_year), Some(&last_year)) = (years.first(), years.last()) else {
        return Err(DashboardError::InsufficientHistory {
            country_code: country_code.to_string(),
            available: 0,
            required: min_history,
        });
    };
    let forecast_years = validate_years(&request.forecast_years, last_year)?;

    let span = YearRange {
        start: first_year,
        end: last_year,
    };
    let feature_set = FeatureSet::forecasting(target);
    let context = FeatureContext {
        imputer: &imputer,
        span,
    };
    let feature_rows: Vec<Vec<f64>> = usable
        .iter()
        .map(|&i| {
            let row = FeatureRow {
                current: &filled[i],
                previous: &filled[i - 1],
            };
            feature_set.row(&row, &context)
        })
        .collect();
    let x = matrix_from_rows(&feature_rows, feature_set.len());
    let y: Array1<f64> = usable
        .iter()
        .map(|&i| filled[i].value(target))
        .collect();

    let n = usable.len();
    let holdout = ((n as f64 * HOLDOUT_FRACTION).round() as usize).clamp(1, n - 1);
    let split = n - holdout;

    let mut rng = match request.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let config = BoostingConfig::default();

    let evaluated = FittedModels::fit(
        x.slice(s![..split, ..]),
        y.slice(s![..split]),
        &config,
        &mut rng,
    )?;
    let metrics = evaluated.score(x.slice(s![split.., ..]), y.slice(s![split..]));

    let full = FittedModels::fit(x.view(), y.view(), &config, &mut rng)?;
    let projector = Projector::new(&years, &x);
    let future_rows: Vec<Vec<f64>> = forecast_years
        .iter()
        .map(|year| projector.project(feature_set.features(), span, *year, &mut rng))
        .collect();
    let future = matrix_from_rows(&future_rows, feature_set.len());

    let mut forecasts = BTreeMap::new();
    for kind in ModelKind::ALL {
        let predictions = full.predict(kind, future.view());
        let mut points = Vec::with_capacity(forecast_years.len());
        for (year, value) in forecast_years.iter().zip(predictions.iter()) {
            if !value.is_finite() {
                return Err(DashboardError::Model(format!(
                    "{} produced a non-finite forecast for {}",
                    kind, year
                )));
            }
            points.push(ForecastPoint {
                year: *year,
                predicted_value: target.clamp_value(*value),
            });
        }
        forecasts.insert(kind, points);
    }

    let best = best_model(&metrics).unwrap_or(ModelKind::LinearRegression);
    Ok(ForecastResult {
        country_code: country_code.to_string(),
        target,
        history: span,
        training_years: YearRange {
            start: years[0],
            end: years[split - 1],
        },
        holdout_years: YearRange {
            start: years[split],
            end: last_year,
        },
        features: feature_set.names(),
        forecasts,
        recommendation: recommendation(best, &metrics),
        metrics,
        best_model: best,
    })
}
