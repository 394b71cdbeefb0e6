use crate::core_logic::data_processing::IndicatorStore;
use crate::core_logic::forecasting::boosting::BoostingConfig;
use crate::core_logic::forecasting::evaluation::{best_model, FittedModels, ModelKind, ModelMetrics};
use crate::core_logic::forecasting::features::{
    Feature, FeatureContext, FeatureRow, FeatureSet, FilledRecord, Imputer, YearRange,
};
use crate::core_logic::metrics::Metric;
use crate::error::{DashboardError, DashboardResult};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_EXPERIMENT_SEED: u64 = 42;
const MIN_PANEL_ROWS: usize = 10;
const TEST_FRACTION: f64 = 0.2;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentType {
    #[default]
    All,
    Explanatory,
    Forecasting,
    Baseline,
}

impl ExperimentType {
    pub fn includes(&self, family: ScenarioFamily) -> bool {
        match self {
            ExperimentType::All => true,
            ExperimentType::Explanatory => family == ScenarioFamily::Explanatory,
            ExperimentType::Forecasting => family == ScenarioFamily::Forecasting,
            ExperimentType::Baseline => family == ScenarioFamily::Baseline,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioFamily {
    Explanatory,
    Forecasting,
    Baseline,
}

#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: &'static str,
    pub family: ScenarioFamily,
    pub features: FeatureSet,
}

pub fn scenarios() -> Vec<Scenario> {
    let target = Metric::Gdp;
    vec![
        Scenario {
            name: "Explanatory - All Socio-Demographic",
            family: ScenarioFamily::Explanatory,
            features: FeatureSet::new(
                Metric::ALL
                    .iter()
                    .filter(|metric| **metric != target)
                    .map(|metric| Feature::Raw(*metric))
                    .collect(),
            ),
        },
        Scenario {
            name: "Explanatory - Human Development Focus",
            family: ScenarioFamily::Explanatory,
            features: FeatureSet::new(vec![
                Feature::Raw(Metric::LifeExpectancy),
                Feature::Raw(Metric::InfantMortality),
                Feature::Raw(Metric::Hci),
                Feature::Raw(Metric::Enrollment),
                Feature::Raw(Metric::Internet),
                Feature::HealthIndex,
                Feature::DevelopmentIndex,
            ]),
        },
        Scenario {
            name: "Forecasting - Pure Momentum",
            family: ScenarioFamily::Forecasting,
            features: FeatureSet::new(vec![Feature::Lagged(target)]),
        },
        Scenario {
            name: "Forecasting - Full Model",
            family: ScenarioFamily::Forecasting,
            features: FeatureSet::new(Metric::ALL.iter().map(|m| Feature::Lagged(*m)).collect()),
        },
        Scenario {
            name: "Baseline - Year Only",
            family: ScenarioFamily::Baseline,
            features: FeatureSet::new(vec![Feature::YearNormalized]),
        },
    ]
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ScenarioResult {
    pub scenario: String,
    pub family: ScenarioFamily,
    pub features: Vec<String>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub metrics: BTreeMap<ModelKind, ModelMetrics>,
    pub best_model: ModelKind,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ExperimentReport {
    pub target: Metric,
    pub seed: u64,
    pub observations: usize,
    pub scenarios: Vec<ScenarioResult>,
    /// Model with the most scenario wins, ties going to linear regression.
    pub best_model: ModelKind,
}

/// Every country's year-over-year pairs with the target present. The first
/// year of each country has nothing to lag from and is skipped.
struct Panel {
    rows: Vec<(FilledRecord, FilledRecord)>,
    imputer: Imputer,
    span: YearRange,
}

impl Panel {
    fn build(store: &IndicatorStore, target: Metric) -> DashboardResult<Panel> {
        let imputer = Imputer::from_store(store)?;
        let records = store.records()?;

        let mut rows = Vec::new();
        let mut start = 0;
        while start < records.len() {
            let code = &records[start].country_code;
            let end = records[start..]
                .iter()
                .position(|record| &record.country_code != code)
                .map_or(records.len(), |offset| start + offset);
            let country = &records[start..end];
            let filled = imputer.fill(country);
            for i in 1..filled.len() {
                if target.value_of(&country[i]).map_or(false, f64::is_finite) {
                    rows.push((filled[i - 1].clone(), filled[i].clone()));
                }
            }
            start = end;
        }

        let first = rows.iter().map(|(_, current)| current.year).min();
        let last = rows.iter().map(|(_, current)| current.year).max();
        let span = match (first, last) {
            (Some(start), Some(end)) => YearRange { start, end },
            _ => YearRange { start: 0, end: 0 },
        };
        Ok(Panel { rows, imputer, span })
    }

    fn design(&self, features: &FeatureSet, target: Metric, indices: &[usize]) -> (Array2<f64>, Array1<f64>) {
        let context = FeatureContext {
            imputer: &self.imputer,
            span: self.span,
        };
        let mut x = Array2::<f64>::zeros((indices.len(), features.len()));
        let mut y = Array1::<f64>::zeros(indices.len());
        for (out, &index) in indices.iter().enumerate() {
            let (previous, current) = &self.rows[index];
            let row = FeatureRow { current, previous };
            for (col, value) in features.row(&row, &context).into_iter().enumerate() {
                x[[out, col]] = value;
            }
            y[out] = current.value(target);
        }
        (x, y)
    }
}

fn run_scenario(
    panel: &Panel,
    scenario: &Scenario,
    train: &[usize],
    test: &[usize],
    seed: u64,
) -> DashboardResult<ScenarioResult> {
    let target = Metric::Gdp;
    let (train_x, train_y) = panel.design(&scenario.features, target, train);
    let (test_x, test_y) = panel.design(&scenario.features, target, test);

    let mut rng = StdRng::seed_from_u64(seed);
    let models = FittedModels::fit(train_x.view(), train_y.view(), &BoostingConfig::default(), &mut rng)?;
    let metrics = models.score(test_x.view(), test_y.view());
    let best = best_model(&metrics).unwrap_or(ModelKind::LinearRegression);

    Ok(ScenarioResult {
        scenario: scenario.name.to_string(),
        family: scenario.family,
        features: scenario.features.names(),
        train_rows: train.len(),
        test_rows: test.len(),
        metrics,
        best_model: best,
    })
}

fn overall_best(results: &[ScenarioResult]) -> ModelKind {
    let boosted_wins = results
        .iter()
        .filter(|result| result.best_model == ModelKind::GradientBoosting)
        .count();
    if boosted_wins * 2 > results.len() {
        ModelKind::GradientBoosting
    } else {
        ModelKind::LinearRegression
    }
}

/// Fits both models for every selected scenario on a shared shuffled split.
pub fn run_experiments(
    store: &IndicatorStore,
    experiment_type: ExperimentType,
    seed: u64,
) -> DashboardResult<ExperimentReport> {
    let target = Metric::Gdp;
    let panel = Panel::build(store, target)?;
    let n = panel.rows.len();
    if n < MIN_PANEL_ROWS {
        return Err(DashboardError::InsufficientHistory {
            country_code: "all countries".to_string(),
            available: n,
            required: MIN_PANEL_ROWS,
        });
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));
    let test_len = ((n as f64 * TEST_FRACTION).round() as usize).clamp(1, n - 1);
    let (test, train) = order.split_at(test_len);

    let selected: Vec<Scenario> = scenarios()
        .into_iter()
        .filter(|scenario| experiment_type.includes(scenario.family))
        .collect();
    let results = selected
        .par_iter()
        .map(|scenario| run_scenario(&panel, scenario, train, test, seed))
        .collect::<DashboardResult<Vec<ScenarioResult>>>()?;

    Ok(ExperimentReport {
        target,
        seed,
        observations: n,
        best_model: overall_best(&results),
        scenarios: results,
    })
}
