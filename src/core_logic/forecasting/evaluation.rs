use crate::core_logic::forecasting::boosting::{BoostingConfig, GradientBoosting};
use crate::core_logic::forecasting::linear::LinearRegression;
use crate::error::DashboardResult;
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    LinearRegression,
    GradientBoosting,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::LinearRegression, ModelKind::GradientBoosting];

    pub fn label(&self) -> &'static str {
        match self {
            ModelKind::LinearRegression => "Linear Regression",
            ModelKind::GradientBoosting => "Gradient Boosted Trees",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct ModelMetrics {
    pub rmse: f64,
    pub r_squared: f64,
}

impl ModelMetrics {
    pub fn score(actual: &[f64], predicted: &[f64]) -> ModelMetrics {
        ModelMetrics {
            rmse: rmse(actual, predicted),
            r_squared: r_squared(actual, predicted),
        }
    }
}

/// Both regressors fitted on the same design matrix.
#[derive(Debug, Clone)]
pub struct FittedModels {
    linear: LinearRegression,
    boosted: GradientBoosting,
}

impl FittedModels {
    pub fn fit<R: Rng + ?Sized>(
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        config: &BoostingConfig,
        rng: &mut R,
    ) -> DashboardResult<Self> {
        Ok(FittedModels {
            linear: LinearRegression::fit(x, y)?,
            boosted: GradientBoosting::fit(x, y, config, rng)?,
        })
    }

    pub fn predict(&self, kind: ModelKind, x: ArrayView2<f64>) -> Array1<f64> {
        match kind {
            ModelKind::LinearRegression => self.linear.predict(x),
            ModelKind::GradientBoosting => self.boosted.predict(x),
        }
    }

    /// Scores both models against rows they were not fitted on.
    pub fn score(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
    ) -> BTreeMap<ModelKind, ModelMetrics> {
        let actual = y.to_vec();
        ModelKind::ALL
            .iter()
            .map(|kind| {
                let predicted = self.predict(*kind, x).to_vec();
                (*kind, ModelMetrics::score(&actual, &predicted))
            })
            .collect()
    }
}

pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    let sse: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    (sse / n as f64).sqrt()
}

/// Coefficient of determination. A constant target scores 1 when predicted
/// exactly and 0 otherwise.
pub fn r_squared(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    let mean = actual[..n].iter().sum::<f64>() / n as f64;
    let ss_tot: f64 = actual[..n].iter().map(|a| (a - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Lowest held-out RMSE wins. Near-equal scores go to the linear model.
pub fn best_model(metrics: &BTreeMap<ModelKind, ModelMetrics>) -> Option<ModelKind> {
    let linear = metrics.get(&ModelKind::LinearRegression);
    let boosted = metrics.get(&ModelKind::GradientBoosting);
    match (linear, boosted) {
        (Some(linear), Some(boosted)) => {
            let tolerance = 1e-9 * linear.rmse.abs().max(boosted.rmse.abs()).max(1.0);
            if boosted.rmse < linear.rmse - tolerance {
                Some(ModelKind::GradientBoosting)
            } else {
                Some(ModelKind::LinearRegression)
            }
        }
        (Some(_), None) => Some(ModelKind::LinearRegression),
        (None, Some(_)) => Some(ModelKind::GradientBoosting),
        (None, None) => None,
    }
}

pub fn recommendation(best: ModelKind, metrics: &BTreeMap<ModelKind, ModelMetrics>) -> String {
    match metrics.get(&best) {
        Some(scores) => format!(
            "{} is recommended: lowest held-out RMSE ({:.2}) with R\u{b2} {:.3}.",
            best, scores.rmse, scores.r_squared
        ),
        None => format!("{} is recommended.", best),
    }
}
