use crate::core_logic::forecasting::evaluation::{ModelKind, ModelMetrics};
use crate::core_logic::forecasting::experiments::{
    ExperimentReport, ExperimentType, ScenarioFamily, ScenarioResult,
};
use crate::core_logic::forecasting::forecast::{ForecastRequest, ForecastResult};
use crate::core_logic::metrics::Metric;
use serde::{Deserialize, Serialize};

/// A validated chart query, one variant per chart kind.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChartRequest {
    TopN {
        metric: Metric,
        year: i32,
        limit: usize,
    },
    Trend {
        metric: Metric,
        country_code: Option<String>,
    },
    Correlation {
        metrics: (Metric, Metric),
        year: i32,
    },
    Distribution {
        metric: Metric,
        year: i32,
    },
}

impl ChartRequest {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ChartRequest::TopN { .. } => "top_n",
            ChartRequest::Trend { .. } => "trend",
            ChartRequest::Correlation { .. } => "correlation",
            ChartRequest::Distribution { .. } => "distribution",
        }
    }

    pub fn metrics(&self) -> Vec<Metric> {
        match self {
            ChartRequest::TopN { metric, .. }
            | ChartRequest::Trend { metric, .. }
            | ChartRequest::Distribution { metric, .. } => vec![*metric],
            ChartRequest::Correlation { metrics, .. } => vec![metrics.0, metrics.1],
        }
    }

    pub fn year(&self) -> Option<i32> {
        match self {
            ChartRequest::TopN { year, .. }
            | ChartRequest::Correlation { year, .. }
            | ChartRequest::Distribution { year, .. } => Some(*year),
            ChartRequest::Trend { .. } => None,
        }
    }

    pub fn limit(&self) -> Option<usize> {
        match self {
            ChartRequest::TopN { limit, .. } => Some(*limit),
            _ => None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct HealthResponse {
    pub status: String,
    pub records: usize,
    pub timestamp: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default)]
pub struct YearBounds {
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationMetric {
    Rmse,
    R2,
    #[default]
    Both,
}

impl EvaluationMetric {
    pub fn shows_rmse(&self) -> bool {
        matches!(self, EvaluationMetric::Rmse | EvaluationMetric::Both)
    }

    pub fn shows_r2(&self) -> bool {
        matches!(self, EvaluationMetric::R2 | EvaluationMetric::Both)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct ExperimentRequest {
    #[serde(default)]
    pub experiment_type: ExperimentType,
    #[serde(default)]
    pub metric: EvaluationMetric,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub forecast: Option<ForecastRequest>,
}

/// One row of the results table. Columns the caller did not ask for are
/// left out of the JSON.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub scenario: String,
    pub family: ScenarioFamily,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linear_regression_rmse: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gradient_boosting_rmse: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linear_regression_r2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gradient_boosting_r2: Option<f64>,
    pub best_model: ModelKind,
}

impl ResultRow {
    pub fn from_scenario(result: &ScenarioResult, metric: EvaluationMetric) -> Self {
        let pick = |kind: ModelKind, read: fn(&ModelMetrics) -> f64, shown: bool| {
            if shown {
                result.metrics.get(&kind).map(read)
            } else {
                None
            }
        };
        ResultRow {
            scenario: result.scenario.clone(),
            family: result.family,
            linear_regression_rmse: pick(ModelKind::LinearRegression, |m| m.rmse, metric.shows_rmse()),
            gradient_boosting_rmse: pick(ModelKind::GradientBoosting, |m| m.rmse, metric.shows_rmse()),
            linear_regression_r2: pick(ModelKind::LinearRegression, |m| m.r_squared, metric.shows_r2()),
            gradient_boosting_r2: pick(ModelKind::GradientBoosting, |m| m.r_squared, metric.shows_r2()),
            best_model: result.best_model,
        }
    }
}

/// Side-by-side bars for one metric, one entry per scenario.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ComparisonSeries {
    pub labels: Vec<String>,
    pub linear_regression: Vec<f64>,
    pub gradient_boosting: Vec<f64>,
}

impl ComparisonSeries {
    fn build(scenarios: &[ScenarioResult], read: fn(&ModelMetrics) -> f64) -> Self {
        let value = |result: &ScenarioResult, kind: ModelKind| {
            result.metrics.get(&kind).map(read).unwrap_or(0.0)
        };
        ComparisonSeries {
            labels: scenarios.iter().map(|s| s.scenario.clone()).collect(),
            linear_regression: scenarios
                .iter()
                .map(|s| value(s, ModelKind::LinearRegression))
                .collect(),
            gradient_boosting: scenarios
                .iter()
                .map(|s| value(s, ModelKind::GradientBoosting))
                .collect(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct ExperimentCharts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rmse_comparison: Option<ComparisonSeries>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r2_comparison: Option<ComparisonSeries>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ExperimentSummary {
    pub scenarios_run: usize,
    pub observations: usize,
    pub seed: u64,
    pub best_model_label: String,
    pub execution_time_ms: u128,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ExperimentResponse {
    pub success: bool,
    pub message: String,
    pub results: Vec<ResultRow>,
    pub best_model: ModelKind,
    pub summary: ExperimentSummary,
    pub charts: ExperimentCharts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast: Option<ForecastResult>,
}

impl ExperimentResponse {
    pub fn new(
        report: &ExperimentReport,
        metric: EvaluationMetric,
        forecast: Option<ForecastResult>,
        execution_time_ms: u128,
    ) -> Self {
        let charts = ExperimentCharts {
            rmse_comparison: metric
                .shows_rmse()
                .then(|| ComparisonSeries::build(&report.scenarios, |m| m.rmse)),
            r2_comparison: metric
                .shows_r2()
                .then(|| ComparisonSeries::build(&report.scenarios, |m| m.r_squared)),
        };
        ExperimentResponse {
            success: true,
            message: format!("{} experiment scenarios completed", report.scenarios.len()),
            results: report
                .scenarios
                .iter()
                .map(|result| ResultRow::from_scenario(result, metric))
                .collect(),
            best_model: report.best_model,
            summary: ExperimentSummary {
                scenarios_run: report.scenarios.len(),
                observations: report.observations,
                seed: report.seed,
                best_model_label: report.best_model.label().to_string(),
                execution_time_ms,
            },
            charts,
            forecast,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn scenario() -> ScenarioResult {
        let mut metrics = BTreeMap::new();
        metrics.insert(ModelKind::LinearRegression, ModelMetrics { rmse: 120.0, r_squared: 0.8 });
        metrics.insert(ModelKind::GradientBoosting, ModelMetrics { rmse: 100.0, r_squared: 0.85 });
        ScenarioResult {
            scenario: "Baseline - Year Only".to_string(),
            family: ScenarioFamily::Baseline,
            features: vec!["year_normalized".to_string()],
            train_rows: 8,
            test_rows: 2,
            metrics,
            best_model: ModelKind::GradientBoosting,
        }
    }

    #[test]
    fn test_result_row_keeps_only_requested_metric() {
        let row = ResultRow::from_scenario(&scenario(), EvaluationMetric::Rmse);
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["linear_regression_rmse"], 120.0);
        assert_eq!(json["gradient_boosting_rmse"], 100.0);
        assert!(json.get("linear_regression_r2").is_none());
        assert_eq!(json["best_model"], "gradient_boosting");
    }

    #[test]
    fn test_experiment_request_defaults() {
        let request: ExperimentRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.experiment_type, ExperimentType::All);
        assert_eq!(request.metric, EvaluationMetric::Both);
        assert!(request.forecast.is_none());

        let request: ExperimentRequest =
            serde_json::from_str(r#"{"experiment_type": "baseline", "metric": "r2"}"#).unwrap();
        assert_eq!(request.experiment_type, ExperimentType::Baseline);
        assert_eq!(request.metric, EvaluationMetric::R2);
    }

    #[test]
    fn test_response_charts_follow_metric() {
        let report = ExperimentReport {
            target: Metric::Gdp,
            seed: 42,
            observations: 10,
            scenarios: vec![scenario()],
            best_model: ModelKind::GradientBoosting,
        };
        let response = ExperimentResponse::new(&report, EvaluationMetric::R2, None, 5);
        assert!(response.charts.rmse_comparison.is_none());
        let r2 = response.charts.r2_comparison.unwrap();
        assert_eq!(r2.labels, vec!["Baseline - Year Only".to_string()]);
        assert_eq!(r2.gradient_boosting, vec![0.85]);
        assert_eq!(response.summary.best_model_label, "Gradient Boosted Trees");
    }

    #[test]
    fn test_chart_request_accessors() {
        let request = ChartRequest::Correlation {
            metrics: (Metric::Gdp, Metric::Hci),
            year: 2021,
        };
        assert_eq!(request.kind_name(), "correlation");
        assert_eq!(request.metrics(), vec![Metric::Gdp, Metric::Hci]);
        assert_eq!(request.year(), Some(2021));
        assert_eq!(request.limit(), None);
    }
}
