use crate::api::models::{ChartRequest, ExperimentRequest};
use crate::config::Settings;
use crate::core_logic::metrics::Metric;
use crate::error::{DashboardError, DashboardResult};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    TopN,
    Trend,
    Correlation,
    Distribution,
}

impl ChartKind {
    pub fn name(&self) -> &'static str {
        match self {
            ChartKind::TopN => "top_n",
            ChartKind::Trend => "trend",
            ChartKind::Correlation => "correlation",
            ChartKind::Distribution => "distribution",
        }
    }
}

impl FromStr for ChartKind {
    type Err = DashboardError;

    fn from_str(kind: &str) -> Result<Self, Self::Err> {
        match kind.to_ascii_lowercase().as_str() {
            "bar" | "top_n" | "top_countries" => Ok(ChartKind::TopN),
            "line" | "trend" => Ok(ChartKind::Trend),
            "scatter" | "correlation" => Ok(ChartKind::Correlation),
            "histogram" | "distribution" => Ok(ChartKind::Distribution),
            _ => Err(DashboardError::UnknownChartKind(kind.to_string())),
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw query parameters of a chart request. `metric` and `metrics` may both
/// repeat; their values are merged in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartParams {
    pub metrics: Vec<String>,
    pub year: Option<String>,
    pub limit: Option<String>,
    pub country: Option<String>,
}

impl ChartParams {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut params = ChartParams::default();
        for (key, value) in pairs {
            match key.as_str() {
                "metric" | "metrics" => params.metrics.push(value),
                "year" => params.year = Some(value),
                "limit" => params.limit = Some(value),
                "country" | "country_code" => params.country = Some(value),
                _ => {}
            }
        }
        params
    }
}

pub fn parse_metrics(raw: &[String]) -> DashboardResult<Vec<Metric>> {
    raw.iter()
        .filter(|value| !value.trim().is_empty())
        .map(|value| Metric::from_key(value))
        .collect()
}

pub fn parse_year(raw: Option<&str>, default: i32) -> DashboardResult<i32> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => value
            .parse()
            .map_err(|_| DashboardError::InvalidParameter(format!("year must be an integer, got {:?}", value))),
        None => Ok(default),
    }
}

/// Limits above `max` are capped rather than rejected.
pub fn parse_limit(raw: Option<&str>, default: usize, max: usize) -> DashboardResult<usize> {
    let limit = match raw.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => value
            .parse::<i64>()
            .map_err(|_| DashboardError::InvalidParameter(format!("limit must be an integer, got {:?}", value)))?,
        None => return Ok(default.min(max)),
    };
    if limit <= 0 {
        return Err(DashboardError::InvalidParameter(format!(
            "limit must be positive, got {}",
            limit
        )));
    }
    Ok((limit as usize).min(max))
}

fn single_metric(kind: ChartKind, metrics: &[Metric]) -> DashboardResult<Metric> {
    match metrics {
        [metric] => Ok(*metric),
        [] => Err(DashboardError::InvalidParameter(
            "the metric parameter is required".to_string(),
        )),
        _ => Err(DashboardError::InvalidParameter(format!(
            "{} takes exactly one metric, got {}",
            kind,
            metrics.len()
        ))),
    }
}

/// An empty or `null` body asks for the defaults.
pub fn parse_experiment_request(body: &[u8]) -> DashboardResult<ExperimentRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ExperimentRequest::default());
    }
    serde_json::from_slice::<Option<ExperimentRequest>>(body)
        .map(Option::unwrap_or_default)
        .map_err(|err| DashboardError::InvalidParameter(format!("invalid request body: {}", err)))
}

/// Validates the flat query parameters for `kind` into a typed request.
pub fn build_chart_request(
    kind: &str,
    params: &ChartParams,
    settings: &Settings,
) -> DashboardResult<ChartRequest> {
    let kind: ChartKind = kind.parse()?;
    let metrics = parse_metrics(&params.metrics)?;
    let year = parse_year(params.year.as_deref(), settings.default_chart_year)?;

    match kind {
        ChartKind::TopN => Ok(ChartRequest::TopN {
            metric: single_metric(kind, &metrics)?,
            year,
            limit: parse_limit(
                params.limit.as_deref(),
                settings.default_chart_limit,
                settings.max_chart_limit,
            )?,
        }),
        ChartKind::Trend => Ok(ChartRequest::Trend {
            metric: single_metric(kind, &metrics)?,
            country_code: params
                .country
                .as_deref()
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map(str::to_string),
        }),
        ChartKind::Correlation => match metrics.as_slice() {
            [a, b] if a != b => Ok(ChartRequest::Correlation {
                metrics: (*a, *b),
                year,
            }),
            [_, _] => Err(DashboardError::InvalidParameter(
                "correlation needs two different metrics".to_string(),
            )),
            _ => Err(DashboardError::InvalidParameter(format!(
                "correlation needs exactly two metrics, got {}",
                metrics.len()
            ))),
        },
        ChartKind::Distribution => Ok(ChartRequest::Distribution {
            metric: single_metric(kind, &metrics)?,
            year,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::EvaluationMetric;

    fn pairs(items: &[(&str, &str)]) -> ChartParams {
        ChartParams::from_pairs(
            items
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_chart_kind_aliases() {
        assert_eq!("bar".parse::<ChartKind>().unwrap(), ChartKind::TopN);
        assert_eq!("top_countries".parse::<ChartKind>().unwrap(), ChartKind::TopN);
        assert_eq!("line".parse::<ChartKind>().unwrap(), ChartKind::Trend);
        assert_eq!("scatter".parse::<ChartKind>().unwrap(), ChartKind::Correlation);
        assert_eq!("histogram".parse::<ChartKind>().unwrap(), ChartKind::Distribution);
        assert!(matches!(
            "pie".parse::<ChartKind>(),
            Err(DashboardError::UnknownChartKind(kind)) if kind == "pie"
        ));
    }

    #[test]
    fn test_top_n_defaults() {
        let settings = Settings::default();
        let request = build_chart_request("bar", &pairs(&[("metric", "gdp")]), &settings).unwrap();
        assert_eq!(
            request,
            ChartRequest::TopN {
                metric: Metric::Gdp,
                year: 2020,
                limit: 10
            }
        );
    }

    #[test]
    fn test_limit_validation() {
        assert_eq!(parse_limit(Some("500"), 10, 200).unwrap(), 200);
        assert_eq!(parse_limit(Some("3"), 10, 200).unwrap(), 3);
        assert!(parse_limit(Some("0"), 10, 200).is_err());
        assert!(parse_limit(Some("-2"), 10, 200).is_err());
        assert!(parse_limit(Some("ten"), 10, 200).is_err());
    }

    #[test]
    fn test_year_must_be_integer() {
        assert_eq!(parse_year(Some(" 2019 "), 2020).unwrap(), 2019);
        assert!(matches!(
            parse_year(Some("2019.5"), 2020),
            Err(DashboardError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_correlation_needs_two_distinct_metrics() {
        let settings = Settings::default();
        let ok = build_chart_request(
            "scatter",
            &pairs(&[("metric", "gdp"), ("metrics", "life_expectancy"), ("year", "2021")]),
            &settings,
        )
        .unwrap();
        assert_eq!(
            ok,
            ChartRequest::Correlation {
                metrics: (Metric::Gdp, Metric::LifeExpectancy),
                year: 2021
            }
        );

        for params in [
            pairs(&[("metric", "gdp")]),
            pairs(&[("metric", "gdp"), ("metric", "gdp")]),
            pairs(&[("metric", "gdp"), ("metric", "hci"), ("metric", "internet")]),
        ] {
            assert!(matches!(
                build_chart_request("scatter", &params, &settings),
                Err(DashboardError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn test_missing_or_unknown_metric() {
        let settings = Settings::default();
        assert!(matches!(
            build_chart_request("histogram", &pairs(&[("year", "2020")]), &settings),
            Err(DashboardError::InvalidParameter(_))
        ));
        assert!(matches!(
            build_chart_request("histogram", &pairs(&[("metric", "happiness")]), &settings),
            Err(DashboardError::InvalidMetric(_))
        ));
    }

    #[test]
    fn test_single_metric_charts_reject_extra_metrics() {
        let settings = Settings::default();
        for kind in ["bar", "line", "histogram"] {
            let result = build_chart_request(
                kind,
                &pairs(&[("metric", "gdp"), ("metric", "hci")]),
                &settings,
            );
            assert!(
                matches!(&result, Err(DashboardError::InvalidParameter(message)) if message.contains("exactly one")),
                "{}: {:?}",
                kind,
                result
            );
        }
    }

    #[test]
    fn test_experiment_body_defaults() {
        let bodies: [&[u8]; 4] = [b"", b"  \n", b"null", b"{}"];
        for body in bodies {
            assert_eq!(parse_experiment_request(body).unwrap(), ExperimentRequest::default());
        }
        let request = parse_experiment_request(br#"{"metric": "r2", "seed": 7}"#).unwrap();
        assert_eq!(request.metric, EvaluationMetric::R2);
        assert_eq!(request.seed, Some(7));
        assert!(matches!(
            parse_experiment_request(b"{not json"),
            Err(DashboardError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_trend_with_country() {
        let settings = Settings::default();
        let request = build_chart_request(
            "line",
            &pairs(&[("metric", "internet_pct"), ("country", " FRA ")]),
            &settings,
        )
        .unwrap();
        assert_eq!(
            request,
            ChartRequest::Trend {
                metric: Metric::Internet,
                country_code: Some("FRA".to_string())
            }
        );
    }
}
