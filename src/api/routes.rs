use crate::api::chart_service::chart_data;
use crate::api::lib::{build_chart_request, parse_experiment_request, parse_metrics, parse_year, ChartParams};
use crate::api::models::{ErrorBody, ExperimentRequest, ExperimentResponse, HealthResponse, YearBounds};
use crate::config::Settings;
use crate::core_logic::data_processing::IndicatorStore;
use crate::core_logic::forecasting::experiments::{run_experiments, DEFAULT_EXPERIMENT_SEED};
use crate::core_logic::forecasting::forecast::{run_forecast, ForecastRequest};
use crate::core_logic::metrics::Metric;
use crate::error::{DashboardError, DashboardResult};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

const BODY_LIMIT: u64 = 64 * 1024;

const MATRIX_METRICS: [Metric; 5] = [
    Metric::Gdp,
    Metric::LifeExpectancy,
    Metric::Internet,
    Metric::Enrollment,
    Metric::UrbanPop,
];

#[derive(Debug)]
struct BodyTooLarge;

impl warp::reject::Reject for BodyTooLarge {}

/// Raw body capped at `BODY_LIMIT`. Unlike `content_length_limit`, a request
/// without a Content-Length header is accepted.
fn limited_body() -> impl Filter<Extract = (Bytes,), Error = Rejection> + Clone {
    warp::header::optional::<u64>("content-length")
        .and_then(|length: Option<u64>| async move {
            match length {
                Some(length) if length > BODY_LIMIT => Err(warp::reject::custom(BodyTooLarge)),
                _ => Ok::<(), Rejection>(()),
            }
        })
        .untuple_one()
        .and(warp::body::bytes())
}

fn with_store(
    store: Arc<IndicatorStore>,
) -> impl Filter<Extract = (Arc<IndicatorStore>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&store))
}

fn with_settings(
    settings: Arc<Settings>,
) -> impl Filter<Extract = (Arc<Settings>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&settings))
}

fn error_reply(err: &DashboardError) -> Response {
    let status = err.status();
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %err, "request failed");
    } else {
        warn!(error = %err, status = status.as_u16(), "request rejected");
    }
    warp::reply::with_status(
        warp::reply::json(&ErrorBody {
            error: err.client_message(),
        }),
        status,
    )
    .into_response()
}

fn respond<T: Serialize>(result: DashboardResult<T>) -> Response {
    match result {
        Ok(body) => warp::reply::json(&body).into_response(),
        Err(err) => error_reply(&err),
    }
}

/// Runs CPU-bound work off the async workers.
async fn run_blocking<T, F>(work: F) -> DashboardResult<T>
where
    F: FnOnce() -> DashboardResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| DashboardError::Model(format!("background task failed: {}", err)))?
}

async fn chart_handler(
    kind: String,
    pairs: Vec<(String, String)>,
    store: Arc<IndicatorStore>,
    settings: Arc<Settings>,
) -> Result<Response, Infallible> {
    let params = ChartParams::from_pairs(pairs);
    let result = build_chart_request(&kind, &params, &settings)
        .and_then(|request| chart_data(&store, &request));
    Ok(respond(result))
}

async fn experiments_handler(
    body: Bytes,
    store: Arc<IndicatorStore>,
    settings: Arc<Settings>,
) -> Result<Response, Infallible> {
    let request: ExperimentRequest = match parse_experiment_request(&body) {
        Ok(request) => request,
        Err(err) => return Ok(error_reply(&err)),
    };
    info!(
        experiment_type = ?request.experiment_type,
        metric = ?request.metric,
        "model experimentation requested"
    );
    let result = run_blocking(move || {
        let started = Instant::now();
        let seed = request.seed.unwrap_or(DEFAULT_EXPERIMENT_SEED);
        let report = run_experiments(&store, request.experiment_type, seed)?;
        let forecast = request
            .forecast
            .as_ref()
            .map(|forecast| run_forecast(&store, forecast, settings.min_forecast_history))
            .transpose()?;
        let elapsed = started.elapsed().as_millis();
        info!(
            scenarios = report.scenarios.len(),
            elapsed_ms = elapsed as u64,
            best_model = %report.best_model,
            "model experimentation completed"
        );
        Ok(ExperimentResponse::new(&report, request.metric, forecast, elapsed))
    })
    .await;
    Ok(respond(result))
}

async fn forecast_handler(
    request: ForecastRequest,
    store: Arc<IndicatorStore>,
    settings: Arc<Settings>,
) -> Result<Response, Infallible> {
    let result = run_blocking(move || {
        let forecast = run_forecast(&store, &request, settings.min_forecast_history)?;
        info!(
            country = %forecast.country_code,
            target = %forecast.target,
            years = request.forecast_years.len(),
            best_model = %forecast.best_model,
            "forecast completed"
        );
        Ok(forecast)
    })
    .await;
    Ok(respond(result))
}

async fn country_data_handler(
    country_code: String,
    bounds: YearBounds,
    store: Arc<IndicatorStore>,
) -> Result<Response, Infallible> {
    let result = (|| {
        if let (Some(start), Some(end)) = (bounds.start_year, bounds.end_year) {
            if start > end {
                return Err(DashboardError::InvalidParameter(format!(
                    "start_year {} is after end_year {}",
                    start, end
                )));
            }
        }
        if !store.has_country(&country_code)? {
            return Err(DashboardError::CountryNotFound(country_code.clone()));
        }
        store.country_records(&country_code, bounds.start_year, bounds.end_year)
    })();
    Ok(respond(result))
}

async fn correlation_matrix_handler(
    pairs: Vec<(String, String)>,
    store: Arc<IndicatorStore>,
) -> Result<Response, Infallible> {
    let params = ChartParams::from_pairs(pairs);
    let result = (|| {
        let mut metrics = parse_metrics(&params.metrics)?;
        if metrics.is_empty() {
            metrics = MATRIX_METRICS.to_vec();
        }
        let year = match params.year.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => Some(parse_year(Some(raw), 0)?),
            None => None,
        };
        store.correlation_matrix(&metrics, year)
    })();
    Ok(respond(result))
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(cause) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", cause))
    } else if let Some(cause) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, format!("Invalid query: {}", cause))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() || err.find::<BodyTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large".to_string())
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "Content-Length header is required".to_string())
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, "Expected a JSON body".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        error!(rejection = ?err, "unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorBody { error: message }),
        status,
    ))
}

pub fn routes(
    store: Arc<IndicatorStore>,
    settings: Arc<Settings>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let chart_route = warp::path!("api" / "chart-data" / String)
        .and(warp::get())
        .and(warp::query::<Vec<(String, String)>>())
        .and(with_store(store.clone()))
        .and(with_settings(settings.clone()))
        .and_then(chart_handler);

    let experiments_route = warp::path!("api" / "run-experiments")
        .and(warp::post())
        .and(limited_body())
        .and(with_store(store.clone()))
        .and(with_settings(settings.clone()))
        .and_then(experiments_handler);

    let forecast_route = warp::path!("api" / "forecast")
        .and(warp::post())
        .and(warp::body::content_length_limit(BODY_LIMIT))
        .and(warp::body::json::<ForecastRequest>())
        .and(with_store(store.clone()))
        .and(with_settings(settings.clone()))
        .and_then(forecast_handler);

    let stats_route = warp::path!("api" / "stats")
        .and(warp::get())
        .and(with_store(store.clone()))
        .map(|store: Arc<IndicatorStore>| respond(store.summary()));

    let countries_route = warp::path!("api" / "countries")
        .and(warp::get())
        .and(with_store(store.clone()))
        .map(|store: Arc<IndicatorStore>| respond(store.countries()));

    let country_data_route = warp::path!("api" / "data" / String)
        .and(warp::get())
        .and(warp::query::<YearBounds>())
        .and(with_store(store.clone()))
        .and_then(country_data_handler);

    let metrics_route = warp::path!("api" / "metrics")
        .and(warp::get())
        .map(|| warp::reply::json(&Metric::registry()).into_response());

    let matrix_route = warp::path!("api" / "correlation-matrix")
        .and(warp::get())
        .and(warp::query::<Vec<(String, String)>>())
        .and(with_store(store.clone()))
        .and_then(correlation_matrix_handler);

    let health_route = warp::path!("health")
        .and(warp::get())
        .and(with_store(store))
        .map(|store: Arc<IndicatorStore>| {
            warp::reply::json(&HealthResponse {
                status: "ok".to_string(),
                records: store.len(),
                timestamp: chrono::Utc::now().to_rfc3339(),
            })
            .into_response()
        });

    chart_route
        .or(experiments_route)
        .unify()
        .or(forecast_route)
        .unify()
        .or(stats_route)
        .unify()
        .or(countries_route)
        .unify()
        .or(country_data_route)
        .unify()
        .or(metrics_route)
        .unify()
        .or(matrix_route)
        .unify()
        .or(health_route)
        .unify()
        .recover(handle_rejection)
        .with(warp::trace::request())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_logic::data_processing::IndicatorRecord;
    use serde_json::Value;

    fn store() -> Arc<IndicatorStore> {
        let mut records = vec![
            IndicatorRecord::new("A", 2020).with(Metric::Gdp, 50000.0),
            IndicatorRecord::new("B", 2020),
            IndicatorRecord::new("C", 2020).with(Metric::Gdp, 30000.0),
            IndicatorRecord::new("D", 2020).with(Metric::Gdp, 70000.0),
            IndicatorRecord::new("E", 2021)
                .with(Metric::Gdp, f64::NAN)
                .with(Metric::LifeExpectancy, 71.0),
            IndicatorRecord::new("TWO", 2019).with(Metric::Gdp, 900.0),
            IndicatorRecord::new("TWO", 2020).with(Metric::Gdp, 950.0),
        ];
        for (c, code) in ["P", "Q", "R"].iter().enumerate() {
            for year in 2010..2019 {
                let t = f64::from(year - 2010);
                records.push(
                    IndicatorRecord::new(*code, year)
                        .with(Metric::Gdp, 8000.0 * (1.0 + c as f64) + 400.0 * t)
                        .with(Metric::LifeExpectancy, 65.0 + c as f64 + 0.3 * t)
                        .with(Metric::Internet, 20.0 + 4.0 * t)
                        .with(Metric::Enrollment, 85.0 + c as f64)
                        .with(Metric::UrbanPop, 50.0 + t),
                );
            }
        }
        Arc::new(IndicatorStore::from_records(records).unwrap())
    }

    fn api() -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
        routes(store(), Arc::new(Settings::default()))
    }

    fn body(response: &warp::http::Response<warp::hyper::body::Bytes>) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[tokio::test]
    async fn test_top_n_chart() {
        let response = warp::test::request()
            .path("/api/chart-data/bar?metric=gdp&year=2020&limit=3")
            .reply(&api())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body(&response);
        let codes: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row["country_code"].as_str().unwrap())
            .collect();
        assert_eq!(codes, vec!["D", "A", "C"]);
    }

    #[tokio::test]
    async fn test_unknown_chart_kind_is_bad_request() {
        let response = warp::test::request()
            .path("/api/chart-data/pie?metric=gdp")
            .reply(&api())
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(&response)["error"], "Unknown chart type: pie");
    }

    #[tokio::test]
    async fn test_missing_metric_and_bad_year() {
        let api = api();
        let response = warp::test::request()
            .path("/api/chart-data/histogram?year=2020")
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body(&response)["error"].is_string());

        let response = warp::test::request()
            .path("/api/chart-data/histogram?metric=gdp&year=twenty")
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_scatter_never_emits_nan() {
        let response = warp::test::request()
            .path("/api/chart-data/scatter?metric=gdp&metric=life_expectancy&year=2021")
            .reply(&api())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(&response), serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_forecast_with_two_records_is_unprocessable() {
        let response = warp::test::request()
            .method("POST")
            .path("/api/forecast")
            .json(&serde_json::json!({"country_code": "TWO", "forecast_years": [2021]}))
            .reply(&api())
            .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let message = body(&response)["error"].as_str().unwrap().to_string();
        assert!(message.contains("TWO"));
    }

    #[tokio::test]
    async fn test_forecast_success() {
        let response = warp::test::request()
            .method("POST")
            .path("/api/forecast")
            .json(&serde_json::json!({
                "country_code": "P",
                "forecast_years": [2019, 2020],
                "seed": 3
            }))
            .reply(&api())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body(&response);
        assert_eq!(json["forecasts"]["linear_regression"].as_array().unwrap().len(), 2);
        assert_eq!(json["forecasts"]["gradient_boosting"].as_array().unwrap().len(), 2);
        assert!(json["recommendation"].is_string());
    }

    #[tokio::test]
    async fn test_run_experiments() {
        let response = warp::test::request()
            .method("POST")
            .path("/api/run-experiments")
            .json(&serde_json::json!({"experiment_type": "forecasting", "metric": "rmse"}))
            .reply(&api())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body(&response);
        assert_eq!(json["success"], true);
        assert_eq!(json["results"].as_array().unwrap().len(), 2);
        assert!(json["results"][0].get("linear_regression_r2").is_none());
        assert!(json["charts"]["rmse_comparison"].is_object());
        assert!(json["charts"].get("r2_comparison").is_none());
    }

    #[tokio::test]
    async fn test_run_experiments_without_body_uses_defaults() {
        let response = warp::test::request()
            .method("POST")
            .path("/api/run-experiments")
            .reply(&api())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body(&response);
        assert_eq!(json["results"].as_array().unwrap().len(), 5);
        assert!(json["charts"]["rmse_comparison"].is_object());
        assert!(json["charts"]["r2_comparison"].is_object());
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let response = warp::test::request()
            .method("POST")
            .path("/api/run-experiments")
            .header("content-length", (BODY_LIMIT + 1).to_string())
            .reply(&api())
            .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body(&response)["error"].is_string());
    }

    #[tokio::test]
    async fn test_malformed_body_is_json_error() {
        let response = warp::test::request()
            .method("POST")
            .path("/api/run-experiments")
            .header("content-type", "application/json")
            .body("{not json")
            .reply(&api())
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body(&response)["error"].is_string());
    }

    #[tokio::test]
    async fn test_country_data_and_unknown_country() {
        let api = api();
        let response = warp::test::request()
            .path("/api/data/P?start_year=2012&end_year=2014")
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let years: Vec<i64> = body(&response)
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row["year"].as_i64().unwrap())
            .collect();
        assert_eq!(years, vec![2012, 2013, 2014]);

        let response = warp::test::request().path("/api/data/ZZZ").reply(&api).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(&response)["error"], "Country not found: ZZZ");
    }

    #[tokio::test]
    async fn test_stats_metrics_and_health() {
        let api = api();
        let stats = warp::test::request().path("/api/stats").reply(&api).await;
        assert_eq!(stats.status(), StatusCode::OK);
        assert_eq!(body(&stats)["total_records"], 34);

        let metrics = warp::test::request().path("/api/metrics").reply(&api).await;
        assert_eq!(body(&metrics).as_array().unwrap().len(), Metric::ALL.len());

        let health = warp::test::request().path("/health").reply(&api).await;
        let json = body(&health);
        assert_eq!(json["status"], "ok");
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_correlation_matrix_defaults() {
        let response = warp::test::request()
            .path("/api/correlation-matrix")
            .reply(&api())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body(&response);
        assert_eq!(json["metrics"].as_array().unwrap().len(), 5);
        assert_eq!(json["observations"], 27);
    }

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let response = warp::test::request().path("/api/nowhere").reply(&api()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(&response)["error"], "Not found");
    }
}
