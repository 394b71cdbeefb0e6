#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use indicator_dashboard::config::Settings;
use indicator_dashboard::core_logic::data_processing::IndicatorStore;
use indicator_dashboard::core_logic::forecasting::evaluation::ModelKind;
use indicator_dashboard::core_logic::forecasting::experiments::{
    run_experiments, ExperimentReport, ExperimentType, DEFAULT_EXPERIMENT_SEED,
};
use indicator_dashboard::database::queries::fetch_records::fetch_indicator_records;
use indicator_dashboard::error::{DashboardError, DashboardResult};
use indicator_dashboard::telemetry;
use rayon::ThreadPoolBuilder;
use std::env;
use std::fs::OpenOptions;
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info};

const RESULTS_FILE: &str = "experiment_results.csv";
const HEADER: [&str; 8] = [
    "timestamp",
    "scenario",
    "observations",
    "linear_regression_rmse",
    "linear_regression_r2",
    "gradient_boosting_rmse",
    "gradient_boosting_r2",
    "best_model",
];

fn csv_error(err: csv::Error) -> DashboardError {
    DashboardError::Config(format!("could not write {}: {}", RESULTS_FILE, err))
}

/// Appends one row per scenario, writing the header when the file is new.
fn append_results(path: &Path, report: &ExperimentReport) -> DashboardResult<()> {
    let is_new = !path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| DashboardError::Config(format!("could not open {}: {}", path.display(), err)))?;
    let mut writer = csv::Writer::from_writer(file);
    if is_new {
        writer.write_record(HEADER).map_err(csv_error)?;
    }

    let timestamp = chrono::Utc::now().to_rfc3339();
    for scenario in &report.scenarios {
        let metric = |kind: ModelKind| scenario.metrics.get(&kind).copied();
        let linear = metric(ModelKind::LinearRegression);
        let boosted = metric(ModelKind::GradientBoosting);
        writer
            .write_record([
                timestamp.clone(),
                scenario.scenario.clone(),
                report.observations.to_string(),
                linear.map(|m| m.rmse.to_string()).unwrap_or_default(),
                linear.map(|m| m.r_squared.to_string()).unwrap_or_default(),
                boosted.map(|m| m.rmse.to_string()).unwrap_or_default(),
                boosted.map(|m| m.r_squared.to_string()).unwrap_or_default(),
                scenario.best_model.label().to_string(),
            ])
            .map_err(csv_error)?;
    }
    writer
        .flush()
        .map_err(|err| DashboardError::Config(format!("could not flush {}: {}", RESULTS_FILE, err)))
}

fn run() -> DashboardResult<()> {
    let settings = Settings::from_env()?;
    telemetry::init(&settings);

    let seed = match env::var("EXPERIMENT_SEED") {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| DashboardError::Config(format!("EXPERIMENT_SEED must be an integer, got {:?}", raw)))?,
        Err(_) => DEFAULT_EXPERIMENT_SEED,
    };

    let now = Instant::now();
    let records = fetch_indicator_records(settings.database_url()?)?;
    let store = IndicatorStore::from_records(records)?;
    info!(
        records = store.len(),
        elapsed_ms = now.elapsed().as_millis() as u64,
        "finished loading data"
    );

    let pool = ThreadPoolBuilder::new()
        .stack_size(32 * 1024 * 1024) // 32 MB
        .build()
        .map_err(|err| DashboardError::Config(format!("could not build thread pool: {}", err)))?;

    let report = pool.install(|| run_experiments(&store, ExperimentType::All, seed))?;
    for scenario in &report.scenarios {
        info!(
            scenario = %scenario.scenario,
            best_model = %scenario.best_model,
            "scenario finished"
        );
    }
    info!(
        scenarios = report.scenarios.len(),
        best_model = %report.best_model,
        elapsed_ms = now.elapsed().as_millis() as u64,
        "finished experiments"
    );

    append_results(Path::new(RESULTS_FILE), &report)
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "experiment run failed");
            eprintln!("{}", err);
            ExitCode::FAILURE
        }
    }
}
