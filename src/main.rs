#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use indicator_dashboard::api::routes::routes;
use indicator_dashboard::config::Settings;
use indicator_dashboard::core_logic::data_processing::IndicatorStore;
use indicator_dashboard::database::queries::fetch_records::fetch_indicator_records;
use indicator_dashboard::error::DashboardResult;
use indicator_dashboard::telemetry;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

fn load_store(settings: &Settings) -> DashboardResult<IndicatorStore> {
    let now = Instant::now();
    let records = fetch_indicator_records(settings.database_url()?)?;
    let store = IndicatorStore::from_records(records)?;
    info!(
        records = store.len(),
        elapsed_ms = now.elapsed().as_millis() as u64,
        "indicator store loaded"
    );
    Ok(store)
}

#[tokio::main]
async fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };
    telemetry::init(&settings);
    info!(env = ?settings.app_env, "starting set up");

    let store = match tokio::task::spawn_blocking({
        let settings = settings.clone();
        move || load_store(&settings)
    })
    .await
    {
        Ok(Ok(store)) => store,
        Ok(Err(err)) => {
            error!(error = %err, "could not load indicator data");
            return ExitCode::FAILURE;
        }
        Err(err) => {
            error!(error = %err, "data loading task failed");
            return ExitCode::FAILURE;
        }
    };

    let addr = settings.socket_addr();
    let api = routes(Arc::new(store), Arc::new(settings));

    info!(%addr, "starting web server");
    warp::serve(api).run(addr).await;
    ExitCode::SUCCESS
}
