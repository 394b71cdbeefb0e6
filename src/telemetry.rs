use crate::config::{AppEnv, Settings};
use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber. `RUST_LOG` wins over the profile default.
pub fn init(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.app_env.default_log_filter()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    // A second init (e.g. from tests) is not an error worth reporting.
    let _ = match settings.app_env {
        AppEnv::Production => builder.json().flatten_event(true).try_init(),
        AppEnv::Development | AppEnv::Testing => builder.try_init(),
    };
}
