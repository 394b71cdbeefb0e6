use crate::error::{DashboardError, DashboardResult};
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
    Testing,
}

impl AppEnv {
    pub fn default_log_filter(&self) -> &'static str {
        match self {
            AppEnv::Development => "debug",
            AppEnv::Production => "info",
            AppEnv::Testing => "warn",
        }
    }
}

impl FromStr for AppEnv {
    type Err = DashboardError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "development" | "dev" | "default" => Ok(AppEnv::Development),
            "production" | "prod" => Ok(AppEnv::Production),
            "testing" | "test" => Ok(AppEnv::Testing),
            other => Err(DashboardError::Config(format!("Unknown APP_ENV: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub app_env: AppEnv,
    pub database_url: Option<String>,
    pub host: IpAddr,
    pub port: u16,
    pub default_chart_year: i32,
    pub default_chart_limit: usize,
    pub max_chart_limit: usize,
    pub min_forecast_history: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            app_env: AppEnv::Development,
            database_url: None,
            host: IpAddr::from([127, 0, 0, 1]),
            port: 8001,
            default_chart_year: 2020,
            default_chart_limit: 10,
            max_chart_limit: 200,
            min_forecast_history: 5,
        }
    }
}

impl Settings {
    /// Reads settings from the process environment after loading `.env`.
    pub fn from_env() -> DashboardResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> DashboardResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();

        let app_env = match lookup("APP_ENV") {
            Some(value) => value.parse()?,
            None => defaults.app_env,
        };

        let settings = Settings {
            app_env,
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            host: parse_var(&lookup, "HOST", defaults.host)?,
            port: parse_var(&lookup, "PORT", defaults.port)?,
            default_chart_year: parse_var(&lookup, "DEFAULT_CHART_YEAR", defaults.default_chart_year)?,
            default_chart_limit: parse_var(
                &lookup,
                "DEFAULT_CHART_LIMIT",
                defaults.default_chart_limit,
            )?,
            max_chart_limit: parse_var(&lookup, "MAX_CHART_LIMIT", defaults.max_chart_limit)?,
            min_forecast_history: parse_var(
                &lookup,
                "MIN_FORECAST_HISTORY",
                defaults.min_forecast_history,
            )?,
        };

        if settings.max_chart_limit == 0 || settings.default_chart_limit == 0 {
            return Err(DashboardError::Config(
                "chart limits must be positive".to_string(),
            ));
        }
        if settings.default_chart_limit > settings.max_chart_limit {
            return Err(DashboardError::Config(format!(
                "DEFAULT_CHART_LIMIT ({}) exceeds MAX_CHART_LIMIT ({})",
                settings.default_chart_limit, settings.max_chart_limit
            )));
        }
        // Two points for the fit, one held out.
        if settings.min_forecast_history < 3 {
            return Err(DashboardError::Config(
                "MIN_FORECAST_HISTORY must be at least 3".to_string(),
            ));
        }

        Ok(settings)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn database_url(&self) -> DashboardResult<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| DashboardError::Config("DATABASE_URL must be set".to_string()))
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> DashboardResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| DashboardError::Config(format!("{} must be a valid value, got {:?}", key, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let settings = Settings::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(settings.app_env, AppEnv::Development);
        assert_eq!(settings.port, 8001);
        assert_eq!(settings.default_chart_limit, 10);
        assert_eq!(settings.default_chart_year, 2020);
        assert!(settings.database_url().is_err());
    }

    #[test]
    fn test_overrides_are_parsed() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("APP_ENV", "production"),
            ("PORT", "9000"),
            ("HOST", "0.0.0.0"),
            ("DATABASE_URL", "postgres://localhost/indicators"),
            ("MAX_CHART_LIMIT", "50"),
        ]))
        .unwrap();
        assert_eq!(settings.app_env, AppEnv::Production);
        assert_eq!(settings.socket_addr().to_string(), "0.0.0.0:9000");
        assert_eq!(settings.max_chart_limit, 50);
        assert_eq!(settings.database_url().unwrap(), "postgres://localhost/indicators");
        assert_eq!(settings.app_env.default_log_filter(), "info");
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        assert!(Settings::from_lookup(lookup_from(&[("PORT", "eighty")])).is_err());
        assert!(Settings::from_lookup(lookup_from(&[("APP_ENV", "staging")])).is_err());
        assert!(Settings::from_lookup(lookup_from(&[("DEFAULT_CHART_LIMIT", "500")])).is_err());
        assert!(Settings::from_lookup(lookup_from(&[("MIN_FORECAST_HISTORY", "2")])).is_err());
    }
}
