use thiserror::Error;
use warp::http::StatusCode;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Unknown metric: {0}")]
    InvalidMetric(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unknown chart type: {0}")]
    UnknownChartKind(String),

    #[error("Not enough history for {country_code}: {available} records, at least {required} needed")]
    InsufficientHistory {
        country_code: String,
        available: usize,
        required: usize,
    },

    #[error("Field {field} holds a value that cannot be serialized as JSON")]
    SerializationHazard { field: String },

    #[error("Country not found: {0}")]
    CountryNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Database connection error: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Dataframe error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(String),
}

impl DashboardError {
    pub fn status(&self) -> StatusCode {
        match self {
            DashboardError::InvalidMetric(_)
            | DashboardError::InvalidParameter(_)
            | DashboardError::UnknownChartKind(_) => StatusCode::BAD_REQUEST,
            DashboardError::CountryNotFound(_) => StatusCode::NOT_FOUND,
            DashboardError::InsufficientHistory { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client. Internal failures are not echoed back.
    pub fn client_message(&self) -> String {
        if self.status() == StatusCode::INTERNAL_SERVER_ERROR {
            String::from("Internal server error")
        } else {
            self.to_string()
        }
    }
}

pub type DashboardResult<T> = Result<T, DashboardError>;
