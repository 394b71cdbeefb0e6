pub mod chart_record;
pub mod data_processing;
pub mod forecasting;
pub mod metrics;
