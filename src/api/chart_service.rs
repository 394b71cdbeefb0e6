use crate::api::models::ChartRequest;
use crate::core_logic::chart_record::ChartRecord;
use crate::core_logic::data_processing::IndicatorStore;
use crate::error::{DashboardError, DashboardResult};
use tracing::{debug, info};

/// Drops every record holding a null or non-finite field. Returns the kept
/// records and how many were dropped.
pub fn sanitize(records: Vec<ChartRecord>) -> (Vec<ChartRecord>, usize) {
    let total = records.len();
    let kept: Vec<ChartRecord> = records
        .into_iter()
        .filter(|record| match record.check_finite() {
            Ok(()) => true,
            Err(DashboardError::SerializationHazard { field }) => {
                debug!(field = %field, "dropping chart record with unserializable value");
                false
            }
            Err(_) => false,
        })
        .collect();
    let dropped = total - kept.len();
    (kept, dropped)
}

pub fn chart_data(store: &IndicatorStore, request: &ChartRequest) -> DashboardResult<Vec<ChartRecord>> {
    let records = match request {
        ChartRequest::TopN {
            metric,
            year,
            limit,
        } => store.top_n(*metric, *year, *limit)?,
        ChartRequest::Trend {
            metric,
            country_code,
        } => store.trend(*metric, country_code.as_deref())?,
        ChartRequest::Correlation { metrics, year } => {
            store.correlation(metrics.0, metrics.1, *year)?
        }
        ChartRequest::Distribution { metric, year } => store.distribution(*metric, *year)?,
    };

    let (records, dropped) = sanitize(records);
    let metrics: Vec<&str> = request.metrics().iter().map(|metric| metric.key()).collect();
    info!(
        kind = request.kind_name(),
        metrics = ?metrics,
        year = ?request.year(),
        limit = ?request.limit(),
        records = records.len(),
        dropped,
        "chart data served"
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_logic::data_processing::IndicatorRecord;
    use crate::core_logic::metrics::Metric;

    fn store() -> IndicatorStore {
        IndicatorStore::from_records(vec![
            IndicatorRecord::new("A", 2020).with(Metric::Gdp, 50000.0),
            IndicatorRecord::new("B", 2020),
            IndicatorRecord::new("C", 2020).with(Metric::Gdp, 30000.0),
            IndicatorRecord::new("D", 2020).with(Metric::Gdp, 70000.0),
            IndicatorRecord::new("E", 2021)
                .with(Metric::Gdp, f64::NAN)
                .with(Metric::LifeExpectancy, 71.0),
            IndicatorRecord::new("F", 2021)
                .with(Metric::Gdp, 12000.0)
                .with(Metric::LifeExpectancy, 74.5),
        ])
        .unwrap()
    }

    #[test]
    fn test_sanitize_counts_dropped_rows() {
        let records = vec![
            ChartRecord::new().with_text("country_code", "A").with_number("gdp", 1.0),
            ChartRecord::new().with_text("country_code", "B").with_number("gdp", f64::NAN),
            ChartRecord::new().with_text("country_code", "C").with_number("gdp", None::<f64>),
        ];
        let (kept, dropped) = sanitize(records);
        assert_eq!(kept.len(), 1);
        assert_eq!(dropped, 2);
        assert_eq!(kept[0].text("country_code"), Some("A"));
    }

    #[test]
    fn test_top_n_scenario() {
        let request = ChartRequest::TopN {
            metric: Metric::Gdp,
            year: 2020,
            limit: 3,
        };
        let records = chart_data(&store(), &request).unwrap();
        let codes: Vec<&str> = records.iter().filter_map(|r| r.text("country_code")).collect();
        assert_eq!(codes, vec!["D", "A", "C"]);
    }

    #[test]
    fn test_correlation_drops_nan_country() {
        let request = ChartRequest::Correlation {
            metrics: (Metric::Gdp, Metric::LifeExpectancy),
            year: 2021,
        };
        let records = chart_data(&store(), &request).unwrap();
        let codes: Vec<&str> = records.iter().filter_map(|r| r.text("country_code")).collect();
        assert_eq!(codes, vec!["F"]);
    }

    #[test]
    fn test_same_request_same_bytes() {
        let store = store();
        let request = ChartRequest::Distribution {
            metric: Metric::Gdp,
            year: 2020,
        };
        let first = serde_json::to_string(&chart_data(&store, &request).unwrap()).unwrap();
        let second = serde_json::to_string(&chart_data(&store, &request).unwrap()).unwrap();
        assert_eq!(first, second);
        assert!(!first.contains("null"));
        assert!(!first.contains("NaN"));
    }

    #[test]
    fn test_no_data_is_an_empty_success() {
        let request = ChartRequest::TopN {
            metric: Metric::Hci,
            year: 1990,
            limit: 5,
        };
        assert!(chart_data(&store(), &request).unwrap().is_empty());
    }
}
