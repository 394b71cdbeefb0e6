use crate::error::{DashboardError, DashboardResult};
use serde::ser::{Serialize, SerializeMap, Serializer};

#[derive(Debug, Clone, PartialEq)]
pub enum ChartValue {
    Null,
    Text(String),
    Integer(i64),
    Number(f64),
}

impl ChartValue {
    pub fn is_valid(&self) -> bool {
        match self {
            ChartValue::Null => false,
            ChartValue::Number(value) => value.is_finite(),
            ChartValue::Text(_) | ChartValue::Integer(_) => true,
        }
    }
}

impl From<f64> for ChartValue {
    fn from(value: f64) -> Self {
        ChartValue::Number(value)
    }
}

impl From<Option<f64>> for ChartValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(ChartValue::Null, ChartValue::Number)
    }
}

/// One flat chart row. Field order is insertion order, so equal rows always
/// serialize to the same bytes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChartRecord {
    fields: Vec<(&'static str, ChartValue)>,
}

impl ChartRecord {
    pub fn new() -> Self {
        ChartRecord::default()
    }

    pub fn with_text(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.fields.push((name, ChartValue::Text(value.into())));
        self
    }

    pub fn with_integer(mut self, name: &'static str, value: i64) -> Self {
        self.fields.push((name, ChartValue::Integer(value)));
        self
    }

    pub fn with_number(mut self, name: &'static str, value: impl Into<ChartValue>) -> Self {
        self.fields.push((name, value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ChartValue> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.get(name) {
            Some(ChartValue::Number(value)) => Some(*value),
            Some(ChartValue::Integer(value)) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(ChartValue::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn check_finite(&self) -> DashboardResult<()> {
        match self.fields.iter().find(|(_, value)| !value.is_valid()) {
            Some((name, _)) => Err(DashboardError::SerializationHazard {
                field: name.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl Serialize for ChartRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            match value {
                ChartValue::Null => map.serialize_entry(name, &())?,
                ChartValue::Text(text) => map.serialize_entry(name, text)?,
                ChartValue::Integer(number) => map.serialize_entry(name, number)?,
                ChartValue::Number(number) => map.serialize_entry(name, number)?,
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_fields_in_insertion_order() {
        let record = ChartRecord::new()
            .with_text("country_code", "USA")
            .with_integer("year", 2020)
            .with_number("gdp", 63000.5);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"country_code":"USA","year":2020,"gdp":63000.5}"#);
    }

    #[test]
    fn test_non_finite_values_are_hazards() {
        let record = ChartRecord::new()
            .with_text("country_code", "E")
            .with_number("gdp", f64::NAN);
        match record.check_finite() {
            Err(DashboardError::SerializationHazard { field }) => assert_eq!(field, "gdp"),
            other => panic!("expected SerializationHazard, got {:?}", other),
        }

        let missing = ChartRecord::new().with_number("life_expectancy", None::<f64>);
        assert!(missing.check_finite().is_err());

        let infinite = ChartRecord::new().with_number("internet", f64::INFINITY);
        assert!(infinite.check_finite().is_err());
    }

    #[test]
    fn test_accessors() {
        let record = ChartRecord::new()
            .with_text("country_code", "FRA")
            .with_integer("countries", 3)
            .with_number("gdp", Some(40000.0));
        assert_eq!(record.text("country_code"), Some("FRA"));
        assert_eq!(record.number("countries"), Some(3.0));
        assert_eq!(record.number("gdp"), Some(40000.0));
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"country_code":"FRA","countries":3,"gdp":40000.0}"#
        );
        assert!(record.check_finite().is_ok());
    }
}
