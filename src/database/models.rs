use crate::core_logic::data_processing::IndicatorRecord;
use crate::database::schema::data_entries;
use serde::{Deserialize, Serialize};

#[derive(Queryable, Selectable, Deserialize, Serialize, Debug, Clone)]
#[diesel(table_name = data_entries)]
pub struct DataEntry {
    pub id: i32,
    pub country_code: Option<String>, // Nullable<Varchar>, rows without one never reach the store
    pub year: i32,
    pub gdp: Option<f64>,
    pub population: Option<f64>,
    pub female: Option<f64>,
    pub male: Option<f64>,
    pub life_expectancy: Option<f64>,
    pub migration: Option<f64>,
    pub infant_mortality: Option<f64>,
    pub internet: Option<f64>,
    pub hci: Option<f64>,
    pub enrollment: Option<f64>,
    pub urban_pop: Option<f64>,
}

impl DataEntry {
    /// `None` when the row has no usable country code.
    pub fn into_record(self) -> Option<IndicatorRecord> {
        let country_code = self.country_code?.trim().to_string();
        if country_code.is_empty() {
            return None;
        }

        Some(IndicatorRecord {
            country_code,
            year: self.year,
            gdp_per_capita: self.gdp,
            population: self.population,
            life_expectancy: self.life_expectancy,
            infant_mortality: self.infant_mortality,
            female_pop_pct: self.female,
            male_pop_pct: self.male,
            internet_pct: self.internet,
            human_capital_index: self.hci,
            enrollment_pct: self.enrollment,
            urban_pop_pct: self.urban_pop,
            net_migration: self.migration,
        })
    }
}
