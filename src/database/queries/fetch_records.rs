use crate::core_logic::data_processing::IndicatorRecord;
use crate::database::lib::establish_connection;
use crate::database::models::DataEntry;
use crate::database::schema::data_entries::dsl::*;
use crate::error::DashboardResult;
use diesel::prelude::*;

pub fn fetch_data_entries(conn: &mut PgConnection) -> QueryResult<Vec<DataEntry>> {
    data_entries
        .filter(country_code.is_not_null())
        .filter(country_code.ne(""))
        .order((country_code.asc(), year.asc()))
        .select(DataEntry::as_select())
        .load::<DataEntry>(conn)
}

pub fn fetch_indicator_records(database_url: &str) -> DashboardResult<Vec<IndicatorRecord>> {
    let conn = &mut establish_connection(database_url)?;
    let entries = fetch_data_entries(conn)?;
    Ok(entries.into_iter().filter_map(DataEntry::into_record).collect())
}
