pub mod fetch_records;
