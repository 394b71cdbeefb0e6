#[macro_use]
extern crate diesel;

pub mod api;
pub mod config;
pub mod core_logic;
pub mod database;
pub mod error;
pub mod telemetry;
