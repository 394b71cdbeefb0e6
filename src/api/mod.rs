pub mod chart_service;
pub mod lib;
pub mod models;
pub mod routes;
