pub mod connection;
pub mod job_store;
pub mod migrations;
pub mod models;
