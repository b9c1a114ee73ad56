pub mod admin;
pub mod aggregate;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod mailer;
pub mod models;
pub mod ranking;
pub mod report;
pub mod store;
pub mod telemetry;
