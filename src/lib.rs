pub mod cli;
pub mod db;
pub mod error;
pub mod fmt;
pub mod group;
pub mod metrics;
pub mod models;
pub mod page;
pub mod plan;
pub mod report;
pub mod reports;
pub mod settings;
pub mod sink;
pub mod source;
pub mod xlsx;
