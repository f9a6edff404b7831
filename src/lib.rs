pub mod aggregators;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod fetch;
pub mod infra;
pub mod loader;
pub mod output;
pub mod pipeline;
pub mod services;
