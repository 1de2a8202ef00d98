// Library root: exposes the modules for integration tests in `tests/`.
// Production entry point remains `src/main.rs`.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod notifier;
pub mod rate_limiter;
pub mod realtime;
pub mod repository;
pub mod scheduler;
pub mod stock;

pub mod cli;
