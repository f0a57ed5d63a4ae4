pub mod config;
pub mod error;
pub mod pool;
pub mod service;
pub mod telemetry;
