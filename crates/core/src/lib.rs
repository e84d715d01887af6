pub mod config;
pub mod context;
pub mod cost;
pub mod error;
pub mod keys;
pub mod lifecycle;
pub mod metrics;
pub mod range;
pub mod timezone;
pub mod usage;
