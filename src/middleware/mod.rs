//! Middleware for observability.
//!
//! Currently just request logging with latency tracking.

pub mod logging;

pub use logging::request_logging;
