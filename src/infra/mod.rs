//! Infrastructure adapters and runtime bootstrap.

pub mod capture;
pub mod error;
pub mod http;
pub mod telemetry;
pub mod upstream;
