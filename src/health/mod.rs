// src/health/mod.rs
mod aggregator;
mod report;
mod status;

pub use aggregator::{liveness, HealthAggregator};
pub use report::{Details, HealthReport, ProbeResult};
pub use status::HealthStatus;
