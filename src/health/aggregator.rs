// src/health/aggregator.rs
use super::{HealthReport, ProbeResult};
use crate::config::Config;
use crate::probes::{
    CacheProbe, ConfiguredClusters, DatabaseProbe, HttpClientFactory, MemcachedStatsClient, Probe,
    SearchProbe,
};
use chrono::Utc;
use hyper::StatusCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runs the enabled probes in order (database, cache, search) and folds
/// their results into one report.
pub struct HealthAggregator {
    database: Box<dyn Probe>,
    cache: Option<Box<dyn Probe>>,
    search: Option<Box<dyn Probe>>,
}

impl HealthAggregator {
    pub fn new(database: Box<dyn Probe>) -> Self {
        Self {
            database,
            cache: None,
            search: None,
        }
    }

    pub fn with_cache(mut self, probe: Box<dyn Probe>) -> Self {
        self.cache = Some(probe);
        self
    }

    pub fn with_search(mut self, probe: Box<dyn Probe>) -> Self {
        self.search = Some(probe);
        self
    }

    /// Build an aggregator with fresh clients for every enabled subsystem.
    ///
    /// The cache probe runs only when a cache section lists at least one
    /// server; the search probe runs whenever a search section is present.
    pub fn from_config(config: &Config) -> Self {
        let timeout = config.probes.timeout();
        let mut aggregator = Self::new(Box::new(DatabaseProbe::from_config(&config.database)));

        if let Some(cache) = config.cache.as_ref().filter(|c| !c.servers.is_empty()) {
            aggregator = aggregator.with_cache(Box::new(CacheProbe::new(
                cache.servers.clone(),
                Arc::new(MemcachedStatsClient::new(timeout)),
            )));
        }

        if let Some(search) = &config.search {
            aggregator = aggregator.with_search(Box::new(SearchProbe::new(
                Arc::new(ConfiguredClusters::from(search)),
                Arc::new(HttpClientFactory::new(timeout)),
            )));
        }

        aggregator
    }

    pub async fn evaluate(&self) -> (HealthReport, StatusCode) {
        let probes = std::iter::once(&self.database)
            .chain(self.cache.as_ref())
            .chain(self.search.as_ref());

        let mut results = Vec::with_capacity(3);
        for probe in probes {
            results.push(run_probe(probe.as_ref()).await);
        }

        let unhealthy_count = results.iter().filter(|r| !r.healthy).count();
        let report = HealthReport::readiness(results, Utc::now().timestamp());
        let status = if report.status().is_healthy() {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        info!(
            "Readiness check complete: {} probes, {} unhealthy",
            report.details().map_or(0, |d| d.results().len()),
            unhealthy_count
        );

        (report, status)
    }
}

async fn run_probe(probe: &dyn Probe) -> ProbeResult {
    let start = Instant::now();
    let outcome = probe.check().await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(()) => {
            debug!(probe = probe.name(), elapsed_ms, "Probe healthy");
            ProbeResult {
                name: probe.name(),
                healthy: true,
            }
        }
        Err(e) => {
            warn!(probe = probe.name(), elapsed_ms, error = %e, "Probe unhealthy");
            ProbeResult {
                name: probe.name(),
                healthy: false,
            }
        }
    }
}

/// Process-is-up check. Never consults a dependency.
pub fn liveness() -> (HealthReport, StatusCode) {
    (HealthReport::liveness(Utc::now().timestamp()), StatusCode::OK)
}
