// src/probes/mod.rs
mod cache;
mod database;
mod error;
mod search;

pub use cache::{CacheProbe, CacheServerSpec, CacheStatsClient, MemcachedStatsClient, NodeStats};
pub use database::DatabaseProbe;
pub use error::ProbeError;
pub use search::{
    ClusterHealth, ClusterHealthStatus, ClusterLister, ConfiguredClusters, HttpClientFactory,
    HttpSearchClient, SearchClient, SearchClientFactory, SearchProbe, REQUIRED_CLUSTER_STATUS,
};

use async_trait::async_trait;

/// A single dependency check.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Key under which the result is reported in `details`.
    fn name(&self) -> &'static str;

    async fn check(&self) -> Result<(), ProbeError>;
}
