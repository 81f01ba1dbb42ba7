// src/probes/search.rs
use super::{Probe, ProbeError};
use crate::config::{SearchCluster, SearchConfig};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// The only cluster health status accepted as healthy.
pub const REQUIRED_CLUSTER_STATUS: ClusterHealthStatus = ClusterHealthStatus::Green;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterHealthStatus {
    Green,
    Yellow,
    Red,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ClusterHealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Body of `GET /_cluster/health`, reduced to what the probe reads.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterHealth {
    #[serde(default)]
    pub cluster_name: Option<String>,
    pub status: ClusterHealthStatus,
}

/// Source of the configured search clusters.
pub trait ClusterLister: Send + Sync {
    fn load_all_clusters(&self) -> Vec<SearchCluster>;
}

/// Clusters taken verbatim from the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredClusters {
    clusters: Vec<SearchCluster>,
}

impl ConfiguredClusters {
    pub fn new(clusters: Vec<SearchCluster>) -> Self {
        Self { clusters }
    }
}

impl From<&SearchConfig> for ConfiguredClusters {
    fn from(config: &SearchConfig) -> Self {
        Self::new(config.clusters.clone())
    }
}

impl ClusterLister for ConfiguredClusters {
    fn load_all_clusters(&self) -> Vec<SearchCluster> {
        self.clusters.clone()
    }
}

/// A client bound to one search cluster.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn is_cluster_ok(&self) -> bool;

    async fn cluster_health(&self) -> Result<ClusterHealth, ProbeError>;
}

pub trait SearchClientFactory: Send + Sync {
    fn client_for(&self, cluster: &SearchCluster) -> Result<Box<dyn SearchClient>, ProbeError>;
}

/// Builds `reqwest` clients talking to the cluster's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    timeout: Duration,
}

impl HttpClientFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl SearchClientFactory for HttpClientFactory {
    fn client_for(&self, cluster: &SearchCluster) -> Result<Box<dyn SearchClient>, ProbeError> {
        let construction = |reason: String| ProbeError::ClientConstruction {
            target: cluster.display_name().to_string(),
            reason,
        };

        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| construction(e.to_string()))?;

        let mut health_url = cluster.url.clone();
        health_url
            .path_segments_mut()
            .map_err(|_| construction(format!("{} cannot be a base URL", cluster.url)))?
            .pop_if_empty()
            .extend(["_cluster", "health"]);

        Ok(Box::new(HttpSearchClient {
            client,
            target: cluster.display_name().to_string(),
            root_url: cluster.url.clone(),
            health_url,
            credentials: cluster
                .username
                .clone()
                .map(|user| (user, cluster.password.clone())),
            timeout: self.timeout,
        }))
    }
}

pub struct HttpSearchClient {
    client: Client,
    target: String,
    root_url: Url,
    health_url: Url,
    credentials: Option<(String, Option<String>)>,
    timeout: Duration,
}

impl HttpSearchClient {
    fn get(&self, url: &Url) -> reqwest::RequestBuilder {
        let request = self.client.get(url.as_str());
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, password.as_deref()),
            None => request,
        }
    }

    fn request_error(&self, err: reqwest::Error) -> ProbeError {
        if err.is_timeout() {
            ProbeError::timeout(&self.target, self.timeout)
        } else {
            ProbeError::unreachable(&self.target, err)
        }
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn is_cluster_ok(&self) -> bool {
        match self.get(&self.root_url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!(cluster = %self.target, status = %response.status(), "Cluster root returned an error");
                false
            }
            Err(e) => {
                debug!(cluster = %self.target, error = %e, "Cluster root request failed");
                false
            }
        }
    }

    async fn cluster_health(&self) -> Result<ClusterHealth, ProbeError> {
        let response = self
            .get(&self.health_url)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::degraded(
                &self.target,
                format!("cluster health returned HTTP {status}"),
            ));
        }

        response
            .json::<ClusterHealth>()
            .await
            .map_err(|e| ProbeError::degraded(&self.target, format!("invalid cluster health: {e}")))
    }
}

/// Requires every configured cluster to be reachable and green.
pub struct SearchProbe {
    clusters: Arc<dyn ClusterLister>,
    clients: Arc<dyn SearchClientFactory>,
}

impl SearchProbe {
    pub fn new(clusters: Arc<dyn ClusterLister>, clients: Arc<dyn SearchClientFactory>) -> Self {
        Self { clusters, clients }
    }
}

#[async_trait]
impl Probe for SearchProbe {
    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    async fn check(&self) -> Result<(), ProbeError> {
        for cluster in self.clusters.load_all_clusters() {
            let client = self.clients.client_for(&cluster)?;

            if !client.is_cluster_ok().await {
                return Err(ProbeError::unreachable(
                    cluster.display_name(),
                    "cluster did not answer",
                ));
            }

            let health = client.cluster_health().await?;
            if health.status != REQUIRED_CLUSTER_STATUS {
                return Err(ProbeError::degraded(
                    cluster.display_name(),
                    format!("cluster health is {}", health.status),
                ));
            }

            debug!(
                cluster = cluster.display_name(),
                cluster_name = ?health.cluster_name,
                "Search cluster is green"
            );
        }

        Ok(())
    }
}
