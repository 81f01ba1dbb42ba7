// src/probes/cache.rs
use super::{Probe, ProbeError};
use crate::config::CacheServers;
use async_memcached::Client;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// One cache node, parsed from a `host:port` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheServerSpec {
    pub host: String,
    pub port: u16,
}

impl CacheServerSpec {
    /// Parse `host:port`. IPv6 hosts must be bracketed (`[::1]:11211`).
    pub fn parse(entry: &str) -> Result<Self, ProbeError> {
        let malformed =
            || ProbeError::MalformedConfig(format!("cache server {entry:?} is not host:port"));

        let (host, port) = entry.trim().rsplit_once(':').ok_or_else(malformed)?;

        let host = match host.strip_prefix('[') {
            Some(inner) => inner.strip_suffix(']').ok_or_else(malformed)?,
            None if host.contains(':') => return Err(malformed()),
            None => host,
        };
        if host.is_empty() {
            return Err(malformed());
        }

        let port: u16 = port.parse().map_err(|_| malformed())?;
        if port == 0 {
            return Err(malformed());
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for CacheServerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Statistics reported by a single cache node.
#[derive(Debug, Clone, Default)]
pub struct NodeStats {
    values: HashMap<String, String>,
}

impl NodeStats {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn pid(&self) -> Option<i64> {
        self.get("pid").and_then(|pid| pid.parse().ok())
    }

    /// A node is live iff it reports a positive process id.
    pub fn is_live(&self) -> bool {
        self.pid().map_or(false, |pid| pid > 0)
    }
}

/// Fetches per-node statistics from a cache node.
#[async_trait]
pub trait CacheStatsClient: Send + Sync {
    async fn stats(&self, server: &CacheServerSpec) -> Result<NodeStats, ProbeError>;
}

/// Fetches `stats` from one node through `async_memcached`.
#[derive(Debug, Clone)]
pub struct MemcachedStatsClient {
    timeout: Duration,
}

impl MemcachedStatsClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CacheStatsClient for MemcachedStatsClient {
    async fn stats(&self, server: &CacheServerSpec) -> Result<NodeStats, ProbeError> {
        let target = server.to_string();
        let dsn = format!("tcp://{target}");

        let mut client = timeout(self.timeout, Client::new(dsn.as_str()))
            .await
            .map_err(|_| ProbeError::timeout(&target, self.timeout))?
            .map_err(|e| ProbeError::unreachable(&target, e))?;

        let stats = timeout(self.timeout, client.stats())
            .await
            .map_err(|_| ProbeError::timeout(&target, self.timeout))?
            .map_err(|e| ProbeError::unreachable(&target, e))?;

        Ok(NodeStats::from_pairs(stats))
    }
}

/// Checks every configured cache node in order, stopping at the first failure.
pub struct CacheProbe {
    servers: CacheServers,
    client: Arc<dyn CacheStatsClient>,
}

impl CacheProbe {
    pub fn new(servers: CacheServers, client: Arc<dyn CacheStatsClient>) -> Self {
        Self { servers, client }
    }
}

#[async_trait]
impl Probe for CacheProbe {
    fn name(&self) -> &'static str {
        "memcached"
    }

    async fn check(&self) -> Result<(), ProbeError> {
        for entry in self.servers.as_slice() {
            let server = CacheServerSpec::parse(entry)?;
            let stats = self.client.stats(&server).await?;

            if !stats.is_live() {
                return Err(ProbeError::degraded(
                    server.to_string(),
                    "stats report no positive pid",
                ));
            }

            debug!(server = %server, pid = ?stats.pid(), "Cache node is live");
        }

        Ok(())
    }
}
