// src/config/models.rs
use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

/// Name of the connection the database probe looks for.
pub const DEFAULT_CONNECTION: &str = "default";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Present iff the cache subsystem is enabled.
    #[serde(default)]
    pub cache: Option<CacheConfig>,
    /// Present iff the search subsystem is enabled.
    #[serde(default)]
    pub search: Option<SearchConfig>,
    #[serde(default)]
    pub probes: ProbeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_readiness_path")]
    pub readiness_path: String,
    #[serde(default = "default_liveness_path")]
    pub liveness_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            readiness_path: default_readiness_path(),
            liveness_path: default_liveness_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub connections: HashMap<String, ConnectionInfo>,
}

impl DatabaseConfig {
    pub fn default_connection(&self) -> Option<&ConnectionInfo> {
        self.connections.get(DEFAULT_CONNECTION)
    }
}

/// Connection descriptor. Checked by the database probe, not at load time.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionInfo {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub servers: CacheServers,
}

/// Ordered `host:port` keys of the cache server mapping. Values are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheServers(Vec<String>);

impl CacheServers {
    pub fn new<I, S>(servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(servers.into_iter().map(Into::into).collect())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for CacheServers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct KeysVisitor;

        impl<'de> Visitor<'de> for KeysVisitor {
            type Value = CacheServers;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of \"host:port\" keys")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut keys = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, _)) = map.next_entry::<String, IgnoredAny>()? {
                    keys.push(key);
                }
                Ok(CacheServers(keys))
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(CacheServers::default())
            }
        }

        deserializer.deserialize_map(KeysVisitor)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub clusters: Vec<SearchCluster>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchCluster {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub url: Url,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl SearchCluster {
    pub fn new(id: impl Into<String>, url: Url) -> Self {
        Self {
            id: id.into(),
            name: None,
            url,
            username: None,
            password: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("probes.timeout_secs must be greater than zero")]
    ZeroTimeout,

    #[error("server path {0:?} must start with '/'")]
    RelativePath(String),

    #[error("readiness and liveness paths must differ (both are {0:?})")]
    DuplicatePath(String),

    #[error("search cluster id {0:?} is configured more than once")]
    DuplicateCluster(String),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probes.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        for path in [&self.server.readiness_path, &self.server.liveness_path] {
            if !path.starts_with('/') {
                return Err(ConfigError::RelativePath(path.clone()));
            }
        }

        if self.server.readiness_path == self.server.liveness_path {
            return Err(ConfigError::DuplicatePath(self.server.readiness_path.clone()));
        }

        if let Some(search) = &self.search {
            let mut seen = HashSet::new();
            for cluster in &search.clusters {
                if !seen.insert(cluster.id.as_str()) {
                    return Err(ConfigError::DuplicateCluster(cluster.id.clone()));
                }
            }
        }

        Ok(())
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_readiness_path() -> String {
    "/healthcheck".to_string()
}

fn default_liveness_path() -> String {
    "/status".to_string()
}

fn default_timeout() -> u64 {
    2
}
