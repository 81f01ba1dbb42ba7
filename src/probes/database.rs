// src/probes/database.rs
use super::{Probe, ProbeError};
use crate::config::{ConnectionInfo, DatabaseConfig, DEFAULT_CONNECTION};
use async_trait::async_trait;
use tracing::debug;
use url::Url;

/// Checks that the primary datastore has a default connection configured.
///
/// This is a configuration presence check: the descriptor must be a
/// well-formed URL. No query is sent to the database.
pub struct DatabaseProbe {
    connection: Option<ConnectionInfo>,
}

impl DatabaseProbe {
    pub fn new(connection: Option<ConnectionInfo>) -> Self {
        Self { connection }
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self::new(config.default_connection().cloned())
    }
}

#[async_trait]
impl Probe for DatabaseProbe {
    fn name(&self) -> &'static str {
        "db"
    }

    async fn check(&self) -> Result<(), ProbeError> {
        let connection = self.connection.as_ref().ok_or_else(|| {
            ProbeError::MalformedConfig(format!(
                "no database connection named {DEFAULT_CONNECTION:?}"
            ))
        })?;

        if connection.url.trim().is_empty() {
            return Err(ProbeError::MalformedConfig(
                "default database connection has an empty descriptor".to_string(),
            ));
        }

        let url = Url::parse(&connection.url).map_err(|e| {
            ProbeError::MalformedConfig(format!("default database descriptor is invalid: {e}"))
        })?;

        debug!(scheme = url.scheme(), "Default database connection configured");
        Ok(())
    }
}
