// src/health/report.rs
use super::HealthStatus;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Outcome of one probe invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub name: &'static str,
    pub healthy: bool,
}

/// Per-probe results, serialized as an object in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Details(Vec<ProbeResult>);

impl Details {
    pub fn get(&self, name: &str) -> Option<HealthStatus> {
        self.0
            .iter()
            .find(|result| result.name == name)
            .map(|result| HealthStatus::from(result.healthy))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.iter().map(|result| result.name)
    }

    pub fn results(&self) -> &[ProbeResult] {
        &self.0
    }
}

impl Serialize for Details {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for result in &self.0 {
            map.serialize_entry(result.name, &HealthStatus::from(result.healthy))?;
        }
        map.end()
    }
}

/// Body of the readiness and liveness responses.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    status: HealthStatus,
    #[serde(rename = "time")]
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Details>,
}

impl HealthReport {
    /// Readiness report: healthy iff every result is healthy.
    pub fn readiness(results: Vec<ProbeResult>, timestamp: i64) -> Self {
        let healthy = results.iter().all(|result| result.healthy);
        Self {
            status: healthy.into(),
            timestamp,
            details: Some(Details(results)),
        }
    }

    /// Liveness report: always healthy, no details.
    pub fn liveness(timestamp: i64) -> Self {
        Self {
            status: HealthStatus::Healthy,
            timestamp,
            details: None,
        }
    }

    pub fn status(&self) -> HealthStatus {
        self.status
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn details(&self) -> Option<&Details> {
        self.details.as_ref()
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
