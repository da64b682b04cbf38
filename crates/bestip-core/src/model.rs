//! Data model shared by every workflow step
//!
//! These values are produced once per run and never mutated afterwards.

use serde::{Deserialize, Serialize};
use url::Url;

/// Where the effective test URL came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOrigin {
    /// The source catalog's default endpoint
    Default,
    /// A URL the user passed explicitly
    UserSupplied,
}

/// The URL and port the measurement tool downloads from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveTestTarget {
    /// Download URL
    pub url: Url,
    /// Port, 1-65535
    pub port: u16,
    /// Whether the URL is the source default or user supplied
    pub origin: TestOrigin,
}

/// One measured endpoint as reported by the measurement tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// IP address or CIDR
    pub endpoint: String,
    /// Port the endpoint was measured on
    pub port: u16,
    /// Region / colo code reported by the tool (may be empty)
    pub region_code: String,
    /// Download speed in MB/s, never negative
    pub speed_mb_s: f64,
    /// Average latency in milliseconds, never negative
    pub latency_ms: f64,
}

impl MeasurementRecord {
    /// Create a record
    pub fn new(
        endpoint: impl Into<String>,
        port: u16,
        region_code: impl Into<String>,
        speed_mb_s: f64,
        latency_ms: f64,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            port,
            region_code: region_code.into(),
            speed_mb_s,
            latency_ms,
        }
    }
}

/// Measured records in the tool's own output order
pub type ResultSet = Vec<MeasurementRecord>;
