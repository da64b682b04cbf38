//! Configuration types for the bestip workflow
//!
//! The binary builds a [`WorkflowConfig`] from flags and environment
//! variables; the coordinator validates it again before the first step.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::CachePolicy;
use crate::error::{Error, Result};
use crate::filter::FilterCriteria;
use crate::source::parse_http_url;

/// Command-line flags named in configuration errors
pub mod flags {
    pub const IP_SOURCE: &str = "--ip-source (-i)";
    pub const TEST_URL: &str = "--url (-u)";
    pub const PORT: &str = "--port (-P)";
    pub const SPEED: &str = "--speed (-s)";
    pub const LATENCY: &str = "--max-latency (-l)";
    pub const DOMAIN: &str = "--domain (-d)";
    pub const PREFIX: &str = "--prefix (-p)";
    pub const RECORD_TYPE: &str = "--type (-t)";
    pub const BINARY: &str = "--binary";
    pub const WORK_DIR: &str = "--work-dir";
    pub const CREDENTIALS: &str =
        "CLOUDFLARE_API_TOKEN, or CLOUDFLARE_API_KEY together with CLOUDFLARE_EMAIL";
}

/// Record types the DNS step accepts
pub const SUPPORTED_RECORD_TYPES: &[&str] = &["A", "AAAA", "CNAME", "MX", "TXT", "SRV", "NS", "PTR"];

/// Complete configuration for one workflow run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Which IP source and test endpoint to use
    #[serde(default)]
    pub source: SourceConfig,

    /// Measurement tool settings
    #[serde(default)]
    pub test: TestConfig,

    /// Selection thresholds
    #[serde(default)]
    pub filter: FilterConfig,

    /// Artifact reuse
    #[serde(default)]
    pub cache: CacheConfig,

    /// DNS update settings
    #[serde(default)]
    pub dns: DnsConfig,

    /// Coordinator settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl WorkflowConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.source.validate()?;
        self.test.validate()?;
        self.filter.criteria()?;
        self.dns.validate()?;

        if self.engine.event_channel_capacity == 0 {
            return Err(Error::configuration("event channel capacity must be > 0"));
        }

        Ok(())
    }
}

/// IP source selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Catalog key or custom list URL; `None` lets the tool choose
    pub ip_source: Option<String>,

    /// Explicit test URL
    pub test_url: Option<String>,

    /// Explicit test port
    pub port: Option<u16>,
}

impl SourceConfig {
    /// Validate URL and port shape (catalog checks happen at resolve time)
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = self.test_url.as_deref().filter(|u| !u.trim().is_empty()) {
            parse_http_url(url.trim(), flags::TEST_URL)?;
        }
        if self.port == Some(0) {
            return Err(Error::configuration_flag(
                "test port must be between 1 and 65535",
                flags::PORT,
            ));
        }
        Ok(())
    }
}

/// Measurement tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    /// Path or name of the speed-test binary
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Directory holding the IP list and result artifacts
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Extra arguments appended to the tool's command line
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Kill the tool after this many seconds
    #[serde(default)]
    pub tool_timeout_secs: Option<u64>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            work_dir: default_work_dir(),
            extra_args: Vec::new(),
            tool_timeout_secs: None,
        }
    }
}

impl TestConfig {
    /// Validate the tool settings
    pub fn validate(&self) -> Result<()> {
        if self.binary.trim().is_empty() {
            return Err(Error::configuration_flag(
                "speed-test binary cannot be empty",
                flags::BINARY,
            ));
        }
        if self.work_dir.as_os_str().is_empty() {
            return Err(Error::configuration_flag(
                "work directory cannot be empty",
                flags::WORK_DIR,
            ));
        }
        Ok(())
    }

    /// Path of the downloaded IP list for a cache key
    pub fn ip_list_path(&self, cache_key: &str) -> PathBuf {
        self.work_dir.join(format!("ip_list_{}.txt", cache_key))
    }

    /// Path of the result artifact for a cache key
    pub fn result_path(&self, cache_key: &str) -> PathBuf {
        self.work_dir.join(format!("result_{}.csv", cache_key))
    }
}

fn default_binary() -> String {
    "cfst".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Selection thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Minimum download speed in MB/s (0 disables the floor)
    #[serde(default = "default_speed_floor")]
    pub speed_floor_mb_s: f64,

    /// Maximum records to keep (0 = unlimited)
    #[serde(default)]
    pub max_records: usize,

    /// Maximum latency in ms (None disables the ceiling)
    #[serde(default)]
    pub max_latency_ms: Option<f64>,

    /// Region codes to keep (empty = all)
    #[serde(default)]
    pub regions: Vec<String>,

    /// Maximum records per region (0 = unlimited)
    #[serde(default)]
    pub max_per_region: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            speed_floor_mb_s: default_speed_floor(),
            max_records: 0,
            max_latency_ms: None,
            regions: Vec::new(),
            max_per_region: 0,
        }
    }
}

impl FilterConfig {
    /// Validated filter criteria
    pub fn criteria(&self) -> Result<FilterCriteria> {
        let mut criteria = FilterCriteria::new(self.speed_floor_mb_s, self.max_records)?
            .with_regions(&self.regions)
            .with_max_per_region(self.max_per_region);
        if let Some(ceiling) = self.max_latency_ms {
            criteria = criteria.with_latency_ceiling(ceiling)?;
        }
        Ok(criteria)
    }
}

fn default_speed_floor() -> f64 {
    2.0
}

/// Artifact reuse settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Always re-measure
    #[serde(default)]
    pub force_refresh: bool,

    /// Re-measure when the artifact is older than this many seconds
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

impl CacheConfig {
    /// Policy layered on the reuse decision
    pub fn policy(&self) -> CachePolicy {
        CachePolicy {
            max_age: self.max_age_secs.map(Duration::from_secs),
        }
    }
}

/// DNS update settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Run the PLAN and APPLY steps
    #[serde(default)]
    pub enabled: bool,

    /// Zone apex, e.g. `example.com`
    #[serde(default)]
    pub domain: String,

    /// Hostname stem for managed records
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Record type written for every managed record
    #[serde(default = "default_record_type")]
    pub record_type: String,

    /// Manage one bare `prefix` record instead of `prefix1..N`
    #[serde(default)]
    pub single_record: bool,

    /// Provider credentials
    #[serde(default)]
    pub provider: ProviderConfig,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            domain: String::new(),
            prefix: default_prefix(),
            record_type: default_record_type(),
            single_record: false,
            provider: ProviderConfig::default(),
        }
    }
}

impl DnsConfig {
    /// Validate the DNS settings (only when the DNS path is enabled)
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        validate_domain(&self.domain)?;

        if self.prefix.is_empty() {
            return Err(Error::configuration_flag(
                "record prefix cannot be empty",
                flags::PREFIX,
            ));
        }
        if !self.prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(Error::configuration_flag(
                format!(
                    "record prefix '{}' may only contain letters, digits and hyphens",
                    self.prefix
                ),
                flags::PREFIX,
            ));
        }

        self.normalized_record_type()?;
        self.provider.validate()?;

        Ok(())
    }

    /// Uppercased record type, rejected when unsupported
    pub fn normalized_record_type(&self) -> Result<String> {
        let upper = self.record_type.trim().to_ascii_uppercase();
        if SUPPORTED_RECORD_TYPES.contains(&upper.as_str()) {
            Ok(upper)
        } else {
            Err(Error::configuration_flag(
                format!(
                    "unsupported record type '{}', expected one of {}",
                    self.record_type,
                    SUPPORTED_RECORD_TYPES.join(", ")
                ),
                flags::RECORD_TYPE,
            ))
        }
    }
}

fn default_prefix() -> String {
    "cf".to_string()
}

fn default_record_type() -> String {
    "A".to_string()
}

fn validate_domain(domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(Error::configuration_flag(
            "a domain is required to update DNS",
            flags::DOMAIN,
        ));
    }
    if !domain.contains('.') || domain.len() > 253 {
        return Err(Error::configuration_flag(
            format!("'{}' is not a valid domain", domain),
            flags::DOMAIN,
        ));
    }
    for label in domain.split('.') {
        if label.is_empty()
            || label.len() > 63
            || label.starts_with('-')
            || label.ends_with('-')
            || !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(Error::configuration_flag(
                format!("domain '{}' has an invalid label '{}'", domain, label),
                flags::DOMAIN,
            ));
        }
    }
    Ok(())
}

/// DNS provider credentials
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare API v4
    Cloudflare {
        /// Scoped API token (preferred)
        #[serde(default)]
        api_token: Option<String>,
        /// Global API key, used with `email`
        #[serde(default)]
        api_key: Option<String>,
        /// Account email for the global API key
        #[serde(default)]
        email: Option<String>,
        /// Zone ID, looked up from the domain when absent
        #[serde(default)]
        zone_id: Option<String>,
    },
}

// Credentials never appear in Debug output
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::Cloudflare {
                api_token,
                api_key,
                email,
                zone_id,
            } => f
                .debug_struct("Cloudflare")
                .field("api_token", &api_token.as_ref().map(|_| "<REDACTED>"))
                .field("api_key", &api_key.as_ref().map(|_| "<REDACTED>"))
                .field("email", email)
                .field("zone_id", zone_id)
                .finish(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Cloudflare {
            api_token: None,
            api_key: None,
            email: None,
            zone_id: None,
        }
    }
}

impl ProviderConfig {
    /// Validate that usable credentials are present
    pub fn validate(&self) -> Result<()> {
        match self {
            ProviderConfig::Cloudflare {
                api_token,
                api_key,
                email,
                ..
            } => {
                let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
                if present(api_token) || (present(api_key) && present(email)) {
                    Ok(())
                } else {
                    Err(Error::configuration_flag(
                        "Cloudflare credentials are missing",
                        flags::CREDENTIALS,
                    ))
                }
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
        }
    }
}

/// Coordinator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the workflow event channel
    ///
    /// When full, new events are dropped with a warning.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Overall deadline for the run in seconds
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
            deadline_secs: None,
        }
    }
}

fn default_event_channel_capacity() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dns_config() -> DnsConfig {
        DnsConfig {
            enabled: true,
            domain: "example.com".to_string(),
            prefix: "cf".to_string(),
            record_type: "a".to_string(),
            single_record: false,
            provider: ProviderConfig::Cloudflare {
                api_token: Some("token-value".to_string()),
                api_key: None,
                email: None,
                zone_id: None,
            },
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(WorkflowConfig::new().validate().is_ok());
    }

    #[test]
    fn negative_speed_rejected() {
        let mut config = WorkflowConfig::new();
        config.filter.speed_floor_mb_s = -1.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains(flags::SPEED));

        config.filter.speed_floor_mb_s = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn latency_ceiling_validated() {
        let mut config = WorkflowConfig::new();
        config.filter.max_latency_ms = Some(0.0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains(flags::LATENCY));

        config.filter.max_latency_ms = Some(250.0);
        config.filter.regions = vec!["LAX".to_string()];
        config.filter.max_per_region = 2;
        let criteria = config.filter.criteria().unwrap();
        assert_eq!(criteria.max_latency_ms(), Some(250.0));
        assert_eq!(criteria.regions(), ["LAX".to_string()]);
        assert_eq!(criteria.max_per_region(), 2);
    }

    #[test]
    fn record_type_is_uppercased() {
        assert_eq!(dns_config().normalized_record_type().unwrap(), "A");

        let mut dns = dns_config();
        dns.record_type = "SOA".to_string();
        assert!(dns.validate().unwrap_err().to_string().contains(flags::RECORD_TYPE));
    }

    #[test]
    fn domain_and_prefix_rules() {
        let mut dns = dns_config();
        dns.domain = "localhost".to_string();
        assert!(dns.validate().is_err());

        let mut dns = dns_config();
        dns.domain = "-bad.example.com".to_string();
        assert!(dns.validate().is_err());

        let mut dns = dns_config();
        dns.prefix = "cf_best".to_string();
        assert!(dns.validate().unwrap_err().to_string().contains(flags::PREFIX));

        assert!(dns_config().validate().is_ok());
    }

    #[test]
    fn disabled_dns_skips_validation() {
        let dns = DnsConfig::default();
        assert!(!dns.enabled);
        assert!(dns.validate().is_ok());
    }

    #[test]
    fn credentials_required() {
        let mut dns = dns_config();
        dns.provider = ProviderConfig::Cloudflare {
            api_token: None,
            api_key: Some("key".to_string()),
            email: None,
            zone_id: None,
        };
        assert!(dns.validate().is_err());

        dns.provider = ProviderConfig::Cloudflare {
            api_token: None,
            api_key: Some("key".to_string()),
            email: Some("ops@example.com".to_string()),
            zone_id: None,
        };
        assert!(dns.validate().is_ok());
    }

    #[test]
    fn provider_debug_redacts_secrets() {
        let provider = ProviderConfig::Cloudflare {
            api_token: Some("super-secret-token".to_string()),
            api_key: Some("super-secret-key".to_string()),
            email: None,
            zone_id: None,
        };
        let debug = format!("{:?}", provider);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn invalid_test_url_rejected() {
        let mut config = WorkflowConfig::new();
        config.source.test_url = Some("not a url".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn artifact_paths() {
        let test = TestConfig {
            work_dir: PathBuf::from("/tmp/bestip"),
            ..TestConfig::default()
        };
        assert_eq!(test.result_path("cf"), PathBuf::from("/tmp/bestip/result_cf.csv"));
        assert_eq!(
            test.ip_list_path("gc"),
            PathBuf::from("/tmp/bestip/ip_list_gc.txt")
        );
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: WorkflowConfig = serde_json::from_str(r#"{"dns": {"enabled": false}}"#).unwrap();
        assert_eq!(config.test.binary, "cfst");
        assert_eq!(config.dns.record_type, "A");
        assert_eq!(config.engine.event_channel_capacity, 256);
        assert_eq!(config.filter.speed_floor_mb_s, 2.0);
    }
}
