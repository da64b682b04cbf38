//! Command-line arguments
//!
//! Every flag falls back to an environment variable, so the tool can run
//! from cron or a container with no arguments at all.

use anyhow::Result;
use bestip_core::WorkflowConfig;
use bestip_core::config::ProviderConfig;
use clap::Parser;
use std::path::PathBuf;
use tracing::Level;

/// Find the fastest CDN endpoints and publish them to DNS
///
/// Measures a CDN's published IP ranges with a speed-test tool, keeps the
/// endpoints above the speed floor and, with --dns, points numbered records
/// (cf1, cf2, ...) or a single record at them.
#[derive(Parser, Debug)]
#[command(name = "bestip")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// IP source: cf, gc, ct, aws, or an http(s) URL of a text list
    #[arg(short = 'i', long, env = "BESTIP_IP_SOURCE")]
    pub ip_source: Option<String>,

    /// Test URL the speed-test downloads from
    #[arg(short = 'u', long = "url", env = "BESTIP_TEST_URL")]
    pub test_url: Option<String>,

    /// Test port (defaults to the test URL's port)
    #[arg(short = 'P', long, env = "BESTIP_PORT")]
    pub port: Option<u16>,

    /// Minimum download speed in MB/s (0 disables the floor)
    #[arg(short = 's', long, env = "BESTIP_SPEED", default_value_t = 2.0)]
    pub speed: f64,

    /// Maximum number of records to publish (0 = all that qualify)
    #[arg(short = 'q', long, env = "BESTIP_QUANTITY", default_value_t = 0)]
    pub quantity: usize,

    /// Maximum latency in ms
    #[arg(short = 'l', long, env = "BESTIP_MAX_LATENCY")]
    pub max_latency: Option<f64>,

    /// Keep only these region codes, e.g. LAX,SJC
    #[arg(long = "region", env = "BESTIP_REGIONS", value_delimiter = ',')]
    pub regions: Vec<String>,

    /// Maximum endpoints per region (0 = unlimited)
    #[arg(long, env = "BESTIP_MAX_PER_REGION", default_value_t = 0)]
    pub max_per_region: usize,

    /// Publish only the best endpoint, under the bare prefix
    #[arg(short = 'o', long, env = "BESTIP_ONLY")]
    pub only: bool,

    /// Ignore cached results and measure again
    #[arg(short = 'r', long, env = "BESTIP_REFRESH")]
    pub refresh: bool,

    /// Update DNS records
    #[arg(short = 'n', long, env = "BESTIP_DNS")]
    pub dns: bool,

    /// Domain the records live under, e.g. example.com
    #[arg(short = 'd', long, env = "BESTIP_DOMAIN")]
    pub domain: Option<String>,

    /// Record name prefix
    #[arg(short = 'p', long, env = "BESTIP_PREFIX", default_value = "cf")]
    pub prefix: String,

    /// Record type
    #[arg(short = 't', long = "type", env = "BESTIP_RECORD_TYPE", default_value = "A")]
    pub record_type: String,

    /// Cloudflare API token
    #[arg(long, env = "CLOUDFLARE_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Cloudflare global API key (with --account)
    #[arg(short = 'k', long = "key", env = "CLOUDFLARE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Cloudflare account email (with --key)
    #[arg(short = 'a', long = "account", env = "CLOUDFLARE_EMAIL")]
    pub email: Option<String>,

    /// Cloudflare zone ID (looked up from --domain when absent)
    #[arg(long, env = "CLOUDFLARE_ZONE_ID")]
    pub zone_id: Option<String>,

    /// Speed-test binary
    #[arg(long, env = "BESTIP_BINARY", default_value = "cfst")]
    pub binary: String,

    /// Directory for IP lists and results
    #[arg(long, env = "BESTIP_WORK_DIR", default_value = ".")]
    pub work_dir: PathBuf,

    /// Measure again when cached results are older than this many seconds
    #[arg(long, env = "BESTIP_MAX_RESULT_AGE")]
    pub max_result_age: Option<u64>,

    /// Read DNS but only log the writes
    #[arg(long, env = "BESTIP_DRY_RUN")]
    pub dry_run: bool,

    /// Give up on the whole run after this many seconds
    #[arg(long, env = "BESTIP_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Kill the speed-test binary after this many seconds
    #[arg(long, env = "BESTIP_TOOL_TIMEOUT")]
    pub tool_timeout: Option<u64>,

    /// Extra arguments for the speed-test binary, e.g. "-dn 20 -tl 250"
    #[arg(short = 'e', long = "extra", env = "BESTIP_EXTRA", allow_hyphen_values = true)]
    pub extra: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, env = "BESTIP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Check the flags only the binary interprets
    ///
    /// Everything else is validated by [`WorkflowConfig::validate`].
    pub fn validate(&self) -> Result<()> {
        self.level()?;

        if self.timeout == Some(0) {
            anyhow::bail!("--timeout must be at least 1 second");
        }
        if self.tool_timeout == Some(0) {
            anyhow::bail!("--tool-timeout must be at least 1 second");
        }
        if !self.dns && self.domain.is_some() {
            tracing::debug!("--domain given without --dns, DNS will not be updated");
        }
        Ok(())
    }

    /// Parsed log level
    pub fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "--log-level '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }

    /// Build the workflow configuration
    pub fn to_config(&self) -> WorkflowConfig {
        let mut config = WorkflowConfig::new();

        config.source.ip_source = self.ip_source.clone();
        config.source.test_url = self.test_url.clone();
        config.source.port = self.port;

        config.test.binary = self.binary.clone();
        config.test.work_dir = self.work_dir.clone();
        config.test.extra_args = self
            .extra
            .as_deref()
            .map(|extra| extra.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        config.test.tool_timeout_secs = self.tool_timeout;

        config.filter.speed_floor_mb_s = self.speed;
        config.filter.max_records = self.quantity;
        config.filter.max_latency_ms = self.max_latency;
        config.filter.regions = self.regions.clone();
        config.filter.max_per_region = self.max_per_region;

        config.cache.force_refresh = self.refresh;
        config.cache.max_age_secs = self.max_result_age;

        config.dns.enabled = self.dns;
        config.dns.domain = self.domain.clone().unwrap_or_default();
        config.dns.prefix = self.prefix.clone();
        config.dns.record_type = self.record_type.clone();
        config.dns.single_record = self.only;
        config.dns.provider = ProviderConfig::Cloudflare {
            api_token: self.api_token.clone(),
            api_key: self.api_key.clone(),
            email: self.email.clone(),
            zone_id: self.zone_id.clone(),
        };

        config.engine.deadline_secs = self.timeout;
        config
    }
}
