// # Cloudflare DNS Provider
//
// This crate provides the Cloudflare API v4 implementation of the
// `DnsProvider` trait used by the bestip workflow.
//
// ## Implementation Status
//
// - ✅ One HTTP request per trait call (list may page through results)
// - ✅ Full error propagation to the coordinator
// - ✅ HTTP timeout configured (30 seconds)
// - ✅ Specific error handling for HTTP status codes (401, 403, 404, 409, 429, 5xx)
// - ✅ Dry-run mode for safe testing
// - ✅ API token or global API key + email
// - ✅ Zone auto-discovery and explicit zone ID
// - ❌ NO retry logic (a failed write stops the run)
// - ❌ NO backoff or rate limiting
// - ❌ NO record deletion
// - ❌ NO background tasks
//
// ## Security Requirements
//
// - Credentials NEVER appear in logs or Debug output
// - Provider MUST fail fast if credentials are empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List Zones: GET `/zones?name=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?page=..&per_page=100`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use bestip_core::config::{ProviderConfig, flags};
use bestip_core::planner::{ExistingRecord, ExistingRecordSet};
use bestip_core::traits::{DnsProvider, RecordId, ZoneRef, is_managed_hostname};
use bestip_core::{Error, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Records requested per page when listing
const PAGE_SIZE: u32 = 100;

/// TTL value meaning "automatic"
const AUTO_TTL: u32 = 1;

/// Record ID returned for writes skipped in dry-run mode
const DRY_RUN_RECORD_ID: &str = "dry-run";

/// Cloudflare API credentials
#[derive(Clone)]
pub enum Credentials {
    /// Scoped API token with Zone:DNS:Edit permission
    Token(String),
    /// Global API key and the account email
    GlobalKey { key: String, email: String },
}

// Credentials never appear in Debug output
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Token(_) => f.write_str("Token(<REDACTED>)"),
            Credentials::GlobalKey { email, .. } => f
                .debug_struct("GlobalKey")
                .field("key", &"<REDACTED>")
                .field("email", email)
                .finish(),
        }
    }
}

impl Credentials {
    /// Pick credentials from optional values, preferring the token
    ///
    /// # Errors
    ///
    /// `Error::Configuration` when neither a token nor a key + email pair is
    /// present.
    pub fn from_parts(
        api_token: Option<&str>,
        api_key: Option<&str>,
        email: Option<&str>,
    ) -> Result<Self> {
        fn present(v: Option<&str>) -> Option<&str> {
            v.map(str::trim).filter(|s| !s.is_empty())
        }

        if let Some(token) = present(api_token) {
            return Ok(Credentials::Token(token.to_string()));
        }
        match (present(api_key), present(email)) {
            (Some(key), Some(email)) => Ok(Credentials::GlobalKey {
                key: key.to_string(),
                email: email.to_string(),
            }),
            _ => Err(Error::configuration_flag(
                "Cloudflare credentials are missing",
                flags::CREDENTIALS,
            )),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Credentials::Token(token) => request.bearer_auth(token),
            Credentials::GlobalKey { key, email } => request
                .header("X-Auth-Key", key)
                .header("X-Auth-Email", email),
        }
    }
}

/// Cloudflare DNS provider
///
/// # Trust Level: Untrusted
///
/// This provider is isolated, stateless, and single-shot. Ordering and
/// failure handling are owned by `WorkflowCoordinator`.
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform all GET requests (zone lookup, record listing)
/// - Log the intended POST/PUT payload
/// - **NOT** actually modify DNS records
pub struct CloudflareProvider {
    /// API credentials
    /// ⚠️ NEVER log this value
    credentials: Credentials,

    /// Zone ID (optional, looked up from the domain when absent)
    zone_id: Option<String>,

    /// API base URL (overridable for tests)
    api_base: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, perform GET requests but skip writes
    dry_run: bool,
}

// Custom Debug implementation that hides the credentials
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("credentials", &self.credentials)
            .field("zone_id", &self.zone_id)
            .field("api_base", &self.api_base)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Errors
    ///
    /// - `Error::Configuration` if a credential is empty
    /// - `Error::Http` if the HTTP client cannot be built
    pub fn new(credentials: Credentials, zone_id: Option<String>, dry_run: bool) -> Result<Self> {
        let empty = match &credentials {
            Credentials::Token(token) => token.trim().is_empty(),
            Credentials::GlobalKey { key, email } => {
                key.trim().is_empty() || email.trim().is_empty()
            }
        };
        if empty {
            return Err(Error::configuration_flag(
                "Cloudflare credentials cannot be empty",
                flags::CREDENTIALS,
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            credentials,
            zone_id: zone_id.filter(|id| !id.trim().is_empty()),
            api_base: CLOUDFLARE_API_BASE.to_string(),
            client,
            dry_run,
        })
    }

    /// Create a provider from engine configuration
    pub fn from_config(config: &ProviderConfig, dry_run: bool) -> Result<Self> {
        match config {
            ProviderConfig::Cloudflare {
                api_token,
                api_key,
                email,
                zone_id,
            } => {
                let credentials = Credentials::from_parts(
                    api_token.as_deref(),
                    api_key.as_deref(),
                    email.as_deref(),
                )?;
                if dry_run {
                    tracing::warn!(
                        "Cloudflare provider running in DRY-RUN mode - no changes will be made"
                    );
                }
                Self::new(credentials, zone_id.clone(), dry_run)
            }
        }
    }

    /// Point the provider at a different API base URL
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Whether writes are only logged
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Send a request and unwrap the API envelope
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<Envelope<T>> {
        let response = self
            .credentials
            .authorize(request)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::provider("cloudflare", format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status, &error_text, context));
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            Error::provider("cloudflare", format!("Failed to parse response: {}", e))
        })?;

        if !envelope.success {
            return Err(Error::provider(
                "cloudflare",
                format!("{} rejected: {}", context, envelope.error_summary()),
            ));
        }
        Ok(envelope)
    }

    /// Log a write that dry-run mode skips
    fn log_dry_run(&self, method: &str, url: &str, payload: &serde_json::Value) {
        tracing::info!(
            "[DRY-RUN] Would send {} request to {} with payload: {}",
            method,
            url,
            payload
        );
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    /// Resolve the zone hosting `domain`
    ///
    /// Tries `domain` first, then each parent domain, so records can live
    /// under a subdomain of the zone.
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones?name=example.com
    /// ```
    async fn resolve_zone(&self, domain: &str) -> Result<ZoneRef> {
        let domain = domain.trim_end_matches('.').to_ascii_lowercase();

        if let Some(zone_id) = &self.zone_id {
            tracing::debug!("Using pre-configured zone ID");
            return Ok(ZoneRef::new(zone_id.clone(), domain));
        }

        for candidate in zone_candidates(&domain) {
            tracing::debug!("Looking up zone ID for: {}", candidate);
            let url = format!("{}/zones", self.api_base);
            let envelope: Envelope<Vec<ZoneResult>> = self
                .send(
                    self.client.get(&url).query(&[("name", candidate)]),
                    "Zone lookup",
                )
                .await?;

            if let Some(zone) = envelope.result.unwrap_or_default().into_iter().next() {
                tracing::debug!("Found zone {} ({})", zone.name, zone.id);
                return Ok(ZoneRef::new(zone.id, domain));
            }
        }

        Err(Error::not_found(format!("Cloudflare zone not found for {}", domain)))
    }

    /// List the records managed under `prefix`
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?page=1&per_page=100
    /// ```
    async fn list_records(&self, zone: &ZoneRef, prefix: &str) -> Result<ExistingRecordSet> {
        let url = format!("{}/zones/{}/dns_records", self.api_base, zone.id);
        let mut records = ExistingRecordSet::new();
        let mut page = 1u32;

        loop {
            let envelope: Envelope<Vec<DnsRecordResult>> = self
                .send(
                    self.client.get(&url).query(&[
                        ("page", page.to_string()),
                        ("per_page", PAGE_SIZE.to_string()),
                    ]),
                    "Record listing",
                )
                .await?;

            let total_pages = envelope
                .result_info
                .as_ref()
                .map(|info| info.total_pages)
                .unwrap_or(1);

            for record in envelope.result.unwrap_or_default() {
                let Some(hostname) = zone.relative(&record.name) else {
                    continue;
                };
                if !is_managed_hostname(&hostname, prefix) {
                    continue;
                }
                records.insert(
                    hostname,
                    ExistingRecord {
                        record_id: record.id,
                        value: record.content,
                        record_type: record.record_type,
                    },
                );
            }

            if page >= total_pages {
                break;
            }
            page += 1;
        }

        tracing::debug!(
            "Found {} record(s) under '{}' in {}",
            records.len(),
            prefix,
            zone.name
        );
        Ok(records)
    }

    /// Create a record
    ///
    /// # API Call
    ///
    /// ```http
    /// POST /zones/:zone_id/dns_records
    /// { "type": "A", "name": "cf1.example.com", "content": "1.2.3.4", "ttl": 1, "proxied": false }
    /// ```
    async fn create_record(
        &self,
        zone: &ZoneRef,
        hostname: &str,
        record_type: &str,
        value: &str,
    ) -> Result<RecordId> {
        let url = format!("{}/zones/{}/dns_records", self.api_base, zone.id);
        let payload = serde_json::json!({
            "type": record_type,
            "name": zone.fqdn(hostname),
            "content": value,
            "ttl": AUTO_TTL,
            "proxied": false,
        });

        if self.dry_run {
            self.log_dry_run("POST", &url, &payload);
            return Ok(DRY_RUN_RECORD_ID.to_string());
        }

        let envelope: Envelope<DnsRecordResult> = self
            .send(self.client.post(&url).json(&payload), "Record creation")
            .await
            .map_err(write_error)?;

        let record = envelope.result.ok_or_else(|| {
            Error::provider("cloudflare", "Invalid response format: missing created record")
        })?;
        Ok(record.id)
    }

    /// Overwrite a record
    ///
    /// # API Call
    ///
    /// ```http
    /// PUT /zones/:zone_id/dns_records/:record_id
    /// { "type": "A", "name": "cf1.example.com", "content": "1.2.3.4", "ttl": 1, "proxied": false }
    /// ```
    async fn update_record(
        &self,
        zone: &ZoneRef,
        record_id: &str,
        hostname: &str,
        record_type: &str,
        value: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/zones/{}/dns_records/{}",
            self.api_base, zone.id, record_id
        );
        let payload = serde_json::json!({
            "type": record_type,
            "name": zone.fqdn(hostname),
            "content": value,
            "ttl": AUTO_TTL,
            "proxied": false,
        });

        if self.dry_run {
            self.log_dry_run("PUT", &url, &payload);
            return Ok(());
        }

        let _: Envelope<serde_json::Value> = self
            .send(self.client.put(&url).json(&payload), "Record update")
            .await
            .map_err(write_error)?;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}

/// Cloudflare response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

impl<T> Envelope<T> {
    fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return "no error details".to_string();
        }
        self.errors
            .iter()
            .map(|e| format!("[{}] {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default = "one")]
    total_pages: u32,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct ZoneResult {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct DnsRecordResult {
    id: String,
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    #[serde(default)]
    content: String,
}

/// `domain`, then each parent with at least two labels
fn zone_candidates(domain: &str) -> Vec<&str> {
    let mut candidates = vec![domain];
    let mut rest = domain;
    while let Some((_, parent)) = rest.split_once('.') {
        if !parent.contains('.') {
            break;
        }
        candidates.push(parent);
        rest = parent;
    }
    candidates
}

/// A failed write is always a provider error, even on 404
fn write_error(error: Error) -> Error {
    match error {
        Error::NotFound(message) => Error::provider("cloudflare", message),
        other => other,
    }
}

/// Map a non-success HTTP status to an error
fn status_error(status: reqwest::StatusCode, error_text: &str, context: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::provider(
            "cloudflare",
            format!(
                "Authentication failed: Invalid credentials or insufficient permissions. Status: {}",
                status
            ),
        ),
        404 => Error::not_found(format!("{} failed: {} - {}", context, status, error_text)),
        409 => Error::provider(
            "cloudflare",
            format!("Conflict: {} - {}", status, error_text),
        ),
        429 => Error::provider(
            "cloudflare",
            format!("Rate limit exceeded. Status: {}", status),
        ),
        500..=599 => Error::provider(
            "cloudflare",
            format!("Cloudflare server error (transient): {} - {}", status, error_text),
        ),
        _ => Error::provider(
            "cloudflare",
            format!("{} failed: {} - {}", context, status, error_text),
        ),
    }
}
