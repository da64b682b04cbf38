//! # Source Catalog
//!
//! Static table of the IP-range sources the workflow knows about, and the
//! resolution step that turns a user's source/test-URL choice into a
//! [`SourceSpec`] plus an optional [`EffectiveTestTarget`].
//!
//! Resolution is pure: it never touches the network or the filesystem, so a
//! bad combination fails before any measurement work starts.
//!
//! | key | name | IP list | default test URL |
//! |-----|------|---------|------------------|
//! | `cf` | CloudFlare | text | yes |
//! | `gc` | Gcore | JSON `addresses` | yes |
//! | `ct` | CloudFront | JSON `CLOUDFRONT_GLOBAL_IP_LIST` | no |
//! | `aws` | AWS | JSON `prefixes[].ip_prefix` | no |
//!
//! Any other identifier that parses as an http(s) URL is a custom text list.

use crate::config::flags;
use crate::error::{Error, Result};
use crate::model::{EffectiveTestTarget, TestOrigin};
use sha2::{Digest, Sha256};
use url::Url;

/// Identity of an IP source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceId {
    /// CloudFlare published ranges
    Cloudflare,
    /// Gcore CDN ranges
    Gcore,
    /// Amazon CloudFront ranges
    CloudFront,
    /// All AWS ranges
    Aws,
    /// A user-supplied list URL
    Custom,
    /// No list: the measurement tool picks its own candidates
    ToolDefault,
}

/// How a downloaded IP list is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFormat {
    /// One IP/CIDR per line, `#` comments allowed
    Text,
    /// JSON object with an array of strings under `key`
    JsonArray {
        /// Top-level key holding the array
        key: &'static str,
    },
    /// JSON object with an array of objects under `key`, each holding `field`
    JsonObjects {
        /// Top-level key holding the array
        key: &'static str,
        /// Field holding the IP/CIDR in each object
        field: &'static str,
    },
}

/// One row of the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Short key used on the command line
    pub key: &'static str,
    /// Source identity
    pub id: SourceId,
    /// Display name
    pub name: &'static str,
    /// Where the IP list is published
    pub ip_list_url: &'static str,
    /// Encoding of the published list
    pub format: ListFormat,
    /// Test endpoint used when the user gives none
    pub default_test_url: Option<&'static str>,
}

const BUILTIN_ENTRIES: &[CatalogEntry] = &[
    CatalogEntry {
        key: "cf",
        id: SourceId::Cloudflare,
        name: "CloudFlare",
        ip_list_url: "https://www.cloudflare.com/ips-v4",
        format: ListFormat::Text,
        default_test_url: Some("https://cf.xiu2.xyz/url"),
    },
    CatalogEntry {
        key: "gc",
        id: SourceId::Gcore,
        name: "Gcore",
        ip_list_url: "https://api.gcore.com/cdn/public-ip-list",
        format: ListFormat::JsonArray { key: "addresses" },
        default_test_url: Some(
            "https://hk2-speedtest.gcore.com/speedtest-backend/garbage.php?ckSize=100",
        ),
    },
    CatalogEntry {
        key: "ct",
        id: SourceId::CloudFront,
        name: "CloudFront",
        ip_list_url: "https://d7uri8nf7uskq.cloudfront.net/tools/list-cloudfront-ips",
        format: ListFormat::JsonArray {
            key: "CLOUDFRONT_GLOBAL_IP_LIST",
        },
        default_test_url: None,
    },
    CatalogEntry {
        key: "aws",
        id: SourceId::Aws,
        name: "AWS",
        ip_list_url: "https://ip-ranges.amazonaws.com/ip-ranges.json",
        format: ListFormat::JsonObjects {
            key: "prefixes",
            field: "ip_prefix",
        },
        default_test_url: None,
    },
];

/// Fully resolved description of the IP source for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    /// Source identity
    pub id: SourceId,
    /// Catalog key, `custom` or `default`
    pub label: String,
    /// Where to download the IP list (absent when the tool picks candidates)
    pub ip_list_url: Option<Url>,
    /// Catalog default test endpoint
    pub default_test_url: Option<Url>,
    /// A test URL must come from the user
    pub requires_explicit_test_url: bool,
    /// Encoding of the IP list
    pub list_format: ListFormat,
}

impl SourceSpec {
    /// Source that delegates candidate selection to the measurement tool
    pub fn tool_default() -> Self {
        Self {
            id: SourceId::ToolDefault,
            label: "default".to_string(),
            ip_list_url: None,
            default_test_url: None,
            requires_explicit_test_url: false,
            list_format: ListFormat::Text,
        }
    }

    /// Key under which this source's artifacts are cached
    ///
    /// Custom sources get a readable slug of the list URL followed by a
    /// digest of the full URL, query included.
    pub fn cache_key(&self) -> String {
        match (self.id, &self.ip_list_url) {
            (SourceId::Custom, Some(url)) => {
                let raw = format!("{}{}", url.host_str().unwrap_or(""), url.path());
                let mut slug: String = raw
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
                    .collect();
                slug = slug.trim_matches('-').to_string();
                slug.truncate(40);

                let digest = hex::encode(Sha256::digest(url.as_str().as_bytes()));
                format!("custom-{}-{}", slug.trim_end_matches('-'), &digest[..16])
            }
            _ => self.label.clone(),
        }
    }
}

/// Output of [`SourceCatalog::resolve`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    /// The source to measure
    pub spec: SourceSpec,
    /// Test endpoint, absent only when the tool's own default applies
    pub test_target: Option<EffectiveTestTarget>,
}

/// Immutable lookup table of known IP sources
#[derive(Debug, Clone)]
pub struct SourceCatalog {
    entries: Vec<CatalogEntry>,
}

impl Default for SourceCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SourceCatalog {
    /// Catalog with the built-in sources
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN_ENTRIES.to_vec(),
        }
    }

    /// Catalog with an explicit set of entries
    pub fn with_entries(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Keys of every known source, in catalog order
    pub fn available(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.key).collect()
    }

    /// Look up an entry by key (case-insensitive)
    pub fn entry(&self, key: &str) -> Option<&CatalogEntry> {
        let key = key.trim();
        self.entries.iter().find(|e| e.key.eq_ignore_ascii_case(key))
    }

    /// Resolve a source identifier and optional user test URL
    ///
    /// # Parameters
    ///
    /// - `source`: catalog key or http(s) URL of a custom list; `None` (or
    ///   blank) delegates candidate selection to the measurement tool
    /// - `user_test_url`: explicit test URL, always wins over the default
    /// - `user_port`: explicit test port, otherwise the URL's port
    ///
    /// # Errors
    ///
    /// `Error::Configuration` naming the flag to supply when the source is
    /// unknown, a test URL is required but missing, or a URL/port is invalid.
    pub fn resolve(
        &self,
        source: Option<&str>,
        user_test_url: Option<&str>,
        user_port: Option<u16>,
    ) -> Result<ResolvedSource> {
        let user_url = user_test_url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(|u| parse_http_url(u, flags::TEST_URL))
            .transpose()?;

        let spec = match source.map(str::trim).filter(|s| !s.is_empty()) {
            None => SourceSpec::tool_default(),
            Some(identifier) => self.lookup(identifier)?,
        };

        let test_target = match (user_url, &spec.default_test_url) {
            (Some(url), _) => Some(build_target(url, user_port, TestOrigin::UserSupplied)?),
            (None, Some(default)) => Some(build_target(
                default.clone(),
                user_port,
                TestOrigin::Default,
            )?),
            (None, None) if spec.requires_explicit_test_url => {
                return Err(Error::configuration_flag(
                    format!(
                        "IP source '{}' has no default test URL, a test URL is required",
                        spec.label
                    ),
                    flags::TEST_URL,
                ));
            }
            (None, None) => None,
        };

        tracing::debug!(
            source = %spec.label,
            test_url = ?test_target.as_ref().map(|t| t.url.as_str()),
            "Resolved IP source"
        );

        Ok(ResolvedSource { spec, test_target })
    }

    fn lookup(&self, identifier: &str) -> Result<SourceSpec> {
        if let Some(entry) = self.entry(identifier) {
            let ip_list_url = Url::parse(entry.ip_list_url).map_err(|e| {
                Error::configuration(format!(
                    "catalog entry '{}' has an invalid list URL: {}",
                    entry.key, e
                ))
            })?;
            let default_test_url = entry
                .default_test_url
                .map(Url::parse)
                .transpose()
                .map_err(|e| {
                    Error::configuration(format!(
                        "catalog entry '{}' has an invalid test URL: {}",
                        entry.key, e
                    ))
                })?;
            return Ok(SourceSpec {
                id: entry.id,
                label: entry.key.to_string(),
                requires_explicit_test_url: default_test_url.is_none(),
                ip_list_url: Some(ip_list_url),
                default_test_url,
                list_format: entry.format,
            });
        }

        match Url::parse(identifier) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(SourceSpec {
                id: SourceId::Custom,
                label: "custom".to_string(),
                ip_list_url: Some(url),
                default_test_url: None,
                requires_explicit_test_url: true,
                list_format: ListFormat::Text,
            }),
            _ => Err(Error::configuration_flag(
                format!(
                    "unknown IP source '{}', expected one of [{}] or an http(s) URL",
                    identifier,
                    self.available().join(", ")
                ),
                flags::IP_SOURCE,
            )),
        }
    }
}

/// Parse a URL and require an http or https scheme
pub fn parse_http_url(raw: &str, flag: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| Error::configuration_flag(format!("invalid URL '{}': {}", raw, e), flag))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::configuration_flag(
            format!("URL must use http or https, got '{}'", raw),
            flag,
        ));
    }
    Ok(url)
}

fn build_target(url: Url, user_port: Option<u16>, origin: TestOrigin) -> Result<EffectiveTestTarget> {
    let port = match user_port {
        Some(0) => {
            return Err(Error::configuration_flag(
                "test port must be between 1 and 65535",
                flags::PORT,
            ));
        }
        Some(port) => port,
        None => url.port_or_known_default().unwrap_or(443),
    };
    Ok(EffectiveTestTarget { url, port, origin })
}
