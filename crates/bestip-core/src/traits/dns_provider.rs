// # DNS Provider Trait
//
// Defines the interface the coordinator uses to read and write DNS records.
//
// ## Implementations
//
// - Cloudflare: `bestip-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use bestip_core::DnsProvider;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* DnsProvider implementation */;
//
//     let zone = provider.resolve_zone("example.com").await?;
//     let existing = provider.list_records(&zone, "cf").await?;
//     let id = provider.create_record(&zone, "cf1", "A", "104.16.1.1").await?;
//     provider.update_record(&zone, &id, "cf1", "A", "104.16.2.2").await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::planner::ExistingRecordSet;

/// A resolved DNS zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneRef {
    /// Provider zone ID
    pub id: String,
    /// Domain the managed records live under, e.g. `example.com`
    pub name: String,
}

impl ZoneRef {
    /// Create a zone reference
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Fully qualified name for a relative hostname
    pub fn fqdn(&self, hostname: &str) -> String {
        if hostname.is_empty() || hostname == "@" {
            self.name.clone()
        } else {
            format!("{}.{}", hostname, self.name)
        }
    }

    /// Relative hostname for a fully qualified name inside this zone
    pub fn relative(&self, fqdn: &str) -> Option<String> {
        let fqdn = fqdn.trim_end_matches('.').to_ascii_lowercase();
        let zone = self.name.to_ascii_lowercase();
        if fqdn == zone {
            return Some(String::new());
        }
        fqdn.strip_suffix(&zone)
            .and_then(|rest| rest.strip_suffix('.'))
            .map(str::to_string)
    }
}

/// Provider-assigned record identifier
pub type RecordId = String;

/// Trait for DNS provider implementations
///
/// Hostnames passed to and returned from this trait are relative to the
/// zone (`cf1`, not `cf1.example.com`).
///
/// # Trust Level: Untrusted
///
/// Providers are isolated, single-shot API clients:
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Parse provider-specific responses
/// - ✅ Return success or failure
///
/// ## Forbidden Capabilities
/// - ❌ Spawn tasks or threads
/// - ❌ Implement retry logic or backoff
/// - ❌ Decide whether a write is needed (owned by the planner)
/// - ❌ Batch or reorder writes (owned by the coordinator)
///
/// A failed write is returned as-is. The coordinator stops applying the plan
/// at the first failure and reports the operations already applied.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Find the zone that hosts `domain`
    ///
    /// The returned [`ZoneRef::name`] is `domain` itself, so hostnames stay
    /// relative to it even when the zone apex is a parent domain.
    ///
    /// # Errors
    ///
    /// - `Error::NotFound` if the account has no such zone
    /// - `Error::Provider` for API or authentication failures
    async fn resolve_zone(&self, domain: &str) -> Result<ZoneRef, crate::Error>;

    /// Snapshot of records named `prefix` or `prefix` followed by digits
    async fn list_records(
        &self,
        zone: &ZoneRef,
        prefix: &str,
    ) -> Result<ExistingRecordSet, crate::Error>;

    /// Create a record and return its ID
    async fn create_record(
        &self,
        zone: &ZoneRef,
        hostname: &str,
        record_type: &str,
        value: &str,
    ) -> Result<RecordId, crate::Error>;

    /// Overwrite an existing record's content
    async fn update_record(
        &self,
        zone: &ZoneRef,
        record_id: &str,
        hostname: &str,
        record_type: &str,
        value: &str,
    ) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Whether `hostname` is `prefix` or `prefix` followed only by digits
pub fn is_managed_hostname(hostname: &str, prefix: &str) -> bool {
    let hostname = hostname.to_ascii_lowercase();
    let prefix = prefix.to_ascii_lowercase();
    match hostname.strip_prefix(&prefix) {
        Some("") => true,
        Some(rest) => rest.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fqdn_and_relative() {
        let zone = ZoneRef::new("z1", "example.com");
        assert_eq!(zone.fqdn("cf1"), "cf1.example.com");
        assert_eq!(zone.fqdn("@"), "example.com");
        assert_eq!(zone.relative("CF1.Example.com."), Some("cf1".to_string()));
        assert_eq!(zone.relative("example.com"), Some(String::new()));
        assert_eq!(zone.relative("cf1.other.com"), None);
        assert_eq!(zone.relative("badexample.com"), None);
    }

    #[test]
    fn managed_hostnames() {
        assert!(is_managed_hostname("cf", "cf"));
        assert!(is_managed_hostname("cf12", "cf"));
        assert!(is_managed_hostname("CF3", "cf"));
        assert!(!is_managed_hostname("cfx", "cf"));
        assert!(!is_managed_hostname("cf1a", "cf"));
        assert!(!is_managed_hostname("www", "cf"));
    }
}
