// # HTTP IP List Source
//
// This crate downloads the IP ranges a CDN publishes and stores them as the
// newline-separated candidate file the measurement tool reads.
//
// ## Formats
//
// - Plain text, one range per line (`cf`, custom URLs)
// - JSON array of strings under a key (`gc`, `ct`)
// - JSON array of objects under a key, one field per object (`aws`)
//
// ## Behavior
//
// - An existing non-empty list is reused unless a refresh is forced
// - Downloads are written to a temporary file and renamed into place
// - One request per prepare, no retries

pub mod decode;

use bestip_core::config::flags;
use bestip_core::source::SourceSpec;
use bestip_core::traits::{IpListSource, PreparedList};
use bestip_core::{ArtifactInfo, Error, Result, should_reuse};

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Default download timeout
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Downloads and persists a source's IP list
pub struct HttpIpListFetcher {
    /// HTTP client
    client: reqwest::Client,
}

impl Default for HttpIpListFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpIpListFetcher {
    /// Create a fetcher with the default timeout
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a fetcher with a custom request timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(concat!("bestip/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Fetch the list body
    async fn download(&self, url: &Url) -> Result<String> {
        tracing::debug!("Downloading IP list from {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::http(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::http(format!("GET {} returned {}", url, status)));
        }

        response
            .text()
            .await
            .map_err(|e| Error::http(format!("Failed to read IP list from {}: {}", url, e)))
    }
}

#[async_trait::async_trait]
impl IpListSource for HttpIpListFetcher {
    async fn prepare(
        &self,
        spec: &SourceSpec,
        path: &Path,
        force_refresh: bool,
    ) -> Result<PreparedList> {
        let Some(url) = &spec.ip_list_url else {
            return Err(Error::configuration_flag(
                format!("IP source '{}' does not publish a list", spec.label),
                flags::IP_SOURCE,
            ));
        };

        let info = ArtifactInfo::inspect(path).await;
        if should_reuse(&spec.cache_key(), force_refresh, info.exists, info.age) {
            let entries = count_entries(path).await?;
            if entries > 0 {
                tracing::debug!("Reusing IP list {} ({} entries)", path.display(), entries);
                return Ok(PreparedList {
                    path: path.to_path_buf(),
                    entries,
                    reused: true,
                });
            }
            tracing::warn!(
                "IP list {} has no usable entries, downloading again",
                path.display()
            );
        }

        let body = self.download(url).await?;
        let entries = decode::decode(&body, spec.list_format)?;
        if entries.is_empty() {
            return Err(Error::parse(format!("IP list from {} is empty", url)));
        }

        write_atomic(path, &entries).await?;
        tracing::info!(
            "Downloaded {} IP ranges for '{}' to {}",
            entries.len(),
            spec.label,
            path.display()
        );

        Ok(PreparedList {
            path: path.to_path_buf(),
            entries: entries.len(),
            reused: false,
        })
    }
}

/// Count usable entries in a list file already on disk
async fn count_entries(path: &Path) -> Result<usize> {
    let body = fs::read_to_string(path).await?;
    Ok(decode::decode_text(&body).len())
}

/// Write entries to `path` through a temporary file
async fn write_atomic(path: &Path, entries: &[String]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await?;
    }

    let temp_path = temp_path(path);
    {
        let mut file = fs::File::create(&temp_path).await?;
        let mut body = entries.join("\n");
        body.push('\n');
        file.write_all(body.as_bytes()).await?;
        file.flush().await?;
    }

    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(Error::Io(e));
    }
    Ok(())
}

/// Get path to temporary file for atomic writes
fn temp_path(path: &Path) -> PathBuf {
    let mut temp = path.to_path_buf();
    temp.set_extension("tmp");
    temp
}

#[cfg(test)]
mod tests {
    use super::*;
    use bestip_core::source::{ListFormat, SourceId};
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn spec(url: &str, format: ListFormat) -> SourceSpec {
        SourceSpec {
            id: SourceId::Custom,
            label: "custom".to_string(),
            ip_list_url: Some(Url::parse(url).unwrap()),
            default_test_url: None,
            requires_explicit_test_url: true,
            list_format: format,
        }
    }

    #[tokio::test]
    async fn downloads_text_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/ips-v4"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("173.245.48.0/20\n# note\n\n103.21.244.0/22\n"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("ip_list_cf.txt");
        let fetcher = HttpIpListFetcher::new();

        let prepared = fetcher
            .prepare(&spec(&format!("{}/ips-v4", server.uri()), ListFormat::Text), &list, false)
            .await
            .unwrap();

        assert_eq!(prepared.entries, 2);
        assert!(!prepared.reused);
        assert_eq!(
            std::fs::read_to_string(&list).unwrap(),
            "173.245.48.0/20\n103.21.244.0/22\n"
        );
        assert!(!temp_path(&list).exists());
    }

    #[tokio::test]
    async fn downloads_json_objects() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "prefixes": [
                {"ip_prefix": "3.5.140.0/22"},
                {"ip_prefix": "13.34.37.64/27"}
            ]
        });
        Mock::given(method("GET"))
            .and(url_path("/ip-ranges.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("ip_list_aws.txt");
        let format = ListFormat::JsonObjects {
            key: "prefixes",
            field: "ip_prefix",
        };

        let prepared = HttpIpListFetcher::new()
            .prepare(&spec(&format!("{}/ip-ranges.json", server.uri()), format), &list, false)
            .await
            .unwrap();
        assert_eq!(prepared.entries, 2);
    }

    #[tokio::test]
    async fn existing_list_is_reused_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("1.1.1.0/24\n"))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("ip_list_cf.txt");
        std::fs::write(&list, "104.16.0.0/13\n104.24.0.0/14\n").unwrap();

        let prepared = HttpIpListFetcher::new()
            .prepare(&spec(&format!("{}/ips-v4", server.uri()), ListFormat::Text), &list, false)
            .await
            .unwrap();

        assert!(prepared.reused);
        assert_eq!(prepared.entries, 2);
    }

    #[tokio::test]
    async fn forced_refresh_replaces_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("1.1.1.0/24\n"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("ip_list_cf.txt");
        std::fs::write(&list, "104.16.0.0/13\n").unwrap();

        let prepared = HttpIpListFetcher::new()
            .prepare(&spec(&format!("{}/ips-v4", server.uri()), ListFormat::Text), &list, true)
            .await
            .unwrap();

        assert!(!prepared.reused);
        assert_eq!(std::fs::read_to_string(&list).unwrap(), "1.1.1.0/24\n");
    }

    #[tokio::test]
    async fn failed_download_keeps_old_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("ip_list_cf.txt");
        std::fs::write(&list, "104.16.0.0/13\n").unwrap();

        let err = HttpIpListFetcher::new()
            .prepare(&spec(&format!("{}/ips-v4", server.uri()), ListFormat::Text), &list, true)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Http(ref m) if m.contains("503")));
        assert_eq!(std::fs::read_to_string(&list).unwrap(), "104.16.0.0/13\n");
    }

    #[tokio::test]
    async fn empty_list_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("# nothing here\n\n"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("ip_list_cf.txt");

        let err = HttpIpListFetcher::new()
            .prepare(&spec(&format!("{}/ips-v4", server.uri()), ListFormat::Text), &list, false)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Parse(_)));
        assert!(!list.exists());
    }

    #[tokio::test]
    async fn tool_default_source_has_no_list() {
        let dir = tempfile::tempdir().unwrap();
        let err = HttpIpListFetcher::new()
            .prepare(&SourceSpec::tool_default(), &dir.path().join("x.txt"), false)
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
