// # IP List Trait
//
// Prepares the candidate IP list the measurement tool reads.
//
// ## Implementations
//
// - HTTP download: `bestip-ip-list` crate
//
// ## Usage
//
// ```rust,ignore
// use bestip_core::IpListSource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let lists = /* IpListSource implementation */;
//     let resolved = catalog.resolve(Some("cf"), None, None)?;
//
//     let prepared = lists
//         .prepare(&resolved.spec, "ip_list_cf.txt".as_ref(), false)
//         .await?;
//     println!("{} candidates in {}", prepared.entries, prepared.path.display());
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::source::SourceSpec;

/// A candidate list ready on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedList {
    /// Newline-separated IP/CIDR file
    pub path: PathBuf,
    /// Number of entries in the file
    pub entries: usize,
    /// Whether an existing file was reused instead of downloaded
    pub reused: bool,
}

/// Trait for IP list preparation
///
/// Implementations fetch the list published for a [`SourceSpec`], decode its
/// format and write one entry per line to `path`.
///
/// # Contract
///
/// - An existing non-empty file at `path` is reused unless `force_refresh`
/// - Writes are atomic: a failed download never leaves a partial file
/// - A list that decodes to zero entries is an error
/// - No retries; a failed download is returned to the coordinator
#[async_trait]
pub trait IpListSource: Send + Sync {
    /// Make the source's IP list available at `path`
    ///
    /// # Errors
    ///
    /// - `Error::Configuration` if the source has no list URL
    /// - `Error::Http` / `Error::Parse` if download or decoding fails
    async fn prepare(
        &self,
        spec: &SourceSpec,
        path: &Path,
        force_refresh: bool,
    ) -> Result<PreparedList, crate::Error>;
}
