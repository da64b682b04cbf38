//! Result cache
//!
//! Decides whether a previous measurement artifact can be reused. The base
//! rule is [`should_reuse`]: reuse whenever an artifact exists and no refresh
//! was forced. Time-based expiry is an optional [`CachePolicy`] layered on
//! top, and a miss always degrades to "measure again", never to an error.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Base reuse rule
///
/// Returns `false` when a refresh is forced or no artifact exists for
/// `cache_key`, `true` otherwise. `artifact_age` is not consulted here.
pub fn should_reuse(
    cache_key: &str,
    force_refresh: bool,
    artifact_exists: bool,
    artifact_age: Option<Duration>,
) -> bool {
    let reuse = !force_refresh && artifact_exists;
    tracing::trace!(
        cache_key,
        force_refresh,
        artifact_exists,
        age_secs = artifact_age.map(|a| a.as_secs()),
        reuse,
        "Cache check"
    );
    reuse
}

/// Why an artifact will be regenerated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    /// The caller forced a refresh
    Forced,
    /// No usable artifact on disk
    Missing,
    /// Older than the configured maximum age
    Expired {
        /// Age of the artifact
        age: Duration,
        /// Configured limit
        max_age: Duration,
    },
}

impl std::fmt::Display for RefreshReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshReason::Forced => write!(f, "refresh forced"),
            RefreshReason::Missing => write!(f, "no cached artifact"),
            RefreshReason::Expired { age, max_age } => write!(
                f,
                "artifact is {}s old (limit {}s)",
                age.as_secs(),
                max_age.as_secs()
            ),
        }
    }
}

/// Outcome of a cache check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDecision {
    /// Use the existing artifact
    Reuse {
        /// Age of the artifact, when the filesystem reports one
        age: Option<Duration>,
    },
    /// Produce a fresh artifact
    Refresh(RefreshReason),
}

impl CacheDecision {
    /// Whether the artifact is reused
    pub fn is_reuse(&self) -> bool {
        matches!(self, CacheDecision::Reuse { .. })
    }
}

/// Optional expiry layered on [`should_reuse`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    /// Refresh artifacts older than this; `None` never expires
    pub max_age: Option<Duration>,
}

/// Filesystem facts about one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInfo {
    /// Artifact path
    pub path: PathBuf,
    /// A non-empty regular file exists at `path`
    pub exists: bool,
    /// Last modification time
    pub modified: Option<DateTime<Utc>>,
    /// Time since last modification
    pub age: Option<Duration>,
}

impl ArtifactInfo {
    /// Read artifact metadata; unreadable or empty files count as missing
    pub async fn inspect(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {
                let modified = meta.modified().ok();
                let age = modified.and_then(|m| SystemTime::now().duration_since(m).ok());
                Self {
                    path,
                    exists: true,
                    modified: modified.map(DateTime::<Utc>::from),
                    age,
                }
            }
            Ok(_) => Self::missing(path),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Cannot read metadata for {}: {}", path.display(), e);
                }
                Self::missing(path)
            }
        }
    }

    /// Info for an artifact that does not exist
    pub fn missing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            exists: false,
            modified: None,
            age: None,
        }
    }
}

/// Cache decision function bound to a policy
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultCache {
    policy: CachePolicy,
}

impl ResultCache {
    /// Create a cache with the given policy
    pub fn new(policy: CachePolicy) -> Self {
        Self { policy }
    }

    /// The active policy
    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Decide whether `artifact` can be reused
    pub fn decide(&self, cache_key: &str, force_refresh: bool, artifact: &ArtifactInfo) -> CacheDecision {
        if !should_reuse(cache_key, force_refresh, artifact.exists, artifact.age) {
            let reason = if force_refresh {
                RefreshReason::Forced
            } else {
                RefreshReason::Missing
            };
            return CacheDecision::Refresh(reason);
        }

        if let (Some(max_age), Some(age)) = (self.policy.max_age, artifact.age)
            && age > max_age
        {
            return CacheDecision::Refresh(RefreshReason::Expired { age, max_age });
        }

        CacheDecision::Reuse { age: artifact.age }
    }
}
