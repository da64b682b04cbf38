// # Measurement Traits
//
// The two collaborators behind the ACQUIRE_MEASUREMENTS step: a runner that
// drives the external speed-test tool, and a parser that reads its artifact.
//
// ## Implementations
//
// - `SpeedTestRunner` and `CsvResultParser`: `bestip-speedtest` crate

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use url::Url;

use crate::model::{EffectiveTestTarget, ResultSet};

/// Everything the runner needs for one measurement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementRequest {
    /// Download target; `None` keeps the tool's own default
    pub test_target: Option<EffectiveTestTarget>,
    /// Published list URL, for logging
    pub ip_list_url: Option<Url>,
    /// Local candidate file; `None` keeps the tool's own candidates
    pub ip_file: Option<PathBuf>,
    /// Arguments appended verbatim
    pub extra_args: Vec<String>,
    /// Where the result artifact must end up
    pub output: PathBuf,
}

/// Trait for running the measurement tool
///
/// The tool is a black box: the engine only reads the artifact at the
/// returned path.
///
/// # Contract
///
/// - The artifact at `request.output` is replaced only on success
/// - Failure to start, a non-zero exit or a timeout is `Error::Execution`
/// - No retries
#[async_trait]
pub trait MeasurementRunner: Send + Sync {
    /// Run one measurement and return the artifact path
    async fn run(&self, request: &MeasurementRequest) -> Result<PathBuf, crate::Error>;

    /// Runner name (for logging)
    fn runner_name(&self) -> &'static str;
}

/// Trait for reading a measurement artifact
///
/// Malformed rows are the parser's concern; everything it returns is
/// treated as well-formed by the engine.
#[async_trait]
pub trait ResultParser: Send + Sync {
    /// Parse the artifact at `path`
    ///
    /// `default_port` fills the port for layouts that do not report one
    /// (the port the measurement ran against).
    ///
    /// # Errors
    ///
    /// `Error::Parse` if the file is missing, empty or has no data rows.
    async fn parse(&self, path: &Path, default_port: u16) -> Result<ResultSet, crate::Error>;
}
