//! Speed-test process runner

use bestip_core::config::{TestConfig, flags};
use bestip_core::traits::{MeasurementRequest, MeasurementRunner};
use bestip_core::{Error, Result};

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::fs;
use tokio::process::Command;

/// Bytes of stderr kept in error messages
const STDERR_TAIL_BYTES: usize = 512;

/// Runs the external speed-test binary
#[derive(Debug, Clone)]
pub struct SpeedTestRunner {
    /// Binary name or path
    binary: PathBuf,
    /// Kill the tool after this long
    timeout: Option<Duration>,
}

impl SpeedTestRunner {
    /// Create a runner for `binary` with no timeout
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: None,
        }
    }

    /// Create a runner from the tool settings
    pub fn from_config(config: &TestConfig) -> Self {
        let runner = Self::new(&config.binary);
        match config.tool_timeout_secs {
            Some(secs) => runner.with_timeout(Duration::from_secs(secs)),
            None => runner,
        }
    }

    /// Kill the tool if it runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Binary this runner spawns
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Command line for one measurement writing to `output`
    pub fn build_args(request: &MeasurementRequest, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();

        if let Some(ip_file) = &request.ip_file {
            args.push("-f".into());
            args.push(ip_file.into());
        }

        args.push("-o".into());
        args.push(output.into());

        if let Some(target) = &request.test_target {
            args.push("-url".into());
            args.push(target.url.as_str().into());
            args.push("-tp".into());
            args.push(target.port.to_string().into());
        }

        args.extend(request.extra_args.iter().map(OsString::from));
        args
    }

    async fn execute(&self, args: Vec<OsString>) -> Result<std::process::Output> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!("Running: {:?}", cmd);

        let output = cmd.output();
        let result = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, output).await.map_err(|_| {
                Error::execution(format!(
                    "{} did not finish within {}s",
                    self.binary.display(),
                    timeout.as_secs()
                ))
            })?,
            None => output.await,
        };

        result.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::execution(format!(
                    "speed-test binary '{}' not found (set it with {})",
                    self.binary.display(),
                    flags::BINARY
                ))
            } else {
                Error::execution(format!("failed to start {}: {}", self.binary.display(), e))
            }
        })
    }
}

#[async_trait::async_trait]
impl MeasurementRunner for SpeedTestRunner {
    async fn run(&self, request: &MeasurementRequest) -> Result<PathBuf> {
        let temp = temp_path(&request.output);
        if fs::try_exists(&temp).await.unwrap_or(false) {
            fs::remove_file(&temp).await?;
        }

        let args = Self::build_args(request, &temp);
        tracing::info!(
            "Measuring with {}{}",
            self.binary.display(),
            request
                .ip_list_url
                .as_ref()
                .map(|u| format!(" (candidates from {})", u))
                .unwrap_or_default()
        );

        let output = match self.execute(args).await {
            Ok(output) => output,
            Err(e) => {
                let _ = fs::remove_file(&temp).await;
                return Err(e);
            }
        };

        if !output.status.success() {
            let _ = fs::remove_file(&temp).await;
            return Err(Error::execution(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                stderr_tail(&output.stderr)
            )));
        }

        match fs::metadata(&temp).await {
            Ok(meta) if meta.len() > 0 => {}
            _ => {
                let _ = fs::remove_file(&temp).await;
                return Err(Error::execution(format!(
                    "{} exited cleanly but wrote no results",
                    self.binary.display()
                )));
            }
        }

        fs::rename(&temp, &request.output).await?;
        tracing::debug!("Results written to {}", request.output.display());
        Ok(request.output.clone())
    }

    fn runner_name(&self) -> &'static str {
        "speedtest"
    }
}

/// Get path to temporary file the tool writes to
fn temp_path(output: &Path) -> PathBuf {
    let mut temp = output.to_path_buf();
    temp.set_extension("tmp");
    temp
}

/// Last part of the tool's stderr, trimmed
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.is_empty() {
        return "no error output".to_string();
    }
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}
