//! Test doubles and common utilities for workflow contract tests
//!
//! None of these spawn processes or touch the network. Counters are shared
//! through `Arc` so a test can keep a handle after boxing the double.

#![allow(dead_code)]

use bestip_core::config::{ProviderConfig, WorkflowConfig};
use bestip_core::error::{Error, Result};
use bestip_core::planner::{ExistingRecord, ExistingRecordSet};
use bestip_core::source::SourceSpec;
use bestip_core::traits::{
    DnsProvider, IpListSource, MeasurementRequest, MeasurementRunner, PreparedList, RecordId,
    ResultParser, ZoneRef, is_managed_hostname,
};
use bestip_core::{MeasurementRecord, ResultSet};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Measurement record on port 443
pub fn rec(ip: &str, speed: f64, latency: f64) -> MeasurementRecord {
    MeasurementRecord::new(ip, 443, "LAX", speed, latency)
}

/// A runner that writes a placeholder artifact instead of spawning a tool
pub struct ScriptedRunner {
    run_call_count: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<MeasurementRequest>>>,
    fail_with: Option<String>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            run_call_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            fail_with: None,
        }
    }

    /// A runner whose every run fails with an execution error
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::new()
        }
    }

    /// Get the number of times run() was called
    pub fn run_call_count(&self) -> usize {
        self.run_call_count.load(Ordering::SeqCst)
    }

    /// Requests received, in order
    pub fn requests(&self) -> Vec<MeasurementRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Create a new ScriptedRunner that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            run_call_count: Arc::clone(&other.run_call_count),
            requests: Arc::clone(&other.requests),
            fail_with: other.fail_with.clone(),
        }
    }
}

#[async_trait::async_trait]
impl MeasurementRunner for ScriptedRunner {
    async fn run(&self, request: &MeasurementRequest) -> Result<PathBuf> {
        self.run_call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if let Some(message) = &self.fail_with {
            return Err(Error::execution(message.clone()));
        }

        tokio::fs::write(&request.output, "scripted\n").await?;
        Ok(request.output.clone())
    }

    fn runner_name(&self) -> &'static str {
        "scripted"
    }
}

/// A parser that returns a fixed result set
pub struct InMemoryParser {
    results: ResultSet,
    parse_call_count: Arc<AtomicUsize>,
}

impl InMemoryParser {
    pub fn new(results: ResultSet) -> Self {
        Self {
            results,
            parse_call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get the number of times parse() was called
    pub fn parse_call_count(&self) -> usize {
        self.parse_call_count.load(Ordering::SeqCst)
    }

    /// Create a new InMemoryParser that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            results: other.results.clone(),
            parse_call_count: Arc::clone(&other.parse_call_count),
        }
    }
}

#[async_trait::async_trait]
impl ResultParser for InMemoryParser {
    async fn parse(&self, path: &Path, _default_port: u16) -> Result<ResultSet> {
        self.parse_call_count.fetch_add(1, Ordering::SeqCst);
        if !path.exists() {
            return Err(Error::parse(format!("{} does not exist", path.display())));
        }
        Ok(self.results.clone())
    }
}

/// An IP list source that writes a fixed list
pub struct StaticIpLists {
    entries: Vec<String>,
    prepare_call_count: Arc<AtomicUsize>,
    stall: bool,
}

impl StaticIpLists {
    pub fn new(entries: &[&str]) -> Self {
        Self {
            entries: entries.iter().map(|e| e.to_string()).collect(),
            prepare_call_count: Arc::new(AtomicUsize::new(0)),
            stall: false,
        }
    }

    /// Make prepare() hang like a download that never completes
    pub fn stalling(mut self) -> Self {
        self.stall = true;
        self
    }

    /// Get the number of times prepare() was called
    pub fn prepare_call_count(&self) -> usize {
        self.prepare_call_count.load(Ordering::SeqCst)
    }

    /// Create a new StaticIpLists that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            entries: other.entries.clone(),
            prepare_call_count: Arc::clone(&other.prepare_call_count),
            stall: other.stall,
        }
    }
}

#[async_trait::async_trait]
impl IpListSource for StaticIpLists {
    async fn prepare(
        &self,
        _spec: &SourceSpec,
        path: &Path,
        _force_refresh: bool,
    ) -> Result<PreparedList> {
        self.prepare_call_count.fetch_add(1, Ordering::SeqCst);
        if self.stall {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        }
        tokio::fs::write(path, self.entries.join("\n")).await?;
        Ok(PreparedList {
            path: path.to_path_buf(),
            entries: self.entries.len(),
            reused: false,
        })
    }
}

/// One call observed by [`RecordingDnsProvider`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Create { hostname: String, value: String },
    Update { record_id: String, hostname: String, value: String },
}

/// An in-memory zone that records every write
pub struct RecordingDnsProvider {
    zone: Arc<Mutex<BTreeMap<String, ExistingRecord>>>,
    calls: Arc<Mutex<Vec<ProviderCall>>>,
    list_call_count: Arc<AtomicUsize>,
    next_id: Arc<AtomicUsize>,
    /// 1-based index of the write that fails
    fail_on_write: Option<usize>,
    /// Cancel this token after the first successful write
    cancel_after_first_write: Option<tokio_util::sync::CancellationToken>,
}

impl RecordingDnsProvider {
    pub fn new() -> Self {
        Self {
            zone: Arc::new(Mutex::new(BTreeMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            list_call_count: Arc::new(AtomicUsize::new(0)),
            next_id: Arc::new(AtomicUsize::new(1)),
            fail_on_write: None,
            cancel_after_first_write: None,
        }
    }

    /// Seed an existing record
    pub fn with_record(self, hostname: &str, value: &str, record_type: &str) -> Self {
        let id = format!("existing-{}", hostname);
        self.zone.lock().unwrap().insert(
            hostname.to_string(),
            ExistingRecord {
                record_id: id,
                value: value.to_string(),
                record_type: record_type.to_string(),
            },
        );
        self
    }

    /// Fail the n-th write (1-based)
    pub fn failing_on_write(mut self, n: usize) -> Self {
        self.fail_on_write = Some(n);
        self
    }

    /// Cancel `token` once the first write succeeds
    pub fn cancelling_after_first_write(
        mut self,
        token: tokio_util::sync::CancellationToken,
    ) -> Self {
        self.cancel_after_first_write = Some(token);
        self
    }

    /// Writes received, in order
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of write calls
    pub fn write_call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Get the number of times list_records() was called
    pub fn list_call_count(&self) -> usize {
        self.list_call_count.load(Ordering::SeqCst)
    }

    /// Current content of a hostname
    pub fn value_of(&self, hostname: &str) -> Option<String> {
        self.zone
            .lock()
            .unwrap()
            .get(hostname)
            .map(|r| r.value.clone())
    }

    /// Create a new RecordingDnsProvider that shares zone and counters
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            zone: Arc::clone(&other.zone),
            calls: Arc::clone(&other.calls),
            list_call_count: Arc::clone(&other.list_call_count),
            next_id: Arc::clone(&other.next_id),
            fail_on_write: other.fail_on_write,
            cancel_after_first_write: other.cancel_after_first_write.clone(),
        }
    }

    fn record_write(&self, call: ProviderCall) -> Result<()> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call);
            calls.len()
        };
        if self.fail_on_write == Some(n) {
            return Err(Error::provider("recording", "Rate limit exceeded"));
        }
        if let Some(token) = &self.cancel_after_first_write {
            token.cancel();
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DnsProvider for RecordingDnsProvider {
    async fn resolve_zone(&self, domain: &str) -> Result<ZoneRef> {
        Ok(ZoneRef::new("zone-1", domain))
    }

    async fn list_records(&self, _zone: &ZoneRef, prefix: &str) -> Result<ExistingRecordSet> {
        self.list_call_count.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .zone
            .lock()
            .unwrap()
            .iter()
            .filter(|(host, _)| is_managed_hostname(host, prefix))
            .map(|(host, record)| (host.clone(), record.clone()))
            .collect())
    }

    async fn create_record(
        &self,
        _zone: &ZoneRef,
        hostname: &str,
        record_type: &str,
        value: &str,
    ) -> Result<RecordId> {
        self.record_write(ProviderCall::Create {
            hostname: hostname.to_string(),
            value: value.to_string(),
        })?;
        let id = format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.zone.lock().unwrap().insert(
            hostname.to_string(),
            ExistingRecord {
                record_id: id.clone(),
                value: value.to_string(),
                record_type: record_type.to_string(),
            },
        );
        Ok(id)
    }

    async fn update_record(
        &self,
        _zone: &ZoneRef,
        record_id: &str,
        hostname: &str,
        record_type: &str,
        value: &str,
    ) -> Result<()> {
        self.record_write(ProviderCall::Update {
            record_id: record_id.to_string(),
            hostname: hostname.to_string(),
            value: value.to_string(),
        })?;
        self.zone.lock().unwrap().insert(
            hostname.to_string(),
            ExistingRecord {
                record_id: record_id.to_string(),
                value: value.to_string(),
                record_type: record_type.to_string(),
            },
        );
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "recording"
    }
}

/// Helper to create a minimal measurement-only config rooted at `work_dir`
pub fn minimal_config(work_dir: &Path) -> WorkflowConfig {
    let mut config = WorkflowConfig::new();
    config.source.ip_source = Some("cf".to_string());
    config.test.work_dir = work_dir.to_path_buf();
    config.filter.speed_floor_mb_s = 2.0;
    config.engine.event_channel_capacity = 100;
    config
}

/// Helper to create a config with DNS updates enabled
pub fn dns_config(work_dir: &Path, single_record: bool) -> WorkflowConfig {
    let mut config = minimal_config(work_dir);
    config.dns.enabled = true;
    config.dns.domain = "example.com".to_string();
    config.dns.prefix = "cf".to_string();
    config.dns.single_record = single_record;
    config.dns.provider = ProviderConfig::Cloudflare {
        api_token: Some("test-token".to_string()),
        api_key: None,
        email: None,
        zone_id: None,
    };
    config
}

/// Drain every event currently buffered in the channel
pub fn drain_events(
    rx: &mut tokio::sync::mpsc::Receiver<bestip_core::WorkflowEvent>,
) -> Vec<bestip_core::WorkflowEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
