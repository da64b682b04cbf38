//! Workflow coordinator
//!
//! The WorkflowCoordinator is responsible for:
//! - Resolving the IP source and test endpoint before any I/O
//! - Reusing or regenerating the measurement artifact
//! - Filtering and ranking the measured endpoints
//! - Planning and applying DNS writes, one at a time
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ SourceCatalog │──▶│ IpListSource │──▶│ Measurement  │
//! │  (resolve)    │   │  (prepare)   │   │ Runner+Parser│
//! └───────────────┘   └──────────────┘   └──────────────┘
//!                                               │
//!                                               ▼
//! ┌───────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  DnsProvider  │◀──│   Planner    │◀──│ ResultFilter │
//! │   (apply)     │   │   (plan)     │   │  (select)    │
//! └───────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! ## State Machine
//!
//! `RESOLVE_SOURCE → ACQUIRE_MEASUREMENTS → FILTER → PLAN → APPLY → DONE`,
//! linear, with `FAILED(step, cause)` reachable from every step. A run is a
//! single sequential task: each step completes before the next starts.

use crate::cache::{ArtifactInfo, CacheDecision, ResultCache};
use crate::config::{WorkflowConfig, flags};
use crate::error::{Error, Result};
use crate::filter::{self, FilterCriteria, Selection};
use crate::model::{EffectiveTestTarget, ResultSet};
use crate::planner::{self, OperationKind, ReconciliationPlan};
use crate::source::{ResolvedSource, SourceCatalog, SourceSpec};
use crate::traits::{
    DnsProvider, IpListSource, MeasurementRequest, MeasurementRunner, ResultParser, ZoneRef,
};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error as ThisError;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Port assumed when no test target tells the parser otherwise
const DEFAULT_TEST_PORT: u16 = 443;

/// Workflow steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowStep {
    /// Resolve source and test endpoint
    ResolveSource,
    /// Reuse or produce the measurement artifact and parse it
    AcquireMeasurements,
    /// Rank and threshold the results
    Filter,
    /// Snapshot the zone and compute the plan
    Plan,
    /// Apply the plan
    Apply,
    /// Finished
    Done,
}

impl std::fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkflowStep::ResolveSource => "RESOLVE_SOURCE",
            WorkflowStep::AcquireMeasurements => "ACQUIRE_MEASUREMENTS",
            WorkflowStep::Filter => "FILTER",
            WorkflowStep::Plan => "PLAN",
            WorkflowStep::Apply => "APPLY",
            WorkflowStep::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Events emitted by the WorkflowCoordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEvent {
    /// A step began
    StepStarted { step: WorkflowStep },

    /// The cache decided whether to reuse the artifact
    CacheChecked {
        cache_key: String,
        reused: bool,
        reason: Option<String>,
    },

    /// Measurements are parsed and available
    MeasurementsReady {
        artifact: PathBuf,
        records: usize,
        reused: bool,
    },

    /// Filtering finished
    SelectionComputed { measured: usize, selected: usize },

    /// A plan was computed
    PlanComputed { operations: usize, writes: usize },

    /// A DNS write succeeded
    OperationApplied {
        kind: OperationKind,
        hostname: String,
        value: String,
    },

    /// A plan entry needed no write
    OperationSkipped { hostname: String, value: String },

    /// The run entered the FAILED state
    RunFailed { step: WorkflowStep, error: String },

    /// The run reached DONE
    RunFinished { applied: usize },
}

/// One plan entry that was processed before the run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedOperation {
    /// CREATE, UPDATE or SKIP
    pub kind: OperationKind,
    /// Relative hostname
    pub hostname: String,
    /// Content now published
    pub value: String,
    /// Record ID (new ID for CREATE)
    pub record_id: Option<String>,
}

/// Absorbing `FAILED(step, cause)` state
///
/// `applied` is the prefix of the plan processed before the failure; those
/// writes stand and are never rolled back.
#[derive(ThisError, Debug)]
#[error("{step} failed: {cause}")]
pub struct RunFailure {
    /// Step that failed
    pub step: WorkflowStep,
    /// Underlying error
    #[source]
    pub cause: Error,
    /// Plan entries processed before the failure
    pub applied: Vec<AppliedOperation>,
}

impl RunFailure {
    fn at(step: WorkflowStep, cause: Error) -> Self {
        Self {
            step,
            cause,
            applied: Vec::new(),
        }
    }

    /// Whether the failure is a configuration problem
    pub fn is_configuration(&self) -> bool {
        self.cause.is_configuration()
    }
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Resolved source
    pub source: SourceSpec,
    /// Test endpoint used (None when the tool default applied)
    pub test_target: Option<EffectiveTestTarget>,
    /// Artifact the results were read from
    pub artifact: PathBuf,
    /// Whether the artifact came from the cache
    pub reused_artifact: bool,
    /// Every parsed measurement, in tool order
    pub results: ResultSet,
    /// Ranked selection (may be empty when DNS updates are off)
    pub selection: Selection,
    /// Plan, when DNS updates are on
    pub plan: Option<ReconciliationPlan>,
    /// Plan entries processed, in order
    pub applied: Vec<AppliedOperation>,
}

impl RunReport {
    /// Number of provider writes performed
    pub fn writes(&self) -> usize {
        self.applied
            .iter()
            .filter(|op| op.kind != OperationKind::Skip)
            .count()
    }
}

/// Core workflow coordinator
///
/// Owns the collaborators for one invocation and drives them through the
/// state machine. It is the only place that decides whether a step's
/// failure is fatal.
///
/// ## Lifecycle
///
/// 1. Create with [`WorkflowCoordinator::new()`]
/// 2. Attach the IP list source and DNS provider as needed
/// 3. Call [`WorkflowCoordinator::run()`] once
pub struct WorkflowCoordinator {
    /// Known IP sources
    catalog: SourceCatalog,

    /// Downloads candidate lists (required for sources with a list URL)
    ip_lists: Option<Box<dyn IpListSource>>,

    /// Runs the measurement tool
    runner: Box<dyn MeasurementRunner>,

    /// Reads the measurement artifact
    parser: Box<dyn ResultParser>,

    /// DNS provider (required when DNS updates are on)
    provider: Option<Box<dyn DnsProvider>>,

    /// Validated configuration
    config: WorkflowConfig,

    /// Artifact reuse decision
    cache: ResultCache,

    /// Selection thresholds
    criteria: FilterCriteria,

    /// Normalized record type
    record_type: String,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<WorkflowEvent>,
}

impl WorkflowCoordinator {
    /// Create a new coordinator
    ///
    /// # Returns
    ///
    /// A tuple of (coordinator, event_receiver)
    ///
    /// # Errors
    ///
    /// `Error::Configuration` if `config` does not validate.
    pub fn new(
        catalog: SourceCatalog,
        runner: Box<dyn MeasurementRunner>,
        parser: Box<dyn ResultParser>,
        config: WorkflowConfig,
    ) -> Result<(Self, mpsc::Receiver<WorkflowEvent>)> {
        config.validate()?;

        let criteria = config.filter.criteria()?;
        let record_type = config.dns.normalized_record_type()?;
        let cache = ResultCache::new(config.cache.policy());

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let coordinator = Self {
            catalog,
            ip_lists: None,
            runner,
            parser,
            provider: None,
            config,
            cache,
            criteria,
            record_type,
            event_tx: tx,
        };

        Ok((coordinator, rx))
    }

    /// Attach the IP list source
    pub fn with_ip_lists(mut self, ip_lists: Box<dyn IpListSource>) -> Self {
        self.ip_lists = Some(ip_lists);
        self
    }

    /// Attach the DNS provider
    pub fn with_provider(mut self, provider: Box<dyn DnsProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Run the workflow once
    pub async fn run(&self) -> std::result::Result<RunReport, RunFailure> {
        self.run_with_cancellation(CancellationToken::new()).await
    }

    /// Run the workflow once, stopping cooperatively when `cancel` fires
    ///
    /// Cancellation and the configured deadline are checked before the
    /// measurement tool starts and before each DNS operation. A write that
    /// was already issued is neither retried nor rolled back.
    pub async fn run_with_cancellation(
        &self,
        cancel: CancellationToken,
    ) -> std::result::Result<RunReport, RunFailure> {
        let deadline = self
            .config
            .engine
            .deadline_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));

        match self.execute(&cancel, deadline).await {
            Ok(report) => {
                info!(
                    "Workflow finished: {} measured, {} selected, {} write(s)",
                    report.results.len(),
                    report.selection.records().len(),
                    report.writes()
                );
                self.emit_event(WorkflowEvent::RunFinished {
                    applied: report.writes(),
                });
                Ok(report)
            }
            Err(failure) => {
                error!("Workflow failed at {}: {}", failure.step, failure.cause);
                self.emit_event(WorkflowEvent::RunFailed {
                    step: failure.step,
                    error: failure.cause.to_string(),
                });
                Err(failure)
            }
        }
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> std::result::Result<RunReport, RunFailure> {
        // RESOLVE_SOURCE
        self.enter(WorkflowStep::ResolveSource);
        let resolved = self
            .resolve_source()
            .map_err(|e| RunFailure::at(WorkflowStep::ResolveSource, e))?;

        // ACQUIRE_MEASUREMENTS
        self.enter(WorkflowStep::AcquireMeasurements);
        let (artifact, reused, results) = self
            .acquire_measurements(&resolved, cancel, deadline)
            .await
            .map_err(|e| RunFailure::at(WorkflowStep::AcquireMeasurements, e))?;

        // FILTER
        self.enter(WorkflowStep::Filter);
        let selection = filter::select(&results, &self.criteria);
        self.emit_event(WorkflowEvent::SelectionComputed {
            measured: results.len(),
            selected: selection.records().len(),
        });

        let mut report = RunReport {
            source: resolved.spec,
            test_target: resolved.test_target,
            artifact,
            reused_artifact: reused,
            results,
            selection,
            plan: None,
            applied: Vec::new(),
        };

        let Some(provider) = self.dns_provider() else {
            if let Selection::Empty { measured } = report.selection {
                info!(
                    "No endpoint met the selection criteria (floor {} MB/s, {} measured)",
                    self.criteria.speed_floor_mb_s(),
                    measured
                );
            }
            return Ok(report);
        };

        if let Selection::Empty { measured } = report.selection {
            return Err(RunFailure::at(
                WorkflowStep::Filter,
                Error::EmptySelection { measured },
            ));
        }

        // PLAN
        self.enter(WorkflowStep::Plan);
        let (zone, plan) = self
            .plan(provider, &report.selection)
            .await
            .map_err(|e| RunFailure::at(WorkflowStep::Plan, e))?;
        self.emit_event(WorkflowEvent::PlanComputed {
            operations: plan.operations.len(),
            writes: plan.write_count(),
        });

        // APPLY
        self.enter(WorkflowStep::Apply);
        report.applied = self.apply(provider, &zone, &plan, cancel, deadline).await?;
        report.plan = Some(plan);

        self.enter(WorkflowStep::Done);
        Ok(report)
    }

    fn resolve_source(&self) -> Result<ResolvedSource> {
        let source = &self.config.source;
        let resolved = self.catalog.resolve(
            source.ip_source.as_deref(),
            source.test_url.as_deref(),
            source.port,
        )?;

        if resolved.spec.ip_list_url.is_some() && self.ip_lists.is_none() {
            return Err(Error::configuration_flag(
                format!(
                    "IP source '{}' needs a list downloader, none is configured",
                    resolved.spec.label
                ),
                flags::IP_SOURCE,
            ));
        }
        if self.config.dns.enabled && self.provider.is_none() {
            return Err(Error::configuration(
                "DNS updates are enabled but no DNS provider is configured",
            ));
        }

        info!(
            "Using IP source '{}'{}",
            resolved.spec.label,
            resolved
                .test_target
                .as_ref()
                .map(|t| format!(" with test URL {} (port {})", t.url, t.port))
                .unwrap_or_default()
        );
        Ok(resolved)
    }

    async fn acquire_measurements(
        &self,
        resolved: &ResolvedSource,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<(PathBuf, bool, ResultSet)> {
        let spec = &resolved.spec;
        let cache_key = spec.cache_key();
        let force_refresh = self.config.cache.force_refresh;
        let artifact = self.config.test.result_path(&cache_key);

        let info = ArtifactInfo::inspect(&artifact).await;
        let decision = self.cache.decide(&cache_key, force_refresh, &info);
        let reused = decision.is_reuse();

        match decision {
            CacheDecision::Reuse { age } => {
                info!(
                    "Reusing cached results {} (age: {})",
                    artifact.display(),
                    age.map(|a| format!("{}s", a.as_secs()))
                        .unwrap_or_else(|| "unknown".to_string())
                );
                self.emit_event(WorkflowEvent::CacheChecked {
                    cache_key: cache_key.clone(),
                    reused: true,
                    reason: None,
                });
            }
            CacheDecision::Refresh(reason) => {
                info!("Measuring endpoints: {}", reason);
                self.emit_event(WorkflowEvent::CacheChecked {
                    cache_key: cache_key.clone(),
                    reused: false,
                    reason: Some(reason.to_string()),
                });
            }
        }

        let path = if reused {
            artifact
        } else {
            self.measure(resolved, &cache_key, artifact, cancel, deadline)
                .await?
        };

        let port = resolved
            .test_target
            .as_ref()
            .map(|t| t.port)
            .unwrap_or(DEFAULT_TEST_PORT);
        let results = self.parser.parse(&path, port).await?;
        debug!("Parsed {} measurement(s) from {}", results.len(), path.display());

        self.emit_event(WorkflowEvent::MeasurementsReady {
            artifact: path.clone(),
            records: results.len(),
            reused,
        });

        Ok((path, reused, results))
    }

    async fn measure(
        &self,
        resolved: &ResolvedSource,
        cache_key: &str,
        output: PathBuf,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<PathBuf> {
        let spec = &resolved.spec;
        check_cancelled(cancel, deadline, "before IP list preparation")?;

        let ip_file = match (&spec.ip_list_url, &self.ip_lists) {
            (Some(_), Some(ip_lists)) => {
                let list_path = self.config.test.ip_list_path(cache_key);
                let prepared = tokio::select! {
                    result = ip_lists.prepare(spec, &list_path, self.config.cache.force_refresh) => result?,
                    _ = cancel.cancelled() => {
                        return Err(Error::cancelled("IP list preparation interrupted"));
                    }
                    _ = sleep_until_deadline(deadline) => {
                        return Err(Error::cancelled("deadline reached during IP list preparation"));
                    }
                };
                info!(
                    "IP list ready: {} entries in {}{}",
                    prepared.entries,
                    prepared.path.display(),
                    if prepared.reused { " (reused)" } else { "" }
                );
                Some(prepared.path)
            }
            _ => None,
        };

        let request = MeasurementRequest {
            test_target: resolved.test_target.clone(),
            ip_list_url: spec.ip_list_url.clone(),
            ip_file,
            extra_args: self.config.test.extra_args.clone(),
            output,
        };

        check_cancelled(cancel, deadline, "before measurement")?;
        info!("Starting {} measurement", self.runner.runner_name());

        tokio::select! {
            result = self.runner.run(&request) => result,
            _ = cancel.cancelled() => Err(Error::cancelled("measurement interrupted")),
            _ = sleep_until_deadline(deadline) => {
                Err(Error::cancelled("deadline reached during measurement"))
            }
        }
    }

    async fn plan(
        &self,
        provider: &dyn DnsProvider,
        selection: &Selection,
    ) -> Result<(ZoneRef, ReconciliationPlan)> {
        let dns = &self.config.dns;
        let zone = provider.resolve_zone(&dns.domain).await?;
        let existing = provider.list_records(&zone, &dns.prefix).await?;
        debug!(
            "Zone {} has {} record(s) under prefix '{}'",
            zone.name,
            existing.len(),
            dns.prefix
        );

        let plan = planner::plan(
            selection.records(),
            &existing,
            &dns.prefix,
            dns.single_record,
            &self.record_type,
        )?;
        info!(
            "Plan for {}: {} operation(s), {} write(s)",
            zone.name,
            plan.operations.len(),
            plan.write_count()
        );
        Ok((zone, plan))
    }

    async fn apply(
        &self,
        provider: &dyn DnsProvider,
        zone: &ZoneRef,
        plan: &ReconciliationPlan,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> std::result::Result<Vec<AppliedOperation>, RunFailure> {
        let mut applied = Vec::with_capacity(plan.operations.len());

        for op in &plan.operations {
            let fail = |cause: Error, applied: Vec<AppliedOperation>| RunFailure {
                step: WorkflowStep::Apply,
                cause,
                applied,
            };

            if let Err(e) = check_cancelled(cancel, deadline, "before DNS operation") {
                return Err(fail(e, applied));
            }

            let fqdn = zone.fqdn(&op.hostname);
            let record_id = match op.kind {
                OperationKind::Skip => {
                    debug!("{} already points to {}", fqdn, op.target_value);
                    self.emit_event(WorkflowEvent::OperationSkipped {
                        hostname: op.hostname.clone(),
                        value: op.target_value.clone(),
                    });
                    op.record_id.clone()
                }
                OperationKind::Create => {
                    match provider
                        .create_record(zone, &op.hostname, &plan.record_type, &op.target_value)
                        .await
                    {
                        Ok(id) => {
                            info!("Created {} {} -> {}", plan.record_type, fqdn, op.target_value);
                            Some(id)
                        }
                        Err(e) => return Err(fail(e, applied)),
                    }
                }
                OperationKind::Update => {
                    let Some(record_id) = op.record_id.as_deref() else {
                        return Err(fail(
                            Error::validation(format!("update for {} has no record ID", fqdn)),
                            applied,
                        ));
                    };
                    if let Err(e) = provider
                        .update_record(
                            zone,
                            record_id,
                            &op.hostname,
                            &plan.record_type,
                            &op.target_value,
                        )
                        .await
                    {
                        return Err(fail(e, applied));
                    }
                    info!(
                        "Updated {} {} -> {} (was: {})",
                        plan.record_type,
                        fqdn,
                        op.target_value,
                        op.current_value.as_deref().unwrap_or("?")
                    );
                    Some(record_id.to_string())
                }
            };

            if op.kind != OperationKind::Skip {
                self.emit_event(WorkflowEvent::OperationApplied {
                    kind: op.kind,
                    hostname: op.hostname.clone(),
                    value: op.target_value.clone(),
                });
            }

            applied.push(AppliedOperation {
                kind: op.kind,
                hostname: op.hostname.clone(),
                value: op.target_value.clone(),
                record_id,
            });
        }

        Ok(applied)
    }

    fn dns_provider(&self) -> Option<&dyn DnsProvider> {
        if self.config.dns.enabled {
            self.provider.as_deref()
        } else {
            None
        }
    }

    fn enter(&self, step: WorkflowStep) {
        debug!("Entering {}", step);
        self.emit_event(WorkflowEvent::StepStarted { step });
    }

    /// Emit a workflow event
    fn emit_event(&self, event: WorkflowEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Event receiver dropped, event discarded");
            }
        }
    }
}

fn check_cancelled(
    cancel: &CancellationToken,
    deadline: Option<Instant>,
    context: &str,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::cancelled(format!("run cancelled {}", context)));
    }
    if let Some(deadline) = deadline
        && Instant::now() >= deadline
    {
        return Err(Error::cancelled(format!("deadline reached {}", context)));
    }
    Ok(())
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_names() {
        assert_eq!(WorkflowStep::ResolveSource.to_string(), "RESOLVE_SOURCE");
        assert_eq!(WorkflowStep::Apply.to_string(), "APPLY");
    }

    #[test]
    fn failure_display_includes_step() {
        let failure = RunFailure::at(WorkflowStep::Plan, Error::validation("no qualifying endpoint"));
        assert_eq!(
            failure.to_string(),
            "PLAN failed: Validation error: no qualifying endpoint"
        );
        assert!(failure.applied.is_empty());
        assert!(!failure.is_configuration());
    }

    #[test]
    fn cancellation_checks() {
        let token = CancellationToken::new();
        assert!(check_cancelled(&token, None, "now").is_ok());

        let past = Instant::now() - Duration::from_millis(1);
        assert!(matches!(
            check_cancelled(&token, Some(past), "now"),
            Err(Error::Cancelled(_))
        ));

        token.cancel();
        assert!(matches!(
            check_cancelled(&token, None, "now"),
            Err(Error::Cancelled(_))
        ));
    }
}
