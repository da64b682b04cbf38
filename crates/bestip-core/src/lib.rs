// # bestip-core
//
// Core library for picking the fastest endpoints from a published IP range
// and reconciling a DNS zone with them.
//
// ## Architecture Overview
//
// - **SourceCatalog**: Static table of IP sources, resolves source + test URL
// - **ResultCache**: Decides whether a measurement artifact can be reused
// - **ResultFilter**: Thresholds and ranks measured endpoints
// - **ReconciliationPlanner**: Diffs the selection against the zone
// - **WorkflowCoordinator**: Drives the steps and applies the plan
//
// Everything that touches the network or spawns processes sits behind the
// traits in [`traits`] and lives in its own crate.
//
// ## Design Principles
//
// 1. **Fail fast**: Configuration errors surface before any I/O
// 2. **Pure core**: Resolution, caching, filtering and planning are pure
// 3. **Sequential**: One run, one step at a time, one DNS write at a time
// 4. **No rollback**: A failed write stops the run, earlier writes stand

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod model;
pub mod planner;
pub mod source;
pub mod traits;

// Re-export core types for convenience
pub use cache::{ArtifactInfo, CacheDecision, CachePolicy, RefreshReason, ResultCache, should_reuse};
pub use config::WorkflowConfig;
pub use engine::{AppliedOperation, RunFailure, RunReport, WorkflowCoordinator, WorkflowEvent, WorkflowStep};
pub use error::{Error, Result};
pub use filter::{FilterCriteria, RankedSelection, Selection, select};
pub use model::{EffectiveTestTarget, MeasurementRecord, ResultSet, TestOrigin};
pub use planner::{ExistingRecord, ExistingRecordSet, Operation, OperationKind, ReconciliationPlan};
pub use source::{ListFormat, ResolvedSource, SourceCatalog, SourceId, SourceSpec};
pub use traits::{DnsProvider, IpListSource, MeasurementRunner, ResultParser, ZoneRef};
