//! Reconciliation planner
//!
//! Diffs the desired hostname → value mapping derived from a ranked
//! selection against a snapshot of the zone's current records and emits one
//! CREATE, UPDATE or SKIP per desired hostname, in index order.
//!
//! Hostnames are relative to the zone (`cf1`, not `cf1.example.com`).
//! Records outside the numbered range are never touched.

use crate::error::{Error, Result};
use crate::model::MeasurementRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One record currently published in the zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingRecord {
    /// Provider record ID
    pub record_id: String,
    /// Current content
    pub value: String,
    /// Current record type
    pub record_type: String,
}

/// Snapshot of existing records keyed by relative hostname
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistingRecordSet {
    records: BTreeMap<String, ExistingRecord>,
}

impl ExistingRecordSet {
    /// Empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record; the first record seen for a hostname wins
    pub fn insert(&mut self, hostname: impl Into<String>, record: ExistingRecord) -> bool {
        let hostname = hostname.into().to_ascii_lowercase();
        if self.records.contains_key(&hostname) {
            tracing::warn!(
                "Multiple records for '{}', keeping record {}",
                hostname,
                self.records[&hostname].record_id
            );
            return false;
        }
        self.records.insert(hostname, record);
        true
    }

    /// Look up a hostname (case-insensitive)
    pub fn get(&self, hostname: &str) -> Option<&ExistingRecord> {
        self.records.get(&hostname.to_ascii_lowercase())
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate in hostname order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ExistingRecord)> {
        self.records.iter()
    }
}

impl FromIterator<(String, ExistingRecord)> for ExistingRecordSet {
    fn from_iter<I: IntoIterator<Item = (String, ExistingRecord)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (hostname, record) in iter {
            set.insert(hostname, record);
        }
        set
    }
}

/// Desired state for one hostname
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredRecord {
    /// Relative hostname
    pub hostname: String,
    /// Target content
    pub value: String,
}

/// Map a ranked selection to hostnames
///
/// Single mode uses only the first record under the bare prefix; multi mode
/// numbers records from 1.
pub fn desired_records(
    selection: &[MeasurementRecord],
    prefix: &str,
    single_record_mode: bool,
) -> Vec<DesiredRecord> {
    if single_record_mode {
        return selection
            .first()
            .map(|r| DesiredRecord {
                hostname: prefix.to_string(),
                value: r.endpoint.clone(),
            })
            .into_iter()
            .collect();
    }

    selection
        .iter()
        .enumerate()
        .map(|(i, r)| DesiredRecord {
            hostname: format!("{}{}", prefix, i + 1),
            value: r.endpoint.clone(),
        })
        .collect()
}

/// Kind of a planned operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// No record exists for the hostname
    Create,
    /// A record exists with a different value or type
    Update,
    /// The record already matches
    Skip,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Create => write!(f, "CREATE"),
            OperationKind::Update => write!(f, "UPDATE"),
            OperationKind::Skip => write!(f, "SKIP"),
        }
    }
}

/// One planned DNS write (or no-op)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// What to do
    pub kind: OperationKind,
    /// Relative hostname
    pub hostname: String,
    /// Target content
    pub target_value: String,
    /// Existing record ID (UPDATE and SKIP)
    pub record_id: Option<String>,
    /// Content before the change, if a record existed
    pub current_value: Option<String>,
}

/// Ordered operations converging the zone to the selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationPlan {
    /// Record type every operation writes
    pub record_type: String,
    /// Operations in index order
    pub operations: Vec<Operation>,
}

impl ReconciliationPlan {
    /// Number of operations that call the provider
    pub fn write_count(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| op.kind != OperationKind::Skip)
            .count()
    }

    /// Whether the zone already matches
    pub fn is_noop(&self) -> bool {
        self.write_count() == 0
    }
}

/// Compute the reconciliation plan
///
/// # Errors
///
/// `Error::Validation` when single-record mode has no record to publish, or
/// the prefix or record type is empty.
pub fn plan(
    selection: &[MeasurementRecord],
    existing: &ExistingRecordSet,
    prefix: &str,
    single_record_mode: bool,
    record_type: &str,
) -> Result<ReconciliationPlan> {
    if prefix.is_empty() {
        return Err(Error::validation("record prefix is empty"));
    }
    if record_type.is_empty() {
        return Err(Error::validation("record type is empty"));
    }
    if single_record_mode && selection.is_empty() {
        return Err(Error::validation("no qualifying endpoint"));
    }

    let operations = desired_records(selection, prefix, single_record_mode)
        .into_iter()
        .map(|desired| {
            let (kind, record_id, current_value) = match existing.get(&desired.hostname) {
                None => (OperationKind::Create, None, None),
                Some(current)
                    if current.value == desired.value
                        && current.record_type.eq_ignore_ascii_case(record_type) =>
                {
                    (
                        OperationKind::Skip,
                        Some(current.record_id.clone()),
                        Some(current.value.clone()),
                    )
                }
                Some(current) => (
                    OperationKind::Update,
                    Some(current.record_id.clone()),
                    Some(current.value.clone()),
                ),
            };
            Operation {
                kind,
                hostname: desired.hostname,
                target_value: desired.value,
                record_id,
                current_value,
            }
        })
        .collect();

    Ok(ReconciliationPlan {
        record_type: record_type.to_string(),
        operations,
    })
}
