//! Result filter
//!
//! Ranks measured endpoints: drop everything under the speed floor (and, when
//! set, over the latency ceiling or outside the preferred regions), order by
//! speed (descending) then latency (ascending), keep input order for exact
//! ties, limit how many endpoints one region may contribute, and cap the
//! result length.

use crate::config::flags;
use crate::error::{Error, Result};
use crate::model::MeasurementRecord;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Selection thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCriteria {
    speed_floor_mb_s: f64,
    max_records: usize,
    max_latency_ms: Option<f64>,
    regions: Vec<String>,
    max_per_region: usize,
}

impl FilterCriteria {
    /// Validated criteria; a floor of 0 disables it, a cap of 0 is unlimited
    pub fn new(speed_floor_mb_s: f64, max_records: usize) -> Result<Self> {
        if !speed_floor_mb_s.is_finite() || speed_floor_mb_s < 0.0 {
            return Err(Error::configuration_flag(
                format!(
                    "speed floor must be a non-negative number, got {}",
                    speed_floor_mb_s
                ),
                flags::SPEED,
            ));
        }
        Ok(Self {
            speed_floor_mb_s,
            max_records,
            ..Self::unbounded()
        })
    }

    /// Criteria that keep every record
    pub fn unbounded() -> Self {
        Self {
            speed_floor_mb_s: 0.0,
            max_records: 0,
            max_latency_ms: None,
            regions: Vec::new(),
            max_per_region: 0,
        }
    }

    /// Drop records whose latency exceeds `max_latency_ms`
    pub fn with_latency_ceiling(mut self, max_latency_ms: f64) -> Result<Self> {
        if !max_latency_ms.is_finite() || max_latency_ms <= 0.0 {
            return Err(Error::configuration_flag(
                format!(
                    "latency ceiling must be a positive number, got {}",
                    max_latency_ms
                ),
                flags::LATENCY,
            ));
        }
        self.max_latency_ms = Some(max_latency_ms);
        Ok(self)
    }

    /// Keep only records from these region codes (case-insensitive)
    ///
    /// An empty list keeps every region.
    pub fn with_regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.regions = regions
            .into_iter()
            .map(|r| r.as_ref().trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        self
    }

    /// Limit how many records one region may contribute (0 = unlimited)
    pub fn with_max_per_region(mut self, max_per_region: usize) -> Self {
        self.max_per_region = max_per_region;
        self
    }

    /// Minimum speed in MB/s
    pub fn speed_floor_mb_s(&self) -> f64 {
        self.speed_floor_mb_s
    }

    /// Record cap (0 = unlimited)
    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// Latency ceiling in ms, if any
    pub fn max_latency_ms(&self) -> Option<f64> {
        self.max_latency_ms
    }

    /// Preferred regions (empty = all)
    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    /// Per-region cap (0 = unlimited)
    pub fn max_per_region(&self) -> usize {
        self.max_per_region
    }

    fn passes(&self, record: &MeasurementRecord) -> bool {
        let fast_enough =
            self.speed_floor_mb_s <= 0.0 || record.speed_mb_s >= self.speed_floor_mb_s;
        let close_enough = self
            .max_latency_ms
            .is_none_or(|ceiling| record.latency_ms <= ceiling);
        let preferred = self.regions.is_empty()
            || self
                .regions
                .iter()
                .any(|r| r.eq_ignore_ascii_case(&record.region_code));
        fast_enough && close_enough && preferred
    }
}

/// Ranked, thresholded records; never empty
#[derive(Debug, Clone, PartialEq)]
pub struct RankedSelection {
    records: Vec<MeasurementRecord>,
}

impl RankedSelection {
    /// Ranked records, best first
    pub fn records(&self) -> &[MeasurementRecord] {
        &self.records
    }

    /// Best record
    pub fn first(&self) -> &MeasurementRecord {
        &self.records[0]
    }

    /// Number of selected records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false; an empty outcome is [`Selection::Empty`]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Consume into the ranked records
    pub fn into_records(self) -> Vec<MeasurementRecord> {
        self.records
    }
}

/// Outcome of [`select`]
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// At least one record survived the floor
    Ranked(RankedSelection),
    /// Nothing survived; a normal outcome, not an error
    Empty {
        /// How many records were measured
        measured: usize,
    },
}

impl Selection {
    /// Ranked records, empty slice when nothing qualified
    pub fn records(&self) -> &[MeasurementRecord] {
        match self {
            Selection::Ranked(ranked) => ranked.records(),
            Selection::Empty { .. } => &[],
        }
    }

    /// The ranked selection, if any
    pub fn ranked(&self) -> Option<&RankedSelection> {
        match self {
            Selection::Ranked(ranked) => Some(ranked),
            Selection::Empty { .. } => None,
        }
    }
}

/// Ranking order: speed descending, then latency ascending
pub fn rank_order(a: &MeasurementRecord, b: &MeasurementRecord) -> Ordering {
    b.speed_mb_s
        .total_cmp(&a.speed_mb_s)
        .then_with(|| a.latency_ms.total_cmp(&b.latency_ms))
}

/// Filter and rank a result set
pub fn select(results: &[MeasurementRecord], criteria: &FilterCriteria) -> Selection {
    let mut survivors: Vec<MeasurementRecord> = results
        .iter()
        .filter(|r| criteria.passes(r))
        .cloned()
        .collect();

    tracing::debug!(
        measured = results.len(),
        kept = survivors.len(),
        floor = criteria.speed_floor_mb_s,
        "Applied speed floor"
    );

    if survivors.is_empty() {
        return Selection::Empty {
            measured: results.len(),
        };
    }

    // sort_by is stable, exact ties keep input order
    survivors.sort_by(rank_order);

    if criteria.max_per_region > 0 {
        let mut taken: HashMap<String, usize> = HashMap::new();
        survivors.retain(|r| {
            let count = taken.entry(r.region_code.to_ascii_uppercase()).or_insert(0);
            *count += 1;
            *count <= criteria.max_per_region
        });
    }

    if criteria.max_records > 0 {
        survivors.truncate(criteria.max_records);
    }

    Selection::Ranked(RankedSelection { records: survivors })
}

/// Single best record that passes the thresholds
pub fn best<'a>(
    results: &'a [MeasurementRecord],
    criteria: &FilterCriteria,
) -> Option<&'a MeasurementRecord> {
    results
        .iter()
        .filter(|r| criteria.passes(r))
        .fold(None, |best: Option<&MeasurementRecord>, r| match best {
            Some(b) if rank_order(r, b) != Ordering::Less => Some(b),
            _ => Some(r),
        })
}

/// Aggregate statistics for reporting
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResultSummary {
    /// Records measured
    pub total: usize,
    /// Records passing the thresholds
    pub qualifying: usize,
    /// Minimum speed (MB/s)
    pub min_speed: f64,
    /// Mean speed (MB/s)
    pub avg_speed: f64,
    /// Maximum speed (MB/s)
    pub max_speed: f64,
    /// Minimum latency (ms)
    pub min_latency: f64,
    /// Mean latency (ms)
    pub avg_latency: f64,
    /// Maximum latency (ms)
    pub max_latency: f64,
}

/// Summarize a result set; all statistics are 0 for an empty set
pub fn summary(results: &[MeasurementRecord], criteria: &FilterCriteria) -> ResultSummary {
    if results.is_empty() {
        return ResultSummary::default();
    }

    let n = results.len() as f64;
    let speeds = results.iter().map(|r| r.speed_mb_s);
    let latencies = results.iter().map(|r| r.latency_ms);

    ResultSummary {
        total: results.len(),
        qualifying: results.iter().filter(|r| criteria.passes(r)).count(),
        min_speed: speeds.clone().fold(f64::INFINITY, f64::min),
        avg_speed: speeds.clone().sum::<f64>() / n,
        max_speed: speeds.fold(f64::NEG_INFINITY, f64::max),
        min_latency: latencies.clone().fold(f64::INFINITY, f64::min),
        avg_latency: latencies.clone().sum::<f64>() / n,
        max_latency: latencies.fold(f64::NEG_INFINITY, f64::max),
    }
}
