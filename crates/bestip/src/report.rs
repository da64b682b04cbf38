//! End-of-run summary printed to stdout

use bestip_core::engine::AppliedOperation;
use bestip_core::filter::{self, FilterCriteria};
use bestip_core::{OperationKind, RunReport};
use std::fmt::Write;

/// Render the summary of a successful run
pub fn render(report: &RunReport, criteria: &FilterCriteria, domain: &str) -> String {
    let mut out = String::new();
    let stats = filter::summary(&report.results, criteria);

    let _ = writeln!(
        out,
        "Source '{}': {} endpoint(s) measured{}",
        report.source.label,
        stats.total,
        if report.reused_artifact {
            format!(" (cached: {})", report.artifact.display())
        } else {
            String::new()
        }
    );
    if stats.total > 0 {
        let _ = writeln!(
            out,
            "Speed   min/avg/max: {:.2} / {:.2} / {:.2} MB/s",
            stats.min_speed, stats.avg_speed, stats.max_speed
        );
        let _ = writeln!(
            out,
            "Latency min/avg/max: {:.1} / {:.1} / {:.1} ms",
            stats.min_latency, stats.avg_latency, stats.max_latency
        );
    }

    match filter::best(&report.results, criteria) {
        Some(best) => {
            let _ = writeln!(
                out,
                "Best: {}:{} {:.2} MB/s {:.1} ms{}",
                best.endpoint,
                best.port,
                best.speed_mb_s,
                best.latency_ms,
                region_suffix(&best.region_code)
            );
        }
        None => {
            let _ = writeln!(
                out,
                "No endpoint met the selection criteria (floor {} MB/s)",
                criteria.speed_floor_mb_s()
            );
        }
    }

    let selected = report.selection.records();
    if !selected.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{:>3}  {:<40} {:>5} {:>12} {:>12}  Region",
            "#", "Endpoint", "Port", "Speed (MB/s)", "Latency (ms)"
        );
        for (i, record) in selected.iter().enumerate() {
            let _ = writeln!(
                out,
                "{:>3}  {:<40} {:>5} {:>12.2} {:>12.1}  {}",
                i + 1,
                record.endpoint,
                record.port,
                record.speed_mb_s,
                record.latency_ms,
                record.region_code
            );
        }
    }

    if let Some(plan) = &report.plan {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "DNS {} ({}): {} write(s)",
            domain,
            plan.record_type,
            report.writes()
        );
        out.push_str(&render_applied(&report.applied, domain));
    }

    out
}

/// One line per processed DNS operation
pub fn render_applied(applied: &[AppliedOperation], domain: &str) -> String {
    let mut out = String::new();
    for op in applied {
        let fqdn = if domain.is_empty() {
            op.hostname.clone()
        } else {
            format!("{}.{}", op.hostname, domain)
        };
        let verb = match op.kind {
            OperationKind::Skip => "unchanged",
            OperationKind::Create | OperationKind::Update => "->",
        };
        let _ = writeln!(out, "  {:<6} {} {} {}", op.kind.to_string(), fqdn, verb, op.value);
    }
    out
}

fn region_suffix(region: &str) -> String {
    if region.is_empty() {
        String::new()
    } else {
        format!(" ({})", region)
    }
}
