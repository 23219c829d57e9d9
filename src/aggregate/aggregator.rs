use crate::aggregate::types::{ComparisonEntry, ComparisonMatrix, ComparisonSnapshot};
use crate::reducer::{BenchSummary, MetricStats, Quartiles};
use crate::result::{ExecutionError, MixedReport, RunResult};
use crate::testspec::TestKind;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};

/// A report's outcome once malformed successes are turned into failures
enum Verdict<'a> {
    Ok(&'a BenchSummary),
    Err(ExecutionError),
}

fn verdict(report: &MixedReport<BenchSummary>) -> Verdict<'_> {
    match &report.result {
        RunResult::Err { error, .. } => Verdict::Err(error.clone()),
        RunResult::Ok { value, .. } if value.is_empty() => Verdict::Err(
            ExecutionError::invalid_input(format!(
                "{} reported success without any metrics",
                report.machine_name
            )),
        ),
        RunResult::Ok { value, .. } => match value.iter().find(|(_, s)| !s.is_consistent()) {
            Some((field, _)) => Verdict::Err(ExecutionError::invalid_input(format!(
                "{} reported inconsistent statistics for {field}",
                report.machine_name
            ))),
            None => Verdict::Ok(value),
        },
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    sum / n as f64
}

/// Min of mins, mean of averages, max of maxes, mean of each quartile
fn merge_stats(stats: &[MetricStats]) -> MetricStats {
    let min = stats.iter().map(MetricStats::min).fold(f64::INFINITY, f64::min);
    let max = stats.iter().map(MetricStats::max).fold(f64::NEG_INFINITY, f64::max);
    let average = mean(stats.iter().map(MetricStats::average)).clamp(min, max);

    let quartiles: Option<Vec<Quartiles>> = stats.iter().map(MetricStats::quartiles).collect();
    let quartiles = quartiles.map(|qs| Quartiles {
        p25: mean(qs.iter().map(|q| q.p25)),
        p50: mean(qs.iter().map(|q| q.p50)),
        p75: mean(qs.iter().map(|q| q.p75)),
    });

    MetricStats::from_parts(min, average, max, quartiles)
}

fn merge_summaries(summaries: &[&BenchSummary]) -> BenchSummary {
    let mut by_field: BTreeMap<_, Vec<MetricStats>> = BTreeMap::new();
    for summary in summaries {
        for (field, stats) in summary.iter() {
            by_field.entry(*field).or_default().push(*stats);
        }
    }
    by_field
        .into_iter()
        .map(|(field, stats)| (field, merge_stats(&stats)))
        .collect()
}

/// Build one cell from the reports of a single (VPN, profile) pair
fn entry_for(mut group: Vec<&MixedReport<BenchSummary>>) -> ComparisonEntry {
    if group.is_empty() {
        return ComparisonEntry::NotRun;
    }
    group.sort_by(|a, b| a.machine_name.cmp(&b.machine_name));

    let mut successes = Vec::new();
    let mut first_failure = None;
    let mut failing_machines = Vec::new();

    for report in &group {
        match verdict(report) {
            Verdict::Ok(summary) => successes.push(summary),
            Verdict::Err(error) => {
                failing_machines.push(report.machine_name.clone());
                if first_failure.is_none() {
                    first_failure = Some((report.machine_name.clone(), error));
                }
            }
        }
    }

    match first_failure {
        Some((machine, error)) => ComparisonEntry::Crashed {
            machine,
            error,
            failing_machines,
        },
        None => ComparisonEntry::Success {
            summary: merge_summaries(&successes),
            machine_count: successes.len(),
            approximate: successes.len() > 1,
        },
    }
}

/// Build the comparison matrix of `kind`
///
/// Every pair of `known_vpns` x `profiles` gets a cell, `NotRun` when no
/// report covers it. Reports naming other VPNs or profiles are kept too. The
/// result does not depend on the order of `reports`.
pub fn aggregate(
    kind: TestKind,
    reports: &[MixedReport<BenchSummary>],
    known_vpns: &[String],
    profiles: &[String],
) -> ComparisonMatrix {
    let mut groups: BTreeMap<(&str, &str), Vec<&MixedReport<BenchSummary>>> = BTreeMap::new();
    for report in reports.iter().filter(|r| r.test_kind == kind) {
        groups
            .entry((report.vpn_name.as_str(), report.profile_name.as_str()))
            .or_default()
            .push(report);
    }

    let vpns: BTreeSet<&str> = known_vpns
        .iter()
        .map(String::as_str)
        .chain(groups.keys().map(|(vpn, _)| *vpn))
        .collect();

    let mut profile_order: Vec<String> = Vec::new();
    for profile in profiles {
        if !profile_order.contains(profile) {
            profile_order.push(profile.clone());
        }
    }
    let extra: BTreeSet<&str> = groups
        .keys()
        .map(|(_, profile)| *profile)
        .filter(|p| !profiles.iter().any(|known| known == p))
        .collect();
    profile_order.extend(extra.into_iter().map(str::to_string));

    let mut entries = BTreeMap::new();
    for vpn in vpns {
        let mut row = BTreeMap::new();
        for profile in &profile_order {
            let group = groups.remove(&(vpn, profile.as_str())).unwrap_or_default();
            row.insert(profile.clone(), entry_for(group));
        }
        entries.insert(vpn.to_string(), row);
    }

    ComparisonMatrix {
        kind,
        profiles: profile_order,
        entries,
    }
}

/// Matrices for every test kind present in `reports`
pub fn aggregate_all(
    reports: &[MixedReport<BenchSummary>],
    known_vpns: &[String],
    profiles: &[String],
) -> ComparisonSnapshot {
    let kinds: BTreeSet<TestKind> = reports.iter().map(|r| r.test_kind).collect();
    let matrices = kinds
        .into_iter()
        .map(|kind| (kind, aggregate(kind, reports, known_vpns, profiles)))
        .collect();

    ComparisonSnapshot {
        generated_at: Utc::now(),
        matrices,
    }
}
