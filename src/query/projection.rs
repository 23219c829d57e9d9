//! Read-only projections over a [`ComparisonSnapshot`]
//!
//! Nothing here is cached; every call reads the snapshot it is given.

use crate::aggregate::{ComparisonEntry, ComparisonSnapshot};
use crate::query::types::{
    Cell, Heatmap, HeatmapRow, MetricSelector, Scatter, ScatterPoint, Series, SeriesPoint,
    Statistic,
};

fn select(entry: Option<&ComparisonEntry>, selector: &MetricSelector) -> Cell {
    match entry {
        None | Some(ComparisonEntry::NotRun) => Cell::NotRun,
        Some(ComparisonEntry::Crashed { machine, error, .. }) => Cell::Crashed {
            machine: machine.clone(),
            error_kind: error.kind(),
            message: error.to_string(),
        },
        Some(ComparisonEntry::Success { summary, .. }) => {
            let Some(stats) = summary.get(&selector.field) else {
                return Cell::Missing;
            };
            let value = match selector.statistic {
                Statistic::Min => Some(stats.min()),
                Statistic::Average => Some(stats.average()),
                Statistic::Max => Some(stats.max()),
                Statistic::P25 => stats.quartiles().map(|q| q.p25),
                Statistic::P50 => stats.quartiles().map(|q| q.p50),
                Statistic::P75 => stats.quartiles().map(|q| q.p75),
            };
            value.map_or(Cell::Missing, |value| Cell::Value { value })
        }
    }
}

/// Cell of one (VPN, profile) pair
pub fn cell(
    snapshot: &ComparisonSnapshot,
    selector: &MetricSelector,
    vpn: &str,
    profile: &str,
) -> Cell {
    select(snapshot.entry(selector.kind, vpn, profile), selector)
}

/// Rows follow `vpn_order`; VPNs it leaves out are appended in name order
/// and names it lists that the snapshot lacks still get a row of not-run cells.
pub fn heatmap(
    snapshot: &ComparisonSnapshot,
    selector: &MetricSelector,
    vpn_order: &[String],
) -> Heatmap {
    let profiles = snapshot
        .matrix(selector.kind)
        .map(|m| m.profiles.clone())
        .unwrap_or_else(|| snapshot.profiles());

    let mut vpns: Vec<String> = Vec::new();
    for vpn in vpn_order.iter().cloned().chain(snapshot.vpns()) {
        if !vpns.contains(&vpn) {
            vpns.push(vpn);
        }
    }

    let rows = vpns
        .into_iter()
        .map(|vpn| HeatmapRow {
            cells: profiles
                .iter()
                .map(|profile| cell(snapshot, selector, &vpn, profile))
                .collect(),
            vpn,
        })
        .collect();

    Heatmap {
        selector: *selector,
        profiles,
        rows,
    }
}

/// One VPN across every profile of the selected test kind
pub fn series(snapshot: &ComparisonSnapshot, vpn: &str, selector: &MetricSelector) -> Series {
    let profiles = snapshot
        .matrix(selector.kind)
        .map(|m| m.profiles.clone())
        .unwrap_or_else(|| snapshot.profiles());

    Series {
        vpn: vpn.to_string(),
        selector: *selector,
        points: profiles
            .into_iter()
            .map(|profile| SeriesPoint {
                cell: cell(snapshot, selector, vpn, &profile),
                profile,
            })
            .collect(),
    }
}

/// Every (VPN, profile) pair of the snapshot with one value per axis
pub fn scatter(snapshot: &ComparisonSnapshot, axes: (MetricSelector, MetricSelector)) -> Scatter {
    let (x, y) = axes;
    let profiles = snapshot.profiles();
    let mut points = Vec::new();

    for vpn in snapshot.vpns() {
        for profile in &profiles {
            points.push(ScatterPoint {
                vpn: vpn.clone(),
                profile: profile.clone(),
                x: cell(snapshot, &x, &vpn, profile),
                y: cell(snapshot, &y, &vpn, profile),
            });
        }
    }

    Scatter { x, y, points }
}
